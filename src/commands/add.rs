//! Select and deselect plaintext paths.
//!
//! Adding a directory drops an empty marker file inside it; commit re-adds
//! every directory carrying a tracked marker, so directories stay
//! recursively tracked as their contents change.

use crate::config::Settings;
use crate::error::{MybaError, Result};
use crate::plain::{PlainRepo, DIR_MARKER};
use std::fs;
use std::path::{Path, PathBuf};

pub fn add(settings: &Settings, paths: &[PathBuf]) -> Result<()> {
    let plain = PlainRepo::open(settings)?;
    let mut targets = Vec::with_capacity(paths.len());
    for path in paths {
        let abs = absolutize(settings, path)?;
        if abs.is_dir() {
            let marker = abs.join(DIR_MARKER);
            if !marker.exists() {
                fs::write(&marker, b"")?;
            }
        } else if !abs.exists() {
            return Err(MybaError::Usage(format!("{} does not exist", abs.display())));
        }
        targets.push(abs);
    }
    plain.add(targets.iter().map(|p| p.as_os_str()))?;
    println!("Added {} paths", targets.len());
    Ok(())
}

pub fn rm(settings: &Settings, paths: &[PathBuf]) -> Result<()> {
    let plain = PlainRepo::open(settings)?;
    let mut targets = Vec::with_capacity(paths.len());
    for path in paths {
        let abs = absolutize(settings, path)?;
        // Without its marker the directory is no longer re-added on commit.
        let marker = abs.join(DIR_MARKER);
        if marker.exists() {
            fs::remove_file(&marker)?;
        }
        targets.push(abs);
    }
    plain.rm(targets.iter().map(|p| p.as_os_str()))?;
    println!("Untracked {} paths", targets.len());
    Ok(())
}

/// Resolve a user-supplied path against the working tree and insist it
/// stays inside it.
fn absolutize(settings: &Settings, path: &Path) -> Result<PathBuf> {
    let abs = if path.is_absolute() {
        path.to_path_buf()
    } else {
        settings.work_tree.join(path)
    };
    if !abs.starts_with(&settings.work_tree) {
        return Err(MybaError::Usage(format!(
            "{} is outside the working tree {}",
            abs.display(),
            settings.work_tree.display()
        )));
    }
    Ok(abs)
}
