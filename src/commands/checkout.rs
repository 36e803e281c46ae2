//! Checkout: restore plaintext files or whole commits.
//!
//! The single argument form is disambiguated by resolution: first as a
//! commit in the plain repository, then as a commit in the encrypted one;
//! anything else is treated as one or more plaintext path patterns.

use crate::compress;
use crate::config::Settings;
use crate::crypto::Cipher;
use crate::encrepo::{EncRepo, MANIFEST_DIR};
use crate::error::{MybaError, Result};
use crate::manifest::{self, ManifestEntry};
use crate::password::{self, Password};
use crate::pathenc;
use crate::plain::PlainRepo;
use crate::pool::Pool;
use std::fs;
use tracing::info;

pub fn checkout(settings: &Settings, args: &[String]) -> Result<()> {
    if args.is_empty() {
        return Err(MybaError::Usage("checkout needs a commit or path patterns".into()));
    }
    let plain = PlainRepo::open(settings)?;
    let enc = EncRepo::open(settings)?;

    if args.len() == 1 {
        if let Some(commit) = plain.resolve_commit(&args[0]) {
            info!("checking out plain commit {commit}");
            return plain.checkout(&commit);
        }
        if let Some(commit) = enc.resolve_commit(&args[0]) {
            info!("checking out encrypted commit {commit}");
            let cipher = Cipher::new(settings, Password::acquire(false)?);
            enc.sparse_set(&[MANIFEST_DIR.to_owned()])?;
            enc.checkout(&commit)?;
            let n = manifest::refresh_local(
                &settings.manifest_dir(),
                &enc.manifest_worktree_dir(),
                &cipher,
            )?;
            println!("Decrypted {n} manifests");
            return Ok(());
        }
    }

    checkout_paths(settings, &enc, args)
}

fn checkout_paths(settings: &Settings, enc: &EncRepo, patterns: &[String]) -> Result<()> {
    let entries = manifest::scan_local(&settings.manifest_dir(), patterns)?;
    if entries.is_empty() {
        return Err(MybaError::Usage(format!(
            "no tracked paths match {patterns:?}"
        )));
    }

    // Cone mode wants directory prefixes; the manifest cone stays in so
    // future scans keep working.
    let mut dirs: Vec<String> =
        pathenc::cone_dirs(entries.iter().map(|e| e.enc_path.as_str()))
            .into_iter()
            .collect();
    dirs.push(MANIFEST_DIR.to_owned());
    enc.sparse_set(&dirs)?;
    enc.sparse_reapply()?;

    // Prompting is serial and happens before any bytes move, so a refusal
    // leaves the tree untouched.
    for entry in &entries {
        let dest = settings.work_tree.join(&entry.plain_path);
        if dest.exists() && !password::confirm_overwrite(&dest, settings.yes_overwrite)? {
            return Err(MybaError::OverwriteRefused(entry.plain_path.clone()));
        }
    }

    let cipher = Cipher::new(settings, Password::acquire(false)?);
    let pool = Pool::new(settings.n_jobs);
    pool.run(&entries, |entry, log| {
        let data = read_enc_blob(enc, entry)?;
        let plaintext = compress::decode(&cipher.decrypt(&entry.plain_path, &data)?);
        let dest = settings.work_tree.join(&entry.plain_path);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&dest, &plaintext)?;
        log.say(format!("restored {}", entry.plain_path));
        Ok(())
    })?;
    println!("Restored {} files", entries.len());
    Ok(())
}

/// Ciphertext bytes for one manifest entry: from the sparse worktree when
/// materialized, else straight from the object store, which lazy-fetches
/// over the promisor remote.
fn read_enc_blob(enc: &EncRepo, entry: &ManifestEntry) -> Result<Vec<u8>> {
    let on_disk = enc.worktree_path(&entry.enc_path);
    if on_disk.is_file() {
        return Ok(fs::read(on_disk)?);
    }
    enc.git()
        .run_bytes(["cat-file", "blob", &format!("HEAD:{}", entry.enc_path)])
}
