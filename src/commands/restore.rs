//! Rebuild the plain repository from the encrypted one.
//!
//! Sequential mode replays encrypted commits parent-before-child and
//! reconstructs each plain commit with its original author, date and
//! message. Squash mode ignores history and materializes the union of all
//! manifests as a single commit.

use super::commit::parse_commit_record;
use crate::cleanup;
use crate::compress;
use crate::config::Settings;
use crate::crypto::Cipher;
use crate::encrepo::{EncRepo, MANIFEST_DIR};
use crate::error::{MybaError, Result};
use crate::manifest::{self, Manifest};
use crate::password::Password;
use crate::pathenc;
use crate::plain::{parse_name_status, Change, PlainRepo};
use crate::pool::Pool;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::collections::BTreeMap;
use std::fs;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

pub fn decrypt(settings: &Settings, squash: bool) -> Result<()> {
    let plain = PlainRepo::open(settings)?;
    let enc = EncRepo::open(settings)?;
    if plain.has_commits() && !settings.yes_overwrite {
        return Err(MybaError::AlreadyRestored);
    }
    let cipher = Cipher::new(settings, Password::acquire(false)?);
    if squash {
        restore_squash(settings, &plain, &enc, &cipher)
    } else {
        restore_sequential(settings, &plain, &enc, &cipher)
    }
}

fn restore_squash(
    settings: &Settings,
    plain: &PlainRepo,
    enc: &EncRepo,
    cipher: &Cipher,
) -> Result<()> {
    let entries = manifest::aggregate(&settings.manifest_dir())?;
    if entries.is_empty() {
        println!("Nothing to restore");
        return Ok(());
    }

    let mut dirs: Vec<String> =
        pathenc::cone_dirs(entries.iter().map(|e| e.enc_path.as_str()))
            .into_iter()
            .collect();
    dirs.push(MANIFEST_DIR.to_owned());
    enc.sparse_set(&dirs)?;
    enc.sparse_reapply()?;

    let pool = Pool::new(settings.n_jobs);
    pool.run(&entries, |entry, log| {
        let data = fs::read(enc.worktree_path(&entry.enc_path))?;
        let plaintext = compress::decode(&cipher.decrypt(&entry.plain_path, &data)?);
        let dest = settings.work_tree.join(&entry.plain_path);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&dest, &plaintext)?;
        log.say(format!("restored {}", entry.plain_path));
        Ok(())
    })?;

    plain.add(entries.iter().map(|e| {
        settings.work_tree.join(&e.plain_path).into_os_string()
    }))?;
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    plain.commit(&format!("Restore at @{stamp}"))?;
    println!("Restored {} files in a single commit", entries.len());
    Ok(())
}

fn restore_sequential(
    settings: &Settings,
    plain: &PlainRepo,
    enc: &EncRepo,
    cipher: &Cipher,
) -> Result<()> {
    let enc_commits = enc.log_hashes_oldest_first()?;
    if enc_commits.is_empty() {
        println!("Nothing to restore");
        return Ok(());
    }

    let mut guard = cleanup::Stack::new();
    if let Ok(branch) = enc.current_branch() {
        if branch != "HEAD" {
            let git = enc.git().clone();
            guard.defer(move || {
                let _ = git.run(["checkout", "-q", "-f", &branch]);
            });
        }
    }

    // Staging happens through a throwaway tree on the same filesystem as P.
    let stage = tempfile::Builder::new()
        .prefix("restore-")
        .tempdir_in(&settings.plain_repo)?;
    let stage_git = plain.git_at(stage.path());
    fs::create_dir_all(settings.manifest_dir())?;

    let mut restored = 0usize;
    let mut undecodable = 0usize;
    for enc_commit in &enc_commits {
        let armored = enc.commit_message(enc_commit)?;
        // Commits that predate a reencrypt (or were keyed differently) do
        // not decode under this password; they are superseded by the
        // replayed history that follows them.
        let record = match decode_record(cipher, &armored) {
            Ok(record) => record,
            Err(e) => {
                warn!("{enc_commit}: cannot decode commit metadata ({e}), skipping");
                undecodable += 1;
                continue;
            }
        };

        let touched = enc.touched_paths(enc_commit)?;
        let blob_prefix = format!("{}/", pathenc::ENC_ROOT);
        let mut dirs: Vec<String> = pathenc::cone_dirs(
            touched
                .iter()
                .filter(|t| t.starts_with(&blob_prefix))
                .map(String::as_str),
        )
        .into_iter()
        .collect();
        dirs.push(MANIFEST_DIR.to_owned());
        enc.sparse_set(&dirs)?;
        enc.checkout(enc_commit)?;

        // The manifest added in this commit maps plaintext paths to the
        // blobs this commit introduced; it is also mirrored back under P.
        let mut by_plain: BTreeMap<String, String> = BTreeMap::new();
        for t in &touched {
            let Some(name) = t.strip_prefix(&format!("{MANIFEST_DIR}/")) else {
                continue;
            };
            let on_disk = enc.worktree_path(t);
            if !on_disk.is_file() {
                continue;
            }
            let m = Manifest::decode(cipher, &fs::read(on_disk)?)?;
            fs::write(settings.manifest_dir().join(name), m.to_text())?;
            for e in m.entries() {
                by_plain.insert(e.plain_path.clone(), e.enc_path.clone());
            }
        }

        for change in parse_name_status(&record.listing) {
            match change {
                Change::Added(p) | Change::Modified(p) | Change::TypeChanged(p) => {
                    materialize(settings, enc, cipher, &by_plain, &stage_git, stage.path(), &p)?;
                }
                Change::Renamed { from, to } => {
                    unstage(&stage_git, stage.path(), &from)?;
                    materialize(settings, enc, cipher, &by_plain, &stage_git, stage.path(), &to)?;
                }
                Change::Copied { to, .. } => {
                    materialize(settings, enc, cipher, &by_plain, &stage_git, stage.path(), &to)?;
                }
                Change::Deleted(p) => {
                    unstage(&stage_git, stage.path(), &p)?;
                }
                Change::Unmerged(p) => warn!("{p}: unmerged entry in history, skipping"),
                Change::Unknown(code, p) => warn!("{p}: unknown status {code}, skipping"),
            }
        }

        let staged = stage_git.run(["status", "--porcelain"])?;
        let has_staged = staged
            .lines()
            .any(|l| !matches!(l.as_bytes().first(), None | Some(b' ') | Some(b'?')));
        if !has_staged {
            info!("{enc_commit}: metadata-only, skipping");
            continue;
        }

        stage_git.run_with_env(
            ["commit", "-q", "--allow-empty-message", "-m", &record.body],
            &[
                ("GIT_AUTHOR_NAME", record.author.as_str()),
                ("GIT_AUTHOR_EMAIL", record.email.as_str()),
                ("GIT_AUTHOR_DATE", record.date.as_str()),
                ("GIT_COMMITTER_NAME", record.author.as_str()),
                ("GIT_COMMITTER_EMAIL", record.email.as_str()),
                ("GIT_COMMITTER_DATE", record.date.as_str()),
            ],
        )?;
        restored += 1;
    }

    if restored == 0 && undecodable > 0 {
        return Err(MybaError::WrongPassword);
    }

    // Materialize the final state into the real working tree. The plain
    // tip now corresponds to the encrypted tip, so mark it mirrored.
    if restored > 0 {
        plain.checkout("HEAD")?;
        enc.set_mirrored_tip(&plain.head()?)?;
    }
    println!("Restored {restored} commits");
    Ok(())
}

fn decode_record(cipher: &Cipher, armored: &str) -> Result<super::commit::CommitRecord> {
    let payload = BASE64
        .decode(armored.trim())
        .map_err(|_| MybaError::Cipher("commit message is not armored".into()))?;
    parse_commit_record(&compress::decode(&cipher.decrypt("", &payload)?))
}

/// Decrypt one plaintext path into the staging tree and stage it.
fn materialize(
    settings: &Settings,
    enc: &EncRepo,
    cipher: &Cipher,
    by_plain: &BTreeMap<String, String>,
    stage_git: &crate::gitcmd::Git,
    stage_dir: &std::path::Path,
    plain_path: &str,
) -> Result<()> {
    let enc_path = by_plain
        .get(plain_path)
        .cloned()
        .unwrap_or_else(|| pathenc::enc_path(plain_path, cipher.password().as_str()));
    let on_disk = enc.worktree_path(&enc_path);
    let data = if on_disk.is_file() {
        fs::read(on_disk)?
    } else {
        enc.git()
            .run_bytes(["cat-file", "blob", &format!("HEAD:{enc_path}")])?
    };
    let plaintext = compress::decode(&cipher.decrypt(plain_path, &data)?);
    let dest = stage_dir.join(plain_path);
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&dest, &plaintext)?;
    let mut args: Vec<std::ffi::OsString> = vec!["add".into(), "--".into()];
    args.push(dest.into_os_string());
    stage_git.run(args)?;
    Ok(())
}

/// Drop one path from the index; pathspecs must be absolute because the
/// process cwd is unrelated to the staging tree.
fn unstage(
    stage_git: &crate::gitcmd::Git,
    stage_dir: &std::path::Path,
    plain_path: &str,
) -> Result<()> {
    let mut args: Vec<std::ffi::OsString> = vec![
        "rm".into(),
        "-q".into(),
        "--cached".into(),
        "--ignore-unmatch".into(),
        "--".into(),
    ];
    args.push(stage_dir.join(plain_path).into_os_string());
    stage_git.run(args)?;
    Ok(())
}
