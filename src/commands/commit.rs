//! Commit the working tree to the plain repository, then mirror the new
//! plain commit into the encrypted repository.
//!
//! Mirroring is a two-phase walk over the plain commit's name-status
//! listing. The encrypt phase fans per-file work out to the pool; the git
//! phase is strictly serial and observes the listing in input order, so
//! manifest lines match the commit walk. Staging happens with all remotes
//! temporarily deregistered: a promisor remote would otherwise turn every
//! `add` of an absent path into a lazy-fetch round trip.

use crate::compress;
use crate::config::Settings;
use crate::crypto::Cipher;
use crate::encrepo::{EncRepo, MANIFEST_DIR, SELF_COPY_NAME};
use crate::error::{MybaError, Result};
use crate::manifest::Manifest;
use crate::password::Password;
use crate::pathenc;
use crate::plain::{parse_name_status, Change, PlainRepo};
use crate::pool::Pool;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::collections::HashMap;
use std::env;
use std::fs;
use tracing::{info, warn};

pub fn commit(settings: &Settings, message: Option<&str>) -> Result<()> {
    let plain = PlainRepo::open(settings)?;
    let enc = EncRepo::open(settings)?;

    // Directories added as a whole are re-added recursively on every
    // commit, keyed by their tracked marker file.
    for dir in plain.marker_dirs()? {
        let abs = plain.work_tree().join(&dir);
        plain.add([abs.as_os_str()])?;
    }
    plain.add_update()?;

    let Some(hash) = plain.commit(message.unwrap_or("myba backup"))? else {
        // A previous run may have committed to P and then failed before
        // the mirror landed; committing again picks that up.
        if plain.has_commits() {
            let head = plain.head()?;
            if enc.mirrored_tip().as_deref() != Some(head.as_str()) {
                let cipher = Cipher::new(settings, Password::acquire(enc.is_empty())?);
                mirror_commit(settings, &plain, &enc, &cipher, &head)?;
                println!("Mirrored {head}");
                return Ok(());
            }
        }
        println!("Nothing to commit");
        return Ok(());
    };
    info!("plain commit {hash}");

    let password = Password::acquire(enc.is_empty())?;
    let cipher = Cipher::new(settings, password);
    mirror_commit(settings, &plain, &enc, &cipher, &hash)?;
    println!("Committed {hash}");
    Ok(())
}

struct EncryptJob {
    plain_path: String,
    enc_path: String,
}

/// Mirror one plain commit into an encrypted commit. Also used by the
/// reencrypt replay, which feeds historical commits through here under a
/// fresh password.
pub fn mirror_commit(
    settings: &Settings,
    plain: &PlainRepo,
    enc: &EncRepo,
    cipher: &Cipher,
    plain_hash: &str,
) -> Result<()> {
    let raw_listing = plain.name_status_raw(plain_hash)?;
    let changes = parse_name_status(&raw_listing);
    let password = cipher.password().as_str();

    // Encrypt phase: one job per path that needs a fresh ciphertext blob.
    let mut jobs = Vec::new();
    for change in &changes {
        let path = match change {
            Change::Added(p) | Change::Modified(p) => Some(p),
            Change::TypeChanged(p) => {
                warn!("{p}: type changed; storing current blob content");
                Some(p)
            }
            Change::Renamed { to, .. } | Change::Copied { to, .. } => Some(to),
            Change::Deleted(_) => None,
            Change::Unmerged(p) => {
                warn!("{p}: unmerged, skipping");
                None
            }
            Change::Unknown(code, p) => {
                warn!("{p}: unknown status {code}, skipping");
                None
            }
        };
        if let Some(p) = path {
            jobs.push(EncryptJob {
                plain_path: p.clone(),
                enc_path: pathenc::enc_path(p, password),
            });
        }
    }

    let pool = Pool::new(settings.n_jobs);
    let sizes = pool.run(&jobs, |job, log| {
        let bytes = plain.cat_blob(plain_hash, &job.plain_path)?;
        let packed = compress::encode(&bytes)?;
        let ciphertext = cipher.encrypt(&job.plain_path, &packed)?;
        let dest = enc.worktree_path(&job.enc_path);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&dest, &ciphertext)?;
        log.say(format!(
            "encrypted {} ({} bytes)",
            job.plain_path,
            ciphertext.len()
        ));
        Ok(ciphertext.len() as u64)
    })?;
    let blob_sizes: HashMap<&str, u64> = jobs
        .iter()
        .zip(&sizes)
        .map(|(job, size)| (job.enc_path.as_str(), *size))
        .collect();

    // Git phase, serial, in listing order.
    let mut manifest = Manifest::new();
    let mut to_add = Vec::new();
    let stage_blob = |plain_path: &str, manifest: &mut Manifest, to_add: &mut Vec<String>| -> Result<()> {
        let enc_path = pathenc::enc_path(plain_path, password);
        if let Some(size) = blob_sizes.get(enc_path.as_str()) {
            if *size > settings.lfs_threshold {
                enc.lfs_track(&enc_path)?;
            }
        }
        manifest.push(enc_path.clone(), plain_path.to_owned())?;
        to_add.push(enc_path);
        Ok(())
    };

    for change in &changes {
        match change {
            Change::Added(p) | Change::Modified(p) | Change::TypeChanged(p) => {
                stage_blob(p, &mut manifest, &mut to_add)?;
            }
            Change::Renamed { from, to } => {
                let old = pathenc::enc_path(from, password);
                enc.rm_cached(&old)?;
                enc.lfs_untrack(&old);
                stage_blob(to, &mut manifest, &mut to_add)?;
            }
            Change::Copied { to, .. } => {
                stage_blob(to, &mut manifest, &mut to_add)?;
            }
            Change::Deleted(p) => {
                let old = pathenc::enc_path(p, password);
                enc.rm_cached(&old)?;
                enc.lfs_untrack(&old);
            }
            Change::Unmerged(_) | Change::Unknown(..) => {}
        }
    }

    // First encrypted commit carries a copy of the tool itself, so the
    // backup can be unpacked with nothing but this repo and the password.
    if enc.is_empty() && settings.self_copy {
        let exe = env::current_exe()?;
        fs::copy(&exe, enc.worktree_path(SELF_COPY_NAME))?;
        to_add.push(SELF_COPY_NAME.to_owned());
    }

    // Plaintext manifest is mirrored under P; its ciphertext goes into E
    // unless the commit was metadata-only.
    fs::create_dir_all(settings.manifest_dir())?;
    fs::write(plain.manifest_path(settings, plain_hash), manifest.to_text())?;
    if !manifest.is_empty() {
        let enc_manifest = format!("{MANIFEST_DIR}/{plain_hash}");
        let dest = enc.worktree_path(&enc_manifest);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&dest, manifest.encode(cipher)?)?;
        to_add.push(enc_manifest);
    }

    enc.without_remotes(|| enc.add_sparse(&to_add))?;

    let (author, email, date, body) = plain.commit_meta(plain_hash)?;
    let record = encode_commit_record(&author, &email, &date, &body, &raw_listing);
    let armored = BASE64.encode(cipher.encrypt("", &compress::encode(record.as_bytes())?)?);
    enc.commit(&armored)?;
    enc.set_mirrored_tip(plain_hash)?;
    info!("mirrored {plain_hash} ({} entries)", manifest.len());
    Ok(())
}

/// Plain-commit metadata as embedded in the encrypted commit message:
/// author, email, ISO author date, decimal body byte length, the body
/// itself, then the name-status listing. The length prefix keeps the record
/// parseable whatever the body contains.
pub fn encode_commit_record(
    author: &str,
    email: &str,
    date: &str,
    body: &str,
    listing: &str,
) -> String {
    format!("{author}\n{email}\n{date}\n{}\n{body}\n{listing}", body.len())
}

pub struct CommitRecord {
    pub author: String,
    pub email: String,
    pub date: String,
    pub body: String,
    pub listing: String,
}

pub fn parse_commit_record(payload: &[u8]) -> Result<CommitRecord> {
    let ill = || MybaError::Other("ill-formed commit record".into());
    let mut rest = payload;
    let mut header = Vec::with_capacity(4);
    for _ in 0..4 {
        let idx = rest.iter().position(|&b| b == b'\n').ok_or_else(ill)?;
        header.push(std::str::from_utf8(&rest[..idx]).map_err(|_| ill())?.to_owned());
        rest = &rest[idx + 1..];
    }
    let body_len: usize = header[3].parse().map_err(|_| ill())?;
    if rest.len() < body_len {
        return Err(ill());
    }
    let body = std::str::from_utf8(&rest[..body_len])
        .map_err(|_| ill())?
        .to_owned();
    let mut listing = &rest[body_len..];
    if listing.first() == Some(&b'\n') {
        listing = &listing[1..];
    }
    Ok(CommitRecord {
        author: header[0].clone(),
        email: header[1].clone(),
        date: header[2].clone(),
        body,
        listing: String::from_utf8_lossy(listing).into_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_record_roundtrip() {
        let listing = "A\tfoo/.dotfile\nR100\told\tnew";
        let encoded = encode_commit_record(
            "Ada Lovelace",
            "ada@example.com",
            "2026-08-02T12:00:00+00:00",
            "subject line\n\nlonger body\n",
            listing,
        );
        let record = parse_commit_record(encoded.as_bytes()).unwrap();
        assert_eq!(record.author, "Ada Lovelace");
        assert_eq!(record.email, "ada@example.com");
        assert_eq!(record.date, "2026-08-02T12:00:00+00:00");
        assert_eq!(record.body, "subject line\n\nlonger body\n");
        assert_eq!(record.listing, listing);
    }

    #[test]
    fn test_commit_record_body_with_digit_lines() {
        // A body that itself looks like a length header must survive.
        let encoded = encode_commit_record("a", "b", "c", "42\n13\n", "D\tgone");
        let record = parse_commit_record(encoded.as_bytes()).unwrap();
        assert_eq!(record.body, "42\n13\n");
        assert_eq!(record.listing, "D\tgone");
    }

    #[test]
    fn test_commit_record_empty_body_and_listing() {
        let encoded = encode_commit_record("a", "b", "c", "", "");
        let record = parse_commit_record(encoded.as_bytes()).unwrap();
        assert_eq!(record.body, "");
        assert_eq!(record.listing, "");
    }

    #[test]
    fn test_parse_rejects_truncated_record() {
        assert!(parse_commit_record(b"only\ntwo\n").is_err());
        assert!(parse_commit_record(b"a\nb\nc\n9999\nshort").is_err());
    }
}
