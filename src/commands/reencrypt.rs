//! Re-derive the whole encrypted repository under a new password.
//!
//! Rather than rewriting manifests in place, the encrypted history is
//! rebuilt: one commit removes every tracked entry except the tool's own
//! copy, then the plain history is replayed oldest-to-newest through the
//! commit pipeline, producing fresh blobs, manifests and messages keyed by
//! the new password. The old ciphertext remains in earlier encrypted
//! commits; push and GC shed it from the local store.

use super::commit::mirror_commit;
use crate::cleanup;
use crate::config::Settings;
use crate::crypto::Cipher;
use crate::encrepo::{EncRepo, MANIFEST_DIR, SELF_COPY_NAME};
use crate::error::Result;
use crate::password::Password;
use crate::plain::PlainRepo;
use std::collections::BTreeSet;
use std::ffi::OsString;
use std::fs;
use tracing::info;

pub fn reencrypt(settings: &Settings) -> Result<()> {
    let plain = PlainRepo::open(settings)?;
    let enc = EncRepo::open(settings)?;

    eprintln!("Enter the new password.");
    let cipher = Cipher::new(settings, Password::acquire(true)?);

    let mut guard = cleanup::Stack::new();
    if !enc.is_empty() {
        let original = enc.head()?;
        let git = enc.git().clone();
        guard.defer(move || {
            let _ = git.run(["reset", "-q", "--hard", &original]);
        });
    }

    // Wipe phase: everything but the self copy goes, in one commit.
    enc.sparse_disable()?;
    let top_level: BTreeSet<String> = enc
        .ls_tracked()?
        .into_iter()
        .filter(|f| f != SELF_COPY_NAME)
        .map(|f| match f.find('/') {
            Some(idx) => f[..idx].to_owned(),
            None => f,
        })
        .collect();
    if !top_level.is_empty() {
        let mut args: Vec<OsString> = vec![
            "rm".into(),
            "-r".into(),
            "-q".into(),
            "--ignore-unmatch".into(),
            "--".into(),
        ];
        args.extend(top_level.iter().map(OsString::from));
        enc.git().run(args)?;
        enc.commit("reencrypt")?;
    }

    // Stale plaintext manifests are keyed by the old password's enc-paths;
    // the replay writes fresh ones.
    let manifest_dir = settings.manifest_dir();
    if manifest_dir.is_dir() {
        fs::remove_dir_all(&manifest_dir)?;
    }
    fs::create_dir_all(&manifest_dir)?;

    let history = plain.log_hashes_oldest_first()?;
    let total = history.len();
    for (i, plain_commit) in history.iter().enumerate() {
        info!("reencrypting {plain_commit} ({}/{total})", i + 1);
        mirror_commit(settings, &plain, &enc, &cipher, plain_commit)?;
    }

    enc.git().run(["sparse-checkout", "init", "--cone"])?;
    enc.sparse_set(&[MANIFEST_DIR.to_owned()])?;

    guard.disarm();
    println!("Reencrypted {total} commits");
    Ok(())
}
