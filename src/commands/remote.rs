//! Remote registration, synchronization and local pack reclamation.
//!
//! Remotes on the encrypted repository are promisor remotes with a
//! `blob:none` filter: trees and commits travel eagerly, blobs lazily.
//! After a push the local packs can be reclaimed; `.promisor` markers tell
//! git that the missing objects are retrievable on demand.

use crate::config::Settings;
use crate::crypto::Cipher;
use crate::encrepo::{EncRepo, MANIFEST_DIR};
use crate::error::{MybaError, Result};
use crate::manifest;
use crate::password::Password;
use crate::plain::PlainRepo;
use std::thread;
use std::time::Duration;

#[derive(clap::Subcommand, Debug)]
pub enum RemoteCmd {
    /// Register a promisor remote on the encrypted repository
    Add { name: String, url: String },
    /// Deregister a remote
    Remove { name: String },
    /// List registered remotes
    List,
}

pub fn remote(settings: &Settings, cmd: RemoteCmd) -> Result<()> {
    let enc = EncRepo::open(settings)?;
    match cmd {
        RemoteCmd::Add { name, url } => {
            enc.remote_add(&name, &url)?;
            println!("Registered {name} -> {url}");
        }
        RemoteCmd::Remove { name } => {
            enc.remote_remove(&name)?;
            println!("Removed {name}");
        }
        RemoteCmd::List => {
            for r in enc.remotes()? {
                println!("{r}");
            }
        }
    }
    Ok(())
}

pub fn push(settings: &Settings, remote: Option<&str>) -> Result<()> {
    let enc = EncRepo::open(settings)?;
    let remotes = match remote {
        Some(r) => vec![r.to_owned()],
        None => enc.remotes()?,
    };
    if remotes.is_empty() {
        return Err(MybaError::Usage("no remotes registered; run remote add first".into()));
    }
    for r in &remotes {
        enc.push(r)?;
    }
    // Reacquire promisor state for everything just pushed, then let git's
    // own background maintenance settle before touching the pack store.
    enc.fetch_refetch_all()?;
    thread::sleep(Duration::from_millis(200));
    gc(settings)
}

pub fn gc(settings: &Settings) -> Result<()> {
    let enc = EncRepo::open(settings)?;
    enc.sparse_set(&[MANIFEST_DIR.to_owned()])?;
    enc.sparse_reapply()?;
    let reclaimed = enc.reclaim_packs()?;
    println!("Reclaimed {reclaimed} bytes of local pack data");
    Ok(())
}

pub fn pull(settings: &Settings, remote: Option<&str>) -> Result<()> {
    let enc = EncRepo::open(settings)?;
    enc.pull(remote)?;
    enc.sparse_reapply()?;
    let cipher = Cipher::new(settings, Password::acquire(false)?);
    let n = manifest::refresh_local(
        &settings.manifest_dir(),
        &enc.manifest_worktree_dir(),
        &cipher,
    )?;
    println!("Decrypted {n} manifests");
    Ok(())
}

pub fn clone(settings: &Settings, url: &str) -> Result<()> {
    PlainRepo::init(settings)?;
    let enc = EncRepo::clone(settings, url)?;
    let cipher = Cipher::new(settings, Password::acquire(false)?);
    let n = manifest::refresh_local(
        &settings.manifest_dir(),
        &enc.manifest_worktree_dir(),
        &cipher,
    )?;
    println!("Decrypted {n} manifests; run decrypt to rebuild the plain history");
    Ok(())
}
