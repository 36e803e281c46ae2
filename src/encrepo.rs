//! Encrypted-repository facade.
//!
//! E is an ordinary git repository co-located with P whose tracked contents
//! are ciphertext: `d/…` blobs, `manifest/<plain_commit>` files, and a copy
//! of the tool binary at the root. Everything is configured to be treated
//! as opaque binary. The working tree is cone-sparse at all times, with
//! `manifest/` always inside the cone; remotes are promisor remotes with a
//! `blob:none` filter so clones and fetches pull blobs lazily.

use crate::cleanup;
use crate::config::Settings;
use crate::error::{MybaError, Result};
use crate::gitcmd::Git;
use crate::plain;
use git2::Repository;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Committed name of the self-bootstrap copy of the tool.
pub const SELF_COPY_NAME: &str = "myba";

/// Directory of committed (encrypted) manifests.
pub const MANIFEST_DIR: &str = "manifest";

const BINARY_ATTRIBUTES: &str = "* binary -diff\n";

pub struct EncRepo {
    dir: PathBuf,
    git: Git,
}

impl EncRepo {
    pub fn init(settings: &Settings) -> Result<Self> {
        let dir = settings.enc_repo();
        fs::create_dir_all(&dir)?;
        let mut opts = git2::RepositoryInitOptions::new();
        opts.no_reinit(false).initial_head("main");
        let repo = Repository::init_opts(&dir, &opts)?;
        Self::configure(&repo)?;

        let enc = Self::assemble(dir);
        enc.git.run(["sparse-checkout", "init", "--cone"])?;
        enc.sparse_set(&[MANIFEST_DIR.to_owned()])?;
        enc.write_attributes()?;
        Ok(enc)
    }

    pub fn open(settings: &Settings) -> Result<Self> {
        let dir = settings.enc_repo();
        if !dir.join(".git").exists() {
            return Err(MybaError::Usage(format!(
                "no encrypted repository at {} (run init first)",
                dir.display()
            )));
        }
        Ok(Self::assemble(dir))
    }

    /// Partial-clone `url` into place: trees and commits eagerly, blobs on
    /// demand. Only the manifest cone is materialized.
    pub fn clone(settings: &Settings, url: &str) -> Result<Self> {
        let dir = settings.enc_repo();
        if dir.exists() {
            return Err(MybaError::Usage(format!(
                "{} already exists; refusing to clone over it",
                dir.display()
            )));
        }
        let parent = dir
            .parent()
            .ok_or_else(|| MybaError::Usage("encrypted repo path has no parent".into()))?;
        fs::create_dir_all(parent)?;
        Git::in_dir(parent).run_interactive([
            "clone",
            "--filter=blob:none",
            "--sparse",
            url,
            dir.to_str().ok_or_else(|| MybaError::Usage("non-UTF-8 repo path".into()))?,
        ])?;

        let repo = Repository::open(&dir)?;
        Self::configure(&repo)?;
        let enc = Self::assemble(dir);
        enc.sparse_set(&[MANIFEST_DIR.to_owned()])?;
        enc.write_attributes()?;
        Ok(enc)
    }

    fn assemble(dir: PathBuf) -> Self {
        let git = Git::in_dir(&dir);
        EncRepo { dir, git }
    }

    fn configure(repo: &Repository) -> Result<()> {
        let mut config = repo.config()?;
        // Everything committed here is ciphertext; never delta or diff it.
        config.set_str("core.bigFileThreshold", "100")?;
        config.set_str("push.default", "current")?;
        config.set_i32("fetch.parallel", 4)?;
        config.set_str("user.name", "myba")?;
        config.set_str("user.email", "myba@localhost")?;
        Ok(())
    }

    fn write_attributes(&self) -> Result<()> {
        let info = self.dir.join(".git").join("info");
        fs::create_dir_all(&info)?;
        fs::write(info.join("attributes"), BINARY_ATTRIBUTES)?;
        Ok(())
    }

    pub fn git(&self) -> &Git {
        &self.git
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn worktree_path(&self, rel: &str) -> PathBuf {
        self.dir.join(rel)
    }

    pub fn manifest_worktree_dir(&self) -> PathBuf {
        self.dir.join(MANIFEST_DIR)
    }

    pub fn is_empty(&self) -> bool {
        !self
            .git
            .succeeds(["rev-parse", "--verify", "--quiet", "HEAD"])
            .unwrap_or(false)
    }

    pub fn head(&self) -> Result<String> {
        self.git.run(["rev-parse", "HEAD"])
    }

    pub fn resolve_commit(&self, spec: &str) -> Option<String> {
        plain::resolve_in(&self.dir, spec)
    }

    /// Stage paths even when they fall outside the sparse cone.
    pub fn add_sparse(&self, paths: &[String]) -> Result<()> {
        // Chunked to stay clear of argv limits on large commits.
        for chunk in paths.chunks(500) {
            let mut args: Vec<OsString> = vec!["add".into(), "--sparse".into(), "--".into()];
            args.extend(chunk.iter().map(OsString::from));
            self.git.run(args)?;
        }
        Ok(())
    }

    pub fn rm_cached(&self, path: &str) -> Result<()> {
        self.git.run([
            "rm",
            "-q",
            "--cached",
            "--ignore-unmatch",
            "--sparse",
            "--",
            path,
        ])?;
        Ok(())
    }

    pub fn commit(&self, message: &str) -> Result<()> {
        self.git.run(["commit", "-q", "--allow-empty", "-m", message])?;
        Ok(())
    }

    pub fn checkout(&self, rev: &str) -> Result<()> {
        self.git.run(["checkout", "-q", "-f", rev])?;
        Ok(())
    }

    pub fn current_branch(&self) -> Result<String> {
        self.git.run(["rev-parse", "--abbrev-ref", "HEAD"])
    }

    pub fn sparse_set(&self, dirs: &[String]) -> Result<()> {
        let mut args: Vec<OsString> = vec!["sparse-checkout".into(), "set".into(), "--cone".into()];
        args.extend(dirs.iter().map(OsString::from));
        self.git.run(args)?;
        Ok(())
    }

    pub fn sparse_reapply(&self) -> Result<()> {
        self.git.run(["sparse-checkout", "reapply"])?;
        Ok(())
    }

    pub fn sparse_disable(&self) -> Result<()> {
        self.git.run(["sparse-checkout", "disable"])?;
        Ok(())
    }

    /// Mark a freshly-written blob for LFS and stage the updated
    /// `.gitattributes`.
    pub fn lfs_track(&self, path: &str) -> Result<()> {
        self.git.run(["lfs", "track", path])?;
        self.add_sparse(&[".gitattributes".to_owned()])?;
        Ok(())
    }

    /// Tolerant untrack: LFS may never have been in use.
    pub fn lfs_untrack(&self, path: &str) {
        match self.git.succeeds(["lfs", "untrack", path]) {
            Ok(true) => {
                let _ = self.add_sparse(&[".gitattributes".to_owned()]);
            }
            Ok(false) | Err(_) => debug!("lfs untrack skipped for {path}"),
        }
    }

    /// Plain-commit hash most recently mirrored into this repository.
    ///
    /// Lets a re-run of commit notice a plain HEAD whose mirror never
    /// landed (a failed run is resumed by committing again).
    pub fn mirrored_tip(&self) -> Option<String> {
        let repo = Repository::open(&self.dir).ok()?;
        let config = repo.config().ok()?;
        config.get_string("myba.mirroredTip").ok()
    }

    pub fn set_mirrored_tip(&self, plain_hash: &str) -> Result<()> {
        let repo = Repository::open(&self.dir)?;
        let mut config = repo.config()?;
        config.set_str("myba.mirroredTip", plain_hash)?;
        Ok(())
    }

    pub fn remotes(&self) -> Result<Vec<String>> {
        let out = self.git.run(["remote"])?;
        Ok(out.lines().map(str::to_owned).collect())
    }

    /// Register a promisor remote with a blob-less partial-clone filter.
    pub fn remote_add(&self, name: &str, url: &str) -> Result<()> {
        self.git.run(["remote", "add", name, url])?;
        let repo = Repository::open(&self.dir)?;
        let mut config = repo.config()?;
        config.set_bool(&format!("remote.{name}.promisor"), true)?;
        config.set_str(&format!("remote.{name}.partialclonefilter"), "blob:none")?;
        Ok(())
    }

    pub fn remote_remove(&self, name: &str) -> Result<()> {
        self.git.run(["remote", "remove", name])?;
        Ok(())
    }

    /// Run `f` with every remote deregistered, restoring the configuration
    /// afterwards on all exit paths.
    ///
    /// Promisor remotes turn each `add` of a missing path into a lazy-fetch
    /// round trip; with the remotes hidden, staging is purely local.
    pub fn without_remotes<T>(&self, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let config_path = self.dir.join(".git").join("config");
        let saved = fs::read(&config_path)?;

        let mut guard = cleanup::Stack::new();
        guard.defer(move || {
            if let Err(e) = fs::write(&config_path, &saved) {
                warn!("could not restore remote configuration: {e}");
            }
        });

        for remote in self.remotes()? {
            self.git.run(["remote", "remove", &remote])?;
        }
        f()
    }

    pub fn push(&self, remote: &str) -> Result<()> {
        self.git.run_interactive(["push", remote])
    }

    pub fn fetch_refetch_all(&self) -> Result<()> {
        self.git.run_interactive(["fetch", "--refetch", "--all"])
    }

    pub fn pull(&self, remote: Option<&str>) -> Result<()> {
        match remote {
            Some(r) => self.git.run_interactive(["pull", r]),
            None => self.git.run_interactive(["pull"]),
        }
    }

    /// Replace every local packfile with a `.promisor` marker so blobs are
    /// re-fetched on demand.
    pub fn reclaim_packs(&self) -> Result<u64> {
        let pack_dir = self.dir.join(".git").join("objects").join("pack");
        let mut reclaimed = 0u64;
        if !pack_dir.is_dir() {
            return Ok(0);
        }
        for entry in fs::read_dir(&pack_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("pack") {
                continue;
            }
            reclaimed += fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            fs::write(path.with_extension("promisor"), b"")?;
            for ext in ["pack", "idx", "rev"] {
                let sibling = path.with_extension(ext);
                if sibling.exists() {
                    fs::remove_file(sibling)?;
                }
            }
        }
        Ok(reclaimed)
    }

    pub fn log_hashes_oldest_first(&self) -> Result<Vec<String>> {
        if self.is_empty() {
            return Ok(Vec::new());
        }
        let out = self.git.run(["log", "--topo-order", "--reverse", "--format=%H"])?;
        Ok(out.lines().map(str::to_owned).collect())
    }

    pub fn commit_message(&self, commit: &str) -> Result<String> {
        self.git.run(["show", "-s", "--format=%B", commit])
    }

    /// Paths touched by one commit against its first parent.
    pub fn touched_paths(&self, commit: &str) -> Result<Vec<String>> {
        let out = self.git.run([
            "diff-tree",
            "--no-commit-id",
            "--name-only",
            "--root",
            "-r",
            commit,
        ])?;
        Ok(out.lines().map(str::to_owned).collect())
    }

    pub fn ls_tracked(&self) -> Result<Vec<String>> {
        let out = self.git.run(["ls-files"])?;
        Ok(out.lines().map(str::to_owned).collect())
    }
}
