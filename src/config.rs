//! Runtime settings resolved from the environment.
//!
//! Every option is an environment variable so the tool can be driven from
//! scripts and cron jobs without a config file:
//!
//! | Variable | Effect |
//! |---|---|
//! | `WORK_TREE` | Root of tracked plaintext (default: `$HOME`) |
//! | `PLAIN_REPO` | Path of the plain repository (default `WORK_TREE/.myba`) |
//! | `PASSWORD` | Used directly if set; otherwise prompted |
//! | `USE_GPG` | Switch the cipher primitive to GPG mode |
//! | `KDF_ITERS` | Override the key-derivation iteration count |
//! | `GIT_LFS_THRESH` | Byte threshold for LFS promotion (default 40 MiB) |
//! | `N_JOBS` | Worker-pool size (0 = online CPUs) |
//! | `YES_OVERWRITE` | Suppress overwrite prompts |
//! | `SELF_COPY` | Commit a copy of the tool binary into the encrypted repo (default on) |
//! | `VERBOSE` | Trace operations |

use crate::error::{MybaError, Result};
use std::env;
use std::path::PathBuf;

/// Default PBKDF2-HMAC-SHA512 iteration count.
pub const DEFAULT_KDF_ITERS: u32 = 321_731;

/// Default LFS promotion threshold: blobs strictly larger than this are
/// promoted to LFS pointers.
pub const DEFAULT_LFS_THRESHOLD: u64 = 40 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct Settings {
    pub work_tree: PathBuf,
    pub plain_repo: PathBuf,
    pub use_gpg: bool,
    pub kdf_iters: u32,
    pub lfs_threshold: u64,
    pub n_jobs: usize,
    pub yes_overwrite: bool,
    pub self_copy: bool,
    pub verbose: bool,
}

impl Settings {
    /// Resolve all settings from the environment.
    pub fn from_env() -> Result<Self> {
        let work_tree = match env::var_os("WORK_TREE") {
            Some(v) => PathBuf::from(v),
            None => home_dir()?,
        };
        let plain_repo = match env::var_os("PLAIN_REPO") {
            Some(v) => PathBuf::from(v),
            None => work_tree.join(".myba"),
        };

        Ok(Settings {
            work_tree,
            plain_repo,
            use_gpg: bool_var("USE_GPG"),
            kdf_iters: parsed_var("KDF_ITERS", DEFAULT_KDF_ITERS)?,
            lfs_threshold: parsed_var("GIT_LFS_THRESH", DEFAULT_LFS_THRESHOLD)?,
            n_jobs: parsed_var("N_JOBS", 0usize)?,
            yes_overwrite: bool_var("YES_OVERWRITE"),
            self_copy: env::var("SELF_COPY").map(|v| v != "0").unwrap_or(true),
            verbose: bool_var("VERBOSE"),
        })
    }

    /// Path of the encrypted repository, co-located with the plain one.
    pub fn enc_repo(&self) -> PathBuf {
        self.plain_repo.join("_encrypted")
    }

    /// Directory of plaintext manifests, one file per plain-commit hash.
    pub fn manifest_dir(&self) -> PathBuf {
        self.plain_repo.join("manifest")
    }
}

fn home_dir() -> Result<PathBuf> {
    env::var_os("HOME")
        .map(PathBuf::from)
        .ok_or_else(|| MybaError::Usage("WORK_TREE not set and HOME is unavailable".into()))
}

fn bool_var(name: &str) -> bool {
    env::var(name).map(|v| !v.is_empty() && v != "0").unwrap_or(false)
}

fn parsed_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(v) => v
            .parse()
            .map_err(|_| MybaError::Usage(format!("invalid value for {name}: {v}"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Env-var tests mutate process state; keep them in one test so they
    // cannot race each other.
    #[test]
    fn test_from_env_defaults_and_overrides() {
        env::set_var("WORK_TREE", "/tmp/w");
        env::remove_var("PLAIN_REPO");
        env::remove_var("KDF_ITERS");
        env::remove_var("GIT_LFS_THRESH");
        env::remove_var("N_JOBS");
        env::remove_var("YES_OVERWRITE");
        env::remove_var("USE_GPG");
        env::remove_var("SELF_COPY");

        let s = Settings::from_env().unwrap();
        assert_eq!(s.work_tree, PathBuf::from("/tmp/w"));
        assert_eq!(s.plain_repo, PathBuf::from("/tmp/w/.myba"));
        assert_eq!(s.enc_repo(), PathBuf::from("/tmp/w/.myba/_encrypted"));
        assert_eq!(s.manifest_dir(), PathBuf::from("/tmp/w/.myba/manifest"));
        assert_eq!(s.kdf_iters, DEFAULT_KDF_ITERS);
        assert_eq!(s.lfs_threshold, DEFAULT_LFS_THRESHOLD);
        assert_eq!(s.n_jobs, 0);
        assert!(!s.yes_overwrite);
        assert!(s.self_copy);

        env::set_var("KDF_ITERS", "1000");
        env::set_var("N_JOBS", "3");
        env::set_var("YES_OVERWRITE", "1");
        env::set_var("SELF_COPY", "0");
        let s = Settings::from_env().unwrap();
        assert_eq!(s.kdf_iters, 1000);
        assert_eq!(s.n_jobs, 3);
        assert!(s.yes_overwrite);
        assert!(!s.self_copy);

        env::set_var("KDF_ITERS", "not-a-number");
        assert!(Settings::from_env().is_err());

        env::remove_var("KDF_ITERS");
        env::remove_var("N_JOBS");
        env::remove_var("YES_OVERWRITE");
        env::remove_var("SELF_COPY");
        env::remove_var("WORK_TREE");
    }
}
