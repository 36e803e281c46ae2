//! # myba
//!
//! Encrypted, version-controlled, distributed file backup built on two
//! coupled git repositories.
//!
//! ## How it works
//!
//! A **plain repository** (bare, never pushed) tracks the files you select
//! under your working tree, with full history, renames and copies. Every
//! plain commit is mirrored into an **encrypted repository** whose tree
//! holds only ciphertext:
//!
//! - one blob per tracked file, at a path derived deterministically from
//!   the plaintext path and your password,
//! - one encrypted manifest per commit, binding blob names back to
//!   plaintext paths,
//! - the plain commit's author, date, message and change listing, encrypted
//!   and base64-armored into the mirror commit's message.
//!
//! Only the encrypted repository ever reaches a remote, so any host you can
//! `git push` to can hold your backup. Reconstructing the plain repository
//! from the encrypted one requires nothing but the password.
//!
//! ## Data flow
//!
//! **Commit:**
//! ```text
//! working tree → plain commit → name-status listing
//!              → encrypt each changed file (parallel)
//!              → stage blobs + manifest → encrypted commit
//! ```
//!
//! **Checkout of selected paths:**
//! ```text
//! path patterns → scan local manifests → blob names
//!               → sparse-checkout cone → decrypt (parallel) → working tree
//! ```
//!
//! Remotes are registered as promisor remotes with a `blob:none` partial
//! clone filter: clones and fetches move commits and trees eagerly and
//! blobs lazily, so a fresh machine can restore a single file without
//! downloading the whole backup. After a push, `gc` drops the local packs
//! and leaves `.promisor` markers behind.
//!
//! ## Module overview
//!
//! - [`crypto`] - password-based cipher adapter (AES-256-CTR, PBKDF2)
//! - [`pathenc`] - deterministic plaintext-path to blob-name mapping
//! - [`compress`] - conditional gzip with self-describing decode
//! - [`manifest`] - per-commit manifest codec and local manifest scans
//! - [`plain`] / [`encrepo`] - the two repository facades
//! - [`pool`] - bounded worker pool for per-file encrypt/decrypt
//! - [`cleanup`] - LIFO deferred cleanup actions
//! - [`commands`] - one module per subcommand
//! - [`config`] / [`password`] / [`gitcmd`] / [`error`] - ambient plumbing

pub mod cleanup;
pub mod commands;
pub mod compress;
pub mod config;
pub mod crypto;
pub mod encrepo;
pub mod error;
pub mod gitcmd;
pub mod manifest;
pub mod password;
pub mod pathenc;
pub mod plain;
pub mod pool;

pub use config::Settings;
pub use crypto::Cipher;
pub use error::{MybaError, Result};
pub use manifest::Manifest;
