//! Deterministic mapping from plaintext paths to encrypted-repo paths.
//!
//! `enc_path` is a pure function of `(plain_path, password)`: the SHA-512 of
//! the doubled concatenation `path ‖ password ‖ path ‖ password`, hex-encoded
//! and fanned out as `d/<h[0:2]>/<h[2:4]>/<h[4:]>`. The 2/2 fanout bounds
//! directory size and keeps cone-mode sparse-checkout rules cheap, since a
//! cone covers a whole `d/xx/yy` directory.

use sha2::{Digest, Sha512};
use std::collections::BTreeSet;

/// Top-level directory holding all encrypted blobs.
pub const ENC_ROOT: &str = "d";

pub fn enc_path(plain_path: &str, password: &str) -> String {
    let mut h = Sha512::new();
    h.update(plain_path.as_bytes());
    h.update(password.as_bytes());
    h.update(plain_path.as_bytes());
    h.update(password.as_bytes());
    let hexed = hex::encode(h.finalize());
    format!("{ENC_ROOT}/{}/{}/{}", &hexed[0..2], &hexed[2..4], &hexed[4..])
}

/// Parent directory of an encrypted path, e.g. `d/ab/cd`.
///
/// Cone-mode sparse checkout takes directory prefixes, not file paths, so
/// enc-paths are truncated to their parents before installing a cone.
pub fn parent_dir(enc_path: &str) -> String {
    match enc_path.rfind('/') {
        Some(idx) => enc_path[..idx].to_owned(),
        None => enc_path.to_owned(),
    }
}

/// Deduplicated, sorted set of cone directories covering `enc_paths`.
pub fn cone_dirs<'a, I: IntoIterator<Item = &'a str>>(enc_paths: I) -> BTreeSet<String> {
    enc_paths.into_iter().map(parent_dir).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape() {
        let p = enc_path("foo/.dotfile", "secret");
        let parts: Vec<&str> = p.split('/').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], "d");
        assert_eq!(parts[1].len(), 2);
        assert_eq!(parts[2].len(), 2);
        // 128 hex chars of SHA-512, minus the four consumed by the fanout.
        assert_eq!(parts[3].len(), 124);
        assert!(p.chars().all(|c| c.is_ascii_hexdigit() || c == '/' || c == 'd'));
    }

    #[test]
    fn test_deterministic() {
        assert_eq!(enc_path("a/b", "pw"), enc_path("a/b", "pw"));
    }

    #[test]
    fn test_distinct_inputs_distinct_outputs() {
        let base = enc_path("a/b", "pw");
        assert_ne!(base, enc_path("a/c", "pw"));
        assert_ne!(base, enc_path("a/b", "pw2"));
    }

    #[test]
    fn test_parent_dir() {
        let p = enc_path("x", "pw");
        let parent = parent_dir(&p);
        assert!(p.starts_with(&parent));
        assert_eq!(parent.split('/').count(), 3);
    }

    #[test]
    fn test_cone_dirs_dedup() {
        let a = enc_path("x", "pw");
        let dirs = cone_dirs([a.as_str(), a.as_str()]);
        assert_eq!(dirs.len(), 1);
    }
}
