//! Per-commit manifests binding ciphertext names to plaintext paths.
//!
//! A manifest is a text file with one `<enc_path>\t<plain_path>` line per
//! entry, in the insertion order of the commit walk. The committed form is
//! gzip then `encrypt("")`; the plaintext form is mirrored under the plain
//! repository's `manifest/` directory, one file per plain-commit hash, and
//! regenerated on clone by decrypting the committed counterparts.
//!
//! Paths containing TAB or newline cannot be represented and are rejected
//! as ill-formed.

use crate::compress;
use crate::crypto::Cipher;
use crate::error::{MybaError, Result};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ManifestEntry {
    pub enc_path: String,
    pub plain_path: String,
}

#[derive(Debug, Default)]
pub struct Manifest {
    entries: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn new() -> Self {
        Manifest::default()
    }

    pub fn push(&mut self, enc_path: String, plain_path: String) -> Result<()> {
        if plain_path.contains(['\t', '\n']) || enc_path.contains(['\t', '\n']) {
            return Err(MybaError::Unsupported(format!(
                "path contains TAB or newline: {plain_path:?}"
            )));
        }
        self.entries.push(ManifestEntry { enc_path, plain_path });
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn to_text(&self) -> String {
        let mut text = String::new();
        for e in &self.entries {
            text.push_str(&e.enc_path);
            text.push('\t');
            text.push_str(&e.plain_path);
            text.push('\n');
        }
        text
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut manifest = Manifest::new();
        for line in text.lines() {
            if line.is_empty() {
                continue;
            }
            let (enc, plain) = line.split_once('\t').ok_or_else(|| {
                MybaError::Other(format!("ill-formed manifest line: {line:?}"))
            })?;
            manifest.push(enc.to_owned(), plain.to_owned())?;
        }
        Ok(manifest)
    }

    /// Committed form: gzip, then encrypt with the empty pepper.
    pub fn encode(&self, cipher: &Cipher) -> Result<Vec<u8>> {
        let packed = compress::encode(self.to_text().as_bytes())?;
        cipher.encrypt("", &packed)
    }

    /// Decrypt and inflate a committed manifest.
    ///
    /// NUL bytes in the decrypted text mean the password was wrong: a real
    /// manifest is pure text, while a mis-keyed CTR stream is effectively
    /// random bytes.
    pub fn decode(cipher: &Cipher, data: &[u8]) -> Result<Self> {
        let decrypted = cipher.decrypt("", data)?;
        let inflated = compress::decode(&decrypted);
        if inflated.contains(&0) {
            return Err(MybaError::WrongPassword);
        }
        let text = String::from_utf8(inflated).map_err(|_| MybaError::WrongPassword)?;
        Manifest::parse(&text)
    }
}

/// Scan the plaintext manifests under `dir` for entries whose plain path
/// matches any of `patterns` under the `^pattern(/|$)` rule; dedup + sort.
pub fn scan_local(dir: &Path, patterns: &[String]) -> Result<Vec<ManifestEntry>> {
    collect_local(dir, |plain| {
        patterns.iter().any(|p| {
            let p = p.trim_end_matches('/');
            plain == p || plain.starts_with(p) && plain.as_bytes()[p.len()] == b'/'
        })
    })
}

/// Sorted-unique union of every entry in every local manifest.
pub fn aggregate(dir: &Path) -> Result<Vec<ManifestEntry>> {
    collect_local(dir, |_| true)
}

fn collect_local(dir: &Path, keep: impl Fn(&str) -> bool) -> Result<Vec<ManifestEntry>> {
    let mut set = BTreeSet::new();
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let text = match fs::read_to_string(&path) {
            Ok(t) => t,
            Err(e) => {
                warn!("skipping unreadable manifest {}: {e}", path.display());
                continue;
            }
        };
        for e in Manifest::parse(&text)?.entries {
            if keep(&e.plain_path) {
                set.insert(e);
            }
        }
    }
    Ok(set.into_iter().collect())
}

/// Decrypt every committed manifest in `enc_manifest_dir` into plaintext
/// manifests under `manifest_dir`.
///
/// A manifest that fails the NUL-byte check is assumed mis-keyed: it is
/// reported, any stale plaintext counterpart is removed so a retry with the
/// right password starts clean, and the refresh as a whole fails.
pub fn refresh_local(manifest_dir: &Path, enc_manifest_dir: &Path, cipher: &Cipher) -> Result<usize> {
    fs::create_dir_all(manifest_dir)?;
    let mut refreshed = 0usize;
    let mut bad = 0usize;
    if !enc_manifest_dir.is_dir() {
        return Ok(0);
    }
    for entry in fs::read_dir(enc_manifest_dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(n) => n.to_owned(),
            None => continue,
        };
        let data = fs::read(&path)?;
        match Manifest::decode(cipher, &data) {
            Ok(manifest) => {
                fs::write(manifest_dir.join(&name), manifest.to_text())?;
                refreshed += 1;
            }
            Err(MybaError::WrongPassword) => {
                warn!("manifest {name} does not decrypt with this password");
                let stale = manifest_dir.join(&name);
                if stale.exists() {
                    fs::remove_file(stale)?;
                }
                bad += 1;
            }
            Err(e) => return Err(e),
        }
    }
    if bad > 0 {
        return Err(MybaError::WrongPassword);
    }
    Ok(refreshed)
}
