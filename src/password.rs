//! Password acquisition and interactive prompting.
//!
//! The password lives in process memory only, wrapped in [`Zeroizing`] so it
//! is wiped on drop. It is never placed in argv or the environment of child
//! processes. Interactive prompts open `/dev/tty` directly so they keep
//! working when stdin has been claimed by a pipeline.

use crate::error::{MybaError, Result};
use std::env;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use zeroize::Zeroizing;

#[derive(Clone)]
pub struct Password(Zeroizing<String>);

impl Password {
    /// Read the password from `PASSWORD`, or prompt on the controlling TTY.
    ///
    /// With `confirm`, a second prompt must match the first; used whenever a
    /// password is being established rather than recalled.
    pub fn acquire(confirm: bool) -> Result<Self> {
        if let Ok(v) = env::var("PASSWORD") {
            if !v.is_empty() {
                return Ok(Password(Zeroizing::new(v)));
            }
        }
        let first = rpassword::prompt_password("Password: ")
            .map_err(|e| MybaError::Other(format!("cannot read password: {e}")))?;
        if first.is_empty() {
            return Err(MybaError::Usage("empty password".into()));
        }
        if confirm {
            let second = rpassword::prompt_password("Confirm password: ")
                .map_err(|e| MybaError::Other(format!("cannot read password: {e}")))?;
            if first != second {
                return Err(MybaError::Usage("passwords do not match".into()));
            }
        }
        Ok(Password(Zeroizing::new(first)))
    }

    pub fn new(s: impl Into<String>) -> Self {
        Password(Zeroizing::new(s.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Pass phrase for one object: `password ‖ pepper`.
    pub fn passphrase(&self, pepper: &str) -> Zeroizing<String> {
        let mut p = String::with_capacity(self.0.len() + pepper.len());
        p.push_str(&self.0);
        p.push_str(pepper);
        Zeroizing::new(p)
    }
}

/// Ask y/N on the controlling TTY before clobbering `path`.
///
/// `yes` (from `YES_OVERWRITE`) short-circuits to true. Without a usable
/// TTY the answer is a refusal.
pub fn confirm_overwrite(path: &Path, yes: bool) -> Result<bool> {
    if yes {
        return Ok(true);
    }
    let tty = match OpenOptions::new().read(true).write(true).open("/dev/tty") {
        Ok(f) => f,
        Err(_) => return Ok(false),
    };
    let mut out = tty.try_clone()?;
    write!(out, "Overwrite {}? [y/N] ", path.display())?;
    out.flush()?;
    let mut answer = String::new();
    BufReader::new(tty).read_line(&mut answer)?;
    let answer = answer.trim();
    Ok(answer.eq_ignore_ascii_case("y") || answer.eq_ignore_ascii_case("yes"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passphrase_concatenation() {
        let pw = Password::new("secret");
        assert_eq!(&*pw.passphrase(""), "secret");
        assert_eq!(&*pw.passphrase("a/b.txt"), "secreta/b.txt");
    }

    #[test]
    fn test_acquire_from_env() {
        env::set_var("PASSWORD", "from-env");
        let pw = Password::acquire(true).unwrap();
        assert_eq!(pw.as_str(), "from-env");
        env::remove_var("PASSWORD");
    }

    #[test]
    fn test_yes_overwrite_short_circuits() {
        assert!(confirm_overwrite(Path::new("/tmp/x"), true).unwrap());
    }
}
