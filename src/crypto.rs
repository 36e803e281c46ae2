//! Symmetric cipher adapter.
//!
//! Two interchangeable modes, selected by `USE_GPG`:
//!
//! - **OpenSSL mode** (default, in-process): AES-256-CTR with a key and IV
//!   derived by PBKDF2-HMAC-SHA512. The ciphertext layout mirrors
//!   `openssl enc -aes-256-ctr -pbkdf2 -md sha512` with the 8-byte
//!   `Salted__` magic stripped: `salt(8) ‖ ciphertext`.
//! - **GPG mode** (behind the `gpg` cargo feature): OpenPGP symmetric
//!   AES-256 via sequoia. Selecting it without the feature is an error.
//!
//! The pass phrase for an object is `password ‖ pepper`. The pepper is the
//! empty string for manifests and commit messages and the plaintext path for
//! per-file blobs, so identical bytes at different paths produce different
//! ciphertexts.
//!
//! The salt is derived from the pass phrase rather than drawn from the OS
//! RNG: ciphertext must be a pure function of `(path, password, plaintext)`
//! so that all clients sharing a password produce identical blob hashes and
//! the object store deduplicates across them.

use crate::config::Settings;
use crate::error::{MybaError, Result};
use crate::password::Password;
use aes::Aes256;
use ctr::cipher::{KeyIvInit, StreamCipher};
use pbkdf2::pbkdf2_hmac;
use sha2::{Digest, Sha512};

type Aes256Ctr = ctr::Ctr128BE<Aes256>;

const SALT_LEN: usize = 8;
const KEY_LEN: usize = 32;
const IV_LEN: usize = 16;

const SALT_DOMAIN: &[u8] = b"myba.salt";

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mode {
    OpenSsl,
    Gpg,
}

pub struct Cipher {
    password: Password,
    iters: u32,
    mode: Mode,
}

impl Cipher {
    pub fn new(settings: &Settings, password: Password) -> Self {
        Cipher {
            password,
            iters: settings.kdf_iters,
            mode: if settings.use_gpg {
                Mode::Gpg
            } else {
                Mode::OpenSsl
            },
        }
    }

    pub fn password(&self) -> &Password {
        &self.password
    }

    pub fn encrypt(&self, pepper: &str, plaintext: &[u8]) -> Result<Vec<u8>> {
        let passphrase = self.password.passphrase(pepper);
        match self.mode {
            Mode::OpenSsl => self.encrypt_openssl(passphrase.as_bytes(), plaintext),
            Mode::Gpg => gpg::encrypt(passphrase.as_bytes(), plaintext),
        }
    }

    pub fn decrypt(&self, pepper: &str, ciphertext: &[u8]) -> Result<Vec<u8>> {
        let passphrase = self.password.passphrase(pepper);
        match self.mode {
            Mode::OpenSsl => self.decrypt_openssl(passphrase.as_bytes(), ciphertext),
            Mode::Gpg => gpg::decrypt(passphrase.as_bytes(), ciphertext),
        }
    }

    fn encrypt_openssl(&self, passphrase: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        let salt = derive_salt(passphrase);
        let (key, iv) = derive_key_iv(passphrase, &salt, self.iters);

        let mut out = Vec::with_capacity(SALT_LEN + plaintext.len());
        out.extend_from_slice(&salt);
        out.extend_from_slice(plaintext);

        let mut ctr = Aes256Ctr::new(&key.into(), &iv.into());
        ctr.apply_keystream(&mut out[SALT_LEN..]);
        Ok(out)
    }

    fn decrypt_openssl(&self, passphrase: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
        if ciphertext.len() < SALT_LEN {
            return Err(MybaError::Cipher("ciphertext shorter than salt".into()));
        }
        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(&ciphertext[..SALT_LEN]);
        let (key, iv) = derive_key_iv(passphrase, &salt, self.iters);

        let mut out = ciphertext[SALT_LEN..].to_vec();
        let mut ctr = Aes256Ctr::new(&key.into(), &iv.into());
        ctr.apply_keystream(&mut out);
        Ok(out)
    }
}

fn derive_salt(passphrase: &[u8]) -> [u8; SALT_LEN] {
    let mut h = Sha512::new();
    h.update(SALT_DOMAIN);
    h.update(passphrase);
    let digest = h.finalize();
    let mut salt = [0u8; SALT_LEN];
    salt.copy_from_slice(&digest[..SALT_LEN]);
    salt
}

fn derive_key_iv(passphrase: &[u8], salt: &[u8; SALT_LEN], iters: u32) -> ([u8; KEY_LEN], [u8; IV_LEN]) {
    let mut okm = [0u8; KEY_LEN + IV_LEN];
    pbkdf2_hmac::<Sha512>(passphrase, salt, iters, &mut okm);
    let mut key = [0u8; KEY_LEN];
    let mut iv = [0u8; IV_LEN];
    key.copy_from_slice(&okm[..KEY_LEN]);
    iv.copy_from_slice(&okm[KEY_LEN..]);
    (key, iv)
}

#[cfg(feature = "gpg")]
mod gpg {
    use crate::error::{MybaError, Result};
    use sequoia_openpgp as openpgp;
    use openpgp::crypto::{Password as PgpPassword, SessionKey};
    use openpgp::packet::{PKESK, SKESK};
    use openpgp::parse::stream::{
        DecryptionHelper, DecryptorBuilder, MessageStructure, VerificationHelper,
    };
    use openpgp::parse::Parse;
    use openpgp::policy::StandardPolicy;
    use openpgp::serialize::stream::{Encryptor2, LiteralWriter, Message};
    use openpgp::types::SymmetricAlgorithm;
    use openpgp::{Cert, Fingerprint, KeyHandle};
    use std::io::Write;

    pub fn encrypt(passphrase: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut sink = Vec::new();
        let message = Message::new(&mut sink);
        let message = Encryptor2::with_passwords(message, vec![PgpPassword::from(passphrase)])
            .symmetric_algo(SymmetricAlgorithm::AES256)
            .build()
            .map_err(|e| MybaError::Cipher(e.to_string()))?;
        let mut writer = LiteralWriter::new(message)
            .build()
            .map_err(|e| MybaError::Cipher(e.to_string()))?;
        writer
            .write_all(plaintext)
            .map_err(|e| MybaError::Cipher(e.to_string()))?;
        writer
            .finalize()
            .map_err(|e| MybaError::Cipher(e.to_string()))?;
        Ok(sink)
    }

    pub fn decrypt(passphrase: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
        struct Helper {
            password: PgpPassword,
        }

        impl VerificationHelper for Helper {
            fn get_certs(&mut self, _ids: &[KeyHandle]) -> openpgp::Result<Vec<Cert>> {
                Ok(Vec::new())
            }
            fn check(&mut self, _structure: MessageStructure) -> openpgp::Result<()> {
                Ok(())
            }
        }

        impl DecryptionHelper for Helper {
            fn decrypt<D>(
                &mut self,
                _pkesks: &[PKESK],
                skesks: &[SKESK],
                _sym_algo: Option<SymmetricAlgorithm>,
                mut decrypt: D,
            ) -> openpgp::Result<Option<Fingerprint>>
            where
                D: FnMut(SymmetricAlgorithm, &SessionKey) -> bool,
            {
                for skesk in skesks {
                    if let Ok((algo, sk)) = skesk.decrypt(&self.password) {
                        if decrypt(algo, &sk) {
                            return Ok(None);
                        }
                    }
                }
                Err(anyhow::anyhow!("no session key matched the pass phrase"))
            }
        }

        let policy = &StandardPolicy::new();
        let helper = Helper {
            password: PgpPassword::from(passphrase),
        };
        let mut decryptor = DecryptorBuilder::from_bytes(ciphertext)
            .map_err(|e| MybaError::Cipher(e.to_string()))?
            .with_policy(policy, None, helper)
            .map_err(|e| MybaError::Cipher(e.to_string()))?;
        let mut out = Vec::new();
        std::io::copy(&mut decryptor, &mut out)?;
        Ok(out)
    }
}

#[cfg(not(feature = "gpg"))]
mod gpg {
    use crate::error::{MybaError, Result};

    pub fn encrypt(_passphrase: &[u8], _plaintext: &[u8]) -> Result<Vec<u8>> {
        Err(MybaError::Cipher(
            "GPG mode not enabled. Rebuild with --features gpg".into(),
        ))
    }

    pub fn decrypt(_passphrase: &[u8], _ciphertext: &[u8]) -> Result<Vec<u8>> {
        Err(MybaError::Cipher(
            "GPG mode not enabled. Rebuild with --features gpg".into(),
        ))
    }
}
