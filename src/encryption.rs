// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Encryption provider boundary.
//!
//! Concrete backends such as age or gpg live outside of this crate. The
//! source state only needs to turn ciphertext into plaintext on read, and the
//! other way around on add, plus the suffix the backend appends to encrypted
//! source names.

use std::error::Error as StdError;
use tracing::debug;

/// Encrypt and decrypt source contents.
pub trait Encryption: Send + Sync {
    /// Decrypt ciphertext.
    ///
    /// # Errors
    ///
    /// - Return [`EncryptionError`] if backend fails to decrypt.
    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>>;

    /// Encrypt plaintext.
    ///
    /// # Errors
    ///
    /// - Return [`EncryptionError`] if backend fails to encrypt.
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>>;

    /// Suffix appended to names of encrypted source files, e.g., `.age`.
    fn encrypted_suffix(&self) -> &str;
}

/// No encryption configured.
///
/// Every attempt to encrypt or decrypt fails, so encrypted source files can
/// still be read as long as nothing asks for their contents. The suffix is
/// kept so encrypted source names still decode to the right target.
#[derive(Clone, Debug, Default)]
pub struct NoEncryption {
    encrypted_suffix: String,
}

impl NoEncryption {
    pub fn new(encrypted_suffix: impl Into<String>) -> Self {
        Self {
            encrypted_suffix: encrypted_suffix.into(),
        }
    }
}

impl Encryption for NoEncryption {
    fn decrypt(&self, _: &[u8]) -> Result<Vec<u8>> {
        Err(EncryptionError::NotConfigured)
    }

    fn encrypt(&self, _: &[u8]) -> Result<Vec<u8>> {
        Err(EncryptionError::NotConfigured)
    }

    fn encrypted_suffix(&self) -> &str {
        &self.encrypted_suffix
    }
}

/// Encryption that logs every call before passing it on.
#[derive(Debug)]
pub struct DebugEncryption<E> {
    inner: E,
}

impl<E: Encryption> DebugEncryption<E> {
    pub fn new(inner: E) -> Self {
        Self { inner }
    }
}

impl<E: Encryption> Encryption for DebugEncryption<E> {
    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        let result = self.inner.decrypt(ciphertext);
        match &result {
            Ok(plaintext) => debug!(
                ciphertext = ciphertext.len(),
                plaintext = plaintext.len(),
                "decrypt"
            ),
            Err(error) => debug!(%error, "decrypt failed"),
        }
        result
    }

    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let result = self.inner.encrypt(plaintext);
        match &result {
            Ok(ciphertext) => debug!(
                plaintext = plaintext.len(),
                ciphertext = ciphertext.len(),
                "encrypt"
            ),
            Err(error) => debug!(%error, "encrypt failed"),
        }
        result
    }

    fn encrypted_suffix(&self) -> &str {
        self.inner.encrypted_suffix()
    }
}

/// Encryption error types.
#[derive(Debug, thiserror::Error)]
pub enum EncryptionError {
    /// No encryption backend configured.
    #[error("no encryption configured")]
    NotConfigured,

    /// Backend specific failure.
    #[error(transparent)]
    Backend(#[from] Box<dyn StdError + Send + Sync>),
}

/// Friendly result alias :3
pub type Result<T, E = EncryptionError> = std::result::Result<T, E>;

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Toy cipher for tests, XORs every byte.
    #[derive(Clone, Copy, Debug, Default)]
    pub(crate) struct XorEncryption;

    impl Encryption for XorEncryption {
        fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
            Ok(ciphertext.iter().map(|byte| byte ^ 0x5a).collect())
        }

        fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
            self.decrypt(plaintext)
        }

        fn encrypted_suffix(&self) -> &str {
            ".xor"
        }
    }

    #[test]
    fn no_encryption_refuses() {
        let encryption = NoEncryption::new(".age");
        assert!(matches!(
            encryption.decrypt(b"x"),
            Err(EncryptionError::NotConfigured)
        ));
        assert_eq!(encryption.encrypted_suffix(), ".age");
        assert_eq!(NoEncryption::default().encrypted_suffix(), "");
    }

    #[test]
    fn debug_encryption_passes_through() -> anyhow::Result<()> {
        let encryption = DebugEncryption::new(XorEncryption);
        let ciphertext = encryption.encrypt(b"secret")?;
        assert_eq!(encryption.decrypt(&ciphertext)?, b"secret");
        assert_eq!(encryption.encrypted_suffix(), ".xor");

        Ok(())
    }
}
