//! Message-level AEAD over the in-memory data key.

#[cfg(feature = "metrics")]
use murmur_metrics::{counter, crypto as crypto_metrics};

use crate::{
    aes256gcm::Aes256GcmCipher,
    data_key::DataKey,
    error::VaultError,
    traits::{Cipher, Sealed},
};

/// Encrypts and decrypts message bodies with the data key.
///
/// Constructed explicitly (normally by
/// [`DataKeyManager::cipher_engine`](crate::DataKeyManager::cipher_engine))
/// and shared by reference. Holds no mutable state: each call builds its own
/// cipher instance, so any number of calls may run concurrently.
#[derive(Clone)]
pub struct CipherEngine<C: Cipher = Aes256GcmCipher> {
    key: DataKey,
    cipher: C,
}

impl CipherEngine<Aes256GcmCipher> {
    pub fn new(key: DataKey) -> Self {
        Self::with_cipher(key, Aes256GcmCipher)
    }
}

impl<C: Cipher> CipherEngine<C> {
    pub fn with_cipher(key: DataKey, cipher: C) -> Self {
        Self { key, cipher }
    }

    pub fn algorithm(&self) -> &'static str {
        self.cipher.algorithm()
    }

    /// Encrypt under a fresh random nonce. No associated data.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Sealed, VaultError> {
        #[cfg(feature = "metrics")]
        counter!(crypto_metrics::ENCRYPTIONS_TOTAL).increment(1);

        self.cipher.encrypt(self.key.expose(), plaintext, &[])
    }

    /// Decrypt and verify. A bad tag is always an error, never empty output.
    pub fn decrypt(&self, ciphertext: &[u8], nonce: &[u8]) -> Result<Vec<u8>, VaultError> {
        #[cfg(feature = "metrics")]
        counter!(crypto_metrics::DECRYPTIONS_TOTAL).increment(1);

        let result = self.cipher.decrypt(self.key.expose(), ciphertext, nonce, &[]);

        #[cfg(feature = "metrics")]
        if result.is_err() {
            counter!(crypto_metrics::AUTH_FAILURES_TOTAL).increment(1);
        }

        result
    }
}

impl<C: Cipher> std::fmt::Debug for CipherEngine<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CipherEngine")
            .field("algorithm", &self.cipher.algorithm())
            .finish_non_exhaustive()
    }
}
