//! Seams between the envelope-encryption layers.

use {async_trait::async_trait, zeroize::Zeroizing};

use crate::error::VaultError;

/// Length of every symmetric key handled by the vault (AES-256).
pub const KEY_LEN: usize = 32;

/// AEAD nonce length (96 bits).
pub const NONCE_LEN: usize = 12;

/// AEAD authentication tag length (128 bits).
pub const TAG_LEN: usize = 16;

/// Output of a single AEAD encryption: ciphertext (tag appended) plus the
/// nonce it was sealed under.
#[derive(Clone, PartialEq, Eq)]
pub struct Sealed {
    pub ciphertext: Vec<u8>,
    pub nonce: [u8; NONCE_LEN],
}

impl std::fmt::Debug for Sealed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sealed")
            .field("ciphertext_len", &self.ciphertext.len())
            .field("nonce", &self.nonce)
            .finish()
    }
}

/// Authenticated encryption with associated data.
///
/// Implementations must draw a fresh random nonce for every `encrypt` call and
/// must not share mutable cipher state between calls.
pub trait Cipher: Send + Sync {
    /// Algorithm name, for logs and diagnostics.
    fn algorithm(&self) -> &'static str;

    /// Encrypt `plaintext` under `key`, binding `aad`.
    fn encrypt(&self, key: &[u8; KEY_LEN], plaintext: &[u8], aad: &[u8])
    -> Result<Sealed, VaultError>;

    /// Decrypt `ciphertext` sealed under `nonce`.
    ///
    /// A nonce of the wrong length is an [`VaultError::Encoding`] failure; a
    /// bad tag is [`VaultError::AuthenticationFailure`].
    fn decrypt(
        &self,
        key: &[u8; KEY_LEN],
        ciphertext: &[u8],
        nonce: &[u8],
        aad: &[u8],
    ) -> Result<Vec<u8>, VaultError>;
}

/// Holder of the non-exportable root key.
///
/// The root key never leaves the implementation; callers only get
/// wrap/unwrap. Backends may block on I/O (keychain, filesystem).
#[async_trait]
pub trait KeyVault: Send + Sync {
    /// Short backend name ("keyring", "file", "memory").
    fn backend(&self) -> &'static str;

    /// Create the root key if it does not exist yet. Idempotent.
    async fn ensure_root_key(&self) -> Result<(), VaultError>;

    /// Encrypt `plaintext` under the root key with a fresh nonce.
    async fn wrap(&self, plaintext: &[u8]) -> Result<Sealed, VaultError>;

    /// Decrypt a blob produced by [`wrap`](Self::wrap).
    async fn unwrap(
        &self,
        ciphertext: &[u8],
        nonce: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, VaultError>;
}
