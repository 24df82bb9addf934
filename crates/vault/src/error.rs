//! Vault error types.

/// Errors produced by vault, key-management, and cipher operations.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    /// The root-key facility (OS keychain, key file) cannot be reached.
    #[error("root key vault unavailable: {0}")]
    VaultUnavailable(String),

    /// The persisted wrapped data key does not open under the current root key.
    ///
    /// Every record encrypted under the old data key is unreadable. This is
    /// never resolved by generating a replacement key.
    #[error("persisted data key is corrupted: {0}")]
    DataKeyCorrupted(String),

    /// An AEAD tag did not verify (tampered data, wrong key, truncated input).
    #[error("authentication failed")]
    AuthenticationFailure,

    /// Malformed base64, wrong nonce length, or non-UTF-8 plaintext.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// A previous data key failure left the key lifecycle in its terminal state.
    #[error("encryption is unusable after a data key failure")]
    Unusable,

    /// Encryption itself failed.
    #[error("cipher error: {0}")]
    CipherError(String),

    /// Key-material database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Key-material migration error.
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

impl VaultError {
    /// Whether the failure is confined to a single record.
    ///
    /// Read paths skip such records instead of failing the whole read.
    #[must_use]
    pub fn is_record_level(&self) -> bool {
        matches!(self, Self::AuthenticationFailure | Self::Encoding(_))
    }
}
