//! Envelope encryption for message bodies.
//!
//! A root key held by a [`KeyVault`] wraps a random 256-bit data key. The
//! wrapped data key is persisted by a [`KeyMaterialStore`]; the raw data key
//! lives only in memory, owned by [`DataKeyManager`], which hands out a
//! [`CipherEngine`] for AES-256-GCM message encryption.

pub mod aes256gcm;
pub mod data_key;
pub mod encoding;
pub mod engine;
pub mod error;
pub mod file_vault;
pub mod key_store;
mod key_wrap;
pub mod keyring_vault;
pub mod memory_vault;
pub mod traits;

pub use {
    aes256gcm::Aes256GcmCipher,
    data_key::{DataKey, DataKeyManager, KeyLifecycle},
    engine::CipherEngine,
    error::VaultError,
    file_vault::FileKeyVault,
    key_store::{KeyMaterialStore, SqliteKeyMaterialStore, WrappedDataKey},
    keyring_vault::KeyringVault,
    memory_vault::MemoryKeyVault,
    traits::{Cipher, KEY_LEN, KeyVault, NONCE_LEN, Sealed, TAG_LEN},
};

/// Run database migrations for the key-material store.
///
/// Creates the `key_material` table.
pub async fn run_migrations(pool: &sqlx::SqlitePool) -> Result<(), VaultError> {
    sqlx::migrate!("./migrations")
        .set_ignore_missing(true)
        .run(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
pub(crate) async fn test_pool() -> sqlx::SqlitePool {
    #[allow(clippy::expect_used)]
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory pool");
    #[allow(clippy::expect_used)]
    run_migrations(&pool).await.expect("key material migrations");
    pool
}
