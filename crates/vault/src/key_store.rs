//! Persistence for the wrapped data key.
//!
//! A small key-value store, kept apart from the message store, holding two
//! string fields: `data_key_ciphertext` and `data_key_nonce` (unpadded base64).

use {
    async_trait::async_trait,
    sqlx::{SqlitePool, sqlite::SqlitePoolOptions},
};

use crate::error::VaultError;

/// Key-value name of the wrapped data key ciphertext.
pub const DATA_KEY_CIPHERTEXT: &str = "data_key_ciphertext";
/// Key-value name of the nonce the data key was wrapped under.
pub const DATA_KEY_NONCE: &str = "data_key_nonce";

/// The persisted, wrapped form of the data key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrappedDataKey {
    /// Base64 (unpadded) of the root-key AEAD ciphertext.
    pub ciphertext: String,
    /// Base64 (unpadded) of the 12-byte wrap nonce.
    pub nonce: String,
}

/// Storage contract for the wrapped data key.
#[async_trait]
pub trait KeyMaterialStore: Send + Sync {
    /// Load the wrapped data key.
    ///
    /// Returns `None` when either field is missing; a half-written pair is
    /// treated exactly like a first run.
    async fn load_wrapped_data_key(&self) -> Result<Option<WrappedDataKey>, VaultError>;

    /// Persist both fields atomically.
    async fn save_wrapped_data_key(&self, wrapped: &WrappedDataKey) -> Result<(), VaultError>;
}

/// SQLite-backed [`KeyMaterialStore`].
pub struct SqliteKeyMaterialStore {
    pool: SqlitePool,
}

impl SqliteKeyMaterialStore {
    /// Open a dedicated key-material database and run its migrations.
    pub async fn connect(database_url: &str) -> Result<Self, VaultError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .connect(database_url)
            .await?;

        crate::run_migrations(&pool).await?;

        Ok(Self { pool })
    }

    /// Use an existing pool. [`crate::run_migrations`] must already have run.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn get(&self, name: &str) -> Result<Option<String>, VaultError> {
        let value = sqlx::query_scalar::<_, String>("SELECT value FROM key_material WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }
}

#[async_trait]
impl KeyMaterialStore for SqliteKeyMaterialStore {
    async fn load_wrapped_data_key(&self) -> Result<Option<WrappedDataKey>, VaultError> {
        let ciphertext = self.get(DATA_KEY_CIPHERTEXT).await?;
        let nonce = self.get(DATA_KEY_NONCE).await?;

        Ok(match (ciphertext, nonce) {
            (Some(ciphertext), Some(nonce)) => Some(WrappedDataKey { ciphertext, nonce }),
            _ => None,
        })
    }

    async fn save_wrapped_data_key(&self, wrapped: &WrappedDataKey) -> Result<(), VaultError> {
        let mut tx = self.pool.begin().await?;
        for (name, value) in [
            (DATA_KEY_CIPHERTEXT, &wrapped.ciphertext),
            (DATA_KEY_NONCE, &wrapped.nonce),
        ] {
            sqlx::query(
                r#"INSERT INTO key_material (name, value) VALUES (?, ?)
                   ON CONFLICT(name) DO UPDATE SET
                     value = excluded.value,
                     updated_at = datetime('now')"#,
            )
            .bind(name)
            .bind(value)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
