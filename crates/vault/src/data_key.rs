//! Data key lifecycle: generate once, wrap under the root key, persist, and
//! unwrap back into memory on later starts.

use std::sync::Arc;

use {rand::RngCore, tokio::sync::Mutex, zeroize::Zeroizing};

#[cfg(feature = "metrics")]
use murmur_metrics::{counter, data_key as dk_metrics, histogram, labels};

use crate::{
    encoding,
    engine::CipherEngine,
    error::VaultError,
    key_store::{KeyMaterialStore, WrappedDataKey},
    traits::{KEY_LEN, KeyVault},
};

/// The raw data key. Immutable once loaded; clones share one allocation that
/// is zeroed when the last clone drops.
#[derive(Clone)]
pub struct DataKey(Arc<Zeroizing<[u8; KEY_LEN]>>);

impl DataKey {
    fn generate() -> Self {
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        rand::rng().fill_bytes(key.as_mut());
        Self(Arc::new(key))
    }

    fn from_unwrapped(bytes: &[u8]) -> Result<Self, VaultError> {
        if bytes.len() != KEY_LEN {
            return Err(VaultError::DataKeyCorrupted(format!(
                "unwrapped data key is {} bytes, expected {KEY_LEN}",
                bytes.len()
            )));
        }
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        key.copy_from_slice(bytes);
        Ok(Self(Arc::new(key)))
    }

    /// Raw key bytes.
    pub fn expose(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for DataKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DataKey([REDACTED])")
    }
}

/// Where the data key is in its process-lifetime lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyLifecycle {
    /// Nothing loaded yet (or the last attempt failed without corrupting anything).
    Uninitialized,
    /// The raw data key is in memory.
    KeyLoaded,
    /// A cipher engine has been handed out.
    Ready,
    /// The persisted key failed to open. Terminal.
    Unusable,
}

impl std::fmt::Display for KeyLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Uninitialized => "uninitialized",
            Self::KeyLoaded => "key-loaded",
            Self::Ready => "ready",
            Self::Unusable => "unusable",
        })
    }
}

struct State {
    lifecycle: KeyLifecycle,
    key: Option<DataKey>,
}

/// Owns the data key for the life of the process.
///
/// The first successful [`load_or_create_data_key`](Self::load_or_create_data_key)
/// caches the key; later calls return the same bytes. A wrapped key that no
/// longer opens under the root key moves the manager to
/// [`KeyLifecycle::Unusable`] and it stays there: no replacement key is ever
/// generated over existing data.
pub struct DataKeyManager {
    vault: Arc<dyn KeyVault>,
    store: Arc<dyn KeyMaterialStore>,
    state: Mutex<State>,
}

impl DataKeyManager {
    pub fn new(vault: Arc<dyn KeyVault>, store: Arc<dyn KeyMaterialStore>) -> Self {
        Self {
            vault,
            store,
            state: Mutex::new(State {
                lifecycle: KeyLifecycle::Uninitialized,
                key: None,
            }),
        }
    }

    /// Name of the root-key backend in use.
    pub fn vault_backend(&self) -> &'static str {
        self.vault.backend()
    }

    pub async fn status(&self) -> KeyLifecycle {
        self.state.lock().await.lifecycle
    }

    /// Return the data key, creating and persisting it on first run.
    ///
    /// Concurrent callers wait on the same load; the vault and store are hit at
    /// most once per successful load.
    pub async fn load_or_create_data_key(&self) -> Result<DataKey, VaultError> {
        let mut state = self.state.lock().await;
        if state.lifecycle == KeyLifecycle::Unusable {
            return Err(VaultError::Unusable);
        }
        if let Some(key) = &state.key {
            return Ok(key.clone());
        }

        #[cfg(feature = "metrics")]
        let start = std::time::Instant::now();

        let result = self.resolve().await;

        #[cfg(feature = "metrics")]
        {
            let outcome = match &result {
                Ok((_, outcome)) => *outcome,
                Err(VaultError::DataKeyCorrupted(_)) => "corrupted",
                Err(_) => "unavailable",
            };
            counter!(
                dk_metrics::LOADS_TOTAL,
                labels::OUTCOME => outcome,
                labels::BACKEND => self.vault.backend()
            )
            .increment(1);
            histogram!(dk_metrics::LOAD_DURATION_SECONDS).record(start.elapsed().as_secs_f64());
        }

        match result {
            Ok((key, _)) => {
                state.key = Some(key.clone());
                state.lifecycle = KeyLifecycle::KeyLoaded;
                Ok(key)
            },
            Err(e @ VaultError::DataKeyCorrupted(_)) => {
                #[cfg(feature = "tracing")]
                tracing::error!(error = %e, "data key corrupted; stored messages are unreadable");

                state.lifecycle = KeyLifecycle::Unusable;
                Err(e)
            },
            // Vault or store trouble leaves nothing half-done; a later call may retry.
            Err(e) => Err(e),
        }
    }

    /// Hand out a cipher engine over the loaded data key and mark the
    /// lifecycle ready.
    pub async fn cipher_engine(&self) -> Result<CipherEngine, VaultError> {
        let key = self.load_or_create_data_key().await?;

        let mut state = self.state.lock().await;
        if state.lifecycle == KeyLifecycle::Unusable {
            return Err(VaultError::Unusable);
        }
        state.lifecycle = KeyLifecycle::Ready;
        Ok(CipherEngine::new(key))
    }

    async fn resolve(&self) -> Result<(DataKey, &'static str), VaultError> {
        self.vault.ensure_root_key().await?;

        match self.store.load_wrapped_data_key().await? {
            Some(wrapped) => self.open(&wrapped).await.map(|key| (key, "loaded")),
            None => self.create().await.map(|key| (key, "created")),
        }
    }

    async fn open(&self, wrapped: &WrappedDataKey) -> Result<DataKey, VaultError> {
        let ciphertext = encoding::decode(&wrapped.ciphertext).map_err(corrupted)?;
        let nonce = encoding::decode(&wrapped.nonce).map_err(corrupted)?;

        let raw = self
            .vault
            .unwrap(&ciphertext, &nonce)
            .await
            .map_err(|e| if e.is_record_level() { corrupted(e) } else { e })?;
        let key = DataKey::from_unwrapped(&raw)?;

        #[cfg(feature = "tracing")]
        tracing::info!(backend = self.vault.backend(), "data key unwrapped");

        Ok(key)
    }

    async fn create(&self) -> Result<DataKey, VaultError> {
        let key = DataKey::generate();
        let sealed = self.vault.wrap(key.expose()).await?;
        self.store
            .save_wrapped_data_key(&WrappedDataKey {
                ciphertext: encoding::encode(&sealed.ciphertext),
                nonce: encoding::encode(&sealed.nonce),
            })
            .await?;

        #[cfg(feature = "tracing")]
        tracing::info!(backend = self.vault.backend(), "data key created");

        Ok(key)
    }
}

fn corrupted(e: VaultError) -> VaultError {
    VaultError::DataKeyCorrupted(e.to_string())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            key_store::SqliteKeyMaterialStore, memory_vault::MemoryKeyVault, test_pool,
            traits::Sealed,
        },
        async_trait::async_trait,
        std::sync::atomic::{AtomicUsize, Ordering},
    };

    async fn manager_with(vault: Arc<dyn KeyVault>) -> (DataKeyManager, Arc<SqliteKeyMaterialStore>) {
        let store = Arc::new(SqliteKeyMaterialStore::new(test_pool().await));
        (DataKeyManager::new(vault, store.clone()), store)
    }

    /// Vault whose facility is down for the first `failures_left` calls.
    #[derive(Default)]
    struct FlakyVault {
        inner: MemoryKeyVault,
        failures_left: AtomicUsize,
    }

    #[async_trait]
    impl KeyVault for FlakyVault {
        fn backend(&self) -> &'static str {
            "flaky"
        }

        async fn ensure_root_key(&self) -> Result<(), VaultError> {
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(VaultError::VaultUnavailable("keychain locked".into()));
            }
            self.inner.ensure_root_key().await
        }

        async fn wrap(&self, plaintext: &[u8]) -> Result<Sealed, VaultError> {
            self.inner.wrap(plaintext).await
        }

        async fn unwrap(
            &self,
            ciphertext: &[u8],
            nonce: &[u8],
        ) -> Result<Zeroizing<Vec<u8>>, VaultError> {
            self.inner.unwrap(ciphertext, nonce).await
        }
    }

    #[tokio::test]
    async fn first_run_creates_and_persists() {
        let (manager, store) = manager_with(Arc::new(MemoryKeyVault::new())).await;
        assert_eq!(manager.status().await, KeyLifecycle::Uninitialized);

        manager.load_or_create_data_key().await.unwrap();
        assert_eq!(manager.status().await, KeyLifecycle::KeyLoaded);

        let wrapped = store.load_wrapped_data_key().await.unwrap().unwrap();
        assert!(!wrapped.ciphertext.contains('='));
        assert_eq!(encoding::decode(&wrapped.nonce).unwrap().len(), 12);
    }

    #[tokio::test]
    async fn repeated_loads_return_identical_bytes() {
        let (manager, _) = manager_with(Arc::new(MemoryKeyVault::new())).await;

        let first = manager.load_or_create_data_key().await.unwrap();
        let second = manager.load_or_create_data_key().await.unwrap();
        assert_eq!(first.expose(), second.expose());
    }

    #[tokio::test]
    async fn restart_with_same_pair_returns_same_key() {
        let vault: Arc<dyn KeyVault> = Arc::new(MemoryKeyVault::new());
        let store: Arc<dyn KeyMaterialStore> =
            Arc::new(SqliteKeyMaterialStore::new(test_pool().await));

        let first = DataKeyManager::new(vault.clone(), store.clone())
            .load_or_create_data_key()
            .await
            .unwrap();

        // A fresh manager over the same vault and store stands in for a new process.
        let second = DataKeyManager::new(vault, store)
            .load_or_create_data_key()
            .await
            .unwrap();
        assert_eq!(first.expose(), second.expose());
    }

    #[tokio::test]
    async fn vault_reset_is_corruption_then_unusable() {
        let store: Arc<dyn KeyMaterialStore> =
            Arc::new(SqliteKeyMaterialStore::new(test_pool().await));
        DataKeyManager::new(Arc::new(MemoryKeyVault::new()), store.clone())
            .load_or_create_data_key()
            .await
            .unwrap();
        let before = store.load_wrapped_data_key().await.unwrap();

        // New root key, old wrapped data key.
        let manager = DataKeyManager::new(Arc::new(MemoryKeyVault::new()), store.clone());
        let result = manager.load_or_create_data_key().await;
        assert!(matches!(result, Err(VaultError::DataKeyCorrupted(_))));
        assert_eq!(manager.status().await, KeyLifecycle::Unusable);

        assert!(matches!(
            manager.load_or_create_data_key().await,
            Err(VaultError::Unusable)
        ));
        assert!(matches!(
            manager.cipher_engine().await,
            Err(VaultError::Unusable)
        ));

        // The stored pair was not replaced.
        assert_eq!(store.load_wrapped_data_key().await.unwrap(), before);
    }

    #[tokio::test]
    async fn garbage_pair_is_corruption() {
        let store = Arc::new(SqliteKeyMaterialStore::new(test_pool().await));
        store
            .save_wrapped_data_key(&WrappedDataKey {
                ciphertext: "!!not base64!!".into(),
                nonce: "AAAAAAAAAAAAAAAA".into(),
            })
            .await
            .unwrap();

        let manager = DataKeyManager::new(Arc::new(MemoryKeyVault::new()), store);
        assert!(matches!(
            manager.load_or_create_data_key().await,
            Err(VaultError::DataKeyCorrupted(_))
        ));
        assert_eq!(manager.status().await, KeyLifecycle::Unusable);
    }

    #[tokio::test]
    async fn half_written_pair_is_first_run() {
        let pool = test_pool().await;
        sqlx::query("INSERT INTO key_material (name, value) VALUES ('data_key_nonce', 'AAAA')")
            .execute(&pool)
            .await
            .unwrap();

        let store = Arc::new(SqliteKeyMaterialStore::new(pool));
        let manager = DataKeyManager::new(Arc::new(MemoryKeyVault::new()), store.clone());
        manager.load_or_create_data_key().await.unwrap();
        assert!(store.load_wrapped_data_key().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn unavailable_vault_can_be_retried() {
        let vault = Arc::new(FlakyVault {
            failures_left: AtomicUsize::new(1),
            ..Default::default()
        });
        let (manager, _) = manager_with(vault).await;

        assert!(matches!(
            manager.load_or_create_data_key().await,
            Err(VaultError::VaultUnavailable(_))
        ));
        assert_eq!(manager.status().await, KeyLifecycle::Uninitialized);

        manager.load_or_create_data_key().await.unwrap();
        assert_eq!(manager.status().await, KeyLifecycle::KeyLoaded);
    }

    #[tokio::test]
    async fn cipher_engine_marks_ready() {
        let (manager, _) = manager_with(Arc::new(MemoryKeyVault::new())).await;
        let engine = manager.cipher_engine().await.unwrap();
        assert_eq!(manager.status().await, KeyLifecycle::Ready);

        let sealed = engine.encrypt(b"hi").unwrap();
        assert_eq!(engine.decrypt(&sealed.ciphertext, &sealed.nonce).unwrap(), b"hi");
    }

    #[test]
    fn debug_is_redacted() {
        let key = DataKey::generate();
        assert_eq!(format!("{key:?}"), "DataKey([REDACTED])");
    }

    #[test]
    fn lifecycle_serializes_like_it_displays() {
        for state in [
            KeyLifecycle::Uninitialized,
            KeyLifecycle::KeyLoaded,
            KeyLifecycle::Ready,
            KeyLifecycle::Unusable,
        ] {
            let json = serde_json::to_string(&state).unwrap();
            assert_eq!(json, format!("\"{state}\""));
            assert_eq!(serde_json::from_str::<KeyLifecycle>(&json).unwrap(), state);
        }
        assert_eq!(KeyLifecycle::KeyLoaded.to_string(), "key-loaded");
    }
}
