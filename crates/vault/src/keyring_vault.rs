//! Root key held in the OS credential store (macOS Keychain, Windows
//! Credential Manager, Secret Service on Linux).

use {async_trait::async_trait, keyring::Entry, tokio::sync::OnceCell, zeroize::Zeroizing};

use crate::{
    encoding,
    error::VaultError,
    key_wrap::RootKey,
    traits::{KeyVault, Sealed},
};

/// Default keychain service name.
pub const DEFAULT_SERVICE: &str = "murmur";
/// Default keychain account under the service.
pub const DEFAULT_ACCOUNT: &str = "root-key";

/// Vault backed by the platform keychain via the `keyring` crate.
///
/// The root key is read from the keychain once and then kept in a private
/// handle for the rest of the process.
pub struct KeyringVault {
    service: String,
    account: String,
    root: OnceCell<RootKey>,
}

impl KeyringVault {
    pub fn new(service: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            account: account.into(),
            root: OnceCell::new(),
        }
    }

    async fn root_key(&self) -> Result<&RootKey, VaultError> {
        self.root
            .get_or_try_init(|| {
                let service = self.service.clone();
                let account = self.account.clone();
                async move {
                    tokio::task::spawn_blocking(move || load_or_create(&service, &account))
                        .await
                        .map_err(|e| VaultError::VaultUnavailable(format!("keychain task: {e}")))?
                }
            })
            .await
    }
}

impl Default for KeyringVault {
    fn default() -> Self {
        Self::new(DEFAULT_SERVICE, DEFAULT_ACCOUNT)
    }
}

fn load_or_create(service: &str, account: &str) -> Result<RootKey, VaultError> {
    let entry = Entry::new(service, account)
        .map_err(|e| VaultError::VaultUnavailable(format!("keychain init: {e}")))?;

    match entry.get_password() {
        Ok(stored) => {
            let stored = Zeroizing::new(stored);
            let bytes = Zeroizing::new(encoding::decode(&stored).map_err(|_| {
                VaultError::VaultUnavailable("keychain root key is not valid base64".into())
            })?);
            let key = RootKey::from_slice(&bytes)?;

            #[cfg(feature = "tracing")]
            tracing::info!(service, account, "loaded root key from keychain");

            Ok(key)
        },
        Err(keyring::Error::NoEntry) => {
            let key = RootKey::generate();
            let encoded = Zeroizing::new(encoding::encode(key.persisted_bytes()));
            entry
                .set_password(&encoded)
                .map_err(|e| VaultError::VaultUnavailable(format!("keychain store: {e}")))?;

            #[cfg(feature = "tracing")]
            tracing::info!(service, account, "created root key in keychain");

            Ok(key)
        },
        Err(e) => Err(VaultError::VaultUnavailable(format!("keychain load: {e}"))),
    }
}

#[async_trait]
impl KeyVault for KeyringVault {
    fn backend(&self) -> &'static str {
        "keyring"
    }

    async fn ensure_root_key(&self) -> Result<(), VaultError> {
        self.root_key().await.map(|_| ())
    }

    async fn wrap(&self, plaintext: &[u8]) -> Result<Sealed, VaultError> {
        self.root_key().await?.wrap(plaintext)
    }

    async fn unwrap(
        &self,
        ciphertext: &[u8],
        nonce: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, VaultError> {
        self.root_key().await?.unwrap(ciphertext, nonce)
    }
}
