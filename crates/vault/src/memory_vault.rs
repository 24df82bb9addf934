//! In-process root key, for tests and throwaway runs.

use {async_trait::async_trait, tokio::sync::OnceCell, zeroize::Zeroizing};

use crate::{
    error::VaultError,
    key_wrap::RootKey,
    traits::{KeyVault, Sealed},
};

/// Vault whose root key lives only in this process.
///
/// Dropping it is equivalent to a vault reset: anything it wrapped can no
/// longer be unwrapped.
#[derive(Default)]
pub struct MemoryKeyVault {
    root: OnceCell<RootKey>,
}

impl MemoryKeyVault {
    pub fn new() -> Self {
        Self::default()
    }

    async fn root_key(&self) -> &RootKey {
        self.root
            .get_or_init(|| async {
                #[cfg(feature = "tracing")]
                tracing::debug!("generated in-memory root key");
                RootKey::generate()
            })
            .await
    }
}

#[async_trait]
impl KeyVault for MemoryKeyVault {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn ensure_root_key(&self) -> Result<(), VaultError> {
        self.root_key().await;
        Ok(())
    }

    async fn wrap(&self, plaintext: &[u8]) -> Result<Sealed, VaultError> {
        self.root_key().await.wrap(plaintext)
    }

    async fn unwrap(
        &self,
        ciphertext: &[u8],
        nonce: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, VaultError> {
        self.root_key().await.unwrap(ciphertext, nonce)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wrap_unwrap_round_trip() {
        let vault = MemoryKeyVault::new();
        vault.ensure_root_key().await.unwrap();
        vault.ensure_root_key().await.unwrap();

        let sealed = vault.wrap(b"data key bytes").await.unwrap();
        let opened = vault.unwrap(&sealed.ciphertext, &sealed.nonce).await.unwrap();
        assert_eq!(opened.as_slice(), b"data key bytes");
    }

    #[tokio::test]
    async fn separate_vaults_do_not_share_keys() {
        let a = MemoryKeyVault::new();
        let b = MemoryKeyVault::new();

        let sealed = a.wrap(b"secret").await.unwrap();
        let result = b.unwrap(&sealed.ciphertext, &sealed.nonce).await;
        assert!(matches!(result, Err(VaultError::AuthenticationFailure)));
    }
}
