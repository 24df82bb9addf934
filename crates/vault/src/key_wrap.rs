//! Data key wrapping under the root key.
//!
//! Every [`KeyVault`](crate::KeyVault) backend holds its root key in a
//! [`RootKey`] and delegates wrap/unwrap here. Wrapping uses the same AEAD as
//! message encryption; the fixed AAD `"data-key-wrap"` domain-separates the
//! two uses.

use {rand::RngCore, zeroize::Zeroizing};

use crate::{
    aes256gcm::Aes256GcmCipher,
    error::VaultError,
    traits::{Cipher, KEY_LEN, Sealed},
};

/// AAD bound into every wrapped blob.
const WRAP_AAD: &[u8] = b"data-key-wrap";

/// Opaque root key. The bytes are never handed out of this crate.
pub(crate) struct RootKey(Zeroizing<[u8; KEY_LEN]>);

impl RootKey {
    /// Generate a fresh random root key.
    pub(crate) fn generate() -> Self {
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        rand::rng().fill_bytes(key.as_mut());
        Self(key)
    }

    /// Rebuild a root key from persisted bytes.
    pub(crate) fn from_slice(bytes: &[u8]) -> Result<Self, VaultError> {
        if bytes.len() != KEY_LEN {
            return Err(VaultError::VaultUnavailable(format!(
                "stored root key has wrong length: {} (expected {KEY_LEN})",
                bytes.len()
            )));
        }
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        key.copy_from_slice(bytes);
        Ok(Self(key))
    }

    /// Raw bytes, for backends that persist the key inside their own facility.
    pub(crate) fn persisted_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    pub(crate) fn wrap(&self, plaintext: &[u8]) -> Result<Sealed, VaultError> {
        Aes256GcmCipher.encrypt(&self.0, plaintext, WRAP_AAD)
    }

    pub(crate) fn unwrap(
        &self,
        ciphertext: &[u8],
        nonce: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, VaultError> {
        Aes256GcmCipher
            .decrypt(&self.0, ciphertext, nonce, WRAP_AAD)
            .map(Zeroizing::new)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let root = RootKey::generate();
        let dek = [0xBB; KEY_LEN];

        let wrapped = root.wrap(&dek).unwrap();
        let unwrapped = root.unwrap(&wrapped.ciphertext, &wrapped.nonce).unwrap();
        assert_eq!(unwrapped.as_slice(), dek);
    }

    #[test]
    fn other_root_key_fails() {
        let wrapped = RootKey::generate().wrap(&[0xBB; KEY_LEN]).unwrap();
        let result = RootKey::generate().unwrap(&wrapped.ciphertext, &wrapped.nonce);
        assert!(matches!(result, Err(VaultError::AuthenticationFailure)));
    }

    #[test]
    fn wrapped_key_does_not_open_as_message() {
        let root = RootKey::generate();
        let wrapped = root.wrap(&[0xBB; KEY_LEN]).unwrap();
        let result =
            Aes256GcmCipher.decrypt(root.persisted_bytes(), &wrapped.ciphertext, &wrapped.nonce, b"");
        assert!(matches!(result, Err(VaultError::AuthenticationFailure)));
    }

    #[test]
    fn from_slice_rejects_wrong_length() {
        assert!(matches!(
            RootKey::from_slice(&[1u8; 16]),
            Err(VaultError::VaultUnavailable(_))
        ));
        let key = RootKey::from_slice(&[7u8; KEY_LEN]).unwrap();
        assert_eq!(key.persisted_bytes(), &[7u8; KEY_LEN]);
    }
}
