//! AES-256-GCM implementation of the [`Cipher`] trait.

use {
    aes_gcm::{
        Aes256Gcm, Nonce,
        aead::{Aead, KeyInit, Payload},
    },
    rand::RngCore,
};

use crate::{
    error::VaultError,
    traits::{Cipher, KEY_LEN, NONCE_LEN, Sealed, TAG_LEN},
};

/// AES-256 in GCM mode with a 128-bit tag and 96-bit random nonces.
///
/// A fresh `Aes256Gcm` instance is built for every call, so concurrent callers
/// never share cipher state.
#[derive(Debug, Clone, Copy, Default)]
pub struct Aes256GcmCipher;

impl Cipher for Aes256GcmCipher {
    fn algorithm(&self) -> &'static str {
        "AES-256-GCM"
    }

    fn encrypt(
        &self,
        key: &[u8; KEY_LEN],
        plaintext: &[u8],
        aad: &[u8],
    ) -> Result<Sealed, VaultError> {
        let cipher = Aes256Gcm::new(key.into());

        let mut nonce = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce);

        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), Payload {
                msg: plaintext,
                aad,
            })
            .map_err(|e| VaultError::CipherError(e.to_string()))?;

        Ok(Sealed { ciphertext, nonce })
    }

    fn decrypt(
        &self,
        key: &[u8; KEY_LEN],
        ciphertext: &[u8],
        nonce: &[u8],
        aad: &[u8],
    ) -> Result<Vec<u8>, VaultError> {
        if nonce.len() != NONCE_LEN {
            return Err(VaultError::Encoding(format!(
                "nonce is {} bytes, expected {NONCE_LEN}",
                nonce.len()
            )));
        }
        // Shorter than a bare tag cannot have been produced by `encrypt`.
        if ciphertext.len() < TAG_LEN {
            return Err(VaultError::AuthenticationFailure);
        }

        let cipher = Aes256Gcm::new(key.into());
        cipher
            .decrypt(Nonce::from_slice(nonce), Payload {
                msg: ciphertext,
                aad,
            })
            .map_err(|_| VaultError::AuthenticationFailure)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; KEY_LEN] = [0x42; KEY_LEN];

    #[test]
    fn round_trip_no_aad() {
        let cipher = Aes256GcmCipher;
        let sealed = cipher.encrypt(&KEY, b"hello vault", b"").unwrap();
        let opened = cipher
            .decrypt(&KEY, &sealed.ciphertext, &sealed.nonce, b"")
            .unwrap();
        assert_eq!(opened, b"hello vault");
    }

    #[test]
    fn ciphertext_carries_tag() {
        let cipher = Aes256GcmCipher;
        let sealed = cipher.encrypt(&KEY, b"abc", b"").unwrap();
        assert_eq!(sealed.ciphertext.len(), 3 + TAG_LEN);
    }

    #[test]
    fn wrong_key_is_authentication_failure() {
        let cipher = Aes256GcmCipher;
        let sealed = cipher.encrypt(&KEY, b"secret", b"").unwrap();
        let result = cipher.decrypt(&[0x43; KEY_LEN], &sealed.ciphertext, &sealed.nonce, b"");
        assert!(matches!(result, Err(VaultError::AuthenticationFailure)));
    }

    #[test]
    fn wrong_aad_is_authentication_failure() {
        let cipher = Aes256GcmCipher;
        let sealed = cipher.encrypt(&KEY, b"secret", b"data-key-wrap").unwrap();
        let result = cipher.decrypt(&KEY, &sealed.ciphertext, &sealed.nonce, b"");
        assert!(matches!(result, Err(VaultError::AuthenticationFailure)));
    }

    #[test]
    fn every_flipped_bit_is_detected() {
        let cipher = Aes256GcmCipher;
        let sealed = cipher.encrypt(&KEY, b"tamper me", b"").unwrap();

        for byte in 0..sealed.ciphertext.len() {
            for bit in 0..8 {
                let mut ct = sealed.ciphertext.clone();
                ct[byte] ^= 1 << bit;
                let result = cipher.decrypt(&KEY, &ct, &sealed.nonce, b"");
                assert!(matches!(result, Err(VaultError::AuthenticationFailure)));
            }
        }
        for byte in 0..NONCE_LEN {
            for bit in 0..8 {
                let mut nonce = sealed.nonce;
                nonce[byte] ^= 1 << bit;
                let result = cipher.decrypt(&KEY, &sealed.ciphertext, &nonce, b"");
                assert!(matches!(result, Err(VaultError::AuthenticationFailure)));
            }
        }
    }

    #[test]
    fn truncated_ciphertext_fails() {
        let cipher = Aes256GcmCipher;
        let sealed = cipher.encrypt(&KEY, b"some text", b"").unwrap();

        let cut = &sealed.ciphertext[..sealed.ciphertext.len() - 1];
        assert!(matches!(
            cipher.decrypt(&KEY, cut, &sealed.nonce, b""),
            Err(VaultError::AuthenticationFailure)
        ));
        assert!(matches!(
            cipher.decrypt(&KEY, &[0u8; 4], &sealed.nonce, b""),
            Err(VaultError::AuthenticationFailure)
        ));
    }

    #[test]
    fn wrong_nonce_length_is_encoding_error() {
        let cipher = Aes256GcmCipher;
        let sealed = cipher.encrypt(&KEY, b"x", b"").unwrap();
        let result = cipher.decrypt(&KEY, &sealed.ciphertext, &[0u8; 16], b"");
        assert!(matches!(result, Err(VaultError::Encoding(_))));
    }

    #[test]
    fn empty_plaintext_is_not_a_failure() {
        let cipher = Aes256GcmCipher;
        let sealed = cipher.encrypt(&KEY, b"", b"").unwrap();
        let opened = cipher
            .decrypt(&KEY, &sealed.ciphertext, &sealed.nonce, b"")
            .unwrap();
        assert!(opened.is_empty());
    }

    #[test]
    fn same_input_produces_different_nonces() {
        let cipher = Aes256GcmCipher;
        let a = cipher.encrypt(&KEY, b"same input", b"").unwrap();
        let b = cipher.encrypt(&KEY, b"same input", b"").unwrap();
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn large_plaintext_round_trip() {
        let cipher = Aes256GcmCipher;
        let plaintext = vec![0xAB; 100_000];
        let sealed = cipher.encrypt(&KEY, &plaintext, b"").unwrap();
        let opened = cipher
            .decrypt(&KEY, &sealed.ciphertext, &sealed.nonce, b"")
            .unwrap();
        assert_eq!(opened, plaintext);
    }
}
