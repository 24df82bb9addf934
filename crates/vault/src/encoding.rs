//! Base64 at the storage boundary.
//!
//! Ciphertexts and nonces are written unpadded. Reads accept padded input too,
//! so rows produced by other writers still decode.

use base64::{
    Engine,
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig, general_purpose},
};

use crate::error::VaultError;

const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Encode bytes as unpadded standard base64.
pub fn encode(bytes: &[u8]) -> String {
    general_purpose::STANDARD_NO_PAD.encode(bytes)
}

/// Decode standard base64, padded or not.
pub fn decode(value: &str) -> Result<Vec<u8>, VaultError> {
    LENIENT
        .decode(value)
        .map_err(|e| VaultError::Encoding(format!("invalid base64: {e}")))
}
