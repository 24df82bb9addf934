//! Plain and encrypted message shapes.

use {
    murmur_vault::{CipherEngine, NONCE_LEN, VaultError, encoding},
    serde::{Deserialize, Serialize},
};

/// A decrypted chat message.
///
/// `id` is 0 until the store assigns one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(default)]
    pub id: i64,
    pub content: String,
    /// Epoch milliseconds.
    pub timestamp: i64,
    pub is_sent: bool,
}

impl Message {
    pub fn new(content: impl Into<String>, timestamp: i64, is_sent: bool) -> Self {
        Self {
            id: 0,
            content: content.into(),
            timestamp,
            is_sent,
        }
    }

    pub fn is_assigned(&self) -> bool {
        self.id != 0
    }
}

/// Row shape of the `messages` table.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct MessageRow {
    pub id: i64,
    /// Unpadded base64 ciphertext with the tag appended.
    pub encrypted_content: String,
    /// Unpadded base64 of the 12-byte nonce.
    pub iv: String,
    pub timestamp: i64,
    pub is_sent: bool,
}

/// A message body sealed under the data key.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptedRecord {
    pub id: i64,
    pub ciphertext: Vec<u8>,
    pub nonce: [u8; NONCE_LEN],
    pub timestamp: i64,
    pub is_sent: bool,
}

impl EncryptedRecord {
    /// Encrypt `message.content` under a fresh nonce.
    pub fn seal(engine: &CipherEngine, message: &Message) -> Result<Self, VaultError> {
        let sealed = engine.encrypt(message.content.as_bytes())?;
        Ok(Self {
            id: message.id,
            ciphertext: sealed.ciphertext,
            nonce: sealed.nonce,
            timestamp: message.timestamp,
            is_sent: message.is_sent,
        })
    }

    /// Decode a stored row. Bad base64 or a wrong-length nonce is an
    /// [`VaultError::Encoding`] failure.
    pub fn from_row(row: &MessageRow) -> Result<Self, VaultError> {
        let ciphertext = encoding::decode(&row.encrypted_content)?;
        let nonce: [u8; NONCE_LEN] = encoding::decode(&row.iv)?
            .try_into()
            .map_err(|raw: Vec<u8>| {
                VaultError::Encoding(format!(
                    "iv is {} bytes, expected {NONCE_LEN}",
                    raw.len()
                ))
            })?;
        Ok(Self {
            id: row.id,
            ciphertext,
            nonce,
            timestamp: row.timestamp,
            is_sent: row.is_sent,
        })
    }

    pub fn to_row(&self) -> MessageRow {
        MessageRow {
            id: self.id,
            encrypted_content: encoding::encode(&self.ciphertext),
            iv: encoding::encode(&self.nonce),
            timestamp: self.timestamp,
            is_sent: self.is_sent,
        }
    }

    /// Decrypt back into a [`Message`].
    pub fn open(&self, engine: &CipherEngine) -> Result<Message, VaultError> {
        let plaintext = engine.decrypt(&self.ciphertext, &self.nonce)?;
        let content = String::from_utf8(plaintext)
            .map_err(|e| VaultError::Encoding(format!("content is not UTF-8: {e}")))?;
        Ok(Message {
            id: self.id,
            content,
            timestamp: self.timestamp,
            is_sent: self.is_sent,
        })
    }
}

impl std::fmt::Debug for EncryptedRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedRecord")
            .field("id", &self.id)
            .field("ciphertext_len", &self.ciphertext.len())
            .field("timestamp", &self.timestamp)
            .field("is_sent", &self.is_sent)
            .finish_non_exhaustive()
    }
}
