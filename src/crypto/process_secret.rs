//! Process-level secret used only by the upload manager to wrap the
//! bootstrap sender's mnemonic inside a funding transaction's note.

use serde::{Deserialize, Serialize};

use super::aead::{decrypt, encrypt};
use crate::error::{Error, Result};

/// An AEAD ciphertext, base64-free JSON shape (hex): `{iv, data, tag}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedEnvelope {
    pub iv: String,
    pub data: String,
    pub tag: String,
}

/// Holds the process-wide AES-256-GCM key used to encrypt manager notes.
/// Constructed once from `Config::private_key_aes` and passed around by
/// reference rather than kept as a mutable singleton.
#[derive(Clone)]
pub struct ProcessSecret {
    key: [u8; 32],
}

impl ProcessSecret {
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let bytes = hex::decode(hex_str).map_err(|e| Error::Ledger(e.to_string()))?;
        if bytes.len() != 32 {
            return Err(Error::Ledger(format!(
                "PRIVATE_KEY_AES must be 32 bytes, got {}",
                bytes.len()
            )));
        }
        let mut key = [0u8; 32];
        key.copy_from_slice(&bytes);
        Ok(Self { key })
    }

    pub fn encrypt_note(&self, plaintext: &[u8]) -> Result<EncryptedEnvelope> {
        let (iv, tag, data) = encrypt(&self.key, plaintext)?;
        Ok(EncryptedEnvelope {
            iv: hex::encode(iv),
            data: hex::encode(data),
            tag: hex::encode(tag),
        })
    }

    pub fn decrypt_note(&self, envelope: &EncryptedEnvelope) -> Result<Vec<u8>> {
        let iv_bytes = hex::decode(&envelope.iv).map_err(|_| Error::DecryptError)?;
        let tag_bytes = hex::decode(&envelope.tag).map_err(|_| Error::DecryptError)?;
        let data_bytes = hex::decode(&envelope.data).map_err(|_| Error::DecryptError)?;

        let mut iv = [0u8; 12];
        let mut tag = [0u8; 16];
        if iv_bytes.len() != 12 || tag_bytes.len() != 16 {
            return Err(Error::DecryptError);
        }
        iv.copy_from_slice(&iv_bytes);
        tag.copy_from_slice(&tag_bytes);

        decrypt(&self.key, &iv, &tag, &data_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_hex_envelope() {
        let secret = ProcessSecret::new([5u8; 32]);
        let envelope = secret.encrypt_note(b"mnemonic words go here").unwrap();
        let decrypted = secret.decrypt_note(&envelope).unwrap();
        assert_eq!(decrypted, b"mnemonic words go here");
    }

    #[test]
    fn wrong_key_fails() {
        let secret = ProcessSecret::new([5u8; 32]);
        let other = ProcessSecret::new([6u8; 32]);
        let envelope = secret.encrypt_note(b"payload").unwrap();
        assert!(other.decrypt_note(&envelope).is_err());
    }
}
