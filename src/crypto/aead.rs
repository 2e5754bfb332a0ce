//! AES-256-GCM whole-payload encryption: random 12-byte nonce, 16-byte tag,
//! no associated data.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::RngCore;

use super::kdf::derive_key;
use crate::error::{Error, Result};

/// Encrypt `plaintext` under `key`, returning `(nonce, tag, ciphertext)`.
pub fn encrypt(key: &[u8; 32], plaintext: &[u8]) -> Result<([u8; 12], [u8; 16], Vec<u8>)> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));

    let mut nonce_bytes = [0u8; 12];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let mut out = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| Error::DecryptError)?;

    // `aes-gcm` appends the 16-byte tag to the ciphertext; split it out so
    // callers can store `(iv, tag, data)` independently, matching the
    // metadata schema's `{iv, tag, data}` shape.
    let tag_start = out.len() - 16;
    let tag_vec = out.split_off(tag_start);
    let mut tag = [0u8; 16];
    tag.copy_from_slice(&tag_vec);

    Ok((nonce_bytes, tag, out))
}

/// Decrypt ciphertext produced by [`encrypt`]. Fails with
/// [`Error::DecryptError`] on tag mismatch.
pub fn decrypt(key: &[u8; 32], nonce: &[u8; 12], tag: &[u8; 16], ciphertext: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let nonce = Nonce::from_slice(nonce);

    let mut combined = Vec::with_capacity(ciphertext.len() + 16);
    combined.extend_from_slice(ciphertext);
    combined.extend_from_slice(tag);

    cipher
        .decrypt(nonce, combined.as_slice())
        .map_err(|_| Error::DecryptError)
}

/// Derive a 32-byte key from `password` and `salt` (100,000 iterations of
/// PBKDF2-HMAC-SHA256), then AEAD-encrypt `plaintext` under it.
pub fn encrypt_with_derived_key(
    password: &str,
    salt: &[u8; 16],
    plaintext: &[u8],
) -> Result<([u8; 12], [u8; 16], Vec<u8>)> {
    let key = derive_key(password, salt);
    encrypt(&key, plaintext)
}

/// Derive a 32-byte key from `password` and `salt`, then AEAD-decrypt.
pub fn decrypt_from_derived_key(
    password: &str,
    salt: &[u8; 16],
    nonce: &[u8; 12],
    tag: &[u8; 16],
    ciphertext: &[u8],
) -> Result<Vec<u8>> {
    let key = derive_key(password, salt);
    decrypt(&key, nonce, tag, ciphertext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let key = [7u8; 32];
        let plaintext = b"store me on the ledger";
        let (nonce, tag, ciphertext) = encrypt(&key, plaintext).unwrap();
        let decrypted = decrypt(&key, &nonce, &tag, &ciphertext).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn tampering_ciphertext_fails() {
        let key = [7u8; 32];
        let plaintext = b"store me on the ledger";
        let (nonce, tag, mut ciphertext) = encrypt(&key, plaintext).unwrap();
        ciphertext[0] ^= 0xff;
        assert!(decrypt(&key, &nonce, &tag, &ciphertext).is_err());
    }

    #[test]
    fn tampering_tag_fails() {
        let key = [7u8; 32];
        let plaintext = b"store me on the ledger";
        let (nonce, mut tag, ciphertext) = encrypt(&key, plaintext).unwrap();
        tag[0] ^= 0xff;
        assert!(decrypt(&key, &nonce, &tag, &ciphertext).is_err());
    }

    #[test]
    fn password_round_trip() {
        let salt = [3u8; 16];
        let plaintext = b"secret";
        let (nonce, tag, ciphertext) =
            encrypt_with_derived_key("pw", &salt, plaintext).unwrap();
        let decrypted =
            decrypt_from_derived_key("pw", &salt, &nonce, &tag, &ciphertext).unwrap();
        assert_eq!(decrypted, plaintext);

        assert!(decrypt_from_derived_key("wrong", &salt, &nonce, &tag, &ciphertext).is_err());
    }
}
