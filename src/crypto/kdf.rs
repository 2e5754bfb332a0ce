//! PBKDF2-HMAC-SHA256 key derivation, 100,000 iterations, 32-byte output.

use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;

use super::PBKDF2_ITERATIONS;

/// Derive a 32-byte AES key from a password and a 16-byte salt.
pub fn derive_key(password: &str, salt: &[u8; 16]) -> [u8; 32] {
    let mut key = [0u8; 32];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, PBKDF2_ITERATIONS, &mut key);
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_for_same_inputs() {
        let salt = [1u8; 16];
        assert_eq!(derive_key("pw", &salt), derive_key("pw", &salt));
    }

    #[test]
    fn differs_for_different_passwords() {
        let salt = [1u8; 16];
        assert_ne!(derive_key("pw1", &salt), derive_key("pw2", &salt));
    }

    #[test]
    fn differs_for_different_salts() {
        assert_ne!(derive_key("pw", &[1u8; 16]), derive_key("pw", &[2u8; 16]));
    }
}
