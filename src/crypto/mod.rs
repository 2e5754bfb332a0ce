//! Cryptographic primitives: whole-payload AEAD, PBKDF2 key derivation,
//! per-chunk deterministic stream encryption, and SHA-256 hashing.

pub mod aead;
pub mod hash;
pub mod kdf;
pub mod process_secret;
pub mod stream;

pub use aead::{decrypt, decrypt_from_derived_key, encrypt, encrypt_with_derived_key};
pub use hash::sha256_hex;
pub use kdf::derive_key;
pub use stream::{decrypt_with_derivation, encrypt_with_derivation};

pub const AES_KEY_LEN: usize = 32;
pub const GCM_NONCE_LEN: usize = 12;
pub const GCM_TAG_LEN: usize = 16;
pub const PBKDF2_ITERATIONS: u32 = 100_000;
pub const SALT_LEN: usize = 16;
pub const CTR_IV_LEN: usize = 16;
