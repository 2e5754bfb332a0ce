//! Process configuration: environment variables loaded once into an owned
//! struct rather than kept as a mutable singleton, so multiple sessions
//! can run with distinct codec params or process secrets in the same
//! process.

use crate::crypto::process_secret::ProcessSecret;
use crate::error::{Error, Result};

/// Everything the ledger adapter and upload manager need from the
/// environment.
#[derive(Clone)]
pub struct Config {
    pub algod_url: String,
    pub algod_token: String,
    pub algod_port: u16,
    pub indexer_url: String,
    pub indexer_token: String,
    pub indexer_port: u16,
    pub private_key_aes: ProcessSecret,
    pub app_name: String,
    pub sqlite_database_path: String,
}

impl Config {
    /// Load from the process environment. Missing `PRIVATE_KEY_AES` or a
    /// malformed one is a startup error; the rest fall back to sane
    /// defaults for local development against a sandbox node.
    pub fn from_env() -> Result<Self> {
        let private_key_aes_hex = std::env::var("PRIVATE_KEY_AES")
            .map_err(|_| Error::Ledger("PRIVATE_KEY_AES is not set".to_string()))?;

        Ok(Self {
            algod_url: env_or("ALGOD_URL", "http://localhost"),
            algod_token: env_or("ALGOD_TOKEN", ""),
            algod_port: env_or("ALGOD_PORT", "4001").parse().unwrap_or(4001),
            indexer_url: env_or("INDEXER_URL", "http://localhost"),
            indexer_token: env_or("INDEXER_TOKEN", ""),
            indexer_port: env_or("INDEXER_PORT", "8980").parse().unwrap_or(8980),
            private_key_aes: ProcessSecret::from_hex(&private_key_aes_hex)?,
            app_name: env_or("APP_NAME", "ledgernote"),
            sqlite_database_path: env_or("SQLITE_DATABASE_PATH", "./ledgernote.sqlite3"),
        })
    }

    pub fn algod_base_url(&self) -> String {
        format!("{}:{}", self.algod_url, self.algod_port)
    }

    pub fn indexer_base_url(&self) -> String {
        format!("{}:{}", self.indexer_url, self.indexer_port)
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
