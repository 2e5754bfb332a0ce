//! Local SQLite cache for bootstrap sessions.
//!
//! The funding transaction's note is the durable source of truth (it
//! carries a process-encrypted copy of the bootstrap secret, content, and
//! options — see `manager/mod.rs`); this store is a same-process fast path
//! so `get_all_senders`/`get_payload_id_from_sender` don't have to re-walk
//! the indexer and re-decrypt notes for sessions this process itself
//! created. Rows older than 24h are purged at open.

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;

pub struct UploadStore {
    conn: std::sync::Mutex<Connection>,
}

#[derive(Debug, Clone)]
pub struct UploadRecord {
    pub bootstrap_address: String,
    pub secret_hex: String,
    pub content_json: String,
    pub options_json: String,
    pub payload_id: Option<String>,
}

const TTL_CLAUSE: &str = "created_at < datetime('now', '-24 hours')";

impl UploadStore {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS uploads (
                txid TEXT PRIMARY KEY,
                secret_hex TEXT NOT NULL,
                content TEXT NOT NULL,
                params TEXT NOT NULL,
                payload_id TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
        )?;
        conn.execute(&format!("DELETE FROM uploads WHERE {TTL_CLAUSE}"), [])?;
        Ok(Self { conn: std::sync::Mutex::new(conn) })
    }

    pub async fn insert(&self, record: &UploadRecord) -> Result<()> {
        let conn = self.conn.lock().expect("sqlite connection mutex poisoned");
        conn.execute(
            "INSERT OR REPLACE INTO uploads (txid, secret_hex, content, params, payload_id)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.bootstrap_address,
                record.secret_hex,
                record.content_json,
                record.options_json,
                record.payload_id,
            ],
        )?;
        Ok(())
    }

    pub async fn set_payload_id(&self, bootstrap_address: &str, payload_id: &str) -> Result<()> {
        let conn = self.conn.lock().expect("sqlite connection mutex poisoned");
        conn.execute(
            "UPDATE uploads SET payload_id = ?1 WHERE txid = ?2",
            params![payload_id, bootstrap_address],
        )?;
        Ok(())
    }

    pub async fn get(&self, bootstrap_address: &str) -> Result<Option<UploadRecord>> {
        let conn = self.conn.lock().expect("sqlite connection mutex poisoned");
        let record = conn
            .query_row(
                "SELECT txid, secret_hex, content, params, payload_id FROM uploads WHERE txid = ?1",
                params![bootstrap_address],
                |row| {
                    Ok(UploadRecord {
                        bootstrap_address: row.get(0)?,
                        secret_hex: row.get(1)?,
                        content_json: row.get(2)?,
                        options_json: row.get(3)?,
                        payload_id: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    pub async fn all_addresses(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock().expect("sqlite connection mutex poisoned");
        let mut stmt = conn.prepare("SELECT txid FROM uploads ORDER BY created_at")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (UploadStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("uploads.sqlite3");
        let store = UploadStore::open(path.to_str().unwrap()).unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn insert_and_get_round_trips() {
        let (store, _dir) = temp_store();
        let record = UploadRecord {
            bootstrap_address: "ADDR1".to_string(),
            secret_hex: "aa".to_string(),
            content_json: "{}".to_string(),
            options_json: "{}".to_string(),
            payload_id: None,
        };
        store.insert(&record).await.unwrap();
        let fetched = store.get("ADDR1").await.unwrap().unwrap();
        assert_eq!(fetched.secret_hex, "aa");
        assert!(fetched.payload_id.is_none());
    }

    #[tokio::test]
    async fn set_payload_id_updates_existing_row() {
        let (store, _dir) = temp_store();
        let record = UploadRecord {
            bootstrap_address: "ADDR2".to_string(),
            secret_hex: "bb".to_string(),
            content_json: "{}".to_string(),
            options_json: "{}".to_string(),
            payload_id: None,
        };
        store.insert(&record).await.unwrap();
        store.set_payload_id("ADDR2", "PAYLOAD123").await.unwrap();
        let fetched = store.get("ADDR2").await.unwrap().unwrap();
        assert_eq!(fetched.payload_id.as_deref(), Some("PAYLOAD123"));
    }

    #[tokio::test]
    async fn missing_address_returns_none() {
        let (store, _dir) = temp_store();
        assert!(store.get("NOPE").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn all_addresses_lists_every_row() {
        let (store, _dir) = temp_store();
        for addr in ["A", "B", "C"] {
            store
                .insert(&UploadRecord {
                    bootstrap_address: addr.to_string(),
                    secret_hex: "aa".to_string(),
                    content_json: "{}".to_string(),
                    options_json: "{}".to_string(),
                    payload_id: None,
                })
                .await
                .unwrap();
        }
        let addresses = store.all_addresses().await.unwrap();
        assert_eq!(addresses.len(), 3);
    }
}
