//! Upload manager: lets a payload be funded and written by
//! two different parties without the writer ever handling the payload's
//! secret key directly. A caller prepares a funding transaction to a fresh
//! bootstrap account; once that transaction is confirmed (by whoever holds
//! the funder's key), `run_from_bootstrap_transaction` recovers the
//! bootstrap secret from the funding note itself and performs the actual
//! blocknote write.

pub mod jobs;
pub mod store;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::blocknote::{RawContent, WriteOptions};
use crate::blocknote::writer::BlocknoteWriter;
use crate::codec::CodecRegistry;
use crate::crypto::process_secret::{EncryptedEnvelope, ProcessSecret};
use crate::error::{Error, Result};
use crate::events::{WriteResult, WriterEvent};
use crate::ledger::types::{Address, UnsignedPayment};
use crate::ledger::LedgerClient;
use crate::transport::submit_with_retry;

use jobs::JobTable;
use store::{UploadRecord, UploadStore};

/// Fixed funding-amount buffer: a flat 0.2 Algo unit plus two min-balances
/// worth of headroom, so the bootstrap account can cover both the metadata
/// transaction's and every data transaction's minimum balance requirement
/// even if the fee estimate from simulation undershoots slightly.
pub const FUNDING_UNIT_BUFFER: u64 = 200_000;
pub const MIN_BALANCE: u64 = 100_000;

#[derive(Debug, Serialize, Deserialize)]
struct FundingNote {
    app: String,
    blocknote: EncryptedEnvelope,
}

/// Never carries `aes_key`/`password`/`encrypt_title` — those are supplied
/// only by whoever calls `run_from_bootstrap_transaction`, so the funding
/// note (and anything that can decrypt it) never reveals the payload's
/// encryption material.
#[derive(Debug, Serialize, Deserialize)]
struct BootstrapPayload {
    secret_hex: String,
    content_b64: String,
    is_text: bool,
    mime: String,
    title: Option<String>,
}

pub struct BootstrapPreparation {
    pub funding_transaction: UnsignedPayment,
    pub bootstrap_address: Address,
    pub funding_amount: u64,
    /// Hex-encoded bootstrap secret, handed back to the caller out of band
    /// (never embedded unencrypted anywhere on-chain) so it can later be
    /// presented to `run_from_bootstrap_transaction` as proof of affiliation.
    pub bootstrap_key: String,
}

pub struct UploadManager {
    client: Arc<dyn LedgerClient>,
    codecs: Arc<CodecRegistry>,
    process_secret: ProcessSecret,
    app_name: String,
    store: UploadStore,
    jobs: Arc<JobTable>,
}

impl UploadManager {
    pub fn new(
        client: Arc<dyn LedgerClient>,
        codecs: Arc<CodecRegistry>,
        process_secret: ProcessSecret,
        app_name: String,
        store: UploadStore,
    ) -> Self {
        Self { client, codecs, process_secret, app_name, store, jobs: JobTable::new() }
    }

    pub fn jobs(&self) -> Arc<JobTable> {
        Arc::clone(&self.jobs)
    }

    /// Build (but do not submit) the funding transaction a caller should
    /// sign with the funder's key. Persists the bootstrap session locally
    /// so `get_all_senders`/`get_payload_id_from_sender` can find it again
    /// without re-decrypting the on-chain note.
    pub async fn prepare_bootstrap_transaction(
        &self,
        funder: &Address,
        content: RawContent,
        options: WriteOptions,
    ) -> Result<BootstrapPreparation> {
        if options.aes_key.is_some() || options.password.is_some() || options.encrypt_title.is_some() {
            return Err(Error::BootstrapEncryptionRejected);
        }

        let bootstrap = self.client.random_account().await?;
        let writer = BlocknoteWriter::new(Arc::clone(&self.client), Arc::clone(&self.codecs));

        let mut sim_options = options.clone();
        sim_options.simulate = true;
        let (sim_tx, mut sim_rx) = mpsc::channel(16);
        let simulation = writer
            .write(&bootstrap.secret, content.clone(), sim_options, sim_tx)
            .await?;
        sim_rx.close();

        let funding_amount = simulation.fees + FUNDING_UNIT_BUFFER + 2 * MIN_BALANCE;

        let payload = BootstrapPayload {
            secret_hex: hex::encode(&bootstrap.secret),
            content_b64: base64_encode(&content.as_bytes()),
            is_text: content.is_string(),
            mime: options.mime.clone(),
            title: options.title.clone(),
        };
        let payload_bytes = serde_json::to_vec(&payload)?;
        let envelope = self.process_secret.encrypt_note(&payload_bytes)?;
        let note = FundingNote { app: self.app_name.clone(), blocknote: envelope };
        let note_bytes = serde_json::to_vec(&note)?;

        let params = self.client.suggested_params().await?;
        let funding_transaction = self
            .client
            .build_payment(funder, &bootstrap.addr, funding_amount, &note_bytes, None, &params)
            .await?;

        self.store
            .insert(&UploadRecord {
                bootstrap_address: bootstrap.addr.0.clone(),
                secret_hex: hex::encode(&bootstrap.secret),
                content_json: serde_json::to_string(&payload)?,
                options_json: serde_json::to_string(&options_summary(&options))?,
                payload_id: None,
            })
            .await?;

        Ok(BootstrapPreparation {
            funding_transaction,
            bootstrap_address: bootstrap.addr,
            funding_amount,
            bootstrap_key: hex::encode(&bootstrap.secret),
        })
    }

    /// Recover the bootstrap secret and content from a confirmed funding
    /// transaction's note, verify `bootstrap_key` (the hex secret the caller
    /// was handed by `prepare_bootstrap_transaction`) matches what the note
    /// decrypts to, then perform the real (non-simulated) blocknote write,
    /// closing the bootstrap account's residual balance back to the funder.
    /// `encryption`, if given, may supply an encryption key or password the
    /// funder didn't want embedded in the funding note.
    pub async fn run_from_bootstrap_transaction(
        &self,
        funding_tx_id: &str,
        bootstrap_key: &str,
        encryption: Option<WriteOptions>,
        events: mpsc::Sender<WriterEvent>,
    ) -> Result<WriteResult> {
        let funding = self
            .client
            .lookup_by_id(funding_tx_id)
            .await?
            .ok_or_else(|| Error::Ledger(format!("funding transaction {funding_tx_id} not found")))?;

        let note: FundingNote = serde_json::from_slice(&funding.note)?;
        let decrypted = self.process_secret.decrypt_note(&note.blocknote)?;
        let payload: BootstrapPayload = serde_json::from_slice(&decrypted)?;

        if payload.secret_hex != bootstrap_key {
            return Err(Error::InvalidBootstrapKey);
        }

        let secret = hex::decode(&payload.secret_hex).map_err(|_| Error::InvalidBootstrapKey)?;
        let bootstrap_account = self.client.account_from_secret(&secret).await?;
        if bootstrap_account.addr != funding.receiver {
            return Err(Error::InvalidBootstrapKey);
        }

        let job_id = self.jobs.start(&bootstrap_account.addr.0).await;

        let mut write_options = WriteOptions {
            compression: Default::default(),
            mime: payload.mime.clone(),
            title: payload.title.clone(),
            encrypt_title: None,
            aes_key: None,
            password: None,
            revision_of: None,
            simulate: false,
        };
        if let Some(enc) = encryption {
            write_options.aes_key = enc.aes_key;
            write_options.password = enc.password;
            write_options.encrypt_title = enc.encrypt_title;
        }

        let content_bytes = base64_decode(&payload.content_b64)?;
        let content = if payload.is_text {
            RawContent::Text(String::from_utf8_lossy(&content_bytes).to_string())
        } else {
            RawContent::Bytes(content_bytes)
        };

        let writer = BlocknoteWriter::new(Arc::clone(&self.client), Arc::clone(&self.codecs));
        let result = match writer.write(&secret, content, write_options, events.clone()).await {
            Ok(result) => result,
            Err(e) => {
                self.jobs.fail(job_id, &e.to_string()).await;
                return Err(e);
            }
        };

        if let Some(ref payload_id) = result.payload_transaction_id {
            self.jobs.complete(job_id, payload_id).await;
            let _ = self.store.set_payload_id(&bootstrap_account.addr.0, payload_id).await;
        }

        let _ = submit_with_retry(
            self.client.as_ref(),
            &bootstrap_account.addr,
            &funding.sender,
            &secret,
            0,
            b"{}",
            Some(&funding.sender),
        )
        .await;

        Ok(result)
    }

    /// Every bootstrap address this process has prepared or run a session
    /// for, scoped to local state (see DESIGN.md).
    pub async fn get_all_senders(&self) -> Result<Vec<String>> {
        self.store.all_addresses().await
    }

    pub async fn get_payload_id_from_sender(&self, bootstrap_address: &str) -> Result<Option<String>> {
        Ok(self.store.get(bootstrap_address).await?.and_then(|r| r.payload_id))
    }

    pub async fn get_bootstrap_sender_mnemonic(&self, bootstrap_address: &str) -> Result<Option<String>> {
        Ok(self.store.get(bootstrap_address).await?.map(|r| r.secret_hex))
    }
}

fn options_summary(options: &WriteOptions) -> serde_json::Value {
    serde_json::json!({
        "mime": options.mime,
        "title": options.title,
        "hasKey": options.aes_key.is_some(),
        "hasPassword": options.password.is_some(),
    })
}

fn base64_encode(bytes: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

fn base64_decode(s: &str) -> Result<Vec<u8>> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD
        .decode(s)
        .map_err(|_| Error::DecryptError)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::mock::MockLedger;

    fn temp_store() -> (UploadStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("uploads.sqlite3");
        let store = UploadStore::open(path.to_str().unwrap()).unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn bootstrap_round_trip_writes_the_payload() {
        let client: Arc<dyn LedgerClient> = Arc::new(MockLedger::new());
        let codecs = Arc::new(CodecRegistry::with_defaults());
        let process_secret = ProcessSecret::new([9u8; 32]);
        let (store, _dir) = temp_store();
        let manager = UploadManager::new(
            Arc::clone(&client),
            Arc::clone(&codecs),
            process_secret,
            "ledgernote-test".to_string(),
            store,
        );

        let funder = client.random_account().await.unwrap();
        let options = WriteOptions {
            mime: "text/plain".to_string(),
            ..Default::default()
        };
        let preparation = manager
            .prepare_bootstrap_transaction(&funder.addr, RawContent::Text("hello bootstrap".to_string()), options)
            .await
            .unwrap();

        let signed = client.sign(&preparation.funding_transaction, &funder.secret).await.unwrap();
        client.submit(&signed).await.unwrap();

        let (tx, _rx) = mpsc::channel(16);
        let result = manager
            .run_from_bootstrap_transaction(&signed.id, &preparation.bootstrap_key, None, tx)
            .await
            .unwrap();
        assert!(result.payload_transaction_id.is_some());

        let senders = manager.get_all_senders().await.unwrap();
        assert_eq!(senders, vec![preparation.bootstrap_address.0.clone()]);

        let payload_id = manager
            .get_payload_id_from_sender(&preparation.bootstrap_address.0)
            .await
            .unwrap();
        assert_eq!(payload_id, result.payload_transaction_id);
    }

    #[tokio::test]
    async fn tampered_bootstrap_secret_is_rejected() {
        let client: Arc<dyn LedgerClient> = Arc::new(MockLedger::new());
        let codecs = Arc::new(CodecRegistry::with_defaults());
        let process_secret = ProcessSecret::new([9u8; 32]);
        let other_secret = ProcessSecret::new([1u8; 32]);
        let (store, _dir) = temp_store();
        let manager = UploadManager::new(
            Arc::clone(&client),
            Arc::clone(&codecs),
            process_secret,
            "ledgernote-test".to_string(),
            store,
        );

        let funder = client.random_account().await.unwrap();
        let preparation = manager
            .prepare_bootstrap_transaction(
                &funder.addr,
                RawContent::Text("hi".to_string()),
                WriteOptions { mime: "text/plain".to_string(), ..Default::default() },
            )
            .await
            .unwrap();
        let signed = client.sign(&preparation.funding_transaction, &funder.secret).await.unwrap();
        client.submit(&signed).await.unwrap();

        let (store2, _dir2) = temp_store();
        let wrong_manager = UploadManager::new(
            client,
            codecs,
            other_secret,
            "ledgernote-test".to_string(),
            store2,
        );
        let (tx, _rx) = mpsc::channel(16);
        let result = wrong_manager
            .run_from_bootstrap_transaction(&signed.id, &preparation.bootstrap_key, None, tx)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn prepare_rejects_embedded_encryption_material() {
        let client: Arc<dyn LedgerClient> = Arc::new(MockLedger::new());
        let codecs = Arc::new(CodecRegistry::with_defaults());
        let process_secret = ProcessSecret::new([9u8; 32]);
        let (store, _dir) = temp_store();
        let manager = UploadManager::new(client.clone(), codecs, process_secret, "ledgernote-test".to_string(), store);

        let funder = client.random_account().await.unwrap();
        let result = manager
            .prepare_bootstrap_transaction(
                &funder.addr,
                RawContent::Text("hi".to_string()),
                WriteOptions {
                    mime: "text/plain".to_string(),
                    password: Some("pw".to_string()),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(result, Err(Error::BootstrapEncryptionRejected)));
    }

    #[tokio::test]
    async fn wrong_bootstrap_key_is_rejected() {
        let client: Arc<dyn LedgerClient> = Arc::new(MockLedger::new());
        let codecs = Arc::new(CodecRegistry::with_defaults());
        let process_secret = ProcessSecret::new([9u8; 32]);
        let (store, _dir) = temp_store();
        let manager = UploadManager::new(client.clone(), codecs, process_secret, "ledgernote-test".to_string(), store);

        let funder = client.random_account().await.unwrap();
        let preparation = manager
            .prepare_bootstrap_transaction(
                &funder.addr,
                RawContent::Text("hi".to_string()),
                WriteOptions { mime: "text/plain".to_string(), ..Default::default() },
            )
            .await
            .unwrap();
        let signed = client.sign(&preparation.funding_transaction, &funder.secret).await.unwrap();
        client.submit(&signed).await.unwrap();

        let (tx, _rx) = mpsc::channel(16);
        let result = manager
            .run_from_bootstrap_transaction(&signed.id, "deadbeef", None, tx)
            .await;
        assert!(matches!(result, Err(Error::InvalidBootstrapKey)));
    }
}
