//! One-shot blocknote upload.

use std::sync::Arc;
use std::time::Instant;

use base64::Engine;
use rand::Rng;
use tokio::sync::mpsc;

use crate::codec::CodecRegistry;
use crate::crypto::aead;
use crate::crypto::kdf::derive_key;
use crate::crypto::process_secret::EncryptedEnvelope;
use crate::error::{Error, Result};
use crate::events::{WriteResult, WriterEvent};
use crate::ledger::types::Address;
use crate::ledger::LedgerClient;
use crate::metadata::{chunk_data_records, encode_revision_tag, MaybeEncrypted, PayloadMetadata};
use crate::transport::submit_with_retry;

use super::{RawContent, WriteOptions};

fn base64_encode(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// HD-derivation indices live in `[0, 2^31)`.
fn random_hd_index() -> u32 {
    rand::thread_rng().gen_range(0..(1u32 << 31))
}

pub struct BlocknoteWriter {
    client: Arc<dyn LedgerClient>,
    codecs: Arc<CodecRegistry>,
}

impl BlocknoteWriter {
    pub fn new(client: Arc<dyn LedgerClient>, codecs: Arc<CodecRegistry>) -> Self {
        Self { client, codecs }
    }

    pub async fn write(
        &self,
        sender_secret: &[u8],
        content: RawContent,
        options: WriteOptions,
        events: mpsc::Sender<WriterEvent>,
    ) -> Result<WriteResult> {
        let start = Instant::now();
        let sender = self.client.account_from_secret(sender_secret).await?;

        if let Some(ref revision_of) = options.revision_of {
            let original = self
                .client
                .lookup_by_id(revision_of)
                .await?
                .ok_or_else(|| Error::Ledger(format!("revision_of {revision_of} not found")))?;
            if original.sender != sender.addr {
                return Err(Error::RevisionOwnershipMismatch);
            }
        }

        let raw_bytes = content.as_bytes();
        let original_len = raw_bytes.len() as u64;
        let selected = self
            .codecs
            .select(&options.compression, &raw_bytes, content.is_string())
            .await?;

        let accid = random_hd_index();
        let addid = random_hd_index();
        let receiver = self.client.derive_account(sender_secret, accid, addid).await?;

        let mut metadata = PayloadMetadata {
            version: 1,
            title: MaybeEncrypted::Plain(options.title.clone().unwrap_or_default()),
            mime: options.mime.clone(),
            kind: None,
            size: Some(original_len),
            txns: None,
            compression: (selected.codec_name != "none").then(|| selected.codec_name.clone()),
            iv: None,
            tag: None,
            salt: None,
            addid: Some(addid),
            accid: Some(accid),
        };

        let mut content_bytes = selected.compressed;
        let mut effective_key = options.aes_key;

        if let Some(ref password) = options.password {
            let mut salt = [0u8; 16];
            rand::thread_rng().fill(&mut salt);
            effective_key = Some(derive_key(password, &salt));
            metadata.salt = Some(base64_encode(&salt));
        }

        if let Some(key) = effective_key {
            let (iv, tag, ciphertext) = aead::encrypt(&key, &content_bytes)?;
            metadata.iv = Some(base64_encode(&iv));
            metadata.tag = Some(base64_encode(&tag));
            content_bytes = ciphertext;

            let encrypt_title = options.encrypt_title.unwrap_or(true);
            if encrypt_title {
                if let MaybeEncrypted::Plain(ref title) = metadata.title {
                    let (t_iv, t_tag, t_data) = aead::encrypt(&key, title.as_bytes())?;
                    metadata.title = MaybeEncrypted::Encrypted(EncryptedEnvelope {
                        iv: base64_encode(&t_iv),
                        tag: base64_encode(&t_tag),
                        data: base64_encode(&t_data),
                    });
                }
            }
        }

        let records = chunk_data_records(&content_bytes);
        metadata.txns = Some(records.len() as u32);
        let metadata_note = metadata.to_note_bytes()?;

        if options.simulate {
            let params = self.client.suggested_params().await?;
            let mut fees = params.min_fee; // metadata transaction
            fees += params.min_fee * records.len() as u64; // one per data record
            let result = WriteResult {
                payload_transaction_id: None,
                fees,
                compression: selected.codec_name,
                duration: start.elapsed(),
                simulation: true,
                payload: metadata,
            };
            let _ = events.send(WriterEvent::Finish(result.clone())).await;
            return Ok(result);
        }

        let metadata_signed = submit_with_retry(
            self.client.as_ref(),
            &sender.addr,
            &receiver.addr,
            sender_secret,
            0,
            &metadata_note,
            None,
        )
        .await?;
        let payload_transaction_id = metadata_signed.id.clone();
        let _ = events
            .send(WriterEvent::PayloadTxId(payload_transaction_id.clone()))
            .await;
        let mut fees = metadata_signed.fee;

        let total = records.len() as u32;
        for (i, record) in records.iter().enumerate() {
            let is_last = i + 1 == records.len();
            // The close record is self-sent by the receiver, closing its
            // remaining balance back to the sender (spec.md §3/§4.6), the
            // same pattern the streamnote writer's stop transaction follows.
            let signed = if is_last {
                submit_with_retry(
                    self.client.as_ref(),
                    &receiver.addr,
                    &receiver.addr,
                    &receiver.secret,
                    0,
                    record,
                    Some(&sender.addr),
                )
                .await?
            } else {
                submit_with_retry(
                    self.client.as_ref(),
                    &sender.addr,
                    &receiver.addr,
                    sender_secret,
                    0,
                    record,
                    None,
                )
                .await?
            };
            fees += signed.fee;
            let _ = events
                .send(WriterEvent::Progress {
                    sent: i as u32 + 1,
                    total: Some(total),
                })
                .await;
        }

        if let Some(ref revision_of) = options.revision_of {
            self.submit_revision_tag(revision_of, &sender, sender_secret, &payload_transaction_id, &mut fees)
                .await?;
        }

        let result = WriteResult {
            payload_transaction_id: Some(payload_transaction_id),
            fees,
            compression: selected.codec_name,
            duration: start.elapsed(),
            simulation: false,
            payload: metadata,
        };
        let _ = events.send(WriterEvent::Finish(result.clone())).await;
        Ok(result)
    }

    /// Recover the original payload's receiver and submit the revision-tag
    /// pair: the tag transaction itself, then a close-remainder transaction
    /// zeroing that address.
    async fn submit_revision_tag(
        &self,
        revision_of: &str,
        sender: &crate::ledger::types::Account,
        sender_secret: &[u8],
        new_payload_id: &str,
        fees: &mut u64,
    ) -> Result<()> {
        let original_payment = self
            .client
            .lookup_by_id(revision_of)
            .await?
            .ok_or_else(|| Error::Ledger(format!("revision_of {revision_of} not found")))?;
        let original_metadata = PayloadMetadata::from_note_bytes(&original_payment.note)?;
        let (accid, addid) = (
            original_metadata.accid.ok_or_else(|| Error::Ledger("original metadata missing accid".into()))?,
            original_metadata.addid.ok_or_else(|| Error::Ledger("original metadata missing addid".into()))?,
        );
        let original_receiver: Address = self
            .client
            .derive_account(sender_secret, accid, addid)
            .await?
            .addr;

        let tag_note = encode_revision_tag(new_payload_id);
        let tag_signed = submit_with_retry(
            self.client.as_ref(),
            &sender.addr,
            &original_receiver,
            sender_secret,
            0,
            &tag_note,
            None,
        )
        .await?;
        *fees += tag_signed.fee;

        let close_signed = submit_with_retry(
            self.client.as_ref(),
            &sender.addr,
            &original_receiver,
            sender_secret,
            0,
            b"{}",
            Some(&original_receiver),
        )
        .await?;
        *fees += close_signed.fee;
        Ok(())
    }
}
