//! Streamnote read path: replay previously-arrived data,
//! then poll for new chunks every 3 seconds, emitting payload bytes in
//! strict counter order as soon as a contiguous run is available.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use tokio::sync::mpsc;

use crate::codec::CodecRegistry;
use crate::crypto::kdf::derive_key;
use crate::crypto::stream::decrypt_with_derivation;
use crate::error::{Error, Result};
use crate::events::ReaderEvent;
use crate::ledger::types::{Address, ReceivedPayment};
use crate::ledger::LedgerClient;
use crate::metadata::{decode_data_record, PayloadMetadata};
use crate::search;

use super::StreamReadOptions;

const POLL_INTERVAL: Duration = Duration::from_secs(3);
const ROUND_LOOKBACK: u64 = 10;

fn base64_decode(s: &str) -> Result<Vec<u8>> {
    base64::engine::general_purpose::STANDARD
        .decode(s)
        .map_err(|_| Error::DecryptError)
}

pub struct StreamnoteReader {
    client: Arc<dyn LedgerClient>,
    codecs: Arc<CodecRegistry>,
}

impl StreamnoteReader {
    pub fn new(client: Arc<dyn LedgerClient>, codecs: Arc<CodecRegistry>) -> Self {
        Self { client, codecs }
    }

    /// Drives the session until a `stop` transaction is observed, emitting
    /// `ReaderEvent::Data` for every contiguous run of chunks as it becomes
    /// available. Runs until finished or the channel's receiver is dropped.
    pub async fn read(
        &self,
        payload_id: &str,
        options: StreamReadOptions,
        events: mpsc::Sender<ReaderEvent>,
    ) -> Result<()> {
        let metadata_payment = self
            .client
            .lookup_by_id(payload_id)
            .await?
            .ok_or_else(|| Error::Ledger(format!("payload {payload_id} not found")))?;
        let metadata = PayloadMetadata::from_note_bytes(&metadata_payment.note)?;
        let key = self.resolve_key(&options, &metadata)?;
        let seed: Vec<u8> = match (&metadata.salt, &metadata.iv) {
            (Some(salt_b64), _) => base64_decode(salt_b64)?,
            (None, Some(iv_b64)) => base64_decode(iv_b64)?,
            (None, None) => Vec::new(),
        };

        let codec = metadata
            .compression
            .as_ref()
            .map(|name| {
                self.codecs
                    .get(name)
                    .ok_or_else(|| Error::DecompressError(format!("unknown codec: {name}")))
            })
            .transpose()?;

        let receiver: Address = metadata_payment.receiver.clone();

        let mut pending: BTreeMap<u32, Vec<u8>> = BTreeMap::new();
        let mut next_emit: u32 = 0;
        let mut min_round: u64 = 0;

        loop {
            let new_payments =
                search::received_payments_since(self.client.as_ref(), &receiver, payload_id, min_round).await?;

            let mut youngest_round = min_round;
            for payment in &new_payments {
                if payment.round > youngest_round {
                    youngest_round = payment.round;
                }
            }

            let data_payments: Vec<&ReceivedPayment> = new_payments
                .iter()
                .filter(|p| p.sender == metadata_payment.sender)
                .collect();

            for payment in data_payments {
                if let Some((counter, chunk)) = decode_data_record(&payment.note) {
                    if counter < next_emit {
                        continue;
                    }
                    let plaintext = if key != [0u8; 32] || metadata.salt.is_some() || metadata.iv.is_some() {
                        decrypt_with_derivation(&key, chunk, counter, &seed)
                    } else {
                        chunk.to_vec()
                    };
                    pending.insert(counter, plaintext);
                }
            }

            while let Some(chunk) = pending.remove(&next_emit) {
                let out = match &codec {
                    Some(c) => c.uncompress(&chunk).await?,
                    None => chunk,
                };
                if events.send(ReaderEvent::Data(out)).await.is_err() {
                    return Ok(());
                }
                next_emit += 1;
            }

            let stopped = search::find_stop_transaction(self.client.as_ref(), &receiver, payload_id).await?;
            if stopped.is_some() && pending.is_empty() {
                let _ = events.send(ReaderEvent::Finish).await;
                return Ok(());
            }

            min_round = youngest_round.saturating_sub(ROUND_LOOKBACK);
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    fn resolve_key(&self, options: &StreamReadOptions, metadata: &PayloadMetadata) -> Result<[u8; 32]> {
        if let Some(ref salt_b64) = metadata.salt {
            let password = options.password.as_ref().ok_or(Error::MissingPassword)?;
            let salt_bytes = base64_decode(salt_b64)?;
            if salt_bytes.len() != 16 {
                return Err(Error::DecryptError);
            }
            let mut salt = [0u8; 16];
            salt.copy_from_slice(&salt_bytes);
            Ok(derive_key(password, &salt))
        } else if metadata.iv.is_some() {
            options.aes_key.ok_or(Error::MissingKey)
        } else {
            Ok([0u8; 32])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::CompressionSelection;
    use crate::ledger::mock::MockLedger;
    use crate::streamnote::writer::StreamnoteWriter;
    use crate::streamnote::StreamWriteOptions;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn writer_and_reader_round_trip_without_encryption() {
        let client: Arc<dyn LedgerClient> = Arc::new(MockLedger::new());
        let codecs = Arc::new(CodecRegistry::with_defaults());
        let writer = StreamnoteWriter::new(Arc::clone(&client), Arc::clone(&codecs));

        let secret = vec![1u8; 32];
        let (tx, _rx) = mpsc::channel(16);
        let options = StreamWriteOptions {
            compression: CompressionSelection::Explicit("none".to_string()),
            mime: "text/plain".to_string(),
            ..Default::default()
        };
        let handle = writer.start(&secret, b"hello ".to_vec(), options, tx).await.unwrap();
        let payload_id = handle.payload_transaction_id.clone();
        handle.write(b"world").await;
        let _ = handle.stop().await.unwrap();

        let reader = StreamnoteReader::new(Arc::clone(&client), Arc::clone(&codecs));
        let (etx, mut erx) = mpsc::channel(16);
        reader.read(&payload_id, StreamReadOptions::default(), etx).await.unwrap();

        let mut collected = Vec::new();
        while let Some(event) = erx.recv().await {
            match event {
                ReaderEvent::Data(bytes) => collected.extend(bytes),
                ReaderEvent::Finish => break,
                ReaderEvent::Error(e) => panic!("reader error: {e}"),
                ReaderEvent::Log(_) => {}
            }
        }
        assert_eq!(collected, b"hello world");
    }
}
