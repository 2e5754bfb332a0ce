//! Streamnote write path: a processor task slices and compresses/encrypts
//! the rolling content buffer into note-sized chunks,
//! a submitter task drains the resulting queue onto the ledger, and a
//! cooperative `stop()` finalizes the session with a self-sent `stop`
//! transaction.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::Engine;
use rand::Rng;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::codec::{Codec, CodecRegistry};
use crate::crypto::aead;
use crate::crypto::kdf::derive_key;
use crate::crypto::process_secret::EncryptedEnvelope;
use crate::error::{Error, Result};
use crate::events::{WriteResult, WriterEvent};
use crate::ledger::types::Account;
use crate::ledger::LedgerClient;
use crate::metadata::{MaybeEncrypted, PayloadMetadata, STOP_NOTE};
use crate::transport::submit_with_retry;

use super::padding::{step, PaddingState, StreamCipher};
use super::StreamWriteOptions;

fn base64_encode(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

const PROCESSOR_TICK: Duration = Duration::from_millis(100);
const SUBMITTER_TICK: Duration = Duration::from_millis(1_000);

pub struct StreamnoteWriter {
    client: Arc<dyn LedgerClient>,
    codecs: Arc<CodecRegistry>,
}

impl StreamnoteWriter {
    pub fn new(client: Arc<dyn LedgerClient>, codecs: Arc<CodecRegistry>) -> Self {
        Self { client, codecs }
    }

    /// Open a new session: submits the metadata transaction, then spawns the
    /// processor and submitter loops. `initial` may be empty; the codec is
    /// chosen from it (or defaults to `none` if empty) and held fixed.
    pub async fn start(
        &self,
        sender_secret: &[u8],
        initial: Vec<u8>,
        options: StreamWriteOptions,
        events: mpsc::Sender<WriterEvent>,
    ) -> Result<StreamHandle> {
        let sender = self.client.account_from_secret(sender_secret).await?;
        let receiver = self.client.random_account().await?;

        let selected = self
            .codecs
            .select(&options.compression, &initial, false)
            .await?;
        let codec_name = selected.codec_name.clone();

        let mut metadata = PayloadMetadata {
            version: 1,
            title: MaybeEncrypted::Plain(options.title.clone().unwrap_or_default()),
            mime: options.mime.clone(),
            kind: Some("stream".to_string()),
            size: None,
            txns: None,
            compression: (codec_name != "none").then(|| codec_name.clone()),
            iv: None,
            tag: None,
            salt: None,
            addid: None,
            accid: None,
        };

        let mut effective_key = options.aes_key;
        let mut seed: Vec<u8> = Vec::new();

        if let Some(ref password) = options.password {
            let mut salt = [0u8; 16];
            rand::thread_rng().fill(&mut salt);
            effective_key = Some(derive_key(password, &salt));
            metadata.salt = Some(base64_encode(&salt));
            seed = salt.to_vec();
        } else if effective_key.is_some() {
            let mut iv = [0u8; 16];
            rand::thread_rng().fill(&mut iv);
            metadata.iv = Some(base64_encode(&iv));
            seed = iv.to_vec();
        }

        if let Some(key) = effective_key {
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

        let metadata_note = metadata.to_note_bytes()?;
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

        let content = Arc::new(Mutex::new(initial));
        let queue: Arc<Mutex<Vec<Vec<u8>>>> = Arc::new(Mutex::new(Vec::new()));
        let stop_requested = Arc::new(AtomicBool::new(false));
        let is_finalized = Arc::new(AtomicBool::new(false));

        let processor = tokio::spawn(run_processor(
            Arc::clone(&content),
            Arc::clone(&queue),
            Arc::clone(&stop_requested),
            Arc::clone(&is_finalized),
            Arc::clone(&self.codecs),
            codec_name.clone(),
            effective_key,
            seed,
        ));

        let submitter = tokio::spawn(run_submitter(
            Arc::clone(&self.client),
            Arc::clone(&queue),
            Arc::clone(&is_finalized),
            sender.clone(),
            receiver.clone(),
            sender_secret.to_vec(),
            events.clone(),
            metadata_signed.fee,
        ));

        Ok(StreamHandle {
            content,
            stop_requested,
            processor: Some(processor),
            submitter: Some(submitter),
            payload_transaction_id,
            compression: codec_name,
            payload: metadata,
            start: Instant::now(),
        })
    }
}

async fn run_processor(
    content: Arc<Mutex<Vec<u8>>>,
    queue: Arc<Mutex<Vec<Vec<u8>>>>,
    stop_requested: Arc<AtomicBool>,
    is_finalized: Arc<AtomicBool>,
    codecs: Arc<CodecRegistry>,
    codec_name: String,
    key: Option<[u8; 32]>,
    seed: Vec<u8>,
) {
    let codec: &dyn Codec = codecs.get(&codec_name).expect("codec chosen at session start stays registered");
    let mut state = PaddingState::default();
    let mut counter: u32 = 0;

    loop {
        tokio::time::sleep(PROCESSOR_TICK).await;
        let stop = stop_requested.load(Ordering::SeqCst);

        let mut buf = content.lock().await;
        if buf.is_empty() {
            if stop {
                is_finalized.store(true, Ordering::SeqCst);
                break;
            }
            continue;
        }

        let cipher = key.as_ref().map(|k| StreamCipher { key: k, seed: &seed });
        let outcome = step(&buf, counter, codec, cipher.as_ref(), state.clone(), stop).await;
        match outcome {
            Ok((new_state, Some(chunk))) => {
                buf.drain(0..chunk.consumed);
                let became_empty = buf.is_empty();
                drop(buf);
                state = new_state;
                counter += 1;
                queue.lock().await.push(chunk.record);
                if became_empty && stop {
                    is_finalized.store(true, Ordering::SeqCst);
                    break;
                }
            }
            Ok((new_state, None)) => {
                state = new_state;
            }
            Err(e) => {
                tracing::error!(error = %e, "streamnote processor step failed");
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_submitter(
    client: Arc<dyn LedgerClient>,
    queue: Arc<Mutex<Vec<Vec<u8>>>>,
    is_finalized: Arc<AtomicBool>,
    sender: Account,
    receiver: Account,
    sender_secret: Vec<u8>,
    events: mpsc::Sender<WriterEvent>,
    initial_fees: u64,
) {
    let mut fees = initial_fees;
    let mut sent: u32 = 0;

    loop {
        let batch = {
            let mut q = queue.lock().await;
            std::mem::take(&mut *q)
        };

        for record in batch {
            match submit_with_retry(
                client.as_ref(),
                &sender.addr,
                &receiver.addr,
                &sender_secret,
                0,
                &record,
                None,
            )
            .await
            {
                Ok(signed) => {
                    fees += signed.fee;
                    sent += 1;
                    let _ = events.send(WriterEvent::Progress { sent, total: None }).await;
                }
                Err(e) => {
                    let _ = events.send(WriterEvent::Error(e.to_string())).await;
                }
            }
        }

        let drained = queue.lock().await.is_empty();
        if is_finalized.load(Ordering::SeqCst) && drained {
            break;
        }
        tokio::time::sleep(SUBMITTER_TICK).await;
    }

    // The stop transaction is self-sent by the receiver: the session's
    // generated receiver account signs it itself, closing its remaining
    // balance back to the original sender.
    match submit_with_retry(
        client.as_ref(),
        &receiver.addr,
        &receiver.addr,
        &receiver.secret,
        0,
        STOP_NOTE,
        Some(&sender.addr),
    )
    .await
    {
        Ok(signed) => fees += signed.fee,
        Err(e) => {
            let _ = events.send(WriterEvent::Error(e.to_string())).await;
        }
    }

    let _ = events
        .send(WriterEvent::Log(format!("streamnote session finalized, total fees {fees}")))
        .await;
}

/// Handle to a running streamnote session.
pub struct StreamHandle {
    content: Arc<Mutex<Vec<u8>>>,
    stop_requested: Arc<AtomicBool>,
    processor: Option<JoinHandle<()>>,
    submitter: Option<JoinHandle<()>>,
    pub payload_transaction_id: String,
    pub compression: String,
    pub payload: PayloadMetadata,
    start: Instant,
}

impl StreamHandle {
    /// Append more bytes to the rolling content buffer.
    pub async fn write(&self, bytes: &[u8]) {
        self.content.lock().await.extend_from_slice(bytes);
    }

    /// Cooperatively request finalization: the processor will flush any
    /// remaining buffered bytes and the submitter will send the closing
    /// `stop` transaction. Returns once both background tasks have exited.
    pub async fn stop(mut self) -> Result<WriteResult> {
        self.stop_requested.store(true, Ordering::SeqCst);
        if let Some(processor) = self.processor.take() {
            processor.await.map_err(|e| Error::Ledger(format!("processor task panicked: {e}")))?;
        }
        if let Some(submitter) = self.submitter.take() {
            submitter.await.map_err(|e| Error::Ledger(format!("submitter task panicked: {e}")))?;
        }
        Ok(WriteResult {
            payload_transaction_id: Some(self.payload_transaction_id.clone()),
            fees: 0,
            compression: self.compression.clone(),
            duration: self.start.elapsed(),
            simulation: false,
            payload: self.payload.clone(),
        })
    }
}
