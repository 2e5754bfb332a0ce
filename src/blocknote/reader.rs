//! Blocknote read path.

use std::sync::Arc;

use base64::Engine;

use crate::codec::CodecRegistry;
use crate::crypto::aead;
use crate::crypto::kdf::derive_key;
use crate::error::{Error, Result};
use crate::ledger::LedgerClient;
use crate::metadata::{decode_data_record, reassemble_by_counter, MaybeEncrypted, PayloadMetadata};
use crate::search;

use super::{ReadOptions, ReadResult};

fn base64_decode(s: &str) -> Result<Vec<u8>> {
    base64::engine::general_purpose::STANDARD
        .decode(s)
        .map_err(|_| Error::DecryptError)
}

pub struct BlocknoteReader {
    client: Arc<dyn LedgerClient>,
    codecs: Arc<CodecRegistry>,
}

impl BlocknoteReader {
    pub fn new(client: Arc<dyn LedgerClient>, codecs: Arc<CodecRegistry>) -> Self {
        Self { client, codecs }
    }

    pub async fn read(&self, payload_id: &str, options: ReadOptions) -> Result<ReadResult> {
        let metadata_payment = self
            .client
            .lookup_by_id(payload_id)
            .await?
            .ok_or_else(|| Error::Ledger(format!("payload {payload_id} not found")))?;
        let original_metadata = PayloadMetadata::from_note_bytes(&metadata_payment.note)?;

        let chain = search::revision_chain(
            self.client.as_ref(),
            payload_id,
            &metadata_payment.sender,
            &metadata_payment.receiver,
        )
        .await?;

        let resolved_id = match options.revision {
            Some(r) => {
                let available = (chain.len() as u32).saturating_sub(1);
                chain
                    .get(r as usize)
                    .cloned()
                    .ok_or(Error::InvalidRevisionNumber { requested: r, available })?
            }
            None => chain.last().cloned().unwrap_or_else(|| payload_id.to_string()),
        };

        let (resolved_payment, resolved_metadata) = if resolved_id == payload_id {
            (metadata_payment, original_metadata)
        } else {
            let payment = self
                .client
                .lookup_by_id(&resolved_id)
                .await?
                .ok_or_else(|| Error::Ledger(format!("revision {resolved_id} not found")))?;
            let metadata = PayloadMetadata::from_note_bytes(&payment.note)?;
            (payment, metadata)
        };

        let txns = resolved_metadata
            .txns
            .ok_or_else(|| Error::Ledger("blocknote metadata missing txns count".to_string()))?;

        let mut data_payments =
            search::received_payments(self.client.as_ref(), &resolved_payment.receiver, &resolved_id).await?;
        // The close record is self-sent by the receiver (spec.md §4.6 step 2).
        data_payments.retain(|p| {
            p.sender == resolved_payment.sender || p.sender == resolved_payment.receiver
        });
        data_payments.sort_by_key(|p| p.round);

        if (data_payments.len() as u32) < txns {
            return Err(Error::Ledger(format!(
                "expected {txns} data transactions, found {}",
                data_payments.len()
            )));
        }
        data_payments.truncate(txns as usize);

        let records: Vec<(u32, Vec<u8>)> = data_payments
            .iter()
            .filter_map(|p| decode_data_record(&p.note).map(|(c, chunk)| (c, chunk.to_vec())))
            .collect();
        let mut content = reassemble_by_counter(&records, txns)?;

        let mut resolved_metadata = resolved_metadata;

        if !options.return_raw {
            if resolved_metadata.iv.is_some() {
                let key = self.resolve_key(&options, &resolved_metadata)?;
                let iv_bytes = base64_decode(resolved_metadata.iv.as_ref().unwrap())?;
                let tag_bytes = base64_decode(
                    resolved_metadata
                        .tag
                        .as_ref()
                        .ok_or(Error::DecryptError)?,
                )?;
                if iv_bytes.len() != 12 || tag_bytes.len() != 16 {
                    return Err(Error::DecryptError);
                }
                let mut iv = [0u8; 12];
                let mut tag = [0u8; 16];
                iv.copy_from_slice(&iv_bytes);
                tag.copy_from_slice(&tag_bytes);
                content = aead::decrypt(&key, &iv, &tag, &content)?;

                if let MaybeEncrypted::Encrypted(ref envelope) = resolved_metadata.title {
                    let decrypted_title = self.decrypt_envelope(&key, envelope)?;
                    resolved_metadata.title =
                        MaybeEncrypted::Plain(String::from_utf8_lossy(&decrypted_title).to_string());
                }
            }

            if let Some(ref codec_name) = resolved_metadata.compression {
                let codec = self
                    .codecs
                    .get(codec_name)
                    .ok_or_else(|| Error::DecompressError(format!("unknown codec: {codec_name}")))?;
                content = codec.uncompress(&content).await?;
            }
        }

        Ok(ReadResult {
            payload: resolved_metadata,
            content,
        })
    }

    fn resolve_key(&self, options: &ReadOptions, metadata: &PayloadMetadata) -> Result<[u8; 32]> {
        if let Some(ref salt_b64) = metadata.salt {
            let password = options.password.as_ref().ok_or(Error::MissingPassword)?;
            let salt_bytes = base64_decode(salt_b64)?;
            if salt_bytes.len() != 16 {
                return Err(Error::DecryptError);
            }
            let mut salt = [0u8; 16];
            salt.copy_from_slice(&salt_bytes);
            Ok(derive_key(password, &salt))
        } else {
            options.aes_key.ok_or(Error::MissingKey)
        }
    }

    fn decrypt_envelope(
        &self,
        key: &[u8; 32],
        envelope: &crate::crypto::process_secret::EncryptedEnvelope,
    ) -> Result<Vec<u8>> {
        let iv_bytes = base64_decode(&envelope.iv)?;
        let tag_bytes = base64_decode(&envelope.tag)?;
        let data_bytes = base64_decode(&envelope.data)?;
        if iv_bytes.len() != 12 || tag_bytes.len() != 16 {
            return Err(Error::DecryptError);
        }
        let mut iv = [0u8; 12];
        let mut tag = [0u8; 16];
        iv.copy_from_slice(&iv_bytes);
        tag.copy_from_slice(&tag_bytes);
        aead::decrypt(key, &iv, &tag, &data_bytes)
    }
}
