//! HTTP adapter over a real algod node and indexer.
//!
//! The core codec/transport state machine only ever talks to the
//! [`super::LedgerClient`] trait, so this module's job is narrowly to turn
//! that trait's calls into algod/indexer REST requests and signed,
//! msgpack-encoded Algorand transactions. Address derivation, canonical
//! transaction encoding and the "TX"-prefixed signing preimage follow the
//! conventions of `perfectmak-rust-algorand-sdk`'s `transaction`/`accounts`
//! modules, re-derived in this crate's idiom rather than vendored.

use async_trait::async_trait;
use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;
use sha2::{Digest, Sha512_256};

use super::types::{
    Account, Address, AddressRole, ConfirmationOutcome, ReceivedPayment, SearchFilter, SignedTxn,
    SuggestedParams, UnsignedPayment,
};
use super::{LedgerClient, SEARCH_PAGE_SIZE};
use crate::error::{Error, Result};

/// HTTP client wrapping an algod node (build/sign/submit/confirm) and an
/// indexer (lookup/search).
pub struct AlgodClient {
    http: reqwest::Client,
    algod_url: String,
    algod_token: String,
    indexer_url: String,
    indexer_token: String,
}

impl AlgodClient {
    pub fn new(algod_url: String, algod_token: String, indexer_url: String, indexer_token: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            algod_url,
            algod_token,
            indexer_url,
            indexer_token,
        }
    }

    async fn algod_get(&self, path: &str) -> Result<serde_json::Value> {
        self.http
            .get(format!("{}{}", self.algod_url, path))
            .header("X-Algo-API-Token", &self.algod_token)
            .send()
            .await
            .map_err(|e| Error::Ledger(format!("algod GET {path} failed: {e}")))?
            .json()
            .await
            .map_err(|e| Error::Ledger(format!("algod GET {path} bad response: {e}")))
    }

    async fn algod_post_binary(&self, path: &str, body: Vec<u8>) -> Result<serde_json::Value> {
        self.http
            .post(format!("{}{}", self.algod_url, path))
            .header("X-Algo-API-Token", &self.algod_token)
            .header("Content-Type", "application/x-binary")
            .body(body)
            .send()
            .await
            .map_err(|e| Error::Ledger(format!("algod POST {path} failed: {e}")))?
            .json()
            .await
            .map_err(|e| Error::Ledger(format!("algod POST {path} bad response: {e}")))
    }

    async fn indexer_get(&self, path: &str) -> Result<serde_json::Value> {
        self.http
            .get(format!("{}{}", self.indexer_url, path))
            .header("X-Indexer-API-Token", &self.indexer_token)
            .send()
            .await
            .map_err(|e| Error::Ledger(format!("indexer GET {path} failed: {e}")))?
            .json()
            .await
            .map_err(|e| Error::Ledger(format!("indexer GET {path} bad response: {e}")))
    }
}

/// Raw payment transaction. Field order is the struct's declaration order,
/// which is why fields are declared alphabetically by their msgpack key
/// (`amt` < `close` < `fee` < `fv` < `gen` < `gh` < `lv` < `note` < `rcv`
/// < `snd` < `type`) — canonical msgpack requires map keys sorted, and
/// `rmp_serde`'s struct-as-map mode preserves declaration order rather than
/// sorting for us.
#[derive(Serialize, Deserialize)]
struct RawPayment {
    amt: u64,
    #[serde(rename = "close", skip_serializing_if = "Option::is_none")]
    close_remainder_to: Option<ByteBuf>,
    fee: u64,
    fv: u64,
    gen: String,
    gh: ByteBuf,
    lv: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    note: Option<ByteBuf>,
    rcv: ByteBuf,
    snd: ByteBuf,
    #[serde(rename = "type")]
    tx_type: String,
}

/// A signed transaction, ready to broadcast. Field order again mirrors
/// sorted msgpack keys (`sig` < `txn`).
#[derive(Serialize, Deserialize)]
struct SignedWire {
    sig: ByteBuf,
    txn: RawPayment,
}

fn to_raw_payment(unsigned: &UnsignedPayment, sender_pubkey: &[u8; 32]) -> RawPayment {
    RawPayment {
        amt: unsigned.amount,
        close_remainder_to: unsigned
            .close_remainder_to
            .as_ref()
            .map(|a| ByteBuf::from(decode_address(a).to_vec())),
        fee: unsigned.params.min_fee,
        fv: unsigned.params.first_valid,
        gen: unsigned.params.genesis_id.clone(),
        gh: ByteBuf::from(unsigned.params.genesis_hash.clone()),
        lv: unsigned.params.last_valid,
        note: if unsigned.note.is_empty() {
            None
        } else {
            Some(ByteBuf::from(unsigned.note.clone()))
        },
        rcv: ByteBuf::from(decode_address(&unsigned.receiver).to_vec()),
        snd: ByteBuf::from(sender_pubkey.to_vec()),
        tx_type: "pay".to_string(),
    }
}

fn rmp_encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut serializer = rmp_serde::Serializer::new(&mut buf).with_struct_map();
    value
        .serialize(&mut serializer)
        .map_err(|e| Error::Ledger(format!("msgpack encoding failed: {e}")))?;
    Ok(buf)
}

fn with_tx_tag(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 + bytes.len());
    out.extend_from_slice(b"TX");
    out.extend_from_slice(bytes);
    out
}

fn encode_address(pubkey: &[u8; 32]) -> Address {
    let checksum = Sha512_256::digest(pubkey);
    let mut payload = pubkey.to_vec();
    payload.extend_from_slice(&checksum[28..32]);
    Address(base32::encode(base32::Alphabet::Rfc4648 { padding: false }, &payload))
}

fn decode_address(addr: &Address) -> [u8; 32] {
    let decoded = base32::decode(base32::Alphabet::Rfc4648 { padding: false }, &addr.0)
        .unwrap_or_else(|| vec![0u8; 36]);
    let mut pubkey = [0u8; 32];
    pubkey.copy_from_slice(&decoded[..32.min(decoded.len())]);
    pubkey
}

fn txn_id(tagged_bytes: &[u8]) -> String {
    let digest = Sha512_256::digest(tagged_bytes);
    base32::encode(base32::Alphabet::Rfc4648 { padding: false }, &digest)[..52].to_string()
}

#[async_trait]
impl LedgerClient for AlgodClient {
    async fn suggested_params(&self) -> Result<SuggestedParams> {
        let v = self.algod_get("/v2/transactions/params").await?;
        Ok(SuggestedParams {
            fee_per_byte: v.get("fee").and_then(|x| x.as_u64()).unwrap_or(0),
            min_fee: v.get("min-fee").and_then(|x| x.as_u64()).unwrap_or(1000),
            first_valid: v.get("last-round").and_then(|x| x.as_u64()).unwrap_or(0) + 1,
            last_valid: v.get("last-round").and_then(|x| x.as_u64()).unwrap_or(0) + 1001,
            genesis_id: v
                .get("genesis-id")
                .and_then(|x| x.as_str())
                .unwrap_or_default()
                .to_string(),
            genesis_hash: v
                .get("genesis-hash")
                .and_then(|x| x.as_str())
                .and_then(|s| base64_decode(s))
                .unwrap_or_default(),
        })
    }

    async fn build_payment(
        &self,
        sender: &Address,
        receiver: &Address,
        amount: u64,
        note: &[u8],
        close_to: Option<&Address>,
        params: &SuggestedParams,
    ) -> Result<UnsignedPayment> {
        Ok(UnsignedPayment {
            id: String::new(), // assigned once signed; the id depends on the signature preimage.
            sender: sender.clone(),
            receiver: receiver.clone(),
            amount,
            note: note.to_vec(),
            close_remainder_to: close_to.cloned(),
            params: params.clone(),
        })
    }

    async fn sign(&self, unsigned: &UnsignedPayment, sender_secret: &[u8]) -> Result<SignedTxn> {
        if sender_secret.len() != 32 {
            return Err(Error::Ledger("signing key must be a 32-byte seed".into()));
        }
        let mut seed = [0u8; 32];
        seed.copy_from_slice(sender_secret);
        let signing_key = SigningKey::from_bytes(&seed);
        let verifying_key: VerifyingKey = signing_key.verifying_key();
        let pubkey = verifying_key.to_bytes();

        let raw_payment = to_raw_payment(unsigned, &pubkey);
        let raw_bytes = rmp_encode(&raw_payment)?;
        let tagged = with_tx_tag(&raw_bytes);
        let id = txn_id(&tagged);
        let signature = signing_key.sign(&tagged);

        let wire = SignedWire {
            sig: ByteBuf::from(signature.to_bytes().to_vec()),
            txn: raw_payment,
        };
        let signed_bytes = rmp_encode(&wire)?;

        Ok(SignedTxn {
            id,
            bytes: signed_bytes,
            fee: unsigned.params.min_fee,
            last_valid: unsigned.params.last_valid,
            sender: unsigned.sender.clone(),
            receiver: unsigned.receiver.clone(),
            amount: unsigned.amount,
            note: unsigned.note.clone(),
            close_remainder_to: unsigned.close_remainder_to.clone(),
        })
    }

    async fn submit(&self, signed: &SignedTxn) -> Result<()> {
        let resp = self.algod_post_binary("/v2/transactions", signed.bytes.clone()).await;
        match resp {
            Ok(_) => Ok(()),
            Err(Error::Ledger(msg)) if msg.contains("already in ledger") => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn wait_for_confirmation(&self, signed: &SignedTxn) -> Result<ConfirmationOutcome> {
        loop {
            let pending = self
                .algod_get(&format!("/v2/transactions/pending/{}", signed.id))
                .await?;

            if let Some(round) = pending.get("confirmed-round").and_then(|v| v.as_u64()) {
                return Ok(ConfirmationOutcome::Executed { round });
            }
            if let Some(err) = pending.get("pool-error").and_then(|v| v.as_str()) {
                if !err.is_empty() {
                    return Ok(ConfirmationOutcome::PoolError(err.to_string()));
                }
            }

            let status = self.algod_get("/v2/status").await?;
            let current_round = status
                .get("last-round")
                .and_then(|v| v.as_u64())
                .unwrap_or(0);

            if current_round > signed.last_valid {
                return Ok(ConfirmationOutcome::Expired);
            }

            let _ = self
                .algod_get(&format!("/v2/status/wait-for-block-after/{current_round}"))
                .await;
        }
    }

    async fn lookup_by_id(&self, id: &str) -> Result<Option<ReceivedPayment>> {
        let resp = self.indexer_get(&format!("/v2/transactions/{id}")).await;
        let v = match resp {
            Ok(v) => v,
            Err(_) => return Ok(None),
        };
        Ok(parse_indexer_txn(&v.get("transaction").cloned().unwrap_or(v)))
    }

    async fn search_page(
        &self,
        filter: &SearchFilter,
        next: Option<&str>,
    ) -> Result<(Vec<ReceivedPayment>, Option<String>)> {
        let role_param = match filter.role {
            AddressRole::Sender => "sender",
            AddressRole::Receiver => "receiver",
        };
        let mut path = format!(
            "/v2/accounts/{}/transactions?tx-type=pay&address-role={}&limit={}",
            filter.address.0, role_param, SEARCH_PAGE_SIZE
        );
        if let Some(min_round) = filter.min_round {
            path.push_str(&format!("&min-round={min_round}"));
        }
        if let Some(cursor) = next {
            path.push_str(&format!("&next={cursor}"));
        }

        let v = self.indexer_get(&path).await?;
        let txns = v
            .get("transactions")
            .and_then(|t| t.as_array())
            .cloned()
            .unwrap_or_default();

        let page: Vec<ReceivedPayment> = txns.iter().filter_map(parse_indexer_txn).collect();
        let next_token = v
            .get("next-token")
            .and_then(|t| t.as_str())
            .map(|s| s.to_string());

        Ok((page, next_token))
    }

    async fn derive_account(&self, sender_secret: &[u8], accid: u32, addid: u32) -> Result<Account> {
        // HD derivation: a fresh ed25519 seed deterministically derived from
        // the sender's seed and the (accid, addid) indices via SHA-512/256,
        // the same primitive used for transaction ids.
        let mut material = Vec::with_capacity(sender_secret.len() + 8);
        material.extend_from_slice(sender_secret);
        material.extend_from_slice(&accid.to_be_bytes());
        material.extend_from_slice(&addid.to_be_bytes());
        let seed: [u8; 32] = Sha512_256::digest(&material).into();

        let signing_key = SigningKey::from_bytes(&seed);
        let addr = encode_address(&signing_key.verifying_key().to_bytes());
        Ok(Account {
            addr,
            secret: seed.to_vec(),
        })
    }

    async fn random_account(&self) -> Result<Account> {
        let mut seed = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut seed);
        let signing_key = SigningKey::from_bytes(&seed);
        let addr = encode_address(&signing_key.verifying_key().to_bytes());
        Ok(Account {
            addr,
            secret: seed.to_vec(),
        })
    }

    async fn account_from_secret(&self, secret: &[u8]) -> Result<Account> {
        if secret.len() != 32 {
            return Err(Error::Ledger("account secret must be a 32-byte seed".into()));
        }
        let mut seed = [0u8; 32];
        seed.copy_from_slice(secret);
        let signing_key = SigningKey::from_bytes(&seed);
        let addr = encode_address(&signing_key.verifying_key().to_bytes());
        Ok(Account {
            addr,
            secret: seed.to_vec(),
        })
    }
}

fn parse_indexer_txn(v: &serde_json::Value) -> Option<ReceivedPayment> {
    let id = v.get("id").and_then(|x| x.as_str())?.to_string();
    let sender = v.get("sender").and_then(|x| x.as_str())?.to_string();
    let round = v.get("confirmed-round").and_then(|x| x.as_u64()).unwrap_or(0);
    let payment = v.get("payment-transaction")?;
    let receiver = payment.get("receiver").and_then(|x| x.as_str())?.to_string();
    let amount = payment.get("amount").and_then(|x| x.as_u64()).unwrap_or(0);
    let close_remainder_to = payment
        .get("close-remainder-to")
        .and_then(|x| x.as_str())
        .map(|s| Address(s.to_string()));
    let note = v
        .get("note")
        .and_then(|x| x.as_str())
        .and_then(base64_decode)
        .unwrap_or_default();

    Some(ReceivedPayment {
        id,
        sender: Address(sender),
        receiver: Address(receiver),
        amount,
        note,
        close_remainder_to,
        round,
        confirmed: round > 0,
    })
}

fn base64_decode(s: &str) -> Option<Vec<u8>> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.decode(s).ok()
}
