//! In-memory ledger for tests: an append-only log of confirmed payments,
//! searchable the same way a real indexer would be. Submission confirms
//! immediately; `wait_for_confirmation` never actually blocks.

use std::sync::Arc;

use async_trait::async_trait;
use rand::RngCore;
use tokio::sync::Mutex;

use super::types::{
    Account, Address, ConfirmationOutcome, ReceivedPayment, SearchFilter, AddressRole, SignedTxn,
    SuggestedParams, UnsignedPayment,
};
use super::{LedgerClient, SEARCH_PAGE_SIZE};
use crate::crypto::hash::sha256_hex;
use crate::error::Result;

struct MockState {
    round: u64,
    ledger: Vec<ReceivedPayment>,
}

/// In-memory ledger. Cheap to clone (an `Arc` around shared state) so
/// tests can hand the same ledger to a writer and a reader.
#[derive(Clone)]
pub struct MockLedger {
    state: Arc<Mutex<MockState>>,
    min_fee: u64,
}

impl Default for MockLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLedger {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                round: 1,
                ledger: Vec::new(),
            })),
            min_fee: 1000,
        }
    }

    /// Every payment submitted so far, in submission order. Test-only
    /// convenience for asserting on close-remainder ordering etc.
    pub async fn all_payments(&self) -> Vec<ReceivedPayment> {
        self.state.lock().await.ledger.clone()
    }
}

fn random_secret() -> Vec<u8> {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.to_vec()
}

fn address_for_secret(secret: &[u8]) -> Address {
    Address(format!("ACC{}", &sha256_hex(secret)[..52]))
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn suggested_params(&self) -> Result<SuggestedParams> {
        let state = self.state.lock().await;
        Ok(SuggestedParams {
            fee_per_byte: 10,
            min_fee: self.min_fee,
            first_valid: state.round,
            last_valid: state.round + 1000,
            genesis_id: "mocknet-v1".to_string(),
            genesis_hash: vec![0u8; 32],
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
        let mut nonce = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut nonce);
        let id = sha256_hex(&nonce);

        Ok(UnsignedPayment {
            id,
            sender: sender.clone(),
            receiver: receiver.clone(),
            amount,
            note: note.to_vec(),
            close_remainder_to: close_to.cloned(),
            params: params.clone(),
        })
    }

    async fn sign(&self, unsigned: &UnsignedPayment, _sender_secret: &[u8]) -> Result<SignedTxn> {
        Ok(SignedTxn {
            id: unsigned.id.clone(),
            bytes: unsigned.note.clone(),
            fee: self.min_fee,
            last_valid: unsigned.params.last_valid,
            sender: unsigned.sender.clone(),
            receiver: unsigned.receiver.clone(),
            amount: unsigned.amount,
            note: unsigned.note.clone(),
            close_remainder_to: unsigned.close_remainder_to.clone(),
        })
    }

    async fn submit(&self, signed: &SignedTxn) -> Result<()> {
        let mut state = self.state.lock().await;
        let round = state.round;
        state.round += 1;

        if state.ledger.iter().any(|p| p.id == signed.id) {
            // Idempotent: re-submitting an already-ledgered id is a no-op,
            // mirroring "transaction already in ledger" on a real node.
            return Ok(());
        }

        state.ledger.push(ReceivedPayment {
            id: signed.id.clone(),
            sender: signed.sender.clone(),
            receiver: signed.receiver.clone(),
            amount: signed.amount,
            note: signed.note.clone(),
            close_remainder_to: signed.close_remainder_to.clone(),
            round,
            confirmed: true,
        });
        Ok(())
    }

    async fn wait_for_confirmation(&self, signed: &SignedTxn) -> Result<ConfirmationOutcome> {
        let state = self.state.lock().await;
        if let Some(found) = state.ledger.iter().find(|p| p.id == signed.id) {
            Ok(ConfirmationOutcome::Executed { round: found.round })
        } else {
            Ok(ConfirmationOutcome::Executed { round: state.round })
        }
    }

    async fn lookup_by_id(&self, id: &str) -> Result<Option<ReceivedPayment>> {
        let state = self.state.lock().await;
        Ok(state.ledger.iter().find(|p| p.id == id).cloned())
    }

    async fn search_page(
        &self,
        filter: &SearchFilter,
        next: Option<&str>,
    ) -> Result<(Vec<ReceivedPayment>, Option<String>)> {
        let state = self.state.lock().await;
        let offset: usize = next.and_then(|c| c.parse().ok()).unwrap_or(0);

        let matches: Vec<ReceivedPayment> = state
            .ledger
            .iter()
            .filter(|p| match filter.role {
                AddressRole::Sender => p.sender == filter.address,
                AddressRole::Receiver => p.receiver == filter.address,
            })
            .filter(|p| filter.min_round.map(|min| p.round >= min).unwrap_or(true))
            .cloned()
            .collect();

        let page: Vec<ReceivedPayment> = matches
            .iter()
            .skip(offset)
            .take(SEARCH_PAGE_SIZE)
            .cloned()
            .collect();

        let consumed = offset + page.len();
        let next_cursor = if consumed < matches.len() {
            Some(consumed.to_string())
        } else {
            None
        };

        Ok((page, next_cursor))
    }

    async fn derive_account(&self, sender_secret: &[u8], accid: u32, addid: u32) -> Result<Account> {
        let mut material = sender_secret.to_vec();
        material.extend_from_slice(&accid.to_be_bytes());
        material.extend_from_slice(&addid.to_be_bytes());
        let derived_secret = crate::crypto::hash::sha256(&material).to_vec();
        let addr = address_for_secret(&derived_secret);
        Ok(Account {
            addr,
            secret: derived_secret,
        })
    }

    async fn random_account(&self) -> Result<Account> {
        let secret = random_secret();
        let addr = address_for_secret(&secret);
        Ok(Account { addr, secret })
    }

    async fn account_from_secret(&self, secret: &[u8]) -> Result<Account> {
        Ok(Account {
            addr: address_for_secret(secret),
            secret: secret.to_vec(),
        })
    }
}
