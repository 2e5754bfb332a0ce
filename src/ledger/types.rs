//! Ledger-agnostic types shared by every `LedgerClient` implementation.

use serde::{Deserialize, Serialize};

/// An address on the ledger. Opaque beyond equality/hex round-tripping —
/// higher layers never interpret its bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address(pub String);

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A keypair capable of signing payments. `addr` is the derived address;
/// `secret` is the opaque signing key material (never logged).
#[derive(Clone)]
pub struct Account {
    pub addr: Address,
    pub secret: Vec<u8>,
}

/// Parameters needed to build a well-formed transaction: current fee,
/// validity window, and genesis id (replay protection).
#[derive(Debug, Clone)]
pub struct SuggestedParams {
    pub fee_per_byte: u64,
    pub min_fee: u64,
    pub first_valid: u64,
    pub last_valid: u64,
    pub genesis_id: String,
    pub genesis_hash: Vec<u8>,
}

/// An unsigned payment, ready to sign.
#[derive(Debug, Clone)]
pub struct UnsignedPayment {
    pub id: String,
    pub sender: Address,
    pub receiver: Address,
    pub amount: u64,
    pub note: Vec<u8>,
    pub close_remainder_to: Option<Address>,
    pub params: SuggestedParams,
}

/// A signed, submittable transaction. Carries the payment fields alongside
/// the opaque signed bytes so a ledger's `submit` can record/broadcast it
/// without re-parsing its own wire format.
#[derive(Debug, Clone)]
pub struct SignedTxn {
    pub id: String,
    pub bytes: Vec<u8>,
    pub fee: u64,
    pub last_valid: u64,
    pub sender: Address,
    pub receiver: Address,
    pub amount: u64,
    pub note: Vec<u8>,
    pub close_remainder_to: Option<Address>,
}

/// A confirmed or pending payment as returned by lookup/search.
#[derive(Debug, Clone)]
pub struct ReceivedPayment {
    pub id: String,
    pub sender: Address,
    pub receiver: Address,
    pub amount: u64,
    pub note: Vec<u8>,
    pub close_remainder_to: Option<Address>,
    pub round: u64,
    pub confirmed: bool,
}

/// Role of `address` in a search filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressRole {
    Sender,
    Receiver,
}

/// Filters for a paginated indexer search.
#[derive(Debug, Clone)]
pub struct SearchFilter {
    pub address: Address,
    pub role: AddressRole,
    pub min_round: Option<u64>,
}

/// Outcome of waiting for confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationOutcome {
    Executed { round: u64 },
    PoolError(String),
    Expired,
}
