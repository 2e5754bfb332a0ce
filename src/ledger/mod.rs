//! Ledger adapter: the one collaborator this crate treats as opaque.
//!
//! `LedgerClient` captures exactly the operations the writers/readers need:
//! suggested params, build/sign/submit, confirmation
//! polling, lookup by id, and paginated indexer search. Two implementations
//! ship: [`algod::AlgodClient`] talks to a real algod/indexer pair over
//! HTTP; [`mock::MockLedger`] is an in-memory ledger the test suite drives
//! writers and readers against.

pub mod algod;
pub mod mock;
pub mod types;

use async_trait::async_trait;

use crate::error::Result;
use types::{
    Account, Address, ConfirmationOutcome, ReceivedPayment, SearchFilter, SignedTxn,
    SuggestedParams, UnsignedPayment,
};

/// Page size used by every paginated search; the indexer rate-limits more
/// aggressively than algod, so pages are kept small and spaced out (see
/// [`PAGE_SLEEP`]).
pub const SEARCH_PAGE_SIZE: usize = 100;

/// Sleep between indexer pages to stay under rate limits.
pub const PAGE_SLEEP: std::time::Duration = std::time::Duration::from_millis(200);

#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Current fee, validity window, and genesis id.
    async fn suggested_params(&self) -> Result<SuggestedParams>;

    /// Build an unsigned payment. `close_to`, if set, closes the sender's
    /// remaining balance to that address.
    async fn build_payment(
        &self,
        sender: &Address,
        receiver: &Address,
        amount: u64,
        note: &[u8],
        close_to: Option<&Address>,
        params: &SuggestedParams,
    ) -> Result<UnsignedPayment>;

    /// Sign an unsigned payment with `sender`'s secret key.
    async fn sign(&self, unsigned: &UnsignedPayment, sender_secret: &[u8]) -> Result<SignedTxn>;

    /// Submit a signed transaction. `"transaction already in ledger"` is
    /// treated as success by callers, not by this method.
    async fn submit(&self, signed: &SignedTxn) -> Result<()>;

    /// Block (yielding at round boundaries) until `signed` is confirmed,
    /// a pool error is reported, or its last-valid round passes.
    async fn wait_for_confirmation(&self, signed: &SignedTxn) -> Result<ConfirmationOutcome>;

    /// Fetch a single transaction by id, if it has been confirmed.
    async fn lookup_by_id(&self, id: &str) -> Result<Option<ReceivedPayment>>;

    /// Fetch one page of payments matching `filter`, starting after `next`
    /// (an opaque pagination cursor; `None` for the first page). Returns
    /// `(page, next_cursor)`; `next_cursor` is `None` once exhausted.
    async fn search_page(
        &self,
        filter: &SearchFilter,
        next: Option<&str>,
    ) -> Result<(Vec<ReceivedPayment>, Option<String>)>;

    /// Derive a receiver account from `sender`'s secret using HD indices
    /// `(accid, addid)`. Deterministic: the same inputs always yield the
    /// same address, so a blocknote's receiver can be recovered from its
    /// metadata alone.
    async fn derive_account(&self, sender_secret: &[u8], accid: u32, addid: u32) -> Result<Account>;

    /// Generate a fresh, unrelated account (used by streamnote sessions and
    /// the upload manager's bootstrap senders).
    async fn random_account(&self) -> Result<Account>;

    /// Resolve a mnemonic/secret string into an [`Account`].
    async fn account_from_secret(&self, secret: &[u8]) -> Result<Account>;
}

/// Page through every result matching `filter`, sleeping [`PAGE_SLEEP`]
/// between pages. Shared by [`crate::search`] and the readers so the
/// rate-limit backoff lives in exactly one place.
pub async fn search_all(
    client: &dyn LedgerClient,
    filter: &SearchFilter,
) -> Result<Vec<ReceivedPayment>> {
    let mut results = Vec::new();
    let mut cursor: Option<String> = None;

    loop {
        let (page, next) = client.search_page(filter, cursor.as_deref()).await?;
        results.extend(page);

        match next {
            Some(cursor_value) => {
                cursor = Some(cursor_value);
                tokio::time::sleep(PAGE_SLEEP).await;
            }
            None => break,
        }
    }

    Ok(results)
}
