//! Shared submission/retry policy: retry a signed transaction's submission
//! up to 25 consecutive times; after the threshold, rebuild it from the
//! same note with fresh suggested params and reset the retry counter.
//! `"transaction already in ledger"` counts as success. Only an expired
//! last-valid round surfaces immediately, without consuming a retry slot.

use std::time::Duration;

use crate::error::{Error, Result, SubmitFailure};
use crate::ledger::types::{Address, ConfirmationOutcome, SignedTxn, UnsignedPayment};
use crate::ledger::LedgerClient;

pub const MAX_CONSECUTIVE_RETRIES: u32 = 25;
pub const RETRY_ROUND_SLEEP: Duration = Duration::from_secs(6);
pub const INTER_SUBMIT_SLEEP: Duration = Duration::from_millis(50);

/// Submit `unsigned` (signed under `sender_secret`), retrying transient
/// failures and rebuilding after [`MAX_CONSECUTIVE_RETRIES`]. Returns the
/// signed transaction actually confirmed (its id may differ from the
/// original if a rebuild occurred, since a rebuild refreshes the validity
/// window).
pub async fn submit_with_retry(
    client: &dyn LedgerClient,
    sender: &Address,
    receiver: &Address,
    sender_secret: &[u8],
    amount: u64,
    note: &[u8],
    close_to: Option<&Address>,
) -> Result<SignedTxn> {
    let mut params = client.suggested_params().await?;
    let mut unsigned = client
        .build_payment(sender, receiver, amount, note, close_to, &params)
        .await?;
    let mut signed = client.sign(&unsigned, sender_secret).await?;
    let mut attempts = 0u32;

    loop {
        match submit_once(client, &signed).await {
            Ok(()) => break,
            Err(e) => {
                attempts += 1;
                tracing::warn!(attempt = attempts, error = %e, "transaction submission failed");
                if attempts >= MAX_CONSECUTIVE_RETRIES {
                    tracing::info!("rebuilding transaction after exhausting retries");
                    tokio::time::sleep(RETRY_ROUND_SLEEP).await;
                    params = client.suggested_params().await?;
                    unsigned = rebuild(&unsigned, &params);
                    signed = client.sign(&unsigned, sender_secret).await?;
                    attempts = 0;
                } else {
                    tokio::time::sleep(INTER_SUBMIT_SLEEP).await;
                }
            }
        }
    }

    match client.wait_for_confirmation(&signed).await? {
        ConfirmationOutcome::Executed { .. } => Ok(signed),
        ConfirmationOutcome::Expired => {
            Err(Error::SubmitFailed(SubmitFailure::Expired))
        }
        ConfirmationOutcome::PoolError(msg) => {
            Err(Error::SubmitFailed(SubmitFailure::PoolError(msg)))
        }
    }
}

async fn submit_once(client: &dyn LedgerClient, signed: &SignedTxn) -> Result<()> {
    match client.submit(signed).await {
        Ok(()) => Ok(()),
        Err(Error::Ledger(msg)) if msg.contains("already in ledger") => Ok(()),
        Err(e) => Err(e),
    }
}

fn rebuild(unsigned: &UnsignedPayment, params: &crate::ledger::types::SuggestedParams) -> UnsignedPayment {
    UnsignedPayment {
        id: unsigned.id.clone(),
        sender: unsigned.sender.clone(),
        receiver: unsigned.receiver.clone(),
        amount: unsigned.amount,
        note: unsigned.note.clone(),
        close_remainder_to: unsigned.close_remainder_to.clone(),
        params: params.clone(),
    }
}
