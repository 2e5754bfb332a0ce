//! Higher-level ledger queries composed purely from [`LedgerClient`], with
//! no ledger-specific knowledge beyond the trait: received payments for a
//! `(sender, receiver)` pair, revision-chain discovery, and stream-end
//! detection.

use crate::error::Result;
use crate::ledger::types::{Address, AddressRole, ReceivedPayment, SearchFilter};
use crate::ledger::{search_all, LedgerClient};
use crate::metadata::{parse_revision_tag, STOP_NOTE};

/// All payments received at `receiver`, excluding `exclude_id`, optionally
/// further restricted to those sent by `sender` or `receiver` itself (the
/// self-sent close/stop transaction).
pub async fn received_payments(
    client: &dyn LedgerClient,
    receiver: &Address,
    exclude_id: &str,
) -> Result<Vec<ReceivedPayment>> {
    let filter = SearchFilter {
        address: receiver.clone(),
        role: AddressRole::Receiver,
        min_round: None,
    };
    let mut payments = search_all(client, &filter).await?;
    payments.retain(|p| p.id != exclude_id);
    Ok(payments)
}

/// Like [`received_payments`], but only from `min_round` onward — used by
/// the streamnote reader's polling loop to keep each page small.
pub async fn received_payments_since(
    client: &dyn LedgerClient,
    receiver: &Address,
    exclude_id: &str,
    min_round: u64,
) -> Result<Vec<ReceivedPayment>> {
    let filter = SearchFilter {
        address: receiver.clone(),
        role: AddressRole::Receiver,
        min_round: Some(min_round),
    };
    let mut payments = search_all(client, &filter).await?;
    payments.retain(|p| p.id != exclude_id);
    Ok(payments)
}

/// The most recently confirmed payment received at `receiver`, if any.
pub async fn last_received(
    client: &dyn LedgerClient,
    receiver: &Address,
    exclude_id: &str,
) -> Result<Option<ReceivedPayment>> {
    let mut payments = received_payments(client, receiver, exclude_id).await?;
    payments.sort_by_key(|p| p.round);
    Ok(payments.into_iter().last())
}

/// Walk the revision chain starting at `original_id`/`original_receiver`:
/// every payment sent by `original_sender` to `original_receiver` whose
/// note parses as a valid revision tag names the next payload id in the
/// chain. Returns payload ids in chain order, starting with
/// `original_id` itself.
pub async fn revision_chain(
    client: &dyn LedgerClient,
    original_id: &str,
    original_sender: &Address,
    original_receiver: &Address,
) -> Result<Vec<String>> {
    let payments = received_payments(client, original_receiver, original_id).await?;

    let mut tags: Vec<&ReceivedPayment> = payments
        .iter()
        .filter(|p| &p.sender == original_sender)
        .filter(|p| parse_revision_tag(&p.note).is_some())
        .collect();
    tags.sort_by_key(|p| p.round);

    let mut chain = vec![original_id.to_string()];
    for tag in tags {
        if let Some(revision_id) = parse_revision_tag(&tag.note) {
            chain.push(revision_id);
        }
    }
    Ok(chain)
}

/// Find the self-sent stop transaction at `receiver` (sender == receiver,
/// `close_remainder_to` set, note byte-equal to the literal `stop`), if the
/// session has been finalized yet.
pub async fn find_stop_transaction(
    client: &dyn LedgerClient,
    receiver: &Address,
    exclude_id: &str,
) -> Result<Option<ReceivedPayment>> {
    let payments = received_payments(client, receiver, exclude_id).await?;
    Ok(payments
        .into_iter()
        .find(|p| &p.sender == receiver && p.note == STOP_NOTE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::mock::MockLedger;
    use crate::ledger::types::SuggestedParams;

    async fn submit_payment(
        client: &MockLedger,
        sender: &Address,
        receiver: &Address,
        note: &[u8],
        close_to: Option<&Address>,
        params: &SuggestedParams,
    ) -> String {
        let unsigned = client
            .build_payment(sender, receiver, 0, note, close_to, params)
            .await
            .unwrap();
        let signed = client.sign(&unsigned, b"ignored-by-mock").await.unwrap();
        client.submit(&signed).await.unwrap();
        signed.id
    }

    #[tokio::test]
    async fn revision_chain_walks_tagged_payments() {
        let ledger = MockLedger::new();
        let params = ledger.suggested_params().await.unwrap();
        let sender = Address("SENDER".to_string());
        let receiver = Address("RECEIVER".to_string());

        let original_id =
            submit_payment(&ledger, &sender, &receiver, b"{}", None, &params).await;
        let tag1 = encode_tag("B".repeat(52).as_str());
        submit_payment(&ledger, &sender, &receiver, &tag1, None, &params).await;
        let tag2 = encode_tag("C".repeat(52).as_str());
        submit_payment(&ledger, &sender, &receiver, &tag2, None, &params).await;

        let chain = revision_chain(&ledger, &original_id, &sender, &receiver)
            .await
            .unwrap();
        assert_eq!(chain, vec![original_id, "B".repeat(52), "C".repeat(52)]);
    }

    #[tokio::test]
    async fn stop_transaction_is_found_by_raw_bytes() {
        let ledger = MockLedger::new();
        let params = ledger.suggested_params().await.unwrap();
        let receiver = Address("RECEIVER".to_string());

        submit_payment(&ledger, &receiver, &receiver, b"stop", Some(&receiver), &params).await;

        let found = find_stop_transaction(&ledger, &receiver, "nonexistent")
            .await
            .unwrap();
        assert!(found.is_some());
    }

    fn encode_tag(id: &str) -> Vec<u8> {
        serde_json::json!({ "revision": id }).to_string().into_bytes()
    }
}
