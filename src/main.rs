use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;

use ledgernote::blocknote::{self, ReadOptions, WriteOptions};
use ledgernote::codec::{CodecRegistry, CompressionSelection};
use ledgernote::config::Config;
use ledgernote::events::{ReaderEvent, WriterEvent};
use ledgernote::ledger::algod::AlgodClient;
use ledgernote::ledger::types::Address;
use ledgernote::ledger::LedgerClient;
use ledgernote::manager::store::UploadStore;
use ledgernote::manager::UploadManager;
use ledgernote::streamnote::{self, StreamReadOptions, StreamWriteOptions};

#[derive(Debug, Parser)]
#[command(name = "ledgernote")]
#[command(about = "Store arbitrary byte payloads inside ledger payment notes")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Upload a complete payload in one session.
    WriteBlocknote {
        /// Hex-encoded 32-byte signing seed for the sender account.
        #[arg(long, env = "LEDGERNOTE_SENDER_SECRET")]
        sender_secret: String,
        /// Read the payload from this file instead of stdin.
        #[arg(long)]
        file: Option<PathBuf>,
        /// Treat the payload as UTF-8 text rather than raw bytes.
        #[arg(long)]
        text: bool,
        #[arg(long, default_value = "best")]
        compression: String,
        #[arg(long, default_value = "application/octet-stream")]
        mime: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        aes_key_hex: Option<String>,
        #[arg(long)]
        password: Option<String>,
        #[arg(long)]
        revision_of: Option<String>,
        #[arg(long)]
        simulate: bool,
    },
    /// Download a previously written blocknote payload.
    ReadBlocknote {
        payload_id: String,
        #[arg(long)]
        aes_key_hex: Option<String>,
        #[arg(long)]
        password: Option<String>,
        #[arg(long)]
        revision: Option<u32>,
        #[arg(long)]
        out_file: Option<PathBuf>,
    },
    /// Upload stdin as a single streamnote session (reads all of stdin up
    /// front; a true incremental producer should use the library directly).
    StreamWrite {
        #[arg(long, env = "LEDGERNOTE_SENDER_SECRET")]
        sender_secret: String,
        #[arg(long, default_value = "best")]
        compression: String,
        #[arg(long, default_value = "application/octet-stream")]
        mime: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        aes_key_hex: Option<String>,
        #[arg(long)]
        password: Option<String>,
    },
    /// Follow a streamnote session, printing chunks to stdout as they arrive.
    StreamRead {
        payload_id: String,
        #[arg(long)]
        aes_key_hex: Option<String>,
        #[arg(long)]
        password: Option<String>,
    },
    /// Build a funding transaction for a two-party bootstrap upload.
    BootstrapPrepare {
        funder_address: String,
        #[arg(long)]
        file: Option<PathBuf>,
        #[arg(long)]
        text: bool,
        #[arg(long, default_value = "application/octet-stream")]
        mime: String,
        #[arg(long)]
        title: Option<String>,
    },
    /// Complete a bootstrap upload once its funding transaction is confirmed.
    BootstrapRun {
        funding_tx_id: String,
        /// Hex bootstrap secret printed by `bootstrap-prepare`.
        bootstrap_key: String,
        #[arg(long)]
        aes_key_hex: Option<String>,
        #[arg(long)]
        password: Option<String>,
    },
    /// List bootstrap sessions this process has prepared or run locally.
    Senders,
}

fn parse_compression(s: &str) -> CompressionSelection {
    match s {
        "best" => CompressionSelection::Best,
        "fast" => CompressionSelection::Fast,
        other => CompressionSelection::Explicit(other.to_string()),
    }
}

fn parse_aes_key(hex_str: &str) -> Result<[u8; 32]> {
    let bytes = hex::decode(hex_str).context("aes key must be hex-encoded")?;
    bytes.try_into().map_err(|_| anyhow::anyhow!("aes key must be 32 bytes"))
}

fn read_payload(file: &Option<PathBuf>) -> Result<Vec<u8>> {
    match file {
        Some(path) => std::fs::read(path).with_context(|| format!("reading {}", path.display())),
        None => {
            use std::io::Read;
            let mut buf = Vec::new();
            std::io::stdin().read_to_end(&mut buf)?;
            Ok(buf)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "ledgernote=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().context("loading configuration")?;
    let client: Arc<dyn LedgerClient> = Arc::new(AlgodClient::new(
        config.algod_base_url(),
        config.algod_token.clone(),
        config.indexer_base_url(),
        config.indexer_token.clone(),
    ));
    let codecs = Arc::new(CodecRegistry::with_defaults());

    match cli.command {
        Command::WriteBlocknote {
            sender_secret,
            file,
            text,
            compression,
            mime,
            title,
            aes_key_hex,
            password,
            revision_of,
            simulate,
        } => {
            let secret = hex::decode(&sender_secret).context("sender secret must be hex-encoded")?;
            let bytes = read_payload(&file)?;
            let content = if text {
                blocknote::RawContent::Text(String::from_utf8(bytes).context("payload is not valid UTF-8")?)
            } else {
                blocknote::RawContent::Bytes(bytes)
            };
            let aes_key = aes_key_hex.as_deref().map(parse_aes_key).transpose()?;

            let writer = blocknote::writer::BlocknoteWriter::new(Arc::clone(&client), Arc::clone(&codecs));
            let options = WriteOptions {
                compression: parse_compression(&compression),
                mime,
                title,
                encrypt_title: None,
                aes_key,
                password,
                revision_of,
                simulate,
            };
            let (tx, mut rx) = mpsc::channel(64);
            let handle = tokio::spawn(async move { writer.write(&secret, content, options, tx).await });
            while let Some(event) = rx.recv().await {
                log_writer_event(&event);
            }
            let result = handle.await.context("write task panicked")??;
            println!("{}", serde_json::to_string_pretty(&result_summary(&result))?);
        }
        Command::ReadBlocknote { payload_id, aes_key_hex, password, revision, out_file } => {
            let aes_key = aes_key_hex.as_deref().map(parse_aes_key).transpose()?;
            let reader = blocknote::reader::BlocknoteReader::new(Arc::clone(&client), Arc::clone(&codecs));
            let options = ReadOptions { aes_key, password, revision, return_raw: false };
            let result = reader.read(&payload_id, options).await?;
            match out_file {
                Some(path) => {
                    std::fs::write(&path, &result.content).with_context(|| format!("writing {}", path.display()))?
                }
                None => {
                    use std::io::Write;
                    std::io::stdout().write_all(&result.content)?;
                }
            }
        }
        Command::StreamWrite { sender_secret, compression, mime, title, aes_key_hex, password } => {
            let secret = hex::decode(&sender_secret).context("sender secret must be hex-encoded")?;
            let bytes = read_payload(&None)?;
            let aes_key = aes_key_hex.as_deref().map(parse_aes_key).transpose()?;

            let writer = streamnote::writer::StreamnoteWriter::new(Arc::clone(&client), Arc::clone(&codecs));
            let options = StreamWriteOptions {
                compression: parse_compression(&compression),
                mime,
                title,
                encrypt_title: None,
                aes_key,
                password,
            };
            let (tx, mut rx) = mpsc::channel(64);
            let handle = writer.start(&secret, bytes, options, tx).await?;
            let payload_id = handle.payload_transaction_id.clone();
            tokio::spawn(async move {
                while let Some(event) = rx.recv().await {
                    log_writer_event(&event);
                }
            });
            handle.stop().await?;
            println!("{}", serde_json::json!({ "payloadTransactionId": payload_id }));
        }
        Command::StreamRead { payload_id, aes_key_hex, password } => {
            let aes_key = aes_key_hex.as_deref().map(parse_aes_key).transpose()?;
            let reader = streamnote::reader::StreamnoteReader::new(Arc::clone(&client), Arc::clone(&codecs));
            let options = StreamReadOptions { aes_key, password };
            let (tx, mut rx) = mpsc::channel(64);
            let handle = tokio::spawn(async move { reader.read(&payload_id, options, tx).await });
            use std::io::Write;
            let mut stdout = std::io::stdout();
            while let Some(event) = rx.recv().await {
                match event {
                    ReaderEvent::Data(bytes) => {
                        stdout.write_all(&bytes)?;
                    }
                    ReaderEvent::Finish => break,
                    ReaderEvent::Error(e) => anyhow::bail!("streamnote read failed: {e}"),
                    ReaderEvent::Log(msg) => tracing::info!("{msg}"),
                }
            }
            handle.await.context("read task panicked")??;
        }
        Command::BootstrapPrepare { funder_address, file, text, mime, title } => {
            let store = UploadStore::open(&config.sqlite_database_path)?;
            let manager = UploadManager::new(
                Arc::clone(&client),
                Arc::clone(&codecs),
                config.private_key_aes.clone(),
                config.app_name.clone(),
                store,
            );
            let bytes = read_payload(&file)?;
            let content = if text {
                blocknote::RawContent::Text(String::from_utf8(bytes).context("payload is not valid UTF-8")?)
            } else {
                blocknote::RawContent::Bytes(bytes)
            };
            let options = WriteOptions { mime, title, ..Default::default() };
            let preparation = manager
                .prepare_bootstrap_transaction(&Address(funder_address), content, options)
                .await?;
            println!(
                "{}",
                serde_json::json!({
                    "bootstrapAddress": preparation.bootstrap_address.0,
                    "bootstrapKey": preparation.bootstrap_key,
                    "fundingAmount": preparation.funding_amount,
                    "fundingTransaction": format!("{:?}", preparation.funding_transaction),
                })
            );
        }
        Command::BootstrapRun { funding_tx_id, bootstrap_key, aes_key_hex, password } => {
            let store = UploadStore::open(&config.sqlite_database_path)?;
            let manager = UploadManager::new(
                Arc::clone(&client),
                Arc::clone(&codecs),
                config.private_key_aes.clone(),
                config.app_name.clone(),
                store,
            );
            let aes_key = aes_key_hex.as_deref().map(parse_aes_key).transpose()?;
            let encryption = (aes_key.is_some() || password.is_some())
                .then(|| WriteOptions { aes_key, password, ..Default::default() });
            let (tx, mut rx) = mpsc::channel(64);
            let handle = tokio::spawn(async move {
                manager
                    .run_from_bootstrap_transaction(&funding_tx_id, &bootstrap_key, encryption, tx)
                    .await
            });
            while let Some(event) = rx.recv().await {
                log_writer_event(&event);
            }
            let result = handle.await.context("bootstrap task panicked")??;
            println!("{}", serde_json::to_string_pretty(&result_summary(&result))?);
        }
        Command::Senders => {
            let store = UploadStore::open(&config.sqlite_database_path)?;
            let manager = UploadManager::new(
                Arc::clone(&client),
                Arc::clone(&codecs),
                config.private_key_aes.clone(),
                config.app_name.clone(),
                store,
            );
            for address in manager.get_all_senders().await? {
                let payload_id = manager.get_payload_id_from_sender(&address).await?;
                println!("{address}\t{}", payload_id.unwrap_or_else(|| "-".to_string()));
            }
        }
    }

    Ok(())
}

fn log_writer_event(event: &WriterEvent) {
    match event {
        WriterEvent::Progress { sent, total } => tracing::info!(sent, ?total, "progress"),
        WriterEvent::PayloadTxId(id) => tracing::info!(payload_id = %id, "payload transaction id"),
        WriterEvent::Log(msg) => tracing::info!("{msg}"),
        WriterEvent::Finish(_) => tracing::info!("finished"),
        WriterEvent::Error(e) => tracing::error!("{e}"),
    }
}

fn result_summary(result: &ledgernote::events::WriteResult) -> serde_json::Value {
    serde_json::json!({
        "payloadTransactionId": result.payload_transaction_id,
        "fees": result.fees,
        "compression": result.compression,
        "durationMs": result.duration.as_millis() as u64,
        "simulation": result.simulation,
    })
}
