// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # BeatIt NFC Tool
//!
//! Entry point for the `beatit-nfc` binary. Runs the handoff protocol
//! against a tag file, so two terminals can play host and guest:
//!
//! ```text
//! beatit-nfc share --song-id abc123 --tag /tmp/tag.ndef
//! beatit-nfc receive --tag /tmp/tag.ndef
//! ```
//!
//! Subcommands:
//!
//! - `share`          - write a fresh token for a song
//! - `receive`        - read, validate and play once
//! - `listen`         - keep receiving until Ctrl+C
//! - `inspect`        - decode a tag without consuming it
//! - `clear-sessions` - forget consumed sessions
//! - `version`        - print build information

mod catalog;
mod cli;
mod logging;
mod settings;
mod tag_file;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;

use beatit_nfc::host::ShareOutcome;
use beatit_nfc::ndef::{decode_records, RecordKind};
use beatit_nfc::payload::{encode_json, encode_uri};
use beatit_nfc::storage::{KeyValueStore, ReplaySessionStore, SledStore};
use beatit_nfc::{AppLifecycle, HandoffEvent, NfcConfig, NfcConfigUpdate, NfcHandoff, Payload};

use catalog::{Catalog, ConsolePlayer};
use cli::{BeatitNfcCli, Commands};
use tag_file::FileTagRadio;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = BeatitNfcCli::parse();
    logging::init_logging("beatit_nfc=info,beatit_nfc_cli=info", cli.log_format);
    let config = settings::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Share(args) => share(args, config).await,
        Commands::Receive(args) => receive(args, config).await,
        Commands::Listen(args) => listen(args, config).await,
        Commands::Inspect(args) => inspect(args, &config).await,
        Commands::ClearSessions(args) => clear_sessions(&args.data_dir),
        Commands::Version => {
            print_version(&config);
            Ok(())
        }
    }
}

fn open_store(data_dir: &Path) -> Result<Arc<SledStore>> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;
    let store = SledStore::open(data_dir.join("store"))
        .with_context(|| format!("failed to open store in {}", data_dir.display()))?;
    tracing::debug!(data_dir = %data_dir.display(), "store opened");
    Ok(Arc::new(store))
}

fn print_payload(payload: &Payload, config: &NfcConfig) -> Result<()> {
    println!("{}", encode_json(payload)?);
    println!("{}", encode_uri(payload, config));
    Ok(())
}

/// Host side: write one token onto the tag file.
async fn share(args: cli::ShareArgs, config: NfcConfig) -> Result<()> {
    let config = config.with(NfcConfigUpdate {
        record_format: args.format.map(Into::into),
        enable_signature: args.unsigned.then_some(false),
        ..Default::default()
    });

    let handoff = NfcHandoff::builder(
        Arc::new(FileTagRadio::new(&args.tag)),
        Arc::new(Catalog::Open),
        Arc::new(ConsolePlayer),
    )
    .config(config.clone())
    .build();

    match handoff.share(&args.song_id).await? {
        ShareOutcome::Shared(payload) => {
            tracing::info!(
                song_id = %payload.song_id(),
                tag = %args.tag.display(),
                signed = payload.is_signed(),
                "song shared"
            );
            print_payload(&payload, &config)
        }
        ShareOutcome::Cancelled(reason) => bail!("share cancelled ({reason:?})"),
    }
}

/// Guest side, once: read, validate, play.
async fn receive(args: cli::ReceiveArgs, config: NfcConfig) -> Result<()> {
    let catalog = Catalog::load(args.catalog.as_deref())?;
    let handoff = NfcHandoff::builder(
        Arc::new(FileTagRadio::new(&args.tag)),
        Arc::new(catalog),
        Arc::new(ConsolePlayer),
    )
    .config(config.clone())
    .store(open_store(&args.data.data_dir)?)
    .build();

    let payload = handoff
        .read_once()
        .await
        .with_context(|| format!("no valid handoff on {}", args.tag.display()))?;
    print_payload(&payload, &config)?;

    // With auto-accept the song already started while routing.
    if !handoff.auto_accept() {
        handoff.accept(&payload).await?;
    }
    Ok(())
}

/// Guest side, continuously, until Ctrl+C or SIGTERM.
async fn listen(args: cli::ListenArgs, config: NfcConfig) -> Result<()> {
    let catalog = Catalog::load(args.catalog.as_deref())?;
    let radio =
        FileTagRadio::new(&args.tag).with_poll_interval(Duration::from_millis(args.poll_ms));
    let handoff = NfcHandoff::builder(Arc::new(radio), Arc::new(catalog), Arc::new(ConsolePlayer))
        .config(config)
        .store(open_store(&args.data.data_dir)?)
        .build();

    if args.auto_accept {
        handoff.set_auto_accept(true)?;
    }
    handoff.initialize().await?;
    if !handoff.is_listening().await {
        handoff.enable_listener().await?;
    }
    tracing::info!(
        tag = %args.tag.display(),
        auto_accept = handoff.auto_accept(),
        "listening for handoffs"
    );

    let mut events = handoff.events();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(HandoffEvent::ConfirmationRequested(payload)) => {
                    println!(
                        "Received {} (session {}); pass --auto-accept to play on receipt",
                        payload.song_id(),
                        payload.session()
                    );
                }
                Ok(HandoffEvent::SongUnavailable { song_id }) => {
                    println!("Song {song_id} is not in the catalog");
                }
                Ok(event) => tracing::debug!(?event, "handoff event"),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "handoff events dropped");
                }
                Err(RecvError::Closed) => break,
            },
            _ = &mut shutdown => {
                tracing::info!("shutdown signal received");
                break;
            }
        }
    }

    handoff.on_lifecycle(AppLifecycle::Background).await;
    tracing::info!("listener stopped");
    Ok(())
}

/// Decode without validating, so nothing is consumed.
async fn inspect(args: cli::InspectArgs, config: &NfcConfig) -> Result<()> {
    let records = tag_file::read_tag(&args.tag)
        .await
        .with_context(|| format!("cannot read tag {}", args.tag.display()))?;

    for (index, record) in records.iter().enumerate() {
        let kind = match record.kind() {
            RecordKind::Uri(uri) => format!("uri {uri}"),
            RecordKind::Mime { media_type, body } => {
                format!("mime {media_type} {}", String::from_utf8_lossy(&body))
            }
            RecordKind::Text(text) => format!("text {text}"),
            RecordKind::AppIdentity(package) => format!("app {package}"),
            RecordKind::Other => format!("other {record:?}"),
        };
        println!("[{index}] {kind}");
    }

    let payload = decode_records(&records, config)?;
    print_payload(&payload, config)?;
    let now = chrono::Utc::now().timestamp_millis().max(0) as u64;
    if payload.is_expired_at(now) {
        println!("expired");
    } else {
        println!("expires in {} s", (payload.expiry() - now) / 1_000);
    }
    Ok(())
}

fn clear_sessions(data_dir: &Path) -> Result<()> {
    let store = open_store(data_dir)? as Arc<dyn KeyValueStore>;
    let sessions = ReplaySessionStore::new(store);
    let count = sessions.len();
    sessions.clear();
    println!("cleared {count} used sessions");
    Ok(())
}

fn print_version(config: &NfcConfig) {
    println!("beatit-nfc {}", env!("CARGO_PKG_VERSION"));
    println!("link       {}", config.link_prefix());
    println!("mime       {}", config.mime_type);
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
