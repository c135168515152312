use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::gelf::{run_tcp_server, run_udp_server};
use crate::ingest::{spawn_auto_flush, IngestError, Ingestor};
use crate::sink::store::StoreError;
use crate::sink::{build_object_store, ParquetEncoder, PartitionedWriter};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("object store error: {0}")]
    Store(#[from] StoreError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ingest error: {0}")]
    Ingest(#[from] IngestError),
}

pub async fn run(config: Config) -> Result<(), RunError> {
    let store = build_object_store(&config)?;
    let encoder = ParquetEncoder::new(config.compression);
    let writer = PartitionedWriter::new(store, encoder, config.prefix.clone());
    let ingestor = Arc::new(Ingestor::new(&config, writer));

    if config.deduplicate {
        info!(window = config.dedup_window, "deduplication enabled");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let auto_flush_handle = if config.auto_flush {
        info!(
            interval_seconds = config.auto_flush_interval,
            "auto-flush enabled"
        );
        Some(spawn_auto_flush(
            ingestor.clone(),
            Duration::from_secs(config.auto_flush_interval),
            shutdown_rx.clone(),
        ))
    } else {
        None
    };

    if config.http {
        run_http_mode(&config, ingestor.clone(), shutdown_rx).await?;
    } else {
        run_stdin_mode(ingestor.clone()).await?;
    }

    // Stop the periodic flusher, wait for it, then flush the residue.
    let _ = shutdown_tx.send(true);
    if let Some(handle) = auto_flush_handle {
        if let Err(e) = handle.await {
            error!(error = %e, "auto-flush worker join error");
        }
    }
    ingestor.flush().await?;

    Ok(())
}

/// HTTP server mode: ingest API plus the GELF TCP (and optionally UDP)
/// receivers, running until Ctrl-C.
async fn run_http_mode(
    config: &Config,
    ingestor: Arc<Ingestor>,
    shutdown_rx: watch::Receiver<bool>,
) -> Result<(), RunError> {
    // Listener binds are startup failures: fail fast before serving anything.
    let gelf_listener =
        TcpListener::bind(("0.0.0.0", config.gelf_port)).await?;
    let http_listener = TcpListener::bind(("0.0.0.0", config.port)).await?;

    let receivers = spawn_receivers(config, &ingestor, gelf_listener).await?;

    info!(port = config.port, "HTTP ingestor listening");
    info!(
        "POST logs to http://localhost:{}/ingest, GELF to http://localhost:{}/gelf",
        config.port, config.port
    );

    let (ctrlc_tx, ctrlc_rx) = watch::channel(false);
    let mut upstream = shutdown_rx;
    tokio::spawn(async move {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    error!(error = %e, "failed to listen for shutdown signal");
                }
                info!("shutdown signal received");
            }
            _ = upstream.changed() => {}
        }
        let _ = ctrlc_tx.send(true);
    });

    crate::server::serve(http_listener, ingestor, ctrlc_rx).await?;

    for handle in receivers {
        handle.abort();
    }

    Ok(())
}

async fn spawn_receivers(
    config: &Config,
    ingestor: &Arc<Ingestor>,
    gelf_listener: TcpListener,
) -> Result<Vec<JoinHandle<()>>, RunError> {
    let mut handles = Vec::new();

    handles.push(tokio::spawn(run_tcp_server(
        gelf_listener,
        ingestor.clone(),
    )));

    if config.udp {
        let socket = UdpSocket::bind(("0.0.0.0", config.gelf_port)).await?;
        handles.push(tokio::spawn(run_udp_server(socket, ingestor.clone())));
    }

    Ok(handles)
}

/// Stdin mode: admit every non-empty line until EOF, then report a summary.
async fn run_stdin_mode(ingestor: Arc<Ingestor>) -> Result<(), RunError> {
    info!("reading log lines from stdin");

    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    while let Some(line) = lines.next_line().await? {
        if line.is_empty() {
            continue;
        }

        if let Err(e) = ingestor.process_line(&line).await {
            warn!(error = %e, "error processing line");
        }

        let total = ingestor.stats().total_lines;
        if total % 10_000 == 0 {
            info!(lines = total, "ingestion progress");
        }
    }

    let stats = ingestor.stats();
    info!(
        total_lines = stats.total_lines,
        unique_lines = stats.unique_lines,
        duplicates_skipped = stats.duplicates_skipped,
        partitions = stats.partitions,
        "ingestion complete"
    );

    Ok(())
}
