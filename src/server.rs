//! Assembles stores, publisher and processor into a running webhook server.

use crate::application::engine::SettlementEngine;
use crate::application::processor::WebhookProcessor;
use crate::application::signature::HmacSha256Verifier;
use crate::config::Config;
use crate::domain::events::NegotiationEvent;
use crate::domain::money::LedgerPolicy;
use crate::domain::ports::{EscrowStoreRef, NegotiationStoreRef};
use crate::error::Result;
use crate::infrastructure::in_memory::InMemoryStore;
use crate::infrastructure::publisher::{BroadcastPublisher, OutboxPublisher};
use crate::infrastructure::seed::SeedData;
use crate::interfaces::http::{AppState, router};
use axum::Router;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

const EVENT_CHANNEL_CAPACITY: usize = 1024;
const MIN_OUTBOX_RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// The pair of storage ports the engine runs against.
#[derive(Clone)]
pub struct Stores {
    pub escrow: EscrowStoreRef,
    pub negotiations: NegotiationStoreRef,
}

impl Stores {
    pub fn in_memory() -> Self {
        let store = Arc::new(InMemoryStore::new());
        Self {
            escrow: store.clone(),
            negotiations: store,
        }
    }

    /// Opens RocksDB at `db_path` when given, in-memory storage otherwise.
    #[cfg(feature = "storage-rocksdb")]
    pub fn open(db_path: Option<&Path>) -> Result<Self> {
        use crate::infrastructure::rocksdb::RocksDbStore;

        match db_path {
            Some(path) => {
                tracing::info!(path = %path.display(), "Opening RocksDB escrow store");
                let store = Arc::new(RocksDbStore::open(path)?);
                Ok(Self {
                    escrow: store.clone(),
                    negotiations: store,
                })
            }
            None => Ok(Self::in_memory()),
        }
    }

    /// Opens in-memory storage; `db_path` is ignored without `storage-rocksdb`.
    #[cfg(not(feature = "storage-rocksdb"))]
    pub fn open(db_path: Option<&Path>) -> Result<Self> {
        if db_path.is_some() {
            eprintln!(
                "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
            );
        }
        Ok(Self::in_memory())
    }

    pub async fn seed_from(&self, path: &Path) -> Result<()> {
        tracing::info!(path = %path.display(), "Loading seed data");
        SeedData::from_path(path)?
            .apply(self.escrow.as_ref(), self.negotiations.as_ref())
            .await
    }
}

/// The wired pipeline, ready to be mounted on a router.
#[derive(Clone)]
pub struct App {
    pub processor: Arc<WebhookProcessor>,
    pub outbox: Arc<OutboxPublisher<BroadcastPublisher>>,
}

impl App {
    pub fn new(config: &Config, stores: &Stores) -> Self {
        let verifier = Arc::new(HmacSha256Verifier::new(config.webhook_secret.clone()));
        let engine = SettlementEngine::new(
            stores.escrow.clone(),
            stores.negotiations.clone(),
            LedgerPolicy::new(config.settlement_tolerance),
        );
        let outbox = Arc::new(OutboxPublisher::new(
            BroadcastPublisher::new(EVENT_CHANNEL_CAPACITY),
            config.outbox_capacity,
        ));
        let processor = Arc::new(WebhookProcessor::new(verifier, engine, outbox.clone()));

        Self { processor, outbox }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NegotiationEvent> {
        self.outbox.inner().subscribe()
    }

    pub fn router(&self, config: &Config) -> Router {
        router(
            AppState::new(self.processor.clone(), &config.signature_header),
            config.max_body_bytes,
        )
    }
}

/// Binds `config.bind` and serves until Ctrl-C.
pub async fn serve(config: Config, stores: Stores) -> Result<()> {
    if config.webhook_secret.is_none() {
        tracing::error!(
            alert = "configuration",
            "No webhook secret configured; every delivery will be rejected"
        );
    }

    let app = App::new(&config, &stores);
    let event_log = spawn_event_log(app.subscribe());
    let flusher = spawn_outbox_flusher(app.outbox.clone(), config.outbox_retry_interval);

    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    tracing::info!(
        addr = %config.bind,
        signature_header = %config.signature_header,
        "Escrow webhook server listening"
    );

    axum::serve(listener, app.router(&config))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    flusher.abort();
    event_log.abort();
    let undelivered = app.outbox.pending_len().await;
    if undelivered > 0 {
        tracing::warn!(undelivered, "Shutting down with undelivered escrow events");
    }
    tracing::info!("Escrow webhook server stopped");
    Ok(())
}

fn spawn_event_log(mut events: broadcast::Receiver<NegotiationEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => tracing::info!(
                    event_id = %event.id,
                    event_type = event.event_type.as_str(),
                    negotiation_id = %event.negotiation_id,
                    "Escrow event published"
                ),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event log fell behind the publisher")
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn spawn_outbox_flusher(
    outbox: Arc<OutboxPublisher<BroadcastPublisher>>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period.max(MIN_OUTBOX_RETRY_INTERVAL));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = outbox.flush().await {
                tracing::warn!(error = %e, "Outbox flush failed");
            }
        }
    })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
