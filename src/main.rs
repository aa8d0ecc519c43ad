use clap::{Args, Parser, Subcommand};
use escrow_webhook::application::ledger_view::load_ledger_view;
use escrow_webhook::application::signature::sign;
use escrow_webhook::config::{
    Config, DEFAULT_MAX_BODY_BYTES, DEFAULT_SIGNATURE_HEADER, LoggingConfig,
};
use escrow_webhook::server::{self, Stores};
use escrow_webhook::telemetry::init_tracing;
use miette::{IntoDiagnostic, Result};
use rust_decimal::Decimal;
use secrecy::SecretString;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(author, version, about = "Escrow provider webhook ingestion and settlement", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the webhook server
    Serve(ServeArgs),
    /// Print the hex HMAC-SHA256 signature of a payload file
    Sign(SignArgs),
    /// Print one escrow account with its ledger and negotiation history as JSON
    Ledger(LedgerArgs),
}

#[derive(Args)]
struct StorageArgs {
    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, env = "ESCROW_DB_PATH")]
    db_path: Option<PathBuf>,

    /// JSON file of negotiations and escrow accounts to register on start-up
    #[arg(long, env = "ESCROW_SEED_PATH")]
    seed: Option<PathBuf>,
}

impl StorageArgs {
    async fn open(&self) -> Result<Stores> {
        let stores = Stores::open(self.db_path.as_deref()).into_diagnostic()?;
        if let Some(seed) = &self.seed {
            stores.seed_from(seed).await.into_diagnostic()?;
        }
        Ok(stores)
    }
}

#[derive(Args)]
struct ServeArgs {
    #[arg(long, env = "ESCROW_BIND", default_value = "127.0.0.1:8080")]
    bind: SocketAddr,

    /// Shared HMAC secret agreed with the escrow provider
    #[arg(long, env = "ESCROW_WEBHOOK_SECRET", hide_env_values = true)]
    webhook_secret: Option<String>,

    #[arg(long, env = "ESCROW_SIGNATURE_HEADER", default_value = DEFAULT_SIGNATURE_HEADER)]
    signature_header: String,

    /// Absolute tolerance for balance comparisons
    #[arg(long, env = "ESCROW_SETTLEMENT_TOLERANCE", default_value = "0")]
    settlement_tolerance: Decimal,

    #[arg(long, env = "ESCROW_MAX_BODY_BYTES", default_value_t = DEFAULT_MAX_BODY_BYTES)]
    max_body_bytes: usize,

    /// Undelivered events kept for redelivery before the oldest is dropped
    #[arg(long, env = "ESCROW_OUTBOX_CAPACITY", default_value_t = 10_000)]
    outbox_capacity: usize,

    #[arg(long, env = "ESCROW_OUTBOX_RETRY_SECS", default_value_t = 5)]
    outbox_retry_secs: u64,

    /// Default log filter, overridden by RUST_LOG
    #[arg(long, env = "ESCROW_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[arg(long, env = "ESCROW_LOG_JSON")]
    log_json: bool,

    #[command(flatten)]
    storage: StorageArgs,
}

impl ServeArgs {
    fn config(&self) -> Config {
        let mut config = Config {
            bind: self.bind,
            max_body_bytes: self.max_body_bytes,
            db_path: self.storage.db_path.clone(),
            seed_path: self.storage.seed.clone(),
            outbox_capacity: self.outbox_capacity,
            outbox_retry_interval: Duration::from_secs(self.outbox_retry_secs),
            logging: LoggingConfig {
                level: self.log_level.clone(),
                json: self.log_json,
            },
            ..Config::default()
        }
        .with_signature_header(self.signature_header.as_str())
        .with_settlement_tolerance(self.settlement_tolerance);

        if let Some(secret) = self.webhook_secret.as_deref().filter(|s| !s.trim().is_empty()) {
            config = config.with_webhook_secret(secret);
        }
        config
    }
}

#[derive(Args)]
struct SignArgs {
    #[arg(long, env = "ESCROW_WEBHOOK_SECRET", hide_env_values = true)]
    secret: String,

    /// File holding the exact bytes that will be sent as the request body
    payload: PathBuf,
}

#[derive(Args)]
struct LedgerArgs {
    /// Provider reference of the escrow account
    reference: String,

    #[command(flatten)]
    storage: StorageArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve(args) => {
            let config = args.config();
            init_tracing(&config.logging);
            let stores = args.storage.open().await?;
            server::serve(config, stores).await.into_diagnostic()?;
        }
        Command::Sign(args) => {
            let payload = std::fs::read(&args.payload).into_diagnostic()?;
            let signature = sign(&SecretString::from(args.secret), &payload).into_diagnostic()?;
            println!("{}", signature);
        }
        Command::Ledger(args) => {
            let stores = args.storage.open().await?;
            let view = load_ledger_view(
                stores.escrow.as_ref(),
                stores.negotiations.as_ref(),
                &args.reference,
            )
            .await
            .into_diagnostic()?;
            println!("{}", serde_json::to_string_pretty(&view).into_diagnostic()?);
        }
    }

    Ok(())
}
