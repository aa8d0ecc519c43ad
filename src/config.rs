use rust_decimal::Decimal;
use secrecy::SecretString;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_SIGNATURE_HEADER: &str = "x-escrow-signature";
pub const DEFAULT_MAX_BODY_BYTES: usize = 64 * 1024;

/// Runtime configuration for the webhook server.
///
/// The binary fills this from CLI flags and `ESCROW_*` environment
/// variables; tests build it directly.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind: SocketAddr,
    /// Shared HMAC secret. `None` makes every delivery fail with a 500.
    pub webhook_secret: Option<SecretString>,
    pub signature_header: String,
    pub settlement_tolerance: Decimal,
    pub max_body_bytes: usize,
    pub db_path: Option<PathBuf>,
    pub seed_path: Option<PathBuf>,
    pub outbox_capacity: usize,
    pub outbox_retry_interval: Duration,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8080)),
            webhook_secret: None,
            signature_header: DEFAULT_SIGNATURE_HEADER.to_string(),
            settlement_tolerance: Decimal::ZERO,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            db_path: None,
            seed_path: None,
            outbox_capacity: 10_000,
            outbox_retry_interval: Duration::from_secs(5),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    pub fn with_webhook_secret(mut self, secret: impl Into<String>) -> Self {
        self.webhook_secret = Some(SecretString::from(secret.into()));
        self
    }

    pub fn with_signature_header(mut self, header: impl Into<String>) -> Self {
        self.signature_header = header.into().to_ascii_lowercase();
        self
    }

    pub fn with_settlement_tolerance(mut self, tolerance: Decimal) -> Self {
        self.settlement_tolerance = tolerance.abs();
        self
    }
}
