use super::money::Amount;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Opaque provider metadata, carried through for audit only.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// The closed set of webhook kinds the escrow provider sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookEventKind {
    FundingConfirmed,
    ReleaseSettled,
    RefundProcessed,
    DisputeOpened,
    DisputeResolved,
    StatementReady,
}

impl WebhookEventKind {
    pub const ALL: [WebhookEventKind; 6] = [
        Self::FundingConfirmed,
        Self::ReleaseSettled,
        Self::RefundProcessed,
        Self::DisputeOpened,
        Self::DisputeResolved,
        Self::StatementReady,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FundingConfirmed => "funding_confirmed",
            Self::ReleaseSettled => "release_settled",
            Self::RefundProcessed => "refund_processed",
            Self::DisputeOpened => "dispute_opened",
            Self::DisputeResolved => "dispute_resolved",
            Self::StatementReady => "statement_ready",
        }
    }

    /// Whether this kind moves money and therefore requires an amount.
    pub fn is_monetary(&self) -> bool {
        matches!(
            self,
            Self::FundingConfirmed | Self::ReleaseSettled | Self::RefundProcessed
        )
    }
}

impl fmt::Display for WebhookEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WebhookEventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown event kind '{}'", s))
    }
}

/// A validated webhook, one variant per event kind.
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookEvent {
    FundingConfirmed { amount: Amount },
    ReleaseSettled { amount: Amount },
    RefundProcessed { amount: Amount },
    DisputeOpened { disputed_amount: Option<Decimal> },
    DisputeResolved { adjustment: Option<Decimal> },
    StatementReady,
}

impl WebhookEvent {
    pub fn kind(&self) -> WebhookEventKind {
        match self {
            Self::FundingConfirmed { .. } => WebhookEventKind::FundingConfirmed,
            Self::ReleaseSettled { .. } => WebhookEventKind::ReleaseSettled,
            Self::RefundProcessed { .. } => WebhookEventKind::RefundProcessed,
            Self::DisputeOpened { .. } => WebhookEventKind::DisputeOpened,
            Self::DisputeResolved { .. } => WebhookEventKind::DisputeResolved,
            Self::StatementReady => WebhookEventKind::StatementReady,
        }
    }

    /// The amount recorded on the ledger row; zero for non-monetary events
    /// that carry no informational figure.
    pub fn recorded_amount(&self) -> Decimal {
        match self {
            Self::FundingConfirmed { amount }
            | Self::ReleaseSettled { amount }
            | Self::RefundProcessed { amount } => amount.value(),
            Self::DisputeOpened { disputed_amount } => disputed_amount.unwrap_or_default(),
            Self::DisputeResolved { adjustment } => adjustment.unwrap_or_default(),
            Self::StatementReady => Decimal::ZERO,
        }
    }
}

/// An authenticated, schema-checked provider callback.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedWebhook {
    pub provider_reference: String,
    pub external_transaction_id: String,
    pub currency: Option<String>,
    pub occurred_at: DateTime<Utc>,
    pub metadata: Metadata,
    pub event: WebhookEvent,
}
