use super::escrow::{EscrowAccount, EscrowStatus, EscrowTransaction, LedgerOutcome};
use super::money::Balance;
use super::negotiation::NegotiationStatus;
use super::webhook::{Metadata, WebhookEventKind};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
pub enum NegotiationEventType {
    #[serde(rename = "escrow.funding_received")]
    FundingReceived,
    #[serde(rename = "escrow.funded")]
    EscrowFunded,
    #[serde(rename = "escrow.released")]
    EscrowReleased,
    #[serde(rename = "escrow.refunded")]
    EscrowRefunded,
    #[serde(rename = "escrow.dispute_opened")]
    DisputeOpened,
    #[serde(rename = "escrow.dispute_resolved")]
    DisputeResolved,
    #[serde(rename = "escrow.statement_ready")]
    StatementReady,
}

impl NegotiationEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FundingReceived => "escrow.funding_received",
            Self::EscrowFunded => "escrow.funded",
            Self::EscrowReleased => "escrow.released",
            Self::EscrowRefunded => "escrow.refunded",
            Self::DisputeOpened => "escrow.dispute_opened",
            Self::DisputeResolved => "escrow.dispute_resolved",
            Self::StatementReady => "escrow.statement_ready",
        }
    }

    fn for_outcome(outcome: &LedgerOutcome) -> Self {
        match outcome.kind {
            WebhookEventKind::FundingConfirmed if outcome.status == EscrowStatus::Funded => {
                Self::EscrowFunded
            }
            WebhookEventKind::FundingConfirmed => Self::FundingReceived,
            WebhookEventKind::ReleaseSettled => Self::EscrowReleased,
            WebhookEventKind::RefundProcessed => Self::EscrowRefunded,
            WebhookEventKind::DisputeOpened => Self::DisputeOpened,
            WebhookEventKind::DisputeResolved => Self::DisputeResolved,
            WebhookEventKind::StatementReady => Self::StatementReady,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct EscrowEventPayload {
    pub escrow_account_id: Uuid,
    pub provider_reference: String,
    pub external_transaction_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub funded_amount: Balance,
    pub released_amount: Balance,
    pub refunded_amount: Balance,
    pub residual: Balance,
    pub escrow_status: EscrowStatus,
    pub negotiation_status: NegotiationStatus,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: Metadata,
}

/// Outbound domain event, one per committed webhook.
///
/// Subscribers must deduplicate on `id`; delivery is at-least-once.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct NegotiationEvent {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub event_type: NegotiationEventType,
    pub negotiation_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub payload: EscrowEventPayload,
}

impl NegotiationEvent {
    pub fn from_settlement(
        account: &EscrowAccount,
        transaction: &EscrowTransaction,
        outcome: &LedgerOutcome,
        negotiation_status: NegotiationStatus,
    ) -> Self {
        Self {
            // The ledger row id doubles as the event id so redeliveries dedupe.
            id: transaction.id,
            event_type: NegotiationEventType::for_outcome(outcome),
            negotiation_id: account.negotiation_id,
            occurred_at: transaction.occurred_at,
            payload: EscrowEventPayload {
                escrow_account_id: account.id,
                provider_reference: account.provider_reference.clone(),
                external_transaction_id: transaction.reference.clone(),
                amount: transaction.amount,
                currency: account.currency.clone(),
                funded_amount: account.funded_amount,
                released_amount: account.released_amount,
                refunded_amount: account.refunded_amount,
                residual: outcome.residual,
                escrow_status: outcome.status,
                negotiation_status,
                metadata: transaction.metadata.clone(),
            },
        }
    }
}
