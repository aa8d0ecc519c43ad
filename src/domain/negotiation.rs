use super::escrow::{EscrowStatus, LedgerOutcome};
use super::webhook::WebhookEventKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NegotiationStatus {
    Initiated,
    Countering,
    Agreed,
    ContractDrafting,
    ContractSigned,
    EscrowFunded,
    Completed,
    Cancelled,
    Expired,
}

impl NegotiationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initiated => "INITIATED",
            Self::Countering => "COUNTERING",
            Self::Agreed => "AGREED",
            Self::ContractDrafting => "CONTRACT_DRAFTING",
            Self::ContractSigned => "CONTRACT_SIGNED",
            Self::EscrowFunded => "ESCROW_FUNDED",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
            Self::Expired => "EXPIRED",
        }
    }

    /// No automatic transitions leave these states.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Completed | Self::Expired)
    }
}

/// The deal lifecycle record. Its status history lives in a separate
/// append-only log, see [`StatusHistoryEntry`].
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Negotiation {
    pub id: Uuid,
    pub status: NegotiationStatus,
    pub expires_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Negotiation {
    pub fn new(status: NegotiationStatus, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            status,
            expires_at,
            updated_at: Utc::now(),
        }
    }

    pub fn summary(&self) -> NegotiationSummary {
        NegotiationSummary {
            id: self.id,
            status: self.status,
        }
    }
}

/// The `{id, status}` projection handed to collaborators.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
pub struct NegotiationSummary {
    pub id: Uuid,
    pub status: NegotiationStatus,
}

/// Immutable audit record of one status change.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct StatusHistoryEntry {
    pub id: Uuid,
    pub negotiation_id: Uuid,
    pub status: NegotiationStatus,
    pub note: String,
    pub at: DateTime<Utc>,
}

impl StatusHistoryEntry {
    pub fn new(
        negotiation_id: Uuid,
        status: NegotiationStatus,
        note: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            negotiation_id,
            status,
            note: note.into(),
            at,
        }
    }
}

/// A status change derived from a ledger outcome, applied in the same
/// commit as the ledger mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct NegotiationTransition {
    pub negotiation_id: Uuid,
    pub from: NegotiationStatus,
    pub to: NegotiationStatus,
    pub note: String,
    pub at: DateTime<Utc>,
}

impl NegotiationTransition {
    pub fn history_entry(&self) -> StatusHistoryEntry {
        StatusHistoryEntry::new(self.negotiation_id, self.to, self.note.clone(), self.at)
    }
}

/// Works out which negotiation transition, if any, a ledger outcome drives.
pub fn derive_transition(
    negotiation: &Negotiation,
    outcome: &LedgerOutcome,
    provider_reference: &str,
    at: DateTime<Utc>,
) -> Option<NegotiationTransition> {
    if negotiation.status.is_terminal() {
        return None;
    }

    let (to, note) = match (outcome.status, outcome.kind) {
        (EscrowStatus::Funded, _) => (
            NegotiationStatus::EscrowFunded,
            format!("Escrow funding confirmed by provider ({})", provider_reference),
        ),
        (EscrowStatus::Closed, WebhookEventKind::ReleaseSettled) => (
            NegotiationStatus::Completed,
            format!("Escrow released in full by provider ({})", provider_reference),
        ),
        (EscrowStatus::Closed, WebhookEventKind::RefundProcessed) => (
            NegotiationStatus::Cancelled,
            format!("Escrow refunded in full by provider ({})", provider_reference),
        ),
        _ => return None,
    };

    if negotiation.status == to {
        return None;
    }

    Some(NegotiationTransition {
        negotiation_id: negotiation.id,
        from: negotiation.status,
        to,
        note,
        at,
    })
}
