use super::money::{Balance, LedgerPolicy};
use super::webhook::{Metadata, ValidatedWebhook, WebhookEvent, WebhookEventKind};
use crate::error::{EscrowError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EscrowStatus {
    AwaitingFunds,
    Funded,
    Released,
    Refunded,
    Disputed,
    Closed,
}

impl EscrowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AwaitingFunds => "AWAITING_FUNDS",
            Self::Funded => "FUNDED",
            Self::Released => "RELEASED",
            Self::Refunded => "REFUNDED",
            Self::Disputed => "DISPUTED",
            Self::Closed => "CLOSED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        *self == Self::Closed
    }
}

/// Funds held in trust for exactly one negotiation.
///
/// Balances only ever grow; the amount still in trust is derived by
/// [`EscrowAccount::residual`] and never stored.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct EscrowAccount {
    pub id: Uuid,
    pub negotiation_id: Uuid,
    /// External key assigned by the provider. Unique across accounts.
    pub provider_reference: String,
    pub currency: String,
    pub expected_amount: Option<Balance>,
    pub funded_amount: Balance,
    pub released_amount: Balance,
    pub refunded_amount: Balance,
    pub status: EscrowStatus,
    /// Bumped on every committed mutation; used for optimistic locking.
    #[serde(default)]
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

/// Result of applying one webhook to an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerOutcome {
    pub kind: WebhookEventKind,
    pub previous_status: EscrowStatus,
    pub status: EscrowStatus,
    pub residual: Balance,
}

impl LedgerOutcome {
    pub fn status_changed(&self) -> bool {
        self.previous_status != self.status
    }
}

impl EscrowAccount {
    pub fn open(
        negotiation_id: Uuid,
        provider_reference: impl Into<String>,
        currency: impl Into<String>,
        expected_amount: Option<Balance>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            negotiation_id,
            provider_reference: provider_reference.into(),
            currency: currency.into(),
            expected_amount,
            funded_amount: Balance::ZERO,
            released_amount: Balance::ZERO,
            refunded_amount: Balance::ZERO,
            status: EscrowStatus::AwaitingFunds,
            version: 0,
            updated_at: Utc::now(),
        }
    }

    /// `funded − released − refunded`, always derived from current totals.
    pub fn residual(&self) -> Balance {
        self.funded_amount - self.released_amount - self.refunded_amount
    }

    /// Applies a validated event to the balances and status.
    ///
    /// The account is left untouched when an error is returned.
    pub fn apply(
        &mut self,
        event: &WebhookEvent,
        policy: &LedgerPolicy,
        at: DateTime<Utc>,
    ) -> Result<LedgerOutcome> {
        let previous_status = self.status;

        match event {
            WebhookEvent::FundingConfirmed { amount } => {
                self.funded_amount += Balance::from(*amount);
                if self.status != EscrowStatus::Disputed {
                    self.status = match self.expected_amount {
                        Some(expected) if policy.covers(self.funded_amount, expected) => {
                            EscrowStatus::Funded
                        }
                        _ => EscrowStatus::AwaitingFunds,
                    };
                }
            }
            WebhookEvent::ReleaseSettled { amount } => {
                self.ensure_solvent_after((*amount).into(), policy, "release")?;
                self.released_amount += Balance::from(*amount);
                self.status = self.settle_or(EscrowStatus::Released, policy);
            }
            WebhookEvent::RefundProcessed { amount } => {
                self.ensure_solvent_after((*amount).into(), policy, "refund")?;
                self.refunded_amount += Balance::from(*amount);
                self.status = self.settle_or(EscrowStatus::Refunded, policy);
            }
            WebhookEvent::DisputeOpened { .. } => {
                if !self.status.is_terminal() {
                    self.status = EscrowStatus::Disputed;
                }
            }
            WebhookEvent::DisputeResolved { .. } => {
                self.status = self.settle_or(EscrowStatus::Funded, policy);
            }
            WebhookEvent::StatementReady => {}
        }

        self.version += 1;
        self.updated_at = at;

        Ok(LedgerOutcome {
            kind: event.kind(),
            previous_status,
            status: self.status,
            residual: self.residual(),
        })
    }

    fn settle_or(&self, unsettled: EscrowStatus, policy: &LedgerPolicy) -> EscrowStatus {
        if policy.is_settled(self.residual()) {
            EscrowStatus::Closed
        } else {
            unsettled
        }
    }

    fn ensure_solvent_after(
        &self,
        outflow: Balance,
        policy: &LedgerPolicy,
        operation: &str,
    ) -> Result<()> {
        let residual_after = self.residual() - outflow;
        if policy.is_solvent(residual_after) {
            Ok(())
        } else {
            Err(EscrowError::LedgerConflict(format!(
                "{} of {} exceeds residual {} on escrow account {}",
                operation,
                outflow,
                self.residual(),
                self.id
            )))
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EscrowTransactionType {
    Fund,
    Release,
    Refund,
    Adjustment,
}

impl From<WebhookEventKind> for EscrowTransactionType {
    fn from(kind: WebhookEventKind) -> Self {
        match kind {
            WebhookEventKind::FundingConfirmed => Self::Fund,
            WebhookEventKind::ReleaseSettled => Self::Release,
            WebhookEventKind::RefundProcessed => Self::Refund,
            WebhookEventKind::DisputeOpened
            | WebhookEventKind::DisputeResolved
            | WebhookEventKind::StatementReady => Self::Adjustment,
        }
    }
}

/// Append-only ledger row. `(escrow_account_id, reference)` is unique.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct EscrowTransaction {
    pub id: Uuid,
    pub escrow_account_id: Uuid,
    pub r#type: EscrowTransactionType,
    pub event: WebhookEventKind,
    pub amount: Decimal,
    /// Provider transaction id; the idempotency key within the account.
    pub reference: String,
    pub occurred_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl EscrowTransaction {
    pub fn record(account_id: Uuid, webhook: &ValidatedWebhook) -> Self {
        let kind = webhook.event.kind();
        Self {
            id: Uuid::new_v4(),
            escrow_account_id: account_id,
            r#type: kind.into(),
            event: kind,
            amount: webhook.event.recorded_amount(),
            reference: webhook.external_transaction_id.clone(),
            occurred_at: webhook.occurred_at,
            metadata: webhook.metadata.clone(),
        }
    }
}
