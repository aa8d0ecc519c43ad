use crate::domain::escrow::{EscrowAccount, EscrowTransaction};
use crate::domain::negotiation::{Negotiation, StatusHistoryEntry};
use crate::domain::ports::{EscrowStore, NegotiationStore};
use crate::error::{EscrowError, Result};
use serde::Serialize;

/// Read-only snapshot of one escrow account for operators.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerView {
    pub account: EscrowAccount,
    pub transactions: Vec<EscrowTransaction>,
    pub negotiation: Option<Negotiation>,
    pub history: Vec<StatusHistoryEntry>,
}

pub async fn load_ledger_view(
    escrow: &dyn EscrowStore,
    negotiations: &dyn NegotiationStore,
    provider_reference: &str,
) -> Result<LedgerView> {
    let account = escrow
        .find_by_reference(provider_reference)
        .await?
        .ok_or_else(|| EscrowError::AccountNotFound(provider_reference.to_string()))?;

    let mut transactions = escrow.transactions(account.id).await?;
    transactions.sort_by_key(|t| t.occurred_at);

    let negotiation = negotiations.get(account.negotiation_id).await?;
    let history = negotiations.history(account.negotiation_id).await?;

    Ok(LedgerView {
        account,
        transactions,
        negotiation,
        history,
    })
}
