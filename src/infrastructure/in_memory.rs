use crate::domain::escrow::{EscrowAccount, EscrowTransaction};
use crate::domain::negotiation::{
    Negotiation, NegotiationStatus, NegotiationSummary, StatusHistoryEntry,
};
use crate::domain::ports::{EscrowStore, NegotiationStore, SettlementCommit};
use crate::error::{EscrowError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct State {
    accounts: HashMap<Uuid, EscrowAccount>,
    references: HashMap<String, Uuid>,
    transactions: HashMap<(Uuid, String), EscrowTransaction>,
    negotiations: HashMap<Uuid, Negotiation>,
    history: HashMap<Uuid, Vec<StatusHistoryEntry>>,
}

/// A thread-safe in-memory store for escrow accounts and negotiations.
///
/// All entities share one `RwLock` so a [`SettlementCommit`] is checked and
/// applied under a single write guard. Ideal for testing or single-node
/// deployments where persistence is not required.
#[derive(Default, Clone)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryStore {
    /// Creates a new, empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EscrowStore for InMemoryStore {
    async fn open_account(&self, account: EscrowAccount) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(existing) = state.references.get(&account.provider_reference)
            && *existing != account.id
        {
            return Err(EscrowError::invalid_field(
                "providerReference",
                format!("'{}' is already in use", account.provider_reference),
            ));
        }
        state
            .references
            .insert(account.provider_reference.clone(), account.id);
        state.accounts.insert(account.id, account);
        Ok(())
    }

    async fn find_by_reference(&self, provider_reference: &str) -> Result<Option<EscrowAccount>> {
        let state = self.state.read().await;
        Ok(state
            .references
            .get(provider_reference)
            .and_then(|id| state.accounts.get(id))
            .cloned())
    }

    async fn get_account(&self, account_id: Uuid) -> Result<Option<EscrowAccount>> {
        let state = self.state.read().await;
        Ok(state.accounts.get(&account_id).cloned())
    }

    async fn find_transaction(
        &self,
        account_id: Uuid,
        reference: &str,
    ) -> Result<Option<EscrowTransaction>> {
        let state = self.state.read().await;
        Ok(state
            .transactions
            .get(&(account_id, reference.to_string()))
            .cloned())
    }

    async fn transactions(&self, account_id: Uuid) -> Result<Vec<EscrowTransaction>> {
        let state = self.state.read().await;
        let mut rows: Vec<EscrowTransaction> = state
            .transactions
            .values()
            .filter(|tx| tx.escrow_account_id == account_id)
            .cloned()
            .collect();
        rows.sort_by_key(|tx| tx.occurred_at);
        Ok(rows)
    }

    async fn commit(&self, commit: SettlementCommit) -> Result<()> {
        let mut state = self.state.write().await;
        let account_id = commit.account.id;
        let key = (account_id, commit.transaction.reference.clone());

        if state.transactions.contains_key(&key) {
            return Err(EscrowError::DuplicateTransaction {
                account_id,
                reference: key.1,
            });
        }

        match state.accounts.get(&account_id) {
            Some(current) if current.version == commit.expected_version => {}
            Some(_) => return Err(EscrowError::ConcurrentModification(account_id)),
            None => {
                return Err(EscrowError::AccountNotFound(
                    commit.account.provider_reference,
                ));
            }
        }

        if let Some(transition) = &commit.negotiation {
            let negotiation = state
                .negotiations
                .get_mut(&transition.negotiation_id)
                .ok_or(EscrowError::NegotiationNotFound(transition.negotiation_id))?;
            if negotiation.status != transition.from {
                return Err(EscrowError::ConcurrentModification(account_id));
            }
            negotiation.status = transition.to;
            negotiation.updated_at = transition.at;
            state
                .history
                .entry(transition.negotiation_id)
                .or_default()
                .push(transition.history_entry());
        }

        state.transactions.insert(key, commit.transaction);
        state.accounts.insert(account_id, commit.account);
        Ok(())
    }
}

#[async_trait]
impl NegotiationStore for InMemoryStore {
    async fn insert(&self, negotiation: Negotiation) -> Result<()> {
        let mut state = self.state.write().await;
        state.negotiations.insert(negotiation.id, negotiation);
        Ok(())
    }

    async fn get(&self, negotiation_id: Uuid) -> Result<Option<Negotiation>> {
        let state = self.state.read().await;
        Ok(state.negotiations.get(&negotiation_id).cloned())
    }

    async fn status(&self, negotiation_id: Uuid) -> Result<Option<NegotiationSummary>> {
        let state = self.state.read().await;
        Ok(state.negotiations.get(&negotiation_id).map(Negotiation::summary))
    }

    async fn append_history(&self, entry: StatusHistoryEntry) -> Result<()> {
        let mut state = self.state.write().await;
        state
            .history
            .entry(entry.negotiation_id)
            .or_default()
            .push(entry);
        Ok(())
    }

    async fn update_status(&self, negotiation_id: Uuid, status: NegotiationStatus) -> Result<()> {
        let mut state = self.state.write().await;
        let negotiation = state
            .negotiations
            .get_mut(&negotiation_id)
            .ok_or(EscrowError::NegotiationNotFound(negotiation_id))?;
        negotiation.status = status;
        negotiation.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn history(&self, negotiation_id: Uuid) -> Result<Vec<StatusHistoryEntry>> {
        let state = self.state.read().await;
        Ok(state
            .history
            .get(&negotiation_id)
            .cloned()
            .unwrap_or_default())
    }
}
