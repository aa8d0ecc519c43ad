use super::escrow::{EscrowAccount, EscrowTransaction};
use super::events::NegotiationEvent;
use super::negotiation::{
    Negotiation, NegotiationStatus, NegotiationSummary, NegotiationTransition,
    StatusHistoryEntry,
};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

/// Everything one webhook changes, written atomically by [`EscrowStore::commit`].
#[derive(Debug, Clone)]
pub struct SettlementCommit {
    /// The account state after the event, with its version already bumped.
    pub account: EscrowAccount,
    /// The version the account was loaded at.
    pub expected_version: u64,
    pub transaction: EscrowTransaction,
    pub negotiation: Option<NegotiationTransition>,
}

#[async_trait]
pub trait EscrowStore: Send + Sync {
    /// Registers a new account. Called by the collaborator that opens escrow.
    async fn open_account(&self, account: EscrowAccount) -> Result<()>;
    async fn find_by_reference(&self, provider_reference: &str) -> Result<Option<EscrowAccount>>;
    async fn get_account(&self, account_id: Uuid) -> Result<Option<EscrowAccount>>;
    async fn find_transaction(
        &self,
        account_id: Uuid,
        reference: &str,
    ) -> Result<Option<EscrowTransaction>>;
    async fn transactions(&self, account_id: Uuid) -> Result<Vec<EscrowTransaction>>;

    /// Applies a settlement all-or-nothing.
    ///
    /// Fails with `DuplicateTransaction` if `(account, reference)` already
    /// exists and with `ConcurrentModification` if the account version or the
    /// negotiation status moved since they were read.
    async fn commit(&self, commit: SettlementCommit) -> Result<()>;
}

/// Read/write surface over negotiations shared with the admin and UI layers.
#[async_trait]
pub trait NegotiationStore: Send + Sync {
    async fn insert(&self, negotiation: Negotiation) -> Result<()>;
    async fn get(&self, negotiation_id: Uuid) -> Result<Option<Negotiation>>;
    async fn status(&self, negotiation_id: Uuid) -> Result<Option<NegotiationSummary>>;
    async fn append_history(&self, entry: StatusHistoryEntry) -> Result<()>;
    async fn update_status(&self, negotiation_id: Uuid, status: NegotiationStatus) -> Result<()>;
    /// History entries in the order they were recorded.
    async fn history(&self, negotiation_id: Uuid) -> Result<Vec<StatusHistoryEntry>>;
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &NegotiationEvent) -> Result<()>;
}

pub type EscrowStoreRef = Arc<dyn EscrowStore>;
pub type NegotiationStoreRef = Arc<dyn NegotiationStore>;
pub type EventPublisherRef = Arc<dyn EventPublisher>;
