use crate::domain::escrow::{EscrowAccount, EscrowTransaction, LedgerOutcome};
use crate::domain::money::LedgerPolicy;
use crate::domain::negotiation::{NegotiationStatus, NegotiationTransition, derive_transition};
use crate::domain::ports::{EscrowStoreRef, NegotiationStoreRef, SettlementCommit};
use crate::domain::webhook::ValidatedWebhook;
use crate::error::{EscrowError, Result};
use chrono::Utc;

/// Attempts before a contended account is reported as an internal failure.
const MAX_COMMIT_ATTEMPTS: usize = 5;

/// A webhook whose effect was committed.
#[derive(Debug, Clone)]
pub struct Settlement {
    pub account: EscrowAccount,
    pub transaction: EscrowTransaction,
    pub ledger: LedgerOutcome,
    pub negotiation_transition: Option<NegotiationTransition>,
    pub negotiation_status: NegotiationStatus,
}

#[derive(Debug, Clone)]
pub enum SettlementOutcome {
    Applied(Box<Settlement>),
    /// The provider transaction was already recorded; nothing changed.
    Replayed,
}

/// Applies validated webhooks to the escrow ledger and negotiation.
///
/// Holds no mutable state of its own: each call loads, derives and commits
/// through the stores, so any number of deliveries may run concurrently.
pub struct SettlementEngine {
    escrow: EscrowStoreRef,
    negotiations: NegotiationStoreRef,
    policy: LedgerPolicy,
}

impl SettlementEngine {
    /// Creates a new `SettlementEngine`.
    ///
    /// # Arguments
    ///
    /// * `escrow` - The store for escrow accounts and ledger rows.
    /// * `negotiations` - The store for negotiations and their history.
    /// * `policy` - Tolerance used for every balance comparison.
    pub fn new(
        escrow: EscrowStoreRef,
        negotiations: NegotiationStoreRef,
        policy: LedgerPolicy,
    ) -> Self {
        Self {
            escrow,
            negotiations,
            policy,
        }
    }

    pub fn policy(&self) -> &LedgerPolicy {
        &self.policy
    }

    /// Settles one webhook exactly once.
    pub async fn settle(&self, webhook: &ValidatedWebhook) -> Result<SettlementOutcome> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_settle(webhook).await {
                Err(EscrowError::DuplicateTransaction { account_id, reference }) => {
                    // Lost the insert race to a concurrent delivery of the same transaction.
                    tracing::info!(
                        escrow_account_id = %account_id,
                        reference = %reference,
                        "Concurrent duplicate delivery absorbed"
                    );
                    return Ok(SettlementOutcome::Replayed);
                }
                Err(EscrowError::ConcurrentModification(account_id))
                    if attempt < MAX_COMMIT_ATTEMPTS =>
                {
                    tracing::debug!(
                        escrow_account_id = %account_id,
                        attempt,
                        "Escrow account changed underneath, retrying"
                    );
                }
                other => return other,
            }
        }
    }

    async fn try_settle(&self, webhook: &ValidatedWebhook) -> Result<SettlementOutcome> {
        let mut account = self
            .escrow
            .find_by_reference(&webhook.provider_reference)
            .await?
            .ok_or_else(|| EscrowError::AccountNotFound(webhook.provider_reference.clone()))?;

        if self
            .escrow
            .find_transaction(account.id, &webhook.external_transaction_id)
            .await?
            .is_some()
        {
            return Ok(SettlementOutcome::Replayed);
        }

        if let Some(currency) = &webhook.currency
            && !currency.eq_ignore_ascii_case(&account.currency)
        {
            return Err(EscrowError::invalid_field(
                "currency",
                format!(
                    "'{}' does not match escrow account currency '{}'",
                    currency, account.currency
                ),
            ));
        }

        let negotiation = self
            .negotiations
            .get(account.negotiation_id)
            .await?
            .ok_or(EscrowError::NegotiationNotFound(account.negotiation_id))?;

        let now = Utc::now();
        let expected_version = account.version;
        let ledger = account.apply(&webhook.event, &self.policy, now)?;
        let transaction = EscrowTransaction::record(account.id, webhook);
        let transition =
            derive_transition(&negotiation, &ledger, &account.provider_reference, now);
        let negotiation_status = transition
            .as_ref()
            .map(|t| t.to)
            .unwrap_or(negotiation.status);

        self.escrow
            .commit(SettlementCommit {
                account: account.clone(),
                expected_version,
                transaction: transaction.clone(),
                negotiation: transition.clone(),
            })
            .await?;

        Ok(SettlementOutcome::Applied(Box::new(Settlement {
            account,
            transaction,
            ledger,
            negotiation_transition: transition,
            negotiation_status,
        })))
    }
}
