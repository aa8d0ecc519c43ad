use crate::domain::escrow::EscrowAccount;
use crate::domain::money::Balance;
use crate::domain::negotiation::{Negotiation, NegotiationStatus};
use crate::domain::ports::{EscrowStore, NegotiationStore};
use crate::error::Result;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::Path;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedNegotiation {
    pub id: Uuid,
    pub status: NegotiationStatus,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedAccount {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub negotiation_id: Uuid,
    pub provider_reference: String,
    pub currency: String,
    #[serde(default)]
    pub expected_amount: Option<Decimal>,
}

/// Negotiations and escrow accounts to register at start-up.
#[derive(Debug, Default, Deserialize)]
pub struct SeedData {
    #[serde(default)]
    pub negotiations: Vec<SeedNegotiation>,
    #[serde(default)]
    pub accounts: Vec<SeedAccount>,
}

impl SeedData {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Registers everything that is not already present.
    pub async fn apply(
        self,
        escrow: &dyn EscrowStore,
        negotiations: &dyn NegotiationStore,
    ) -> Result<()> {
        for seed in self.negotiations {
            if negotiations.get(seed.id).await?.is_some() {
                continue;
            }
            let mut negotiation = Negotiation::new(seed.status, seed.expires_at);
            negotiation.id = seed.id;
            negotiations.insert(negotiation).await?;
        }

        for seed in self.accounts {
            if escrow
                .find_by_reference(&seed.provider_reference)
                .await?
                .is_some()
            {
                continue;
            }
            let mut account = EscrowAccount::open(
                seed.negotiation_id,
                seed.provider_reference,
                seed.currency.to_ascii_uppercase(),
                seed.expected_amount.map(Balance::new),
            );
            if let Some(id) = seed.id {
                account.id = id;
            }
            tracing::info!(
                provider_reference = %account.provider_reference,
                negotiation_id = %account.negotiation_id,
                "Seeded escrow account"
            );
            escrow.open_account(account).await?;
        }
        Ok(())
    }
}
