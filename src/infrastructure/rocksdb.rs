use crate::domain::escrow::{EscrowAccount, EscrowTransaction};
use crate::domain::negotiation::{
    Negotiation, NegotiationStatus, NegotiationSummary, StatusHistoryEntry,
};
use crate::domain::ports::{EscrowStore, NegotiationStore, SettlementCommit};
use crate::error::{EscrowError, Result};
use async_trait::async_trait;
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options, WriteBatch,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Column Family for escrow account states.
pub const CF_ACCOUNTS: &str = "accounts";
/// Column Family mapping provider references to account ids.
pub const CF_REFERENCES: &str = "references";
/// Column Family for ledger rows, keyed by account id + provider reference.
pub const CF_TRANSACTIONS: &str = "transactions";
/// Column Family for negotiation records.
pub const CF_NEGOTIATIONS: &str = "negotiations";
/// Column Family for the append-only status history log.
pub const CF_HISTORY: &str = "status_history";

const COLUMN_FAMILIES: [&str; 5] = [
    CF_ACCOUNTS,
    CF_REFERENCES,
    CF_TRANSACTIONS,
    CF_NEGOTIATIONS,
    CF_HISTORY,
];

/// A persistent store implementation using RocksDB.
///
/// Every entity lives in its own Column Family. A settlement is written as
/// one `WriteBatch`, and writers are serialised by `commit_lock` so the
/// uniqueness and version checks cannot interleave.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDbStore {
    db: Arc<DB>,
    commit_lock: Arc<Mutex<()>>,
}

impl RocksDbStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that all required column families exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        Ok(Self {
            db: Arc::new(db),
            commit_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            EscrowError::InternalError(Box::new(std::io::Error::other(format!(
                "{} column family not found",
                name
            ))))
        })
    }

    fn read<T: DeserializeOwned>(&self, cf: &str, key: &[u8]) -> Result<Option<T>> {
        match self.db.get_cf(self.cf(cf)?, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn write<T: Serialize>(&self, cf: &str, key: &[u8], value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.db.put_cf(self.cf(cf)?, key, bytes)?;
        Ok(())
    }

    /// All values whose key starts with `prefix`, in key order.
    fn scan<T: DeserializeOwned>(&self, cf: &str, prefix: &[u8]) -> Result<Vec<T>> {
        let iter = self
            .db
            .iterator_cf(self.cf(cf)?, IteratorMode::From(prefix, Direction::Forward));

        let mut values = Vec::new();
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            values.push(serde_json::from_slice(&value)?);
        }
        Ok(values)
    }
}

fn transaction_key(account_id: Uuid, reference: &str) -> Vec<u8> {
    let mut key = account_id.as_bytes().to_vec();
    key.extend_from_slice(reference.as_bytes());
    key
}

/// Negotiation id, then microsecond timestamp, then entry id: iteration
/// order under the negotiation prefix is recording order.
fn history_key(entry: &StatusHistoryEntry) -> Vec<u8> {
    let mut key = entry.negotiation_id.as_bytes().to_vec();
    key.extend_from_slice(&(entry.at.timestamp_micros().max(0) as u64).to_be_bytes());
    key.extend_from_slice(entry.id.as_bytes());
    key
}

#[async_trait]
impl EscrowStore for RocksDbStore {
    async fn open_account(&self, account: EscrowAccount) -> Result<()> {
        let _guard = self.commit_lock.lock().await;
        let reference = account.provider_reference.as_bytes();
        if let Some(existing) = self.db.get_cf(self.cf(CF_REFERENCES)?, reference)?
            && existing.as_slice() != account.id.as_bytes()
        {
            return Err(EscrowError::invalid_field(
                "providerReference",
                format!("'{}' is already in use", account.provider_reference),
            ));
        }

        let mut batch = WriteBatch::default();
        batch.put_cf(self.cf(CF_REFERENCES)?, reference, account.id.as_bytes());
        batch.put_cf(
            self.cf(CF_ACCOUNTS)?,
            account.id.as_bytes(),
            serde_json::to_vec(&account)?,
        );
        self.db.write(batch)?;
        Ok(())
    }

    async fn find_by_reference(&self, provider_reference: &str) -> Result<Option<EscrowAccount>> {
        let Some(id) = self
            .db
            .get_cf(self.cf(CF_REFERENCES)?, provider_reference.as_bytes())?
        else {
            return Ok(None);
        };
        self.read(CF_ACCOUNTS, &id)
    }

    async fn get_account(&self, account_id: Uuid) -> Result<Option<EscrowAccount>> {
        self.read(CF_ACCOUNTS, account_id.as_bytes())
    }

    async fn find_transaction(
        &self,
        account_id: Uuid,
        reference: &str,
    ) -> Result<Option<EscrowTransaction>> {
        self.read(CF_TRANSACTIONS, &transaction_key(account_id, reference))
    }

    async fn transactions(&self, account_id: Uuid) -> Result<Vec<EscrowTransaction>> {
        let mut rows: Vec<EscrowTransaction> =
            self.scan(CF_TRANSACTIONS, account_id.as_bytes())?;
        rows.sort_by_key(|tx| tx.occurred_at);
        Ok(rows)
    }

    async fn commit(&self, commit: SettlementCommit) -> Result<()> {
        let _guard = self.commit_lock.lock().await;
        let account_id = commit.account.id;
        let tx_key = transaction_key(account_id, &commit.transaction.reference);

        if self
            .db
            .get_pinned_cf(self.cf(CF_TRANSACTIONS)?, &tx_key)?
            .is_some()
        {
            return Err(EscrowError::DuplicateTransaction {
                account_id,
                reference: commit.transaction.reference,
            });
        }

        let current: EscrowAccount = self
            .read(CF_ACCOUNTS, account_id.as_bytes())?
            .ok_or_else(|| {
                EscrowError::AccountNotFound(commit.account.provider_reference.clone())
            })?;
        if current.version != commit.expected_version {
            return Err(EscrowError::ConcurrentModification(account_id));
        }

        let mut batch = WriteBatch::default();

        if let Some(transition) = &commit.negotiation {
            let mut negotiation: Negotiation = self
                .read(CF_NEGOTIATIONS, transition.negotiation_id.as_bytes())?
                .ok_or(EscrowError::NegotiationNotFound(transition.negotiation_id))?;
            if negotiation.status != transition.from {
                return Err(EscrowError::ConcurrentModification(account_id));
            }
            negotiation.status = transition.to;
            negotiation.updated_at = transition.at;

            let entry = transition.history_entry();
            batch.put_cf(
                self.cf(CF_NEGOTIATIONS)?,
                negotiation.id.as_bytes(),
                serde_json::to_vec(&negotiation)?,
            );
            batch.put_cf(
                self.cf(CF_HISTORY)?,
                history_key(&entry),
                serde_json::to_vec(&entry)?,
            );
        }

        batch.put_cf(
            self.cf(CF_TRANSACTIONS)?,
            &tx_key,
            serde_json::to_vec(&commit.transaction)?,
        );
        batch.put_cf(
            self.cf(CF_ACCOUNTS)?,
            account_id.as_bytes(),
            serde_json::to_vec(&commit.account)?,
        );

        self.db.write(batch)?;
        Ok(())
    }
}

#[async_trait]
impl NegotiationStore for RocksDbStore {
    async fn insert(&self, negotiation: Negotiation) -> Result<()> {
        let _guard = self.commit_lock.lock().await;
        self.write(CF_NEGOTIATIONS, negotiation.id.as_bytes(), &negotiation)
    }

    async fn get(&self, negotiation_id: Uuid) -> Result<Option<Negotiation>> {
        self.read(CF_NEGOTIATIONS, negotiation_id.as_bytes())
    }

    async fn status(&self, negotiation_id: Uuid) -> Result<Option<NegotiationSummary>> {
        let negotiation: Option<Negotiation> =
            self.read(CF_NEGOTIATIONS, negotiation_id.as_bytes())?;
        Ok(negotiation.as_ref().map(Negotiation::summary))
    }

    async fn append_history(&self, entry: StatusHistoryEntry) -> Result<()> {
        self.write(CF_HISTORY, &history_key(&entry), &entry)
    }

    async fn update_status(&self, negotiation_id: Uuid, status: NegotiationStatus) -> Result<()> {
        let _guard = self.commit_lock.lock().await;
        let mut negotiation: Negotiation = self
            .read(CF_NEGOTIATIONS, negotiation_id.as_bytes())?
            .ok_or(EscrowError::NegotiationNotFound(negotiation_id))?;
        negotiation.status = status;
        negotiation.updated_at = chrono::Utc::now();
        self.write(CF_NEGOTIATIONS, negotiation_id.as_bytes(), &negotiation)
    }

    async fn history(&self, negotiation_id: Uuid) -> Result<Vec<StatusHistoryEntry>> {
        self.scan(CF_HISTORY, negotiation_id.as_bytes())
    }
}
