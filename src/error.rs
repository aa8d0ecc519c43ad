use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Field-level validation report, keyed by payload field name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn fields(&self) -> &BTreeMap<String, Vec<String>> {
        &self.0
    }

    /// Returns `Ok(())` when no errors were collected.
    pub fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(EscrowError::Validation(self))
        }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|(field, messages)| format!("{}: {}", field, messages.join(", ")))
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}

#[derive(Error, Debug)]
pub enum EscrowError {
    #[error("Authentication failed: {0}")]
    Authentication(String),
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),
    #[error("Validation failed: {0}")]
    Validation(FieldErrors),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("No escrow account matches provider reference '{0}'")]
    AccountNotFound(String),
    #[error("Negotiation {0} not found")]
    NegotiationNotFound(Uuid),
    #[error("Ledger conflict: {0}")]
    LedgerConflict(String),
    #[error("Transaction '{reference}' is already recorded for escrow account {account_id}")]
    DuplicateTransaction { account_id: Uuid, reference: String },
    #[error("Concurrent modification of escrow account {0}")]
    ConcurrentModification(Uuid),
    #[error("Event publication failed: {0}")]
    Publish(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[cfg(feature = "storage-rocksdb")]
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),
    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

impl EscrowError {
    /// Single-field validation failure.
    pub fn invalid_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.add(field, message);
        Self::Validation(errors)
    }

    /// Errors the provider should retry (anything not caused by the payload itself).
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::Authentication(_)
                | Self::MalformedPayload(_)
                | Self::Validation(_)
                | Self::AccountNotFound(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, EscrowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_errors_collects_per_field() {
        let mut errors = FieldErrors::new();
        errors.add("event", "is required");
        errors.add("amount", "must be a number");
        errors.add("amount", "must be greater than zero");

        assert!(errors.contains("amount"));
        assert_eq!(errors.fields()["amount"].len(), 2);
        assert_eq!(
            errors.to_string(),
            "amount: must be a number, must be greater than zero; event: is required"
        );
    }

    #[test]
    fn test_empty_field_errors_is_ok() {
        assert!(FieldErrors::new().into_result().is_ok());
        let mut errors = FieldErrors::new();
        errors.add("event", "is required");
        assert!(matches!(
            errors.into_result(),
            Err(EscrowError::Validation(_))
        ));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(!EscrowError::Authentication("bad".into()).is_retryable());
        assert!(!EscrowError::AccountNotFound("ref".into()).is_retryable());
        assert!(EscrowError::LedgerConflict("overdraft".into()).is_retryable());
        assert!(EscrowError::Configuration("missing secret".into()).is_retryable());
    }
}
