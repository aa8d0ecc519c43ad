//! Application layer containing the webhook ingestion pipeline.
//!
//! `WebhookProcessor` is the entry point: it authenticates the raw body,
//! validates the envelope, hands it to the `SettlementEngine` and publishes
//! the resulting domain event after the commit.

pub mod engine;
pub mod envelope;
pub mod ledger_view;
pub mod processor;
pub mod signature;
