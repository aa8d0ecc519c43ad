#![allow(dead_code)]

use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use escrow_webhook::config::Config;
use escrow_webhook::domain::escrow::EscrowAccount;
use escrow_webhook::domain::events::NegotiationEvent;
use escrow_webhook::domain::money::Balance;
use escrow_webhook::domain::negotiation::{Negotiation, NegotiationStatus};
use escrow_webhook::domain::ports::{EscrowStore, EventPublisher, NegotiationStore};
use escrow_webhook::error::{EscrowError, Result};
use escrow_webhook::server::{App, Stores};
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde_json::{Map, Number, Value, json};
use std::str::FromStr;
use std::sync::Mutex;
use tower::ServiceExt;
use uuid::Uuid;

pub const SECRET: &str = "whsec_integration";
pub const REFERENCE: &str = "esc_test_1";
pub const SIGNATURE_HEADER: &str = "x-escrow-signature";

/// A seeded in-memory deployment with one negotiation and its escrow account.
pub struct Harness {
    pub stores: Stores,
    pub app: App,
    pub router: Router,
    pub negotiation_id: Uuid,
    pub account_id: Uuid,
}

impl Harness {
    pub async fn new(expected: Option<Decimal>) -> Self {
        Self::with_config(expected, config()).await
    }

    pub async fn with_config(expected: Option<Decimal>, config: Config) -> Self {
        let (stores, negotiation_id, account_id) = seeded_stores(expected).await;
        let app = App::new(&config, &stores);
        let router = app.router(&config);
        Self {
            stores,
            app,
            router,
            negotiation_id,
            account_id,
        }
    }

    /// Signs `body` with the shared secret and posts it.
    pub async fn deliver(&self, body: &[u8]) -> (StatusCode, Value) {
        post(&self.router, body, Some(&signature(body))).await
    }

    pub async fn account(&self) -> EscrowAccount {
        self.stores
            .escrow
            .get_account(self.account_id)
            .await
            .unwrap()
            .unwrap()
    }

    pub async fn negotiation_status(&self) -> NegotiationStatus {
        self.stores
            .negotiations
            .status(self.negotiation_id)
            .await
            .unwrap()
            .unwrap()
            .status
    }

    pub async fn ledger_len(&self) -> usize {
        self.stores
            .escrow
            .transactions(self.account_id)
            .await
            .unwrap()
            .len()
    }
}

/// In-memory stores holding a contract-signed negotiation and its USD account.
/// Returns the negotiation and account ids.
pub async fn seeded_stores(expected: Option<Decimal>) -> (Stores, Uuid, Uuid) {
    let stores = Stores::in_memory();
    let negotiation = Negotiation::new(NegotiationStatus::ContractSigned, None);
    let negotiation_id = negotiation.id;
    stores.negotiations.insert(negotiation).await.unwrap();

    let account = EscrowAccount::open(negotiation_id, REFERENCE, "USD", expected.map(Balance::new));
    let account_id = account.id;
    stores.escrow.open_account(account).await.unwrap();

    (stores, negotiation_id, account_id)
}

pub fn config() -> Config {
    Config::default().with_webhook_secret(SECRET)
}

pub fn signature(body: &[u8]) -> String {
    escrow_webhook::application::signature::sign(&SecretString::from(SECRET.to_string()), body)
        .unwrap()
}

/// Builds an envelope for the harness account. `amount` is written verbatim
/// as a JSON number.
pub fn envelope(event: &str, external_id: &str, amount: Option<&str>) -> Vec<u8> {
    envelope_for(REFERENCE, event, external_id, amount)
}

pub fn envelope_for(reference: &str, event: &str, external_id: &str, amount: Option<&str>) -> Vec<u8> {
    let mut body = Map::new();
    body.insert("event".into(), json!(event));
    body.insert("providerReference".into(), json!(reference));
    body.insert("externalTransactionId".into(), json!(external_id));
    if let Some(amount) = amount {
        body.insert(
            "amount".into(),
            Value::Number(Number::from_str(amount).unwrap()),
        );
    }
    body.insert("currency".into(), json!("usd"));
    body.insert("occurredAt".into(), json!("2026-03-01T12:00:00Z"));
    serde_json::to_vec(&Value::Object(body)).unwrap()
}

pub async fn post(router: &Router, body: &[u8], signature: Option<&str>) -> (StatusCode, Value) {
    let mut request = Request::builder()
        .method("POST")
        .uri("/webhooks/escrow")
        .header("content-type", "application/json");
    if let Some(signature) = signature {
        request = request.header(SIGNATURE_HEADER, signature);
    }
    let request = request.body(Body::from(body.to_vec())).unwrap();

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

/// Keeps every event it is handed.
#[derive(Default)]
pub struct RecordingPublisher {
    pub events: Mutex<Vec<NegotiationEvent>>,
}

impl RecordingPublisher {
    pub fn events(&self) -> Vec<NegotiationEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, event: &NegotiationEvent) -> Result<()> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Rejects every event.
pub struct FailingPublisher;

#[async_trait]
impl EventPublisher for FailingPublisher {
    async fn publish(&self, _event: &NegotiationEvent) -> Result<()> {
        Err(EscrowError::Publish("broker unavailable".to_string()))
    }
}
