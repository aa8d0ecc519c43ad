mod common;

use async_trait::async_trait;
use common::{
    FailingPublisher, Harness, RecordingPublisher, SECRET, envelope, seeded_stores, signature,
};
use escrow_webhook::application::engine::SettlementEngine;
use escrow_webhook::application::processor::{WebhookOutcome, WebhookProcessor};
use escrow_webhook::application::signature::HmacSha256Verifier;
use escrow_webhook::domain::events::{NegotiationEvent, NegotiationEventType};
use escrow_webhook::domain::money::LedgerPolicy;
use escrow_webhook::domain::negotiation::NegotiationStatus;
use escrow_webhook::domain::ports::{EscrowStore, EventPublisher, EventPublisherRef};
use escrow_webhook::error::{EscrowError, Result};
use escrow_webhook::infrastructure::publisher::OutboxPublisher;
use escrow_webhook::server::Stores;
use rust_decimal_macros::dec;
use secrecy::SecretString;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

fn processor(stores: &Stores, publisher: EventPublisherRef) -> WebhookProcessor {
    let verifier = Arc::new(HmacSha256Verifier::new(Some(SecretString::from(
        SECRET.to_string(),
    ))));
    let engine = SettlementEngine::new(
        stores.escrow.clone(),
        stores.negotiations.clone(),
        LedgerPolicy::default(),
    );
    WebhookProcessor::new(verifier, engine, publisher)
}

/// Delivers to a recorder only while switched on.
#[derive(Default)]
struct SwitchablePublisher {
    online: AtomicBool,
    delivered: RecordingPublisher,
}

#[async_trait]
impl EventPublisher for SwitchablePublisher {
    async fn publish(&self, event: &NegotiationEvent) -> Result<()> {
        if !self.online.load(Ordering::SeqCst) {
            return Err(EscrowError::Publish("offline".to_string()));
        }
        self.delivered.publish(event).await
    }
}

#[tokio::test]
async fn test_subscribers_receive_committed_event() {
    let harness = Harness::new(Some(dec!(100))).await;
    let mut events = harness.app.subscribe();

    harness
        .deliver(&envelope("funding_confirmed", "tx_1", Some("100")))
        .await;

    let event = events.recv().await.unwrap();
    assert_eq!(event.event_type, NegotiationEventType::EscrowFunded);
    assert_eq!(event.negotiation_id, harness.negotiation_id);
    assert_eq!(event.payload.external_transaction_id, "tx_1");
    assert_eq!(event.payload.residual.value(), dec!(100));
    assert_eq!(
        event.payload.negotiation_status,
        NegotiationStatus::EscrowFunded
    );

    let row = harness
        .stores
        .escrow
        .find_transaction(harness.account_id, "tx_1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.id, row.id);
}

#[tokio::test]
async fn test_replay_publishes_nothing() {
    let (stores, _, _) = seeded_stores(Some(dec!(100))).await;
    let recorder = Arc::new(RecordingPublisher::default());
    let processor = processor(&stores, recorder.clone());
    let body = envelope("funding_confirmed", "tx_1", Some("40"));
    let sig = signature(&body);

    let first = processor.handle(&body, Some(&sig)).await.unwrap();
    let second = processor.handle(&body, Some(&sig)).await.unwrap();

    assert!(matches!(first, WebhookOutcome::Processed(_)));
    assert_eq!(second, WebhookOutcome::AlreadyProcessed);
    let events = recorder.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, NegotiationEventType::FundingReceived);
}

#[tokio::test]
async fn test_publish_failure_does_not_fail_delivery() {
    let (stores, _, account_id) = seeded_stores(Some(dec!(100))).await;
    let processor = processor(&stores, Arc::new(FailingPublisher));
    let body = envelope("funding_confirmed", "tx_1", Some("100"));

    let outcome = processor.handle(&body, Some(&signature(&body))).await.unwrap();

    assert!(matches!(outcome, WebhookOutcome::Processed(_)));
    let account = stores.escrow.get_account(account_id).await.unwrap().unwrap();
    assert_eq!(account.funded_amount.value(), dec!(100));
}

#[tokio::test]
async fn test_outbox_redelivers_in_order_once_publisher_recovers() {
    let (stores, _, _) = seeded_stores(Some(dec!(100))).await;
    let outbox = Arc::new(OutboxPublisher::new(SwitchablePublisher::default(), 16));
    let processor = processor(&stores, outbox.clone());

    for (id, amount) in [("tx_1", "30"), ("tx_2", "70"), ("tx_3", "10")] {
        let body = if id == "tx_3" {
            envelope("release_settled", id, Some(amount))
        } else {
            envelope("funding_confirmed", id, Some(amount))
        };
        processor
            .handle(&body, Some(&signature(&body)))
            .await
            .unwrap();
    }
    assert_eq!(outbox.pending_len().await, 3);
    assert!(outbox.inner().delivered.events().is_empty());

    outbox.inner().online.store(true, Ordering::SeqCst);
    assert_eq!(outbox.flush().await.unwrap(), 3);

    let delivered: Vec<_> = outbox
        .inner()
        .delivered
        .events()
        .into_iter()
        .map(|event| event.event_type)
        .collect();
    assert_eq!(
        delivered,
        vec![
            NegotiationEventType::FundingReceived,
            NegotiationEventType::EscrowFunded,
            NegotiationEventType::EscrowReleased,
        ]
    );
    assert_eq!(outbox.pending_len().await, 0);
}
