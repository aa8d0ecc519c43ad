mod common;

use axum::http::StatusCode;
use common::{Harness, envelope};
use escrow_webhook::domain::escrow::EscrowStatus;
use escrow_webhook::domain::negotiation::NegotiationStatus;
use escrow_webhook::domain::ports::NegotiationStore;
use rust_decimal_macros::dec;
use serde_json::json;
use std::sync::Arc;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_duplicate_deliveries_apply_once() {
    let harness = Arc::new(Harness::new(Some(dec!(100))).await);
    let body = Arc::new(envelope("funding_confirmed", "tx_dup", Some("100")));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let harness = harness.clone();
        let body = body.clone();
        handles.push(tokio::spawn(async move { harness.deliver(&body).await }));
    }

    let mut applied = 0;
    let mut replayed = 0;
    for handle in handles {
        let (status, ack) = handle.await.unwrap();
        assert_eq!(status, StatusCode::OK);
        if ack == json!({ "status": "ok" }) {
            applied += 1;
        } else {
            assert_eq!(ack, json!({ "status": "idempotent-ok" }));
            replayed += 1;
        }
    }

    assert_eq!(applied, 1);
    assert_eq!(replayed, 7);
    assert_eq!(harness.ledger_len().await, 1);
    assert_eq!(harness.account().await.funded_amount.value(), dec!(100));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_distinct_fundings_all_land() {
    let harness = Arc::new(Harness::new(Some(dec!(100))).await);

    let mut handles = Vec::new();
    for i in 0..4 {
        let harness = harness.clone();
        handles.push(tokio::spawn(async move {
            let body = envelope("funding_confirmed", &format!("tx_{}", i), Some("25"));
            harness.deliver(&body).await
        }));
    }
    for handle in handles {
        let (status, _) = handle.await.unwrap();
        assert_eq!(status, StatusCode::OK);
    }

    let account = harness.account().await;
    assert_eq!(account.funded_amount.value(), dec!(100));
    assert_eq!(account.status, EscrowStatus::Funded);
    assert_eq!(account.version, 4);
    assert_eq!(harness.ledger_len().await, 4);

    assert_eq!(
        harness.negotiation_status().await,
        NegotiationStatus::EscrowFunded
    );
    let history = harness
        .stores
        .negotiations
        .history(harness.negotiation_id)
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
}
