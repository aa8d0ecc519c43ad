use super::engine::{SettlementEngine, SettlementOutcome};
use super::envelope::parse_envelope;
use super::signature::WebhookVerifier;
use crate::domain::events::NegotiationEvent;
use crate::domain::ports::EventPublisherRef;
use crate::domain::webhook::ValidatedWebhook;
use crate::error::{EscrowError, Result};
use std::sync::Arc;
use tracing::Instrument;

#[derive(Debug, Clone, PartialEq)]
pub enum WebhookOutcome {
    /// Committed; carries the event handed to the publisher.
    Processed(NegotiationEvent),
    /// Replay of an already-recorded provider transaction.
    AlreadyProcessed,
}

/// Runs one delivery through authentication, validation, settlement and
/// publication.
pub struct WebhookProcessor {
    verifier: Arc<dyn WebhookVerifier>,
    engine: SettlementEngine,
    publisher: EventPublisherRef,
}

impl WebhookProcessor {
    pub fn new(
        verifier: Arc<dyn WebhookVerifier>,
        engine: SettlementEngine,
        publisher: EventPublisherRef,
    ) -> Self {
        Self {
            verifier,
            engine,
            publisher,
        }
    }

    /// Handles the raw body exactly as received.
    ///
    /// The signature is checked against `payload` before a single byte is
    /// parsed, and the same bytes are then parsed once.
    pub async fn handle(&self, payload: &[u8], signature: Option<&str>) -> Result<WebhookOutcome> {
        let signature = signature
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| EscrowError::Authentication("missing signature".to_string()))?;

        if !self.verifier.verify(payload, signature)? {
            return Err(EscrowError::Authentication("invalid signature".to_string()));
        }

        let webhook = parse_envelope(payload)?;
        let span = tracing::info_span!(
            "webhook",
            event = %webhook.event.kind(),
            provider_reference = %webhook.provider_reference,
            external_transaction_id = %webhook.external_transaction_id,
        );
        self.settle_and_publish(&webhook).instrument(span).await
    }

    async fn settle_and_publish(&self, webhook: &ValidatedWebhook) -> Result<WebhookOutcome> {
        let settlement = match self.engine.settle(webhook).await? {
            SettlementOutcome::Replayed => {
                tracing::info!("Webhook already processed, acknowledging replay");
                return Ok(WebhookOutcome::AlreadyProcessed);
            }
            SettlementOutcome::Applied(settlement) => settlement,
        };

        tracing::info!(
            escrow_status = settlement.ledger.status.as_str(),
            residual = %settlement.ledger.residual,
            negotiation_status = settlement.negotiation_status.as_str(),
            "Webhook settled"
        );

        let event = NegotiationEvent::from_settlement(
            &settlement.account,
            &settlement.transaction,
            &settlement.ledger,
            settlement.negotiation_status,
        );

        // The mutation is durable at this point; a failed publish must not
        // turn into a provider retry.
        if let Err(e) = self.publisher.publish(&event).await {
            tracing::error!(
                event_id = %event.id,
                event_type = event.event_type.as_str(),
                error = %e,
                "Failed to publish escrow event after commit"
            );
        }

        Ok(WebhookOutcome::Processed(event))
    }
}
