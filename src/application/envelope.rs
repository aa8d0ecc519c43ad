//! Turns authenticated payload bytes into a [`ValidatedWebhook`].
//!
//! Validation collects every field problem before failing so the provider
//! gets one complete report.

use crate::domain::money::Amount;
use crate::domain::webhook::{Metadata, ValidatedWebhook, WebhookEvent, WebhookEventKind};
use crate::error::{EscrowError, FieldErrors, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::{Map, Number, Value};
use std::str::FromStr;

/// Parses the exact bytes that were verified and validates the envelope.
pub fn parse_envelope(payload: &[u8]) -> Result<ValidatedWebhook> {
    let value: Value = serde_json::from_slice(payload).map_err(|e| {
        tracing::debug!(error = %e, "Webhook payload is not valid JSON");
        EscrowError::MalformedPayload("body is not valid JSON".to_string())
    })?;
    validate_envelope(&value, Utc::now())
}

/// Validates a parsed envelope. `now` stands in for a missing `occurredAt`.
pub fn validate_envelope(value: &Value, now: DateTime<Utc>) -> Result<ValidatedWebhook> {
    let Some(object) = value.as_object() else {
        return Err(EscrowError::invalid_field("$", "must be a JSON object"));
    };

    let mut errors = FieldErrors::new();

    let kind = match object.get("event") {
        Some(Value::String(raw)) => match WebhookEventKind::from_str(raw) {
            Ok(kind) => Some(kind),
            Err(message) => {
                errors.add("event", message);
                None
            }
        },
        Some(_) => {
            errors.add("event", "must be a string");
            None
        }
        None => {
            errors.add("event", "is required");
            None
        }
    };

    let provider_reference = required_string(object, "providerReference", &mut errors);
    let external_transaction_id = required_string(object, "externalTransactionId", &mut errors);

    let amount = match object.get("amount") {
        None | Some(Value::Null) => None,
        Some(Value::Number(number)) => match decimal_from_number(number) {
            Some(amount) if amount.is_sign_negative() && !amount.is_zero() => {
                errors.add("amount", "must not be negative");
                None
            }
            Some(amount) => Some(amount),
            None => {
                errors.add("amount", "is not a representable decimal");
                None
            }
        },
        Some(_) => {
            errors.add("amount", "must be a number");
            None
        }
    };

    let currency = match object.get("currency") {
        None | Some(Value::Null) => None,
        Some(Value::String(currency)) if !currency.trim().is_empty() => {
            Some(currency.trim().to_ascii_uppercase())
        }
        Some(_) => {
            errors.add("currency", "must be a non-empty string");
            None
        }
    };

    let metadata = match object.get("metadata") {
        None | Some(Value::Null) => Metadata::new(),
        Some(Value::Object(map)) => map.clone(),
        Some(_) => {
            errors.add("metadata", "must be an object");
            Metadata::new()
        }
    };

    let event = kind.and_then(|kind| build_event(kind, amount, &mut errors));

    errors.into_result()?;

    // into_result() only succeeds when every branch above produced a value
    match (provider_reference, external_transaction_id, event) {
        (Some(provider_reference), Some(external_transaction_id), Some(event)) => {
            Ok(ValidatedWebhook {
                provider_reference,
                external_transaction_id,
                currency,
                occurred_at: occurred_at(object, now),
                metadata,
                event,
            })
        }
        _ => Err(EscrowError::invalid_field("$", "incomplete envelope")),
    }
}

fn build_event(
    kind: WebhookEventKind,
    amount: Option<Decimal>,
    errors: &mut FieldErrors,
) -> Option<WebhookEvent> {
    if kind.is_monetary() {
        let Some(value) = amount else {
            if !errors.contains("amount") {
                errors.add("amount", format!("is required for {}", kind));
            }
            return None;
        };
        let amount = match Amount::new(value) {
            Ok(amount) => amount,
            Err(_) => {
                errors.add("amount", "must be greater than zero");
                return None;
            }
        };
        return Some(match kind {
            WebhookEventKind::FundingConfirmed => WebhookEvent::FundingConfirmed { amount },
            WebhookEventKind::ReleaseSettled => WebhookEvent::ReleaseSettled { amount },
            _ => WebhookEvent::RefundProcessed { amount },
        });
    }

    Some(match kind {
        WebhookEventKind::DisputeOpened => WebhookEvent::DisputeOpened {
            disputed_amount: amount,
        },
        WebhookEventKind::DisputeResolved => WebhookEvent::DisputeResolved { adjustment: amount },
        _ => WebhookEvent::StatementReady,
    })
}

fn required_string(
    object: &Map<String, Value>,
    field: &str,
    errors: &mut FieldErrors,
) -> Option<String> {
    match object.get(field) {
        Some(Value::String(value)) if !value.trim().is_empty() => Some(value.trim().to_string()),
        Some(Value::String(_)) => {
            errors.add(field, "must not be empty");
            None
        }
        Some(_) => {
            errors.add(field, "must be a string");
            None
        }
        None => {
            errors.add(field, "is required");
            None
        }
    }
}

fn decimal_from_number(number: &Number) -> Option<Decimal> {
    let text = number.to_string();
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

/// Provider clocks drift and some events omit the timestamp; neither
/// should block settlement.
fn occurred_at(object: &Map<String, Value>, now: DateTime<Utc>) -> DateTime<Utc> {
    object
        .get("occurredAt")
        .and_then(Value::as_str)
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|at| at.with_timezone(&Utc))
        .unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap()
    }

    fn field_errors(result: Result<ValidatedWebhook>) -> FieldErrors {
        match result {
            Err(EscrowError::Validation(errors)) => errors,
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_valid_funding_envelope() {
        let value = json!({
            "event": "funding_confirmed",
            "providerReference": "esc_1",
            "externalTransactionId": "tx_1",
            "amount": 600.50,
            "currency": "usd",
            "occurredAt": "2026-03-01T10:00:00Z",
            "metadata": {"buyer": "b_1"}
        });

        let webhook = validate_envelope(&value, now()).unwrap();
        assert_eq!(webhook.provider_reference, "esc_1");
        assert_eq!(webhook.currency.as_deref(), Some("USD"));
        assert_eq!(
            webhook.event,
            WebhookEvent::FundingConfirmed {
                amount: Amount::new(dec!(600.5)).unwrap()
            }
        );
        assert_eq!(
            webhook.occurred_at,
            Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap()
        );
        assert_eq!(webhook.metadata["buyer"], "b_1");
    }

    #[test]
    fn test_occurred_at_defaults_to_now() {
        for occurred in [json!(null), json!("yesterday"), json!(42)] {
            let value = json!({
                "event": "statement_ready",
                "providerReference": "esc_1",
                "externalTransactionId": "tx_1",
                "occurredAt": occurred
            });
            assert_eq!(validate_envelope(&value, now()).unwrap().occurred_at, now());
        }
    }

    #[test]
    fn test_missing_fields_are_all_reported() {
        let errors = field_errors(validate_envelope(&json!({}), now()));
        assert!(errors.contains("event"));
        assert!(errors.contains("providerReference"));
        assert!(errors.contains("externalTransactionId"));
    }

    #[test]
    fn test_unknown_event_kind() {
        let value = json!({
            "event": "payout_sent",
            "providerReference": "esc_1",
            "externalTransactionId": "tx_1"
        });
        let errors = field_errors(validate_envelope(&value, now()));
        assert_eq!(errors.fields()["event"], vec!["unknown event kind 'payout_sent'"]);
    }

    #[test]
    fn test_monetary_events_require_positive_amount() {
        let missing = json!({
            "event": "release_settled",
            "providerReference": "esc_1",
            "externalTransactionId": "tx_1"
        });
        assert!(field_errors(validate_envelope(&missing, now())).contains("amount"));

        let zero = json!({
            "event": "refund_processed",
            "providerReference": "esc_1",
            "externalTransactionId": "tx_1",
            "amount": 0
        });
        assert!(field_errors(validate_envelope(&zero, now())).contains("amount"));

        let negative = json!({
            "event": "dispute_opened",
            "providerReference": "esc_1",
            "externalTransactionId": "tx_1",
            "amount": -5
        });
        assert!(field_errors(validate_envelope(&negative, now())).contains("amount"));
    }

    #[test]
    fn test_wrong_types_are_reported() {
        let value = json!({
            "event": 7,
            "providerReference": "",
            "externalTransactionId": ["tx"],
            "amount": "100",
            "currency": 3,
            "metadata": "note"
        });
        let errors = field_errors(validate_envelope(&value, now()));
        for field in [
            "event",
            "providerReference",
            "externalTransactionId",
            "amount",
            "currency",
            "metadata",
        ] {
            assert!(errors.contains(field), "{} should be reported", field);
        }
    }

    #[test]
    fn test_non_monetary_events_accept_missing_amount() {
        let value = json!({
            "event": "dispute_resolved",
            "providerReference": "esc_1",
            "externalTransactionId": "tx_1"
        });
        let webhook = validate_envelope(&value, now()).unwrap();
        assert_eq!(webhook.event, WebhookEvent::DisputeResolved { adjustment: None });
    }

    #[test]
    fn test_parse_rejects_invalid_json_and_non_objects() {
        assert!(matches!(
            parse_envelope(b"{not json"),
            Err(EscrowError::MalformedPayload(_))
        ));
        assert!(matches!(
            parse_envelope(b"[1, 2]"),
            Err(EscrowError::Validation(_))
        ));
    }
}
