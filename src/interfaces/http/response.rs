use crate::error::EscrowError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::collections::BTreeMap;

/// Acknowledgement returned to the provider on success.
#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub status: &'static str,
}

impl WebhookAck {
    pub const PROCESSED: Self = Self { status: "ok" };
    pub const IDEMPOTENT: Self = Self {
        status: "idempotent-ok",
    };
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    field_errors: Option<BTreeMap<String, Vec<String>>>,
}

impl EscrowError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Authentication(_) => StatusCode::UNAUTHORIZED,
            Self::MalformedPayload(_) | Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::AccountNotFound(_) => StatusCode::NOT_FOUND,
            Self::LedgerConflict(_) => StatusCode::CONFLICT,
            Self::Configuration(_)
            | Self::NegotiationNotFound(_)
            | Self::DuplicateTransaction { .. }
            | Self::ConcurrentModification(_)
            | Self::Publish(_)
            | Self::IoError(_)
            | Self::Serialization(_)
            | Self::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            #[cfg(feature = "storage-rocksdb")]
            Self::RocksDb(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client errors are described; server errors stay generic so storage
    /// details never reach the caller.
    fn safe_message(&self) -> String {
        if self.status_code().is_server_error() {
            "Internal server error".to_string()
        } else {
            self.to_string()
        }
    }

    fn log(&self, status: StatusCode) {
        match self {
            Self::Configuration(_) => tracing::error!(
                alert = "configuration",
                status = status.as_u16(),
                error = %self,
                "Webhook endpoint is misconfigured"
            ),
            _ if status.is_server_error() => tracing::error!(
                status = status.as_u16(),
                error = %self,
                "Webhook processing failed"
            ),
            _ => tracing::warn!(
                status = status.as_u16(),
                retryable = self.is_retryable(),
                error = %self,
                "Webhook rejected"
            ),
        }
    }
}

impl IntoResponse for EscrowError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        self.log(status);

        let field_errors = match &self {
            Self::Validation(errors) => Some(errors.fields().clone()),
            _ => None,
        };
        let body = ErrorResponse {
            error: self.safe_message(),
            field_errors,
        };

        (status, Json(body)).into_response()
    }
}
