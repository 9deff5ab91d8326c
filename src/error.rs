//! Error taxonomy of the sending VASP.
//!
//! Every failure of a protocol phase ends up as exactly one [`UmaError`] kind.
//! Collaborator errors (key fetch, signatures, invoice decoding) are mapped at
//! the orchestrator boundary, so handlers only ever see this type. Over HTTP
//! an error renders as the LNURL error body with a stable code:
//!
//! ```json
//! { "status": "ERROR", "code": "INVALID_SIGNATURE", "reason": "..." }
//! ```

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum UmaError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Request not found: {0}")]
    RequestNotFound(String),
    #[error("Invalid currency: {0}")]
    InvalidCurrency(String),
    #[error("Invalid invoice: {0}")]
    InvalidInvoice(String),
    #[error("Invoice expired: {0}")]
    InvoiceExpired(String),
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),
    #[error("Failed to fetch counterparty public keys: {0}")]
    CounterpartyKeyFetch(String),
    #[error("Failed to reach lnurlp endpoint: {0}")]
    DiscoveryTransport(String),
    #[error("lnurlp request failed with status {status}")]
    DiscoveryRequestFailed { status: u16 },
    #[error("Failed to parse lnurlp response: {0}")]
    DiscoveryParse(String),
    #[error("Pay request failed: {reason}")]
    PayReqFailed {
        status: Option<u16>,
        reason: String,
    },
    #[error("Failed to parse pay response: {0}")]
    PayReqParse(String),
    #[error("Missing required UMA parameters: {0}")]
    MissingRequiredUmaParameters(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl UmaError {
    /// Stable machine-readable code sent to clients.
    pub fn code(&self) -> &'static str {
        match self {
            UmaError::InvalidInput(_) => "INVALID_INPUT",
            UmaError::Unauthorized(_) => "UNAUTHORIZED",
            UmaError::RequestNotFound(_) => "REQUEST_NOT_FOUND",
            UmaError::InvalidCurrency(_) => "INVALID_CURRENCY",
            UmaError::InvalidInvoice(_) => "INVALID_INVOICE",
            UmaError::InvoiceExpired(_) => "INVOICE_EXPIRED",
            UmaError::InvalidSignature(_) => "INVALID_SIGNATURE",
            UmaError::CounterpartyKeyFetch(_) => "COUNTERPARTY_PUBKEY_FETCH_ERROR",
            UmaError::DiscoveryTransport(_) => "LNURLP_TRANSPORT_ERROR",
            UmaError::DiscoveryRequestFailed { .. } => "LNURLP_REQUEST_FAILED",
            UmaError::DiscoveryParse(_) => "PARSE_LNURLP_RESPONSE_ERROR",
            UmaError::PayReqFailed { .. } => "PAYREQ_REQUEST_FAILED",
            UmaError::PayReqParse(_) => "PARSE_PAYREQ_RESPONSE_ERROR",
            UmaError::MissingRequiredUmaParameters(_) => "MISSING_REQUIRED_UMA_PARAMETERS",
            UmaError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn http_status(&self) -> StatusCode {
        match self {
            UmaError::InvalidInput(_)
            | UmaError::InvalidCurrency(_)
            | UmaError::InvalidInvoice(_)
            | UmaError::InvoiceExpired(_) => StatusCode::BAD_REQUEST,
            UmaError::Unauthorized(_) | UmaError::InvalidSignature(_) => StatusCode::UNAUTHORIZED,
            UmaError::RequestNotFound(_) => StatusCode::NOT_FOUND,
            UmaError::CounterpartyKeyFetch(_)
            | UmaError::DiscoveryRequestFailed { .. }
            | UmaError::DiscoveryParse(_)
            | UmaError::PayReqFailed { .. }
            | UmaError::PayReqParse(_)
            | UmaError::MissingRequiredUmaParameters(_) => StatusCode::FAILED_DEPENDENCY,
            UmaError::DiscoveryTransport(_) => StatusCode::BAD_GATEWAY,
            UmaError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    status: &'static str,
    code: &'a str,
    reason: String,
}

impl IntoResponse for UmaError {
    fn into_response(self) -> Response {
        let status = self.http_status();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "Request failed");
        } else {
            tracing::warn!(code = self.code(), error = %self, "Request rejected");
        }
        let body = ErrorBody {
            status: "ERROR",
            code: self.code(),
            reason: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_failures_are_never_success_statuses() {
        let error = UmaError::InvalidSignature("bad".into());
        assert_eq!(error.http_status(), StatusCode::UNAUTHORIZED);
        assert_eq!(error.code(), "INVALID_SIGNATURE");
    }

    #[test]
    fn upstream_failures_map_to_failed_dependency() {
        for error in [
            UmaError::DiscoveryRequestFailed { status: 412 },
            UmaError::PayReqFailed {
                status: Some(500),
                reason: "boom".into(),
            },
            UmaError::CounterpartyKeyFetch("offline".into()),
        ] {
            assert_eq!(error.http_status(), StatusCode::FAILED_DEPENDENCY);
        }
        assert_eq!(
            UmaError::DiscoveryTransport("timeout".into()).http_status(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn response_body_uses_lnurl_error_shape() {
        let response = UmaError::InvalidCurrency("EUR".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
