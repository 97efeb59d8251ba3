//! Error types for the transaction composer

use axum::http::StatusCode;
use ethers::providers::{JsonRpcError, ProviderError, RpcError};
use thiserror::Error;

/// Fallback shown when an RPC rejection carries no usable detail
pub const GENERIC_RPC_FAILURE: &str = "request was rejected by the remote node";

/// Main error type for the composer
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ComposerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Broadcast failed: {0}")]
    Broadcast(String),

    #[error("Chain connection error for network {network}: {message}")]
    ChainConnection { network: String, message: String },

    #[error("Network {network} reports chain id {actual}, expected {expected}")]
    ChainIdMismatch {
        network: String,
        expected: u64,
        actual: u64,
    },

    #[error("Network {0} not found")]
    NetworkNotFound(String),

    #[error("Session {0} not found")]
    SessionNotFound(String),

    #[error("Session {0} already has a submission in flight")]
    SessionBusy(String),

    #[error("{0} was interrupted before the node answered")]
    Cancelled(String),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ComposerError {
    /// Build a validation error for a named form field
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        ComposerError::Validation {
            field,
            reason: reason.into(),
        }
    }

    /// Errors caused by the caller's input or call order rather than infrastructure
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            ComposerError::Validation { .. }
                | ComposerError::InvalidStateTransition { .. }
                | ComposerError::SessionBusy(_)
                | ComposerError::SessionNotFound(_)
                | ComposerError::NetworkNotFound(_)
        )
    }

    /// Offending form field, if any
    pub fn field(&self) -> Option<&'static str> {
        match self {
            ComposerError::Validation { field, .. } => Some(*field),
            _ => None,
        }
    }

    /// Message surfaced to the person filling in the form.
    ///
    /// RPC failures show the remote detail verbatim; everything else uses the
    /// `Display` rendering.
    pub fn user_message(&self) -> String {
        match self {
            ComposerError::Signing(detail) | ComposerError::Broadcast(detail) => detail.clone(),
            other => other.to_string(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ComposerError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ComposerError::Signing(_) | ComposerError::Broadcast(_) => StatusCode::BAD_GATEWAY,
            ComposerError::ChainConnection { .. } | ComposerError::ChainIdMismatch { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ComposerError::NetworkNotFound(_) | ComposerError::SessionNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            ComposerError::SessionBusy(_) | ComposerError::InvalidStateTransition { .. } => {
                StatusCode::CONFLICT
            }
            ComposerError::Config(_) | ComposerError::Cancelled(_) | ComposerError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Extract the most specific human-readable detail from a provider error.
///
/// Wallets put the useful text in `error.data.message`; plain nodes only fill
/// `error.message`. Transport failures fall back to the error's own text.
pub fn rpc_error_detail(err: &ProviderError) -> String {
    match err.as_error_response() {
        Some(response) => json_rpc_error_detail(response),
        None => non_empty_or_generic(err.to_string()),
    }
}

pub(crate) fn json_rpc_error_detail(response: &JsonRpcError) -> String {
    let data_message = response
        .data
        .as_ref()
        .and_then(|data| data.get("message"))
        .and_then(|message| message.as_str())
        .filter(|message| !message.trim().is_empty());

    match data_message {
        Some(message) => message.to_string(),
        None => non_empty_or_generic(response.message.clone()),
    }
}

fn non_empty_or_generic(message: String) -> String {
    if message.trim().is_empty() {
        GENERIC_RPC_FAILURE.to_string()
    } else {
        message
    }
}

/// Result type for composer operations
pub type ComposerResult<T> = Result<T, ComposerError>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rpc_error(message: &str, data: Option<serde_json::Value>) -> JsonRpcError {
        JsonRpcError {
            code: -32000,
            message: message.to_string(),
            data,
        }
    }

    #[test]
    fn test_detail_prefers_data_message() {
        let err = rpc_error(
            "execution reverted",
            Some(json!({ "message": "insufficient funds" })),
        );
        assert_eq!(json_rpc_error_detail(&err), "insufficient funds");
    }

    #[test]
    fn test_detail_falls_back_to_message_then_generic() {
        let err = rpc_error("nonce too low", Some(json!("0xdeadbeef")));
        assert_eq!(json_rpc_error_detail(&err), "nonce too low");

        let err = rpc_error("  ", None);
        assert_eq!(json_rpc_error_detail(&err), GENERIC_RPC_FAILURE);
    }

    #[test]
    fn test_user_message_and_status() {
        let err = ComposerError::Signing("insufficient funds".to_string());
        assert_eq!(err.user_message(), "insufficient funds");
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
        assert!(!err.is_user_error());

        let err = ComposerError::validation("gasLimit", "is required");
        assert_eq!(err.to_string(), "Invalid gasLimit: is required");
        assert_eq!(err.field(), Some("gasLimit"));
        assert!(err.is_user_error());
    }
}
