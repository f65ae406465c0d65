use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The error codes surfaced to RPC clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RpcErrorCode {
    /// The input failed to decode or validate.
    BadInput,
    /// The procedure requires a session and none was resolved.
    Unauthorized,
    /// The session lacks a required claim.
    Forbidden,
    /// No procedure with that name is registered.
    NotFound,
    /// A query was sent as a mutation or vice versa.
    MethodNotSupported,
    /// A parameter or body exceeded its configured limit.
    PayloadTooLarge,
    /// Anything else.
    Internal,
}

impl RpcErrorCode {
    pub fn status(self) -> StatusCode {
        match self {
            RpcErrorCode::BadInput => StatusCode::BAD_REQUEST,
            RpcErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            RpcErrorCode::Forbidden => StatusCode::FORBIDDEN,
            RpcErrorCode::NotFound => StatusCode::NOT_FOUND,
            RpcErrorCode::MethodNotSupported => StatusCode::METHOD_NOT_ALLOWED,
            RpcErrorCode::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            RpcErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// An error returned by a procedure or by the dispatcher.
///
/// The message is sent to the client verbatim, so internal errors carry a
/// generic one; the cause is logged where it is converted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{code:?}: {message}")]
pub struct RpcError {
    pub code: RpcErrorCode,
    pub message: String,
}

impl RpcError {
    pub fn new(code: RpcErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn bad_input(message: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::BadInput, message)
    }

    pub fn unauthorized() -> Self {
        Self::new(RpcErrorCode::Unauthorized, "Authentication required")
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::Forbidden, message)
    }

    pub fn not_found(procedure: &str) -> Self {
        Self::new(
            RpcErrorCode::NotFound,
            format!("No procedure found on path \"{}\"", procedure),
        )
    }

    pub fn payload_too_large(message: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::PayloadTooLarge, message)
    }

    pub fn internal() -> Self {
        Self::new(RpcErrorCode::Internal, "Internal server error")
    }
}

impl From<anyhow::Error> for RpcError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!("Procedure failed: {:#}", err);
        RpcError::internal()
    }
}

impl From<crate::error::AppError> for RpcError {
    fn from(err: crate::error::AppError) -> Self {
        tracing::error!("Procedure failed: {}", err);
        RpcError::internal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_serialize_screaming_snake_case() {
        assert_eq!(
            serde_json::to_string(&RpcErrorCode::PayloadTooLarge).unwrap(),
            r#""PAYLOAD_TOO_LARGE""#
        );
        assert_eq!(
            serde_json::to_string(&RpcErrorCode::BadInput).unwrap(),
            r#""BAD_INPUT""#
        );
    }

    #[test]
    fn internal_errors_hide_their_cause() {
        let err: RpcError = anyhow::anyhow!("connection string leaked").into();
        assert_eq!(err.code, RpcErrorCode::Internal);
        assert!(!err.message.contains("leaked"));
    }
}
