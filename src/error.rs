use crate::orchestration::GrantError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Internal server error: {0}")]
    Internal(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    /// Well-formed request that cannot be applied to current state.
    #[error("Unprocessable: {message}")]
    Unprocessable { kind: &'static str, message: String },
    /// Transient failure; the same request may be retried.
    #[error("Unavailable: {message}")]
    Unavailable { kind: &'static str, message: String },
}

impl AppError {
    fn kind(&self) -> &'static str {
        match self {
            AppError::Config(_) => "config",
            AppError::Internal(_) => "internal",
            AppError::NotFound(_) => "not_found",
            AppError::BadRequest(_) => "invalid_input",
            AppError::Unprocessable { kind, .. } | AppError::Unavailable { kind, .. } => *kind,
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Unavailable {
            kind: "storage",
            message: err.to_string(),
        }
    }
}

impl From<crate::pricing::OracleError> for AppError {
    fn from(err: crate::pricing::OracleError) -> Self {
        AppError::Unavailable {
            kind: "price_unavailable",
            message: err.to_string(),
        }
    }
}

impl From<GrantError> for AppError {
    fn from(err: GrantError) -> Self {
        let message = err.to_string();
        match err {
            GrantError::InvalidInput(_) => AppError::BadRequest(message),
            GrantError::InstrumentInactiveOrUnknown(_) => AppError::Unprocessable {
                kind: "instrument_inactive_or_unknown",
                message,
            },
            GrantError::InsufficientHoldings { .. } => AppError::Unprocessable {
                kind: "insufficient_holdings",
                message,
            },
            GrantError::PriceUnavailable(_) => AppError::Unavailable {
                kind: "price_unavailable",
                message,
            },
            GrantError::HoldingContention { .. } => AppError::Unavailable {
                kind: "holding_contention",
                message,
            },
            GrantError::Storage(_) => AppError::Unavailable {
                kind: "storage",
                message,
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let (status, error_message, retryable) = match self {
            AppError::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg, false),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg, false),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, false),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, false),
            AppError::Unprocessable { message, .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, message, false)
            }
            AppError::Unavailable { message, .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, message, true)
            }
        };

        let body = Json(json!({
            "error": error_message,
            "kind": kind,
            "retryable": retryable,
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Decimal, Symbol, UserId, ValidationError};

    #[test]
    fn test_grant_error_status_mapping() {
        let cases = [
            (
                GrantError::InvalidInput(ValidationError::EmptyUser),
                StatusCode::BAD_REQUEST,
            ),
            (
                GrantError::InstrumentInactiveOrUnknown(Symbol::new("X".to_string())),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                GrantError::PriceUnavailable(Symbol::new("X".to_string())),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                GrantError::InvalidInput(ValidationError::QuantityTooLarge(Decimal::from(
                    2_000_000_000u32,
                ))),
                StatusCode::BAD_REQUEST,
            ),
            (
                GrantError::HoldingContention {
                    user: UserId::new("u".to_string()),
                    symbol: Symbol::new("X".to_string()),
                },
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                GrantError::Storage(sqlx::Error::PoolTimedOut),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];
        for (err, status) in cases {
            let retryable = err.is_retryable();
            let resp = AppError::from(err).into_response();
            assert_eq!(resp.status(), status);
            assert_eq!(retryable, status == StatusCode::SERVICE_UNAVAILABLE);
        }
    }
}
