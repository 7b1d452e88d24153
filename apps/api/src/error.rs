//! # API Error Types
//!
//! Two layers: [`SettlementError`] is what the services return, [`ApiError`]
//! is what an HTTP client receives.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Error Flow in Duka API                              │
//! │                                                                         │
//! │  ValidationError ─┐                                                     │
//! │  CoreError ───────┼──► SettlementError ──► ApiError ──► HTTP response   │
//! │  DbError ─────────┤                        {code, message}              │
//! │  GatewayError ────┘                                                     │
//! │                                                                         │
//! │  SQL messages and raw gateway bodies are logged at the ApiError         │
//! │  boundary and replaced with a generic message.                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Response Body
//! ```json
//! { "code": "INSUFFICIENT_STOCK", "message": "Insufficient stock for p-1: available 2, requested 5" }
//! ```

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use duka_core::{CoreError, ValidationError};
use duka_db::DbError;
use duka_mpesa::GatewayError;

// =============================================================================
// Settlement Error
// =============================================================================

/// Failures of the settlement engine and the reconciler.
#[derive(Debug, Error)]
pub enum SettlementError {
    /// Product, transaction, or callback correlation not found.
    #[error("{0}")]
    NotFound(String),

    #[error("Insufficient stock for {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: String,
        available: i64,
        requested: i64,
    },

    #[error("{0}")]
    InvalidInput(String),

    #[error("Payment gateway configuration for organization {organization_id} is missing {field}")]
    ConfigurationMissing {
        organization_id: String,
        field: String,
    },

    #[error("Gateway error: {0}")]
    GatewayError(#[from] GatewayError),

    #[error("Persistence error: {0}")]
    PersistenceError(#[from] DbError),

    /// The transaction was already COMPLETED or FAILED; nothing changed.
    #[error("Transaction {0} already finalized")]
    DuplicateCallback(String),
}

impl From<ValidationError> for SettlementError {
    fn from(err: ValidationError) -> Self {
        SettlementError::InvalidInput(err.to_string())
    }
}

impl From<CoreError> for SettlementError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InsufficientStock {
                product_id,
                available,
                requested,
            } => SettlementError::InsufficientStock {
                product_id,
                available,
                requested,
            },
            CoreError::ConfigurationMissing {
                organization_id,
                field,
            } => SettlementError::ConfigurationMissing {
                organization_id,
                field,
            },
            CoreError::Validation(e) => e.into(),
        }
    }
}

// =============================================================================
// API Error
// =============================================================================

/// Error body returned to HTTP clients.
#[derive(Debug, Clone, Serialize)]
pub struct ApiError {
    /// Machine-readable error code
    pub code: ErrorCode,

    /// Human-readable message
    pub message: String,
}

/// Stable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Resource not found (404)
    NotFound,

    /// Input validation failed (400)
    ValidationError,

    /// Not enough stock for the requested quantity (400)
    InsufficientStock,

    /// Organization has no usable gateway credentials (400)
    ConfigurationMissing,

    /// The gateway refused or could not be reached (402)
    PaymentFailed,

    /// Database operation failed (500)
    DatabaseError,

    /// Internal server error (500)
    Internal,
}

impl ErrorCode {
    pub fn status(&self) -> StatusCode {
        match self {
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::ValidationError
            | ErrorCode::InsufficientStock
            | ErrorCode::ConfigurationMissing => StatusCode::BAD_REQUEST,
            ErrorCode::PaymentFailed => StatusCode::PAYMENT_REQUIRED,
            ErrorCode::DatabaseError | ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl ApiError {
    /// Creates a new API error.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        ApiError {
            code,
            message: message.into(),
        }
    }

    /// Creates a not found error.
    pub fn not_found(resource: &str, id: &str) -> Self {
        ApiError::new(ErrorCode::NotFound, format!("{} not found: {}", resource, id))
    }

    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::ValidationError, message)
    }
}

/// Converts database errors to API errors.
impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => ApiError::not_found(&entity, &id),
            DbError::UniqueViolation { field, value } => ApiError::new(
                ErrorCode::ValidationError,
                format!("{} '{}' already exists", field, value),
            ),
            DbError::PoolExhausted => {
                tracing::error!("Database pool exhausted");
                ApiError::new(ErrorCode::DatabaseError, "Database busy, retry the request")
            }
            other => {
                // Log the actual error but return a generic message
                tracing::error!(error = %other, "Database operation failed");
                ApiError::new(ErrorCode::DatabaseError, "Database operation failed")
            }
        }
    }
}

/// Converts settlement errors to API errors.
impl From<SettlementError> for ApiError {
    fn from(err: SettlementError) -> Self {
        match err {
            SettlementError::NotFound(message) => ApiError::new(ErrorCode::NotFound, message),
            e @ SettlementError::InsufficientStock { .. } => {
                ApiError::new(ErrorCode::InsufficientStock, e.to_string())
            }
            SettlementError::InvalidInput(message) => ApiError::validation(message),
            e @ SettlementError::ConfigurationMissing { .. } => {
                ApiError::new(ErrorCode::ConfigurationMissing, e.to_string())
            }
            SettlementError::GatewayError(e) => {
                tracing::warn!(error = %e, "Payment gateway call failed");
                let message = match e {
                    GatewayError::HttpError(_) => "Payment gateway unreachable",
                    GatewayError::Rejected { .. } => "Payment request rejected by gateway",
                    _ => "Payment request failed",
                };
                ApiError::new(ErrorCode::PaymentFailed, message)
            }
            SettlementError::PersistenceError(e) => e.into(),
            SettlementError::DuplicateCallback(id) => ApiError::validation(format!(
                "Transaction {} already finalized",
                id
            )),
        }
    }
}

/// Malformed or mistyped JSON bodies are validation errors.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::validation(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.code.status(), Json(self)).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}
