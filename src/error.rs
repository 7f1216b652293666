use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

use crate::core::strong_types::{AssignmentId, RequestId};
use crate::models::{RequestAction, RequestStatus};

/// Marker raised by the `event_stage_artists` overlap triggers.
pub const STORE_CONFLICT_SENTINEL: &str = "scheduling_conflict";

#[derive(Debug)]
pub enum AppError {
    /// Bad interval, empty name, unsupported entity pairing.
    Validation(String),
    NotFound(String),
    /// Stage creation with no explicit venue and no event venue to inherit.
    MissingVenue(String),
    /// Booking overlaps existing assignments; carries the colliding ids.
    SchedulingConflict { conflicting: Vec<AssignmentId> },
    InvalidTransition {
        from: RequestStatus,
        action: RequestAction,
    },
    NotPending { id: RequestId, status: RequestStatus },
    Unauthenticated,
    Forbidden(String),
    DatabaseError(String),
    ConfigurationError(String),
}

impl AppError {
    /// Outcomes the caller is expected to render as normal feedback rather
    /// than as a failure ("time slot taken", "already answered").
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            AppError::SchedulingConflict { .. }
                | AppError::NotPending { .. }
                | AppError::InvalidTransition { .. }
                | AppError::Validation(_)
                | AppError::MissingVenue(_)
        )
    }

    /// True when a sqlx error came from the overlap triggers.
    pub fn is_store_conflict(err: &sqlx::Error) -> bool {
        match err {
            sqlx::Error::Database(db_err) => db_err.message().contains(STORE_CONFLICT_SENTINEL),
            _ => false,
        }
    }

    /// True when a sqlx error is a UNIQUE constraint violation.
    pub fn is_unique_violation(err: &sqlx::Error) -> bool {
        match err {
            sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
            _ => false,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Validation(msg) => write!(f, "Validation error: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::MissingVenue(msg) => write!(f, "Missing venue: {}", msg),
            AppError::SchedulingConflict { conflicting } => {
                let ids: Vec<String> = conflicting.iter().map(|id| id.to_string()).collect();
                write!(f, "Scheduling conflict with assignments [{}]", ids.join(", "))
            }
            AppError::InvalidTransition { from, action } => {
                write!(f, "Invalid transition: cannot {} a {} request", action, from)
            }
            AppError::NotPending { id, status } => {
                write!(f, "Request {} is not pending (status: {})", id, status)
            }
            AppError::Unauthenticated => write!(f, "Unauthenticated"),
            AppError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            AppError::DatabaseError(msg) => write!(f, "Database error: {}", msg),
            AppError::ConfigurationError(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            AppError::MissingVenue(_) => (StatusCode::UNPROCESSABLE_ENTITY, self.to_string()),
            AppError::SchedulingConflict { .. }
            | AppError::InvalidTransition { .. }
            | AppError::NotPending { .. } => (StatusCode::CONFLICT, self.to_string()),
            AppError::Unauthenticated => (StatusCode::UNAUTHORIZED, self.to_string()),
            AppError::Forbidden(_) => (StatusCode::FORBIDDEN, self.to_string()),
            AppError::DatabaseError(msg) => {
                tracing::error!("Database error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            AppError::ConfigurationError(msg) => {
                tracing::error!("Configuration error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let mut body = json!({
            "error": error_message,
            "status": status.as_u16()
        });
        if let AppError::SchedulingConflict { conflicting } = &self {
            body["conflicting_assignments"] = json!(conflicting);
        }

        (status, Json(body)).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::DatabaseError(err.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
