/// Gateway error model
///
/// Services raise [`AppError`]s that carry a gRPC-style [`RpcStatus`]. The HTTP boundary
/// translates that status through a fixed lookup table, so every failure path renders the
/// same `{statusCode, error, message}` body.

use crate::workflow::plan::PlanError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;

/// Result alias used by HTTP handlers and services
pub type AppResult<T> = std::result::Result<T, AppError>;

/// Canonical gRPC status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum RpcStatus {
    Ok = 0,
    Cancelled = 1,
    Unknown = 2,
    InvalidArgument = 3,
    DeadlineExceeded = 4,
    NotFound = 5,
    AlreadyExists = 6,
    PermissionDenied = 7,
    ResourceExhausted = 8,
    FailedPrecondition = 9,
    Aborted = 10,
    OutOfRange = 11,
    Unimplemented = 12,
    Internal = 13,
    Unavailable = 14,
    DataLoss = 15,
    Unauthenticated = 16,
}

impl RpcStatus {
    /// Every status in code order
    pub const ALL: [RpcStatus; 17] = [
        RpcStatus::Ok,
        RpcStatus::Cancelled,
        RpcStatus::Unknown,
        RpcStatus::InvalidArgument,
        RpcStatus::DeadlineExceeded,
        RpcStatus::NotFound,
        RpcStatus::AlreadyExists,
        RpcStatus::PermissionDenied,
        RpcStatus::ResourceExhausted,
        RpcStatus::FailedPrecondition,
        RpcStatus::Aborted,
        RpcStatus::OutOfRange,
        RpcStatus::Unimplemented,
        RpcStatus::Internal,
        RpcStatus::Unavailable,
        RpcStatus::DataLoss,
        RpcStatus::Unauthenticated,
    ];

    /// Look up a status by its numeric wire code
    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.iter().copied().find(|status| *status as i32 == code)
    }

    pub fn code(self) -> i32 {
        self as i32
    }

    /// Upper snake case name as used on the wire (e.g. "NOT_FOUND")
    pub fn name(self) -> &'static str {
        match self {
            RpcStatus::Ok => "OK",
            RpcStatus::Cancelled => "CANCELLED",
            RpcStatus::Unknown => "UNKNOWN",
            RpcStatus::InvalidArgument => "INVALID_ARGUMENT",
            RpcStatus::DeadlineExceeded => "DEADLINE_EXCEEDED",
            RpcStatus::NotFound => "NOT_FOUND",
            RpcStatus::AlreadyExists => "ALREADY_EXISTS",
            RpcStatus::PermissionDenied => "PERMISSION_DENIED",
            RpcStatus::ResourceExhausted => "RESOURCE_EXHAUSTED",
            RpcStatus::FailedPrecondition => "FAILED_PRECONDITION",
            RpcStatus::Aborted => "ABORTED",
            RpcStatus::OutOfRange => "OUT_OF_RANGE",
            RpcStatus::Unimplemented => "UNIMPLEMENTED",
            RpcStatus::Internal => "INTERNAL",
            RpcStatus::Unavailable => "UNAVAILABLE",
            RpcStatus::DataLoss => "DATA_LOSS",
            RpcStatus::Unauthenticated => "UNAUTHENTICATED",
        }
    }

    /// HTTP status code for this gRPC status
    pub fn http_code(self) -> u16 {
        match self {
            RpcStatus::Ok => 200,
            RpcStatus::Cancelled => 499,
            RpcStatus::Unknown => 500,
            RpcStatus::InvalidArgument => 400,
            RpcStatus::DeadlineExceeded => 504,
            RpcStatus::NotFound => 404,
            RpcStatus::AlreadyExists => 409,
            RpcStatus::PermissionDenied => 403,
            RpcStatus::ResourceExhausted => 429,
            RpcStatus::FailedPrecondition => 400,
            RpcStatus::Aborted => 409,
            RpcStatus::OutOfRange => 400,
            RpcStatus::Unimplemented => 501,
            RpcStatus::Internal => 500,
            RpcStatus::Unavailable => 503,
            RpcStatus::DataLoss => 500,
            RpcStatus::Unauthenticated => 401,
        }
    }

    pub fn http_status(self) -> StatusCode {
        // 499 (client closed request) has no named constant but is in the valid range
        StatusCode::from_u16(self.http_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

/// Errors surfaced by the HTTP gateway
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    AlreadyExists(String),

    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0}")]
    Unauthenticated(String),

    #[error("{0}")]
    PermissionDenied(String),

    #[error("{0}")]
    FailedPrecondition(String),

    #[error("insufficient credits: required {required}, available {available}")]
    InsufficientCredits { required: i64, available: i64 },

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error("database error: {0}")]
    Database(sqlx::Error),

    #[error(transparent)]
    Internal(anyhow::Error),
}

impl AppError {
    /// Replace the generic message of a uniqueness conflict; other errors pass through
    pub fn on_conflict(self, message: impl Into<String>) -> Self {
        match self {
            AppError::AlreadyExists(_) => AppError::AlreadyExists(message.into()),
            other => other,
        }
    }
}

// A UNIQUE constraint can still fire after a handler's existence check when two
// requests race; that is a conflict, not a server fault.
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        if is_unique_violation(&err) {
            return AppError::AlreadyExists("Resource already exists".to_string());
        }
        AppError::Database(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast_ref::<sqlx::Error>() {
            Some(db) if is_unique_violation(db) => AppError::AlreadyExists("Resource already exists".to_string()),
            _ => AppError::Internal(err),
        }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

impl AppError {
    pub fn status(&self) -> RpcStatus {
        match self {
            AppError::NotFound(_) => RpcStatus::NotFound,
            AppError::AlreadyExists(_) => RpcStatus::AlreadyExists,
            AppError::InvalidArgument(_) => RpcStatus::InvalidArgument,
            AppError::Unauthenticated(_) => RpcStatus::Unauthenticated,
            AppError::PermissionDenied(_) => RpcStatus::PermissionDenied,
            AppError::FailedPrecondition(_) => RpcStatus::FailedPrecondition,
            AppError::InsufficientCredits { .. } => RpcStatus::ResourceExhausted,
            AppError::Plan(_) => RpcStatus::InvalidArgument,
            AppError::Database(_) => RpcStatus::Internal,
            AppError::Internal(_) => RpcStatus::Internal,
        }
    }

    /// Message safe to return to clients
    fn public_message(&self) -> String {
        match self {
            AppError::Database(_) | AppError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status == RpcStatus::Internal {
            tracing::error!("❌ Request failed: {:#}", self);
        } else {
            tracing::debug!("Request rejected ({}): {}", status.name(), self);
        }

        let mut body = json!({
            "statusCode": status.http_code(),
            "error": status.name(),
            "message": self.public_message(),
        });
        if let AppError::Plan(PlanError::InvalidInputs(invalid)) = &self {
            body["invalidInputs"] = json!(invalid);
        }

        (status.http_status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapping_is_total_over_all_codes() {
        for code in 0..17 {
            let status = RpcStatus::from_code(code).expect("every code 0..=16 is defined");
            assert_eq!(status.code(), code);
            assert!(
                (200..600).contains(&status.http_code()),
                "{} maps outside the HTTP range",
                status.name()
            );
        }
        assert_eq!(RpcStatus::from_code(17), None);
        assert_eq!(RpcStatus::from_code(-1), None);
    }

    #[test]
    fn well_known_translations() {
        assert_eq!(RpcStatus::Ok.http_status(), StatusCode::OK);
        assert_eq!(RpcStatus::NotFound.http_status(), StatusCode::NOT_FOUND);
        assert_eq!(RpcStatus::AlreadyExists.http_status(), StatusCode::CONFLICT);
        assert_eq!(RpcStatus::Unauthenticated.http_status(), StatusCode::UNAUTHORIZED);
        assert_eq!(RpcStatus::ResourceExhausted.http_status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(RpcStatus::Unavailable.http_status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(RpcStatus::Cancelled.http_status().as_u16(), 499);
    }

    #[test]
    fn app_errors_pick_their_status() {
        let cases = vec![
            (AppError::NotFound("x".into()), RpcStatus::NotFound),
            (AppError::AlreadyExists("x".into()), RpcStatus::AlreadyExists),
            (AppError::Unauthenticated("x".into()), RpcStatus::Unauthenticated),
            (AppError::FailedPrecondition("x".into()), RpcStatus::FailedPrecondition),
            (
                AppError::InsufficientCredits { required: 5, available: 1 },
                RpcStatus::ResourceExhausted,
            ),
            (AppError::Plan(PlanError::NoEntryPoint), RpcStatus::InvalidArgument),
            (AppError::Internal(anyhow::anyhow!("boom")), RpcStatus::Internal),
        ];

        for (error, expected) in cases {
            assert_eq!(error.status(), expected, "wrong status for {error}");
        }
    }

    #[tokio::test]
    async fn unique_violations_become_conflicts() {
        let users = crate::users::UserStorage::new(crate::database::connect_in_memory().await.unwrap());
        users.create_user("ada@example.com", "Ada", "hash").await.unwrap();

        // a second insert that slipped past the existence check
        let raced = users.create_user("ada@example.com", "Ada", "hash").await.unwrap_err();
        let error = AppError::from(raced).on_conflict("User ada@example.com already exists");
        assert_eq!(error.status(), RpcStatus::AlreadyExists);
        assert_eq!(error.public_message(), "User ada@example.com already exists");
        assert_eq!(error.into_response().status(), StatusCode::CONFLICT);

        let other = AppError::from(anyhow::anyhow!("disk on fire")).on_conflict("ignored");
        assert_eq!(other.status(), RpcStatus::Internal);
    }

    #[test]
    fn internal_errors_are_masked() {
        let response = AppError::Internal(anyhow::anyhow!("secret detail")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            AppError::Internal(anyhow::anyhow!("secret detail")).public_message(),
            "Internal server error"
        );
    }
}
