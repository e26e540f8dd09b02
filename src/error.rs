/// Unified error types for the matching service
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which uniqueness rule a conflicting write ran into.
///
/// Callers branch on this: `DuplicateOffer` means "you already acted",
/// `AlreadyMatched` means "someone else already got this".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConflictKind {
    /// The pro already has an offer on this reference
    DuplicateOffer,
    /// Another offer on the reference was accepted first
    AlreadyMatched,
    /// The reference stopped accepting offers
    ReferenceNotOpen,
}

impl ConflictKind {
    pub fn code(&self) -> &'static str {
        match self {
            ConflictKind::DuplicateOffer => "DuplicateOffer",
            ConflictKind::AlreadyMatched => "AlreadyMatched",
            ConflictKind::ReferenceNotOpen => "ReferenceNotOpen",
        }
    }
}

/// Main error type for the service
#[derive(Error, Debug)]
pub enum MarketError {
    /// No valid principal on the request
    #[error("Authentication required: {0}")]
    Unauthorized(String),

    /// Valid principal, wrong role or ownership
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Malformed or missing required fields
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Entity absent, or hidden from this requester
    #[error("Not found: {0}")]
    NotFound(String),

    /// Uniqueness violation or a lost accept race
    #[error("Conflict: {message}")]
    Conflict { kind: ConflictKind, message: String },

    /// resolveOffer called on an offer that is no longer in `offer` status
    #[error("Offer already resolved: {0}")]
    AlreadyResolved(String),

    /// Operation not permitted in the entity's current status
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded { retry_after: std::time::Duration },

    /// Store could not be reached; safe to retry
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MarketError {
    pub fn conflict(kind: ConflictKind, message: impl Into<String>) -> Self {
        MarketError::Conflict {
            kind,
            message: message.into(),
        }
    }

    #[cfg(test)]
    pub fn conflict_kind(&self) -> Option<ConflictKind> {
        match self {
            MarketError::Conflict { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for MarketError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                tracing::warn!(error = %err, "store unreachable");
                MarketError::Unavailable(err.to_string())
            }
            sqlx::Error::Database(ref db_err) if is_lock_contention(db_err.code().as_deref()) => {
                tracing::warn!(error = %err, "store busy");
                MarketError::Unavailable(err.to_string())
            }
            sqlx::Error::RowNotFound => MarketError::NotFound("Row not found".to_string()),
            other => MarketError::Internal(format!("Database error: {}", other)),
        }
    }
}

/// SQLITE_BUSY / SQLITE_LOCKED, including their extended codes
fn is_lock_contention(code: Option<&str>) -> bool {
    code.and_then(|c| c.parse::<i32>().ok())
        .map_or(false, |c| matches!(c & 0xff, 5 | 6))
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub retryable: bool,
}

/// Convert MarketError to HTTP response
impl IntoResponse for MarketError {
    fn into_response(self) -> Response {
        let retry_after = match &self {
            MarketError::RateLimitExceeded { retry_after } => Some(retry_after.as_secs().max(1)),
            _ => None,
        };

        let (status, error_code, message, retryable) = match &self {
            MarketError::Unauthorized(_) => (
                StatusCode::UNAUTHORIZED,
                "AuthenticationRequired",
                self.to_string(),
                false,
            ),
            MarketError::Forbidden(_) => (StatusCode::FORBIDDEN, "Forbidden", self.to_string(), false),
            MarketError::InvalidInput(_) => (
                StatusCode::BAD_REQUEST,
                "InvalidRequest",
                self.to_string(),
                false,
            ),
            MarketError::NotFound(_) => (StatusCode::NOT_FOUND, "NotFound", self.to_string(), false),
            MarketError::Conflict { kind, .. } => {
                (StatusCode::CONFLICT, kind.code(), self.to_string(), false)
            }
            MarketError::AlreadyResolved(_) => (
                StatusCode::CONFLICT,
                "AlreadyResolved",
                self.to_string(),
                false,
            ),
            MarketError::InvalidState(_) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "InvalidState",
                self.to_string(),
                false,
            ),
            MarketError::RateLimitExceeded { .. } => (
                StatusCode::TOO_MANY_REQUESTS,
                "RateLimitExceeded",
                "Rate limit exceeded".to_string(),
                true,
            ),
            MarketError::Unavailable(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "StorageUnavailable",
                "Storage temporarily unavailable".to_string(),
                true,
            ),
            MarketError::Internal(_) | MarketError::Io(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "InternalServerError",
                "Internal server error".to_string(), // Don't leak details
                false,
            ),
        };

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message,
            retryable,
        });

        let mut response = (status, body).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

/// Result type alias for service operations
pub type MarketResult<T> = Result<T, MarketError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_timeout_is_retryable() {
        let err: MarketError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, MarketError::Unavailable(_)));

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_rate_limit_sets_retry_after() {
        let response = MarketError::RateLimitExceeded {
            retry_after: std::time::Duration::from_secs(3),
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "3");

        let response = MarketError::NotFound("x".into()).into_response();
        assert!(response.headers().get(header::RETRY_AFTER).is_none());
    }

    #[test]
    fn test_lock_contention_codes() {
        assert!(is_lock_contention(Some("5")));
        assert!(is_lock_contention(Some("517")));
        assert!(is_lock_contention(Some("6")));
        assert!(!is_lock_contention(Some("2067")));
        assert!(!is_lock_contention(None));
    }

    #[test]
    fn test_conflict_kinds_have_distinct_codes() {
        let codes = [
            ConflictKind::DuplicateOffer.code(),
            ConflictKind::AlreadyMatched.code(),
            ConflictKind::ReferenceNotOpen.code(),
        ];
        assert_ne!(codes[0], codes[1]);
        assert_ne!(codes[1], codes[2]);
        assert_ne!(codes[0], codes[2]);
    }

    #[test]
    fn test_status_codes() {
        let cases = vec![
            (MarketError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED),
            (MarketError::Forbidden("x".into()), StatusCode::FORBIDDEN),
            (MarketError::InvalidInput("x".into()), StatusCode::BAD_REQUEST),
            (MarketError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (
                MarketError::conflict(ConflictKind::AlreadyMatched, "x"),
                StatusCode::CONFLICT,
            ),
            (MarketError::AlreadyResolved("x".into()), StatusCode::CONFLICT),
            (
                MarketError::InvalidState("x".into()),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }
}
