use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Closed set of wire-level error codes.
///
/// Every code maps to exactly one default message and one canonical HTTP
/// status. The set is closed on purpose: callers that cannot match a raw
/// string against it must infer a code by other means (message heuristics,
/// HTTP status), never invent a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationError,
    DatabaseError,
    ConfigurationError,
    RateLimit,
    Unauthenticated,
    ConversationForbidden,
    ConversationNotFound,
    InternalError,
}

impl ErrorCode {
    pub const ALL: [ErrorCode; 8] = [
        ErrorCode::ValidationError,
        ErrorCode::DatabaseError,
        ErrorCode::ConfigurationError,
        ErrorCode::RateLimit,
        ErrorCode::Unauthenticated,
        ErrorCode::ConversationForbidden,
        ErrorCode::ConversationNotFound,
        ErrorCode::InternalError,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::DatabaseError => "DATABASE_ERROR",
            ErrorCode::ConfigurationError => "CONFIGURATION_ERROR",
            ErrorCode::RateLimit => "RATE_LIMIT",
            ErrorCode::Unauthenticated => "UNAUTHENTICATED",
            ErrorCode::ConversationForbidden => "CONVERSATION_FORBIDDEN",
            ErrorCode::ConversationNotFound => "CONVERSATION_NOT_FOUND",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Match a raw string against the closed set. Trims surrounding
    /// whitespace; matching is case-sensitive. Returns `None` for anything
    /// outside the set.
    pub fn parse(raw: &str) -> Option<ErrorCode> {
        match raw.trim() {
            "VALIDATION_ERROR" => Some(ErrorCode::ValidationError),
            "DATABASE_ERROR" => Some(ErrorCode::DatabaseError),
            "CONFIGURATION_ERROR" => Some(ErrorCode::ConfigurationError),
            "RATE_LIMIT" => Some(ErrorCode::RateLimit),
            "UNAUTHENTICATED" => Some(ErrorCode::Unauthenticated),
            "CONVERSATION_FORBIDDEN" => Some(ErrorCode::ConversationForbidden),
            "CONVERSATION_NOT_FOUND" => Some(ErrorCode::ConversationNotFound),
            "INTERNAL_ERROR" => Some(ErrorCode::InternalError),
            _ => None,
        }
    }

    /// Canonical HTTP status for this code.
    pub fn status(self) -> u16 {
        match self {
            ErrorCode::ValidationError
            | ErrorCode::DatabaseError
            | ErrorCode::ConfigurationError => 400,
            ErrorCode::RateLimit => 429,
            ErrorCode::Unauthenticated => 401,
            ErrorCode::ConversationForbidden => 403,
            ErrorCode::ConversationNotFound => 404,
            ErrorCode::InternalError => 500,
        }
    }

    /// Default human-readable message, used when a caller supplies none.
    pub fn default_message(self) -> &'static str {
        match self {
            ErrorCode::ValidationError => "Invalid request",
            ErrorCode::DatabaseError => "Database error",
            ErrorCode::ConfigurationError => "Configuration error",
            ErrorCode::RateLimit => "Too many requests. Please try again later.",
            ErrorCode::Unauthenticated => "Authentication required",
            ErrorCode::ConversationForbidden => "You do not have access to this conversation",
            ErrorCode::ConversationNotFound => "Conversation not found",
            ErrorCode::InternalError => "Internal server error",
        }
    }
}

/// Typed error thrown by the query orchestration boundary.
///
/// Collaborator failures are classified into this taxonomy exactly once, at
/// the orchestrator; downstream components (envelope codec, client decoder)
/// trust an already-classified error and never re-classify it. Internal/leaf
/// functions use `anyhow::Result` — the `Internal` variant bridges via `?`.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("{message}")]
    Validation { message: String, details: Vec<String> },

    #[error("{message}")]
    Configuration { message: String },

    #[error("{message}")]
    Database { message: String },

    #[error("Rate limit exceeded")]
    RateLimit { retry_after: Option<u64> },

    #[error("Authentication required")]
    Unauthenticated,

    #[error("You do not have access to this conversation")]
    ConversationForbidden,

    #[error("Conversation not found")]
    ConversationNotFound,

    /// A collaborator's own dependency was unreachable or malformed. Not the
    /// caller's fault; carried as HTTP 502 on the wire.
    #[error("{message}")]
    ExternalService { message: String },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Convenience alias for results at the orchestration boundary.
pub type QueryResult<T> = std::result::Result<T, QueryError>;

impl QueryError {
    pub fn validation(message: impl Into<String>) -> Self {
        QueryError::Validation {
            message: message.into(),
            details: Vec::new(),
        }
    }

    pub fn validation_with_details(message: impl Into<String>, details: Vec<String>) -> Self {
        QueryError::Validation {
            message: message.into(),
            details,
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        QueryError::Configuration {
            message: message.into(),
        }
    }

    /// Wire-level code for this error. `ExternalService` and `Internal` both
    /// map to `INTERNAL_ERROR`: the closed code set has no 502 entry, so the
    /// distinction travels in the status instead.
    pub fn code(&self) -> ErrorCode {
        match self {
            QueryError::Validation { .. } => ErrorCode::ValidationError,
            QueryError::Configuration { .. } => ErrorCode::ConfigurationError,
            QueryError::Database { .. } => ErrorCode::DatabaseError,
            QueryError::RateLimit { .. } => ErrorCode::RateLimit,
            QueryError::Unauthenticated => ErrorCode::Unauthenticated,
            QueryError::ConversationForbidden => ErrorCode::ConversationForbidden,
            QueryError::ConversationNotFound => ErrorCode::ConversationNotFound,
            QueryError::ExternalService { .. } | QueryError::Internal(_) => {
                ErrorCode::InternalError
            }
        }
    }

    /// HTTP status for this error. Canonical per code, except external
    /// service failures which carry 502.
    pub fn status(&self) -> u16 {
        match self {
            QueryError::ExternalService { .. } => 502,
            other => other.code().status(),
        }
    }

    pub fn details(&self) -> Option<&[String]> {
        match self {
            QueryError::Validation { details, .. } if !details.is_empty() => {
                Some(details.as_slice())
            }
            _ => None,
        }
    }

    pub fn retry_after(&self) -> Option<u64> {
        match self {
            QueryError::RateLimit { retry_after } => *retry_after,
            _ => None,
        }
    }
}
