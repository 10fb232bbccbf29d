/// Wire-format error envelope.
///
/// Every failed request crosses the network as a JSON body plus an HTTP
/// status. `encode` normalizes whatever the server side produced (a raw
/// code string, a status, a message) into a body whose `code` and `status`
/// are mutually consistent with the taxonomy — unless the caller explicitly
/// forced a status that disagrees with a supplied code, in which case the
/// explicit status wins. Server intent takes priority over inference.
use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use crate::errors::{ErrorCode, QueryError};

/// Bounds for the `retryAfter` hint, in seconds.
pub const RETRY_AFTER_MIN: u64 = 1;
pub const RETRY_AFTER_MAX: u64 = 120;

/// JSON body of an error response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<String>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        rename = "retryAfter"
    )]
    pub retry_after: Option<u64>,
}

/// An error body paired with the HTTP status it ships under.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorEnvelope {
    pub status: u16,
    pub body: ErrorBody,
}

/// Raw material for an envelope, before normalization.
#[derive(Debug, Default)]
pub struct EnvelopeInput {
    pub message: String,
    /// Raw code string; normalized against the closed set.
    pub code: Option<String>,
    /// Explicit status. Honored when positive; otherwise canonical for the code.
    pub status: Option<i64>,
    pub details: Option<Vec<String>>,
    /// Retry hint in seconds; clamped to `[RETRY_AFTER_MIN, RETRY_AFTER_MAX]`,
    /// dropped when non-finite or non-positive.
    pub retry_after: Option<f64>,
}

/// Build a normalized envelope from raw parts.
pub fn encode(input: EnvelopeInput) -> ErrorEnvelope {
    let explicit_status = input
        .status
        .filter(|s| *s > 0)
        .and_then(|s| u16::try_from(s).ok());

    let code = input
        .code
        .as_deref()
        .and_then(ErrorCode::parse)
        .or_else(|| explicit_status.and_then(infer_code_from_status))
        .unwrap_or(ErrorCode::InternalError);

    let status = explicit_status.unwrap_or_else(|| code.status());

    let trimmed = input.message.trim();
    let message = if trimmed.is_empty() {
        code.default_message().to_string()
    } else {
        trimmed.to_string()
    };

    ErrorEnvelope {
        status,
        body: ErrorBody {
            code,
            message,
            details: input.details,
            retry_after: clamp_retry_after(input.retry_after),
        },
    }
}

/// Map an HTTP status to a taxonomy code when no valid code was supplied.
pub(crate) fn infer_code_from_status(status: u16) -> Option<ErrorCode> {
    match status {
        429 => Some(ErrorCode::RateLimit),
        401 => Some(ErrorCode::Unauthenticated),
        403 => Some(ErrorCode::ConversationForbidden),
        404 => Some(ErrorCode::ConversationNotFound),
        s if s >= 500 => Some(ErrorCode::InternalError),
        400 => Some(ErrorCode::ValidationError),
        _ => None,
    }
}

pub(crate) fn clamp_retry_after(raw: Option<f64>) -> Option<u64> {
    let secs = raw?;
    if !secs.is_finite() || secs <= 0.0 {
        return None;
    }
    Some((secs.round() as u64).clamp(RETRY_AFTER_MIN, RETRY_AFTER_MAX))
}

impl ErrorEnvelope {
    /// Envelope for an already-classified boundary error.
    pub fn from_error(err: &QueryError) -> Self {
        // Unclassified internals never leak their message across the wire;
        // the taxonomy default stands in for it.
        let message = match err {
            QueryError::Internal(_) => String::new(),
            other => other.to_string(),
        };
        encode(EnvelopeInput {
            message,
            code: Some(err.code().as_str().to_string()),
            status: Some(i64::from(err.status())),
            details: err.details().map(<[String]>::to_vec),
            retry_after: err.retry_after().map(|s| s as f64),
        })
    }
}

impl IntoResponse for ErrorEnvelope {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let retry_after = self.body.retry_after;
        let mut response = (status, Json(self.body)).into_response();
        if status == StatusCode::TOO_MANY_REQUESTS {
            if let Some(secs) = retry_after {
                if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                    response.headers_mut().insert(header::RETRY_AFTER, value);
                }
            }
        }
        response
    }
}
