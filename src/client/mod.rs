/// Client-side counterpart of the wire error contract.
///
/// `QueryClient` talks to a running gateway; whatever goes wrong — a
/// structured error envelope or a bare transport failure — is reconstructed
/// into a [`DecodedError`] by the decoder, and the recovery resolver picks
/// at most one suggested action from it.
use serde_json::Value;

use crate::errors::ErrorCode;
use crate::orchestrator::{QueryRequest, QueryResponse};
use crate::utils::default_http_client;

mod decode;
pub mod recovery;

pub use decode::decode;
pub use recovery::{
    RecoveryAction, RecoveryContext, SuggestedAction, countdown_ticker, resolve_action,
};

/// A typed error reconstructed on the client. Derived, never persisted;
/// built fresh for every failure.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedError {
    pub message: String,
    pub status: Option<u16>,
    pub code: Option<ErrorCode>,
    /// SQL statement extracted from a database error message, if any.
    pub sql: Option<String>,
    /// Actionable hint, distinct from the message.
    pub advice: Option<String>,
    pub details: Option<Vec<String>>,
    pub retry_after: Option<u64>,
}

/// What a request attempt produced when it did not produce a response.
#[derive(Debug)]
pub enum ApiFailure {
    /// The server answered with an error status and (possibly) a JSON body.
    Api { status: u16, body: Value },
    /// The request never reached a server response.
    Transport(String),
}

pub const DEFAULT_FALLBACK_MESSAGE: &str = "Query failed. Please try again.";

/// HTTP client for the query gateway.
pub struct QueryClient {
    http: reqwest::Client,
    base_url: String,
}

impl QueryClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            http: default_http_client(120),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Post a question to the gateway. Failures of any shape come back as a
    /// decoded, typed error — this method never surfaces a raw transport or
    /// serialization error.
    pub async fn ask(&self, request: &QueryRequest) -> Result<QueryResponse, DecodedError> {
        let url = format!("{}/api/query", self.base_url);
        let resp = match self.http.post(&url).json(request).send().await {
            Ok(resp) => resp,
            Err(e) => {
                return Err(decode(
                    &ApiFailure::Transport(e.to_string()),
                    DEFAULT_FALLBACK_MESSAGE,
                ));
            }
        };

        let status = resp.status();
        if status.is_success() {
            resp.json::<QueryResponse>().await.map_err(|e| {
                decode(
                    &ApiFailure::Transport(e.to_string()),
                    DEFAULT_FALLBACK_MESSAGE,
                )
            })
        } else {
            let body = resp.json::<Value>().await.unwrap_or(Value::Null);
            Err(decode(
                &ApiFailure::Api {
                    status: status.as_u16(),
                    body,
                },
                DEFAULT_FALLBACK_MESSAGE,
            ))
        }
    }
}

#[cfg(test)]
mod tests;
