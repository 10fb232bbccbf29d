/// Webhook delivery of query results.
///
/// Strictly best-effort: delivery runs after the response is already on its
/// way back to the caller, hardened by the retry executor, and never
/// surfaces a failure beyond a log line. Payloads are signed with
/// HMAC-SHA256 so receivers can authenticate the sender.
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use tracing::{debug, warn};

use crate::config::WebhookConfig;
use crate::orchestrator::QueryResponse;
use crate::retry::{RetryConfig, RetryExecutor};
use crate::utils::default_http_client;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-Signature-256";

/// Payload posted to the configured webhook after a successful query.
#[derive(Debug, Clone, Serialize)]
pub struct QueryNotification {
    pub question: String,
    pub sql: String,
    #[serde(rename = "rowCount")]
    pub row_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(rename = "datasourceId")]
    pub datasource_id: i64,
    #[serde(
        skip_serializing_if = "Option::is_none",
        rename = "conversationId"
    )]
    pub conversation_id: Option<i64>,
    pub timestamp: DateTime<Utc>,
}

impl QueryNotification {
    pub fn from_response(question: &str, response: &QueryResponse) -> Self {
        Self {
            question: question.to_string(),
            sql: response.sql.clone(),
            row_count: response.rows.len(),
            summary: response.summary.clone(),
            datasource_id: response.datasource_id,
            conversation_id: response.conversation_id,
            timestamp: Utc::now(),
        }
    }
}

/// Compute an `sha256=<hex>` signature over a payload.
pub fn sign_payload(secret: &str, body: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(body);
    Some(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

pub struct WebhookNotifier {
    http: reqwest::Client,
    url: String,
    secret: Option<String>,
    retry: RetryExecutor,
}

impl WebhookNotifier {
    pub fn new(config: &WebhookConfig, retry: RetryConfig) -> Self {
        Self {
            http: default_http_client(30),
            url: config.url.clone(),
            secret: config.secret.clone(),
            retry: RetryExecutor::new(retry),
        }
    }

    /// Deliver a notification, retrying transient failures. Logs the
    /// outcome; never returns an error.
    pub async fn deliver(&self, notification: &QueryNotification) {
        let body = match serde_json::to_vec(notification) {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "failed to serialize webhook payload");
                return;
            }
        };
        let signature = self
            .secret
            .as_deref()
            .and_then(|secret| sign_payload(secret, &body));

        let http = self.http.clone();
        let url = self.url.clone();
        let result = self
            .retry
            .execute(move |_attempt| {
                let http = http.clone();
                let url = url.clone();
                let body = body.clone();
                let signature = signature.clone();
                async move {
                    let mut request = http
                        .post(&url)
                        .header("content-type", "application/json")
                        .body(body);
                    if let Some(signature) = signature {
                        request = request.header(SIGNATURE_HEADER, signature);
                    }
                    let resp = request.send().await?;
                    let status = resp.status();
                    if !status.is_success() {
                        anyhow::bail!("webhook delivery failed with status {}", status.as_u16());
                    }
                    Ok(())
                }
            })
            .await;

        if result.success {
            debug!(url = %self.url, attempts = result.attempts, "webhook delivered");
        } else {
            warn!(
                url = %self.url,
                attempts = result.attempts,
                error = result.error.as_ref().map_or("unknown", |e| e.message.as_str()),
                "webhook delivery failed"
            );
        }
    }
}
