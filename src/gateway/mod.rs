/// HTTP API server for the query service.
///
/// Exposes the query endpoint and a health check. Failures leave the
/// process as a typed error envelope: JSON body plus the taxonomy status,
/// with a `Retry-After` header on 429 responses.
use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Json;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::envelope::{EnvelopeInput, ErrorEnvelope, encode};
use crate::errors::ErrorCode;
use crate::notify::{QueryNotification, WebhookNotifier};
use crate::orchestrator::{QueryRequest, QueryService};

/// Shared state between HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<QueryService>,
    pub notifier: Option<Arc<WebhookNotifier>>,
}

/// Build the HTTP API router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/query", post(query_handler))
        .route("/api/health", get(health_handler))
        .with_state(state)
}

/// POST /api/query — run one orchestration call.
async fn query_handler(
    State(state): State<AppState>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Response {
    let request_id = format!("query-{}", Uuid::new_v4());

    let Json(request) = match payload {
        Ok(json) => json,
        Err(rejection) => {
            debug!(%request_id, error = %rejection, "rejected malformed request body");
            return encode(EnvelopeInput {
                message: "Request body must be a valid JSON query request".to_string(),
                code: Some(ErrorCode::ValidationError.as_str().to_string()),
                ..Default::default()
            })
            .into_response();
        }
    };

    debug!(
        %request_id,
        question_len = request.question.len(),
        datasource = request.datasource,
        "received query request"
    );

    match state.service.run(request.clone()).await {
        Ok(response) => {
            info!(%request_id, rows = response.rows.len(), "query completed");
            if let Some(notifier) = &state.notifier {
                // Fire-and-forget; the notifier logs its own failures.
                let notifier = notifier.clone();
                let notification = QueryNotification::from_response(&request.question, &response);
                tokio::spawn(async move {
                    notifier.deliver(&notification).await;
                });
            }
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(err) => {
            warn!(
                %request_id,
                code = err.code().as_str(),
                status = err.status(),
                "query failed"
            );
            ErrorEnvelope::from_error(&err).into_response()
        }
    }
}

/// GET /api/health — health check endpoint.
async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": crate::VERSION
    }))
}

/// Start the HTTP API server. Returns the join handle and the bound
/// address (useful when the port was 0).
pub async fn start(
    host: &str,
    port: u16,
    state: AppState,
) -> Result<(tokio::task::JoinHandle<()>, std::net::SocketAddr)> {
    let app = build_router(state);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;
    info!("query API listening on {}", local_addr);

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("query API server error: {}", e);
        }
    });

    Ok((handle, local_addr))
}
