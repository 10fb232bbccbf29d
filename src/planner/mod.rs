/// External collaborator interfaces for query planning and execution.
///
/// The NL→SQL planning algorithm and the SQL execution engine live in a
/// separate service; this module is the narrow boundary the orchestrator
/// calls through. On failure the only classification signal available is
/// the error message text, so the HTTP implementations surface the response
/// body verbatim as the error.
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::config::PlannerConfig;
use crate::utils::default_http_client;

/// A planned query: one or more SQL statements for the target datasource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqlPlan {
    pub sql: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecuteOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionOutput {
    pub rows: Vec<Value>,
    #[serde(default)]
    pub summary: Option<String>,
}

#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(
        &self,
        question: &str,
        datasource_id: i64,
        limit: Option<u32>,
    ) -> Result<SqlPlan>;
}

#[async_trait]
pub trait SqlExecutor: Send + Sync {
    async fn execute(&self, plan: &SqlPlan, opts: &ExecuteOptions) -> Result<ExecutionOutput>;
}

/// Reqwest-backed planner speaking JSON to `POST {base}/plan`.
pub struct HttpPlanner {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPlanner {
    pub fn new(config: &PlannerConfig) -> Self {
        Self {
            client: default_http_client(config.timeout_secs),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl Planner for HttpPlanner {
    async fn plan(
        &self,
        question: &str,
        datasource_id: i64,
        limit: Option<u32>,
    ) -> Result<SqlPlan> {
        let resp = self
            .client
            .post(format!("{}/plan", self.base_url))
            .json(&json!({
                "question": question,
                "datasourceId": datasource_id,
                "limit": limit,
            }))
            .send()
            .await
            .context("Failed to reach planner service")?;

        let resp = check_collaborator_status(resp, "planner").await?;
        resp.json::<SqlPlan>()
            .await
            .context("Failed to parse planner response")
    }
}

/// Reqwest-backed executor speaking JSON to `POST {base}/execute`.
pub struct HttpExecutor {
    client: reqwest::Client,
    base_url: String,
}

impl HttpExecutor {
    pub fn new(config: &PlannerConfig) -> Self {
        Self {
            client: default_http_client(config.timeout_secs),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl SqlExecutor for HttpExecutor {
    async fn execute(&self, plan: &SqlPlan, opts: &ExecuteOptions) -> Result<ExecutionOutput> {
        let resp = self
            .client
            .post(format!("{}/execute", self.base_url))
            .json(&json!({
                "sql": plan.sql,
                "limit": opts.limit,
            }))
            .send()
            .await
            .context("Failed to reach execution service")?;

        let resp = check_collaborator_status(resp, "executor").await?;
        resp.json::<ExecutionOutput>()
            .await
            .context("Failed to parse executor response")
    }
}

/// On a non-success status, surface the response body text as the error
/// message; the orchestrator classifies it from there.
async fn check_collaborator_status(
    resp: reqwest::Response,
    service: &str,
) -> Result<reqwest::Response> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    let body = body.trim();
    if body.is_empty() {
        bail!("{service} request failed with status {status}");
    }
    bail!("{body}");
}
