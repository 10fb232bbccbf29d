/// Query orchestration: one end-to-end handling of a request, from input
/// validation through the planner/executor round trip to a response or a
/// typed failure.
///
/// Each call is an independent unit of work — no state is shared between
/// orchestrations beyond read-only repository lookups. Collaborator
/// failures are classified into the error taxonomy exactly once, here; an
/// error that is already typed passes through unchanged.
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::errors::{QueryError, QueryResult};
use crate::planner::{ExecuteOptions, Planner, SqlExecutor, SqlPlan};
use crate::repository::{
    AiProvider, ConversationMessage, ConversationStore, Datasource, DatasourceRepository,
    ProviderRepository,
};

mod classify;
pub use classify::{FailureClass, Stage, classify_failure, is_credential_failure};

pub const MAX_QUESTION_LEN: usize = 2000;
pub const MAX_ROW_LIMIT: i64 = 1000;
pub const DEFAULT_ROW_LIMIT: u32 = 100;

/// A natural-language query request as received over the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datasource: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<i64>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        rename = "aiProvider"
    )]
    pub ai_provider: Option<i64>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        rename = "conversationId"
    )]
    pub conversation_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
}

/// A request that passed field validation.
#[derive(Debug, Clone)]
struct ValidQuery {
    question: String,
    datasource: Option<i64>,
    ai_provider: Option<i64>,
    conversation_id: Option<i64>,
    limit: u32,
}

impl QueryRequest {
    /// Validate every field, collecting `"field: message"` details so the
    /// caller can surface per-field feedback.
    fn validate(&self) -> QueryResult<ValidQuery> {
        let mut details = Vec::new();

        let question = self.question.trim().to_string();
        if question.is_empty() {
            details.push("question: question is required".to_string());
        } else if question.chars().count() > MAX_QUESTION_LEN {
            details.push(format!(
                "question: question must be at most {MAX_QUESTION_LEN} characters"
            ));
        }

        let datasource = positive_or_detail(self.datasource, "datasource", &mut details);
        let ai_provider = positive_or_detail(self.ai_provider, "aiProvider", &mut details);
        let conversation_id =
            positive_or_detail(self.conversation_id, "conversationId", &mut details);
        positive_or_detail(self.action, "action", &mut details);

        let limit = match self.limit {
            None => DEFAULT_ROW_LIMIT,
            Some(l) if l <= 0 => {
                details.push("limit: limit must be a positive integer".to_string());
                DEFAULT_ROW_LIMIT
            }
            Some(l) if l > MAX_ROW_LIMIT => {
                details.push(format!("limit: limit must not exceed {MAX_ROW_LIMIT}"));
                DEFAULT_ROW_LIMIT
            }
            Some(l) => l as u32,
        };

        if !details.is_empty() {
            return Err(QueryError::validation_with_details(
                "Invalid query request",
                details,
            ));
        }

        Ok(ValidQuery {
            question,
            datasource,
            ai_provider,
            conversation_id,
            limit,
        })
    }
}

fn positive_or_detail(
    value: Option<i64>,
    field: &str,
    details: &mut Vec<String>,
) -> Option<i64> {
    match value {
        Some(v) if v <= 0 => {
            details.push(format!("{field}: {field} must be a positive integer"));
            None
        }
        other => other,
    }
}

/// Successful orchestration result. Resolved ids are embedded so the caller
/// knows which implicit resources were chosen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub sql: String,
    pub rows: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(rename = "datasourceId")]
    pub datasource_id: i64,
    #[serde(rename = "aiProviderId")]
    pub ai_provider_id: i64,
    pub limit: u32,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        rename = "conversationId"
    )]
    pub conversation_id: Option<i64>,
}

pub struct QueryService {
    providers: Arc<dyn ProviderRepository>,
    datasources: Arc<dyn DatasourceRepository>,
    planner: Arc<dyn Planner>,
    executor: Arc<dyn SqlExecutor>,
    conversations: Option<Arc<dyn ConversationStore>>,
}

impl QueryService {
    pub fn new(
        providers: Arc<dyn ProviderRepository>,
        datasources: Arc<dyn DatasourceRepository>,
        planner: Arc<dyn Planner>,
        executor: Arc<dyn SqlExecutor>,
        conversations: Option<Arc<dyn ConversationStore>>,
    ) -> Self {
        Self {
            providers,
            datasources,
            planner,
            executor,
            conversations,
        }
    }

    /// Run one orchestration call.
    pub async fn run(&self, request: QueryRequest) -> QueryResult<QueryResponse> {
        let query = request.validate()?;

        let provider = self.resolve_provider(query.ai_provider).await?;
        let datasource = self.resolve_datasource(query.datasource).await?;
        debug!(
            provider_id = provider.id,
            datasource_id = datasource.id,
            limit = query.limit,
            "resolved query targets"
        );

        let plan = match self
            .planner
            .plan(&query.question, datasource.id, Some(query.limit))
            .await
        {
            Ok(plan) => plan,
            Err(e) => return Err(classify_stage_error(Stage::Planning, e, None)),
        };
        if plan.sql.is_empty() {
            return Err(QueryError::ExternalService {
                message: "Planner returned an empty SQL plan".to_string(),
            });
        }

        let output = match self
            .executor
            .execute(&plan, &ExecuteOptions {
                limit: Some(query.limit),
            })
            .await
        {
            Ok(output) => output,
            Err(e) => return Err(classify_stage_error(Stage::Execution, e, Some(&plan))),
        };

        info!(
            datasource_id = datasource.id,
            rows = output.rows.len(),
            "query executed"
        );

        let conversation_id = self
            .record_conversation(&query, &plan, &output, provider.id, datasource.id)
            .await;

        Ok(QueryResponse {
            sql: plan.sql.join("; "),
            rows: output.rows,
            summary: output.summary,
            datasource_id: datasource.id,
            ai_provider_id: provider.id,
            limit: query.limit,
            conversation_id,
        })
    }

    async fn resolve_provider(&self, explicit: Option<i64>) -> QueryResult<AiProvider> {
        let providers = self.providers.list().await?;
        if let Some(id) = explicit {
            return providers
                .into_iter()
                .find(|p| p.id == id)
                .ok_or_else(|| QueryError::validation("Selected AI provider not found"));
        }
        providers
            .into_iter()
            .find(|p| p.is_default)
            .ok_or_else(|| QueryError::configuration("No AI provider available"))
    }

    async fn resolve_datasource(&self, explicit: Option<i64>) -> QueryResult<Datasource> {
        let datasources = self.datasources.list().await?;
        if let Some(id) = explicit {
            return datasources
                .into_iter()
                .find(|d| d.id == id)
                .ok_or_else(|| QueryError::validation("Selected datasource not found"));
        }
        datasources
            .into_iter()
            .find(|d| d.is_default)
            .ok_or_else(|| QueryError::configuration("No datasource configured"))
    }

    /// Append the question/answer turn to the conversation log. Strictly
    /// best-effort: the query result is the primary contract, so every
    /// failure here is logged and swallowed.
    async fn record_conversation(
        &self,
        query: &ValidQuery,
        plan: &SqlPlan,
        output: &crate::planner::ExecutionOutput,
        provider_id: i64,
        datasource_id: i64,
    ) -> Option<i64> {
        let store = self.conversations.as_ref()?;

        let result: anyhow::Result<i64> = async {
            let id = match query.conversation_id {
                Some(id) => id,
                None => store.create(&conversation_title(&query.question)).await?,
            };
            store
                .append_message(id, ConversationMessage::user(&query.question))
                .await?;

            let mut metadata = HashMap::new();
            metadata.insert("sql".to_string(), Value::String(plan.sql.join("; ")));
            metadata.insert("rowCount".to_string(), Value::from(output.rows.len()));
            metadata.insert("datasourceId".to_string(), Value::from(datasource_id));
            metadata.insert("aiProviderId".to_string(), Value::from(provider_id));
            let summary = output
                .summary
                .clone()
                .unwrap_or_else(|| format!("Returned {} rows.", output.rows.len()));
            store
                .append_message(id, ConversationMessage::assistant(summary, metadata))
                .await?;
            Ok(id)
        }
        .await;

        match result {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(error = %e, "failed to record conversation turn");
                query.conversation_id
            }
        }
    }
}

fn conversation_title(question: &str) -> String {
    const MAX_TITLE_LEN: usize = 80;
    if question.chars().count() <= MAX_TITLE_LEN {
        question.to_string()
    } else {
        let truncated: String = question.chars().take(MAX_TITLE_LEN).collect();
        format!("{truncated}…")
    }
}

/// Map a collaborator failure into the taxonomy. Already-typed errors pass
/// through unchanged; everything else is sniffed by message text.
fn classify_stage_error(stage: Stage, err: anyhow::Error, plan: Option<&SqlPlan>) -> QueryError {
    let err = match err.downcast::<QueryError>() {
        Ok(typed) => return typed,
        Err(original) => original,
    };
    let message = format!("{err:#}");

    match classify_failure(stage, &message) {
        FailureClass::Configuration => {
            warn!(?stage, error = %message, "datasource schema not usable");
            QueryError::configuration(
                "Datasource schema is not synced. Please sync the datasource schema and try again.",
            )
        }
        FailureClass::Validation => {
            QueryError::validation("Only read-only SELECT queries are allowed")
        }
        FailureClass::ExternalService => {
            error!(?stage, error = %message, "collaborator service failure");
            QueryError::ExternalService {
                message: match stage {
                    Stage::Planning => {
                        "Failed to generate a SQL plan for this question. Please try again later."
                    }
                    Stage::Execution => {
                        "Query execution service is unavailable. Please try again later."
                    }
                }
                .to_string(),
            }
        }
        FailureClass::Database => {
            if is_credential_failure(&message) {
                return QueryError::Database {
                    message: "Database access denied. Please check database credentials."
                        .to_string(),
                };
            }
            let sql = plan
                .and_then(|p| p.sql.first())
                .map(String::as_str)
                .unwrap_or_default();
            QueryError::Database {
                message: if sql.is_empty() {
                    format!("Database error. {message}")
                } else {
                    format!("Database error. SQL: {sql}; {message}")
                },
            }
        }
    }
}
