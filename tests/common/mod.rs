//! Shared stub collaborators for integration tests.
#![allow(dead_code)]

use askdb::errors::QueryError;
use askdb::planner::{ExecuteOptions, ExecutionOutput, Planner, SqlExecutor, SqlPlan};
use askdb::repository::{AiProvider, Datasource, DatasourceRepository, ProviderRepository};
use async_trait::async_trait;

pub struct StaticProviders(pub Vec<AiProvider>);

#[async_trait]
impl ProviderRepository for StaticProviders {
    async fn list(&self) -> anyhow::Result<Vec<AiProvider>> {
        Ok(self.0.clone())
    }
}

pub struct StaticDatasources(pub Vec<Datasource>);

#[async_trait]
impl DatasourceRepository for StaticDatasources {
    async fn list(&self) -> anyhow::Result<Vec<Datasource>> {
        Ok(self.0.clone())
    }
}

pub enum PlannerMode {
    Sql(&'static str),
    RateLimited,
}

pub struct ScriptedPlanner(pub PlannerMode);

#[async_trait]
impl Planner for ScriptedPlanner {
    async fn plan(
        &self,
        _question: &str,
        _datasource_id: i64,
        _limit: Option<u32>,
    ) -> anyhow::Result<SqlPlan> {
        match self.0 {
            PlannerMode::Sql(sql) => Ok(SqlPlan {
                sql: vec![sql.to_string()],
            }),
            PlannerMode::RateLimited => Err(QueryError::RateLimit {
                retry_after: Some(20),
            }
            .into()),
        }
    }
}

pub struct RowsExecutor(pub usize);

#[async_trait]
impl SqlExecutor for RowsExecutor {
    async fn execute(
        &self,
        _plan: &SqlPlan,
        _opts: &ExecuteOptions,
    ) -> anyhow::Result<ExecutionOutput> {
        Ok(ExecutionOutput {
            rows: (0..self.0).map(|i| serde_json::json!({"n": i})).collect(),
            summary: Some(format!("{} rows", self.0)),
        })
    }
}

pub fn default_provider() -> AiProvider {
    AiProvider {
        id: 1,
        name: "default-provider".to_string(),
        is_default: true,
        model: None,
    }
}

pub fn default_datasource() -> Datasource {
    Datasource {
        id: 7,
        name: "warehouse".to_string(),
        is_default: true,
    }
}
