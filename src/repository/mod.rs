/// Read-only resource repositories and the conversation store.
///
/// The orchestrator consumes these through narrow trait interfaces. The
/// `is_default` flag on providers and datasources is enforced at creation
/// time by whatever manages them; this layer only consumes it and never
/// re-derives a default.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::config::Config;

mod store;
pub use store::FileConversationStore;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiProvider {
    pub id: i64,
    pub name: String,
    #[serde(rename = "isDefault")]
    pub is_default: bool,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Datasource {
    pub id: i64,
    pub name: String,
    #[serde(rename = "isDefault")]
    pub is_default: bool,
}

#[async_trait]
pub trait ProviderRepository: Send + Sync {
    async fn list(&self) -> anyhow::Result<Vec<AiProvider>>;
}

#[async_trait]
pub trait DatasourceRepository: Send + Sync {
    async fn list(&self) -> anyhow::Result<Vec<Datasource>>;
}

/// Providers straight from the loaded configuration.
pub struct ConfigProviderRepository {
    providers: Vec<AiProvider>,
}

impl ConfigProviderRepository {
    pub fn from_config(config: &Config) -> Self {
        Self {
            providers: config
                .providers
                .iter()
                .map(|p| AiProvider {
                    id: p.id,
                    name: p.name.clone(),
                    is_default: p.is_default,
                    model: p.model.clone(),
                })
                .collect(),
        }
    }
}

#[async_trait]
impl ProviderRepository for ConfigProviderRepository {
    async fn list(&self) -> anyhow::Result<Vec<AiProvider>> {
        Ok(self.providers.clone())
    }
}

pub struct ConfigDatasourceRepository {
    datasources: Vec<Datasource>,
}

impl ConfigDatasourceRepository {
    pub fn from_config(config: &Config) -> Self {
        Self {
            datasources: config
                .datasources
                .iter()
                .map(|d| Datasource {
                    id: d.id,
                    name: d.name.clone(),
                    is_default: d.is_default,
                })
                .collect(),
        }
    }
}

#[async_trait]
impl DatasourceRepository for ConfigDatasourceRepository {
    async fn list(&self) -> anyhow::Result<Vec<Datasource>> {
        Ok(self.datasources.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: String,
    pub content: String,
    #[serde(default = "chrono::Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl ConversationMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    pub fn assistant(content: impl Into<String>, metadata: HashMap<String, Value>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
            timestamp: Utc::now(),
            metadata,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: i64,
    pub title: String,
    pub messages: Vec<ConversationMessage>,
    #[serde(default = "chrono::Utc::now", rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "chrono::Utc::now", rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(id: i64, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            messages: Vec::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}

/// Best-effort conversation persistence. The orchestrator logs and swallows
/// every failure from this trait; implementations must never be load-bearing
/// for the query response.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Create a new conversation and return its id.
    async fn create(&self, title: &str) -> anyhow::Result<i64>;

    /// Append a message to an existing conversation.
    async fn append_message(
        &self,
        conversation_id: i64,
        message: ConversationMessage,
    ) -> anyhow::Result<()>;

    async fn load(&self, conversation_id: i64) -> anyhow::Result<Option<Conversation>>;
}
