mod loader;
mod schema;

pub use loader::{get_config_path, load_config, save_config};
pub use schema::{
    AiProviderConfig, Config, ConversationConfig, DatasourceConfig, PlannerConfig,
    RetrySettings, ServerConfig, WebhookConfig,
};
