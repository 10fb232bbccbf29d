use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use crate::client::{QueryClient, RecoveryContext, resolve_action};
use crate::config::load_config;
use crate::gateway::{self, AppState};
use crate::notify::WebhookNotifier;
use crate::orchestrator::{QueryRequest, QueryService};
use crate::planner::{HttpExecutor, HttpPlanner};
use crate::repository::{
    ConfigDatasourceRepository, ConfigProviderRepository, ConversationStore,
    FileConversationStore,
};
use crate::utils::askdb_home;

#[derive(Parser)]
#[command(name = "askdb")]
#[command(about = "Natural-language query service for SQL databases", version)]
pub struct Cli {
    /// Path to the config file (default: ~/.askdb/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP query gateway
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Ask a question against a running gateway
    Ask {
        question: String,
        /// Gateway base URL
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        url: String,
        /// Explicit datasource id (default: the server's default datasource)
        #[arg(long)]
        datasource: Option<i64>,
        /// Explicit AI provider id
        #[arg(long = "provider")]
        ai_provider: Option<i64>,
        /// Continue an existing conversation
        #[arg(long)]
        conversation: Option<i64>,
        /// Maximum number of rows
        #[arg(long)]
        limit: Option<i64>,
    },
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Serve { host, port } => serve(cli.config.as_deref(), host, port).await,
        Commands::Ask {
            question,
            url,
            datasource,
            ai_provider,
            conversation,
            limit,
        } => {
            ask(
                &url,
                QueryRequest {
                    question,
                    datasource,
                    ai_provider,
                    conversation_id: conversation,
                    limit,
                    ..Default::default()
                },
            )
            .await
        }
    }
}

async fn serve(
    config_path: Option<&std::path::Path>,
    host: Option<String>,
    port: Option<u16>,
) -> Result<()> {
    let config = load_config(config_path)?;
    let host = host.unwrap_or_else(|| config.server.host.clone());
    let port = port.unwrap_or(config.server.port);

    let conversations_dir = match &config.conversations.dir {
        Some(dir) => PathBuf::from(dir),
        None => askdb_home()?.join("conversations"),
    };
    let conversations: Arc<dyn ConversationStore> = Arc::new(FileConversationStore::new(
        conversations_dir,
        config.conversations.max_cached,
        config.conversations.max_messages,
    )?);

    let service = QueryService::new(
        Arc::new(ConfigProviderRepository::from_config(&config)),
        Arc::new(ConfigDatasourceRepository::from_config(&config)),
        Arc::new(HttpPlanner::new(&config.planner)),
        Arc::new(HttpExecutor::new(&config.planner)),
        Some(conversations),
    );

    let notifier = config
        .webhook
        .as_ref()
        .filter(|w| w.enabled)
        .map(|w| Arc::new(WebhookNotifier::new(w, config.retry.to_retry_config())));

    let state = AppState {
        service: Arc::new(service),
        notifier,
    };

    let (handle, _addr) = gateway::start(&host, port, state).await?;
    handle.await?;
    Ok(())
}

async fn ask(url: &str, request: QueryRequest) -> Result<()> {
    let client = QueryClient::new(url);
    match client.ask(&request).await {
        Ok(response) => {
            println!("SQL: {}", response.sql);
            if let Some(summary) = &response.summary {
                println!("{summary}");
            }
            println!("{}", serde_json::to_string_pretty(&response.rows)?);
            if let Some(id) = response.conversation_id {
                println!("(conversation {id})");
            }
            Ok(())
        }
        Err(err) => {
            eprintln!("Error: {}", err.message);
            if let Some(details) = &err.details {
                for detail in details {
                    eprintln!("  - {detail}");
                }
            }
            if let Some(sql) = &err.sql {
                eprintln!("SQL: {sql}");
            }
            if let Some(advice) = &err.advice {
                eprintln!("Hint: {advice}");
            }
            let ctx = RecoveryContext {
                can_retry: true,
                ..Default::default()
            };
            if let Some(action) = resolve_action(&err, &ctx) {
                eprintln!("Suggested action: {}", action.label);
            }
            bail!("query failed");
        }
    }
}
