//! Entry point: load configuration from the environment, wire up every
//! subsystem, and serve the HTTP/WebSocket edge until shutdown.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use agentry_config::AppConfig;
use agentry_events::shared_bus;
use agentry_exec::ToolExecutor;
use agentry_llm::LlmClient;
use agentry_mcp::ExternalServerManager;
use agentry_memory::SessionStore;
use agentry_metrics::MetricsStore;
use agentry_server::AppState;
use agentry_tools::{builtins::register_all, ToolContext, ToolRegistry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Arc::new(AppConfig::load());

    let mut registry = ToolRegistry::new();
    register_all(&mut registry);

    let context = ToolContext {
        fs_allowed_path: PathBuf::from(&config.fs_allowed_path),
        database: config.database.clone(),
        redis: config.redis.clone(),
    };

    let external = ExternalServerManager::with_store_path(store_path());
    let executor = Arc::new(ToolExecutor::new(registry, external, context));

    let llm = Arc::new(LlmClient::new(&config.llm));
    let store = Arc::new(SessionStore::new());
    let events = shared_bus();
    let metrics = Arc::new(MetricsStore::new());

    let state = AppState::new(config.clone(), llm, executor, store, events, metrics);
    let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), config.port);

    agentry_server::serve(state, addr).await
}

fn store_path() -> PathBuf {
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join("mcp-servers.json")
}
