//! Shared application state handed to every axum handler.

use std::sync::Arc;

use agentry_agent::{Orchestrator, ReasoningAgent};
use agentry_config::AppConfig;
use agentry_events::SharedEventBus;
use agentry_exec::ToolExecutor;
use agentry_llm::LlmClient;
use agentry_memory::SessionStore;
use agentry_metrics::MetricsStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub llm: Arc<LlmClient>,
    pub executor: Arc<ToolExecutor>,
    pub store: Arc<SessionStore>,
    pub events: SharedEventBus,
    pub metrics: Arc<MetricsStore>,
    pub agent: Arc<ReasoningAgent>,
    pub orchestrator: Arc<Orchestrator>,
}

impl AppState {
    pub fn new(
        config: Arc<AppConfig>,
        llm: Arc<LlmClient>,
        executor: Arc<ToolExecutor>,
        store: Arc<SessionStore>,
        events: SharedEventBus,
        metrics: Arc<MetricsStore>,
    ) -> Self {
        let agent = Arc::new(ReasoningAgent::new(
            config.clone(),
            llm.clone(),
            executor.clone(),
            store.clone(),
            events.clone(),
            metrics.clone(),
        ));
        let orchestrator = Arc::new(Orchestrator::new(
            config.clone(),
            llm.clone(),
            executor.clone(),
            store.clone(),
            events.clone(),
            metrics.clone(),
        ));
        AppState { config, llm, executor, store, events, metrics, agent, orchestrator }
    }
}
