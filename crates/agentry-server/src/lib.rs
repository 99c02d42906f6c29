//! HTTP/WebSocket edge: every endpoint in the external interface table,
//! wired onto the axum `Router`, plus the `join:session` WebSocket protocol.

mod auth;
mod envelope;
mod routes;
mod state;
mod ws;

pub use state::AppState;

use std::net::SocketAddr;

use axum::routing::{delete, get, patch, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/api/tools", get(routes::list_tools))
        .route("/api/sessions", get(routes::list_sessions).post(routes::create_session))
        .route(
            "/api/sessions/{id}",
            get(routes::get_session).delete(routes::delete_session),
        )
        .route("/api/chat", post(routes::chat))
        .route("/api/metrics", get(routes::get_metrics).delete(routes::reset_metrics))
        .route("/api/permissions/{role}", get(routes::get_permissions))
        .route(
            "/api/mcp/servers",
            get(routes::list_mcp_servers).post(routes::add_mcp_server),
        )
        .route(
            "/api/mcp/servers/{id}",
            patch(routes::update_mcp_server).delete(routes::delete_mcp_server),
        )
        .route("/api/mcp/servers/{id}/reconnect", post(routes::reconnect_mcp_server))
        .route("/api/mcp/tools", get(routes::list_mcp_tools))
        .route("/ws", get(ws::ws_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Binds `addr` and serves until SIGINT/SIGTERM. Persisted MCP server
/// configs are loaded and connected in the background once the listener
/// is already up, never before. In-flight requests are allowed to finish
/// (bounded by their own timeouts); every external client is disconnected
/// on the way out.
pub async fn serve(state: AppState, addr: SocketAddr) -> anyhow::Result<()> {
    let router = build_router(state.clone());
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "agentry-server listening");

    let executor = state.executor.clone();
    tokio::spawn(async move {
        if let Err(err) = executor.external().load().await {
            tracing::warn!(%err, "failed to load persisted MCP server configs");
        }
        executor.external().connect_all().await;
    });

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutting down, disconnecting external tool servers");
    state.executor.external().disconnect_all().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentry_config::AppConfig;
    use agentry_events::shared_bus;
    use agentry_llm::LlmClient;
    use agentry_mcp::ExternalServerManager;
    use agentry_memory::SessionStore;
    use agentry_metrics::MetricsStore;
    use agentry_tools::{builtins::register_all, ToolContext, ToolRegistry};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn test_state() -> AppState {
        let mut registry = ToolRegistry::new();
        register_all(&mut registry);
        let context = ToolContext {
            fs_allowed_path: std::env::temp_dir(),
            database: agentry_config::DatabaseConfig::default(),
            redis: agentry_config::RedisConfig::default(),
        };
        let executor =
            Arc::new(agentry_exec::ToolExecutor::new(registry, ExternalServerManager::new(), context));
        AppState::new(
            Arc::new(AppConfig::default()),
            Arc::new(LlmClient::new(&agentry_config::LlmConfig::default())),
            executor,
            Arc::new(SessionStore::new()),
            shared_bus(),
            Arc::new(MetricsStore::new()),
        )
    }

    #[tokio::test]
    async fn health_endpoint_returns_success() {
        let app = build_router(test_state());
        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/health")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
    }

    #[tokio::test]
    async fn chat_rejects_an_empty_message() {
        let app = build_router(test_state());
        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri("/api/chat")
                    .header("content-type", "application/json")
                    .body(axum::body::Body::from(r#"{"message":"","mode":"single"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::BAD_REQUEST);
    }
}
