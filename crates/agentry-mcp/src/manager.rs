//! Tracks the set of configured external tool servers, connects to each,
//! and routes `mcp__<server_id>__<tool_name>` calls to the right client.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use agentry_core::{
    ExternalServerConfig, ExternalServerStatus, FederatedTool, MCP_TOOL_PREFIX,
};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::client::{ExternalClient, McpError};

const SERVERS_FILE: &str = "mcp-servers.json";

#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("unknown external server: {0}")]
    UnknownServer(Uuid),
    #[error("malformed federated tool name: {0}")]
    MalformedName(String),
    #[error(transparent)]
    Mcp(#[from] McpError),
    #[error("persistence error: {0}")]
    Io(String),
}

/// Owns the configured servers and their live clients (when connected).
pub struct ExternalServerManager {
    configs: RwLock<Vec<ExternalServerConfig>>,
    clients: RwLock<HashMap<Uuid, Arc<ExternalClient>>>,
    store_path: PathBuf,
}

impl ExternalServerManager {
    pub fn new() -> Self {
        Self::with_store_path(default_store_path())
    }

    pub fn with_store_path(store_path: PathBuf) -> Self {
        ExternalServerManager {
            configs: RwLock::new(Vec::new()),
            clients: RwLock::new(HashMap::new()),
            store_path,
        }
    }

    /// Loads persisted server configs from disk, if the file exists.
    pub async fn load(&self) -> Result<(), ManagerError> {
        if !self.store_path.exists() {
            return Ok(());
        }
        let bytes = tokio::fs::read(&self.store_path)
            .await
            .map_err(|e| ManagerError::Io(e.to_string()))?;
        let configs: Vec<ExternalServerConfig> =
            serde_json::from_slice(&bytes).map_err(|e| ManagerError::Io(e.to_string()))?;
        *self.configs.write().await = configs;
        Ok(())
    }

    async fn persist(&self) -> Result<(), ManagerError> {
        let configs = self.configs.read().await.clone();
        let bytes =
            serde_json::to_vec_pretty(&configs).map_err(|e| ManagerError::Io(e.to_string()))?;
        let tmp_path = self.store_path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, &bytes)
            .await
            .map_err(|e| ManagerError::Io(e.to_string()))?;
        tokio::fs::rename(&tmp_path, &self.store_path)
            .await
            .map_err(|e| ManagerError::Io(e.to_string()))?;
        Ok(())
    }

    /// Registers a new server config, persists it, and connects it if
    /// `enabled` (disabled servers are stored but not connected).
    pub async fn add(&self, config: ExternalServerConfig) -> Result<(), ManagerError> {
        let enabled = config.enabled;
        self.configs.write().await.push(config.clone());
        self.persist().await?;
        if enabled {
            self.connect_one(config).await;
        }
        Ok(())
    }

    pub async fn remove(&self, id: Uuid) -> Result<(), ManagerError> {
        if let Some(client) = self.clients.write().await.remove(&id) {
            client.disconnect().await;
        }
        self.configs.write().await.retain(|c| c.id != id);
        self.persist().await
    }

    /// Replaces a server's config and persists it. An enabled-flag
    /// transition (re)connects or disconnects the live client to match.
    pub async fn update(&self, id: Uuid, config: ExternalServerConfig) -> Result<(), ManagerError> {
        let mut configs = self.configs.write().await;
        let Some(existing) = configs.iter_mut().find(|c| c.id == id) else {
            return Err(ManagerError::UnknownServer(id));
        };
        *existing = config.clone();
        drop(configs);
        self.persist().await?;

        if config.enabled {
            if let Some(client) = self.clients.write().await.remove(&id) {
                client.disconnect().await;
            }
            self.connect_one(config).await;
        } else if let Some(client) = self.clients.write().await.remove(&id) {
            client.disconnect().await;
        }
        Ok(())
    }

    /// Connects to every enabled server in parallel. A failure on one
    /// server never prevents the others from connecting; failures are
    /// reflected in `status()`.
    pub async fn connect_all(&self) {
        let configs = self.configs.read().await.clone();
        let tasks = configs
            .into_iter()
            .filter(|c| c.enabled)
            .map(|config| self.connect_one(config));
        futures::future::join_all(tasks).await;
    }

    pub async fn reconnect(&self, id: Uuid) -> Result<(), ManagerError> {
        if let Some(client) = self.clients.write().await.remove(&id) {
            client.disconnect().await;
        }
        let config = self
            .configs
            .read()
            .await
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or(ManagerError::UnknownServer(id))?;
        self.connect_one(config).await;
        Ok(())
    }

    async fn connect_one(&self, config: ExternalServerConfig) {
        let id = config.id;
        let name = config.name.clone();
        match ExternalClient::connect(config).await {
            Ok(client) => {
                info!(server = %name, "external tool server connected");
                self.clients.write().await.insert(id, Arc::new(client));
            }
            Err(err) => {
                warn!(server = %name, error = %err, "external tool server failed to connect");
            }
        }
    }

    pub async fn all_tools(&self) -> Vec<FederatedTool> {
        let clients = self.clients.read().await;
        let mut all = Vec::new();
        for client in clients.values() {
            all.extend(client.tools().await);
        }
        all
    }

    /// Dispatches a call whose name is `mcp__<server_id>__<tool_name>`.
    /// The prefix and server id are parsed here, at the LLM-facing
    /// boundary only; the manager and client otherwise address servers
    /// and tools as explicit `(server_id, tool_name)` pairs.
    pub async fn execute(&self, full_name: &str, args: &Value) -> Result<Value, ManagerError> {
        let (server_id, tool_name) = parse_federated_name(full_name)?;
        let clients = self.clients.read().await;
        let client = clients
            .get(&server_id)
            .ok_or(ManagerError::UnknownServer(server_id))?;
        Ok(client.call_tool(&tool_name, args).await?)
    }

    pub async fn status(&self) -> Vec<ExternalServerStatus> {
        let configs = self.configs.read().await.clone();
        let clients = self.clients.read().await;
        let mut statuses = Vec::with_capacity(configs.len());
        for config in configs {
            let id = config.id;
            let (connected, tool_count) = match clients.get(&id) {
                Some(client) => (client.is_connected(), client.tools().await.len()),
                None => (false, 0),
            };
            statuses.push(ExternalServerStatus {
                config,
                connected,
                tool_count,
                error: None,
            });
        }
        statuses
    }

    pub async fn disconnect_all(&self) {
        let mut clients = self.clients.write().await;
        for (_, client) in clients.drain() {
            client.disconnect().await;
        }
    }
}

impl Default for ExternalServerManager {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_federated_name(full_name: &str) -> Result<(Uuid, String), ManagerError> {
    let rest = full_name
        .strip_prefix(MCP_TOOL_PREFIX)
        .ok_or_else(|| ManagerError::MalformedName(full_name.to_string()))?;
    let (server_id, tool_name) = rest
        .split_once("__")
        .ok_or_else(|| ManagerError::MalformedName(full_name.to_string()))?;
    let server_id = Uuid::parse_str(server_id)
        .map_err(|_| ManagerError::MalformedName(full_name.to_string()))?;
    if tool_name.is_empty() {
        return Err(ManagerError::MalformedName(full_name.to_string()));
    }
    Ok((server_id, tool_name.to_string()))
}

fn default_store_path() -> PathBuf {
    std::env::current_dir()
        .unwrap_or_else(|e| {
            error!("failed to resolve current dir: {e}");
            PathBuf::from(".")
        })
        .join(SERVERS_FILE)
}
