//! Environment-driven runtime configuration.
//!
//! Every key is optional; each carries the default called out in the
//! external interface contract. Nothing is read from a config file — the
//! process environment is the single source of truth, loaded once at
//! startup via [`AppConfig::load`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: String::new(),
            name: "agentry".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub password: String,
    pub db: u8,
}

impl Default for RedisConfig {
    fn default() -> Self {
        RedisConfig {
            host: "localhost".to_string(),
            port: 6379,
            password: String::new(),
            db: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub context_length: u32,
    pub timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        LlmConfig {
            base_url: "http://localhost:11434".to_string(),
            model: "llama3.1".to_string(),
            temperature: 0.1,
            context_length: 4096,
            timeout_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub port: u16,
    pub node_env: String,
    pub production_safe_mode: bool,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub llm: LlmConfig,
    pub fs_allowed_path: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            port: 4000,
            node_env: "development".to_string(),
            production_safe_mode: false,
            database: DatabaseConfig::default(),
            redis: RedisConfig::default(),
            llm: LlmConfig::default(),
            fs_allowed_path: std::env::current_dir()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|_| ".".to_string()),
        }
    }
}

impl AppConfig {
    /// Load from the real process environment.
    pub fn load() -> Self {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_env_map(&vars)
    }

    /// Load from an explicit map, used directly by tests so assertions never
    /// depend on mutating the real process environment.
    pub fn from_env_map(vars: &HashMap<String, String>) -> Self {
        let mut cfg = AppConfig::default();

        if let Some(v) = get_parsed(vars, "PORT") {
            cfg.port = v;
        }
        if let Some(v) = vars.get("NODE_ENV") {
            cfg.node_env = v.clone();
        }
        if let Some(v) = get_bool(vars, "PRODUCTION_SAFE_MODE") {
            cfg.production_safe_mode = v;
        }

        if let Some(v) = vars.get("DB_HOST") {
            cfg.database.host = v.clone();
        }
        if let Some(v) = get_parsed(vars, "DB_PORT") {
            cfg.database.port = v;
        }
        if let Some(v) = vars.get("DB_USER") {
            cfg.database.user = v.clone();
        }
        if let Some(v) = vars.get("DB_PASSWORD") {
            cfg.database.password = v.clone();
        }
        if let Some(v) = vars.get("DB_NAME") {
            cfg.database.name = v.clone();
        }

        if let Some(v) = vars.get("REDIS_HOST") {
            cfg.redis.host = v.clone();
        }
        if let Some(v) = get_parsed(vars, "REDIS_PORT") {
            cfg.redis.port = v;
        }
        if let Some(v) = vars.get("REDIS_PASSWORD") {
            cfg.redis.password = v.clone();
        }
        if let Some(v) = get_parsed(vars, "REDIS_DB") {
            cfg.redis.db = v;
        }

        if let Some(v) = vars.get("LLM_BASE_URL") {
            cfg.llm.base_url = v.clone();
        }
        if let Some(v) = vars.get("LLM_MODEL") {
            cfg.llm.model = v.clone();
        }
        if let Some(v) = get_parsed(vars, "LLM_TEMPERATURE") {
            cfg.llm.temperature = v;
        }
        if let Some(v) = get_parsed(vars, "LLM_CONTEXT_LENGTH") {
            cfg.llm.context_length = v;
        }
        if let Some(v) = get_parsed(vars, "LLM_TIMEOUT_MS") {
            cfg.llm.timeout_ms = v;
        }

        if let Some(v) = vars.get("FS_ALLOWED_PATH") {
            cfg.fs_allowed_path = v.clone();
        }

        cfg
    }

    pub fn is_production(&self) -> bool {
        self.node_env == "production"
    }
}

fn get_parsed<T: std::str::FromStr>(vars: &HashMap<String, String>, key: &str) -> Option<T> {
    vars.get(key).and_then(|v| v.parse().ok())
}

fn get_bool(vars: &HashMap<String, String>, key: &str) -> Option<bool> {
    vars.get(key)
        .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "yes"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.port, 4000);
        assert_eq!(cfg.node_env, "development");
        assert!(!cfg.production_safe_mode);
        assert_eq!(cfg.llm.base_url, "http://localhost:11434");
        assert_eq!(cfg.llm.model, "llama3.1");
        assert_eq!(cfg.llm.timeout_ms, 60_000);
    }

    #[test]
    fn env_map_overrides_defaults() {
        let mut vars = HashMap::new();
        vars.insert("PORT".to_string(), "8080".to_string());
        vars.insert("PRODUCTION_SAFE_MODE".to_string(), "true".to_string());
        vars.insert("LLM_MODEL".to_string(), "qwen2.5".to_string());
        vars.insert("DB_PORT".to_string(), "6543".to_string());

        let cfg = AppConfig::from_env_map(&vars);
        assert_eq!(cfg.port, 8080);
        assert!(cfg.production_safe_mode);
        assert_eq!(cfg.llm.model, "qwen2.5");
        assert_eq!(cfg.database.port, 6543);
    }

    #[test]
    fn malformed_numeric_env_falls_back_to_default() {
        let mut vars = HashMap::new();
        vars.insert("PORT".to_string(), "not-a-number".to_string());
        let cfg = AppConfig::from_env_map(&vars);
        assert_eq!(cfg.port, 4000);
    }
}
