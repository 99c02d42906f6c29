//! Key-value and queue tools, backed by an in-process store standing in for
//! the configured cache (`ToolContext::redis`). The real client is an
//! external collaborator behind this uniform interface.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use agentry_core::{Role, ToolSpec};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::{roles_at_or_above, Tool, ToolContext};

#[derive(Default)]
pub struct KvStore {
    entries: HashMap<String, Value>,
    queues: HashMap<String, VecDeque<Value>>,
}

pub fn new_store() -> Arc<Mutex<KvStore>> {
    Arc::new(Mutex::new(KvStore::default()))
}

pub struct KvGetTool {
    store: Arc<Mutex<KvStore>>,
}

impl KvGetTool {
    pub fn new(store: Arc<Mutex<KvStore>>) -> Self {
        KvGetTool { store }
    }
}

#[async_trait]
impl Tool for KvGetTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "kv_get".to_string(),
            description: "Read a value from the key-value cache.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {"key": {"type": "string"}},
                "required": ["key"]
            }),
            required_roles: roles_at_or_above(Role::Readonly),
            safe_for_production: true,
        }
    }

    async fn run(&self, args: &HashMap<String, Value>, ctx: &ToolContext) -> Result<Value> {
        let key = args
            .get("key")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("missing required param: key"))?;
        let store = self.store.lock().expect("kv store lock");
        Ok(json!({
            "cache_db": ctx.redis.db,
            "key": key,
            "value": store.entries.get(key).cloned(),
        }))
    }
}

pub struct KvSetTool {
    store: Arc<Mutex<KvStore>>,
}

impl KvSetTool {
    pub fn new(store: Arc<Mutex<KvStore>>) -> Self {
        KvSetTool { store }
    }
}

#[async_trait]
impl Tool for KvSetTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "kv_set".to_string(),
            description: "Write a value into the key-value cache.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {"key": {"type": "string"}, "value": {}},
                "required": ["key", "value"]
            }),
            required_roles: roles_at_or_above(Role::Dev),
            safe_for_production: false,
        }
    }

    async fn run(&self, args: &HashMap<String, Value>, _ctx: &ToolContext) -> Result<Value> {
        let key = args
            .get("key")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("missing required param: key"))?;
        let value = args
            .get("value")
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("missing required param: value"))?;
        let mut store = self.store.lock().expect("kv store lock");
        store.entries.insert(key.to_string(), value);
        Ok(json!({"key": key, "set": true}))
    }
}

pub struct KvDeleteTool {
    store: Arc<Mutex<KvStore>>,
}

impl KvDeleteTool {
    pub fn new(store: Arc<Mutex<KvStore>>) -> Self {
        KvDeleteTool { store }
    }
}

#[async_trait]
impl Tool for KvDeleteTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "kv_delete".to_string(),
            description: "Delete a key from the key-value cache.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {"key": {"type": "string"}},
                "required": ["key"]
            }),
            required_roles: roles_at_or_above(Role::Dev),
            safe_for_production: false,
        }
    }

    async fn run(&self, args: &HashMap<String, Value>, _ctx: &ToolContext) -> Result<Value> {
        let key = args
            .get("key")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("missing required param: key"))?;
        let mut store = self.store.lock().expect("kv store lock");
        let removed = store.entries.remove(key).is_some();
        Ok(json!({"key": key, "removed": removed}))
    }
}

pub struct QueuePushTool {
    store: Arc<Mutex<KvStore>>,
}

impl QueuePushTool {
    pub fn new(store: Arc<Mutex<KvStore>>) -> Self {
        QueuePushTool { store }
    }
}

#[async_trait]
impl Tool for QueuePushTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "queue_push".to_string(),
            description: "Push a value onto the back of a named queue.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {"queue": {"type": "string"}, "value": {}},
                "required": ["queue", "value"]
            }),
            required_roles: roles_at_or_above(Role::Dev),
            safe_for_production: false,
        }
    }

    async fn run(&self, args: &HashMap<String, Value>, _ctx: &ToolContext) -> Result<Value> {
        let queue = args
            .get("queue")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("missing required param: queue"))?;
        let value = args
            .get("value")
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("missing required param: value"))?;
        let mut store = self.store.lock().expect("kv store lock");
        let q = store.queues.entry(queue.to_string()).or_default();
        q.push_back(value);
        Ok(json!({"queue": queue, "length": q.len()}))
    }
}

pub struct QueuePopTool {
    store: Arc<Mutex<KvStore>>,
}

impl QueuePopTool {
    pub fn new(store: Arc<Mutex<KvStore>>) -> Self {
        QueuePopTool { store }
    }
}

#[async_trait]
impl Tool for QueuePopTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "queue_pop".to_string(),
            description: "Pop a value from the front of a named queue.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {"queue": {"type": "string"}},
                "required": ["queue"]
            }),
            required_roles: roles_at_or_above(Role::Dev),
            safe_for_production: false,
        }
    }

    async fn run(&self, args: &HashMap<String, Value>, _ctx: &ToolContext) -> Result<Value> {
        let queue = args
            .get("queue")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("missing required param: queue"))?;
        let mut store = self.store.lock().expect("kv store lock");
        let popped = store.queues.get_mut(queue).and_then(|q| q.pop_front());
        Ok(json!({"queue": queue, "value": popped}))
    }
}
