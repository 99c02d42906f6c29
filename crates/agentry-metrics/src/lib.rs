//! In-memory counters per tool and per session, snapshotted on demand.
//! Many concurrent writers, one reader per snapshot — guarded by a lock
//! rather than split into atomics, since every update touches more than
//! one field at once.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const RECENT_SESSIONS_CAP: usize = 50;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ToolCounter {
    pub count: u64,
    pub successes: u64,
    pub errors: u64,
    pub total_duration_ms: i64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct OverallCounters {
    pub total_requests: u64,
    pub total_tool_calls: u64,
    pub total_duration_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemMetrics {
    pub tools: HashMap<String, ToolCounter>,
    pub overall: OverallCounters,
    pub recent_sessions: Vec<Uuid>,
}

struct Inner {
    tools: HashMap<String, ToolCounter>,
    overall: OverallCounters,
    recent_sessions: LruCache<Uuid, ()>,
}

impl Default for Inner {
    fn default() -> Self {
        Inner {
            tools: HashMap::new(),
            overall: OverallCounters::default(),
            recent_sessions: LruCache::new(NonZeroUsize::new(RECENT_SESSIONS_CAP).unwrap()),
        }
    }
}

pub struct MetricsStore {
    inner: Mutex<Inner>,
}

impl MetricsStore {
    pub fn new() -> Self {
        MetricsStore { inner: Mutex::new(Inner::default()) }
    }

    pub fn record_request(&self) {
        let mut inner = self.inner.lock().expect("metrics lock poisoned");
        inner.overall.total_requests += 1;
    }

    pub fn record_tool_call(&self, tool_name: &str, success: bool, duration_ms: i64) {
        let mut inner = self.inner.lock().expect("metrics lock poisoned");
        let counter = inner.tools.entry(tool_name.to_string()).or_default();
        counter.count += 1;
        counter.total_duration_ms += duration_ms;
        if success {
            counter.successes += 1;
        } else {
            counter.errors += 1;
        }
        inner.overall.total_tool_calls += 1;
        inner.overall.total_duration_ms += duration_ms;
    }

    /// Marks a session id as recently active. The list caps at 50; the
    /// least-recently-touched session is evicted first.
    pub fn touch_session(&self, session_id: Uuid) {
        let mut inner = self.inner.lock().expect("metrics lock poisoned");
        inner.recent_sessions.put(session_id, ());
    }

    pub fn snapshot(&self) -> SystemMetrics {
        let inner = self.inner.lock().expect("metrics lock poisoned");
        SystemMetrics {
            tools: inner.tools.clone(),
            overall: inner.overall,
            recent_sessions: inner.recent_sessions.iter().map(|(id, _)| *id).collect(),
        }
    }

    pub fn reset(&self) {
        let mut inner = self.inner.lock().expect("metrics lock poisoned");
        *inner = Inner::default();
    }
}

impl Default for MetricsStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_call_counters_accumulate() {
        let metrics = MetricsStore::new();
        metrics.record_tool_call("read_file", true, 10);
        metrics.record_tool_call("read_file", false, 5);

        let snapshot = metrics.snapshot();
        let counter = snapshot.tools.get("read_file").unwrap();
        assert_eq!(counter.count, 2);
        assert_eq!(counter.successes, 1);
        assert_eq!(counter.errors, 1);
        assert_eq!(counter.total_duration_ms, 15);
        assert_eq!(snapshot.overall.total_tool_calls, 2);
    }

    #[test]
    fn recent_sessions_caps_at_fifty() {
        let metrics = MetricsStore::new();
        for _ in 0..60 {
            metrics.touch_session(Uuid::new_v4());
        }
        assert_eq!(metrics.snapshot().recent_sessions.len(), 50);
    }

    #[test]
    fn reset_clears_every_counter() {
        let metrics = MetricsStore::new();
        metrics.record_request();
        metrics.record_tool_call("write_file", true, 1);
        metrics.touch_session(Uuid::new_v4());

        metrics.reset();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.overall.total_requests, 0);
        assert!(snapshot.tools.is_empty());
        assert!(snapshot.recent_sessions.is_empty());
    }
}
