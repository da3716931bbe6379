//! 可观测性模块:事件上报的外部协作者抽象。
//!
//! # Observability Module
//!
//! The pipeline publishes operational events (cache sweeps, fallback
//! activations, credential changes, health alerts and metric snapshots) to an
//! injected [`ObservabilitySink`]. The runtime never forces a destination:
//! the default is [`NoopSink`].
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`ObservabilitySink`] | Trait for event destinations |
//! | [`NoopSink`] | Default no-op sink |
//! | [`InMemorySink`] | Bounded buffer for testing |
//! | [`ConsoleSink`] | Tracing-backed sink for debugging |
//! | [`CompositeSink`] | Multi-destination fan-out |

use crate::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, PoisonError, RwLock};

/// Destination for operational events.
#[async_trait]
pub trait ObservabilitySink: Send + Sync {
    async fn report(&self, event: &str, data: Value) -> Result<()>;

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Default sink: drops everything.
pub struct NoopSink;

#[async_trait]
impl ObservabilitySink for NoopSink {
    async fn report(&self, _event: &str, _data: Value) -> Result<()> {
        Ok(())
    }
}

pub fn noop_sink() -> Arc<dyn ObservabilitySink> {
    Arc::new(NoopSink)
}

/// Bounded in-memory sink for testing.
pub struct InMemorySink {
    events: RwLock<Vec<(String, Value)>>,
    max_events: usize,
}

impl InMemorySink {
    pub fn new(max_events: usize) -> Self {
        Self {
            events: RwLock::new(Vec::new()),
            max_events,
        }
    }

    pub fn events(&self) -> Vec<(String, Value)> {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn events_named(&self, event: &str) -> Vec<Value> {
        self.events()
            .into_iter()
            .filter(|(e, _)| e == event)
            .map(|(_, d)| d)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.events
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[async_trait]
impl ObservabilitySink for InMemorySink {
    async fn report(&self, event: &str, data: Value) -> Result<()> {
        let mut events = self.events.write().unwrap_or_else(PoisonError::into_inner);
        events.push((event.to_string(), data));
        if events.len() > self.max_events {
            events.remove(0);
        }
        Ok(())
    }
}

/// Tracing-backed sink for debugging.
#[derive(Default)]
pub struct ConsoleSink;

impl ConsoleSink {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ObservabilitySink for ConsoleSink {
    async fn report(&self, event: &str, data: Value) -> Result<()> {
        tracing::info!(event, %data, "observability event");
        Ok(())
    }
}

/// Fan-out to multiple destinations. Individual sink failures are swallowed
/// so one broken destination cannot poison the others.
#[derive(Default)]
pub struct CompositeSink {
    sinks: Vec<Arc<dyn ObservabilitySink>>,
}

impl CompositeSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_sink(mut self, sink: Arc<dyn ObservabilitySink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

#[async_trait]
impl ObservabilitySink for CompositeSink {
    async fn report(&self, event: &str, data: Value) -> Result<()> {
        for sink in &self.sinks {
            let _ = sink.report(event, data.clone()).await;
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        for sink in &self.sinks {
            let _ = sink.close().await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_in_memory_sink_records_in_order() {
        let sink = InMemorySink::new(10);
        sink.report("a", json!({"n": 1})).await.unwrap();
        sink.report("b", json!({"n": 2})).await.unwrap();
        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].0, "a");
        assert_eq!(events[1].1["n"], 2);
    }

    #[tokio::test]
    async fn test_in_memory_sink_is_bounded() {
        let sink = InMemorySink::new(2);
        for i in 0..5 {
            sink.report("e", json!({ "i": i })).await.unwrap();
        }
        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].1["i"], 3);
    }

    #[tokio::test]
    async fn test_composite_fans_out() {
        let a = Arc::new(InMemorySink::new(10));
        let b = Arc::new(InMemorySink::new(10));
        let composite = CompositeSink::new()
            .add_sink(a.clone())
            .add_sink(b.clone());
        composite.report("x", json!({})).await.unwrap();
        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 1);
    }
}
