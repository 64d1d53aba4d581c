//! Lifecycle event sink trait and implementations.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::error::ClientError;

/// Trait for publishing order lifecycle events.
///
/// Publication is best-effort: callers log failures and move on, never
/// rolling back committed work because a publish failed.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(
        &self,
        event_type: &str,
        payload: serde_json::Value,
    ) -> Result<(), ClientError>;
}

/// Event sink used when no sink is configured; drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventSink;

#[async_trait]
impl EventSink for NoopEventSink {
    async fn publish(
        &self,
        _event_type: &str,
        _payload: serde_json::Value,
    ) -> Result<(), ClientError> {
        Ok(())
    }
}

#[derive(Debug, Default)]
struct InMemoryEventSinkState {
    published: Vec<(String, serde_json::Value)>,
    fail_on_publish: bool,
}

/// In-memory event sink for testing; records every published event.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEventSink {
    state: Arc<RwLock<InMemoryEventSinkState>>,
}

impl InMemoryEventSink {
    /// Creates a new in-memory event sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the sink to fail on publish.
    pub fn set_fail_on_publish(&self, fail: bool) {
        self.state.write().unwrap().fail_on_publish = fail;
    }

    /// Returns all published events in publication order.
    pub fn published(&self) -> Vec<(String, serde_json::Value)> {
        self.state.read().unwrap().published.clone()
    }

    /// Returns the event types published so far.
    pub fn event_types(&self) -> Vec<String> {
        self.state
            .read()
            .unwrap()
            .published
            .iter()
            .map(|(t, _)| t.clone())
            .collect()
    }
}

#[async_trait]
impl EventSink for InMemoryEventSink {
    async fn publish(
        &self,
        event_type: &str,
        payload: serde_json::Value,
    ) -> Result<(), ClientError> {
        let mut state = self.state.write().unwrap();
        if state.fail_on_publish {
            return Err(ClientError::Unavailable("event sink unreachable".to_string()));
        }
        state.published.push((event_type.to_string(), payload));
        Ok(())
    }
}
