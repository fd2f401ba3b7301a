//! Event broadcast for reconciliation observability.
//!
//! The scheduler publishes a JSON line per noteworthy reconciliation
//! outcome (state observed, promotion succeeded/failed). Consumers attach
//! via `subscribe`; a slow consumer lags rather than blocking reconciles.

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tokio::sync::broadcast;
use tracing::warn;

const DEFAULT_BUFFER: usize = 256;

/// Event names emitted by the reconcile loop.
pub mod names {
    pub const STATE_OBSERVED: &str = "state_observed";
    pub const PROMOTION_SUCCEEDED: &str = "promotion_succeeded";
    pub const RECONCILE_FAILED: &str = "reconcile_failed";
}

/// Broadcast channel for reconciliation events (JSON lines).
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<String>,
}

impl EventBus {
    /// Create a new event bus with the provided buffer size.
    ///
    /// The effective buffer is clamped to at least `DEFAULT_BUFFER` so
    /// bursts of per-Environment events do not immediately lag consumers.
    pub fn new(buffer: usize) -> Self {
        let buffer = buffer.max(1).max(DEFAULT_BUFFER);
        let (sender, _) = broadcast::channel(buffer);
        Self { sender }
    }

    /// Subscribe to the event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.sender.subscribe()
    }

    /// Emit a structured event for one Environment.
    pub fn emit<T: Serialize>(&self, event: &str, environment: &str, data: &T) {
        let payload = json!({
            "event": event,
            "environment": environment,
            "data": data,
            "timestamp": Utc::now().to_rfc3339(),
        });
        match serde_json::to_string(&payload) {
            Ok(serialized) => {
                let _ = self.sender.send(serialized);
            }
            Err(err) => warn!("Failed to serialize event {}: {}", event, err),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn emit_sends_json_with_event_environment_and_timestamp() {
        let bus = EventBus::new(1);
        let mut rx = bus.subscribe();

        bus.emit(names::STATE_OBSERVED, "apps/prod", &json!({ "state_id": "abc" }));

        let msg = tokio::time::timeout(Duration::from_millis(50), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("broadcast recv failed");

        let parsed: serde_json::Value = serde_json::from_str(&msg).expect("invalid json");
        assert_eq!(parsed["event"], names::STATE_OBSERVED);
        assert_eq!(parsed["environment"], "apps/prod");
        assert_eq!(parsed["data"]["state_id"], "abc");
        let ts = parsed["timestamp"].as_str().expect("timestamp should be string");
        chrono::DateTime::parse_from_rfc3339(ts).expect("timestamp should be RFC3339");
    }

    #[tokio::test]
    async fn new_clamps_small_buffers_to_default_capacity() {
        let bus = EventBus::new(1);
        let mut rx = bus.subscribe();

        for idx in 0..DEFAULT_BUFFER {
            bus.sender.send(idx.to_string()).unwrap();
        }

        let first = rx.recv().await.expect("recv should not lag");
        assert_eq!(first, "0");
    }
}
