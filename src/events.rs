use chrono::Utc;
use serde_json::Value;
use tokio::sync::broadcast;

/// Broadcasts run-lifecycle notifications to all subscribed consumers
/// (test harnesses, a future IDE bridge, the CLI's verbose stream).
#[derive(Clone)]
pub struct EventBroadcaster {
    tx: broadcast::Sender<String>,
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBroadcaster {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1024);
        Self { tx }
    }

    /// Send a notification to all subscribers.
    ///
    /// Examples:
    ///   broadcaster.broadcast("run.stdout", json!({ "runId": id, "line": line }));
    pub fn broadcast(&self, event: &str, params: Value) {
        let notification = serde_json::json!({
            "event": event,
            "params": params,
            "ts": Utc::now().to_rfc3339(),
        });
        // Ignore errors — no subscribers is fine
        let _ = self
            .tx
            .send(serde_json::to_string(&notification).unwrap_or_default());
    }

    /// Subscribe to all broadcast events.
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }
}
