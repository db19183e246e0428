//! Prometheus metrics for the messaging core
//!
//! Tracks throughput of the realtime surface: messages committed, events
//! fanned out, live WebSocket sessions. Exposed on `/metrics`.

use lazy_static::lazy_static;
use prometheus::{opts, Encoder, IntCounter, IntGauge, Registry, TextEncoder};

lazy_static! {
    /// Global metrics instance
    pub static ref CHAT_METRICS: ChatMetrics = ChatMetrics::new();
}

#[derive(Clone)]
pub struct ChatMetrics {
    /// Messages committed to conversation logs
    pub messages_sent: IntCounter,
    /// Events pushed to conversation/user channels
    pub events_broadcast: IntCounter,
    /// Currently connected WebSocket sessions
    pub ws_connections: IntGauge,

    registry: Registry,
}

impl ChatMetrics {
    pub fn new() -> Self {
        let messages_sent = IntCounter::with_opts(opts!(
            "messaging_messages_sent_total",
            "Messages committed to conversation logs"
        ))
        .expect("failed to create messages_sent metric");

        let events_broadcast = IntCounter::with_opts(opts!(
            "messaging_events_broadcast_total",
            "Events pushed to conversation and user channels"
        ))
        .expect("failed to create events_broadcast metric");

        let ws_connections = IntGauge::with_opts(opts!(
            "messaging_ws_connections",
            "Currently connected WebSocket sessions"
        ))
        .expect("failed to create ws_connections metric");

        let registry = Registry::new();
        registry
            .register(Box::new(messages_sent.clone()))
            .expect("register messages_sent");
        registry
            .register(Box::new(events_broadcast.clone()))
            .expect("register events_broadcast");
        registry
            .register(Box::new(ws_connections.clone()))
            .expect("register ws_connections");

        Self {
            messages_sent,
            events_broadcast,
            ws_connections,
            registry,
        }
    }

    /// Render the registry in the Prometheus text exposition format.
    pub fn gather(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            tracing::error!(error = %e, "failed to encode metrics");
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl Default for ChatMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_render() {
        let metrics = ChatMetrics::new();
        metrics.messages_sent.inc();
        metrics.ws_connections.set(2);
        let exposition = metrics.gather();
        assert!(exposition.contains("messaging_messages_sent_total 1"));
        assert!(exposition.contains("messaging_ws_connections 2"));
    }
}
