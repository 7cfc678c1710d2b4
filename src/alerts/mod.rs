// Alert records and delivery
use crate::models::Severity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Immutable notification produced by the breakers or the drift guard
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Alert {
    pub id: String,
    /// Component that raised it ("drift_guard", "api_breaker", "EMERGENCY", ...)
    pub source: String,
    /// Status of the source at the time of the alert
    pub status: String,
    pub severity: Severity,
    pub message: String,
    pub metrics: serde_json::Value,
    pub recommended_action: String,
    pub timestamp: DateTime<Utc>,
}

impl Alert {
    pub fn new(
        source: impl Into<String>,
        status: impl Into<String>,
        severity: Severity,
        message: impl Into<String>,
        recommended_action: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let mut id = Uuid::new_v4().simple().to_string();
        id.truncate(8);

        Self {
            id,
            source: source.into(),
            status: status.into(),
            severity,
            message: message.into(),
            metrics: serde_json::Value::Null,
            recommended_action: recommended_action.into(),
            timestamp,
        }
    }

    /// Attach a metrics snapshot; unserializable input leaves `Null`
    pub fn with_metrics<T: Serialize>(mut self, metrics: &T) -> Self {
        self.metrics = serde_json::to_value(metrics).unwrap_or(serde_json::Value::Null);
        self
    }
}

/// Receives alerts (Telegram, voice, webhooks live behind this)
pub trait AlertSink: Send + Sync {
    fn deliver(&self, alert: &Alert) -> anyhow::Result<()>;
}

impl<F> AlertSink for F
where
    F: Fn(&Alert) -> anyhow::Result<()> + Send + Sync,
{
    fn deliver(&self, alert: &Alert) -> anyhow::Result<()> {
        self(alert)
    }
}

/// Writes alerts to the tracing log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl AlertSink for LogSink {
    fn deliver(&self, alert: &Alert) -> anyhow::Result<()> {
        match alert.severity {
            Severity::Critical | Severity::High => tracing::error!(
                alert_id = %alert.id,
                source = %alert.source,
                severity = %alert.severity,
                action = %alert.recommended_action,
                "{}",
                alert.message
            ),
            Severity::Medium => tracing::warn!(
                alert_id = %alert.id,
                source = %alert.source,
                "{}",
                alert.message
            ),
            Severity::Low => tracing::info!(
                alert_id = %alert.id,
                source = %alert.source,
                "{}",
                alert.message
            ),
        }
        Ok(())
    }
}

/// Forwards alerts to an async consumer
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Alert>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Alert>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl AlertSink for ChannelSink {
    fn deliver(&self, alert: &Alert) -> anyhow::Result<()> {
        self.tx
            .send(alert.clone())
            .map_err(|_| anyhow::anyhow!("alert channel closed"))
    }
}

struct HubInner {
    sinks: Vec<Arc<dyn AlertSink>>,
    history: VecDeque<Alert>,
}

/// Thread-safe alert fan-out with a bounded history
///
/// Clones share the same sinks and history.
#[derive(Clone)]
pub struct AlertHub {
    inner: Arc<RwLock<HubInner>>,
    capacity: usize,
}

impl AlertHub {
    /// # Arguments
    /// * `capacity` - Number of alerts kept in history (oldest dropped first)
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HubInner {
                sinks: Vec::new(),
                history: VecDeque::with_capacity(capacity),
            })),
            capacity: capacity.max(1),
        }
    }

    pub fn register(&self, sink: Arc<dyn AlertSink>) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.sinks.push(sink);
    }

    /// Store the alert and hand it to every sink
    ///
    /// Sink failures are logged and otherwise ignored.
    pub fn publish(&self, alert: Alert) {
        let sinks = {
            let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
            inner.history.push_back(alert.clone());
            while inner.history.len() > self.capacity {
                inner.history.pop_front();
            }
            inner.sinks.clone()
        };

        for sink in sinks {
            if let Err(e) = sink.deliver(&alert) {
                tracing::warn!(alert_id = %alert.id, "Alert delivery failed: {}", e);
            }
        }
    }

    /// All retained alerts, oldest first
    pub fn history(&self) -> Vec<Alert> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.history.iter().cloned().collect()
    }

    /// The `n` most recent alerts, oldest first
    pub fn recent(&self, n: usize) -> Vec<Alert> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        let skip = inner.history.len().saturating_sub(n);
        inner.history.iter().skip(skip).cloned().collect()
    }

    pub fn latest(&self) -> Option<Alert> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.history.back().cloned()
    }

    pub fn len(&self) -> usize {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for AlertHub {
    fn default() -> Self {
        Self::new(20)
    }
}
