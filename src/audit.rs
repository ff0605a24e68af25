//! Audit trail of gateway decisions.
//!
//! Sinks are fire-and-forget: `record` never blocks the request and never
//! reports failure to the caller.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

/// Outcome recorded for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    Success,
    Failure,
}

/// One terminal request outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub device_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_method: Option<String>,
    pub ip_address: String,
    pub action: String,
    pub resource: String,
    pub status: AuditStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// Writes each event to the `audit` log target.
#[derive(Debug, Default, Clone)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        let details = event.details.as_ref().map(|d| d.to_string());
        tracing::info!(
            target: "audit",
            device_id = %event.device_id,
            action = %event.action,
            resource = %event.resource,
            status = ?event.status,
            ip = %event.ip_address,
            request_id = event.request_id.as_deref().unwrap_or("-"),
            details = details.as_deref().unwrap_or("-"),
            "audit"
        );
    }
}

/// Appends events as JSON lines from a background task.
#[derive(Debug, Clone)]
pub struct JsonLinesAuditSink {
    tx: mpsc::UnboundedSender<AuditEvent>,
}

impl JsonLinesAuditSink {
    /// Start the writer task. Must be called inside a Tokio runtime.
    pub fn spawn(path: PathBuf) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(write_events(path, rx));
        Self { tx }
    }
}

impl AuditSink for JsonLinesAuditSink {
    fn record(&self, event: AuditEvent) {
        let _ = self.tx.send(event);
    }
}

async fn write_events(path: PathBuf, mut rx: mpsc::UnboundedReceiver<AuditEvent>) {
    let mut file = match tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .await
    {
        Ok(file) => file,
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "Cannot open audit log, falling back to tracing");
            while let Some(event) = rx.recv().await {
                TracingAuditSink.record(event);
            }
            return;
        }
    };

    tracing::info!(path = %path.display(), "Audit log opened");
    while let Some(event) = rx.recv().await {
        let mut line = match serde_json::to_vec(&event) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize audit event");
                continue;
            }
        };
        line.push(b'\n');
        if let Err(e) = file.write_all(&line).await {
            tracing::warn!(error = %e, "Failed to write audit event");
            continue;
        }
        if let Err(e) = file.flush().await {
            tracing::warn!(error = %e, "Failed to flush audit log");
        }
    }
}

/// Keeps events in memory. Used by tests and embedding callers.
#[derive(Debug, Default, Clone)]
pub struct MemoryAuditSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: AuditEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn event(action: &str) -> AuditEvent {
        AuditEvent {
            timestamp: Utc::now(),
            request_id: None,
            device_id: "unknown".into(),
            auth_method: None,
            ip_address: "0.0.0.0".into(),
            action: action.into(),
            resource: "acme/tool".into(),
            status: AuditStatus::Success,
            details: None,
        }
    }

    #[test]
    fn test_event_serialization() {
        let json = serde_json::to_value(event("list_releases")).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["action"], "list_releases");
        assert!(json.get("details").is_none());
    }

    #[tokio::test]
    async fn test_json_lines_sink_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let sink = JsonLinesAuditSink::spawn(path.clone());
        sink.record(event("list_releases"));
        sink.record(event("download_asset"));

        let mut lines = Vec::new();
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            lines = std::fs::read_to_string(&path)
                .unwrap_or_default()
                .lines()
                .map(str::to_string)
                .collect();
            if lines.len() == 2 {
                break;
            }
        }
        assert_eq!(lines.len(), 2);
        let second: serde_json::Value = serde_json::from_str(&lines[1]).unwrap();
        assert_eq!(second["action"], "download_asset");
    }

    #[test]
    fn test_memory_sink() {
        let sink = MemoryAuditSink::new();
        sink.record(event("a"));
        assert_eq!(sink.events().len(), 1);
    }
}
