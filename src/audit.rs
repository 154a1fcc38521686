//! Audit trail hook for lifecycle calls.

use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEntry {
    pub actor: String,
    pub action: String,
    pub entity: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<Value>,
}

impl AuditEntry {
    pub fn new(actor: impl Into<String>, action: impl Into<String>, entity: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            action: action.into(),
            entity: entity.into(),
            before: None,
            after: None,
        }
    }

    /// What the caller asked for, recorded before the operation runs.
    pub fn before(mut self, value: Value) -> Self {
        self.before = Some(value);
        self
    }

    pub fn after(mut self, value: Value) -> Self {
        self.after = Some(value);
        self
    }
}

/// Fire-and-forget recorder. Implementations must not block or fail the caller.
pub trait AuditSink: Send + Sync {
    fn record(&self, entry: AuditEntry);
}

/// Writes audit entries as structured log events on the `audit` target.
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, entry: AuditEntry) {
        let payload = |v: &Option<Value>| v.as_ref().map(Value::to_string).unwrap_or_default();
        tracing::info!(
            target: "audit",
            actor = %entry.actor,
            action = %entry.action,
            entity = %entry.entity,
            before = %payload(&entry.before),
            after = %payload(&entry.after),
            "audit"
        );
    }
}
