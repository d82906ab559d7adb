use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use sinalux_records::{AuditAction, AuditEntry};

/// Who is acting. Passed into every operation that records an audit entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionContext {
    pub user_id: String,
    pub organization_id: Option<String>,
}

impl SessionContext {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            organization_id: None,
        }
    }

    pub fn with_organization(mut self, organization_id: impl Into<String>) -> Self {
        self.organization_id = Some(organization_id.into());
        self
    }

    /// Builds an entry without id or timestamp; both are filled in when the
    /// entry is recorded. The derived id includes that recording time, so
    /// retries only collapse when built with [`SessionContext::audit_entry_at`].
    pub fn audit_entry(
        &self,
        action: AuditAction,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        summary: impl Into<String>,
    ) -> AuditEntry {
        AuditEntry {
            audit_id: String::new(),
            created_at: None,
            actor_user_id: self.user_id.clone(),
            organization_id: self.organization_id.clone(),
            action,
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            summary: summary.into(),
            diff: Value::Null,
            context: Value::Null,
        }
    }

    /// Same as `audit_entry`, pinned to the time the event happened.
    pub fn audit_entry_at(
        &self,
        at: DateTime<Utc>,
        action: AuditAction,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        summary: impl Into<String>,
    ) -> AuditEntry {
        let mut entry = self.audit_entry(action, entity_type, entity_id, summary);
        entry.created_at = Some(at);
        entry
    }
}

/// Deterministic id for an audit event, so a retried call with the same
/// actor, action, entity and timestamp maps onto the same stored entry.
pub fn derive_audit_id(entry: &AuditEntry, at: DateTime<Utc>) -> String {
    let stamp = at.to_rfc3339_opts(SecondsFormat::Micros, true);
    let mut hasher = blake3::Hasher::new();
    for part in [
        entry.actor_user_id.as_str(),
        entry.action.as_str(),
        entry.entity_type.as_str(),
        entry.entity_id.as_str(),
        stamp.as_str(),
    ] {
        hasher.update(part.as_bytes());
        hasher.update(&[0x1f]);
    }
    let hex = hasher.finalize().to_hex();
    format!("aud_{}", &hex.as_str()[..32])
}
