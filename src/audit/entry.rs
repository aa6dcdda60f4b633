//! Audit Events
//!
//! Event types, the immutable event record handed to callers, and the raw
//! persisted row the chain integrity engine walks.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::error::AuditError;

/// Governance activity recorded in the audit log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    RiskAssessment,
    ComplianceCheck,
    ModelCardGenerated,
    PolicyUpdate,
    IncidentReport,
    ReviewCompleted,
    ApprovalGranted,
    ApprovalDenied,
    SystemRegistered,
    SystemDecommissioned,
}

impl EventType {
    pub const ALL: [EventType; 10] = [
        EventType::RiskAssessment,
        EventType::ComplianceCheck,
        EventType::ModelCardGenerated,
        EventType::PolicyUpdate,
        EventType::IncidentReport,
        EventType::ReviewCompleted,
        EventType::ApprovalGranted,
        EventType::ApprovalDenied,
        EventType::SystemRegistered,
        EventType::SystemDecommissioned,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::RiskAssessment => "risk_assessment",
            EventType::ComplianceCheck => "compliance_check",
            EventType::ModelCardGenerated => "model_card_generated",
            EventType::PolicyUpdate => "policy_update",
            EventType::IncidentReport => "incident_report",
            EventType::ReviewCompleted => "review_completed",
            EventType::ApprovalGranted => "approval_granted",
            EventType::ApprovalDenied => "approval_denied",
            EventType::SystemRegistered => "system_registered",
            EventType::SystemDecommissioned => "system_decommissioned",
        }
    }

    /// Sorted, comma-separated list of every accepted type name
    pub fn valid_list() -> String {
        let mut names: Vec<&str> = Self::ALL.iter().map(EventType::as_str).collect();
        names.sort_unstable();
        names.join(", ")
    }
}

impl FromStr for EventType {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| AuditError::InvalidEventType(s.to_string()))
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A committed audit event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub event_type: EventType,
    pub system_name: String,
    pub actor: String,
    pub details: Map<String, Value>,
    pub checksum: String,
}

impl AuditEvent {
    /// Get a human-readable summary
    pub fn summary(&self) -> String {
        format!(
            "#{} [{}] {} - {} by {}",
            self.id,
            format_timestamp(&self.timestamp),
            self.event_type,
            self.system_name,
            self.actor
        )
    }
}

/// One row of the `audit_log` table, exactly as stored.
///
/// Every column is kept verbatim so that verification hashes what is on disk,
/// including values that no longer parse.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct StoredRecord {
    pub id: i64,
    pub timestamp: String,
    pub event_type: String,
    pub system_name: String,
    pub actor: String,
    pub details: String,
    pub prev_checksum: Option<String>,
    pub checksum: String,
}

impl TryFrom<StoredRecord> for AuditEvent {
    type Error = AuditError;

    fn try_from(record: StoredRecord) -> Result<Self, Self::Error> {
        let timestamp = DateTime::parse_from_rfc3339(&record.timestamp)
            .map_err(|e| AuditError::corrupt_record(record.id, e))?
            .with_timezone(&Utc);
        let event_type = record
            .event_type
            .parse()
            .map_err(|e| AuditError::corrupt_record(record.id, e))?;
        let details = match serde_json::from_str(&record.details) {
            Ok(Value::Object(map)) => map,
            Ok(other) => {
                return Err(AuditError::corrupt_record(
                    record.id,
                    format!("details is not an object: {}", other),
                ))
            }
            Err(e) => return Err(AuditError::corrupt_record(record.id, e)),
        };

        Ok(Self {
            id: record.id,
            timestamp,
            event_type,
            system_name: record.system_name,
            actor: record.actor,
            details,
            checksum: record.checksum,
        })
    }
}

/// Filters for querying the log; unset fields match everything
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventFilter {
    pub system_name: Option<String>,
    pub event_type: Option<EventType>,
    pub since: Option<DateTime<Utc>>,
}

impl EventFilter {
    pub fn for_system(mut self, system_name: impl Into<String>) -> Self {
        self.system_name = Some(system_name.into());
        self
    }

    pub fn of_type(mut self, event_type: EventType) -> Self {
        self.event_type = Some(event_type);
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }
}

/// Render a timestamp the way it is stored and chained: UTC, microseconds, `Z`
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Serialize a JSON value compactly with object keys sorted at every level.
///
/// Separators are `,` and `:` with no spaces, so the bytes differ from
/// `", "` / `": "` style sorted dumps. Verification hashes the stored text, so
/// logs written either way still verify.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));

            out.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(item, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
