//! Audit Logger
//!
//! Front door for governance tooling: validates events, chains them onto the
//! log, and answers queries, integrity audits and exports.

use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::audit::checksum::{compute_checksum, ChainInput};
use crate::audit::entry::{canonical_json, AuditEvent, EventFilter, EventType};
use crate::audit::export::render_markdown;
use crate::audit::store::{EventStore, NewRecord};
use crate::audit::verify::{verify_chain, VerificationReport};
use crate::config::AuditConfig;
use crate::error::{AuditError, AuditResult};

pub const DEFAULT_QUERY_LIMIT: u32 = 100;
pub const DEFAULT_EXPORT_LIMIT: u32 = 1000;

/// Tamper-evident audit logger over an [`EventStore`]
#[derive(Clone)]
pub struct AuditLogger {
    store: EventStore,
    query_limit: u32,
    export_limit: u32,
}

impl AuditLogger {
    pub fn new(store: EventStore) -> Self {
        Self {
            store,
            query_limit: DEFAULT_QUERY_LIMIT,
            export_limit: DEFAULT_EXPORT_LIMIT,
        }
    }

    /// Open the store named by the configuration and apply its limits
    pub async fn open(config: &AuditConfig) -> AuditResult<Self> {
        let store = EventStore::open(&config.database_url, &config.store_options()).await?;
        Ok(Self::new(store).with_limits(config.default_query_limit, config.export_limit))
    }

    pub fn with_limits(mut self, query_limit: u32, export_limit: u32) -> Self {
        self.query_limit = query_limit;
        self.export_limit = export_limit;
        self
    }

    pub fn store(&self) -> &EventStore {
        &self.store
    }

    /// Log an event whose type is given by name.
    ///
    /// Unknown names fail with [`AuditError::InvalidEventType`] before anything
    /// is written. `details` must serialize to a JSON object; `()` or `None`
    /// record an empty one.
    pub async fn log_event<D>(
        &self,
        event_type: &str,
        system_name: &str,
        actor: &str,
        details: &D,
    ) -> AuditResult<AuditEvent>
    where
        D: Serialize + ?Sized,
    {
        let event_type: EventType = event_type.parse()?;
        self.record(event_type, system_name, actor, details).await
    }

    /// Log an event, chaining it onto the current tail
    pub async fn record<D>(
        &self,
        event_type: EventType,
        system_name: &str,
        actor: &str,
        details: &D,
    ) -> AuditResult<AuditEvent>
    where
        D: Serialize + ?Sized,
    {
        let details = details_object(details)?;
        let details_json = canonical_json(&Value::Object(details.clone()));

        // Tail read, digest and insert all happen under the session's lock
        let session = self.store.begin_append().await?;
        let timestamp = session.timestamp().to_string();
        let assigned_at = session.assigned_at();
        let prev_checksum = session.last_checksum().map(str::to_string);

        let checksum = compute_checksum(&ChainInput {
            timestamp: &timestamp,
            event_type: event_type.as_str(),
            system_name,
            actor,
            details: &details_json,
            prev_checksum: prev_checksum.as_deref(),
        });

        let id = session
            .append(NewRecord {
                event_type,
                system_name,
                actor,
                details: &details_json,
                prev_checksum: prev_checksum.as_deref(),
                checksum: &checksum,
            })
            .await?;

        let event = AuditEvent {
            id,
            timestamp: assigned_at,
            event_type,
            system_name: system_name.to_string(),
            actor: actor.to_string(),
            details,
            checksum,
        };
        debug!("Logged audit event: {}", event.summary());
        Ok(event)
    }

    /// Matching events, newest first, capped at the configured query limit
    pub async fn get_events(&self, filter: &EventFilter) -> AuditResult<Vec<AuditEvent>> {
        self.store.query(filter, self.query_limit).await
    }

    /// Matching events, newest first, capped at `limit`
    pub async fn query(&self, filter: &EventFilter, limit: u32) -> AuditResult<Vec<AuditEvent>> {
        self.store.query(filter, limit).await
    }

    /// Re-validate every link and checksum in the log.
    ///
    /// A report with `valid == false` is a finding, not an error; the log keeps
    /// accepting appends.
    pub async fn verify_integrity(&self) -> AuditResult<VerificationReport> {
        let records = self.store.iterate_all().await?;
        info!("Verifying audit chain of {} events", records.len());
        Ok(verify_chain(&records))
    }

    /// Markdown report of the most recent events, optionally for one system
    pub async fn export_markdown(&self, system_name: Option<&str>) -> AuditResult<String> {
        let mut filter = EventFilter::default();
        if let Some(system_name) = system_name {
            filter = filter.for_system(system_name);
        }
        let events = self.store.query(&filter, self.export_limit).await?;
        Ok(render_markdown(&events, Utc::now()))
    }

    pub async fn last_checksum(&self) -> AuditResult<Option<String>> {
        self.store.last_checksum().await
    }

    pub async fn count(&self) -> AuditResult<u64> {
        self.store.count().await
    }

    pub async fn close(&self) {
        self.store.close().await;
    }
}

fn details_object<D>(details: &D) -> AuditResult<Map<String, Value>>
where
    D: Serialize + ?Sized,
{
    match serde_json::to_value(details)? {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => Err(AuditError::InvalidDetails(format!(
            "expected a JSON object, got {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn logger() -> AuditLogger {
        AuditLogger::new(EventStore::new_in_memory().await.unwrap())
    }

    #[tokio::test]
    async fn test_log_event() {
        let logger = logger().await;
        let event = logger
            .log_event(
                "risk_assessment",
                "Test System",
                "test_user",
                &json!({"risk_level": "high"}),
            )
            .await
            .unwrap();

        assert_eq!(event.id, 1);
        assert_eq!(event.event_type, EventType::RiskAssessment);
        assert_eq!(event.details["risk_level"], json!("high"));
        assert_eq!(event.checksum.len(), 64);
    }

    #[tokio::test]
    async fn test_invalid_event_type_writes_nothing() {
        let logger = logger().await;
        let err = logger
            .log_event("invalid_type", "Test", "test", &())
            .await
            .unwrap_err();

        assert!(matches!(err, AuditError::InvalidEventType(_)));
        assert!(err.to_string().contains("Invalid event type"));
        assert_eq!(logger.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_non_object_details_rejected() {
        let logger = logger().await;
        let err = logger
            .log_event("policy_update", "Test", "test", &json!([1, 2, 3]))
            .await
            .unwrap_err();

        assert!(matches!(err, AuditError::InvalidDetails(_)));
        assert_eq!(logger.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_missing_details_stored_as_empty_object() {
        let logger = logger().await;
        let event = logger
            .log_event("policy_update", "Test", "test", &None::<Value>)
            .await
            .unwrap();
        assert!(event.details.is_empty());

        let records = logger.store().iterate_all().await.unwrap();
        assert_eq!(records[0].details, "{}");
    }

    #[derive(Serialize)]
    struct Assessment {
        score: u32,
        level: &'static str,
        tags: Vec<&'static str>,
    }

    #[tokio::test]
    async fn test_struct_details_round_trip() {
        let logger = logger().await;
        let assessment = Assessment {
            score: 85,
            level: "high",
            tags: vec!["critical"],
        };
        logger
            .log_event("risk_assessment", "System", "user", &assessment)
            .await
            .unwrap();

        let events = logger
            .get_events(&EventFilter::default().for_system("System"))
            .await
            .unwrap();
        assert_eq!(
            Value::Object(events[0].details.clone()),
            json!({"score": 85, "level": "high", "tags": ["critical"]})
        );

        let records = logger.store().iterate_all().await.unwrap();
        assert_eq!(
            records[0].details,
            r#"{"level":"high","score":85,"tags":["critical"]}"#
        );
    }

    #[tokio::test]
    async fn test_returned_event_matches_stored_event() {
        let logger = logger().await;
        let logged = logger
            .record(
                EventType::ModelCardGenerated,
                "ML Model",
                "data_scientist",
                &json!({"model_version": "2.0"}),
            )
            .await
            .unwrap();

        let stored = logger.get_events(&EventFilter::default()).await.unwrap();
        assert_eq!(stored, vec![logged]);
    }

    #[tokio::test]
    async fn test_identical_events_get_distinct_checksums() {
        let logger = logger().await;
        let first = logger
            .log_event("risk_assessment", "System A", "user1", &())
            .await
            .unwrap();
        let second = logger
            .log_event("risk_assessment", "System A", "user1", &())
            .await
            .unwrap();

        assert_ne!(first.checksum, second.checksum);
        assert!(second.timestamp >= first.timestamp);
        assert_eq!(logger.last_checksum().await.unwrap(), Some(second.checksum));
    }

    #[tokio::test]
    async fn test_default_query_limit_applies() {
        let logger = logger().await.with_limits(3, 10);
        for _ in 0..5 {
            logger
                .log_event("incident_report", "System", "ops", &())
                .await
                .unwrap();
        }

        let events = logger.get_events(&EventFilter::default()).await.unwrap();
        let ids: Vec<i64> = events.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![5, 4, 3]);
    }
}
