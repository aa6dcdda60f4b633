#![allow(dead_code)]

use governance_audit::audit::{AuditLogger, EventStore, StoreOptions};
use tempfile::TempDir;

/// Open a logger backed by a fresh on-disk database; keep the `TempDir` alive for the test
pub async fn setup_file_logger() -> (AuditLogger, TempDir) {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let logger = open_logger_in(&temp_dir).await;
    (logger, temp_dir)
}

/// Open another handle on the database inside `temp_dir`
pub async fn open_logger_in(temp_dir: &TempDir) -> AuditLogger {
    let url = format!("sqlite://{}", temp_dir.path().join("audit.db").display());
    let store = EventStore::open(&url, &StoreOptions::default())
        .await
        .expect("Failed to open test store");
    AuditLogger::new(store)
}

/// Log `count` compliance checks for one system
pub async fn seed_events(logger: &AuditLogger, system_name: &str, count: usize) {
    for i in 0..count {
        logger
            .log_event(
                "compliance_check",
                system_name,
                "seeder",
                &serde_json::json!({ "step": i }),
            )
            .await
            .expect("Failed to seed event");
    }
}

/// Overwrite one column of a stored record, bypassing the append-only API
pub async fn tamper(logger: &AuditLogger, id: i64, column: &str, value: Option<&str>) {
    let sql = format!("UPDATE audit_log SET {} = ? WHERE id = ?", column);
    sqlx::query(&sql)
        .bind(value)
        .bind(id)
        .execute(logger.store().pool())
        .await
        .expect("Failed to tamper with record");
}
