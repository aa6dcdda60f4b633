//! Markdown export of the audit trail

use chrono::{DateTime, Utc};

use crate::audit::entry::{format_timestamp, AuditEvent};

const CHECKSUM_PREFIX_LEN: usize = 12;

/// Render events (given newest first, as queries return them) oldest-first as a markdown table
pub fn render_markdown(events: &[AuditEvent], generated_at: DateTime<Utc>) -> String {
    let mut lines = vec![
        "# Audit Trail Report".to_string(),
        String::new(),
        format!("**Generated:** {}", format_timestamp(&generated_at)),
        format!("**Total Events:** {}", events.len()),
        String::new(),
        "| # | Timestamp | Event Type | System | Actor | Checksum |".to_string(),
        "|---|-----------|------------|--------|-------|----------|".to_string(),
    ];

    for event in events.iter().rev() {
        let short_checksum: String = event.checksum.chars().take(CHECKSUM_PREFIX_LEN).collect();
        lines.push(format!(
            "| {} | {} | {} | {} | {} | `{}...` |",
            event.id,
            format_timestamp(&event.timestamp),
            event.event_type,
            escape_cell(&event.system_name),
            escape_cell(&event.actor),
            short_checksum
        ));
    }

    lines.join("\n")
}

fn escape_cell(value: &str) -> String {
    value.replace('|', "\\|").replace('\n', " ")
}
