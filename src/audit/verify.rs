//! Audit Chain Verification
//!
//! Walks stored records oldest-first and reports every broken link and
//! checksum mismatch instead of stopping at the first one.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::audit::checksum::recompute;
use crate::audit::entry::StoredRecord;

/// Kind of tampering finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// Stored predecessor digest does not match the preceding record's digest
    BrokenChainLink,
    /// Recomputed digest does not match the stored digest
    ChecksumMismatch,
}

impl ViolationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationKind::BrokenChainLink => "broken_chain_link",
            ViolationKind::ChecksumMismatch => "checksum_mismatch",
        }
    }
}

/// A single integrity finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// Zero-based position in the ascending walk
    pub index: usize,
    /// Stored id of the offending record
    pub id: i64,
    pub kind: ViolationKind,
}

/// Result of verifying the whole chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub valid: bool,
    pub total_events: usize,
    pub violations: Vec<Violation>,
    pub message: String,
}

impl VerificationReport {
    fn new(total_events: usize, violations: Vec<Violation>) -> Self {
        let message = if total_events == 0 {
            "No events in log"
        } else if violations.is_empty() {
            "Audit chain integrity verified"
        } else {
            "INTEGRITY VIOLATION DETECTED"
        };

        Self {
            valid: violations.is_empty(),
            total_events,
            violations,
            message: message.to_string(),
        }
    }

    /// Indices flagged with the given kind
    pub fn indices_of(&self, kind: ViolationKind) -> Vec<usize> {
        self.violations
            .iter()
            .filter(|v| v.kind == kind)
            .map(|v| v.index)
            .collect()
    }

    /// Get a human-readable summary
    pub fn summary(&self) -> String {
        if self.valid {
            format!("{} ({} events)", self.message, self.total_events)
        } else {
            format!(
                "{} ({} events, {} violations)",
                self.message,
                self.total_events,
                self.violations.len()
            )
        }
    }
}

/// Verify a chain of stored records given in ascending id order.
///
/// The expected predecessor advances to each record's *stored* checksum even
/// when that record is flagged, so one altered record yields its own
/// mismatch plus at most one broken link on its successor. A forger who
/// rewrites every record from the splice point onward is only caught at the
/// splice point.
pub fn verify_chain<'a, I>(records: I) -> VerificationReport
where
    I: IntoIterator<Item = &'a StoredRecord>,
{
    let mut violations = Vec::new();
    let mut expected_prev: Option<&str> = None;
    let mut total_events = 0;

    for (index, record) in records.into_iter().enumerate() {
        total_events += 1;

        if record.prev_checksum.as_deref() != expected_prev {
            warn!(
                "Broken chain link at index {} (id {}): expected {:?}, stored {:?}",
                index, record.id, expected_prev, record.prev_checksum
            );
            violations.push(Violation {
                index,
                id: record.id,
                kind: ViolationKind::BrokenChainLink,
            });
        }

        if recompute(record) != record.checksum {
            warn!("Checksum mismatch at index {} (id {})", index, record.id);
            violations.push(Violation {
                index,
                id: record.id,
                kind: ViolationKind::ChecksumMismatch,
            });
        }

        expected_prev = Some(record.checksum.as_str());
    }

    let report = VerificationReport::new(total_events, violations);
    if report.valid {
        info!("Audit chain verification successful: {} events", total_events);
    } else {
        warn!("{}", report.summary());
    }
    debug!("Verification report: {:?}", report);
    report
}
