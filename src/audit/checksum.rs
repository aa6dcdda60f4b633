//! Chaining Digest
//!
//! SHA-256 digest binding an event's content to its predecessor's digest.

use sha2::{Digest, Sha256};

use crate::audit::entry::StoredRecord;

/// Separator between hashed fields
pub const FIELD_DELIMITER: &str = "|";

/// Fields covered by an event's chaining digest
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainInput<'a> {
    pub timestamp: &'a str,
    pub event_type: &'a str,
    pub system_name: &'a str,
    pub actor: &'a str,
    pub details: &'a str,
    pub prev_checksum: Option<&'a str>,
}

impl<'a> ChainInput<'a> {
    /// Create canonical string representation for hashing
    pub fn canonical_string(&self) -> String {
        [
            self.timestamp,
            self.event_type,
            self.system_name,
            self.actor,
            self.details,
            self.prev_checksum.unwrap_or(""),
        ]
        .join(FIELD_DELIMITER)
    }
}

impl<'a> From<&'a StoredRecord> for ChainInput<'a> {
    fn from(record: &'a StoredRecord) -> Self {
        Self {
            timestamp: &record.timestamp,
            event_type: &record.event_type,
            system_name: &record.system_name,
            actor: &record.actor,
            details: &record.details,
            prev_checksum: record.prev_checksum.as_deref(),
        }
    }
}

/// Calculate the lowercase hex SHA-256 checksum of an event
pub fn compute_checksum(input: &ChainInput<'_>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.canonical_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// Recompute a stored record's checksum from its stored fields
pub fn recompute(record: &StoredRecord) -> String {
    compute_checksum(&ChainInput::from(record))
}
