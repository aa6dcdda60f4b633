//! Audit Log System
//!
//! Provides tamper-evident logging for governance activity. Every event is
//! chained to its predecessor with a SHA-256 checksum so that any later edit,
//! deletion or reordering of stored events is detectable.

pub mod checksum;
pub mod entry;
pub mod export;
pub mod logger;
pub mod store;
pub mod verify;

pub use checksum::{compute_checksum, ChainInput};
pub use entry::{canonical_json, AuditEvent, EventFilter, EventType, StoredRecord};
pub use export::render_markdown;
pub use logger::AuditLogger;
pub use store::{AppendSession, EventStore, NewRecord, StoreOptions};
pub use verify::{verify_chain, VerificationReport, Violation, ViolationKind};
