pub mod audit;
pub mod config;
pub mod error;

pub use audit::{AuditEvent, AuditLogger, EventFilter, EventStore, EventType, VerificationReport};
pub use config::AuditConfig;
pub use error::{AuditError, AuditResult};
