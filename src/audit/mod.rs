//! Audit trail of access decisions

mod log;

pub use log::{AuditEntry, AuditFilter, AuditLog, DEFAULT_AUDIT_CAPACITY};
