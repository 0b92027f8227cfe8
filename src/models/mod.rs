//! Data models for the lending server

pub mod audit;
pub mod book;
pub mod borrow_record;
pub mod student;
pub mod user;

use serde::Serialize;

// Re-export commonly used types
pub use audit::{AuditAction, AuditEntry, AuditLogEntry};
pub use book::{normalize_isbn, Book, BookFilter, CreateBook, UpdateBook};
pub use borrow_record::{BorrowRecord, BorrowRecordDetails, BorrowRecordFilter, BorrowStatus};
pub use student::{CreateStudent, Student, StudentFilter, UpdateStudent};
pub use user::{Role, UserClaims};

/// An administratively managed entity with plain create/read/update/delete
pub trait Entity: Serialize + Clone + Send + Sync + 'static {
    /// Name used in error messages and audit entries
    const NAME: &'static str;

    type Create: Send + Sync;
    type Update: Send + Sync;
    type Filter: Default + Send + Sync;

    fn id(&self) -> i32;
}

/// Case-insensitive substring match used by in-process filtering
pub(crate) fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}
