//! Repository layer for database operations
//!
//! Services only see the traits defined here. Two stores implement them:
//! PostgreSQL (`books`, `students`, `borrow_records`, `audit_logs`) and the
//! process-local [`memory::MemoryStore`].

pub mod audit_logs;
pub mod books;
pub mod borrow_records;
pub mod memory;
pub mod students;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::{AuditEntry, Book, BorrowRecord, BorrowRecordDetails, BorrowRecordFilter, Entity, Student},
};

/// Plain create/read/update/delete access to one entity type
#[async_trait]
pub trait CrudRepository<E: Entity>: Send + Sync {
    async fn create(&self, data: &E::Create) -> AppResult<E>;
    async fn find_by_id(&self, id: i32) -> AppResult<Option<E>>;
    async fn find_all(&self, filter: &E::Filter) -> AppResult<Vec<E>>;
    /// `None` when no entity has this id
    async fn update(&self, id: i32, data: &E::Update) -> AppResult<Option<E>>;
    /// Returns the deleted entity, `None` when no entity has this id
    async fn delete(&self, id: i32) -> AppResult<Option<E>>;
}

/// Transactional access to books, students and borrow records
#[async_trait]
pub trait LendingStore: Send + Sync {
    /// Open a transaction. Dropping the returned handle without calling
    /// [`LendingTx::commit`] rolls every write back.
    async fn begin(&self) -> AppResult<Box<dyn LendingTx>>;

    /// Records with book and student attached, newest borrow first
    async fn find_records(&self, filter: &BorrowRecordFilter) -> AppResult<Vec<BorrowRecordDetails>>;

    /// Cheap connectivity check
    async fn ping(&self) -> AppResult<()>;
}

/// One open transaction against a [`LendingStore`]
#[async_trait]
pub trait LendingTx: Send {
    /// Reads a book and holds it against concurrent writers until the transaction ends
    async fn find_book(&mut self, id: i32) -> AppResult<Option<Book>>;
    async fn update_available_copies(&mut self, id: i32, available_copies: i32) -> AppResult<Book>;
    async fn find_student(&mut self, id: i32) -> AppResult<Option<Student>>;
    async fn find_open_record(&mut self, book_id: i32, student_id: i32) -> AppResult<Option<BorrowRecord>>;
    async fn create_record(
        &mut self,
        book_id: i32,
        student_id: i32,
        borrow_date: DateTime<Utc>,
    ) -> AppResult<BorrowRecord>;
    /// Reads a borrow record and holds it against concurrent writers until the transaction ends
    async fn find_record(&mut self, id: i32) -> AppResult<Option<BorrowRecord>>;
    async fn set_return_date(&mut self, id: i32, return_date: DateTime<Utc>) -> AppResult<BorrowRecord>;
    async fn commit(self: Box<Self>) -> AppResult<()>;
}

/// Destination for audit entries
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: &AuditEntry) -> AppResult<()>;
}

/// Main repository struct holding the store behind each concern
#[derive(Clone)]
pub struct Repository {
    pub books: Arc<dyn CrudRepository<Book>>,
    pub students: Arc<dyn CrudRepository<Student>>,
    pub lending: Arc<dyn LendingStore>,
    pub audit: Arc<dyn AuditSink>,
}

impl Repository {
    /// Create a repository backed by PostgreSQL
    pub fn postgres(pool: Pool<Postgres>) -> Self {
        Self {
            books: Arc::new(books::BooksRepository::new(pool.clone())),
            students: Arc::new(students::StudentsRepository::new(pool.clone())),
            lending: Arc::new(borrow_records::BorrowRecordsRepository::new(pool.clone())),
            audit: Arc::new(audit_logs::AuditLogsRepository::new(pool)),
        }
    }

    /// Create a repository backed by a process-local store
    pub fn in_memory(store: memory::MemoryStore) -> Self {
        Self {
            books: Arc::new(store.clone()),
            students: Arc::new(store.clone()),
            lending: Arc::new(store.clone()),
            audit: Arc::new(store),
        }
    }
}

/// Maps constraint violations on writes to `Conflict`, everything else stays a database error
pub(crate) fn map_write_error(entity: &str, err: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db_err) = &err {
        match db_err.code().as_deref() {
            Some("23505") => {
                return AppError::Conflict(format!(
                    "{} already exists with this unique constraint",
                    entity
                ))
            }
            Some("23503") => {
                return AppError::Conflict(format!(
                    "{} is still referenced by borrow records",
                    entity
                ))
            }
            _ => {}
        }
    }
    AppError::Database(err)
}

/// `%needle%` for ILIKE, with LIKE wildcards in the needle escaped
pub(crate) fn like_pattern(needle: &str) -> String {
    let escaped = needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("gatsby"), "%gatsby%");
        assert_eq!(like_pattern("100%_x"), "%100\\%\\_x%");
    }
}
