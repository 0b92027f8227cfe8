//! Lending transaction manager
//!
//! Owns the borrow/return state machine. Every check and every write of one
//! operation runs inside a single store transaction, so stock never goes
//! negative and a record is never closed twice, whatever the interleaving of
//! concurrent requests. Audit entries are written after commit and cannot
//! fail the operation.

use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::{
    config::LendingConfig,
    error::{AppError, AppResult, LendingViolation},
    models::{AuditAction, Book, BorrowRecord, BorrowRecordDetails, BorrowRecordFilter, Entity, Student},
    repository::LendingStore,
};

use super::audit::AuditService;

/// Lending rules that are a matter of library policy
#[derive(Debug, Clone, Copy)]
pub struct LendingPolicy {
    /// Refuse a borrow while the student holds an open record for the same book
    pub single_open_borrow: bool,
    pub overdue_days: i64,
}

impl Default for LendingPolicy {
    fn default() -> Self {
        Self {
            single_open_borrow: true,
            overdue_days: 14,
        }
    }
}

impl From<&LendingConfig> for LendingPolicy {
    fn from(config: &LendingConfig) -> Self {
        Self {
            single_open_borrow: config.single_open_borrow,
            overdue_days: config.overdue_days,
        }
    }
}

#[derive(Clone)]
pub struct LendingService {
    store: Arc<dyn LendingStore>,
    audit: AuditService,
    policy: LendingPolicy,
}

impl LendingService {
    pub fn new(store: Arc<dyn LendingStore>, audit: AuditService, policy: LendingPolicy) -> Self {
        Self { store, audit, policy }
    }

    /// Lend one copy of a book to a student
    pub async fn borrow(
        &self,
        book_id: i32,
        student_id: i32,
        acting_user_id: Option<i32>,
    ) -> AppResult<BorrowRecordDetails> {
        let mut tx = self.store.begin().await?;

        let book = tx
            .find_book(book_id)
            .await?
            .ok_or_else(|| AppError::not_found(Book::NAME, book_id))?;

        if book.available_copies < 1 {
            return Err(LendingViolation::NoCopiesAvailable.into());
        }

        let student = tx
            .find_student(student_id)
            .await?
            .ok_or_else(|| AppError::not_found(Student::NAME, student_id))?;

        if self.policy.single_open_borrow
            && tx.find_open_record(book_id, student_id).await?.is_some()
        {
            return Err(LendingViolation::AlreadyBorrowed.into());
        }

        let record = tx.create_record(book_id, student_id, Utc::now()).await?;
        // available_copies >= 1 was checked above
        let book = tx
            .update_available_copies(book_id, book.available_copies - 1)
            .await?;

        tx.commit().await?;

        tracing::info!(
            record_id = record.id,
            book_id,
            student_id,
            available_copies = book.available_copies,
            "Book borrowed"
        );

        self.audit
            .record(
                AuditAction::Borrow,
                BorrowRecord::ENTITY,
                record.id,
                format!(
                    "Student {} ({}) borrowed \"{}\"",
                    student.name, student.matric_number, book.title
                ),
                acting_user_id,
            )
            .await;

        Ok(BorrowRecordDetails::new(record, book, student))
    }

    /// Close an open borrow record and put the copy back on the shelf
    pub async fn return_book(
        &self,
        borrow_record_id: i32,
        acting_user_id: Option<i32>,
    ) -> AppResult<BorrowRecordDetails> {
        let mut tx = self.store.begin().await?;

        let record = tx
            .find_record(borrow_record_id)
            .await?
            .ok_or_else(|| AppError::not_found(BorrowRecord::ENTITY, borrow_record_id))?;

        if !record.is_open() {
            return Err(LendingViolation::AlreadyReturned.into());
        }

        let book = tx
            .find_book(record.book_id)
            .await?
            .ok_or_else(|| AppError::not_found(Book::NAME, record.book_id))?;
        let student = tx
            .find_student(record.student_id)
            .await?
            .ok_or_else(|| AppError::not_found(Student::NAME, record.student_id))?;

        let restocked = book.available_copies.checked_add(1).ok_or_else(|| {
            AppError::Conflict(format!(
                "Book with ID {} already holds the maximum number of copies",
                book.id
            ))
        })?;

        let record = tx.set_return_date(record.id, Utc::now()).await?;
        let book = tx.update_available_copies(book.id, restocked).await?;

        tx.commit().await?;

        tracing::info!(
            record_id = record.id,
            book_id = book.id,
            student_id = student.id,
            available_copies = book.available_copies,
            "Book returned"
        );

        self.audit
            .record(
                AuditAction::Return,
                BorrowRecord::ENTITY,
                record.id,
                format!("Student {} returned \"{}\"", student.name, book.title),
                acting_user_id,
            )
            .await;

        Ok(BorrowRecordDetails::new(record, book, student))
    }

    /// List borrow records matching `filter`, newest first
    pub async fn find_all(&self, filter: &BorrowRecordFilter) -> AppResult<Vec<BorrowRecordDetails>> {
        let records = self.store.find_records(filter).await?;

        self.audit
            .record(
                AuditAction::FetchAll,
                BorrowRecord::ENTITY,
                0,
                format!("Fetched {} borrowed book records", records.len()),
                None,
            )
            .await;

        Ok(records)
    }

    /// Open records borrowed more than `due_days` ago (policy default when `None`)
    pub async fn find_overdue(&self, due_days: Option<i64>) -> AppResult<Vec<BorrowRecordDetails>> {
        let due_days = due_days.unwrap_or(self.policy.overdue_days);
        if due_days < 0 {
            return Err(AppError::Validation("dueDays must not be negative".to_string()));
        }
        let cutoff = Duration::try_days(due_days)
            .and_then(|age| Utc::now().checked_sub_signed(age))
            .ok_or_else(|| AppError::Validation("dueDays is out of range".to_string()))?;

        let filter = BorrowRecordFilter {
            is_returned: Some(false),
            borrowed_before: Some(cutoff),
            ..Default::default()
        };
        self.store.find_records(&filter).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{AuditEntry, CreateBook, CreateStudent},
        repository::{memory::MemoryStore, CrudRepository, LendingTx, MockAuditSink},
    };
    use async_trait::async_trait;
    use chrono::DateTime;

    async fn seed_book(store: &MemoryStore, isbn: &str, copies: i32) -> Book {
        let data = CreateBook {
            title: "The Great Gatsby".to_string(),
            author: "F. Scott Fitzgerald".to_string(),
            isbn: isbn.to_string(),
            available_copies: copies,
        };
        CrudRepository::<Book>::create(store, &data).await.unwrap()
    }

    async fn seed_student(store: &MemoryStore, matric_number: &str) -> Student {
        let data = CreateStudent {
            name: format!("Student {}", matric_number),
            matric_number: matric_number.to_string(),
            level: "300".to_string(),
            department: "Computer Science".to_string(),
        };
        CrudRepository::<Student>::create(store, &data).await.unwrap()
    }

    async fn stock(store: &MemoryStore, book_id: i32) -> i32 {
        CrudRepository::<Book>::find_by_id(store, book_id)
            .await
            .unwrap()
            .unwrap()
            .available_copies
    }

    fn service(store: &MemoryStore) -> LendingService {
        LendingService::new(
            Arc::new(store.clone()),
            AuditService::new(Arc::new(store.clone())),
            LendingPolicy::default(),
        )
    }

    #[tokio::test]
    async fn test_borrow_decrements_stock() {
        let store = MemoryStore::new();
        let book = seed_book(&store, "978-0743273565", 3).await;
        let student = seed_student(&store, "CSC001").await;

        let borrowed = service(&store).borrow(book.id, student.id, Some(1)).await.unwrap();

        assert!(borrowed.return_date.is_none());
        assert_eq!(borrowed.book.available_copies, 2);
        assert_eq!(borrowed.student.id, student.id);
        assert_eq!(stock(&store, book.id).await, 2);

        let logs = store.audit_logs().await;
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].action, "BORROW");
        assert_eq!(logs[0].entity_type, "BorrowRecord");
        assert_eq!(logs[0].entity_id, borrowed.id);
        assert_eq!(logs[0].user_id, Some(1));
    }

    #[tokio::test]
    async fn test_borrow_without_copies_fails_and_changes_nothing() {
        let store = MemoryStore::new();
        let book = seed_book(&store, "978-0743273565", 1).await;
        let first = seed_student(&store, "CSC001").await;
        let second = seed_student(&store, "CSC002").await;
        let lending = service(&store);

        lending.borrow(book.id, first.id, None).await.unwrap();
        let result = lending.borrow(book.id, second.id, None).await;

        assert!(matches!(
            result,
            Err(AppError::InvalidOperation(LendingViolation::NoCopiesAvailable))
        ));
        assert_eq!(stock(&store, book.id).await, 0);
        assert_eq!(lending.find_all(&Default::default()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_borrow_unknown_book_or_student_is_not_found() {
        let store = MemoryStore::new();
        let book = seed_book(&store, "978-0743273565", 2).await;
        let student = seed_student(&store, "CSC001").await;
        let lending = service(&store);

        assert!(matches!(
            lending.borrow(5, student.id, None).await,
            Err(AppError::NotFound { entity: "Book", id: 5 })
        ));
        assert!(matches!(
            lending.borrow(book.id, 99, None).await,
            Err(AppError::NotFound { entity: "Student", id: 99 })
        ));
        assert_eq!(stock(&store, book.id).await, 2);
        assert!(store.audit_logs().await.is_empty());
    }

    #[tokio::test]
    async fn test_checks_run_in_order() {
        let store = MemoryStore::new();
        let book = seed_book(&store, "978-0743273565", 1).await;
        let student = seed_student(&store, "CSC001").await;
        let lending = service(&store);
        lending.borrow(book.id, student.id, None).await.unwrap();

        // Out of stock is reported before the unknown student
        assert!(matches!(
            lending.borrow(book.id, 99, None).await,
            Err(AppError::InvalidOperation(LendingViolation::NoCopiesAvailable))
        ));
    }

    #[tokio::test]
    async fn test_second_open_borrow_of_same_book_is_refused() {
        let store = MemoryStore::new();
        let book = seed_book(&store, "978-0743273565", 3).await;
        let student = seed_student(&store, "CSC001").await;
        let lending = service(&store);

        lending.borrow(book.id, student.id, None).await.unwrap();
        let result = lending.borrow(book.id, student.id, None).await;

        assert!(matches!(
            result,
            Err(AppError::InvalidOperation(LendingViolation::AlreadyBorrowed))
        ));
        assert_eq!(stock(&store, book.id).await, 2);
    }

    #[tokio::test]
    async fn test_second_open_borrow_allowed_when_policy_disabled() {
        let store = MemoryStore::new();
        let book = seed_book(&store, "978-0743273565", 3).await;
        let student = seed_student(&store, "CSC001").await;
        let lending = LendingService::new(
            Arc::new(store.clone()),
            AuditService::new(Arc::new(store.clone())),
            LendingPolicy {
                single_open_borrow: false,
                ..Default::default()
            },
        );

        lending.borrow(book.id, student.id, None).await.unwrap();
        lending.borrow(book.id, student.id, None).await.unwrap();
        assert_eq!(stock(&store, book.id).await, 1);
    }

    #[tokio::test]
    async fn test_borrow_again_after_return() {
        let store = MemoryStore::new();
        let book = seed_book(&store, "978-0743273565", 1).await;
        let student = seed_student(&store, "CSC001").await;
        let lending = service(&store);

        let first = lending.borrow(book.id, student.id, None).await.unwrap();
        lending.return_book(first.id, None).await.unwrap();
        let second = lending.borrow(book.id, student.id, None).await.unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(stock(&store, book.id).await, 0);
    }

    #[tokio::test]
    async fn test_return_closes_record_and_restores_stock() {
        let store = MemoryStore::new();
        let book = seed_book(&store, "978-0743273565", 2).await;
        let student = seed_student(&store, "CSC001").await;
        let lending = service(&store);
        let borrowed = lending.borrow(book.id, student.id, None).await.unwrap();

        let returned = lending.return_book(borrowed.id, Some(4)).await.unwrap();

        assert_eq!(returned.status, crate::models::BorrowStatus::Closed);
        assert!(returned.return_date.is_some());
        assert_eq!(returned.borrow_date, borrowed.borrow_date);
        assert_eq!(returned.book.available_copies, 2);
        assert_eq!(stock(&store, book.id).await, 2);

        let last = store.audit_logs().await.pop().unwrap();
        assert_eq!(last.action, "RETURN");
        assert_eq!(last.entity_id, borrowed.id);
        assert_eq!(last.user_id, Some(4));
    }

    #[tokio::test]
    async fn test_return_twice_increments_stock_once() {
        let store = MemoryStore::new();
        let book = seed_book(&store, "978-0743273565", 1).await;
        let student = seed_student(&store, "CSC001").await;
        let lending = service(&store);
        let borrowed = lending.borrow(book.id, student.id, None).await.unwrap();

        lending.return_book(borrowed.id, None).await.unwrap();
        let again = lending.return_book(borrowed.id, None).await;

        assert!(matches!(
            again,
            Err(AppError::InvalidOperation(LendingViolation::AlreadyReturned))
        ));
        assert_eq!(stock(&store, book.id).await, 1);
    }

    #[tokio::test]
    async fn test_return_at_maximum_stock_is_refused() {
        let store = MemoryStore::new();
        let book = seed_book(&store, "978-0743273565", 2).await;
        let student = seed_student(&store, "CSC001").await;
        let lending = service(&store);
        let borrowed = lending.borrow(book.id, student.id, None).await.unwrap();

        let update = crate::models::UpdateBook {
            available_copies: Some(i32::MAX),
            ..Default::default()
        };
        CrudRepository::<Book>::update(&store, book.id, &update).await.unwrap();

        let result = lending.return_book(borrowed.id, None).await;

        assert!(matches!(result, Err(AppError::Conflict(_))));
        assert_eq!(stock(&store, book.id).await, i32::MAX);
        let open = BorrowRecordFilter {
            is_returned: Some(false),
            ..Default::default()
        };
        assert_eq!(store.find_records(&open).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_return_unknown_record_is_not_found() {
        let store = MemoryStore::new();
        assert!(matches!(
            service(&store).return_book(77, None).await,
            Err(AppError::NotFound { entity: "BorrowRecord", id: 77 })
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_borrows_never_oversell() {
        let store = MemoryStore::new();
        let book = seed_book(&store, "978-0743273565", 3).await;
        let mut students = Vec::new();
        for i in 0..10 {
            students.push(seed_student(&store, &format!("CSC{:03}", i)).await);
        }
        let lending = service(&store);

        let handles: Vec<_> = students
            .iter()
            .map(|student| {
                let lending = lending.clone();
                let (book_id, student_id) = (book.id, student.id);
                tokio::spawn(async move { lending.borrow(book_id, student_id, None).await })
            })
            .collect();

        let mut successes = 0;
        let mut sold_out = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(AppError::InvalidOperation(LendingViolation::NoCopiesAvailable)) => sold_out += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        assert_eq!(successes, 3);
        assert_eq!(sold_out, 7);
        assert_eq!(stock(&store, book.id).await, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_two_students_race_for_last_copy() {
        let store = MemoryStore::new();
        let book = seed_book(&store, "978-0743273565", 1).await;
        let a = seed_student(&store, "CSC001").await;
        let b = seed_student(&store, "CSC002").await;
        let lending = service(&store);

        let (first, second) = tokio::join!(
            lending.borrow(book.id, a.id, None),
            lending.borrow(book.id, b.id, None)
        );

        assert_eq!(first.is_ok() as u8 + second.is_ok() as u8, 1);
        let failure = if first.is_err() { first } else { second };
        assert!(matches!(
            failure,
            Err(AppError::InvalidOperation(LendingViolation::NoCopiesAvailable))
        ));
        assert_eq!(stock(&store, book.id).await, 0);
    }

    #[tokio::test]
    async fn test_audit_failure_does_not_fail_borrow_or_return() {
        let store = MemoryStore::new();
        let book = seed_book(&store, "978-0743273565", 1).await;
        let student = seed_student(&store, "CSC001").await;

        let mut sink = MockAuditSink::new();
        sink.expect_record()
            .withf(|entry: &AuditEntry| {
                matches!(entry.action, AuditAction::Borrow | AuditAction::Return)
            })
            .times(2)
            .returning(|_| Err(AppError::Internal("audit store down".to_string())));

        let lending = LendingService::new(
            Arc::new(store.clone()),
            AuditService::new(Arc::new(sink)),
            LendingPolicy::default(),
        );

        let borrowed = lending.borrow(book.id, student.id, None).await.unwrap();
        assert_eq!(stock(&store, book.id).await, 0);
        lending.return_book(borrowed.id, None).await.unwrap();
        assert_eq!(stock(&store, book.id).await, 1);
    }

    /// Store whose commits always fail, to exercise rollback
    struct FailingCommitStore(MemoryStore);

    struct FailingCommitTx(Box<dyn LendingTx>);

    #[async_trait]
    impl LendingStore for FailingCommitStore {
        async fn begin(&self) -> AppResult<Box<dyn LendingTx>> {
            Ok(Box::new(FailingCommitTx(self.0.begin().await?)))
        }

        async fn find_records(&self, filter: &BorrowRecordFilter) -> AppResult<Vec<BorrowRecordDetails>> {
            self.0.find_records(filter).await
        }

        async fn ping(&self) -> AppResult<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl LendingTx for FailingCommitTx {
        async fn find_book(&mut self, id: i32) -> AppResult<Option<Book>> {
            self.0.find_book(id).await
        }

        async fn update_available_copies(&mut self, id: i32, available_copies: i32) -> AppResult<Book> {
            self.0.update_available_copies(id, available_copies).await
        }

        async fn find_student(&mut self, id: i32) -> AppResult<Option<Student>> {
            self.0.find_student(id).await
        }

        async fn find_open_record(&mut self, book_id: i32, student_id: i32) -> AppResult<Option<BorrowRecord>> {
            self.0.find_open_record(book_id, student_id).await
        }

        async fn create_record(
            &mut self,
            book_id: i32,
            student_id: i32,
            borrow_date: DateTime<Utc>,
        ) -> AppResult<BorrowRecord> {
            self.0.create_record(book_id, student_id, borrow_date).await
        }

        async fn find_record(&mut self, id: i32) -> AppResult<Option<BorrowRecord>> {
            self.0.find_record(id).await
        }

        async fn set_return_date(&mut self, id: i32, return_date: DateTime<Utc>) -> AppResult<BorrowRecord> {
            self.0.set_return_date(id, return_date).await
        }

        async fn commit(self: Box<Self>) -> AppResult<()> {
            Err(AppError::Internal("connection lost during commit".to_string()))
        }
    }

    #[tokio::test]
    async fn test_failed_commit_leaves_no_partial_effects() {
        let store = MemoryStore::new();
        let book = seed_book(&store, "978-0743273565", 2).await;
        let student = seed_student(&store, "CSC001").await;

        let lending = LendingService::new(
            Arc::new(FailingCommitStore(store.clone())),
            AuditService::new(Arc::new(store.clone())),
            LendingPolicy::default(),
        );

        let result = lending.borrow(book.id, student.id, None).await;

        assert!(matches!(result, Err(ref e) if e.is_infrastructure()));
        assert_eq!(stock(&store, book.id).await, 2);
        assert!(store.find_records(&Default::default()).await.unwrap().is_empty());
        assert!(store.audit_logs().await.is_empty());
    }

    #[tokio::test]
    async fn test_find_all_audits_bulk_fetch() {
        let store = MemoryStore::new();
        let book = seed_book(&store, "978-0743273565", 2).await;
        let student = seed_student(&store, "CSC001").await;
        let lending = service(&store);
        let borrowed = lending.borrow(book.id, student.id, None).await.unwrap();
        lending.return_book(borrowed.id, None).await.unwrap();

        let open = BorrowRecordFilter {
            is_returned: Some(false),
            ..Default::default()
        };
        assert!(lending.find_all(&open).await.unwrap().is_empty());

        let returned = BorrowRecordFilter {
            is_returned: Some(true),
            title: Some("GATSBY".to_string()),
            ..Default::default()
        };
        assert_eq!(lending.find_all(&returned).await.unwrap().len(), 1);

        let last = store.audit_logs().await.pop().unwrap();
        assert_eq!(last.action, "FETCH_ALL");
        assert_eq!(last.entity_id, 0);
        assert_eq!(last.message, "Fetched 1 borrowed book records");
    }

    #[tokio::test]
    async fn test_find_overdue_uses_due_days() {
        let store = MemoryStore::new();
        let book = seed_book(&store, "978-0743273565", 2).await;
        let student = seed_student(&store, "CSC001").await;
        let lending = service(&store);
        lending.borrow(book.id, student.id, None).await.unwrap();

        // Borrowed just now: not overdue after 14 days, overdue after 0 days
        assert!(lending.find_overdue(None).await.unwrap().is_empty());
        assert_eq!(lending.find_overdue(Some(0)).await.unwrap().len(), 1);
        assert!(matches!(
            lending.find_overdue(Some(-1)).await,
            Err(AppError::Validation(_))
        ));
    }
}
