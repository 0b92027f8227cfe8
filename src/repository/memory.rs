//! Process-local store
//!
//! Used by the `memory` storage backend and by tests. A transaction takes the
//! store-wide lock for its whole lifetime and works on a copy of the tables;
//! `commit` swaps the copy in, dropping the transaction discards it. That
//! gives serialisable isolation for borrow/return at the cost of throughput.

use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    error::{AppError, AppResult},
    models::{
        normalize_isbn, AuditEntry, AuditLogEntry, Book, BookFilter, BorrowRecord,
        BorrowRecordDetails, BorrowRecordFilter, CreateBook, CreateStudent, Entity, Student,
        StudentFilter, UpdateBook, UpdateStudent,
    },
};

use super::{AuditSink, CrudRepository, LendingStore, LendingTx};

#[derive(Debug, Clone, Default)]
struct Tables {
    books: BTreeMap<i32, Book>,
    students: BTreeMap<i32, Student>,
    records: BTreeMap<i32, BorrowRecord>,
    last_book_id: i32,
    last_student_id: i32,
    last_record_id: i32,
}

impl Tables {
    fn isbn_taken(&self, isbn: &str, except: Option<i32>) -> bool {
        self.books
            .values()
            .any(|b| b.isbn == isbn && Some(b.id) != except)
    }

    fn matric_number_taken(&self, matric_number: &str, except: Option<i32>) -> bool {
        self.students
            .values()
            .any(|s| s.matric_number == matric_number && Some(s.id) != except)
    }

    fn details(&self, record: &BorrowRecord) -> AppResult<BorrowRecordDetails> {
        let book = self
            .books
            .get(&record.book_id)
            .cloned()
            .ok_or_else(|| AppError::Internal(format!("borrow record {} has no book", record.id)))?;
        let student = self
            .students
            .get(&record.student_id)
            .cloned()
            .ok_or_else(|| AppError::Internal(format!("borrow record {} has no student", record.id)))?;
        Ok(BorrowRecordDetails::new(record.clone(), book, student))
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    audit_logs: Arc<Mutex<Vec<AuditLogEntry>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Audit entries recorded so far, oldest first
    pub async fn audit_logs(&self) -> Vec<AuditLogEntry> {
        self.audit_logs.lock().await.clone()
    }
}

#[async_trait]
impl CrudRepository<Book> for MemoryStore {
    async fn create(&self, data: &CreateBook) -> AppResult<Book> {
        let mut tables = self.tables.lock().await;
        let isbn = normalize_isbn(&data.isbn);
        if tables.isbn_taken(&isbn, None) {
            return Err(AppError::Conflict(format!(
                "{} already exists with this unique constraint",
                Book::NAME
            )));
        }

        tables.last_book_id += 1;
        let now = Utc::now();
        let book = Book {
            id: tables.last_book_id,
            title: data.title.clone(),
            author: data.author.clone(),
            isbn,
            available_copies: data.available_copies,
            created_at: now,
            updated_at: now,
        };
        tables.books.insert(book.id, book.clone());
        Ok(book)
    }

    async fn find_by_id(&self, id: i32) -> AppResult<Option<Book>> {
        Ok(self.tables.lock().await.books.get(&id).cloned())
    }

    async fn find_all(&self, filter: &BookFilter) -> AppResult<Vec<Book>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .books
            .values()
            .filter(|b| filter.matches(b))
            .cloned()
            .collect())
    }

    async fn update(&self, id: i32, data: &UpdateBook) -> AppResult<Option<Book>> {
        let mut tables = self.tables.lock().await;
        let isbn = data.isbn.as_deref().map(normalize_isbn);
        if let Some(ref isbn) = isbn {
            if tables.isbn_taken(isbn, Some(id)) {
                return Err(AppError::Conflict(format!(
                    "{} already exists with this unique constraint",
                    Book::NAME
                )));
            }
        }

        let Some(book) = tables.books.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(ref title) = data.title {
            book.title = title.clone();
        }
        if let Some(ref author) = data.author {
            book.author = author.clone();
        }
        if let Some(isbn) = isbn {
            book.isbn = isbn;
        }
        if let Some(available_copies) = data.available_copies {
            book.available_copies = available_copies;
        }
        book.updated_at = Utc::now();
        Ok(Some(book.clone()))
    }

    async fn delete(&self, id: i32) -> AppResult<Option<Book>> {
        let mut tables = self.tables.lock().await;
        if tables.records.values().any(|r| r.book_id == id) {
            return Err(AppError::Conflict(format!(
                "{} is still referenced by borrow records",
                Book::NAME
            )));
        }
        Ok(tables.books.remove(&id))
    }
}

#[async_trait]
impl CrudRepository<Student> for MemoryStore {
    async fn create(&self, data: &CreateStudent) -> AppResult<Student> {
        let mut tables = self.tables.lock().await;
        if tables.matric_number_taken(&data.matric_number, None) {
            return Err(AppError::Conflict(format!(
                "{} already exists with this unique constraint",
                Student::NAME
            )));
        }

        tables.last_student_id += 1;
        let now = Utc::now();
        let student = Student {
            id: tables.last_student_id,
            name: data.name.clone(),
            matric_number: data.matric_number.clone(),
            level: data.level.clone(),
            department: data.department.clone(),
            created_at: now,
            updated_at: now,
        };
        tables.students.insert(student.id, student.clone());
        Ok(student)
    }

    async fn find_by_id(&self, id: i32) -> AppResult<Option<Student>> {
        Ok(self.tables.lock().await.students.get(&id).cloned())
    }

    async fn find_all(&self, filter: &StudentFilter) -> AppResult<Vec<Student>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .students
            .values()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect())
    }

    async fn update(&self, id: i32, data: &UpdateStudent) -> AppResult<Option<Student>> {
        let mut tables = self.tables.lock().await;
        if let Some(ref matric_number) = data.matric_number {
            if tables.matric_number_taken(matric_number, Some(id)) {
                return Err(AppError::Conflict(format!(
                    "{} already exists with this unique constraint",
                    Student::NAME
                )));
            }
        }

        let Some(student) = tables.students.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(ref name) = data.name {
            student.name = name.clone();
        }
        if let Some(ref matric_number) = data.matric_number {
            student.matric_number = matric_number.clone();
        }
        if let Some(ref level) = data.level {
            student.level = level.clone();
        }
        if let Some(ref department) = data.department {
            student.department = department.clone();
        }
        student.updated_at = Utc::now();
        Ok(Some(student.clone()))
    }

    async fn delete(&self, id: i32) -> AppResult<Option<Student>> {
        let mut tables = self.tables.lock().await;
        if tables.records.values().any(|r| r.student_id == id) {
            return Err(AppError::Conflict(format!(
                "{} is still referenced by borrow records",
                Student::NAME
            )));
        }
        Ok(tables.students.remove(&id))
    }
}

#[async_trait]
impl LendingStore for MemoryStore {
    async fn begin(&self) -> AppResult<Box<dyn LendingTx>> {
        let guard = self.tables.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTx { guard, working }))
    }

    async fn find_records(&self, filter: &BorrowRecordFilter) -> AppResult<Vec<BorrowRecordDetails>> {
        let tables = self.tables.lock().await;
        let mut records = tables
            .records
            .values()
            .map(|r| tables.details(r))
            .collect::<AppResult<Vec<_>>>()?;
        records.retain(|d| filter.matches(d));
        records.sort_by(|a, b| b.borrow_date.cmp(&a.borrow_date).then(b.id.cmp(&a.id)));
        Ok(records)
    }

    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }
}

#[async_trait]
impl AuditSink for MemoryStore {
    async fn record(&self, entry: &AuditEntry) -> AppResult<()> {
        let mut logs = self.audit_logs.lock().await;
        let id = logs.len() as i64 + 1;
        logs.push(AuditLogEntry {
            id,
            action: entry.action.as_str().to_string(),
            entity_type: entry.entity_type.clone(),
            entity_id: entry.entity_id,
            message: entry.message.clone(),
            user_id: entry.user_id,
            created_at: Utc::now(),
        });
        Ok(())
    }
}

/// Transaction over a private copy of the tables, holding the store lock
pub struct MemoryTx {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
}

#[async_trait]
impl LendingTx for MemoryTx {
    async fn find_book(&mut self, id: i32) -> AppResult<Option<Book>> {
        Ok(self.working.books.get(&id).cloned())
    }

    async fn update_available_copies(&mut self, id: i32, available_copies: i32) -> AppResult<Book> {
        if available_copies < 0 {
            return Err(AppError::Internal(format!(
                "available copies of book {} would become negative",
                id
            )));
        }
        let book = self
            .working
            .books
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found(Book::NAME, id))?;
        book.available_copies = available_copies;
        book.updated_at = Utc::now();
        Ok(book.clone())
    }

    async fn find_student(&mut self, id: i32) -> AppResult<Option<Student>> {
        Ok(self.working.students.get(&id).cloned())
    }

    async fn find_open_record(&mut self, book_id: i32, student_id: i32) -> AppResult<Option<BorrowRecord>> {
        Ok(self
            .working
            .records
            .values()
            .find(|r| r.book_id == book_id && r.student_id == student_id && r.is_open())
            .cloned())
    }

    async fn create_record(
        &mut self,
        book_id: i32,
        student_id: i32,
        borrow_date: DateTime<Utc>,
    ) -> AppResult<BorrowRecord> {
        if !self.working.books.contains_key(&book_id) || !self.working.students.contains_key(&student_id) {
            return Err(AppError::Internal(
                "borrow record references a missing book or student".to_string(),
            ));
        }

        self.working.last_record_id += 1;
        let record = BorrowRecord {
            id: self.working.last_record_id,
            book_id,
            student_id,
            borrow_date,
            return_date: None,
        };
        self.working.records.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_record(&mut self, id: i32) -> AppResult<Option<BorrowRecord>> {
        Ok(self.working.records.get(&id).cloned())
    }

    async fn set_return_date(&mut self, id: i32, return_date: DateTime<Utc>) -> AppResult<BorrowRecord> {
        let record = self
            .working
            .records
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found(BorrowRecord::ENTITY, id))?;
        record.return_date = Some(return_date);
        Ok(record.clone())
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        let MemoryTx { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}
