//! Borrow records repository: transactional lending access on PostgreSQL
//!
//! Book rows are locked with `FOR UPDATE` before their stock is checked and
//! borrow records before their return date is checked, so concurrent borrows
//! of the same book queue behind each other instead of both passing the
//! availability check.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, Pool, Postgres, QueryBuilder, Row, Transaction};

use crate::{
    error::AppResult,
    models::{Book, BorrowRecord, BorrowRecordDetails, BorrowRecordFilter, Student},
};

use super::{like_pattern, LendingStore, LendingTx};

const DETAILS_SELECT: &str = r#"
    SELECT r.id, r.book_id, r.student_id, r.borrow_date, r.return_date,
           b.title AS book_title, b.author AS book_author, b.isbn AS book_isbn,
           b.available_copies AS book_available_copies,
           b.created_at AS book_created_at, b.updated_at AS book_updated_at,
           s.name AS student_name, s.matric_number AS student_matric_number,
           s.level AS student_level, s.department AS student_department,
           s.created_at AS student_created_at, s.updated_at AS student_updated_at
    FROM borrow_records r
    JOIN books b ON b.id = r.book_id
    JOIN students s ON s.id = r.student_id
    WHERE 1=1
"#;

#[derive(Clone)]
pub struct BorrowRecordsRepository {
    pool: Pool<Postgres>,
}

impl BorrowRecordsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

fn details_from_row(row: &PgRow) -> Result<BorrowRecordDetails, sqlx::Error> {
    let record = BorrowRecord {
        id: row.try_get("id")?,
        book_id: row.try_get("book_id")?,
        student_id: row.try_get("student_id")?,
        borrow_date: row.try_get("borrow_date")?,
        return_date: row.try_get("return_date")?,
    };
    let book = Book {
        id: record.book_id,
        title: row.try_get("book_title")?,
        author: row.try_get("book_author")?,
        isbn: row.try_get("book_isbn")?,
        available_copies: row.try_get("book_available_copies")?,
        created_at: row.try_get("book_created_at")?,
        updated_at: row.try_get("book_updated_at")?,
    };
    let student = Student {
        id: record.student_id,
        name: row.try_get("student_name")?,
        matric_number: row.try_get("student_matric_number")?,
        level: row.try_get("student_level")?,
        department: row.try_get("student_department")?,
        created_at: row.try_get("student_created_at")?,
        updated_at: row.try_get("student_updated_at")?,
    };
    Ok(BorrowRecordDetails::new(record, book, student))
}

/// Appends the filter's conditions to a query started from `DETAILS_SELECT`
fn push_filter(query: &mut QueryBuilder<'_, Postgres>, filter: &BorrowRecordFilter) {
    if let Some((start, end)) = filter.borrow_day_range() {
        query.push(" AND r.borrow_date >= ").push_bind(start);
        query.push(" AND r.borrow_date < ").push_bind(end);
    }
    if let Some(before) = filter.borrowed_before {
        query.push(" AND r.borrow_date < ").push_bind(before);
    }
    match filter.is_returned {
        Some(true) => {
            query.push(" AND r.return_date IS NOT NULL");
        }
        Some(false) => {
            query.push(" AND r.return_date IS NULL");
        }
        None => {}
    }

    let text_filters = [
        ("s.name", &filter.student_name),
        ("s.matric_number", &filter.student_matric_no),
        ("b.title", &filter.title),
        ("b.isbn", &filter.isbn),
        ("b.author", &filter.author),
    ];
    for (column, value) in text_filters {
        if let Some(value) = value {
            query
                .push(format!(" AND {} ILIKE ", column))
                .push_bind(like_pattern(value));
        }
    }
}

#[async_trait]
impl LendingStore for BorrowRecordsRepository {
    async fn begin(&self) -> AppResult<Box<dyn LendingTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgLendingTx { tx }))
    }

    async fn find_records(&self, filter: &BorrowRecordFilter) -> AppResult<Vec<BorrowRecordDetails>> {
        let mut query = QueryBuilder::<Postgres>::new(DETAILS_SELECT);
        push_filter(&mut query, filter);
        query.push(" ORDER BY r.borrow_date DESC, r.id DESC");

        let rows = query.build().fetch_all(&self.pool).await?;
        let records = rows
            .iter()
            .map(details_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Open PostgreSQL transaction. sqlx rolls it back when dropped uncommitted.
pub struct PgLendingTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LendingTx for PgLendingTx {
    async fn find_book(&mut self, id: i32) -> AppResult<Option<Book>> {
        let book = sqlx::query_as::<_, Book>(
            r#"
            SELECT id, title, author, isbn, available_copies, created_at, updated_at
            FROM books
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(book)
    }

    async fn update_available_copies(&mut self, id: i32, available_copies: i32) -> AppResult<Book> {
        let book = sqlx::query_as::<_, Book>(
            r#"
            UPDATE books SET available_copies = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING id, title, author, isbn, available_copies, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(available_copies)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(book)
    }

    async fn find_student(&mut self, id: i32) -> AppResult<Option<Student>> {
        // FOR SHARE keeps the student from being deleted under an in-flight borrow
        let student = sqlx::query_as::<_, Student>(
            r#"
            SELECT id, name, matric_number, level, department, created_at, updated_at
            FROM students
            WHERE id = $1
            FOR SHARE
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(student)
    }

    async fn find_open_record(&mut self, book_id: i32, student_id: i32) -> AppResult<Option<BorrowRecord>> {
        let record = sqlx::query_as::<_, BorrowRecord>(
            r#"
            SELECT id, book_id, student_id, borrow_date, return_date
            FROM borrow_records
            WHERE book_id = $1 AND student_id = $2 AND return_date IS NULL
            LIMIT 1
            "#,
        )
        .bind(book_id)
        .bind(student_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(record)
    }

    async fn create_record(
        &mut self,
        book_id: i32,
        student_id: i32,
        borrow_date: DateTime<Utc>,
    ) -> AppResult<BorrowRecord> {
        let record = sqlx::query_as::<_, BorrowRecord>(
            r#"
            INSERT INTO borrow_records (book_id, student_id, borrow_date)
            VALUES ($1, $2, $3)
            RETURNING id, book_id, student_id, borrow_date, return_date
            "#,
        )
        .bind(book_id)
        .bind(student_id)
        .bind(borrow_date)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(record)
    }

    async fn find_record(&mut self, id: i32) -> AppResult<Option<BorrowRecord>> {
        let record = sqlx::query_as::<_, BorrowRecord>(
            r#"
            SELECT id, book_id, student_id, borrow_date, return_date
            FROM borrow_records
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(record)
    }

    async fn set_return_date(&mut self, id: i32, return_date: DateTime<Utc>) -> AppResult<BorrowRecord> {
        let record = sqlx::query_as::<_, BorrowRecord>(
            r#"
            UPDATE borrow_records SET return_date = $2
            WHERE id = $1
            RETURNING id, book_id, student_id, borrow_date, return_date
            "#,
        )
        .bind(id)
        .bind(return_date)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(record)
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    fn filtered_sql(filter: &BorrowRecordFilter) -> String {
        let mut query = QueryBuilder::<Postgres>::new(DETAILS_SELECT);
        push_filter(&mut query, filter);
        query.sql().to_string()
    }

    #[test]
    fn test_empty_filter_adds_no_conditions() {
        assert_eq!(filtered_sql(&BorrowRecordFilter::default()), DETAILS_SELECT);
    }

    #[test]
    fn test_every_filter_field_becomes_a_bound_condition() {
        let filter = BorrowRecordFilter {
            borrow_date: NaiveDate::from_ymd_opt(2024, 5, 1),
            is_returned: Some(false),
            student_name: Some("ada".to_string()),
            student_matric_no: Some("MTH".to_string()),
            title: Some("gatsby".to_string()),
            isbn: Some("0743".to_string()),
            author: Some("fitz".to_string()),
            borrowed_before: Some(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()),
        };

        let sql = filtered_sql(&filter);
        let conditions = sql.strip_prefix(DETAILS_SELECT).unwrap();
        assert_eq!(
            conditions,
            " AND r.borrow_date >= $1 AND r.borrow_date < $2\
             \x20AND r.borrow_date < $3\
             \x20AND r.return_date IS NULL\
             \x20AND s.name ILIKE $4\
             \x20AND s.matric_number ILIKE $5\
             \x20AND b.title ILIKE $6\
             \x20AND b.isbn ILIKE $7\
             \x20AND b.author ILIKE $8"
        );
    }

    #[test]
    fn test_returned_filter_checks_for_return_date() {
        let filter = BorrowRecordFilter {
            is_returned: Some(true),
            ..Default::default()
        };
        assert!(filtered_sql(&filter).ends_with(" AND r.return_date IS NOT NULL"));
    }
}
