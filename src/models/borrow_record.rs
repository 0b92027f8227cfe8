//! Borrow record model and related types

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use super::{book::Book, contains_ci, student::Student};

/// Borrow record from database. `return_date == None` means the book is still out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BorrowRecord {
    pub id: i32,
    pub book_id: i32,
    pub student_id: i32,
    pub borrow_date: DateTime<Utc>,
    pub return_date: Option<DateTime<Utc>>,
}

impl BorrowRecord {
    pub const ENTITY: &'static str = "BorrowRecord";

    pub fn status(&self) -> BorrowStatus {
        match self.return_date {
            None => BorrowStatus::Open,
            Some(_) => BorrowStatus::Closed,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status() == BorrowStatus::Open
    }
}

/// Lifecycle of a borrow record. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BorrowStatus {
    Open,
    Closed,
}

/// Borrow record with its book and student attached
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BorrowRecordDetails {
    pub id: i32,
    pub book_id: i32,
    pub student_id: i32,
    pub borrow_date: DateTime<Utc>,
    pub return_date: Option<DateTime<Utc>>,
    pub status: BorrowStatus,
    pub book: Book,
    pub student: Student,
}

impl BorrowRecordDetails {
    pub fn new(record: BorrowRecord, book: Book, student: Student) -> Self {
        let status = record.status();
        Self {
            id: record.id,
            book_id: record.book_id,
            student_id: record.student_id,
            borrow_date: record.borrow_date,
            return_date: record.return_date,
            status,
            book,
            student,
        }
    }
}

/// Borrow record listing filters. All set fields must match.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BorrowRecordFilter {
    /// Calendar day (UTC) the book was borrowed on
    pub borrow_date: Option<NaiveDate>,
    pub is_returned: Option<bool>,
    pub student_name: Option<String>,
    pub student_matric_no: Option<String>,
    pub title: Option<String>,
    pub isbn: Option<String>,
    pub author: Option<String>,
    /// Only records borrowed strictly before this instant
    pub borrowed_before: Option<DateTime<Utc>>,
}

impl BorrowRecordFilter {
    /// Half-open `[start, end)` range covering `borrow_date`
    pub fn borrow_day_range(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let day = self.borrow_date?;
        let start = Utc.from_utc_datetime(&day.and_hms_opt(0, 0, 0)?);
        let end = Utc.from_utc_datetime(&day.succ_opt()?.and_hms_opt(0, 0, 0)?);
        Some((start, end))
    }

    pub fn matches(&self, details: &BorrowRecordDetails) -> bool {
        if let Some((start, end)) = self.borrow_day_range() {
            if details.borrow_date < start || details.borrow_date >= end {
                return false;
            }
        }
        if let Some(before) = self.borrowed_before {
            if details.borrow_date >= before {
                return false;
            }
        }
        if let Some(returned) = self.is_returned {
            if details.return_date.is_some() != returned {
                return false;
            }
        }

        let text_filters = [
            (&self.student_name, details.student.name.as_str()),
            (&self.student_matric_no, details.student.matric_number.as_str()),
            (&self.title, details.book.title.as_str()),
            (&self.isbn, details.book.isbn.as_str()),
            (&self.author, details.book.author.as_str()),
        ];
        text_filters
            .iter()
            .all(|(needle, haystack)| needle.as_deref().map_or(true, |n| contains_ci(haystack, n)))
    }
}
