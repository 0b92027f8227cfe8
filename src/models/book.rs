//! Book model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::{Validate, ValidationError};

use super::{contains_ci, Entity};

/// Book model from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub id: i32,
    pub title: String,
    pub author: String,
    #[serde(rename = "ISBN")]
    pub isbn: String,
    /// Copies currently on the shelf
    pub available_copies: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for Book {
    const NAME: &'static str = "Book";

    type Create = CreateBook;
    type Update = UpdateBook;
    type Filter = BookFilter;

    fn id(&self) -> i32 {
        self.id
    }
}

/// Create book request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateBook {
    #[validate(length(min = 1, message = "Title must not be empty"))]
    pub title: String,
    #[validate(length(min = 1, message = "Author must not be empty"))]
    pub author: String,
    #[serde(rename = "ISBN")]
    #[validate(custom(function = "validate_isbn"))]
    pub isbn: String,
    #[validate(range(min = 1, max = 100_000, message = "A new book needs between 1 and 100000 copies"))]
    pub available_copies: i32,
}

/// Partial book update
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBook {
    #[validate(length(min = 1, message = "Title must not be empty"))]
    pub title: Option<String>,
    #[validate(length(min = 1, message = "Author must not be empty"))]
    pub author: Option<String>,
    #[serde(rename = "ISBN")]
    #[validate(custom(function = "validate_isbn"))]
    pub isbn: Option<String>,
    #[validate(range(min = 0, max = 100_000, message = "Available copies must be between 0 and 100000"))]
    pub available_copies: Option<i32>,
}

/// Book list filters
#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct BookFilter {
    /// Search in title
    pub title: Option<String>,
    /// Search by author
    pub author: Option<String>,
    /// Search by ISBN
    #[serde(rename = "ISBN")]
    pub isbn: Option<String>,
    /// Only books with (true) or without (false) copies on the shelf
    pub is_available: Option<bool>,
}

impl BookFilter {
    pub fn matches(&self, book: &Book) -> bool {
        self.title.as_deref().map_or(true, |t| contains_ci(&book.title, t))
            && self.author.as_deref().map_or(true, |a| contains_ci(&book.author, a))
            && self
                .isbn
                .as_deref()
                .map_or(true, |i| contains_ci(&book.isbn, &normalize_isbn(i)))
            && self
                .is_available
                .map_or(true, |available| (book.available_copies > 0) == available)
    }
}

/// Stored form of an ISBN: hyphens and spaces removed, check digit `X` upper-cased
pub fn normalize_isbn(isbn: &str) -> String {
    isbn.chars()
        .filter(|c| *c != '-' && *c != ' ')
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Accepts ISBN-10 or ISBN-13, with optional hyphens or spaces
pub fn validate_isbn(isbn: &str) -> Result<(), ValidationError> {
    let compact: Vec<char> = normalize_isbn(isbn).chars().collect();

    let valid = match compact.len() {
        10 => {
            let check = match compact[9] {
                'X' => Some(10),
                c => c.to_digit(10),
            };
            let sum = compact[..9]
                .iter()
                .enumerate()
                .map(|(i, c)| c.to_digit(10).map(|d| d * (10 - i as u32)))
                .sum::<Option<u32>>();
            match (sum, check) {
                (Some(sum), Some(check)) => (sum + check) % 11 == 0,
                _ => false,
            }
        }
        13 => compact
            .iter()
            .enumerate()
            .map(|(i, c)| c.to_digit(10).map(|d| if i % 2 == 0 { d } else { d * 3 }))
            .sum::<Option<u32>>()
            .map_or(false, |sum| sum % 10 == 0),
        _ => false,
    };

    if valid {
        Ok(())
    } else {
        let mut error = ValidationError::new("isbn");
        error.message = Some("Invalid ISBN".into());
        Err(error)
    }
}
