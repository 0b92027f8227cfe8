//! Books repository for database operations

use async_trait::async_trait;
use sqlx::{Pool, Postgres, QueryBuilder};

use crate::{
    error::AppResult,
    models::{normalize_isbn, Book, BookFilter, CreateBook, Entity, UpdateBook},
};

use super::{like_pattern, map_write_error, CrudRepository};

const BOOK_COLUMNS: &str = "id, title, author, isbn, available_copies, created_at, updated_at";

#[derive(Clone)]
pub struct BooksRepository {
    pool: Pool<Postgres>,
}

impl BooksRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CrudRepository<Book> for BooksRepository {
    async fn create(&self, data: &CreateBook) -> AppResult<Book> {
        sqlx::query_as::<_, Book>(&format!(
            r#"
            INSERT INTO books (title, author, isbn, available_copies)
            VALUES ($1, $2, $3, $4)
            RETURNING {}
            "#,
            BOOK_COLUMNS
        ))
        .bind(&data.title)
        .bind(&data.author)
        .bind(normalize_isbn(&data.isbn))
        .bind(data.available_copies)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_write_error(Book::NAME, e))
    }

    async fn find_by_id(&self, id: i32) -> AppResult<Option<Book>> {
        let book = sqlx::query_as::<_, Book>(&format!("SELECT {} FROM books WHERE id = $1", BOOK_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(book)
    }

    async fn find_all(&self, filter: &BookFilter) -> AppResult<Vec<Book>> {
        let mut query = QueryBuilder::<Postgres>::new(format!("SELECT {} FROM books WHERE 1=1", BOOK_COLUMNS));

        if let Some(ref title) = filter.title {
            query.push(" AND title ILIKE ").push_bind(like_pattern(title));
        }
        if let Some(ref author) = filter.author {
            query.push(" AND author ILIKE ").push_bind(like_pattern(author));
        }
        if let Some(ref isbn) = filter.isbn {
            query.push(" AND isbn ILIKE ").push_bind(like_pattern(&normalize_isbn(isbn)));
        }
        match filter.is_available {
            Some(true) => {
                query.push(" AND available_copies > 0");
            }
            Some(false) => {
                query.push(" AND available_copies = 0");
            }
            None => {}
        }
        query.push(" ORDER BY id");

        let books = query.build_query_as::<Book>().fetch_all(&self.pool).await?;
        Ok(books)
    }

    async fn update(&self, id: i32, data: &UpdateBook) -> AppResult<Option<Book>> {
        sqlx::query_as::<_, Book>(&format!(
            r#"
            UPDATE books SET
                title = COALESCE($2, title),
                author = COALESCE($3, author),
                isbn = COALESCE($4, isbn),
                available_copies = COALESCE($5, available_copies),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            BOOK_COLUMNS
        ))
        .bind(id)
        .bind(&data.title)
        .bind(&data.author)
        .bind(data.isbn.as_deref().map(normalize_isbn))
        .bind(data.available_copies)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_write_error(Book::NAME, e))
    }

    async fn delete(&self, id: i32) -> AppResult<Option<Book>> {
        sqlx::query_as::<_, Book>(&format!("DELETE FROM books WHERE id = $1 RETURNING {}", BOOK_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_write_error(Book::NAME, e))
    }
}
