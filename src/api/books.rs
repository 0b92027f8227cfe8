//! Book catalog endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use validator::Validate;

use crate::{
    error::AppResult,
    models::{Book, BookFilter, CreateBook, Role, UpdateBook},
};

use super::{AppJson, AuthenticatedUser};

/// List books
#[utoipa::path(
    get,
    path = "/books",
    tag = "books",
    security(("bearer_auth" = [])),
    params(BookFilter),
    responses(
        (status = 200, description = "Books matching every given filter", body = Vec<Book>),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn list_books(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(filter): Query<BookFilter>,
) -> AppResult<Json<Vec<Book>>> {
    claims.require_role(Role::ANY)?;

    let books = state.services.books.find_all(&filter).await?;
    Ok(Json(books))
}

/// List books with at least one copy on the shelf
#[utoipa::path(
    get,
    path = "/books/available",
    tag = "books",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Available books", body = Vec<Book>),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn list_available_books(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Vec<Book>>> {
    claims.require_role(Role::ANY)?;

    let filter = BookFilter {
        is_available: Some(true),
        ..Default::default()
    };
    let books = state.services.books.find_all(&filter).await?;
    Ok(Json(books))
}

/// Get a book by ID
#[utoipa::path(
    get,
    path = "/books/{id}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Book ID")
    ),
    responses(
        (status = 200, description = "Book details", body = Book),
        (status = 404, description = "Book not found")
    )
)]
pub async fn get_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<Book>> {
    claims.require_role(Role::ANY)?;

    let book = state.services.books.find_by_id(id, Some(claims.user_id)).await?;
    Ok(Json(book))
}

/// Add a book to the catalog
#[utoipa::path(
    post,
    path = "/books",
    tag = "books",
    security(("bearer_auth" = [])),
    request_body = CreateBook,
    responses(
        (status = 201, description = "Book created", body = Book),
        (status = 400, description = "Invalid input"),
        (status = 403, description = "Role not permitted"),
        (status = 409, description = "ISBN already registered")
    )
)]
pub async fn create_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    AppJson(data): AppJson<CreateBook>,
) -> AppResult<(StatusCode, Json<Book>)> {
    claims.require_role(Role::STAFF)?;
    data.validate()?;

    let book = state.services.books.create(data, Some(claims.user_id)).await?;
    Ok((StatusCode::CREATED, Json(book)))
}

/// Update some fields of a book
#[utoipa::path(
    patch,
    path = "/books/{id}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Book ID")
    ),
    request_body = UpdateBook,
    responses(
        (status = 200, description = "Book updated", body = Book),
        (status = 400, description = "Invalid input"),
        (status = 404, description = "Book not found"),
        (status = 409, description = "ISBN already registered")
    )
)]
pub async fn update_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
    AppJson(data): AppJson<UpdateBook>,
) -> AppResult<Json<Book>> {
    claims.require_role(Role::STAFF)?;
    data.validate()?;

    let book = state.services.books.update(id, data, Some(claims.user_id)).await?;
    Ok(Json(book))
}

/// Remove a book from the catalog
#[utoipa::path(
    delete,
    path = "/books/{id}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Book ID")
    ),
    responses(
        (status = 200, description = "Deleted book", body = Book),
        (status = 404, description = "Book not found"),
        (status = 409, description = "Book has borrow records")
    )
)]
pub async fn delete_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<Book>> {
    claims.require_role(Role::STAFF)?;

    let book = state.services.books.delete(id, Some(claims.user_id)).await?;
    Ok(Json(book))
}
