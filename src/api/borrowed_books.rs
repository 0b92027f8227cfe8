//! Borrow and return endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{
    error::AppResult,
    models::{normalize_isbn, BorrowRecordDetails, BorrowRecordFilter, Role},
};

use super::{AppJson, AuthenticatedUser};

/// Borrow request
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BorrowRequest {
    #[validate(range(min = 1, message = "bookId must be a positive integer"))]
    pub book_id: i32,
    #[validate(range(min = 1, message = "studentId must be a positive integer"))]
    pub student_id: i32,
}

/// Borrow record listing filters
#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct BorrowRecordQuery {
    /// Day the book was borrowed (YYYY-MM-DD, UTC)
    pub borrow_date: Option<NaiveDate>,
    /// true for returned records, false for books still out
    pub is_returned: Option<bool>,
    pub student_name: Option<String>,
    pub student_matric_no: Option<String>,
    pub title: Option<String>,
    #[serde(rename = "ISBN")]
    pub isbn: Option<String>,
    pub author: Option<String>,
}

impl From<BorrowRecordQuery> for BorrowRecordFilter {
    fn from(query: BorrowRecordQuery) -> Self {
        Self {
            borrow_date: query.borrow_date,
            is_returned: query.is_returned,
            student_name: query.student_name,
            student_matric_no: query.student_matric_no,
            title: query.title,
            isbn: query.isbn.as_deref().map(normalize_isbn),
            author: query.author,
            borrowed_before: None,
        }
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct OverdueQuery {
    /// Days after which an open borrow is overdue (server default when absent)
    pub due_days: Option<i64>,
}

/// Borrow a book for a student
#[utoipa::path(
    post,
    path = "/borrowed-books/borrow",
    tag = "borrowed-books",
    security(("bearer_auth" = [])),
    request_body = BorrowRequest,
    responses(
        (status = 201, description = "Book borrowed", body = BorrowRecordDetails),
        (status = 400, description = "No copies available or book already borrowed by this student"),
        (status = 404, description = "Book or student not found")
    )
)]
pub async fn borrow_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    AppJson(request): AppJson<BorrowRequest>,
) -> AppResult<(StatusCode, Json<BorrowRecordDetails>)> {
    claims.require_role(Role::ANY)?;
    request.validate()?;

    let borrowed = state
        .services
        .lending
        .borrow(request.book_id, request.student_id, Some(claims.user_id))
        .await?;

    Ok((StatusCode::CREATED, Json(borrowed)))
}

/// Return a borrowed book
#[utoipa::path(
    post,
    path = "/borrowed-books/return/{id}",
    tag = "borrowed-books",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Borrow record ID")
    ),
    responses(
        (status = 200, description = "Book returned", body = BorrowRecordDetails),
        (status = 400, description = "Book has already been returned"),
        (status = 404, description = "Borrow record not found")
    )
)]
pub async fn return_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<BorrowRecordDetails>> {
    claims.require_role(Role::ANY)?;

    let returned = state
        .services
        .lending
        .return_book(id, Some(claims.user_id))
        .await?;

    Ok(Json(returned))
}

/// List borrow records, newest first
#[utoipa::path(
    get,
    path = "/borrowed-books",
    tag = "borrowed-books",
    security(("bearer_auth" = [])),
    params(BorrowRecordQuery),
    responses(
        (status = 200, description = "Borrow records matching every given filter", body = Vec<BorrowRecordDetails>),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn list_borrowed_books(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<BorrowRecordQuery>,
) -> AppResult<Json<Vec<BorrowRecordDetails>>> {
    claims.require_role(Role::ANY)?;

    let records = state.services.lending.find_all(&query.into()).await?;
    Ok(Json(records))
}

/// List open borrows older than the due period
#[utoipa::path(
    get,
    path = "/borrowed-books/overdue",
    tag = "borrowed-books",
    security(("bearer_auth" = [])),
    params(OverdueQuery),
    responses(
        (status = 200, description = "Overdue borrow records", body = Vec<BorrowRecordDetails>),
        (status = 403, description = "Role not permitted")
    )
)]
pub async fn list_overdue(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<OverdueQuery>,
) -> AppResult<Json<Vec<BorrowRecordDetails>>> {
    claims.require_role(Role::STAFF)?;

    let records = state.services.lending.find_overdue(query.due_days).await?;
    Ok(Json(records))
}
