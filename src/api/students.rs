//! Student register endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use validator::Validate;

use crate::{
    error::AppResult,
    models::{CreateStudent, Role, Student, StudentFilter, UpdateStudent},
};

use super::{AppJson, AuthenticatedUser};

/// List students
#[utoipa::path(
    get,
    path = "/students",
    tag = "students",
    security(("bearer_auth" = [])),
    params(StudentFilter),
    responses(
        (status = 200, description = "Students matching every given filter", body = Vec<Student>),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn list_students(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(filter): Query<StudentFilter>,
) -> AppResult<Json<Vec<Student>>> {
    claims.require_role(Role::ANY)?;

    let students = state.services.students.find_all(&filter).await?;
    Ok(Json(students))
}

/// Get a student by ID
#[utoipa::path(
    get,
    path = "/students/{id}",
    tag = "students",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Student ID")
    ),
    responses(
        (status = 200, description = "Student details", body = Student),
        (status = 404, description = "Student not found")
    )
)]
pub async fn get_student(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<Student>> {
    claims.require_role(Role::ANY)?;

    let student = state.services.students.find_by_id(id, Some(claims.user_id)).await?;
    Ok(Json(student))
}

/// Register a student
#[utoipa::path(
    post,
    path = "/students",
    tag = "students",
    security(("bearer_auth" = [])),
    request_body = CreateStudent,
    responses(
        (status = 201, description = "Student registered", body = Student),
        (status = 400, description = "Invalid input"),
        (status = 403, description = "Role not permitted"),
        (status = 409, description = "Matric number already registered")
    )
)]
pub async fn create_student(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    AppJson(data): AppJson<CreateStudent>,
) -> AppResult<(StatusCode, Json<Student>)> {
    claims.require_role(Role::STAFF)?;
    data.validate()?;

    let student = state.services.students.create(data, Some(claims.user_id)).await?;
    Ok((StatusCode::CREATED, Json(student)))
}

/// Update some fields of a student
#[utoipa::path(
    patch,
    path = "/students/{id}",
    tag = "students",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Student ID")
    ),
    request_body = UpdateStudent,
    responses(
        (status = 200, description = "Student updated", body = Student),
        (status = 400, description = "Invalid input"),
        (status = 404, description = "Student not found"),
        (status = 409, description = "Matric number already registered")
    )
)]
pub async fn update_student(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
    AppJson(data): AppJson<UpdateStudent>,
) -> AppResult<Json<Student>> {
    claims.require_role(Role::STAFF)?;
    data.validate()?;

    let student = state.services.students.update(id, data, Some(claims.user_id)).await?;
    Ok(Json(student))
}

/// Remove a student
#[utoipa::path(
    delete,
    path = "/students/{id}",
    tag = "students",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Student ID")
    ),
    responses(
        (status = 200, description = "Deleted student", body = Student),
        (status = 404, description = "Student not found"),
        (status = 409, description = "Student has borrow records")
    )
)]
pub async fn delete_student(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<Student>> {
    claims.require_role(Role::STAFF)?;

    let student = state.services.students.delete(id, Some(claims.user_id)).await?;
    Ok(Json(student))
}
