//! OpenAPI documentation

use axum::Router;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{books, borrowed_books, health, students};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Library Lending API",
        version = "1.0.0",
        description = "Book lending REST API for a campus library"
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Borrowed books
        borrowed_books::borrow_book,
        borrowed_books::return_book,
        borrowed_books::list_borrowed_books,
        borrowed_books::list_overdue,
        // Books
        books::list_books,
        books::list_available_books,
        books::get_book,
        books::create_book,
        books::update_book,
        books::delete_book,
        // Students
        students::list_students,
        students::get_student,
        students::create_student,
        students::update_student,
        students::delete_student,
    ),
    components(
        schemas(
            // Borrowed books
            borrowed_books::BorrowRequest,
            crate::models::BorrowRecord,
            crate::models::BorrowRecordDetails,
            crate::models::BorrowStatus,
            // Books
            crate::models::Book,
            crate::models::CreateBook,
            crate::models::UpdateBook,
            // Students
            crate::models::Student,
            crate::models::CreateStudent,
            crate::models::UpdateStudent,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "borrowed-books", description = "Borrowing and returning books"),
        (name = "books", description = "Book catalog management"),
        (name = "students", description = "Student register management")
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
