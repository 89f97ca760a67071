//! OpenAPI documentation

use axum::Router;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{auth, authors, books, health, loans};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Librairie API",
        version = "1.0.0",
        description = "Library catalog, loans and accounts REST API",
        license(name = "AGPL-3.0", url = "https://www.gnu.org/licenses/agpl-3.0.html")
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Auth
        auth::register,
        auth::login,
        auth::request_admin_code,
        auth::verify_admin_code,
        auth::me,
        // Books
        books::list_books,
        books::get_book,
        books::create_book,
        books::update_book,
        books::delete_book,
        // Authors
        authors::list_authors,
        authors::get_author,
        authors::create_author,
        // Loans
        loans::create_loan,
        loans::return_loan,
        loans::my_loans,
        loans::list_loans,
    ),
    components(
        schemas(
            // Auth
            auth::AuthResponse,
            auth::MessageResponse,
            crate::models::user::RegisterRequest,
            crate::models::user::LoginRequest,
            crate::models::user::UserSummary,
            crate::models::user::Role,
            crate::models::admin_code::RequestAdminCode,
            crate::models::admin_code::VerifyAdminCode,
            // Catalog
            crate::models::book::BookDetails,
            crate::models::book::BookInput,
            crate::models::author::Author,
            crate::models::author::CreateAuthor,
            // Loans
            loans::CreateLoanRequest,
            loans::ReturnResponse,
            crate::models::loan::Loan,
            crate::models::loan::LoanDetails,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "auth", description = "Registration, login and admin verification codes"),
        (name = "books", description = "Book catalog"),
        (name = "authors", description = "Authors"),
        (name = "loans", description = "Loan management")
    )
)]
pub struct ApiDoc;

/// Registers the `bearer_auth` scheme referenced by protected paths
struct BearerAuth;

impl Modify for BearerAuth {
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
