//! In-process API tests over the memory backend
//!
//! Requests go straight through the router with `oneshot`; no server or
//! database is needed.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use librairie_server::{
    api,
    repository::Repository,
    services::{clock::SystemClock, email::Mailer},
    AppConfig, AppResult, AppState,
};

/// Mailer keeping the last code per recipient
#[derive(Default)]
struct Outbox {
    sent: Mutex<Vec<(String, String)>>,
}

impl Outbox {
    fn last_code_for(&self, to: &str) -> Option<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(address, _)| address == to)
            .map(|(_, code)| code.clone())
    }
}

#[async_trait]
impl Mailer for Outbox {
    async fn send_admin_code(&self, to: &str, code: &str, _valid_minutes: i64) -> AppResult<()> {
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), code.to_string()));
        Ok(())
    }
}

struct TestApp {
    router: Router,
    outbox: Arc<Outbox>,
}

impl TestApp {
    fn new() -> Self {
        let outbox = Arc::new(Outbox::default());
        let state = AppState::new(
            AppConfig::default(),
            Repository::in_memory(),
            outbox.clone(),
            Arc::new(SystemClock),
        );
        Self {
            router: api::router(state),
            outbox,
        }
    }

    async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(format!("/api/v1{}", uri));
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    /// Register a member and return its token
    async fn member(&self, email: &str) -> String {
        let (status, body) = self
            .send(
                Method::POST,
                "/auth/register",
                None,
                Some(json!({ "name": "Reader", "email": email, "password": "secret1" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["token"].as_str().unwrap().to_string()
    }

    /// Create an author and a book, returning the book id
    async fn book(&self, token: &str, copies: i32) -> i64 {
        let (status, author) = self
            .send(
                Method::POST,
                "/authors",
                Some(token),
                Some(json!({ "name": "Italo Calvino" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{author}");

        let (status, book) = self
            .send(
                Method::POST,
                "/books",
                Some(token),
                Some(json!({
                    "title": "Invisible Cities",
                    "author": author["id"],
                    "genre": "Fiction",
                    "copiesAvailable": copies,
                    "image": "https://covers.example.org/cities.jpg"
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{book}");
        book["id"].as_i64().unwrap()
    }
}

#[tokio::test]
async fn test_health_and_ready() {
    let app = TestApp::new();

    let (status, body) = app.send(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = app.send(Method::GET, "/ready", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn test_register_login_and_me() {
    let app = TestApp::new();

    let (status, body) = app
        .send(
            Method::POST,
            "/auth/register",
            None,
            Some(json!({ "name": "Ada", "email": "Ada@Example.org", "password": "secret1" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["tokenType"], "Bearer");
    assert_eq!(body["user"]["email"], "ada@example.org");
    assert_eq!(body["user"]["role"], "member");
    assert!(body["user"].get("password").is_none());

    let (status, body) = app
        .send(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "email": "ada@example.org", "password": "secret1" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let token = body["token"].as_str().unwrap().to_string();

    let (status, body) = app.send(Method::GET, "/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Ada");
}

#[tokio::test]
async fn test_duplicate_email_and_short_password_are_bad_requests() {
    let app = TestApp::new();
    app.member("ada@example.org").await;

    let (status, body) = app
        .send(
            Method::POST,
            "/auth/register",
            None,
            Some(json!({ "name": "Ada", "email": "ada@example.org", "password": "secret1" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Duplicate");

    let (status, body) = app
        .send(
            Method::POST,
            "/auth/register",
            None,
            Some(json!({ "name": "Bob", "email": "bob@example.org", "password": "abc" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "BadValue");
}

#[tokio::test]
async fn test_wrong_password_is_unauthorized() {
    let app = TestApp::new();
    app.member("ada@example.org").await;

    let (status, body) = app
        .send(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "email": "ada@example.org", "password": "wrong-one" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid credentials");
}

#[tokio::test]
async fn test_login_accepts_padded_email() {
    let app = TestApp::new();
    app.member(" Ada@Example.org ").await;

    let (status, body) = app
        .send(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "email": " Ada@Example.org ", "password": "secret1" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["user"]["email"], "ada@example.org");
}

#[tokio::test]
async fn test_malformed_bodies_get_json_validation_errors() {
    let app = TestApp::new();

    let (status, body) = app
        .send(
            Method::POST,
            "/auth/register",
            None,
            Some(json!({ "name": "Ada", "password": "secret1" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "BadValue");
    assert_eq!(body["code"], 5);
    assert!(body["message"].as_str().unwrap().contains("email"));

    let token = app.member("reader@example.org").await;
    for payload in [json!({}), json!({ "bookId": "abc" })] {
        let (status, body) = app
            .send(Method::POST, "/loans", Some(&token), Some(payload))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "BadValue");
        assert!(body["message"].is_string());
    }
}

#[tokio::test]
async fn test_protected_routes_require_credential() {
    let app = TestApp::new();

    let (status, _) = app
        .send(Method::POST, "/loans", None, Some(json!({ "bookId": 1 })))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .send(Method::GET, "/loans/my-loans", Some("garbage"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_registration_flow() {
    let app = TestApp::new();
    let email = "librarian@yourlibrary.com";

    let (status, _) = app
        .send(
            Method::POST,
            "/auth/request-admin-code",
            None,
            Some(json!({ "email": email })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let code = app.outbox.last_code_for(email).unwrap();

    let (status, _) = app
        .send(
            Method::POST,
            "/auth/verify-admin-code",
            None,
            Some(json!({ "email": email, "code": code })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let registration = json!({
        "name": "Librarian",
        "email": email,
        "password": "secret1",
        "role": "admin",
        "adminCode": code
    });
    let (status, body) = app
        .send(Method::POST, "/auth/register", None, Some(registration.clone()))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["user"]["role"], "admin");

    // The code was consumed by the first registration
    let (status, body) = app
        .send(
            Method::POST,
            "/auth/verify-admin-code",
            None,
            Some(json!({ "email": email, "code": code })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "InvalidAdminCode");
}

#[tokio::test]
async fn test_admin_code_for_foreign_domain_is_forbidden() {
    let app = TestApp::new();

    let (status, body) = app
        .send(
            Method::POST,
            "/auth/request-admin-code",
            None,
            Some(json!({ "email": "someone@gmail.com" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "DomainNotAllowed");
    assert!(app.outbox.last_code_for("someone@gmail.com").is_none());
}

#[tokio::test]
async fn test_admin_registration_without_code_is_rejected() {
    let app = TestApp::new();

    let (status, _) = app
        .send(
            Method::POST,
            "/auth/register",
            None,
            Some(json!({
                "name": "Mallory",
                "email": "mallory@yourlibrary.com",
                "password": "secret1",
                "role": "admin"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .send(
            Method::POST,
            "/auth/register",
            None,
            Some(json!({
                "name": "Mallory",
                "email": "mallory@yourlibrary.com",
                "password": "secret1",
                "role": "admin",
                "adminCode": "123456"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "InvalidAdminCode");
}

#[tokio::test]
async fn test_books_expand_author_and_support_crud() {
    let app = TestApp::new();
    let token = app.member("ada@example.org").await;
    let book_id = app.book(&token, 2).await;

    let (status, books) = app.send(Method::GET, "/books", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(books.as_array().unwrap().len(), 1);
    assert_eq!(books[0]["author"]["name"], "Italo Calvino");
    assert_eq!(books[0]["copiesAvailable"], 2);

    let author_id = books[0]["author"]["id"].clone();
    let (status, updated) = app
        .send(
            Method::PUT,
            &format!("/books/{}", book_id),
            Some(&token),
            Some(json!({
                "title": "If on a winter's night a traveler",
                "author": author_id,
                "genre": "Fiction",
                "copiesAvailable": 4
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["copiesAvailable"], 4);

    let (status, _) = app
        .send(Method::DELETE, &format!("/books/{}", book_id), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .send(Method::GET, &format!("/books/{}", book_id), None, None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NoSuchEntity");
}

#[tokio::test]
async fn test_book_with_invalid_image_is_rejected() {
    let app = TestApp::new();
    let token = app.member("ada@example.org").await;
    app.book(&token, 1).await;

    let (status, _) = app
        .send(
            Method::POST,
            "/books",
            Some(&token),
            Some(json!({
                "title": "Bad cover",
                "author": 1,
                "genre": "Fiction",
                "image": "cover.exe"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_borrow_and_return_round_trip() {
    let app = TestApp::new();
    let token = app.member("ada@example.org").await;
    let book_id = app.book(&token, 3).await;

    let (status, loan) = app
        .send(Method::POST, "/loans", Some(&token), Some(json!({ "bookId": book_id })))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{loan}");
    assert_eq!(loan["returned"], false);

    let (_, book) = app
        .send(Method::GET, &format!("/books/{}", book_id), None, None)
        .await;
    assert_eq!(book["copiesAvailable"], 2);

    let (status, loans) = app
        .send(Method::GET, "/loans/my-loans", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(loans.as_array().unwrap().len(), 1);
    assert_eq!(loans[0]["book"]["title"], "Invisible Cities");

    let loan_uri = format!("/loans/{}/return", loan["id"]);
    let (status, body) = app.send(Method::PUT, &loan_uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["loan"]["returned"], true);

    let (_, book) = app
        .send(Method::GET, &format!("/books/{}", book_id), None, None)
        .await;
    assert_eq!(book["copiesAvailable"], 3);

    let (status, body) = app.send(Method::PUT, &loan_uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "LoanAlreadyReturned");
}

#[tokio::test]
async fn test_borrow_failures() {
    let app = TestApp::new();
    let token = app.member("ada@example.org").await;
    let book_id = app.book(&token, 0).await;

    let (status, body) = app
        .send(Method::POST, "/loans", Some(&token), Some(json!({ "bookId": book_id })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "BookNotAvailable");

    let (status, _) = app
        .send(Method::POST, "/loans", Some(&token), Some(json!({ "bookId": 9999 })))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .send(Method::PUT, "/loans/9999/return", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_members_cannot_return_or_list_others_loans() {
    let app = TestApp::new();
    let owner = app.member("owner@example.org").await;
    let other = app.member("other@example.org").await;
    let book_id = app.book(&owner, 1).await;

    let (_, loan) = app
        .send(Method::POST, "/loans", Some(&owner), Some(json!({ "bookId": book_id })))
        .await;

    let (status, _) = app
        .send(
            Method::PUT,
            &format!("/loans/{}/return", loan["id"]),
            Some(&other),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, loans) = app.send(Method::GET, "/loans/my-loans", Some(&other), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(loans.as_array().unwrap().is_empty());

    let (status, _) = app.send(Method::GET, "/loans", Some(&other), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_openapi_document_is_served() {
    let app = TestApp::new();
    let request = Request::builder()
        .uri("/api-docs/openapi.json")
        .body(Body::empty())
        .unwrap();

    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
