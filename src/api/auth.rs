//! Authentication and admin code endpoints

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    error::AppResult,
    models::{
        admin_code::{RequestAdminCode, VerifyAdminCode},
        user::{normalize_email, LoginRequest, RegisterRequest, Registration, UserSummary},
    },
    services::auth::IssuedToken,
    AppState,
};

use super::{AppJson, AuthenticatedUser};

/// Credential returned by register and login
#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    /// JWT bearer token
    pub token: String,
    /// Always "Bearer"
    pub token_type: String,
    /// Seconds until the token expires
    pub expires_in: i64,
    pub user: UserSummary,
}

impl From<IssuedToken> for AuthResponse {
    fn from(issued: IssuedToken) -> Self {
        Self {
            token: issued.token,
            token_type: "Bearer".to_string(),
            expires_in: issued.expires_in,
            user: issued.user.into(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

/// Register a member, or an admin holding a verification code
#[utoipa::path(
    post,
    path = "/auth/register",
    tag = "auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered", body = AuthResponse),
        (status = 400, description = "Invalid input, duplicate email or bad admin code", body = crate::error::ErrorResponse)
    )
)]
pub async fn register(
    State(state): State<AppState>,
    AppJson(request): AppJson<RegisterRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    let registration = Registration::try_from(request)?;
    let issued = state.services.auth.register(registration).await?;
    Ok((StatusCode::CREATED, Json(issued.into())))
}

/// Login with email and password
#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials", body = crate::error::ErrorResponse)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    AppJson(mut request): AppJson<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    request.email = normalize_email(&request.email);
    request.validate()?;
    let issued = state
        .services
        .auth
        .login(&request.email, &request.password)
        .await?;
    Ok(Json(issued.into()))
}

/// Send an admin verification code to an address of the library domain
#[utoipa::path(
    post,
    path = "/auth/request-admin-code",
    tag = "auth",
    request_body = RequestAdminCode,
    responses(
        (status = 200, description = "Code sent", body = MessageResponse),
        (status = 400, description = "Invalid email", body = crate::error::ErrorResponse),
        (status = 403, description = "Email outside the admin domain", body = crate::error::ErrorResponse),
        (status = 500, description = "Code could not be delivered", body = crate::error::ErrorResponse)
    )
)]
pub async fn request_admin_code(
    State(state): State<AppState>,
    AppJson(mut request): AppJson<RequestAdminCode>,
) -> AppResult<Json<MessageResponse>> {
    request.email = normalize_email(&request.email);
    request.validate()?;
    state.services.admin_codes.request_code(&request.email).await?;
    Ok(Json(MessageResponse {
        message: "Verification code sent".to_string(),
    }))
}

/// Check a verification code without consuming it
#[utoipa::path(
    post,
    path = "/auth/verify-admin-code",
    tag = "auth",
    request_body = VerifyAdminCode,
    responses(
        (status = 200, description = "Code is valid", body = MessageResponse),
        (status = 400, description = "Invalid or expired code", body = crate::error::ErrorResponse)
    )
)]
pub async fn verify_admin_code(
    State(state): State<AppState>,
    AppJson(mut request): AppJson<VerifyAdminCode>,
) -> AppResult<Json<MessageResponse>> {
    request.email = normalize_email(&request.email);
    request.validate()?;
    state
        .services
        .admin_codes
        .verify(&request.email, &request.code)
        .await?;
    Ok(Json(MessageResponse {
        message: "Verification code is valid".to_string(),
    }))
}

/// Get current user profile
#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "auth",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Current user", body = UserSummary),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorResponse)
    )
)]
pub async fn me(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<UserSummary>> {
    let user = state.services.auth.me(&claims).await?;
    Ok(Json(user.into()))
}
