//! Authentication service: registration, login and credentials

use std::sync::Arc;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use crate::{
    config::AuthConfig,
    error::{AppError, AppResult},
    models::user::{normalize_email, NewUser, Registration, User, UserClaims},
    repository::UsersStore,
};

use super::{admin_codes::AdminCodesService, clock::Clock};

/// Credential issued on register and login
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    /// Seconds until expiry
    pub expires_in: i64,
    pub user: User,
}

#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UsersStore>,
    admin_codes: AdminCodesService,
    clock: Arc<dyn Clock>,
    config: AuthConfig,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UsersStore>,
        admin_codes: AdminCodesService,
        clock: Arc<dyn Clock>,
        config: AuthConfig,
    ) -> Self {
        Self {
            users,
            admin_codes,
            clock,
            config,
        }
    }

    /// Create an account. Admin registrations consume their verification
    /// code before the user is written.
    pub async fn register(&self, registration: Registration) -> AppResult<IssuedToken> {
        let account = registration.account();

        if self.users.find_by_email(&account.email).await?.is_some() {
            return Err(AppError::Conflict("Email already registered".to_string()));
        }

        if let Registration::Admin { account, admin_code } = &registration {
            self.admin_codes
                .verify_and_consume(&account.email, admin_code)
                .await?;
        }

        let user = self
            .users
            .create(&NewUser {
                name: account.name.clone(),
                email: account.email.clone(),
                password_hash: self.hash_password(&account.password)?,
                role: registration.role(),
            })
            .await?;

        tracing::info!(user_id = user.id, role = %user.role, "user registered");
        self.issue_token(user)
    }

    /// Check credentials and issue a token
    pub async fn login(&self, email: &str, password: &str) -> AppResult<IssuedToken> {
        let invalid = || AppError::Authentication("Invalid credentials".to_string());

        let user = self
            .users
            .find_by_email(&normalize_email(email))
            .await?
            .ok_or_else(invalid)?;

        if !self.verify_password(&user, password)? {
            tracing::debug!(user_id = user.id, "login rejected");
            return Err(invalid());
        }

        self.issue_token(user)
    }

    /// Current user behind a credential
    pub async fn me(&self, claims: &UserClaims) -> AppResult<User> {
        self.users
            .get(claims.user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", claims.user_id)))
    }

    /// Decode and check a bearer token
    pub fn verify_token(&self, token: &str) -> AppResult<UserClaims> {
        UserClaims::from_token(token, &self.config.jwt_secret)
            .map_err(|e| AppError::Authentication(format!("Invalid token: {}", e)))
    }

    fn issue_token(&self, user: User) -> AppResult<IssuedToken> {
        let now = self.clock.now().timestamp();
        let expires_in = self.config.jwt_expiration_hours as i64 * 3600;

        let claims = UserClaims {
            sub: user.email.clone(),
            user_id: user.id,
            role: user.role,
            exp: now + expires_in,
            iat: now,
        };

        let token = claims
            .create_token(&self.config.jwt_secret)
            .map_err(|e| AppError::Internal(format!("Failed to create token: {}", e)))?;

        Ok(IssuedToken {
            token,
            expires_in,
            user,
        })
    }

    fn verify_password(&self, user: &User, password: &str) -> AppResult<bool> {
        let parsed_hash = PasswordHash::new(&user.password)
            .map_err(|_| AppError::Internal("Invalid password hash".to_string()))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok())
    }

    /// Hash a password using Argon2
    pub fn hash_password(&self, password: &str) -> AppResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))?;
        Ok(hash.to_string())
    }
}
