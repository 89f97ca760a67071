//! Admin verification code issuance and consumption
//!
//! An entry moves `absent -> issued -> {consumed, expired and purged,
//! overwritten}`; consumed and purged entries are simply removed.

use std::sync::Arc;

use chrono::Duration;
use rand::Rng;

use crate::{
    config::AdminCodesConfig,
    error::{AppError, AppResult},
    models::{
        admin_code::{is_well_formed_code, AdminVerificationCode},
        user::normalize_email,
    },
    repository::AdminCodeStore,
};

use super::{clock::Clock, email::Mailer};

/// Uniform six-digit code in 100000..=999999
pub fn generate_code() -> String {
    rand::thread_rng().gen_range(100_000..=999_999).to_string()
}

#[derive(Clone)]
pub struct AdminCodesService {
    store: Arc<dyn AdminCodeStore>,
    mailer: Arc<dyn Mailer>,
    clock: Arc<dyn Clock>,
    config: AdminCodesConfig,
}

impl AdminCodesService {
    pub fn new(
        store: Arc<dyn AdminCodeStore>,
        mailer: Arc<dyn Mailer>,
        clock: Arc<dyn Clock>,
        config: AdminCodesConfig,
    ) -> Self {
        Self {
            store,
            mailer,
            clock,
            config,
        }
    }

    fn ensure_allowed_domain(&self, email: &str) -> AppResult<()> {
        let suffix = self.config.domain_suffix();
        if email.ends_with(&suffix) {
            Ok(())
        } else {
            Err(AppError::ForbiddenDomain(suffix))
        }
    }

    /// Issue a fresh code for `email`, replacing any live one, and mail it.
    /// If delivery fails the entry is rolled back.
    pub async fn request_code(&self, email: &str) -> AppResult<()> {
        let email = normalize_email(email);
        self.ensure_allowed_domain(&email)?;

        let entry = AdminVerificationCode {
            email: email.clone(),
            code: generate_code(),
            expires_at: self.clock.now() + Duration::minutes(self.config.ttl_minutes),
            attempts: 0,
        };
        self.store.upsert(&entry).await?;

        if let Err(err) = self
            .mailer
            .send_admin_code(&email, &entry.code, self.config.ttl_minutes)
            .await
        {
            tracing::error!(email = %email, error = %err, "admin code delivery failed, rolling back");
            if let Err(rollback) = self.store.remove(&email).await {
                tracing::error!(email = %email, error = %rollback, "failed to roll back admin code");
            }
            return Err(match err {
                AppError::DeliveryFailed(_) => err,
                other => AppError::DeliveryFailed(other.to_string()),
            });
        }

        tracing::info!(email = %email, "admin verification code issued");
        Ok(())
    }

    /// Look up a live, matching entry. Purges it when it matches but has
    /// expired, or when the wrong-guess limit is reached.
    async fn check_entry(&self, email: &str, code: &str) -> AppResult<AdminVerificationCode> {
        if !is_well_formed_code(code) {
            return Err(AppError::InvalidCode);
        }

        let entry = self
            .store
            .find(email)
            .await?
            .ok_or(AppError::InvalidCode)?;

        if !entry.matches(code) {
            if let Some(max_attempts) = self.config.max_attempts {
                let attempts = self
                    .store
                    .record_failed_attempt(email, &entry.code, max_attempts)
                    .await?;
                if attempts.is_some_and(|n| n >= max_attempts) {
                    tracing::warn!(email = %email, attempts = max_attempts, "admin code locked after repeated failures");
                }
            }
            return Err(AppError::InvalidCode);
        }

        if entry.is_expired(self.clock.now()) {
            self.store.remove(email).await?;
            return Err(AppError::CodeExpired);
        }

        Ok(entry)
    }

    /// Check a code without consuming it
    pub async fn verify(&self, email: &str, code: &str) -> AppResult<()> {
        let email = normalize_email(email);
        self.check_entry(&email, code.trim()).await.map(|_| ())
    }

    /// Check a code and consume it; succeeds at most once per issued code
    pub async fn verify_and_consume(&self, email: &str, code: &str) -> AppResult<()> {
        let email = normalize_email(email);
        self.check_entry(&email, code.trim()).await?;

        // A concurrent consumer may have won the race
        if !self.store.remove(&email).await? {
            return Err(AppError::InvalidCode);
        }

        tracing::info!(email = %email, "admin verification code consumed");
        Ok(())
    }
}
