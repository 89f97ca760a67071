//! Business logic services

pub mod admin_codes;
pub mod auth;
pub mod catalog;
pub mod clock;
pub mod email;
pub mod loans;
pub mod seed;

use std::sync::Arc;

use crate::{config::AppConfig, repository::Repository};

use self::{clock::Clock, email::Mailer};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub auth: auth::AuthService,
    pub admin_codes: admin_codes::AdminCodesService,
    pub catalog: catalog::CatalogService,
    pub loans: loans::LoansService,
    repository: Repository,
}

impl Services {
    /// Create all services over the given repository
    pub fn new(
        repository: Repository,
        config: &AppConfig,
        mailer: Arc<dyn Mailer>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let admin_codes = admin_codes::AdminCodesService::new(
            repository.admin_codes.clone(),
            mailer,
            clock.clone(),
            config.admin_codes.clone(),
        );

        Self {
            auth: auth::AuthService::new(
                repository.users.clone(),
                admin_codes.clone(),
                clock.clone(),
                config.auth.clone(),
            ),
            admin_codes,
            catalog: catalog::CatalogService::new(repository.clone()),
            loans: loans::LoansService::new(repository.clone(), clock, config.loans.clone()),
            repository,
        }
    }

    /// Readiness of the backing store
    pub async fn ping(&self) -> crate::error::AppResult<()> {
        self.repository.ping().await
    }
}
