//! Librairie Library Server
//!
//! REST JSON API for a small library: book catalog, member accounts,
//! domain-restricted admin registration and the loan ledger.

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;

pub use crate::config::AppConfig;
pub use crate::error::{AppError, AppResult};

use crate::config::StorageBackend;
use crate::repository::{admin_codes::RedisAdminCodeStore, Repository};
use crate::services::{
    clock::{Clock, SystemClock},
    email::{EmailService, LogMailer, Mailer},
    Services,
};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
}

impl AppState {
    /// Wire services over an already built repository
    pub fn new(
        config: AppConfig,
        repository: Repository,
        mailer: Arc<dyn Mailer>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let services = Services::new(repository, &config, mailer, clock);
        Self {
            config: Arc::new(config),
            services: Arc::new(services),
        }
    }

    /// Connect the configured backend and build the state
    pub async fn from_config(config: AppConfig) -> anyhow::Result<Self> {
        use anyhow::Context;

        let repository = match config.database.backend {
            StorageBackend::Memory => {
                tracing::warn!("using in-memory storage, data is lost on restart");
                Repository::in_memory()
            }
            StorageBackend::Postgres => {
                let pool = PgPoolOptions::new()
                    .max_connections(config.database.max_connections)
                    .min_connections(config.database.min_connections)
                    .connect(&config.database.url)
                    .await
                    .context("Failed to connect to database")?;
                tracing::info!("Connected to database");

                sqlx::migrate!("./migrations")
                    .run(&pool)
                    .await
                    .context("Failed to run database migrations")?;
                tracing::info!("Database migrations completed");

                let admin_codes = RedisAdminCodeStore::connect(
                    &config.redis.url,
                    config.admin_codes.purge_after_seconds(),
                )
                .await
                .context("Failed to connect to Redis")?;
                tracing::info!("Connected to Redis");

                Repository::postgres(pool, admin_codes)
            }
        };

        let mailer: Arc<dyn Mailer> = if config.email.enabled {
            Arc::new(EmailService::new(config.email.clone()))
        } else {
            tracing::warn!("email delivery disabled, admin codes will be logged");
            Arc::new(LogMailer)
        };

        Ok(Self::new(config, repository, mailer, Arc::new(SystemClock)))
    }
}
