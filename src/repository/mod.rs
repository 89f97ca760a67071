//! Repository layer: store traits and their backends

pub mod admin_codes;
pub mod authors;
pub mod books;
pub mod loans;
pub mod memory;
pub mod users;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};

use crate::{
    error::AppResult,
    models::{
        admin_code::AdminVerificationCode,
        author::{Author, CreateAuthor},
        book::{BookDetails, BookInput, BookQuery},
        loan::{Loan, NewLoan},
        user::{NewUser, User},
    },
};

#[async_trait]
pub trait AuthorsStore: Send + Sync {
    async fn list(&self) -> AppResult<Vec<Author>>;
    async fn get(&self, id: i32) -> AppResult<Option<Author>>;
    async fn create(&self, author: &CreateAuthor) -> AppResult<Author>;
}

/// Book storage; every read returns the author expanded
#[async_trait]
pub trait BooksStore: Send + Sync {
    async fn list(&self, query: &BookQuery) -> AppResult<Vec<BookDetails>>;
    async fn get(&self, id: i32) -> AppResult<Option<BookDetails>>;
    /// Fails with `NotFound` when the author does not exist
    async fn create(&self, book: &BookInput) -> AppResult<BookDetails>;
    /// `None` when the book does not exist
    async fn update(&self, id: i32, book: &BookInput) -> AppResult<Option<BookDetails>>;
    /// `false` when the book did not exist
    async fn delete(&self, id: i32) -> AppResult<bool>;
}

#[async_trait]
pub trait UsersStore: Send + Sync {
    /// Fails with `Conflict` when the email is already registered
    async fn create(&self, user: &NewUser) -> AppResult<User>;
    async fn get(&self, id: i32) -> AppResult<Option<User>>;
    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>>;
}

/// Loan ledger. `borrow` and `return_loan` are each a single atomic
/// operation over both the loan and the book's copy counter.
#[async_trait]
pub trait LoansStore: Send + Sync {
    /// Decrement the book's copies only if positive and insert the loan.
    /// `NotFound` if the book is absent (checked first), `OutOfStock` if
    /// no copy is left; nothing is written on failure.
    async fn borrow(&self, loan: &NewLoan) -> AppResult<Loan>;

    /// Flip `returned` and give the copy back to the book if it still
    /// exists. `NotFound` / `AlreadyReturned` leave everything untouched.
    async fn return_loan(&self, loan_id: i32, returned_at: DateTime<Utc>) -> AppResult<Loan>;

    async fn get(&self, id: i32) -> AppResult<Option<Loan>>;

    /// Loans of one user, newest first, with their book if it still exists
    async fn list_for_user(&self, user_id: i32) -> AppResult<Vec<(Loan, Option<BookDetails>)>>;

    async fn list_all(&self) -> AppResult<Vec<(Loan, Option<BookDetails>)>>;
}

/// Admin verification codes keyed by email
#[async_trait]
pub trait AdminCodeStore: Send + Sync {
    /// Insert or overwrite the entry for `entry.email`
    async fn upsert(&self, entry: &AdminVerificationCode) -> AppResult<()>;
    async fn find(&self, email: &str) -> AppResult<Option<AdminVerificationCode>>;
    /// `true` only for the caller that actually removed the entry
    async fn remove(&self, email: &str) -> AppResult<bool>;
    /// Bump the attempt counter of the entry still holding `issued_code`,
    /// dropping it once `max_attempts` is reached. `None` if the entry is
    /// gone or was replaced by a newer code.
    async fn record_failed_attempt(
        &self,
        email: &str,
        issued_code: &str,
        max_attempts: u32,
    ) -> AppResult<Option<u32>>;
}

/// Main repository struct holding one handle per store
#[derive(Clone)]
pub struct Repository {
    pool: Option<Pool<Postgres>>,
    pub authors: Arc<dyn AuthorsStore>,
    pub books: Arc<dyn BooksStore>,
    pub users: Arc<dyn UsersStore>,
    pub loans: Arc<dyn LoansStore>,
    pub admin_codes: Arc<dyn AdminCodeStore>,
}

impl Repository {
    /// PostgreSQL for documents, Redis for admin codes
    pub fn postgres(pool: Pool<Postgres>, admin_codes: admin_codes::RedisAdminCodeStore) -> Self {
        Self {
            authors: Arc::new(authors::AuthorsRepository::new(pool.clone())),
            books: Arc::new(books::BooksRepository::new(pool.clone())),
            users: Arc::new(users::UsersRepository::new(pool.clone())),
            loans: Arc::new(loans::LoansRepository::new(pool.clone())),
            admin_codes: Arc::new(admin_codes),
            pool: Some(pool),
        }
    }

    /// Everything in process memory
    pub fn in_memory() -> Self {
        let store = Arc::new(memory::MemoryStore::new());
        Self {
            pool: None,
            authors: store.clone(),
            books: store.clone(),
            users: store.clone(),
            loans: store.clone(),
            admin_codes: store,
        }
    }

    /// Check that the backing database answers
    pub async fn ping(&self) -> AppResult<()> {
        if let Some(pool) = &self.pool {
            sqlx::query("SELECT 1").execute(pool).await?;
        }
        Ok(())
    }
}
