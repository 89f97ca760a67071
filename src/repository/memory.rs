//! In-memory store implementing every store trait.
//!
//! Used by the `memory` backend and by tests. One lock guards all
//! collections, so borrow and return are atomic across book and loan.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::{
    error::{AppError, AppResult},
    models::{
        admin_code::AdminVerificationCode,
        author::{Author, CreateAuthor},
        book::{Book, BookDetails, BookInput, BookQuery},
        loan::{Loan, NewLoan},
        user::{NewUser, User},
    },
};

use super::{AdminCodeStore, AuthorsStore, BooksStore, LoansStore, UsersStore};

#[derive(Debug, Default)]
struct State {
    next_id: i32,
    authors: BTreeMap<i32, Author>,
    books: BTreeMap<i32, Book>,
    users: BTreeMap<i32, User>,
    loans: BTreeMap<i32, Loan>,
    admin_codes: HashMap<String, AdminVerificationCode>,
}

impl State {
    fn next_id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }

    fn book_details(&self, id: i32) -> Option<BookDetails> {
        let book = self.books.get(&id)?;
        let author = self.authors.get(&book.author_id)?;
        Some(BookDetails::new(book.clone(), author.clone()))
    }

    fn require_author(&self, id: i32) -> AppResult<()> {
        if self.authors.contains_key(&id) {
            Ok(())
        } else {
            Err(AppError::NotFound(format!("Author with id {} not found", id)))
        }
    }

    fn with_books<'a>(
        &self,
        loans: impl Iterator<Item = &'a Loan>,
    ) -> Vec<(Loan, Option<BookDetails>)> {
        let mut result: Vec<_> = loans
            .map(|loan| (loan.clone(), self.book_details(loan.book_id)))
            .collect();
        result.sort_by(|(a, _), (b, _)| b.loan_date.cmp(&a.loan_date).then(b.id.cmp(&a.id)));
        result
    }
}

/// In-memory store for development and testing
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuthorsStore for MemoryStore {
    async fn list(&self) -> AppResult<Vec<Author>> {
        let state = self.state.read().await;
        let mut authors: Vec<Author> = state.authors.values().cloned().collect();
        authors.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(authors)
    }

    async fn get(&self, id: i32) -> AppResult<Option<Author>> {
        Ok(self.state.read().await.authors.get(&id).cloned())
    }

    async fn create(&self, author: &CreateAuthor) -> AppResult<Author> {
        let mut state = self.state.write().await;
        let author = Author {
            id: state.next_id(),
            name: author.name.clone(),
            bio: author.bio.clone(),
            birthdate: author.birthdate,
        };
        state.authors.insert(author.id, author.clone());
        Ok(author)
    }
}

#[async_trait]
impl BooksStore for MemoryStore {
    async fn list(&self, query: &BookQuery) -> AppResult<Vec<BookDetails>> {
        let state = self.state.read().await;
        let mut books: Vec<BookDetails> = state
            .books
            .values()
            .filter(|book| query.matches(book))
            .filter_map(|book| state.book_details(book.id))
            .collect();
        books.sort_by(|a, b| a.title.cmp(&b.title).then(a.id.cmp(&b.id)));
        Ok(books)
    }

    async fn get(&self, id: i32) -> AppResult<Option<BookDetails>> {
        Ok(self.state.read().await.book_details(id))
    }

    async fn create(&self, input: &BookInput) -> AppResult<BookDetails> {
        let mut state = self.state.write().await;
        state.require_author(input.author)?;

        let now = Utc::now();
        let book = Book {
            id: state.next_id(),
            title: input.title.clone(),
            author_id: input.author,
            genre: input.genre.clone(),
            summary: input.summary.clone(),
            copies_available: input.copies_available,
            image: input.image.clone(),
            created_at: now,
            updated_at: now,
        };
        let id = book.id;
        state.books.insert(id, book);

        state
            .book_details(id)
            .ok_or_else(|| AppError::Internal(format!("Book {} vanished after insert", id)))
    }

    async fn update(&self, id: i32, input: &BookInput) -> AppResult<Option<BookDetails>> {
        let mut state = self.state.write().await;
        if !state.books.contains_key(&id) {
            return Ok(None);
        }
        state.require_author(input.author)?;

        if let Some(book) = state.books.get_mut(&id) {
            book.title = input.title.clone();
            book.author_id = input.author;
            book.genre = input.genre.clone();
            book.summary = input.summary.clone();
            book.copies_available = input.copies_available;
            book.image = input.image.clone();
            book.updated_at = Utc::now();
        }
        Ok(state.book_details(id))
    }

    async fn delete(&self, id: i32) -> AppResult<bool> {
        Ok(self.state.write().await.books.remove(&id).is_some())
    }
}

#[async_trait]
impl UsersStore for MemoryStore {
    async fn create(&self, user: &NewUser) -> AppResult<User> {
        let mut state = self.state.write().await;
        if state
            .users
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(&user.email))
        {
            return Err(AppError::Conflict("Email already registered".to_string()));
        }

        let user = User {
            id: state.next_id(),
            name: user.name.clone(),
            email: user.email.clone(),
            password: user.password_hash.clone(),
            role: user.role,
            created_at: Utc::now(),
        };
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get(&self, id: i32) -> AppResult<Option<User>> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let state = self.state.read().await;
        Ok(state
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }
}

#[async_trait]
impl LoansStore for MemoryStore {
    async fn borrow(&self, new_loan: &NewLoan) -> AppResult<Loan> {
        let mut state = self.state.write().await;

        let book = state
            .books
            .get(&new_loan.book_id)
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", new_loan.book_id)))?;
        if book.copies_available <= 0 {
            return Err(AppError::OutOfStock(new_loan.book_id));
        }

        let loan = Loan {
            id: state.next_id(),
            book_id: new_loan.book_id,
            user_id: new_loan.user_id,
            loan_date: new_loan.loan_date,
            return_date: new_loan.return_date,
            returned: false,
            returned_at: None,
        };
        if let Some(book) = state.books.get_mut(&new_loan.book_id) {
            book.copies_available -= 1;
            book.updated_at = Utc::now();
        }
        state.loans.insert(loan.id, loan.clone());
        Ok(loan)
    }

    async fn return_loan(&self, loan_id: i32, returned_at: DateTime<Utc>) -> AppResult<Loan> {
        let mut state = self.state.write().await;

        let loan = state
            .loans
            .get_mut(&loan_id)
            .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", loan_id)))?;
        if loan.returned {
            return Err(AppError::AlreadyReturned(loan_id));
        }
        loan.returned = true;
        loan.returned_at = Some(returned_at);
        let loan = loan.clone();

        match state.books.get_mut(&loan.book_id) {
            Some(book) => {
                book.copies_available += 1;
                book.updated_at = Utc::now();
            }
            None => {
                tracing::warn!(loan_id, book_id = loan.book_id, "returned loan references a deleted book");
            }
        }
        Ok(loan)
    }

    async fn get(&self, id: i32) -> AppResult<Option<Loan>> {
        Ok(self.state.read().await.loans.get(&id).cloned())
    }

    async fn list_for_user(&self, user_id: i32) -> AppResult<Vec<(Loan, Option<BookDetails>)>> {
        let state = self.state.read().await;
        Ok(state.with_books(state.loans.values().filter(|l| l.user_id == user_id)))
    }

    async fn list_all(&self) -> AppResult<Vec<(Loan, Option<BookDetails>)>> {
        let state = self.state.read().await;
        Ok(state.with_books(state.loans.values()))
    }
}

#[async_trait]
impl AdminCodeStore for MemoryStore {
    async fn upsert(&self, entry: &AdminVerificationCode) -> AppResult<()> {
        let mut state = self.state.write().await;
        state.admin_codes.insert(entry.email.clone(), entry.clone());
        Ok(())
    }

    async fn find(&self, email: &str) -> AppResult<Option<AdminVerificationCode>> {
        Ok(self.state.read().await.admin_codes.get(email).cloned())
    }

    async fn remove(&self, email: &str) -> AppResult<bool> {
        Ok(self.state.write().await.admin_codes.remove(email).is_some())
    }

    async fn record_failed_attempt(
        &self,
        email: &str,
        issued_code: &str,
        max_attempts: u32,
    ) -> AppResult<Option<u32>> {
        let mut state = self.state.write().await;
        let Some(entry) = state.admin_codes.get_mut(email) else {
            return Ok(None);
        };
        if !entry.matches(issued_code) {
            return Ok(None);
        }

        entry.attempts += 1;
        let attempts = entry.attempts;
        if attempts >= max_attempts {
            state.admin_codes.remove(email);
        }
        Ok(Some(attempts))
    }
}
