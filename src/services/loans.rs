//! Loan management service

use std::sync::Arc;

use chrono::Duration;

use crate::{
    config::LoansConfig,
    error::{AppError, AppResult},
    models::{
        loan::{Loan, LoanDetails, NewLoan},
        user::UserClaims,
    },
    repository::Repository,
};

use super::clock::Clock;

#[derive(Clone)]
pub struct LoansService {
    repository: Repository,
    clock: Arc<dyn Clock>,
    config: LoansConfig,
}

impl LoansService {
    pub fn new(repository: Repository, clock: Arc<dyn Clock>, config: LoansConfig) -> Self {
        Self {
            repository,
            clock,
            config,
        }
    }

    /// Borrow one copy of a book for `duration_days`
    pub async fn create_loan(&self, book_id: i32, user_id: i32) -> AppResult<Loan> {
        let now = self.clock.now();
        let loan = self
            .repository
            .loans
            .borrow(&NewLoan {
                book_id,
                user_id,
                loan_date: now,
                return_date: now + Duration::days(self.config.duration_days),
            })
            .await?;

        tracing::info!(loan_id = loan.id, book_id, user_id, "loan created");
        Ok(loan)
    }

    /// Return a loan and give the copy back
    pub async fn return_loan(&self, loan_id: i32) -> AppResult<Loan> {
        let loan = self
            .repository
            .loans
            .return_loan(loan_id, self.clock.now())
            .await?;

        tracing::info!(loan_id, book_id = loan.book_id, user_id = loan.user_id, "loan returned");
        Ok(loan)
    }

    /// Return a loan on behalf of `claims`: members only their own, admins any
    pub async fn return_loan_as(&self, claims: &UserClaims, loan_id: i32) -> AppResult<Loan> {
        if !claims.is_admin() {
            let loan = self
                .repository
                .loans
                .get(loan_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", loan_id)))?;
            if loan.user_id != claims.user_id {
                return Err(AppError::Authorization(
                    "You can only return your own loans".to_string(),
                ));
            }
        }
        self.return_loan(loan_id).await
    }

    /// Loans of one user, newest first; empty when there are none
    pub async fn list_for_user(&self, user_id: i32) -> AppResult<Vec<LoanDetails>> {
        let now = self.clock.now();
        Ok(self
            .repository
            .loans
            .list_for_user(user_id)
            .await?
            .into_iter()
            .map(|(loan, book)| LoanDetails::new(loan, book, now))
            .collect())
    }

    pub async fn list_all(&self) -> AppResult<Vec<LoanDetails>> {
        let now = self.clock.now();
        Ok(self
            .repository
            .loans
            .list_all()
            .await?
            .into_iter()
            .map(|(loan, book)| LoanDetails::new(loan, book, now))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{author::CreateAuthor, book::BookInput, Role},
        services::clock::ManualClock,
    };
    use chrono::Utc;

    struct Fixture {
        loans: LoansService,
        repository: Repository,
        clock: Arc<ManualClock>,
        book_id: i32,
    }

    async fn fixture(copies: i32) -> Fixture {
        let repository = Repository::in_memory();
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let author = repository
            .authors
            .create(&CreateAuthor {
                name: "Octavia E. Butler".to_string(),
                bio: None,
                birthdate: None,
            })
            .await
            .unwrap();
        let book = repository
            .books
            .create(&BookInput {
                title: "Kindred".to_string(),
                author: author.id,
                genre: "Science Fiction".to_string(),
                summary: None,
                copies_available: copies,
                image: None,
            })
            .await
            .unwrap();

        Fixture {
            loans: LoansService::new(repository.clone(), clock.clone(), LoansConfig::default()),
            repository,
            clock,
            book_id: book.id,
        }
    }

    async fn copies(f: &Fixture) -> i32 {
        f.repository
            .books
            .get(f.book_id)
            .await
            .unwrap()
            .unwrap()
            .copies_available
    }

    fn claims(user_id: i32, role: Role) -> UserClaims {
        UserClaims {
            sub: format!("user{}@example.org", user_id),
            user_id,
            role,
            exp: 0,
            iat: 0,
        }
    }

    #[tokio::test]
    async fn test_borrow_and_return_round_trip() {
        let f = fixture(3).await;

        let loan = f.loans.create_loan(f.book_id, 1).await.unwrap();
        assert_eq!(copies(&f).await, 2);
        assert_eq!(loan.return_date - loan.loan_date, Duration::days(14));
        assert!(!loan.returned);

        let returned = f.loans.return_loan(loan.id).await.unwrap();
        assert!(returned.returned);
        assert!(returned.returned_at.is_some());
        assert_eq!(copies(&f).await, 3);
    }

    #[tokio::test]
    async fn test_borrow_out_of_stock_leaves_state_unchanged() {
        let f = fixture(0).await;

        let err = f.loans.create_loan(f.book_id, 1).await.unwrap_err();
        assert!(matches!(err, AppError::OutOfStock(_)));
        assert_eq!(copies(&f).await, 0);
        assert!(f.loans.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_borrow_unknown_book_is_not_found() {
        let f = fixture(1).await;
        let err = f.loans.create_loan(f.book_id + 100, 1).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_borrows_of_last_copy() {
        let f = fixture(1).await;

        let handles: Vec<_> = (0..16)
            .map(|user_id| {
                let loans = f.loans.clone();
                let book_id = f.book_id;
                tokio::spawn(async move { loans.create_loan(book_id, user_id).await })
            })
            .collect();

        let mut successes = 0;
        let mut out_of_stock = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(AppError::OutOfStock(_)) => out_of_stock += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(successes, 1);
        assert_eq!(out_of_stock, 15);
        assert_eq!(copies(&f).await, 0);
    }

    #[tokio::test]
    async fn test_second_return_is_rejected() {
        let f = fixture(2).await;
        let loan = f.loans.create_loan(f.book_id, 1).await.unwrap();

        f.loans.return_loan(loan.id).await.unwrap();
        let err = f.loans.return_loan(loan.id).await.unwrap_err();
        assert!(matches!(err, AppError::AlreadyReturned(id) if id == loan.id));
        assert_eq!(copies(&f).await, 2);
    }

    #[tokio::test]
    async fn test_return_unknown_loan_is_not_found() {
        let f = fixture(1).await;
        let err = f.loans.return_loan(12345).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_return_after_book_deleted_is_tolerated() {
        let f = fixture(1).await;
        let loan = f.loans.create_loan(f.book_id, 1).await.unwrap();
        assert!(f.repository.books.delete(f.book_id).await.unwrap());

        let returned = f.loans.return_loan(loan.id).await.unwrap();
        assert!(returned.returned);
    }

    #[tokio::test]
    async fn test_members_return_only_their_own_loans() {
        let f = fixture(2).await;
        let loan = f.loans.create_loan(f.book_id, 1).await.unwrap();

        let err = f
            .loans
            .return_loan_as(&claims(2, Role::Member), loan.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Authorization(_)));
        assert_eq!(copies(&f).await, 1);

        f.loans
            .return_loan_as(&claims(1, Role::Member), loan.id)
            .await
            .unwrap();

        let other = f.loans.create_loan(f.book_id, 1).await.unwrap();
        f.loans
            .return_loan_as(&claims(99, Role::Admin), other.id)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_listing_marks_overdue_and_handles_empty() {
        let f = fixture(2).await;
        assert!(f.loans.list_for_user(1).await.unwrap().is_empty());

        f.loans.create_loan(f.book_id, 1).await.unwrap();
        f.clock.advance(Duration::days(15));
        let recent = f.loans.create_loan(f.book_id, 1).await.unwrap();

        let loans = f.loans.list_for_user(1).await.unwrap();
        assert_eq!(loans.len(), 2);
        assert_eq!(loans[0].id, recent.id);
        assert!(!loans[0].overdue);
        assert!(loans[1].overdue);
        assert_eq!(loans[1].book.as_ref().unwrap().title, "Kindred");
        assert!(f.loans.list_for_user(2).await.unwrap().is_empty());
    }
}
