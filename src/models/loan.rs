//! Loan (borrow) model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use super::book::BookDetails;

/// Loan model from database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Loan {
    pub id: i32,
    pub book_id: i32,
    pub user_id: i32,
    pub loan_date: DateTime<Utc>,
    /// Due date
    pub return_date: DateTime<Utc>,
    pub returned: bool,
    pub returned_at: Option<DateTime<Utc>>,
}

impl Loan {
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        !self.returned && now > self.return_date
    }
}

/// Loan with its book resolved, for display
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoanDetails {
    pub id: i32,
    pub book_id: i32,
    /// `None` when the book has since been deleted
    pub book: Option<BookDetails>,
    pub user_id: i32,
    pub loan_date: DateTime<Utc>,
    pub return_date: DateTime<Utc>,
    pub returned: bool,
    pub returned_at: Option<DateTime<Utc>>,
    pub overdue: bool,
}

impl LoanDetails {
    pub fn new(loan: Loan, book: Option<BookDetails>, now: DateTime<Utc>) -> Self {
        Self {
            overdue: loan.is_overdue(now),
            id: loan.id,
            book_id: loan.book_id,
            book,
            user_id: loan.user_id,
            loan_date: loan.loan_date,
            return_date: loan.return_date,
            returned: loan.returned,
            returned_at: loan.returned_at,
        }
    }
}

/// Loan to insert; the store decrements the book's copies in the same operation
#[derive(Debug, Clone)]
pub struct NewLoan {
    pub book_id: i32,
    pub user_id: i32,
    pub loan_date: DateTime<Utc>,
    pub return_date: DateTime<Utc>,
}
