//! Loans repository for database operations

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, FromRow, Pool, Postgres, Row};

use crate::{
    error::{AppError, AppResult},
    models::{
        author::Author,
        book::{Book, BookDetails},
        loan::{Loan, NewLoan},
    },
};

use super::LoansStore;

/// Loans joined with their (possibly deleted) book and its author
const SELECT_LOAN_DETAILS: &str = r#"
    SELECT l.id, l.book_id, l.user_id, l.loan_date, l.return_date, l.returned, l.returned_at,
           b.id AS b_id, b.title AS b_title, b.author_id AS b_author_id, b.genre AS b_genre,
           b.summary AS b_summary, b.copies_available AS b_copies_available, b.image AS b_image,
           b.created_at AS b_created_at, b.updated_at AS b_updated_at,
           a.name AS a_name, a.bio AS a_bio, a.birthdate AS a_birthdate
    FROM loans l
    LEFT JOIN books b ON b.id = l.book_id
    LEFT JOIN authors a ON a.id = b.author_id
"#;

fn details_from_row(row: &PgRow) -> Result<(Loan, Option<BookDetails>), sqlx::Error> {
    let loan = Loan::from_row(row)?;

    let book_id: Option<i32> = row.try_get("b_id")?;
    let book = match book_id {
        Some(id) => {
            let author_id: i32 = row.try_get("b_author_id")?;
            let book = Book {
                id,
                title: row.try_get("b_title")?,
                author_id,
                genre: row.try_get("b_genre")?,
                summary: row.try_get("b_summary")?,
                copies_available: row.try_get("b_copies_available")?,
                image: row.try_get("b_image")?,
                created_at: row.try_get("b_created_at")?,
                updated_at: row.try_get("b_updated_at")?,
            };
            let author = Author {
                id: author_id,
                name: row.try_get("a_name")?,
                bio: row.try_get("a_bio")?,
                birthdate: row.try_get("a_birthdate")?,
            };
            Some(BookDetails::new(book, author))
        }
        None => None,
    };

    Ok((loan, book))
}

#[derive(Clone)]
pub struct LoansRepository {
    pool: Pool<Postgres>,
}

impl LoansRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LoansStore for LoansRepository {
    async fn borrow(&self, loan: &NewLoan) -> AppResult<Loan> {
        let mut tx = self.pool.begin().await?;

        // Row lock serializes concurrent borrows of the same book
        let copies: Option<i32> =
            sqlx::query_scalar("SELECT copies_available FROM books WHERE id = $1 FOR UPDATE")
                .bind(loan.book_id)
                .fetch_optional(&mut *tx)
                .await?;

        match copies {
            None => {
                return Err(AppError::NotFound(format!(
                    "Book with id {} not found",
                    loan.book_id
                )))
            }
            Some(c) if c <= 0 => return Err(AppError::OutOfStock(loan.book_id)),
            Some(_) => {}
        }

        let decremented = sqlx::query(
            r#"
            UPDATE books
            SET copies_available = copies_available - 1, updated_at = NOW()
            WHERE id = $1 AND copies_available > 0
            "#,
        )
        .bind(loan.book_id)
        .execute(&mut *tx)
        .await?;

        if decremented.rows_affected() == 0 {
            return Err(AppError::OutOfStock(loan.book_id));
        }

        let created = sqlx::query_as::<_, Loan>(
            r#"
            INSERT INTO loans (book_id, user_id, loan_date, return_date, returned)
            VALUES ($1, $2, $3, $4, FALSE)
            RETURNING *
            "#,
        )
        .bind(loan.book_id)
        .bind(loan.user_id)
        .bind(loan.loan_date)
        .bind(loan.return_date)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(created)
    }

    async fn return_loan(&self, loan_id: i32, returned_at: DateTime<Utc>) -> AppResult<Loan> {
        let mut tx = self.pool.begin().await?;

        let loan = sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE id = $1 FOR UPDATE")
            .bind(loan_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", loan_id)))?;

        if loan.returned {
            return Err(AppError::AlreadyReturned(loan_id));
        }

        let returned = sqlx::query_as::<_, Loan>(
            "UPDATE loans SET returned = TRUE, returned_at = $2 WHERE id = $1 RETURNING *",
        )
        .bind(loan_id)
        .bind(returned_at)
        .fetch_one(&mut *tx)
        .await?;

        let restocked = sqlx::query(
            "UPDATE books SET copies_available = copies_available + 1, updated_at = NOW() WHERE id = $1",
        )
        .bind(loan.book_id)
        .execute(&mut *tx)
        .await?;

        if restocked.rows_affected() == 0 {
            tracing::warn!(loan_id, book_id = loan.book_id, "returned loan references a deleted book");
        }

        tx.commit().await?;
        Ok(returned)
    }

    async fn get(&self, id: i32) -> AppResult<Option<Loan>> {
        let loan = sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(loan)
    }

    async fn list_for_user(&self, user_id: i32) -> AppResult<Vec<(Loan, Option<BookDetails>)>> {
        let sql = format!(
            "{} WHERE l.user_id = $1 ORDER BY l.loan_date DESC, l.id DESC",
            SELECT_LOAN_DETAILS
        );
        let rows = sqlx::query(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .iter()
            .map(details_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn list_all(&self) -> AppResult<Vec<(Loan, Option<BookDetails>)>> {
        let sql = format!("{} ORDER BY l.loan_date DESC, l.id DESC", SELECT_LOAN_DETAILS);
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        Ok(rows
            .iter()
            .map(details_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }
}
