//! Books repository for database operations

use async_trait::async_trait;
use sqlx::{postgres::PgRow, FromRow, Pool, Postgres, Row};

use crate::{
    error::{AppError, AppResult},
    models::{
        author::Author,
        book::{Book, BookDetails, BookInput, BookQuery},
    },
};

use super::BooksStore;

const SELECT_WITH_AUTHOR: &str = r#"
    SELECT b.*, a.name AS author_name, a.bio AS author_bio, a.birthdate AS author_birthdate
    FROM books b
    JOIN authors a ON a.id = b.author_id
"#;

/// Build a book from a `SELECT_WITH_AUTHOR` row
fn details_from_row(row: &PgRow) -> Result<BookDetails, sqlx::Error> {
    let book = Book::from_row(row)?;
    let author = Author {
        id: book.author_id,
        name: row.try_get("author_name")?,
        bio: row.try_get("author_bio")?,
        birthdate: row.try_get("author_birthdate")?,
    };
    Ok(BookDetails::new(book, author))
}

/// Map a foreign key violation on author_id to a lookup error
fn map_author_fk(err: sqlx::Error, author_id: i32) -> AppError {
    match err {
        sqlx::Error::Database(ref db) if db.is_foreign_key_violation() => {
            AppError::NotFound(format!("Author with id {} not found", author_id))
        }
        other => AppError::Database(other),
    }
}

#[derive(Clone)]
pub struct BooksRepository {
    pool: Pool<Postgres>,
}

impl BooksRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BooksStore for BooksRepository {
    async fn list(&self, query: &BookQuery) -> AppResult<Vec<BookDetails>> {
        let sql = format!(
            r#"{}
            WHERE ($1::TEXT IS NULL OR b.title ILIKE '%' || $1 || '%')
              AND ($2::TEXT IS NULL OR LOWER(b.genre) = LOWER($2))
              AND ($3::INT IS NULL OR b.author_id = $3)
            ORDER BY b.title, b.id
            "#,
            SELECT_WITH_AUTHOR
        );

        let rows = sqlx::query(&sql)
            .bind(&query.title)
            .bind(&query.genre)
            .bind(query.author_id)
            .fetch_all(&self.pool)
            .await?;

        let books = rows
            .iter()
            .map(details_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(books)
    }

    async fn get(&self, id: i32) -> AppResult<Option<BookDetails>> {
        let sql = format!("{} WHERE b.id = $1", SELECT_WITH_AUTHOR);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(details_from_row).transpose()?)
    }

    async fn create(&self, book: &BookInput) -> AppResult<BookDetails> {
        let id: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO books (title, author_id, genre, summary, copies_available, image)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(&book.title)
        .bind(book.author)
        .bind(&book.genre)
        .bind(&book.summary)
        .bind(book.copies_available)
        .bind(&book.image)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_author_fk(e, book.author))?;

        self.get(id)
            .await?
            .ok_or_else(|| AppError::Internal(format!("Book {} vanished after insert", id)))
    }

    async fn update(&self, id: i32, book: &BookInput) -> AppResult<Option<BookDetails>> {
        let updated = sqlx::query(
            r#"
            UPDATE books
            SET title = $2, author_id = $3, genre = $4, summary = $5,
                copies_available = $6, image = $7, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&book.title)
        .bind(book.author)
        .bind(&book.genre)
        .bind(&book.summary)
        .bind(book.copies_available)
        .bind(&book.image)
        .execute(&self.pool)
        .await
        .map_err(|e| map_author_fk(e, book.author))?;

        if updated.rows_affected() == 0 {
            return Ok(None);
        }
        self.get(id).await
    }

    async fn delete(&self, id: i32) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM books WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
