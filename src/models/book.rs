//! Book model and related types

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use super::author::Author;

static IMAGE_URL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(http|https)://").unwrap());
static IMAGE_FILE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^[a-z0-9\-_.]+\.(jpg|jpeg|png|webp)$").unwrap());

/// Book row from database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Book {
    pub id: i32,
    pub title: String,
    pub author_id: i32,
    pub genre: String,
    pub summary: Option<String>,
    pub copies_available: i32,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Book as returned by the API, author always expanded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BookDetails {
    pub id: i32,
    pub title: String,
    pub author: Author,
    pub genre: String,
    pub summary: Option<String>,
    pub copies_available: i32,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BookDetails {
    pub fn new(book: Book, author: Author) -> Self {
        Self {
            id: book.id,
            title: book.title,
            author,
            genre: book.genre,
            summary: book.summary,
            copies_available: book.copies_available,
            image: book.image,
            created_at: book.created_at,
            updated_at: book.updated_at,
        }
    }
}

fn default_copies() -> i32 {
    1
}

/// Create or replace book request; `author` is the author id
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BookInput {
    #[validate(length(min = 1, message = "Title is required"))]
    pub title: String,
    pub author: i32,
    #[validate(length(min = 1, message = "Genre is required"))]
    pub genre: String,
    pub summary: Option<String>,
    #[serde(default = "default_copies")]
    #[validate(range(min = 0, message = "copiesAvailable cannot be negative"))]
    pub copies_available: i32,
    pub image: Option<String>,
}

/// Book list filters
#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct BookQuery {
    /// Case-insensitive title substring
    pub title: Option<String>,
    pub genre: Option<String>,
    pub author_id: Option<i32>,
}

impl BookQuery {
    /// In-process equivalent of the SQL filter
    pub fn matches(&self, book: &Book) -> bool {
        let title_ok = self.title.as_ref().map_or(true, |t| {
            book.title.to_lowercase().contains(&t.to_lowercase())
        });
        let genre_ok = self
            .genre
            .as_ref()
            .map_or(true, |g| book.genre.eq_ignore_ascii_case(g));
        let author_ok = self.author_id.map_or(true, |id| book.author_id == id);
        title_ok && genre_ok && author_ok
    }
}

/// Image must be an http(s) URL or a bare image file name
pub fn is_valid_image(image: &str) -> bool {
    IMAGE_URL.is_match(image) || IMAGE_FILE.is_match(image)
}
