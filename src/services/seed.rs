//! Starter catalog loaded on request into an empty library

use std::collections::HashMap;

use serde::Deserialize;

use crate::{
    error::{AppError, AppResult},
    models::{
        author::CreateAuthor,
        book::{BookInput, BookQuery},
    },
};

use super::catalog::CatalogService;

const STARTER_CATALOG: &str = include_str!("../../seed/catalog.json");

#[derive(Debug, Deserialize)]
struct SeedCatalog {
    authors: Vec<SeedAuthor>,
    books: Vec<SeedBook>,
}

#[derive(Debug, Deserialize)]
struct SeedAuthor {
    name: String,
}

/// Book entry referencing its author by name
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SeedBook {
    title: String,
    author: String,
    genre: String,
    summary: Option<String>,
    copies_available: i32,
    image: Option<String>,
}

/// What a seed run did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedOutcome {
    Seeded { authors: usize, books: usize },
    /// The catalog already had authors or books
    Skipped,
}

/// Load the starter catalog when there are no authors and no books yet.
/// Existing data is never touched.
pub async fn seed_catalog(catalog: &CatalogService) -> AppResult<SeedOutcome> {
    let has_books = !catalog.list_books(&BookQuery::default()).await?.is_empty();
    let has_authors = !catalog.list_authors().await?.is_empty();
    if has_books || has_authors {
        tracing::info!("catalog is not empty, skipping seed");
        return Ok(SeedOutcome::Skipped);
    }

    let seed: SeedCatalog = serde_json::from_str(STARTER_CATALOG)
        .map_err(|e| AppError::Internal(format!("Invalid starter catalog: {}", e)))?;

    let mut author_ids = HashMap::with_capacity(seed.authors.len());
    for author in &seed.authors {
        let created = catalog
            .create_author(CreateAuthor {
                name: author.name.clone(),
                bio: None,
                birthdate: None,
            })
            .await?;
        author_ids.insert(author.name.as_str(), created.id);
    }

    for book in &seed.books {
        let author = *author_ids.get(book.author.as_str()).ok_or_else(|| {
            AppError::Internal(format!(
                "Starter book {} references unknown author {}",
                book.title, book.author
            ))
        })?;
        catalog
            .create_book(BookInput {
                title: book.title.clone(),
                author,
                genre: book.genre.clone(),
                summary: book.summary.clone(),
                copies_available: book.copies_available,
                image: book.image.clone(),
            })
            .await?;
    }

    tracing::info!(
        authors = seed.authors.len(),
        books = seed.books.len(),
        "starter catalog seeded"
    );
    Ok(SeedOutcome::Seeded {
        authors: seed.authors.len(),
        books: seed.books.len(),
    })
}
