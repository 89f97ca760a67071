//! Catalog management service: books and authors

use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{
        author::{Author, CreateAuthor},
        book::{is_valid_image, BookDetails, BookInput, BookQuery},
    },
    repository::Repository,
};

#[derive(Clone)]
pub struct CatalogService {
    repository: Repository,
}

impl CatalogService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Trim and check a book payload
    fn prepare_book(mut book: BookInput) -> AppResult<BookInput> {
        book.title = book.title.trim().to_string();
        book.genre = book.genre.trim().to_string();
        book.summary = book
            .summary
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        book.image = book
            .image
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        book.validate()?;

        if let Some(ref image) = book.image {
            if !is_valid_image(image) {
                return Err(AppError::Validation(
                    "Image must be a valid URL or image file name (jpg, jpeg, png, webp)".to_string(),
                ));
            }
        }
        Ok(book)
    }

    /// A missing author in a payload is a client error, not a missing route
    fn author_must_exist(err: AppError, author_id: i32) -> AppError {
        match err {
            AppError::NotFound(_) => {
                AppError::Validation(format!("Author with id {} does not exist", author_id))
            }
            other => other,
        }
    }

    pub async fn list_books(&self, query: &BookQuery) -> AppResult<Vec<BookDetails>> {
        self.repository.books.list(query).await
    }

    pub async fn get_book(&self, id: i32) -> AppResult<BookDetails> {
        self.repository
            .books
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    pub async fn create_book(&self, book: BookInput) -> AppResult<BookDetails> {
        let book = Self::prepare_book(book)?;
        let created = self
            .repository
            .books
            .create(&book)
            .await
            .map_err(|e| Self::author_must_exist(e, book.author))?;

        tracing::info!(book_id = created.id, title = %created.title, "book created");
        Ok(created)
    }

    /// Full replacement of a book
    pub async fn update_book(&self, id: i32, book: BookInput) -> AppResult<BookDetails> {
        let book = Self::prepare_book(book)?;
        self.repository
            .books
            .update(id, &book)
            .await
            .map_err(|e| Self::author_must_exist(e, book.author))?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    /// Delete a book. Loans referencing it are kept.
    pub async fn delete_book(&self, id: i32) -> AppResult<()> {
        if !self.repository.books.delete(id).await? {
            return Err(AppError::NotFound(format!("Book with id {} not found", id)));
        }
        tracing::info!(book_id = id, "book deleted");
        Ok(())
    }

    pub async fn list_authors(&self) -> AppResult<Vec<Author>> {
        self.repository.authors.list().await
    }

    pub async fn get_author(&self, id: i32) -> AppResult<Author> {
        self.repository
            .authors
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Author with id {} not found", id)))
    }

    pub async fn create_author(&self, mut author: CreateAuthor) -> AppResult<Author> {
        author.name = author.name.trim().to_string();
        author.validate()?;
        self.repository.authors.create(&author).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> CatalogService {
        CatalogService::new(Repository::in_memory())
    }

    async fn author(catalog: &CatalogService) -> Author {
        catalog
            .create_author(CreateAuthor {
                name: " Ursula K. Le Guin ".to_string(),
                bio: None,
                birthdate: None,
            })
            .await
            .unwrap()
    }

    fn book(author: i32) -> BookInput {
        BookInput {
            title: "  The Dispossessed ".to_string(),
            author,
            genre: "Science Fiction".to_string(),
            summary: Some("  ".to_string()),
            copies_available: 2,
            image: Some("dispossessed.jpg".to_string()),
        }
    }

    #[tokio::test]
    async fn test_create_book_trims_and_expands_author() {
        let catalog = catalog();
        let author = author(&catalog).await;
        assert_eq!(author.name, "Ursula K. Le Guin");

        let created = catalog.create_book(book(author.id)).await.unwrap();
        assert_eq!(created.title, "The Dispossessed");
        assert_eq!(created.summary, None);
        assert_eq!(created.author, author);
        assert_eq!(catalog.get_book(created.id).await.unwrap(), created);
    }

    #[tokio::test]
    async fn test_create_book_with_unknown_author_is_validation_error() {
        let err = catalog().create_book(book(404)).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_create_book_rejects_bad_image_and_blank_title() {
        let catalog = catalog();
        let author = author(&catalog).await;

        let mut bad_image = book(author.id);
        bad_image.image = Some("javascript:alert(1)".to_string());
        assert!(matches!(
            catalog.create_book(bad_image).await.unwrap_err(),
            AppError::Validation(_)
        ));

        let mut blank = book(author.id);
        blank.title = "   ".to_string();
        assert!(matches!(
            catalog.create_book(blank).await.unwrap_err(),
            AppError::Validation(_)
        ));
    }

    #[tokio::test]
    async fn test_update_and_delete_missing_book_are_not_found() {
        let catalog = catalog();
        let author = author(&catalog).await;

        assert!(matches!(
            catalog.update_book(999, book(author.id)).await.unwrap_err(),
            AppError::NotFound(_)
        ));
        assert!(matches!(
            catalog.delete_book(999).await.unwrap_err(),
            AppError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_update_replaces_book() {
        let catalog = catalog();
        let author = author(&catalog).await;
        let created = catalog.create_book(book(author.id)).await.unwrap();

        let mut replacement = book(author.id);
        replacement.title = "The Lathe of Heaven".to_string();
        replacement.copies_available = 0;
        replacement.image = None;
        let updated = catalog.update_book(created.id, replacement).await.unwrap();

        assert_eq!(updated.id, created.id);
        assert_eq!(updated.title, "The Lathe of Heaven");
        assert_eq!(updated.copies_available, 0);
        assert_eq!(updated.image, None);
    }

    #[tokio::test]
    async fn test_list_books_filters_by_title() {
        let catalog = catalog();
        let author = author(&catalog).await;
        catalog.create_book(book(author.id)).await.unwrap();
        let mut other = book(author.id);
        other.title = "A Wizard of Earthsea".to_string();
        catalog.create_book(other).await.unwrap();

        let query = BookQuery {
            title: Some("wizard".to_string()),
            ..BookQuery::default()
        };
        let books = catalog.list_books(&query).await.unwrap();
        assert_eq!(books.len(), 1);
        assert_eq!(books[0].title, "A Wizard of Earthsea");
        assert_eq!(catalog.list_books(&BookQuery::default()).await.unwrap().len(), 2);
    }
}
