//! Book service: use-cases for the library catalogue.

use polystore_domain::error::{NotFoundError, PolystoreError};
use polystore_domain::library::Book;

use crate::ports::Repository;

/// Application service for book operations.
pub struct BookService<R> {
    repo: R,
}

impl<R: Repository<Entity = Book>> BookService<R> {
    /// Create a new service backed by the given repository.
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Store a book, replacing any book with the same id.
    ///
    /// # Errors
    ///
    /// Returns [`PolystoreError::Validation`] if invariants fail, or a
    /// storage error propagated from the repository.
    #[tracing::instrument(skip(self, book), fields(book_id = book.id))]
    pub async fn add_book(&self, book: Book) -> Result<Book, PolystoreError> {
        book.validate()?;
        self.repo.save(book).await
    }

    /// Look up a book by id, returning an error if not found.
    ///
    /// # Errors
    ///
    /// Returns [`PolystoreError::NotFound`] when no book with `id` exists,
    /// or a storage error from the repository.
    #[tracing::instrument(skip(self))]
    pub async fn get_book(&self, id: i64) -> Result<Book, PolystoreError> {
        self.repo.find_by_id(id).await?.ok_or_else(|| {
            NotFoundError {
                entity: "Book",
                id: id.to_string(),
            }
            .into()
        })
    }

    /// List all books, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the repository.
    pub async fn list_books(&self) -> Result<Vec<Book>, PolystoreError> {
        self.repo.find_all().await
    }

    /// Number of books in the catalogue.
    ///
    /// # Errors
    ///
    /// Returns a storage error propagated from the repository.
    pub async fn count_books(&self) -> Result<u64, PolystoreError> {
        self.repo.count().await
    }

    /// Remove a book by id.
    ///
    /// # Errors
    ///
    /// Returns [`PolystoreError::NotFound`] when no book with `id` exists,
    /// or a storage error from the repository.
    #[tracing::instrument(skip(self))]
    pub async fn remove_book(&self, id: i64) -> Result<(), PolystoreError> {
        if self.repo.delete_by_id(id).await? {
            Ok(())
        } else {
            Err(NotFoundError {
                entity: "Book",
                id: id.to_string(),
            }
            .into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polystore_domain::error::ValidationError;
    use std::collections::BTreeMap;
    use std::future::Future;
    use std::sync::Mutex;

    #[derive(Default)]
    struct InMemoryBookRepo {
        store: Mutex<BTreeMap<i64, Book>>,
    }

    impl Repository for InMemoryBookRepo {
        type Entity = Book;

        fn find_all(&self) -> impl Future<Output = Result<Vec<Book>, PolystoreError>> + Send {
            let store = self.store.lock().unwrap();
            let result: Vec<Book> = store.values().cloned().collect();
            async { Ok(result) }
        }

        fn find_by_id(
            &self,
            id: i64,
        ) -> impl Future<Output = Result<Option<Book>, PolystoreError>> + Send {
            let store = self.store.lock().unwrap();
            let result = store.get(&id).cloned();
            async { Ok(result) }
        }

        fn save(&self, book: Book) -> impl Future<Output = Result<Book, PolystoreError>> + Send {
            let mut store = self.store.lock().unwrap();
            store.insert(book.id, book.clone());
            async { Ok(book) }
        }

        fn delete_by_id(&self, id: i64) -> impl Future<Output = Result<bool, PolystoreError>> + Send {
            let mut store = self.store.lock().unwrap();
            let removed = store.remove(&id).is_some();
            async move { Ok(removed) }
        }

        fn count(&self) -> impl Future<Output = Result<u64, PolystoreError>> + Send {
            let store = self.store.lock().unwrap();
            let count = store.len() as u64;
            async move { Ok(count) }
        }
    }

    fn make_service() -> BookService<InMemoryBookRepo> {
        BookService::new(InMemoryBookRepo::default())
    }

    fn spring_in_action() -> Book {
        Book::builder()
            .id(4)
            .name("Spring in Action")
            .price(47.49)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn should_return_empty_list_when_no_book_stored() {
        let svc = make_service();
        assert!(svc.list_books().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn should_list_book_after_adding_it() {
        let svc = make_service();
        svc.add_book(spring_in_action()).await.unwrap();

        let books = svc.list_books().await.unwrap();
        assert_eq!(books, vec![spring_in_action()]);
    }

    #[tokio::test]
    async fn should_reject_book_with_empty_name() {
        let svc = make_service();
        let mut book = spring_in_action();
        book.name = String::new();

        let result = svc.add_book(book).await;
        assert!(matches!(
            result,
            Err(PolystoreError::Validation(ValidationError::EmptyName))
        ));
        assert_eq!(svc.count_books().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn should_replace_book_with_same_id() {
        let svc = make_service();
        svc.add_book(spring_in_action()).await.unwrap();

        let mut second_edition = spring_in_action();
        second_edition.price = 52.0;
        svc.add_book(second_edition).await.unwrap();

        assert_eq!(svc.count_books().await.unwrap(), 1);
        let fetched = svc.get_book(4).await.unwrap();
        assert!((fetched.price - 52.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn should_return_not_found_when_book_missing() {
        let svc = make_service();
        let result = svc.get_book(99).await;
        assert!(matches!(result, Err(PolystoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn should_remove_existing_book() {
        let svc = make_service();
        svc.add_book(spring_in_action()).await.unwrap();

        svc.remove_book(4).await.unwrap();

        assert!(matches!(
            svc.remove_book(4).await,
            Err(PolystoreError::NotFound(_))
        ));
    }
}
