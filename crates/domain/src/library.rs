//! Library: books served by the embedded stack.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::entity::{ColumnMeta, ColumnType, Entity, EntityMeta, IdStrategy, RowReader, Value};
use crate::error::{MappingError, PolystoreError, ValidationError};

/// Namespace holding the library entities.
pub const ENTITY_NAMESPACE: &str = "library::entity";
/// Namespace holding the library repositories.
pub const REPOSITORY_NAMESPACE: &str = "library::repository";

static BOOK_META: EntityMeta = EntityMeta {
    name: "Book",
    namespace: ENTITY_NAMESPACE,
    table: "book",
    columns: &[
        ColumnMeta::required("id", ColumnType::Integer),
        ColumnMeta::required("name", ColumnType::Text),
        ColumnMeta::required("price", ColumnType::Real),
    ],
    id_column: "id",
    id_strategy: IdStrategy::Assigned,
};

/// A book with a caller-assigned id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub id: i64,
    pub name: String,
    pub price: f64,
}

impl Book {
    #[must_use]
    pub fn builder() -> BookBuilder {
        BookBuilder::default()
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`PolystoreError::Validation`] when `name` is empty or
    /// `price` is negative or not finite.
    pub fn validate(&self) -> Result<(), PolystoreError> {
        if self.name.is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        if !self.price.is_finite() || self.price < 0.0 {
            return Err(ValidationError::InvalidPrice.into());
        }
        Ok(())
    }
}

impl fmt::Display for Book {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Book{{id={}, name={}, price={}}}",
            self.id, self.name, self.price
        )
    }
}

impl Entity for Book {
    fn meta() -> &'static EntityMeta {
        &BOOK_META
    }

    fn id(&self) -> Option<i64> {
        Some(self.id)
    }

    fn assign_id(&mut self, id: i64) {
        self.id = id;
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            Value::Integer(self.id),
            Value::Text(self.name.clone()),
            Value::Real(self.price),
        ]
    }

    fn from_values(values: Vec<Value>) -> Result<Self, MappingError> {
        let mut row = RowReader::new(&BOOK_META, values)?;
        Ok(Self {
            id: row.integer()?,
            name: row.text()?,
            price: row.real()?,
        })
    }
}

/// Step-by-step builder for [`Book`].
#[derive(Debug, Default)]
pub struct BookBuilder {
    id: i64,
    name: Option<String>,
    price: f64,
}

impl BookBuilder {
    #[must_use]
    pub fn id(mut self, id: i64) -> Self {
        self.id = id;
        self
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn price(mut self, price: f64) -> Self {
        self.price = price;
        self
    }

    /// Consume the builder, validate, and return a [`Book`].
    ///
    /// # Errors
    ///
    /// Returns [`PolystoreError::Validation`] if invariants fail.
    pub fn build(self) -> Result<Book, PolystoreError> {
        let book = Book {
            id: self.id,
            name: self.name.unwrap_or_default(),
            price: self.price,
        };
        book.validate()?;
        Ok(book)
    }
}

crate::declare_repository!(
    /// Repository of [`Book`]s, declared under the library namespace.
    BookRepository,
    Book,
    "library::repository"
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::RepositoryDeclaration;

    #[test]
    fn should_build_valid_book() {
        let book = Book::builder()
            .id(4)
            .name("Spring in Action")
            .price(47.49)
            .build()
            .unwrap();
        assert_eq!(book.id, 4);
        assert_eq!(book.name, "Spring in Action");
    }

    #[test]
    fn should_reject_book_without_name() {
        let result = Book::builder().id(1).price(1.0).build();
        assert!(matches!(
            result,
            Err(PolystoreError::Validation(ValidationError::EmptyName))
        ));
    }

    #[test]
    fn should_reject_negative_price() {
        let result = Book::builder().id(1).name("Dune").price(-0.5).build();
        assert!(matches!(
            result,
            Err(PolystoreError::Validation(ValidationError::InvalidPrice))
        ));
    }

    #[test]
    fn should_reject_nan_price() {
        let result = Book::builder().id(1).name("Dune").price(f64::NAN).build();
        assert!(result.is_err());
    }

    #[test]
    fn should_display_like_a_record() {
        let book = Book::builder()
            .id(4)
            .name("Spring in Action")
            .price(47.49)
            .build()
            .unwrap();
        assert_eq!(
            book.to_string(),
            "Book{id=4, name=Spring in Action, price=47.49}"
        );
    }

    #[test]
    fn should_rebuild_from_column_values() {
        let values = vec![
            Value::Integer(9),
            Value::Text("Refactoring".to_string()),
            Value::Real(39.9),
        ];
        let book = Book::from_values(values).unwrap();
        assert_eq!(book.id, 9);
        assert_eq!(book.name, "Refactoring");
    }

    #[test]
    fn should_declare_consistent_metadata() {
        assert_eq!(Book::meta().validate(), Ok(()));
        assert_eq!(Book::meta().namespace, ENTITY_NAMESPACE);
    }

    #[test]
    fn should_declare_repository_under_library_namespace() {
        let meta = BookRepository::meta();
        assert_eq!(meta.name, "BookRepository");
        assert_eq!(meta.namespace, REPOSITORY_NAMESPACE);
        assert_eq!(meta.entity.name, "Book");
    }
}
