//! Entity metadata: what a persistence unit needs to know to map a type.
//!
//! Rust has no runtime reflection, so each entity describes itself through a
//! static [`EntityMeta`] and converts to and from an ordered list of
//! [`Value`]s matching the declared columns.

use std::collections::HashSet;
use std::fmt;

use crate::error::MappingError;

/// A single column value, independent of the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Integer(value) => value.fmt(f),
            Self::Real(value) => value.fmt(f),
            Self::Text(value) => write!(f, "{value:?}"),
        }
    }
}

/// Storage class of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Real,
    Text,
}

impl ColumnType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Real => "real",
            Self::Text => "text",
        }
    }
}

/// One mapped column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnMeta {
    pub name: &'static str,
    pub ty: ColumnType,
    pub nullable: bool,
}

impl ColumnMeta {
    #[must_use]
    pub const fn required(name: &'static str, ty: ColumnType) -> Self {
        Self {
            name,
            ty,
            nullable: false,
        }
    }

    #[must_use]
    pub const fn nullable(name: &'static str, ty: ColumnType) -> Self {
        Self {
            name,
            ty,
            nullable: true,
        }
    }
}

/// How an entity obtains its primary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdStrategy {
    /// The caller sets the id before saving.
    Assigned,
    /// The database generates the id on insert.
    Generated,
}

/// Static description of an entity type.
#[derive(Debug, PartialEq, Eq)]
pub struct EntityMeta {
    /// Entity name, unique within a persistence unit.
    pub name: &'static str,
    /// Namespace the entity is declared under; drives discovery.
    pub namespace: &'static str,
    pub table: &'static str,
    /// Columns in the order used by [`Entity::to_values`].
    pub columns: &'static [ColumnMeta],
    pub id_column: &'static str,
    pub id_strategy: IdStrategy,
}

impl EntityMeta {
    /// Check that the metadata is self-consistent.
    ///
    /// # Errors
    ///
    /// Returns [`MappingError`] when no column is declared, when the id
    /// column is missing or not an integer, or when a column name repeats.
    pub fn validate(&self) -> Result<(), MappingError> {
        if self.columns.is_empty() {
            return Err(MappingError::NoColumns { entity: self.name });
        }

        match self.column(self.id_column) {
            Some(col) if col.ty == ColumnType::Integer => {}
            _ => {
                return Err(MappingError::InvalidIdColumn {
                    entity: self.name,
                    column: self.id_column,
                });
            }
        }

        let mut seen = HashSet::with_capacity(self.columns.len());
        for col in self.columns {
            if !seen.insert(col.name) {
                return Err(MappingError::DuplicateColumn {
                    entity: self.name,
                    column: col.name,
                });
            }
        }

        Ok(())
    }

    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ColumnMeta> {
        self.columns.iter().find(|col| col.name == name)
    }

    /// Position of the id column in [`Self::columns`].
    #[must_use]
    pub fn id_index(&self) -> Option<usize> {
        self.columns.iter().position(|col| col.name == self.id_column)
    }
}

/// A type a persistence unit can map to a table.
pub trait Entity: Clone + Send + Sync + 'static {
    fn meta() -> &'static EntityMeta;

    /// Primary key, if the entity has one yet.
    fn id(&self) -> Option<i64>;

    /// Store a database-generated primary key.
    fn assign_id(&mut self, id: i64);

    /// Column values, ordered like [`EntityMeta::columns`].
    fn to_values(&self) -> Vec<Value>;

    /// Rebuild the entity from column values ordered like
    /// [`EntityMeta::columns`].
    ///
    /// # Errors
    ///
    /// Returns [`MappingError`] when the values do not fit the columns.
    fn from_values(values: Vec<Value>) -> Result<Self, MappingError>;
}

/// Sequential reader over a row's values, used by [`Entity::from_values`].
pub struct RowReader {
    meta: &'static EntityMeta,
    position: usize,
    values: std::vec::IntoIter<Value>,
}

impl RowReader {
    /// # Errors
    ///
    /// Returns [`MappingError::ColumnCount`] when the number of values
    /// differs from the number of declared columns.
    pub fn new(meta: &'static EntityMeta, values: Vec<Value>) -> Result<Self, MappingError> {
        if values.len() != meta.columns.len() {
            return Err(MappingError::ColumnCount {
                entity: meta.name,
                expected: meta.columns.len(),
                actual: values.len(),
            });
        }
        Ok(Self {
            meta,
            position: 0,
            values: values.into_iter(),
        })
    }

    fn advance(&mut self) -> Result<(&'static str, Value), MappingError> {
        let column = self.meta.columns.get(self.position).map(|col| col.name);
        self.position += 1;
        match (column, self.values.next()) {
            (Some(column), Some(value)) => Ok((column, value)),
            _ => Err(MappingError::ColumnCount {
                entity: self.meta.name,
                expected: self.meta.columns.len(),
                actual: self.position - 1,
            }),
        }
    }

    fn mismatch(&self, column: &'static str, expected: &'static str) -> MappingError {
        MappingError::ColumnType {
            entity: self.meta.name,
            column,
            expected,
        }
    }

    /// # Errors
    ///
    /// Returns [`MappingError::ColumnType`] unless the next value is an integer.
    pub fn integer(&mut self) -> Result<i64, MappingError> {
        match self.advance()? {
            (_, Value::Integer(value)) => Ok(value),
            (column, _) => Err(self.mismatch(column, "integer")),
        }
    }

    /// # Errors
    ///
    /// Returns [`MappingError::ColumnType`] unless the next value is an
    /// integer or null.
    pub fn optional_integer(&mut self) -> Result<Option<i64>, MappingError> {
        match self.advance()? {
            (_, Value::Integer(value)) => Ok(Some(value)),
            (_, Value::Null) => Ok(None),
            (column, _) => Err(self.mismatch(column, "integer")),
        }
    }

    /// # Errors
    ///
    /// Returns [`MappingError::ColumnType`] unless the next value is a real
    /// (integers are widened).
    #[allow(clippy::cast_precision_loss)]
    pub fn real(&mut self) -> Result<f64, MappingError> {
        match self.advance()? {
            (_, Value::Real(value)) => Ok(value),
            (_, Value::Integer(value)) => Ok(value as f64),
            (column, _) => Err(self.mismatch(column, "real")),
        }
    }

    /// # Errors
    ///
    /// Returns [`MappingError::ColumnType`] unless the next value is text.
    pub fn text(&mut self) -> Result<String, MappingError> {
        match self.advance()? {
            (_, Value::Text(value)) => Ok(value),
            (column, _) => Err(self.mismatch(column, "text")),
        }
    }
}
