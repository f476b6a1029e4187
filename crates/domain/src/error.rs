//! Error taxonomy shared across the workspace.
//!
//! Every layer reports through [`PolystoreError`]. Each variant wraps a typed
//! source error and is reachable with `?` through `#[from]` conversions.

use std::fmt;

/// Top-level error for every polystore operation.
#[derive(Debug, thiserror::Error)]
pub enum PolystoreError {
    /// Missing or invalid configuration option.
    #[error("configuration error")]
    Configuration(#[from] ConfigurationError),

    /// A datasource could not be reached while initializing.
    #[error("connect error")]
    Connect(#[from] ConnectError),

    /// Entity metadata is inconsistent, or an entity is used outside its unit.
    #[error("mapping error")]
    Mapping(#[from] MappingError),

    /// A persistence unit name is already registered.
    #[error("duplicate persistence unit")]
    DuplicateUnit(#[from] DuplicateUnitError),

    /// A datasource, coordinator, stack or namespace is registered twice.
    #[error("duplicate binding")]
    DuplicateBinding(#[from] DuplicateBindingError),

    /// A lookup did not match anything registered.
    #[error("unknown binding")]
    UnknownBinding(#[from] UnknownBindingError),

    /// Transaction demarcation misuse.
    #[error("transaction error")]
    Transaction(#[from] TransactionError),

    /// Domain invariant violated.
    #[error("validation error")]
    Validation(#[from] ValidationError),

    /// A requested record does not exist.
    #[error("record not found")]
    NotFound(#[from] NotFoundError),

    /// Error raised by the underlying persistence framework, propagated as is.
    #[error("storage error")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Invalid or missing configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("datasource {datasource:?} is missing required option {option:?}")]
    MissingOption {
        datasource: String,
        option: &'static str,
    },

    #[error("datasource {datasource:?} has invalid option {option:?}: {reason}")]
    InvalidOption {
        datasource: String,
        option: &'static str,
        reason: String,
    },

    #[error("datasource {datasource:?} uses unsupported driver {driver:?}")]
    UnsupportedDriver { datasource: String, driver: String },

    #[error("invalid namespace {namespace:?}: {reason}")]
    InvalidNamespace {
        namespace: String,
        reason: &'static str,
    },

    #[error("no stack is marked as default")]
    NoDefaultStack,

    #[error("more than one stack is marked as default: {}", .0.join(", "))]
    MultipleDefaultStacks(Vec<String>),

    #[error("no stack is configured")]
    NoStacks,
}

/// Initial probe of a datasource failed.
#[derive(Debug, thiserror::Error)]
#[error("unable to connect datasource {datasource:?}")]
pub struct ConnectError {
    pub datasource: String,
    #[source]
    pub source: Box<dyn std::error::Error + Send + Sync>,
}

/// Inconsistent entity metadata, or an entity routed to the wrong unit.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MappingError {
    #[error("entity {entity} declares no column")]
    NoColumns { entity: &'static str },

    #[error("entity {entity} declares id column {column:?} which is missing or not an integer")]
    InvalidIdColumn {
        entity: &'static str,
        column: &'static str,
    },

    #[error("entity {entity} declares column {column:?} twice")]
    DuplicateColumn {
        entity: &'static str,
        column: &'static str,
    },

    #[error("persistence unit {unit:?} discovers two entities named {entity}")]
    DuplicateEntity { unit: String, entity: &'static str },

    #[error("persistence unit {unit:?} maps table {table:?} twice")]
    DuplicateTable { unit: String, table: &'static str },

    #[error("persistence unit {unit:?} discovers no entity under {namespace:?}")]
    EmptyUnit { unit: String, namespace: String },

    #[error("entity {entity} is discovered by both {first:?} and {second:?}")]
    EntityClaimedTwice {
        entity: &'static str,
        first: String,
        second: String,
    },

    #[error("entity {entity} is not managed by persistence unit {unit:?}")]
    UnmanagedEntity { entity: &'static str, unit: String },

    #[error("entity {entity} uses assigned ids but was saved without one")]
    MissingId { entity: &'static str },

    #[error("entity {entity} expects {expected} columns, got {actual}")]
    ColumnCount {
        entity: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("column {entity}.{column} holds an unexpected value (expected {expected})")]
    ColumnType {
        entity: &'static str,
        column: &'static str,
        expected: &'static str,
    },
}

/// A persistence unit name collides with one already registered.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("persistence unit {0:?} is already registered")]
pub struct DuplicateUnitError(pub String);

/// Kind of named object held by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    Stack,
    Datasource,
    PersistenceUnit,
    Coordinator,
    Namespace,
    Repository,
}

impl BindingKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stack => "stack",
            Self::Datasource => "datasource",
            Self::PersistenceUnit => "persistence unit",
            Self::Coordinator => "transaction coordinator",
            Self::Namespace => "namespace",
            Self::Repository => "repository",
        }
    }
}

impl fmt::Display for BindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A name is registered twice.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} {name:?} is already registered")]
pub struct DuplicateBindingError {
    pub kind: BindingKind,
    pub name: String,
}

/// A lookup by name found nothing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no {kind} registered under {name:?}")]
pub struct UnknownBindingError {
    pub kind: BindingKind,
    pub name: String,
}

/// Transaction demarcation errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransactionError {
    #[error("transaction belongs to unit {actual:?}, not {expected:?}")]
    ForeignUnit { expected: String, actual: String },

    #[error("transaction coordinator {0:?} is closed")]
    CoordinatorClosed(String),
}

/// Domain invariant violations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("name must not be empty")]
    EmptyName,

    #[error("price must be a finite, non-negative amount")]
    InvalidPrice,

    #[error("age must not be negative")]
    NegativeAge,
}

/// A record looked up by id does not exist.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{entity} {id} not found")]
pub struct NotFoundError {
    pub entity: &'static str,
    pub id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_convert_typed_errors_with_question_mark() {
        fn lookup() -> Result<(), UnknownBindingError> {
            Err(UnknownBindingError {
                kind: BindingKind::Datasource,
                name: "missing".to_string(),
            })
        }

        fn fails() -> Result<(), PolystoreError> {
            lookup()?;
            Ok(())
        }

        assert!(matches!(fails(), Err(PolystoreError::UnknownBinding(_))));
    }

    #[test]
    fn should_name_the_binding_kind_in_messages() {
        let err = DuplicateBindingError {
            kind: BindingKind::Coordinator,
            name: "libraryTransactionManager".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "transaction coordinator \"libraryTransactionManager\" is already registered"
        );
    }

    #[test]
    fn should_list_every_default_stack_in_message() {
        let err =
            ConfigurationError::MultipleDefaultStacks(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(
            err.to_string(),
            "more than one stack is marked as default: a, b"
        );
    }
}
