//! Accounts: users served by the networked stack.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::entity::{ColumnMeta, ColumnType, Entity, EntityMeta, IdStrategy, RowReader, Value};
use crate::error::{MappingError, PolystoreError, ValidationError};

/// Namespace holding the account entities.
pub const ENTITY_NAMESPACE: &str = "accounts::entity";
/// Namespace holding the account repositories.
pub const REPOSITORY_NAMESPACE: &str = "accounts::repository";

static USER_META: EntityMeta = EntityMeta {
    name: "User",
    namespace: ENTITY_NAMESPACE,
    table: "user",
    columns: &[
        ColumnMeta::required("id", ColumnType::Integer),
        ColumnMeta::required("name", ColumnType::Text),
        ColumnMeta::required("age", ColumnType::Integer),
    ],
    id_column: "id",
    id_strategy: IdStrategy::Generated,
};

/// A user whose id is generated by the database on first save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Option<i64>,
    pub name: String,
    pub age: i32,
}

impl User {
    #[must_use]
    pub fn new(name: impl Into<String>, age: i32) -> Self {
        Self {
            id: None,
            name: name.into(),
            age,
        }
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`PolystoreError::Validation`] when `name` is empty or `age`
    /// is negative.
    pub fn validate(&self) -> Result<(), PolystoreError> {
        if self.name.is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        if self.age < 0 {
            return Err(ValidationError::NegativeAge.into());
        }
        Ok(())
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id {
            Some(id) => write!(f, "User{{id={id}, name={}, age={}}}", self.name, self.age),
            None => write!(f, "User{{id=null, name={}, age={}}}", self.name, self.age),
        }
    }
}

impl Entity for User {
    fn meta() -> &'static EntityMeta {
        &USER_META
    }

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn assign_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            self.id.map_or(Value::Null, Value::Integer),
            Value::Text(self.name.clone()),
            Value::Integer(i64::from(self.age)),
        ]
    }

    fn from_values(values: Vec<Value>) -> Result<Self, MappingError> {
        let mut row = RowReader::new(&USER_META, values)?;
        let id = row.optional_integer()?;
        let name = row.text()?;
        let age = i32::try_from(row.integer()?).map_err(|_| MappingError::ColumnType {
            entity: USER_META.name,
            column: "age",
            expected: "32-bit integer",
        })?;
        Ok(Self { id, name, age })
    }
}

crate::declare_repository!(
    /// Repository of [`User`]s, declared under the accounts namespace.
    UserRepository,
    User,
    "accounts::repository"
);
