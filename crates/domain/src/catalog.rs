//! Entity catalog: the closed set of entity and repository declarations
//! known to the process. Persistence units discover their entities here by
//! namespace prefix.

use crate::accounts::{User, UserRepository};
use crate::entity::{Entity, EntityMeta};
use crate::library::{Book, BookRepository};
use crate::namespace::Namespace;
use crate::repository::{RepositoryDeclaration, RepositoryMeta};

/// Every entity and repository declaration the process can map.
#[derive(Debug, Clone, Default)]
pub struct EntityCatalog {
    entities: Vec<&'static EntityMeta>,
    repositories: Vec<&'static RepositoryMeta>,
}

impl EntityCatalog {
    /// An empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The catalog of the sample application: books and users with their
    /// repositories.
    #[must_use]
    pub fn builtin() -> Self {
        Self::new()
            .with_entity::<Book>()
            .with_entity::<User>()
            .with_repository::<BookRepository>()
            .with_repository::<UserRepository>()
    }

    #[must_use]
    pub fn with_entity<E: Entity>(self) -> Self {
        self.with_entity_meta(E::meta())
    }

    #[must_use]
    pub fn with_entity_meta(mut self, meta: &'static EntityMeta) -> Self {
        if !self.entities.iter().any(|known| std::ptr::eq(*known, meta)) {
            self.entities.push(meta);
        }
        self
    }

    #[must_use]
    pub fn with_repository<D: RepositoryDeclaration>(mut self) -> Self {
        let meta = D::meta();
        if !self
            .repositories
            .iter()
            .any(|known| std::ptr::eq(*known, meta))
        {
            self.repositories.push(meta);
        }
        self
    }

    /// Entities declared under `namespace` (or below it), in catalog order.
    #[must_use]
    pub fn discover(&self, namespace: &Namespace) -> Vec<&'static EntityMeta> {
        self.entities
            .iter()
            .copied()
            .filter(|meta| namespace.contains(meta.namespace))
            .collect()
    }

    #[must_use]
    pub fn entities(&self) -> &[&'static EntityMeta] {
        &self.entities
    }

    #[must_use]
    pub fn repositories(&self) -> &[&'static RepositoryMeta] {
        &self.repositories
    }
}
