//! Storage port: the repository capability set every stack exposes.

use std::future::Future;

use polystore_domain::entity::Entity;
use polystore_domain::error::PolystoreError;

/// Repository over one entity type, bound to exactly one persistence unit.
///
/// Writes run in their own transaction unless the adapter offers an
/// explicit transactional variant.
pub trait Repository {
    type Entity: Entity;

    /// All stored entities, ordered by id.
    fn find_all(&self) -> impl Future<Output = Result<Vec<Self::Entity>, PolystoreError>> + Send;

    /// Entity with the given id, if any.
    fn find_by_id(
        &self,
        id: i64,
    ) -> impl Future<Output = Result<Option<Self::Entity>, PolystoreError>> + Send;

    /// Insert or update an entity, returning it with its id set.
    fn save(
        &self,
        entity: Self::Entity,
    ) -> impl Future<Output = Result<Self::Entity, PolystoreError>> + Send;

    /// Delete by id; `true` when a row was removed.
    fn delete_by_id(&self, id: i64) -> impl Future<Output = Result<bool, PolystoreError>> + Send;

    /// Number of stored entities.
    fn count(&self) -> impl Future<Output = Result<u64, PolystoreError>> + Send;
}
