//! Repository implementation routed through a stack's entity manager.

use std::future::Future;
use std::marker::PhantomData;

use polystore_app::ports::Repository;
use polystore_domain::error::PolystoreError;
use polystore_domain::repository::RepositoryDeclaration;

use crate::coordinator::Tx;
use crate::entity_manager::EntityManager;

/// Repository for declaration `D`, bound to the persistence unit its
/// namespace routes to.
pub struct SqlxRepository<D> {
    manager: EntityManager,
    declaration: PhantomData<fn() -> D>,
}

impl<D> Clone for SqlxRepository<D> {
    fn clone(&self) -> Self {
        Self {
            manager: self.manager.clone(),
            declaration: PhantomData,
        }
    }
}

impl<D: RepositoryDeclaration> std::fmt::Debug for SqlxRepository<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlxRepository")
            .field("repository", &D::meta().name)
            .field("unit", &self.manager.unit().name())
            .finish()
    }
}

impl<D: RepositoryDeclaration> SqlxRepository<D> {
    pub(crate) fn new(manager: EntityManager) -> Self {
        Self {
            manager,
            declaration: PhantomData,
        }
    }

    #[must_use]
    pub fn entity_manager(&self) -> &EntityManager {
        &self.manager
    }

    /// Save inside a caller-held transaction of the same unit.
    ///
    /// # Errors
    ///
    /// See [`EntityManager::save_in`].
    pub async fn save_in(
        &self,
        tx: &mut Tx,
        entity: D::Entity,
    ) -> Result<D::Entity, PolystoreError> {
        self.manager.save_in(tx, entity).await
    }

    /// # Errors
    ///
    /// See [`EntityManager::find_all_in`].
    pub async fn find_all_in(&self, tx: &mut Tx) -> Result<Vec<D::Entity>, PolystoreError> {
        self.manager.find_all_in(tx).await
    }

    /// # Errors
    ///
    /// See [`EntityManager::delete_by_id_in`].
    pub async fn delete_by_id_in(&self, tx: &mut Tx, id: i64) -> Result<bool, PolystoreError> {
        self.manager.delete_by_id_in::<D::Entity>(tx, id).await
    }
}

impl<D: RepositoryDeclaration> Repository for SqlxRepository<D> {
    type Entity = D::Entity;

    fn find_all(&self) -> impl Future<Output = Result<Vec<D::Entity>, PolystoreError>> + Send {
        let manager = self.manager.clone();
        async move { manager.find_all::<D::Entity>().await }
    }

    fn find_by_id(
        &self,
        id: i64,
    ) -> impl Future<Output = Result<Option<D::Entity>, PolystoreError>> + Send {
        let manager = self.manager.clone();
        async move { manager.find_by_id::<D::Entity>(id).await }
    }

    fn save(
        &self,
        entity: D::Entity,
    ) -> impl Future<Output = Result<D::Entity, PolystoreError>> + Send {
        let manager = self.manager.clone();
        async move { manager.save(entity).await }
    }

    fn delete_by_id(&self, id: i64) -> impl Future<Output = Result<bool, PolystoreError>> + Send {
        let manager = self.manager.clone();
        async move { manager.delete_by_id::<D::Entity>(id).await }
    }

    fn count(&self) -> impl Future<Output = Result<u64, PolystoreError>> + Send {
        let manager = self.manager.clone();
        async move { manager.count::<D::Entity>().await }
    }
}
