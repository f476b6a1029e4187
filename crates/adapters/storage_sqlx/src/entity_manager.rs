//! Entity manager: CRUD over the entities of one persistence unit.
//!
//! Reads outside a transaction run on a pooled connection. Writes outside a
//! transaction open, commit, or roll back their own through the unit's
//! coordinator. The `*_in` variants join a caller-held [`Tx`].

use std::sync::Arc;

use polystore_domain::entity::{Entity, IdStrategy, Value};
use polystore_domain::error::{MappingError, PolystoreError, TransactionError};

use crate::coordinator::{TransactionCoordinator, Tx};
use crate::executor::Conn;
use crate::unit::{EntityMapping, PersistenceUnit};

#[derive(Debug, Clone)]
pub struct EntityManager {
    coordinator: Arc<TransactionCoordinator>,
}

impl EntityManager {
    #[must_use]
    pub fn new(coordinator: Arc<TransactionCoordinator>) -> Self {
        Self { coordinator }
    }

    #[must_use]
    pub fn unit(&self) -> &Arc<PersistenceUnit> {
        self.coordinator.unit()
    }

    #[must_use]
    pub fn coordinator(&self) -> &Arc<TransactionCoordinator> {
        &self.coordinator
    }

    /// Begin a transaction on this manager's unit.
    ///
    /// # Errors
    ///
    /// See [`TransactionCoordinator::begin`].
    pub async fn begin(&self) -> Result<Tx, PolystoreError> {
        self.coordinator.begin().await
    }

    /// # Errors
    ///
    /// Fails with [`MappingError::UnmanagedEntity`] when `E` is not part of
    /// this unit, or with a storage error.
    pub async fn find_all<E: Entity>(&self) -> Result<Vec<E>, PolystoreError> {
        let mapping = self.unit().mapping::<E>()?;
        let mut pooled = self.unit().datasource().acquire().await?;
        find_all_with(mapping, pooled.conn()).await
    }

    /// # Errors
    ///
    /// As [`Self::find_all`], plus [`TransactionError::ForeignUnit`].
    pub async fn find_all_in<E: Entity>(&self, tx: &mut Tx) -> Result<Vec<E>, PolystoreError> {
        let mapping = self.unit().mapping::<E>()?;
        self.check(tx)?;
        find_all_with(mapping, tx.conn()).await
    }

    /// # Errors
    ///
    /// As [`Self::find_all`].
    pub async fn find_by_id<E: Entity>(&self, id: i64) -> Result<Option<E>, PolystoreError> {
        let mapping = self.unit().mapping::<E>()?;
        let mut pooled = self.unit().datasource().acquire().await?;
        find_by_id_with(mapping, pooled.conn(), id).await
    }

    /// # Errors
    ///
    /// As [`Self::find_all_in`].
    pub async fn find_by_id_in<E: Entity>(
        &self,
        tx: &mut Tx,
        id: i64,
    ) -> Result<Option<E>, PolystoreError> {
        let mapping = self.unit().mapping::<E>()?;
        self.check(tx)?;
        find_by_id_with(mapping, tx.conn(), id).await
    }

    /// Insert `entity`, or update it when a row with its id exists.
    /// Generated ids are written back into the returned entity.
    ///
    /// # Errors
    ///
    /// As [`Self::find_all`], plus [`MappingError::MissingId`] for an
    /// assigned-id entity saved without one.
    pub async fn save<E: Entity>(&self, entity: E) -> Result<E, PolystoreError> {
        let mapping = self.unit().mapping::<E>()?;
        let mut tx = self.coordinator.begin().await?;
        let result = save_with(mapping, tx.conn(), entity).await;
        match result {
            Ok(saved) => {
                self.coordinator.commit(tx).await?;
                Ok(saved)
            }
            Err(err) => {
                self.abandon(tx).await;
                Err(err)
            }
        }
    }

    /// # Errors
    ///
    /// As [`Self::save`], plus [`TransactionError::ForeignUnit`].
    pub async fn save_in<E: Entity>(&self, tx: &mut Tx, entity: E) -> Result<E, PolystoreError> {
        let mapping = self.unit().mapping::<E>()?;
        self.check(tx)?;
        save_with(mapping, tx.conn(), entity).await
    }

    /// Returns whether a row was deleted.
    ///
    /// # Errors
    ///
    /// As [`Self::find_all`].
    pub async fn delete_by_id<E: Entity>(&self, id: i64) -> Result<bool, PolystoreError> {
        let mapping = self.unit().mapping::<E>()?;
        let mut tx = self.coordinator.begin().await?;
        let result = delete_with(mapping, tx.conn(), id).await;
        match result {
            Ok(deleted) => {
                self.coordinator.commit(tx).await?;
                Ok(deleted)
            }
            Err(err) => {
                self.abandon(tx).await;
                Err(err)
            }
        }
    }

    /// # Errors
    ///
    /// As [`Self::find_all_in`].
    pub async fn delete_by_id_in<E: Entity>(
        &self,
        tx: &mut Tx,
        id: i64,
    ) -> Result<bool, PolystoreError> {
        let mapping = self.unit().mapping::<E>()?;
        self.check(tx)?;
        delete_with(mapping, tx.conn(), id).await
    }

    /// # Errors
    ///
    /// As [`Self::find_all`].
    pub async fn count<E: Entity>(&self) -> Result<u64, PolystoreError> {
        let mapping = self.unit().mapping::<E>()?;
        let mut pooled = self.unit().datasource().acquire().await?;
        let mut conn = pooled.conn();
        Ok(conn.fetch_count(&mapping.statements.count, Vec::new()).await?)
    }

    /// # Errors
    ///
    /// As [`Self::find_all_in`].
    pub async fn count_in<E: Entity>(&self, tx: &mut Tx) -> Result<u64, PolystoreError> {
        let mapping = self.unit().mapping::<E>()?;
        self.check(tx)?;
        let mut conn = tx.conn();
        Ok(conn.fetch_count(&mapping.statements.count, Vec::new()).await?)
    }

    fn check(&self, tx: &Tx) -> Result<(), TransactionError> {
        if tx.coordinator() == self.coordinator.name() {
            Ok(())
        } else {
            Err(TransactionError::ForeignUnit {
                expected: self.unit().name().to_string(),
                actual: tx.unit().to_string(),
            })
        }
    }

    async fn abandon(&self, tx: Tx) {
        if let Err(err) = self.coordinator.rollback(tx).await {
            tracing::warn!(unit = %self.unit().name(), error = %err, "rollback failed");
        }
    }
}

async fn find_all_with<E: Entity>(
    mapping: &EntityMapping,
    mut conn: Conn<'_>,
) -> Result<Vec<E>, PolystoreError> {
    let rows = conn
        .fetch_rows(
            &mapping.statements.select_all,
            Vec::new(),
            mapping.meta.columns,
        )
        .await?;
    rows.into_iter()
        .map(|row| E::from_values(row).map_err(PolystoreError::from))
        .collect()
}

async fn find_by_id_with<E: Entity>(
    mapping: &EntityMapping,
    mut conn: Conn<'_>,
    id: i64,
) -> Result<Option<E>, PolystoreError> {
    let rows = conn
        .fetch_rows(
            &mapping.statements.select_by_id,
            vec![Value::Integer(id)],
            mapping.meta.columns,
        )
        .await?;
    match rows.into_iter().next() {
        Some(row) => Ok(Some(E::from_values(row)?)),
        None => Ok(None),
    }
}

async fn save_with<E: Entity>(
    mapping: &EntityMapping,
    mut conn: Conn<'_>,
    mut entity: E,
) -> Result<E, PolystoreError> {
    let statements = &mapping.statements;
    let values = entity.to_values();
    if values.len() != mapping.meta.columns.len() {
        return Err(MappingError::ColumnCount {
            entity: mapping.meta.name,
            expected: mapping.meta.columns.len(),
            actual: values.len(),
        }
        .into());
    }

    let Some(id) = entity.id() else {
        if mapping.meta.id_strategy == IdStrategy::Assigned {
            return Err(MappingError::MissingId {
                entity: mapping.meta.name,
            }
            .into());
        }
        let outcome = conn
            .execute(&statements.insert_generated, without_id(mapping, values))
            .await?;
        entity.assign_id(outcome.last_insert_id);
        tracing::debug!(entity = mapping.meta.name, id = outcome.last_insert_id, "inserted");
        return Ok(entity);
    };

    let exists = conn
        .fetch_count(&statements.exists_by_id, vec![Value::Integer(id)])
        .await?
        > 0;
    if !exists {
        conn.execute(&statements.insert, values).await?;
        tracing::debug!(entity = mapping.meta.name, id, "inserted");
    } else if let Some(update) = &statements.update {
        let mut params = without_id(mapping, values);
        params.push(Value::Integer(id));
        conn.execute(update, params).await?;
        tracing::debug!(entity = mapping.meta.name, id, "updated");
    }
    Ok(entity)
}

async fn delete_with(
    mapping: &EntityMapping,
    mut conn: Conn<'_>,
    id: i64,
) -> Result<bool, PolystoreError> {
    let outcome = conn
        .execute(&mapping.statements.delete_by_id, vec![Value::Integer(id)])
        .await?;
    Ok(outcome.rows_affected > 0)
}

fn without_id(mapping: &EntityMapping, values: Vec<Value>) -> Vec<Value> {
    values
        .into_iter()
        .enumerate()
        .filter(|(index, _)| *index != mapping.id_index)
        .map(|(_, value)| value)
        .collect()
}
