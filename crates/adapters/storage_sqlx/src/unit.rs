//! Persistence unit: a named datasource bound to the entities discovered
//! under one namespace.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use polystore_domain::catalog::EntityCatalog;
use polystore_domain::entity::{Entity, EntityMeta};
use polystore_domain::error::{MappingError, PolystoreError};
use polystore_domain::namespace::Namespace;

use crate::config::SchemaAction;
use crate::datasource::Datasource;
use crate::dialect::Statements;
use crate::error::StorageError;

/// Metamodel entry: an entity and its rendered statements.
#[derive(Debug)]
pub(crate) struct EntityMapping {
    pub meta: &'static EntityMeta,
    pub id_index: usize,
    pub statements: Statements,
}

/// A named association between one datasource and a closed set of entities.
pub struct PersistenceUnit {
    name: String,
    namespace: Namespace,
    datasource: Arc<Datasource>,
    schema: SchemaAction,
    mappings: BTreeMap<&'static str, EntityMapping>,
    closed: AtomicBool,
}

impl std::fmt::Debug for PersistenceUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceUnit")
            .field("name", &self.name)
            .field("namespace", &self.namespace)
            .field("datasource", &self.datasource.name())
            .field("entities", &self.mappings.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl PersistenceUnit {
    /// Discover the entities under `namespace`, build the metamodel, and
    /// apply the schema action.
    ///
    /// # Errors
    ///
    /// Returns [`PolystoreError::Mapping`] when nothing is discovered or the
    /// discovered metadata is inconsistent, and a storage error when schema
    /// creation fails.
    pub async fn build(
        datasource: Arc<Datasource>,
        namespace: Namespace,
        name: impl Into<String>,
        catalog: &EntityCatalog,
        schema: SchemaAction,
    ) -> Result<Self, PolystoreError> {
        let name = name.into();
        let mappings = metamodel(&datasource, &namespace, &name, catalog)?;

        let unit = Self {
            name,
            namespace,
            datasource,
            schema,
            mappings,
            closed: AtomicBool::new(false),
        };

        if schema != SchemaAction::Ignore {
            unit.create_schema().await?;
        }

        tracing::info!(
            unit = %unit.name,
            datasource = %unit.datasource.name(),
            namespace = %unit.namespace,
            entities = unit.mappings.len(),
            "persistence unit built"
        );

        Ok(unit)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Namespace the entities were discovered under.
    #[must_use]
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    #[must_use]
    pub fn datasource(&self) -> &Arc<Datasource> {
        &self.datasource
    }

    #[must_use]
    pub fn schema_action(&self) -> SchemaAction {
        self.schema
    }

    /// Entities in the metamodel, ordered by name.
    pub fn entities(&self) -> impl Iterator<Item = &'static EntityMeta> + '_ {
        self.mappings.values().map(|mapping| mapping.meta)
    }

    /// Whether `meta` belongs to this unit's metamodel.
    #[must_use]
    pub fn manages(&self, meta: &EntityMeta) -> bool {
        self.mappings
            .get(meta.name)
            .is_some_and(|mapping| std::ptr::eq(mapping.meta, meta))
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn mapping<E: Entity>(&self) -> Result<&EntityMapping, MappingError> {
        let meta = E::meta();
        self.mappings
            .get(meta.name)
            .filter(|mapping| std::ptr::eq(mapping.meta, meta))
            .ok_or_else(|| MappingError::UnmanagedEntity {
                entity: meta.name,
                unit: self.name.clone(),
            })
    }

    async fn create_schema(&self) -> Result<(), PolystoreError> {
        let mut pooled = self.datasource.acquire().await?;
        let mut conn = pooled.conn();
        for mapping in self.mappings.values() {
            tracing::debug!(unit = %self.name, table = mapping.meta.table, "creating table");
            conn.execute(&mapping.statements.create_table, Vec::new())
                .await?;
        }
        Ok(())
    }

    async fn drop_schema(&self) -> Result<(), StorageError> {
        let mut pooled = self.datasource.acquire().await?;
        let mut conn = pooled.conn();
        for mapping in self.mappings.values() {
            tracing::debug!(unit = %self.name, table = mapping.meta.table, "dropping table");
            conn.execute(&mapping.statements.drop_table, Vec::new())
                .await?;
        }
        Ok(())
    }

    /// Mark the unit closed, dropping its tables under
    /// [`SchemaAction::CreateDrop`]. The datasource stays open.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if self.schema == SchemaAction::CreateDrop {
            if let Err(err) = self.drop_schema().await {
                tracing::warn!(unit = %self.name, error = %err, "failed to drop schema");
            }
        }
        tracing::info!(unit = %self.name, "persistence unit closed");
    }
}

fn metamodel(
    datasource: &Datasource,
    namespace: &Namespace,
    unit: &str,
    catalog: &EntityCatalog,
) -> Result<BTreeMap<&'static str, EntityMapping>, MappingError> {
    let discovered = catalog.discover(namespace);
    if discovered.is_empty() {
        return Err(MappingError::EmptyUnit {
            unit: unit.to_string(),
            namespace: namespace.to_string(),
        });
    }

    let mut mappings = BTreeMap::new();
    let mut tables = HashSet::new();
    for meta in discovered {
        meta.validate()?;
        if mappings.contains_key(meta.name) {
            return Err(MappingError::DuplicateEntity {
                unit: unit.to_string(),
                entity: meta.name,
            });
        }
        if !tables.insert(meta.table) {
            return Err(MappingError::DuplicateTable {
                unit: unit.to_string(),
                table: meta.table,
            });
        }
        let id_index = meta.id_index().ok_or(MappingError::InvalidIdColumn {
            entity: meta.name,
            column: meta.id_column,
        })?;
        mappings.insert(
            meta.name,
            EntityMapping {
                meta,
                id_index,
                statements: Statements::render(datasource.driver(), meta),
            },
        );
    }
    Ok(mappings)
}
