//! Stack registry: materializes every configured stack at startup and
//! answers lookups by name for the life of the process.
//!
//! Building is all-or-nothing: name clashes, overlapping repository
//! prefixes and entities claimed by two units are rejected before any pool
//! is opened, and a stack that fails to open closes the ones opened before
//! it.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use polystore_domain::catalog::EntityCatalog;
use polystore_domain::entity::EntityMeta;
use polystore_domain::error::{
    BindingKind, ConfigurationError, DuplicateBindingError, DuplicateUnitError, MappingError,
    PolystoreError, UnknownBindingError,
};
use polystore_domain::namespace::Namespace;
use polystore_domain::repository::{RepositoryDeclaration, RepositoryMeta};

use crate::binding::{BindingTable, RepositoryBinding};
use crate::config::{DatasourceConfig, SchemaAction, StackConfig};
use crate::coordinator::TransactionCoordinator;
use crate::datasource::Datasource;
use crate::entity_manager::EntityManager;
use crate::repository::SqlxRepository;
use crate::unit::PersistenceUnit;

/// Everything needed to open one stack, with every default applied.
#[derive(Debug, Clone)]
pub struct StackDefinition {
    pub name: String,
    pub primary: bool,
    pub datasource_name: String,
    pub unit_name: String,
    pub coordinator_name: String,
    pub entities: Namespace,
    pub repositories: Vec<Namespace>,
    pub schema: SchemaAction,
    pub datasource: DatasourceConfig,
}

impl StackDefinition {
    /// Apply the naming defaults derived from the section name.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::InvalidNamespace`] when a configured
    /// namespace, or one derived from `section`, is malformed.
    pub fn from_config(section: &str, config: &StackConfig) -> Result<Self, ConfigurationError> {
        let entities = match &config.entities {
            Some(namespace) => Namespace::parse(namespace.as_str())?,
            None => Namespace::parse(format!("{section}::entity"))?,
        };
        let repositories = if config.repositories.is_empty() {
            vec![Namespace::parse(format!("{section}::repository"))?]
        } else {
            config
                .repositories
                .iter()
                .map(|namespace| Namespace::parse(namespace.as_str()))
                .collect::<Result<_, _>>()?
        };

        Ok(Self {
            name: section.to_string(),
            primary: config.primary,
            datasource_name: config
                .datasource_name
                .clone()
                .unwrap_or_else(|| section.to_string()),
            unit_name: config
                .unit_name
                .clone()
                .unwrap_or_else(|| format!("{section}Unit")),
            coordinator_name: config
                .coordinator_name
                .clone()
                .unwrap_or_else(|| format!("{section}TransactionManager")),
            entities,
            repositories,
            schema: config.schema,
            datasource: config.datasource.clone(),
        })
    }
}

/// One materialized stack: a datasource, the unit over it, and the
/// coordinator for that unit.
#[derive(Debug)]
pub struct Stack {
    name: String,
    primary: bool,
    datasource: Arc<Datasource>,
    unit: Arc<PersistenceUnit>,
    coordinator: Arc<TransactionCoordinator>,
    repositories: Vec<Namespace>,
}

impl Stack {
    async fn open(
        definition: &StackDefinition,
        catalog: &EntityCatalog,
    ) -> Result<Self, PolystoreError> {
        let datasource = Arc::new(
            Datasource::build(&definition.datasource_name, &definition.datasource).await?,
        );

        let unit = PersistenceUnit::build(
            Arc::clone(&datasource),
            definition.entities.clone(),
            &definition.unit_name,
            catalog,
            definition.schema,
        )
        .await;
        let unit = match unit {
            Ok(unit) => Arc::new(unit),
            Err(err) => {
                datasource.close().await;
                return Err(err);
            }
        };

        let coordinator = Arc::new(TransactionCoordinator::new(
            &definition.coordinator_name,
            Arc::clone(&unit),
        ));

        Ok(Self {
            name: definition.name.clone(),
            primary: definition.primary,
            datasource,
            unit,
            coordinator,
            repositories: definition.repositories.clone(),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether unnamed lookups resolve to this stack.
    #[must_use]
    pub fn is_primary(&self) -> bool {
        self.primary
    }

    #[must_use]
    pub fn datasource(&self) -> &Arc<Datasource> {
        &self.datasource
    }

    #[must_use]
    pub fn unit(&self) -> &Arc<PersistenceUnit> {
        &self.unit
    }

    #[must_use]
    pub fn coordinator(&self) -> &Arc<TransactionCoordinator> {
        &self.coordinator
    }

    /// Repository namespace prefixes bound to this stack.
    #[must_use]
    pub fn repositories(&self) -> &[Namespace] {
        &self.repositories
    }

    #[must_use]
    pub fn entity_manager(&self) -> EntityManager {
        EntityManager::new(Arc::clone(&self.coordinator))
    }
}

pub struct RegistryBuilder {
    catalog: EntityCatalog,
    stacks: Vec<StackDefinition>,
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self {
            catalog: EntityCatalog::builtin(),
            stacks: Vec::new(),
        }
    }
}

impl RegistryBuilder {
    /// A builder over the built-in entity catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn catalog(mut self, catalog: EntityCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    #[must_use]
    pub fn stack(mut self, definition: StackDefinition) -> Self {
        self.stacks.push(definition);
        self
    }

    /// Add one stack per configuration section, in iteration order.
    ///
    /// # Errors
    ///
    /// See [`StackDefinition::from_config`].
    pub fn stacks_from_config<'a, I>(mut self, sections: I) -> Result<Self, ConfigurationError>
    where
        I: IntoIterator<Item = (&'a String, &'a StackConfig)>,
    {
        for (section, config) in sections {
            self.stacks
                .push(StackDefinition::from_config(section, config)?);
        }
        Ok(self)
    }

    /// Open every stack and bind the repository namespaces.
    ///
    /// # Errors
    ///
    /// Returns the first configuration, naming, mapping or connection
    /// failure. Nothing stays open when building fails.
    pub async fn build(self) -> Result<Registry, PolystoreError> {
        let primary = self.check()?;

        let mut stacks: Vec<Stack> = Vec::with_capacity(self.stacks.len());
        for definition in &self.stacks {
            match Stack::open(definition, &self.catalog).await {
                Ok(stack) => stacks.push(stack),
                Err(err) => {
                    tracing::error!(stack = %definition.name, error = %err, "stack failed to open");
                    teardown(&stacks).await;
                    return Err(err);
                }
            }
        }

        let (bindings, repositories) = match bind(&stacks, &self.catalog) {
            Ok(bound) => bound,
            Err(err) => {
                teardown(&stacks).await;
                return Err(err);
            }
        };

        tracing::info!(
            stacks = stacks.len(),
            primary = %stacks[primary].name,
            bindings = bindings.len(),
            "registry ready"
        );

        Ok(Registry {
            stacks,
            primary,
            bindings,
            repositories,
            closed: AtomicBool::new(false),
        })
    }

    /// Checks that need no connection. Returns the primary stack index.
    fn check(&self) -> Result<usize, PolystoreError> {
        if self.stacks.is_empty() {
            return Err(ConfigurationError::NoStacks.into());
        }

        let primaries = self
            .stacks
            .iter()
            .enumerate()
            .filter(|(_, definition)| definition.primary)
            .collect::<Vec<_>>();
        let primary = match primaries.as_slice() {
            [] => return Err(ConfigurationError::NoDefaultStack.into()),
            [(index, _)] => *index,
            many => {
                return Err(ConfigurationError::MultipleDefaultStacks(
                    many.iter().map(|(_, def)| def.name.clone()).collect(),
                )
                .into());
            }
        };

        self.check_names()?;
        self.check_prefixes()?;
        self.check_entity_claims()?;

        Ok(primary)
    }

    fn check_names(&self) -> Result<(), PolystoreError> {
        let mut stacks = HashSet::new();
        let mut taken: HashMap<&str, BindingKind> = HashMap::new();

        for definition in &self.stacks {
            if !stacks.insert(definition.name.as_str()) {
                return Err(duplicate(BindingKind::Stack, &definition.name).into());
            }
            claim(&mut taken, &definition.datasource_name, BindingKind::Datasource)?;
            match taken.get(definition.unit_name.as_str()) {
                Some(BindingKind::PersistenceUnit) => {
                    return Err(DuplicateUnitError(definition.unit_name.clone()).into());
                }
                Some(_) => {
                    return Err(duplicate(BindingKind::PersistenceUnit, &definition.unit_name).into());
                }
                None => {
                    taken.insert(&definition.unit_name, BindingKind::PersistenceUnit);
                }
            }
            claim(&mut taken, &definition.coordinator_name, BindingKind::Coordinator)?;
        }
        Ok(())
    }

    fn check_prefixes(&self) -> Result<(), DuplicateBindingError> {
        let mut seen: Vec<&Namespace> = Vec::new();
        for definition in &self.stacks {
            for prefix in &definition.repositories {
                if seen.iter().any(|known| known.overlaps(prefix)) {
                    return Err(duplicate(BindingKind::Namespace, prefix.as_str()));
                }
                seen.push(prefix);
            }
        }
        Ok(())
    }

    fn check_entity_claims(&self) -> Result<(), MappingError> {
        let mut claimed: HashMap<*const EntityMeta, &str> = HashMap::new();
        for definition in &self.stacks {
            for meta in self.catalog.discover(&definition.entities) {
                let key = std::ptr::from_ref(meta);
                if let Some(first) = claimed.insert(key, &definition.unit_name) {
                    return Err(MappingError::EntityClaimedTwice {
                        entity: meta.name,
                        first: first.to_string(),
                        second: definition.unit_name.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

type ResolvedRepositories = HashMap<&'static str, (&'static RepositoryMeta, RepositoryBinding)>;

fn bind(
    stacks: &[Stack],
    catalog: &EntityCatalog,
) -> Result<(BindingTable, ResolvedRepositories), PolystoreError> {
    let mut bindings = BindingTable::default();
    for stack in stacks {
        for prefix in &stack.repositories {
            bindings.bind(RepositoryBinding::new(
                prefix.clone(),
                stack.name.clone(),
                Arc::clone(&stack.coordinator),
            ))?;
        }
    }

    let mut repositories = HashMap::new();
    for meta in catalog.repositories() {
        let Ok(binding) = bindings.route(meta.namespace) else {
            tracing::debug!(repository = meta.name, namespace = meta.namespace, "repository not bound");
            continue;
        };
        let unit = stacks
            .iter()
            .find(|stack| stack.name == binding.stack())
            .map(|stack| &stack.unit);
        if !unit.is_some_and(|unit| unit.manages(meta.entity)) {
            return Err(MappingError::UnmanagedEntity {
                entity: meta.entity.name,
                unit: binding.unit_name().to_string(),
            }
            .into());
        }
        if repositories.contains_key(meta.name) {
            tracing::error!(
                repository = meta.name,
                namespace = meta.namespace,
                "repository name already bound"
            );
            return Err(duplicate(BindingKind::Repository, meta.name).into());
        }
        tracing::debug!(repository = meta.name, stack = %binding.stack(), "repository bound");
        repositories.insert(meta.name, (*meta, binding.clone()));
    }

    Ok((bindings, repositories))
}

fn claim<'a>(
    taken: &mut HashMap<&'a str, BindingKind>,
    name: &'a str,
    kind: BindingKind,
) -> Result<(), DuplicateBindingError> {
    if taken.insert(name, kind).is_some() {
        return Err(duplicate(kind, name));
    }
    Ok(())
}

fn duplicate(kind: BindingKind, name: &str) -> DuplicateBindingError {
    DuplicateBindingError {
        kind,
        name: name.to_string(),
    }
}

fn unknown(kind: BindingKind, name: &str) -> UnknownBindingError {
    UnknownBindingError {
        kind,
        name: name.to_string(),
    }
}

async fn teardown(stacks: &[Stack]) {
    for stack in stacks.iter().rev() {
        stack.coordinator.close();
    }
    for stack in stacks.iter().rev() {
        stack.unit.close().await;
    }
    for stack in stacks.iter().rev() {
        stack.datasource.close().await;
    }
}

/// The materialized stacks, shared read-only by every task.
///
/// Lookups hand out the same `Arc` every time they are asked for a name.
#[derive(Debug)]
pub struct Registry {
    stacks: Vec<Stack>,
    primary: usize,
    bindings: BindingTable,
    repositories: ResolvedRepositories,
    closed: AtomicBool,
}

impl Registry {
    #[must_use]
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Stacks in declaration order.
    pub fn stacks(&self) -> impl Iterator<Item = &Stack> {
        self.stacks.iter()
    }

    /// # Errors
    ///
    /// Returns [`UnknownBindingError`] when no stack has that name.
    pub fn stack(&self, name: &str) -> Result<&Stack, UnknownBindingError> {
        self.stacks
            .iter()
            .find(|stack| stack.name == name)
            .ok_or_else(|| unknown(BindingKind::Stack, name))
    }

    #[must_use]
    pub fn default_stack(&self) -> &Stack {
        &self.stacks[self.primary]
    }

    /// # Errors
    ///
    /// Returns [`UnknownBindingError`] when no datasource has that name.
    pub fn datasource(&self, name: &str) -> Result<&Arc<Datasource>, UnknownBindingError> {
        self.stacks
            .iter()
            .map(|stack| &stack.datasource)
            .find(|datasource| datasource.name() == name)
            .ok_or_else(|| unknown(BindingKind::Datasource, name))
    }

    #[must_use]
    pub fn default_datasource(&self) -> &Arc<Datasource> {
        &self.default_stack().datasource
    }

    /// # Errors
    ///
    /// Returns [`UnknownBindingError`] when no persistence unit has that name.
    pub fn unit(&self, name: &str) -> Result<&Arc<PersistenceUnit>, UnknownBindingError> {
        self.stacks
            .iter()
            .map(|stack| &stack.unit)
            .find(|unit| unit.name() == name)
            .ok_or_else(|| unknown(BindingKind::PersistenceUnit, name))
    }

    #[must_use]
    pub fn default_unit(&self) -> &Arc<PersistenceUnit> {
        &self.default_stack().unit
    }

    /// # Errors
    ///
    /// Returns [`UnknownBindingError`] when no coordinator has that name.
    pub fn coordinator(
        &self,
        name: &str,
    ) -> Result<&Arc<TransactionCoordinator>, UnknownBindingError> {
        self.stacks
            .iter()
            .map(|stack| &stack.coordinator)
            .find(|coordinator| coordinator.name() == name)
            .ok_or_else(|| unknown(BindingKind::Coordinator, name))
    }

    #[must_use]
    pub fn default_coordinator(&self) -> &Arc<TransactionCoordinator> {
        &self.default_stack().coordinator
    }

    /// Binding registered for exactly `prefix`.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownBindingError`] when nothing is bound to `prefix`.
    pub fn binding(&self, prefix: &str) -> Result<&RepositoryBinding, UnknownBindingError> {
        self.bindings.get(prefix)
    }

    pub fn bindings(&self) -> impl Iterator<Item = &RepositoryBinding> {
        self.bindings.iter()
    }

    /// Repository for declaration `D`, served by the stack its namespace was
    /// bound to when the registry was built.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownBindingError`] when `D` was not in the catalog or its
    /// namespace matched no binding.
    pub fn repository<D: RepositoryDeclaration>(
        &self,
    ) -> Result<SqlxRepository<D>, UnknownBindingError> {
        let meta = D::meta();
        self.repositories
            .get(meta.name)
            .filter(|(known, _)| std::ptr::eq(*known, meta))
            .map(|(_, binding)| SqlxRepository::new(binding.entity_manager()))
            .ok_or_else(|| unknown(BindingKind::Repository, meta.name))
    }

    /// Close coordinators, then units, then datasources, newest stack first.
    /// Later calls do nothing.
    pub async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        teardown(&self.stacks).await;
        tracing::info!("registry shut down");
    }

    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(url: &str, primary: bool) -> StackConfig {
        StackConfig {
            primary,
            datasource: DatasourceConfig::from_url(url),
            ..StackConfig::default()
        }
    }

    fn definition(name: &str, config: &StackConfig) -> StackDefinition {
        StackDefinition::from_config(name, config).unwrap()
    }

    #[test]
    fn should_derive_names_from_section() {
        let def = definition("library", &section("sqlite::memory:", true));
        assert_eq!(def.datasource_name, "library");
        assert_eq!(def.unit_name, "libraryUnit");
        assert_eq!(def.coordinator_name, "libraryTransactionManager");
        assert_eq!(def.entities.as_str(), "library::entity");
        assert_eq!(def.repositories.len(), 1);
        assert_eq!(def.repositories[0].as_str(), "library::repository");
    }

    #[test]
    fn should_keep_explicit_names() {
        let config = StackConfig {
            unit_name: Some("booksUnit".to_string()),
            entities: Some("library::model".to_string()),
            repositories: vec!["library::dao".to_string(), "library::search".to_string()],
            ..section("sqlite::memory:", true)
        };
        let def = definition("library", &config);
        assert_eq!(def.unit_name, "booksUnit");
        assert_eq!(def.entities.as_str(), "library::model");
        assert_eq!(def.repositories.len(), 2);
    }

    #[test]
    fn should_reject_malformed_namespace() {
        let config = StackConfig {
            entities: Some("library::".to_string()),
            ..section("sqlite::memory:", true)
        };
        assert!(matches!(
            StackDefinition::from_config("library", &config),
            Err(ConfigurationError::InvalidNamespace { .. })
        ));
    }

    #[tokio::test]
    async fn should_fail_without_stacks() {
        let result = RegistryBuilder::new().build().await;
        assert!(matches!(
            result,
            Err(PolystoreError::Configuration(ConfigurationError::NoStacks))
        ));
    }

    #[tokio::test]
    async fn should_fail_without_primary_stack() {
        let result = RegistryBuilder::new()
            .stack(definition("library", &section("sqlite::memory:", false)))
            .build()
            .await;
        assert!(matches!(
            result,
            Err(PolystoreError::Configuration(
                ConfigurationError::NoDefaultStack
            ))
        ));
    }

    #[tokio::test]
    async fn should_fail_with_two_primary_stacks() {
        let result = RegistryBuilder::new()
            .stack(definition("library", &section("sqlite::memory:", true)))
            .stack(definition("accounts", &section("sqlite::memory:", true)))
            .build()
            .await;
        let Err(PolystoreError::Configuration(ConfigurationError::MultipleDefaultStacks(names))) =
            result
        else {
            panic!("expected MultipleDefaultStacks");
        };
        assert_eq!(names, vec!["library".to_string(), "accounts".to_string()]);
    }

    #[tokio::test]
    async fn should_fail_when_unit_names_collide() {
        let accounts = StackConfig {
            unit_name: Some("libraryUnit".to_string()),
            ..section("sqlite::memory:", false)
        };
        let result = RegistryBuilder::new()
            .stack(definition("library", &section("sqlite::memory:", true)))
            .stack(definition("accounts", &accounts))
            .build()
            .await;
        assert!(matches!(
            result,
            Err(PolystoreError::DuplicateUnit(DuplicateUnitError(name))) if name == "libraryUnit"
        ));
    }

    #[tokio::test]
    async fn should_fail_when_coordinator_reuses_datasource_name() {
        let accounts = StackConfig {
            coordinator_name: Some("library".to_string()),
            ..section("sqlite::memory:", false)
        };
        let result = RegistryBuilder::new()
            .stack(definition("library", &section("sqlite::memory:", true)))
            .stack(definition("accounts", &accounts))
            .build()
            .await;
        assert!(matches!(
            result,
            Err(PolystoreError::DuplicateBinding(DuplicateBindingError {
                kind: BindingKind::Coordinator,
                ..
            }))
        ));
    }

    #[tokio::test]
    async fn should_fail_when_repository_prefixes_overlap() {
        let accounts = StackConfig {
            repositories: vec!["library::repository::admin".to_string()],
            ..section("sqlite::memory:", false)
        };
        let result = RegistryBuilder::new()
            .stack(definition("library", &section("sqlite::memory:", true)))
            .stack(definition("accounts", &accounts))
            .build()
            .await;
        assert!(matches!(
            result,
            Err(PolystoreError::DuplicateBinding(DuplicateBindingError {
                kind: BindingKind::Namespace,
                ..
            }))
        ));
    }

    #[tokio::test]
    async fn should_fail_when_two_units_discover_one_entity() {
        let accounts = StackConfig {
            entities: Some("library".to_string()),
            ..section("sqlite::memory:", false)
        };
        let result = RegistryBuilder::new()
            .stack(definition("library", &section("sqlite::memory:", true)))
            .stack(definition("accounts", &accounts))
            .build()
            .await;
        assert!(matches!(
            result,
            Err(PolystoreError::Mapping(MappingError::EntityClaimedTwice {
                entity: "Book",
                ..
            }))
        ));
    }

    #[tokio::test]
    async fn should_fail_when_repository_routes_to_unit_without_its_entity() {
        let library = StackConfig {
            repositories: vec!["library::repository".to_string(), "accounts::repository".to_string()],
            ..section("sqlite::memory:", true)
        };
        let accounts = StackConfig {
            repositories: vec!["accounts::admin".to_string()],
            ..section("sqlite::memory:", false)
        };
        let result = RegistryBuilder::new()
            .stack(definition("library", &library))
            .stack(definition("accounts", &accounts))
            .build()
            .await;
        assert!(matches!(
            result,
            Err(PolystoreError::Mapping(MappingError::UnmanagedEntity {
                entity: "User",
                ..
            }))
        ));
    }

    mod shelf {
        polystore_domain::declare_repository!(
            BookRepository,
            polystore_domain::library::Book,
            "library::repository::shelf"
        );
    }

    mod archive {
        polystore_domain::declare_repository!(
            BookRepository,
            polystore_domain::library::Book,
            "library::repository::archive"
        );
    }

    #[tokio::test]
    async fn should_fail_when_two_bound_repositories_share_a_name() {
        let catalog = EntityCatalog::new()
            .with_entity::<polystore_domain::library::Book>()
            .with_repository::<shelf::BookRepository>()
            .with_repository::<archive::BookRepository>();
        let result = RegistryBuilder::new()
            .catalog(catalog)
            .stack(definition("library", &section("sqlite::memory:", true)))
            .build()
            .await;
        assert!(matches!(
            result,
            Err(PolystoreError::DuplicateBinding(DuplicateBindingError {
                kind: BindingKind::Repository,
                ref name,
            })) if name == "BookRepository"
        ));
    }

    #[tokio::test]
    async fn should_resolve_default_stack_and_names() {
        let registry = RegistryBuilder::new()
            .stack(definition("library", &section("sqlite::memory:", true)))
            .stack(definition("accounts", &section("sqlite::memory:", false)))
            .build()
            .await
            .unwrap();

        assert_eq!(registry.default_stack().name(), "library");
        assert!(Arc::ptr_eq(
            registry.default_unit(),
            registry.unit("libraryUnit").unwrap()
        ));
        assert_eq!(
            registry.coordinator("accountsTransactionManager").unwrap().unit().name(),
            "accountsUnit"
        );
        assert_eq!(
            registry.datasource("ghost").unwrap_err(),
            UnknownBindingError {
                kind: BindingKind::Datasource,
                name: "ghost".to_string(),
            }
        );

        registry.shutdown().await;
        assert!(registry.is_shut_down());
        assert!(registry.default_datasource().is_closed());
    }
}
