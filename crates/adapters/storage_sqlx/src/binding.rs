//! Repository bindings: which stack serves the repositories declared under
//! a namespace prefix.

use std::sync::Arc;

use polystore_domain::error::{BindingKind, DuplicateBindingError, UnknownBindingError};
use polystore_domain::namespace::Namespace;

use crate::coordinator::TransactionCoordinator;
use crate::entity_manager::EntityManager;

#[derive(Debug, Clone)]
pub struct RepositoryBinding {
    prefix: Namespace,
    stack: String,
    coordinator: Arc<TransactionCoordinator>,
}

impl RepositoryBinding {
    #[must_use]
    pub fn new(
        prefix: Namespace,
        stack: impl Into<String>,
        coordinator: Arc<TransactionCoordinator>,
    ) -> Self {
        Self {
            prefix,
            stack: stack.into(),
            coordinator,
        }
    }

    #[must_use]
    pub fn prefix(&self) -> &Namespace {
        &self.prefix
    }

    /// Name of the stack the prefix is bound to.
    #[must_use]
    pub fn stack(&self) -> &str {
        &self.stack
    }

    #[must_use]
    pub fn unit_name(&self) -> &str {
        self.coordinator.unit().name()
    }

    #[must_use]
    pub fn coordinator_name(&self) -> &str {
        self.coordinator.name()
    }

    #[must_use]
    pub fn entity_manager(&self) -> EntityManager {
        EntityManager::new(Arc::clone(&self.coordinator))
    }
}

/// Non-overlapping prefix bindings.
#[derive(Debug, Default)]
pub struct BindingTable {
    bindings: Vec<RepositoryBinding>,
}

impl BindingTable {
    /// # Errors
    ///
    /// Returns [`DuplicateBindingError`] when the prefix equals, contains, or
    /// lies within one already bound.
    pub fn bind(&mut self, binding: RepositoryBinding) -> Result<(), DuplicateBindingError> {
        if let Some(existing) = self
            .bindings
            .iter()
            .find(|existing| existing.prefix.overlaps(&binding.prefix))
        {
            tracing::error!(
                prefix = %binding.prefix,
                stack = %binding.stack,
                bound_to = %existing.stack,
                "repository prefix already bound"
            );
            return Err(DuplicateBindingError {
                kind: BindingKind::Namespace,
                name: binding.prefix.to_string(),
            });
        }
        self.bindings.push(binding);
        Ok(())
    }

    /// Binding registered for exactly `prefix`.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownBindingError`] when nothing is bound to `prefix`.
    pub fn get(&self, prefix: &str) -> Result<&RepositoryBinding, UnknownBindingError> {
        self.bindings
            .iter()
            .find(|binding| binding.prefix.as_str() == prefix)
            .ok_or_else(|| UnknownBindingError {
                kind: BindingKind::Namespace,
                name: prefix.to_string(),
            })
    }

    /// Binding whose prefix contains `namespace`.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownBindingError`] when no bound prefix contains it.
    pub fn route(&self, namespace: &str) -> Result<&RepositoryBinding, UnknownBindingError> {
        self.bindings
            .iter()
            .find(|binding| binding.prefix.contains(namespace))
            .ok_or_else(|| UnknownBindingError {
                kind: BindingKind::Namespace,
                name: namespace.to_string(),
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = &RepositoryBinding> {
        self.bindings.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
