//! Repository declarations: which entity a repository serves, and where it lives.

use crate::entity::{Entity, EntityMeta};

/// Static description of a repository declaration.
#[derive(Debug, PartialEq, Eq)]
pub struct RepositoryMeta {
    pub name: &'static str,
    /// Namespace the repository is declared under; selects its binding.
    pub namespace: &'static str,
    pub entity: &'static EntityMeta,
}

/// Marker type declaring a repository for one entity type.
///
/// Adapters turn a declaration into a concrete repository by routing its
/// namespace to the persistence unit bound for it.
pub trait RepositoryDeclaration: Send + Sync + 'static {
    type Entity: Entity;

    fn meta() -> &'static RepositoryMeta;
}

/// Declare a repository marker type for an entity under a namespace.
#[macro_export]
macro_rules! declare_repository {
    ($(#[doc = $doc:expr])* $name:ident, $entity:ty, $namespace:literal) => {
        $(#[doc = $doc])*
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $name;

        impl $crate::repository::RepositoryDeclaration for $name {
            type Entity = $entity;

            fn meta() -> &'static $crate::repository::RepositoryMeta {
                static META: ::std::sync::OnceLock<$crate::repository::RepositoryMeta> =
                    ::std::sync::OnceLock::new();
                META.get_or_init(|| $crate::repository::RepositoryMeta {
                    name: stringify!($name),
                    namespace: $namespace,
                    entity: <$entity as $crate::entity::Entity>::meta(),
                })
            }
        }
    };
}
