//! # polystore-adapter-storage-sqlx
//!
//! Multi-datasource persistence adapter using [sqlx](https://docs.rs/sqlx).
//!
//! ## Responsibilities
//! - Open one connection pool per configured datasource (`SQLite` or `MySQL`)
//! - Build a persistence unit per datasource from the entities discovered
//!   under its namespace, creating their tables as configured
//! - Demarcate transactions per unit through its coordinator
//! - Route repository declarations to the stack bound to their namespace
//! - Implement the `Repository` port defined in `polystore-app::ports`
//!
//! ## Dependency rule
//! Depends on `polystore-app` (for port traits) and `polystore-domain` (for domain types).
//! The `app` and `domain` crates must never reference this adapter.

pub mod binding;
pub mod config;
pub mod coordinator;
pub mod datasource;
mod dialect;
pub mod entity_manager;
pub mod error;
mod executor;
pub mod registry;
pub mod repository;
pub mod unit;

pub use binding::RepositoryBinding;
pub use config::{DatasourceConfig, Driver, PoolHints, SchemaAction, StackConfig};
pub use coordinator::{TransactionCoordinator, Tx};
pub use datasource::Datasource;
pub use entity_manager::EntityManager;
pub use registry::{Registry, RegistryBuilder, Stack, StackDefinition};
pub use repository::SqlxRepository;
pub use unit::PersistenceUnit;
