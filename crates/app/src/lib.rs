//! # polystore-app
//!
//! Application layer: use-cases and **port definitions** (traits).
//!
//! ## Responsibilities
//! - Define the `Repository` port every stack's repositories implement
//! - Define use-cases over it:
//!   - `BookService`: add, list, get, remove books
//!   - `UserService`: register, list, get users
//! - Orchestrate domain objects without knowing which stack serves them
//!
//! ## Dependency rule
//! Depends on `polystore-domain` only.
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

pub mod ports;
pub mod services;
