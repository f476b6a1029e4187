//! # polystore-domain
//!
//! Pure domain model for the polystore multi-datasource demo.
//!
//! ## Responsibilities
//! - Foundational types: error taxonomy, hierarchical namespaces
//! - Describe **entities** to persistence units through static metadata
//! - Declare **repositories** by namespace so adapters can route them
//! - Define the sample entities: `Book` (library) and `User` (accounts)
//! - Provide the **entity catalog** persistence units discover from
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.

pub mod error;
pub mod namespace;

pub mod catalog;
pub mod entity;
pub mod repository;

pub mod accounts;
pub mod library;
