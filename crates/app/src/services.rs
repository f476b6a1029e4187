//! Application services: use-case implementations.
//!
//! Each service struct accepts a repository port implementation via a generic
//! parameter (constructor injection), keeping this layer decoupled from the
//! stack the repository is bound to.

pub mod book_service;
pub mod user_service;
