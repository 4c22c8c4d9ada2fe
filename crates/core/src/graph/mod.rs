//! The property-graph data model and repository contract (§3, §6).

pub mod models;
pub mod repository;
pub mod schema;

pub use repository::RepositoryError;
