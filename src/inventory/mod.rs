//! Inventory entities and the repository that serves them.

mod repository;
mod types;

pub use repository::{Repository, RepositoryConfig};
pub use types::{Entity, Page, Product, Stock, Warehouse};
