//! Client-side data access for the inventory service: cached CRUD
//! repositories and export job orchestration.

pub mod activity;
pub mod api;
pub mod cache;
pub mod config;
pub mod export;
pub mod inventory;

#[cfg(test)]
pub(crate) mod testing;
