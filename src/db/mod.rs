//! Database module for Vigil.
//!
//! Provides SQLite storage with an embedded migration.

mod models;
mod store;

pub use models::*;
pub use store::*;
