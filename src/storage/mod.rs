//! Storage module: SQLite tables backing every pipeline stage.

pub mod database;
pub mod schema;

pub use database::{Database, TableCounts};
