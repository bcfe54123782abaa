//! Storage layer
//!
//! SQLite connection pooling and schema migrations for the shared
//! finance database. Plugins never touch this layer directly; they go
//! through the capability-scoped SDK in `taproot-plugins`.

pub mod database;
pub mod migrations;

pub use database::{Database, DatabaseConfig, default_database_path};
pub use migrations::{CURRENT_VERSION, MigrationStatus};
