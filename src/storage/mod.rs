//! SQLite storage: connection pool, migrations and the collaborator implementation

pub mod db;
pub mod migrations;
pub mod store;

// Re-exports for convenience
pub use db::{create_pool, get_connection, DbConnection, DbPool};
pub use store::SqliteStore;
