//! SurrealDB-backed job storage.
//!
//! # Features
//!
//! - `memory` (default): in-memory storage for tests
//! - `surrealkv`: file-based persistence via SurrealKV
//! - `rocksdb`: file-based persistence via RocksDB

mod connection;
mod schema;
pub mod repositories;

pub use connection::{Database, DbConfig, DbError, connect};
pub use repositories::SurrealJobStore;
pub use schema::init_schema;

/// Connect and make sure the schema exists.
pub async fn init(config: &DbConfig) -> Result<Database, DbError> {
    let db = connect(config).await?;
    init_schema(&db).await?;
    Ok(db)
}
