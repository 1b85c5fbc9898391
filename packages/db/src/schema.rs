//! Database schema definitions using SurrealQL.

use crate::{Database, DbError};

/// Create the job table and its indexes. Safe to run on every start.
pub async fn init_schema(db: &Database) -> Result<(), DbError> {
    tracing::info!("Initializing database schema...");
    db.query(JOB_SCHEMA).await?.check()?;
    tracing::info!("Database schema initialized");
    Ok(())
}

/// Job table schema.
///
/// The job itself is kept as an opaque object; only the fields the store
/// filters and sorts on are lifted to the top level.
const JOB_SCHEMA: &str = r#"
DEFINE TABLE IF NOT EXISTS job SCHEMALESS;

DEFINE FIELD IF NOT EXISTS job_id ON job TYPE string;
DEFINE FIELD IF NOT EXISTS queue ON job TYPE string;
DEFINE FIELD IF NOT EXISTS pending ON job TYPE bool;
DEFINE FIELD IF NOT EXISTS created_ms ON job TYPE int;
DEFINE FIELD IF NOT EXISTS properties ON job TYPE string;
DEFINE FIELD IF NOT EXISTS job ON job FLEXIBLE TYPE object;

-- Recovery scan: pending jobs of one queue, oldest first
DEFINE INDEX IF NOT EXISTS job_queue_pending ON job FIELDS queue, pending, created_ms;
"#;
