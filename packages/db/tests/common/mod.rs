use relay_db::{DbConfig, DbError, SurrealJobStore};

/// Fresh in-memory database per test; no shared state between tests.
pub async fn setup_store() -> Result<SurrealJobStore, DbError> {
    let db = relay_db::init(&DbConfig::memory()).await?;
    Ok(SurrealJobStore::new(db))
}
