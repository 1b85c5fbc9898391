//! Job store on top of SurrealDB.

use futures_util::future::BoxFuture;
use relay_core::{Job, JobId, JobStore, StoreError, StoreErrorKind, StoreResult};
use serde::{Deserialize, Serialize};

use crate::Database;

const TABLE: &str = "job";

/// Stored row. The record id is the job id, so the row carries no `id`
/// field of its own; the job is nested to keep its `id` out of the way.
///
/// SurrealDB objects come back with their keys sorted, so the properties
/// travel as a JSON string to keep their insertion order.
#[derive(Debug, Serialize, Deserialize)]
struct JobRecord {
    job_id: String,
    queue: String,
    pending: bool,
    created_ms: i64,
    properties: String,
    job: Job,
}

impl JobRecord {
    fn from_job(mut job: Job) -> StoreResult<Self> {
        let properties = serde_json::to_string(&std::mem::take(&mut job.properties))
            .map_err(|e| StoreError::new(StoreErrorKind::Rejected, e.to_string()))?;
        Ok(Self {
            job_id: job.id.as_str().to_string(),
            queue: job.queue.clone(),
            pending: job.state.is_pending(),
            created_ms: job.created_at.timestamp_millis(),
            properties,
            job,
        })
    }

    fn into_job(self) -> StoreResult<Job> {
        let mut job = self.job;
        job.properties = serde_json::from_str(&self.properties).map_err(|e| {
            StoreError::new(
                StoreErrorKind::Corrupt,
                format!("properties of job '{}': {}", self.job_id, e),
            )
        })?;
        Ok(job)
    }
}

/// [`JobStore`] persisting jobs in a SurrealDB `job` table.
#[derive(Clone)]
pub struct SurrealJobStore {
    db: Database,
}

impl SurrealJobStore {
    /// Wrap a connection. The schema must already exist (see [`crate::init`]).
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Number of stored jobs, pending or not.
    pub async fn count(&self) -> StoreResult<usize> {
        #[derive(Deserialize)]
        struct Count {
            count: usize,
        }

        let mut response = self
            .db
            .query("SELECT count() AS count FROM job GROUP ALL")
            .await
            .map_err(store_error)?;
        let counts: Vec<Count> = response.take(0).map_err(store_error)?;
        Ok(counts.first().map(|c| c.count).unwrap_or(0))
    }
}

impl JobStore for SurrealJobStore {
    fn insert(&self, job: Job) -> BoxFuture<'_, StoreResult<()>> {
        Box::pin(async move {
            let key = job.id.as_str().to_string();
            let _: Option<JobRecord> = self
                .db
                .create((TABLE, key))
                .content(JobRecord::from_job(job)?)
                .await
                .map_err(store_error)?;
            Ok(())
        })
    }

    fn get(&self, id: &JobId) -> BoxFuture<'_, StoreResult<Option<Job>>> {
        let key = id.as_str().to_string();
        Box::pin(async move {
            let record: Option<JobRecord> =
                self.db.select((TABLE, key)).await.map_err(store_error)?;
            record.map(JobRecord::into_job).transpose()
        })
    }

    fn update(&self, job: Job) -> BoxFuture<'_, StoreResult<()>> {
        Box::pin(async move {
            let key = job.id.as_str().to_string();
            let _: Option<JobRecord> = self
                .db
                .upsert((TABLE, key))
                .content(JobRecord::from_job(job)?)
                .await
                .map_err(store_error)?;
            Ok(())
        })
    }

    fn delete(&self, id: &JobId) -> BoxFuture<'_, StoreResult<()>> {
        let key = id.as_str().to_string();
        Box::pin(async move {
            let _: Option<JobRecord> = self.db.delete((TABLE, key)).await.map_err(store_error)?;
            Ok(())
        })
    }

    fn load_queue(&self, queue: &str) -> BoxFuture<'_, StoreResult<Vec<Job>>> {
        let queue = queue.to_string();
        Box::pin(async move {
            let mut response = self
                .db
                .query(
                    r#"
                    SELECT * FROM job
                    WHERE queue = $queue AND pending = true
                    ORDER BY created_ms ASC, job_id ASC
                    "#,
                )
                .bind(("queue", queue))
                .await
                .map_err(store_error)?;

            let records: Vec<JobRecord> = response.take(0).map_err(store_error)?;
            records.into_iter().map(JobRecord::into_job).collect()
        })
    }
}

/// Rows that do not decode are corrupt; other client-side failures mean the
/// backend is unreachable, server-side ones mean it refused the statement.
fn store_error(e: surrealdb::Error) -> StoreError {
    let kind = match &e {
        surrealdb::Error::Api(surrealdb::error::Api::FromValue { .. }) => StoreErrorKind::Corrupt,
        surrealdb::Error::Api(_) => StoreErrorKind::Unavailable,
        surrealdb::Error::Db(surrealdb::error::Db::InvalidAuth)
        | surrealdb::Error::Db(surrealdb::error::Db::IamError(_)) => StoreErrorKind::AccessDenied,
        _ => StoreErrorKind::Rejected,
    };
    StoreError::new(kind, e.to_string())
}
