//! File-based job store.

use std::io;
use std::path::{Path, PathBuf};

use futures_util::future::BoxFuture;
use relay_core::{Job, JobId, JobStore, StoreError, StoreErrorKind, StoreResult};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Job store keeping one JSON document per job in a directory.
///
/// Writes go to a temporary file that is renamed over the target, so a
/// crash never leaves a half-written job behind.
pub struct FileJobStore {
    /// Base directory for job files.
    base_dir: PathBuf,
}

impl FileJobStore {
    /// Create a store rooted at `base_dir`. Call [`init`](Self::init) before use.
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    /// Ensure the base directory exists.
    pub async fn init(&self) -> StoreResult<()> {
        fs::create_dir_all(&self.base_dir).await.map_err(io_error)?;
        Ok(())
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn path_for(&self, id: &JobId) -> PathBuf {
        self.base_dir.join(format!("{}.json", file_stem(id)))
    }

    async fn write(&self, job: &Job) -> StoreResult<()> {
        let path = self.path_for(&job.id);
        let json = serde_json::to_vec_pretty(job)
            .map_err(|e| StoreError::rejected(format!("cannot encode job {}: {}", job.id, e)))?;

        // Write to temp file first, then rename for atomicity
        let temp_path = path.with_extension("json.tmp");
        let mut file = fs::File::create(&temp_path).await.map_err(io_error)?;
        file.write_all(&json).await.map_err(io_error)?;
        file.sync_all().await.map_err(io_error)?;
        fs::rename(&temp_path, &path).await.map_err(io_error)?;

        tracing::debug!("Saved job {} to {:?}", job.id, path);
        Ok(())
    }

    async fn read(&self, path: &Path) -> StoreResult<Option<Job>> {
        let bytes = match fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(e)),
        };
        let job = serde_json::from_slice(&bytes)
            .map_err(|e| StoreError::corrupt(format!("{}: {}", path.display(), e)))?;
        Ok(Some(job))
    }
}

impl JobStore for FileJobStore {
    fn insert(&self, job: Job) -> BoxFuture<'_, StoreResult<()>> {
        Box::pin(async move {
            if fs::try_exists(self.path_for(&job.id))
                .await
                .map_err(io_error)?
            {
                return Err(StoreError::rejected(format!("job {} already exists", job.id)));
            }
            self.write(&job).await
        })
    }

    fn get(&self, id: &JobId) -> BoxFuture<'_, StoreResult<Option<Job>>> {
        let path = self.path_for(id);
        Box::pin(async move { self.read(&path).await })
    }

    fn update(&self, job: Job) -> BoxFuture<'_, StoreResult<()>> {
        Box::pin(async move { self.write(&job).await })
    }

    fn delete(&self, id: &JobId) -> BoxFuture<'_, StoreResult<()>> {
        let path = self.path_for(id);
        Box::pin(async move {
            match fs::remove_file(&path).await {
                Ok(()) => {
                    tracing::debug!("Deleted job file {:?}", path);
                    Ok(())
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(io_error(e)),
            }
        })
    }

    fn load_queue(&self, queue: &str) -> BoxFuture<'_, StoreResult<Vec<Job>>> {
        let queue = queue.to_string();
        Box::pin(async move {
            let mut jobs = Vec::new();
            let mut entries = match fs::read_dir(&self.base_dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(jobs),
                Err(e) => return Err(io_error(e)),
            };

            while let Some(entry) = entries.next_entry().await.map_err(io_error)? {
                let path = entry.path();
                if path.extension().is_none_or(|e| e != "json") {
                    continue;
                }
                match self.read(&path).await {
                    Ok(Some(job)) if job.queue == queue && job.state.is_pending() => {
                        jobs.push(job)
                    }
                    Ok(_) => {}
                    Err(e) if e.kind == StoreErrorKind::Corrupt => {
                        tracing::warn!("Skipping unreadable job file: {}", e);
                    }
                    Err(e) => return Err(e),
                }
            }

            jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
            Ok(jobs)
        })
    }
}

/// Map a job id onto a portable file name.
///
/// Named jobs may contain path separators, so everything outside
/// `[A-Za-z0-9-]` is hex-escaped with a leading underscore.
fn file_stem(id: &JobId) -> String {
    let mut stem = String::with_capacity(id.as_str().len());
    for byte in id.as_str().bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            stem.push(byte as char);
        } else {
            stem.push_str(&format!("_{:02x}", byte));
        }
    }
    stem
}

fn io_error(e: io::Error) -> StoreError {
    let kind = match e.kind() {
        io::ErrorKind::PermissionDenied => StoreErrorKind::AccessDenied,
        _ => StoreErrorKind::Unavailable,
    };
    StoreError::new(kind, e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::{JobProperties, JobState};

    #[test]
    fn file_stems_escape_separators() {
        assert_eq!(file_stem(&JobId::from("abc-1")), "abc-1");
        assert_eq!(file_stem(&JobId::from("a/b_c")), "a_2fb_5fc");
    }

    #[tokio::test]
    async fn jobs_survive_a_new_store_instance() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileJobStore::new(dir.path());
        store.init().await.unwrap();

        let mut props = JobProperties::new();
        props.insert("path".into(), "/content/a".into());
        let job = Job::new(JobId::named("import/a"), "import/file", "main", props);
        store.insert(job.clone()).await.unwrap();

        let reopened = FileJobStore::new(dir.path());
        assert_eq!(reopened.get(&job.id).await.unwrap(), Some(job.clone()));
        assert_eq!(reopened.load_queue("main").await.unwrap(), vec![job.clone()]);

        let err = reopened.insert(job.clone()).await.unwrap_err();
        assert_eq!(err.kind, StoreErrorKind::Rejected);

        reopened.delete(&job.id).await.unwrap();
        reopened.delete(&job.id).await.unwrap();
        assert_eq!(reopened.get(&job.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn corrupt_files_are_reported_and_skipped_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileJobStore::new(dir.path());
        store.init().await.unwrap();

        let mut finished = Job::new(JobId::from("done"), "t", "main", JobProperties::new());
        finished.transition(JobState::Stopped);
        store.insert(finished).await.unwrap();
        std::fs::write(dir.path().join("broken.json"), b"{not json").unwrap();

        assert!(store.load_queue("main").await.unwrap().is_empty());
        let err = store.get(&JobId::from("broken")).await.unwrap_err();
        assert_eq!(err.kind, StoreErrorKind::Corrupt);
    }
}
