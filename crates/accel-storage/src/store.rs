//! Job store implementation.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncRead;
use tracing::{debug, info, warn};

use accel_models::{Category, JobId, JobMetadata, Timing};

use crate::config::StoreConfig;
use crate::error::{StorageError, StorageResult};
use crate::fs_utils::{atomic_write, atomic_write_from, move_file};
use crate::layout;

const WORK_PREFIX: &str = ".work.";

/// Reference to a job directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    id: JobId,
    dir: PathBuf,
}

impl JobHandle {
    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of a named artifact inside the job directory.
    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}

/// Contents of `job.json`.
#[derive(Debug, Serialize, Deserialize)]
struct JobRecord {
    id: JobId,
    category: Category,
    created_at: DateTime<Utc>,
}

/// Durable, unique-keyed store of job records and payloads.
///
/// Cheap to clone; every clone refers to the same root directory.
#[derive(Debug, Clone)]
pub struct JobStore {
    root: Arc<PathBuf>,
}

impl JobStore {
    /// Create a store rooted at the configured directory.
    pub fn new(config: StoreConfig) -> Self {
        Self {
            root: Arc::new(config.jobs_dir),
        }
    }

    /// Create from environment variables.
    pub fn from_env() -> Self {
        Self::new(StoreConfig::from_env())
    }

    /// Create the root and staging directories if missing.
    pub async fn init(&self) -> StorageResult<()> {
        fs::create_dir_all(self.staging_root()).await?;
        info!("Job store ready at {}", self.root.display());
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn staging_root(&self) -> PathBuf {
        self.root.join(layout::STAGING_DIR)
    }

    /// Handle for a committed job. Does not check that it exists.
    pub fn handle(&self, id: &JobId) -> JobHandle {
        JobHandle {
            id: id.clone(),
            dir: self.root.join(id.as_str()),
        }
    }

    /// Whether a committed job with this id exists.
    pub async fn exists(&self, id: &JobId) -> bool {
        fs::try_exists(self.root.join(id.as_str()).join(layout::JOB_RECORD))
            .await
            .unwrap_or(false)
    }

    /// Allocate a fresh job with a unique id.
    ///
    /// The job lives in the staging area until [`JobStore::commit`] makes it
    /// visible to listings.
    pub async fn create(&self, category: Category) -> StorageResult<JobHandle> {
        let id = JobId::new();
        let dir = self.staging_root().join(id.as_str());

        fs::create_dir_all(self.staging_root())
            .await
            .map_err(|e| StorageError::allocation_failed(e.to_string()))?;
        // create_dir (not create_dir_all) fails if the id is already taken
        fs::create_dir(&dir)
            .await
            .map_err(|e| StorageError::allocation_failed(format!("{}: {}", dir.display(), e)))?;

        let handle = JobHandle { id, dir };
        let record = JobRecord {
            id: handle.id.clone(),
            category,
            created_at: Utc::now(),
        };

        if let Err(e) = atomic_write(handle.path(layout::JOB_RECORD), serde_json::to_vec(&record)?).await {
            let _ = fs::remove_dir_all(&handle.dir).await;
            return Err(StorageError::allocation_failed(e.to_string()));
        }

        debug!(job_id = %handle.id, "Allocated {} job", category);
        Ok(handle)
    }

    /// Make a staged job visible to listings.
    pub async fn commit(&self, staged: JobHandle) -> StorageResult<JobHandle> {
        let committed = self.handle(&staged.id);
        fs::rename(&staged.dir, &committed.dir).await?;
        debug!(job_id = %committed.id, "Committed job");
        Ok(committed)
    }

    /// Drop a staged job that will never be committed.
    pub async fn discard(&self, staged: JobHandle) {
        if let Err(e) = fs::remove_dir_all(&staged.dir).await {
            warn!(job_id = %staged.id, "Failed to discard staged job: {}", e);
        }
    }

    /// Store the input payload.
    pub async fn store_input(&self, job: &JobHandle, file_name: &str, data: &[u8]) -> StorageResult<()> {
        let path = self.payload_path(job, layout::INPUT_PREFIX, file_name)?;
        atomic_write(path, data).await?;
        debug!(job_id = %job.id, "Stored {} input bytes", data.len());
        Ok(())
    }

    /// Stream the input payload from a reader.
    pub async fn store_input_stream<R>(&self, job: &JobHandle, file_name: &str, reader: &mut R) -> StorageResult<u64>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let path = self.payload_path(job, layout::INPUT_PREFIX, file_name)?;
        let written = atomic_write_from(path, reader).await?;
        debug!(job_id = %job.id, "Streamed {} input bytes", written);
        Ok(written)
    }

    /// Set a named text parameter.
    pub async fn set_parameter(&self, job: &JobHandle, key: &str, value: &str) -> StorageResult<()> {
        if !layout::is_valid_param_key(key) {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        atomic_write(job.path(&format!("{}{}", layout::PARAM_PREFIX, key)), value.trim()).await
    }

    /// Store the output payload.
    pub async fn store_output(&self, job: &JobHandle, file_name: &str, data: &[u8]) -> StorageResult<()> {
        let path = self.payload_path(job, layout::OUTPUT_PREFIX, file_name)?;
        atomic_write(path, data).await
    }

    /// Move a finished output file (e.g. an encoded video) into the job.
    pub async fn store_output_file(&self, job: &JobHandle, file_name: &str, src: &Path) -> StorageResult<()> {
        let path = self.payload_path(job, layout::OUTPUT_PREFIX, file_name)?;
        move_file(src, path).await
    }

    /// Scratch path inside the job directory, hidden from payload lookup.
    pub fn work_path(&self, job: &JobHandle, name: &str) -> PathBuf {
        job.path(&format!("{}{}", WORK_PREFIX, name))
    }

    /// Remove scratch files left by an interrupted or failed run.
    pub async fn clear_work(&self, job: &JobHandle) -> StorageResult<()> {
        let mut entries = fs::read_dir(&job.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_name().to_string_lossy().starts_with(WORK_PREFIX) {
                if let Err(e) = fs::remove_file(entry.path()).await {
                    warn!(job_id = %job.id, "Failed to remove scratch file: {}", e);
                }
            }
        }
        Ok(())
    }

    /// Store the thumbnail image.
    pub async fn store_thumbnail(&self, job: &JobHandle, data: &[u8]) -> StorageResult<()> {
        atomic_write(job.path(layout::THUMBNAIL), data).await
    }

    /// Store the timing record.
    pub async fn store_timing(&self, job: &JobHandle, timing: &Timing) -> StorageResult<()> {
        atomic_write(job.path(layout::TIMING_RECORD), serde_json::to_vec(timing)?).await
    }

    /// Read the timing record, if one was written and is readable.
    pub async fn read_timing(&self, job: &JobHandle) -> Option<Timing> {
        let bytes = fs::read(job.path(layout::TIMING_RECORD)).await.ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    /// Read the job record and its raw parameters.
    pub async fn read_metadata(&self, job: &JobHandle) -> StorageResult<JobMetadata> {
        let record_path = job.path(layout::JOB_RECORD);
        let bytes = match fs::read(&record_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::not_found(job.id.as_str()));
            }
            Err(e) => return Err(e.into()),
        };
        let record: JobRecord = serde_json::from_slice(&bytes)
            .map_err(|e| StorageError::corrupt(record_path.display().to_string(), e.to_string()))?;

        let mut params = BTreeMap::new();
        let mut input = None;
        let mut output = None;

        let mut entries = fs::read_dir(&job.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(key) = name.strip_prefix(layout::PARAM_PREFIX) {
                let value = fs::read_to_string(entry.path()).await?;
                params.insert(key.to_string(), value.trim().to_string());
            } else if name.starts_with(layout::INPUT_PREFIX) {
                input = Some(name);
            } else if name.starts_with(layout::OUTPUT_PREFIX) {
                output = Some(name);
            }
        }

        Ok(JobMetadata {
            id: record.id,
            category: record.category,
            created_at: record.created_at,
            input,
            output,
            params,
        })
    }

    /// Read the input payload.
    pub async fn read_input(&self, job: &JobHandle, file_name: &str) -> StorageResult<Vec<u8>> {
        Ok(fs::read(job.path(file_name)).await?)
    }

    /// Read the output payload, if present.
    pub async fn read_output(&self, job: &JobHandle) -> StorageResult<Option<(String, Vec<u8>)>> {
        let meta = self.read_metadata(job).await?;
        match meta.output {
            Some(name) => {
                let data = fs::read(job.path(&name)).await?;
                Ok(Some((name, data)))
            }
            None => Ok(None),
        }
    }

    /// Read the thumbnail, if present.
    pub async fn read_thumbnail(&self, job: &JobHandle) -> Option<Vec<u8>> {
        fs::read(job.path(layout::THUMBNAIL)).await.ok()
    }

    /// Whether a thumbnail exists.
    pub async fn has_thumbnail(&self, job: &JobHandle) -> bool {
        fs::try_exists(job.path(layout::THUMBNAIL)).await.unwrap_or(false)
    }

    /// Lazily list committed jobs in no particular order.
    pub async fn list_all(&self) -> StorageResult<JobIter> {
        let entries = match fs::read_dir(self.root.as_path()).await {
            Ok(entries) => Some(entries),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };
        Ok(JobIter {
            store: self.clone(),
            entries,
        })
    }

    /// Collect every committed job handle.
    pub async fn list_handles(&self) -> StorageResult<Vec<JobHandle>> {
        let mut iter = self.list_all().await?;
        let mut handles = Vec::new();
        while let Some(handle) = iter.next().await? {
            handles.push(handle);
        }
        Ok(handles)
    }

    /// Delete a job and everything it owns. Deleting a missing job succeeds.
    pub async fn delete(&self, job: &JobHandle) -> StorageResult<()> {
        match fs::remove_dir_all(&job.dir).await {
            Ok(()) => {
                debug!(job_id = %job.id, "Deleted job");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn payload_path(&self, job: &JobHandle, prefix: &str, file_name: &str) -> StorageResult<PathBuf> {
        if !file_name.starts_with(prefix) || !layout::is_valid_payload_name(file_name) {
            return Err(StorageError::InvalidKey(file_name.to_string()));
        }
        Ok(job.path(file_name))
    }
}

/// Lazy iterator over committed jobs.
pub struct JobIter {
    store: JobStore,
    entries: Option<fs::ReadDir>,
}

impl JobIter {
    /// Next committed job, skipping staging and anything that is not a job id.
    pub async fn next(&mut self) -> StorageResult<Option<JobHandle>> {
        let Some(entries) = self.entries.as_mut() else {
            return Ok(None);
        };

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if layout::is_hidden(name) {
                continue;
            }
            let Ok(id) = JobId::parse(name) else {
                continue;
            };
            if !entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
                continue;
            }
            return Ok(Some(self.store.handle(&id)));
        }
        Ok(None)
    }
}
