//! History entries for terminal jobs.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::job::{Category, JobId, Operation};
use crate::job_status::JobStage;
use crate::timing::Timing;

/// Read-only view of a terminal job, listed newest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct HistoryEntry {
    pub job_id: JobId,
    pub category: Category,
    /// Absent when the operation marker could not be read
    pub operation: Option<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kernel: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub factor: Option<u32>,
    pub stage: JobStage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timing: Option<Timing>,
    /// Resolved completion percentage
    pub progress_percent: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
}

impl HistoryEntry {
    /// Download path for a job's output.
    pub fn download_path(category: Category, job_id: &JobId) -> String {
        format!("/api/{}/result/{}", category.as_str(), job_id)
    }

    /// Thumbnail path for a job.
    pub fn thumbnail_path(job_id: &JobId) -> String {
        format!("/api/jobs/{}/thumbnail", job_id)
    }
}
