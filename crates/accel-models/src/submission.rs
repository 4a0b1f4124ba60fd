//! Submission validation.
//!
//! Everything here runs before a job exists: a failure is reported straight
//! back to the caller and nothing is written to the job store.

use crate::error::{ModelError, ModelResult};
use crate::job::{Category, Operation};
use crate::params::JobParams;

/// Payload size ceilings per category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmissionLimits {
    pub max_image_bytes: u64,
    pub max_video_bytes: u64,
}

impl Default for SubmissionLimits {
    fn default() -> Self {
        Self {
            max_image_bytes: 10 * 1024 * 1024,  // 10MB
            max_video_bytes: 50 * 1024 * 1024,  // 50MB
        }
    }
}

impl SubmissionLimits {
    pub fn max_bytes(&self, category: Category) -> u64 {
        match category {
            Category::Image => self.max_image_bytes,
            Category::Video => self.max_video_bytes,
        }
    }
}

/// A validated submission, ready to become a job.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub category: Category,
    pub operation: Operation,
    pub params: JobParams,
    /// Original file name of the payload, used for its extension
    pub file_name: Option<String>,
    pub payload: Vec<u8>,
}

impl Submission {
    /// Validate raw submission fields.
    pub fn from_form(
        category: Category,
        operation: Operation,
        filter: Option<&str>,
        factor: Option<&str>,
        file_name: Option<String>,
        payload: Vec<u8>,
        limits: &SubmissionLimits,
    ) -> ModelResult<Self> {
        if payload.is_empty() {
            return Err(ModelError::validation(format!("no {} uploaded", category)));
        }

        let max = limits.max_bytes(category);
        if payload.len() as u64 > max {
            return Err(ModelError::resource_limit(format!(
                "{} payload of {} bytes exceeds the {} byte limit",
                category,
                payload.len(),
                max
            )));
        }

        let params = JobParams::from_form(operation, filter, factor)?;

        Ok(Self {
            category,
            operation,
            params,
            file_name,
            payload,
        })
    }

    /// Input payload file name inside the job directory.
    pub fn input_file_name(&self) -> String {
        let default_ext = match self.category {
            Category::Image => "jpg",
            Category::Video => "mp4",
        };
        let ext = self
            .file_name
            .as_deref()
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .filter(|ext| !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
            .unwrap_or_else(|| default_ext.to_string());
        format!("in.{}", ext)
    }
}
