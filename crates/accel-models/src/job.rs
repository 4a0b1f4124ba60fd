//! Job definitions.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ModelError, ModelResult};
use crate::params::{JobParams, Kernel, PARAM_FACTOR, PARAM_KERNEL, PARAM_OPERATION};

/// Prefix shared by every job id.
pub const JOB_ID_PREFIX: &str = "job_";

/// Unique identifier for a job.
///
/// Ids double as directory names in the job store, so parsing only accepts
/// the exact shape produced by [`JobId::new`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(format!("{}{}", JOB_ID_PREFIX, Uuid::new_v4().simple()))
    }

    /// Parse an id received from outside the process.
    pub fn parse(s: &str) -> ModelResult<Self> {
        let hex = s
            .strip_prefix(JOB_ID_PREFIX)
            .ok_or_else(|| ModelError::InvalidJobId(s.to_string()))?;

        if hex.len() != 32 || !hex.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()) {
            return Err(ModelError::InvalidJobId(s.to_string()));
        }

        Ok(Self(s.to_string()))
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Payload category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Image,
    Video,
}

impl Category {
    pub const ALL: [Category; 2] = [Category::Image, Category::Video];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Image => "image",
            Category::Video => "video",
        }
    }

    /// File name of the output payload inside a job directory.
    pub fn output_file_name(&self) -> &'static str {
        match self {
            Category::Image => "out.jpg",
            Category::Video => "out.mp4",
        }
    }

    /// Content type served for the output payload.
    pub fn output_content_type(&self) -> &'static str {
        match self {
            Category::Image => "image/jpeg",
            Category::Video => "video/mp4",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "image" => Ok(Category::Image),
            "video" => Ok(Category::Video),
            other => Err(ModelError::UnknownCategory(other.to_string())),
        }
    }
}

/// Accelerated operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Grayscale,
    Filter,
}

impl Operation {
    pub const ALL: [Operation; 2] = [Operation::Grayscale, Operation::Filter];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Grayscale => "grayscale",
            Operation::Filter => "filter",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "grayscale" => Ok(Operation::Grayscale),
            "filter" => Ok(Operation::Filter),
            other => Err(ModelError::UnknownOperation(other.to_string())),
        }
    }
}

/// Untyped view of a job record as persisted by the job store.
///
/// Parameters stay as raw text until [`Job::from_metadata`] interprets them,
/// so a record written by an older or foreign producer can still be listed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JobMetadata {
    pub id: JobId,
    pub category: Category,
    pub created_at: DateTime<Utc>,
    /// Input payload file name, relative to the job directory
    #[serde(default)]
    pub input: Option<String>,
    /// Output payload file name, present once written
    #[serde(default)]
    pub output: Option<String>,
    /// Raw parameters keyed by name
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl JobMetadata {
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }
}

/// A fully typed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    pub id: JobId,
    pub category: Category,
    pub operation: Operation,
    pub params: JobParams,
    /// Input payload file name
    pub input: String,
    /// Output payload file name (absent until finished)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Job {
    /// Interpret a raw record.
    ///
    /// Fails when the operation marker is missing or unknown, when a
    /// parameter is malformed, or when the input payload was never stored.
    pub fn from_metadata(meta: &JobMetadata) -> ModelResult<Self> {
        let operation: Operation = meta
            .param(PARAM_OPERATION)
            .ok_or_else(|| ModelError::invalid_parameter(PARAM_OPERATION, "missing operation marker"))?
            .parse()?;

        let factor = match meta.param(PARAM_FACTOR) {
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .map_err(|e| ModelError::invalid_parameter(PARAM_FACTOR, e.to_string()))?,
            None => 1,
        };

        let kernel = meta.param(PARAM_KERNEL).map(Kernel::parse).transpose()?;

        let params = JobParams { factor, kernel };
        params.validate_for(operation)?;

        let input = meta
            .input
            .clone()
            .ok_or_else(|| ModelError::invalid_parameter("input", "input payload missing"))?;

        Ok(Self {
            id: meta.id.clone(),
            category: meta.category,
            operation,
            params,
            input,
            output: meta.output.clone(),
            created_at: meta.created_at,
        })
    }
}
