//! On-disk layout of a job directory.
//!
//! ```text
//! <jobs_dir>/
//!   .staging/<job_id>/      jobs under construction, invisible to listing
//!   <job_id>/
//!     job.json              id, category, creation time
//!     param.<key>           operation marker and parameters, plain text
//!     status.json           status record, replaced atomically
//!     in.<ext>              input payload
//!     out.<ext>             output payload
//!     thumb.jpg             thumbnail
//!     timing.json           accelerator timing
//!     done                  terminal marker (finished)
//!     error                 terminal marker (error), holds the message
//! ```

pub const STAGING_DIR: &str = ".staging";
pub const JOB_RECORD: &str = "job.json";
pub const PARAM_PREFIX: &str = "param.";
pub const STATUS_RECORD: &str = "status.json";
pub const INPUT_PREFIX: &str = "in.";
pub const OUTPUT_PREFIX: &str = "out.";
pub const THUMBNAIL: &str = "thumb.jpg";
pub const TIMING_RECORD: &str = "timing.json";
pub const DONE_MARKER: &str = "done";
pub const ERROR_MARKER: &str = "error";

/// Whether a directory entry name is internal (staging area, temp files).
pub fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

/// Whether a parameter key can safely become part of a file name.
pub fn is_valid_param_key(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= 64
        && key
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
}

/// Whether a payload file name stays inside the job directory.
pub fn is_valid_payload_name(name: &str) -> bool {
    !name.is_empty()
        && !is_hidden(name)
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'_' || b == b'-')
}
