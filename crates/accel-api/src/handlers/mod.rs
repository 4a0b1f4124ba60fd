//! HTTP handlers.

pub mod health;
pub mod history;
pub mod jobs;
pub mod submit;

pub use health::{health, ready};
pub use history::{clear_history, list_history};
pub use jobs::{get_image_result, get_job_status, get_thumbnail, get_video_result};
pub use submit::{submit_image_filter, submit_image_grayscale, submit_video_filter, submit_video_grayscale};
