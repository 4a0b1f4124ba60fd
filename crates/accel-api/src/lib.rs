//! HTTP front end for the accelerator job queue.
//!
//! Accepts image and video submissions, runs the admission decision for
//! each one, and serves status polling, results and history. All state
//! lives in the job store shared with the worker.

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
