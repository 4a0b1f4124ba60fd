//! Filesystem job store.
//!
//! This crate provides:
//! - Job allocation with staged creation and atomic commit
//! - Input/output payload and parameter storage
//! - Atomic, fail-soft status records and terminal markers
//! - Lazy job listing and best-effort deletion

pub mod config;
pub mod error;
pub mod fs_utils;
pub mod layout;
pub mod status;
pub mod store;

pub use config::StoreConfig;
pub use error::{StorageError, StorageResult};
pub use status::StatusPublisher;
pub use store::{JobHandle, JobIter, JobStore};
