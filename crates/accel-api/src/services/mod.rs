//! Request-side services.

pub mod admission;
pub mod reference;

pub use admission::{Admission, AdmissionController, CompletedJob, QueuedReason};
pub use reference::{render_reference, ReferenceResult};
