//! Accelerator timing record.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Elapsed accelerator time persisted when a job finishes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Timing {
    /// Sum of accelerator time over all frames, in milliseconds
    pub total_ms: f64,
    /// Number of frames accelerated
    pub frames: u64,
}

impl Timing {
    pub fn single(elapsed_ms: f64) -> Self {
        Self {
            total_ms: elapsed_ms,
            frames: 1,
        }
    }

    /// Average time per frame, if any frame was processed.
    pub fn average_ms(&self) -> Option<f64> {
        (self.frames > 0).then(|| self.total_ms / self.frames as f64)
    }

    /// Human readable form, e.g. `"12.34 ms"` or `"812.50 ms (8.12 ms/frame)"`.
    pub fn display(&self) -> String {
        match (self.frames, self.average_ms()) {
            (n, Some(avg)) if n > 1 => format!("{:.2} ms ({:.2} ms/frame)", self.total_ms, avg),
            _ => format!("{:.2} ms", self.total_ms),
        }
    }
}
