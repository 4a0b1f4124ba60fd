//! Operation parameters.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{ModelError, ModelResult};
use crate::job::Operation;

/// Parameter key for the operation marker.
pub const PARAM_OPERATION: &str = "operation";
/// Parameter key for the divisor factor.
pub const PARAM_FACTOR: &str = "factor";
/// Parameter key for the 3x3 kernel (nine space-separated integers).
pub const PARAM_KERNEL: &str = "kernel";

/// A 3x3 integer convolution kernel in row-major order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct Kernel(pub [i32; 9]);

impl Kernel {
    pub const IDENTITY: Kernel = Kernel([0, 0, 0, 0, 1, 0, 0, 0, 0]);

    /// Parse nine whitespace-separated integers.
    pub fn parse(raw: &str) -> ModelResult<Self> {
        let values = raw
            .split_whitespace()
            .map(|v| {
                v.parse::<i32>().map_err(|_| {
                    ModelError::validation(format!("kernel coefficient '{}' is not an integer", v))
                })
            })
            .collect::<ModelResult<Vec<i32>>>()?;

        let coefficients: [i32; 9] = values.as_slice().try_into().map_err(|_| {
            ModelError::validation(format!(
                "kernel needs exactly 9 integers, got {}",
                values.len()
            ))
        })?;

        Ok(Self(coefficients))
    }

    /// Coefficient at `row`, `col` (both 0..3).
    pub fn at(&self, row: usize, col: usize) -> i32 {
        self.0[row * 3 + col]
    }

    /// Text form stored in the job record.
    pub fn to_param_string(&self) -> String {
        self.0
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_param_string())
    }
}

/// Operation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct JobParams {
    /// Divisor applied after convolution
    #[validate(range(min = 1, message = "factor must be a positive integer"))]
    pub factor: u32,
    /// 3x3 kernel, required iff the operation is a filter
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kernel: Option<Kernel>,
}

impl Default for JobParams {
    fn default() -> Self {
        Self {
            factor: 1,
            kernel: None,
        }
    }
}

impl JobParams {
    pub fn grayscale() -> Self {
        Self::default()
    }

    pub fn filter(kernel: Kernel, factor: u32) -> Self {
        Self {
            factor,
            kernel: Some(kernel),
        }
    }

    /// Build parameters from raw submission fields.
    ///
    /// Grayscale ignores both fields. Filter requires nine integer
    /// coefficients and a positive divisor (defaulting to 1 when omitted).
    pub fn from_form(operation: Operation, filter: Option<&str>, factor: Option<&str>) -> ModelResult<Self> {
        match operation {
            Operation::Grayscale => Ok(Self::grayscale()),
            Operation::Filter => {
                let raw = filter
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| ModelError::validation("filter requires 9 kernel coefficients"))?;
                let kernel = Kernel::parse(raw)?;

                let factor = match factor.map(str::trim).filter(|s| !s.is_empty()) {
                    Some(raw) => raw
                        .parse::<i64>()
                        .map_err(|_| ModelError::validation("factor must be an integer"))?,
                    None => 1,
                };
                if factor < 1 || factor > u32::MAX as i64 {
                    return Err(ModelError::validation("factor must be a positive integer"));
                }

                let params = Self::filter(kernel, factor as u32);
                params.validate_for(operation)?;
                Ok(params)
            }
        }
    }

    /// Check the parameters against the operation they will drive.
    pub fn validate_for(&self, operation: Operation) -> ModelResult<()> {
        self.validate()
            .map_err(|e| ModelError::validation(e.to_string()))?;

        match (operation, &self.kernel) {
            (Operation::Filter, None) => Err(ModelError::validation("filter requires a kernel")),
            (Operation::Grayscale, Some(_)) => {
                Err(ModelError::validation("grayscale does not take a kernel"))
            }
            _ => Ok(()),
        }
    }
}
