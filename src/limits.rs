//! Fixed capacity ceilings.
//!
//! Every buffer the trusted side touches is bounded by one of these. The
//! compiled constants are hard ceilings; a [`Limits`] value loaded from
//! policy may lower them but never raise them.

use serde::{Deserialize, Serialize};

/// Maximum number of voter records held for one invocation.
pub const MAX_VOTERS: usize = 1000;

/// Maximum accepted input buffer length in bytes (64 KiB).
pub const MAX_INPUT_LEN: usize = 64 * 1024;

/// Maximum output buffer capacity the serializer will use (64 KiB).
pub const MAX_OUTPUT_LEN: usize = 64 * 1024;

/// Destination capacity for a voter id, terminator included (63 usable bytes).
pub const ID_CAPACITY: usize = 64;

/// Destination capacity for a choice, terminator included (7 usable bytes).
pub const CHOICE_CAPACITY: usize = 8;

/// Effective limits for one trusted-app instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub max_voters: usize,
    pub max_input_len: usize,
    pub max_output_len: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_voters: MAX_VOTERS,
            max_input_len: MAX_INPUT_LEN,
            max_output_len: MAX_OUTPUT_LEN,
        }
    }
}

impl Limits {
    /// Checks that every limit is non-zero and within its compiled ceiling.
    pub fn validate(&self) -> Result<(), String> {
        let checks = [
            ("max_voters", self.max_voters, MAX_VOTERS),
            ("max_input_len", self.max_input_len, MAX_INPUT_LEN),
            ("max_output_len", self.max_output_len, MAX_OUTPUT_LEN),
        ];
        for (name, value, ceiling) in checks {
            if value == 0 {
                return Err(format!("{name} must be non-zero"));
            }
            if value > ceiling {
                return Err(format!("{name} {value} exceeds ceiling {ceiling}"));
            }
        }
        Ok(())
    }
}
