//! Output and time limits for a single execution.

use std::time::Duration;

/// Per-stream capture cap used when none (or zero) is configured.
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 64 * 1024;

/// Exit code reported when the deadline fires.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Exit code reported when the process never ran or its status is unknown.
pub const FAILURE_EXIT_CODE: i32 = 1;

/// How long pipes may stay open once the process has exited or been killed.
///
/// A descendant can inherit stdout or stderr and outlive the process; past
/// this bound the group is killed, the drain abandoned and the partial
/// capture returned.
pub const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Limits applied to one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecLimits {
    /// Local deadline. `None` relies only on the caller's cancellation.
    pub timeout: Option<Duration>,

    /// Maximum bytes kept per stream. Zero means [`DEFAULT_MAX_OUTPUT_BYTES`].
    pub max_output_bytes: usize,
}

impl Default for ExecLimits {
    fn default() -> Self {
        Self {
            timeout: None,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }
}

impl ExecLimits {
    /// Cap with the default substituted for zero.
    pub fn output_cap(&self) -> usize {
        effective_cap(self.max_output_bytes)
    }
}

const fn effective_cap(max: usize) -> usize {
    if max == 0 {
        DEFAULT_MAX_OUTPUT_BYTES
    } else {
        max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_cap_defaults() {
        let limits = ExecLimits {
            max_output_bytes: 0,
            ..ExecLimits::default()
        };
        assert_eq!(limits.output_cap(), DEFAULT_MAX_OUTPUT_BYTES);

        let limits = ExecLimits {
            max_output_bytes: 512,
            ..ExecLimits::default()
        };
        assert_eq!(limits.output_cap(), 512);
    }

    #[test]
    fn test_no_timeout_by_default() {
        assert_eq!(ExecLimits::default().timeout, None);
    }
}
