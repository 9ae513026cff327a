//! Error types for exec_gateway.
//!
//! This module defines three error categories:
//! - [`Violation`]: Pipeline rejections detected before anything is spawned
//! - [`ConfigError`]: The gateway cannot build a valid configuration snapshot
//! - [`ExecError`]: Runner failures, always folded into an `ExecOutcome`

use thiserror::Error;

/// Client-facing classification of a [`Violation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViolationKind {
    /// Payload shape or shell syntax is wrong.
    MalformedInput,
    /// Subcommand or namespace is blocked by policy.
    PolicyDenied,
    /// A target-scoped action is missing its required target.
    BadRequest,
}

impl std::fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViolationKind::MalformedInput => write!(f, "malformed input"),
            ViolationKind::PolicyDenied => write!(f, "policy denied"),
            ViolationKind::BadRequest => write!(f, "bad request"),
        }
    }
}

/// Request rejected by the argument and policy pipeline.
///
/// No process is ever spawned for a request that produced a `Violation`.
/// Messages are safe to return to clients (no credential material).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Violation {
    // Payload errors
    /// Body is not valid JSON of the expected shape
    #[error("invalid JSON body: {reason}")]
    InvalidJson { reason: String },

    /// Both `args` and `cmd` were supplied
    #[error("provide either args or cmd, not both")]
    ArgsAndCmd,

    /// Neither `args` nor `cmd` was supplied
    #[error("missing args or cmd in request body")]
    MissingArgsOrCmd,

    /// `cmd` could not be split into words
    #[error("invalid cmd: {reason}")]
    ShellSyntax { reason: String },

    /// Token list is empty after parsing
    #[error("no arguments provided")]
    NoArguments,

    // Policy errors
    /// Subcommand is not in the allow-list
    #[error("subcommand {subcommand:?} not allowed")]
    SubcommandNotAllowed { subcommand: String },

    /// Target namespace is not in the allow-list
    #[error("namespace {namespace:?} not allowed")]
    NamespaceNotAllowed { namespace: String },

    /// Target-scoped subcommand without a `namespace/action` token
    #[error("missing {subcommand} target (expected namespace/action argument)")]
    MissingTarget { subcommand: String },
}

impl Violation {
    /// Classify this violation for status mapping.
    pub fn kind(&self) -> ViolationKind {
        match self {
            Violation::InvalidJson { .. }
            | Violation::ArgsAndCmd
            | Violation::MissingArgsOrCmd
            | Violation::ShellSyntax { .. }
            | Violation::NoArguments => ViolationKind::MalformedInput,
            Violation::SubcommandNotAllowed { .. } | Violation::NamespaceNotAllowed { .. } => {
                ViolationKind::PolicyDenied
            }
            Violation::MissingTarget { .. } => ViolationKind::BadRequest,
        }
    }
}

/// Invalid gateway configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Value could not be parsed as an integer
    #[error("{key}: invalid integer {value:?}")]
    InvalidInteger { key: String, value: String },

    /// Value could not be parsed as a boolean
    #[error("{key}: invalid boolean {value:?}")]
    InvalidBool { key: String, value: String },

    /// Value is not one of the accepted names
    #[error("{key}: unsupported value {value:?}")]
    InvalidChoice { key: String, value: String },

    /// Value is present but must not be blank
    #[error("{key}: must not be empty")]
    Empty { key: String },
}

/// Failure inside the process runner.
///
/// These never escape `runner::run`; they are rendered into the
/// outcome's stderr with exit code 1.
#[derive(Debug, Error)]
pub enum ExecError {
    /// Working directory could not be created
    #[error("failed to prepare workdir {path}: {source}")]
    Workdir {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Process could not be started
    #[error("failed to start {bin}: {source}")]
    Spawn {
        bin: String,
        #[source]
        source: std::io::Error,
    },

    /// Exit status could not be collected
    #[error("failed to wait for process: {0}")]
    Wait(#[source] std::io::Error),

    /// Process was terminated by a signal
    #[error("process terminated by signal {0}")]
    Signaled(i32),

    /// Output pipes did not close after the process group was killed
    #[error("output drain abandoned after {0:?}")]
    DrainAbandoned(std::time::Duration),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_violation_kinds() {
        assert_eq!(Violation::ArgsAndCmd.kind(), ViolationKind::MalformedInput);
        assert_eq!(Violation::NoArguments.kind(), ViolationKind::MalformedInput);
        assert_eq!(
            Violation::SubcommandNotAllowed {
                subcommand: "build".into()
            }
            .kind(),
            ViolationKind::PolicyDenied
        );
        assert_eq!(
            Violation::MissingTarget {
                subcommand: "execute".into()
            }
            .kind(),
            ViolationKind::BadRequest
        );
    }

    #[test]
    fn test_messages_are_human_readable() {
        let v = Violation::SubcommandNotAllowed {
            subcommand: "build".into(),
        };
        assert_eq!(v.to_string(), "subcommand \"build\" not allowed");
    }
}
