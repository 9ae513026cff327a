//! # exec_gateway
//!
//! Policy-governed network gateway for a single command-line executable.
//!
//! A request names arguments for the wrapped executable, either as an explicit
//! `args` array or as one shell-syntax `cmd` string. The pipeline splits,
//! classifies and vets them against an allow-list policy, injects configured
//! flags, and hands the result to a runner that executes it in its own process
//! group under a deadline with bounded, tail-preserving output capture.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use exec_gateway::{GatewayPolicy, InjectedFlag, ExecRequest, runner};
//! use tokio_util::sync::CancellationToken;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let policy = GatewayPolicy::builder()
//!     .allow_subcommands(["execute"])
//!     .allow_namespaces(["token.aleo"])
//!     .target_scoped(["execute"])
//!     .endpoint(InjectedFlag::new("--endpoint", "https://rpc.example"))
//!     .build();
//!
//! let vetted = policy.prepare(vec![
//!     "execute".to_string(),
//!     "token.aleo/transfer".to_string(),
//! ])?;
//!
//! let request = ExecRequest::new("leo", vetted.argv)
//!     .with_cwd("/tmp/exec-gateway")
//!     .with_timeout(Duration::from_secs(30));
//! let outcome = runner::run(&request, &CancellationToken::new()).await;
//!
//! println!("exit {}: {}", outcome.exit_code, outcome.stdout);
//! # Ok(())
//! # }
//! ```
//!
//! ## Design Principles
//!
//! - **No shell**: `cmd` is split with shell word rules, never run by a shell
//! - **Check before inject**: the policy sees only what the caller sent
//! - **Outcomes, not errors**: once spawning is attempted, every failure is an `ExecOutcome`
//! - **No orphans**: a deadline kills the whole process group
//!
//! ## Platform Support
//!
//! Unix only (Linux, macOS). Process-group control relies on `setpgid` and
//! `killpg`.

#[cfg(windows)]
compile_error!(
    "exec_gateway does not support Windows. \
     Deadline enforcement relies on Unix process groups."
);

pub mod api;
mod arg_parser;
pub mod client;
pub mod config;
mod env_policy;
mod error;
mod inject;
mod limits;
mod output;
mod payload;
mod policy;
mod request;
pub mod runner;

// Public API
pub use arg_parser::{
    classify_subcommand, extract_target, flag_value, has_any_flag, has_flag, TargetRef,
};
pub use client::{Client, ClientError, InvokeError};
pub use config::{ConfigSource, ConfigStore, GatewayConfig, ProcessEnv};
pub use env_policy::{EnvPolicy, FilteredEnv, ALWAYS_STRIP};
pub use error::{ConfigError, ExecError, Violation, ViolationKind};
pub use inject::inject_flag;
pub use limits::{ExecLimits, DEFAULT_MAX_OUTPUT_BYTES, TIMEOUT_EXIT_CODE};
pub use output::{ExecOutcome, TailBuffer};
pub use payload::{InvokeRequest, InvokeResponse};
pub use policy::{GatewayPolicy, GatewayPolicyBuilder, InjectedFlag, VettedArgs};
pub use request::ExecRequest;
