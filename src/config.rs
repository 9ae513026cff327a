//! Gateway configuration.
//!
//! [`GatewayConfig::from_map`] is a pure parse of a key-value mapping
//! (normally the process environment). [`ConfigStore`] keeps the current
//! snapshot behind an `Arc` and swaps it whole on reload.

use crate::env_policy::EnvPolicy;
use crate::error::ConfigError;
use crate::policy::{GatewayPolicy, InjectedFlag};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::{error, info};

/// Default per-stream cap from configuration; keeps responses under 6 MB.
pub const DEFAULT_CONFIGURED_OUTPUT_BYTES: usize = 5_500_000;

/// Listen address when `LISTEN_ADDR` is unset.
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";

/// Credential material. Never shown by `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    /// The secret value.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

/// One complete, immutable configuration snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Allowed subcommands; empty means unrestricted.
    pub allowed_commands: Vec<String>,
    /// Allowed target namespaces; empty means unrestricted.
    pub allowed_namespaces: Vec<String>,
    /// Subcommands that get target enforcement and flag injection.
    pub target_scoped: Vec<String>,
    /// Credential injected for target-scoped subcommands.
    pub credential: Option<Secret>,
    pub credential_flag: String,
    pub credential_aliases: Vec<String>,
    /// Default endpoint injected for target-scoped subcommands.
    pub endpoint: Option<String>,
    pub endpoint_flag: String,
    /// Wrapped executable.
    pub bin: PathBuf,
    /// Default working directory.
    pub workdir: PathBuf,
    /// Per-stream capture cap; zero means the runner default.
    pub max_output_bytes: usize,
    /// Local deadline per execution.
    pub timeout: Option<Duration>,
    /// Run `echo` instead of `bin`.
    pub dry_run: bool,
    /// Expand `$VAR` in `cmd` payloads.
    pub expand_env: bool,
    /// Treatment of request environment overrides.
    pub env_policy: EnvPolicy,
    pub stdout_exclude: Vec<String>,
    pub stderr_exclude: Vec<String>,
    /// Bind address of the HTTP entrypoint.
    pub listen_addr: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            allowed_commands: vec!["execute".to_string()],
            allowed_namespaces: Vec::new(),
            target_scoped: vec!["execute".to_string()],
            credential: None,
            credential_flag: "--private-key".to_string(),
            credential_aliases: vec!["-k".to_string()],
            endpoint: None,
            endpoint_flag: "--endpoint".to_string(),
            bin: PathBuf::from("leo"),
            workdir: PathBuf::from("/tmp/exec-gateway"),
            max_output_bytes: DEFAULT_CONFIGURED_OUTPUT_BYTES,
            timeout: None,
            dry_run: false,
            expand_env: false,
            env_policy: EnvPolicy::default(),
            stdout_exclude: Vec::new(),
            stderr_exclude: Vec::new(),
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
        }
    }
}

impl GatewayConfig {
    /// Parse a configuration from key-value pairs.
    ///
    /// Unknown keys are ignored; absent keys take their defaults.
    pub fn from_map(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let get = |key: &str| vars.get(key).map(String::as_str);
        let first = |keys: &[&str]| keys.iter().find_map(|&k| get(k));
        let mut config = Self::default();

        if let Some(raw) = get("ALLOWED_COMMANDS") {
            config.allowed_commands = if raw.trim() == "*" {
                Vec::new()
            } else {
                let list = split_list(raw, true);
                if list.is_empty() {
                    vec!["execute".to_string()]
                } else {
                    list
                }
            };
        }
        if let Some(raw) = first(&["ALLOWED_NAMESPACES", "ALLOWED_CONTRACTS"]) {
            config.allowed_namespaces = split_list(raw, true);
        }
        if let Some(raw) = get("TARGET_SCOPED_COMMANDS") {
            config.target_scoped = split_list(raw, true);
        }

        config.credential = ["PRIVATE_KEY", "WALLET_PRIVATE_KEY"]
            .iter()
            .filter_map(|&k| get(k))
            .find(|v| !v.trim().is_empty())
            .map(|v| Secret(v.to_string()));
        if let Some(raw) = get("CREDENTIAL_FLAG") {
            config.credential_flag = non_empty("CREDENTIAL_FLAG", raw)?;
        }
        if let Some(raw) = get("CREDENTIAL_FLAG_ALIASES") {
            config.credential_aliases = split_list(raw, false);
        }

        config.endpoint = first(&["ENDPOINT", "RPC_URL"])
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);
        if let Some(raw) = get("ENDPOINT_FLAG") {
            config.endpoint_flag = non_empty("ENDPOINT_FLAG", raw)?;
        }

        if let Some(raw) = get("EXEC_BIN") {
            config.bin = PathBuf::from(non_empty("EXEC_BIN", raw)?);
        }
        if let Some(raw) = get("WORKDIR").filter(|v| !v.trim().is_empty()) {
            config.workdir = PathBuf::from(raw.trim());
        }
        if let Some(raw) = get("MAX_OUTPUT_BYTES").filter(|v| !v.trim().is_empty()) {
            let value = parse_int("MAX_OUTPUT_BYTES", raw)?;
            config.max_output_bytes = usize::try_from(value).unwrap_or(0);
        }
        if let Some(raw) = get("EXEC_TIMEOUT_MS").filter(|v| !v.trim().is_empty()) {
            let value = parse_int("EXEC_TIMEOUT_MS", raw)?;
            config.timeout = u64::try_from(value)
                .ok()
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis);
        }
        if let Some(raw) = get("DRY_RUN") {
            config.dry_run = parse_bool("DRY_RUN", raw)?;
        }
        if let Some(raw) = get("CMD_EXPAND_ENV") {
            config.expand_env = parse_bool("CMD_EXPAND_ENV", raw)?;
        }
        if let Some(raw) = get("ENV_OVERRIDES").filter(|v| !v.trim().is_empty()) {
            config.env_policy =
                EnvPolicy::from_name(raw).ok_or_else(|| ConfigError::InvalidChoice {
                    key: "ENV_OVERRIDES".to_string(),
                    value: raw.to_string(),
                })?;
        }
        if let Some(raw) = get("STDOUT_EXCLUDE") {
            config.stdout_exclude = split_list(raw, false);
        }
        if let Some(raw) = get("STDERR_EXCLUDE") {
            config.stderr_exclude = split_list(raw, false);
        }
        if let Some(raw) = get("LISTEN_ADDR") {
            config.listen_addr = non_empty("LISTEN_ADDR", raw)?;
        }

        Ok(config)
    }

    /// Parse the current process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_map(&ProcessEnv.vars())
    }

    /// Executable actually run: `echo` in dry-run mode.
    pub fn effective_bin(&self) -> PathBuf {
        if self.dry_run {
            PathBuf::from("echo")
        } else {
            self.bin.clone()
        }
    }

    /// Argument policy described by this configuration.
    pub fn policy(&self) -> GatewayPolicy {
        let mut builder = GatewayPolicy::builder()
            .allow_subcommands(&self.allowed_commands)
            .allow_namespaces(&self.allowed_namespaces)
            .target_scoped(&self.target_scoped);
        if let Some(endpoint) = &self.endpoint {
            builder = builder.endpoint(InjectedFlag::new(&self.endpoint_flag, endpoint));
        }
        if let Some(credential) = &self.credential {
            builder = builder.credential(
                InjectedFlag::secret(&self.credential_flag, credential.expose())
                    .with_aliases(&self.credential_aliases),
            );
        }
        builder.build()
    }
}

fn split_list(raw: &str, fold_case: bool) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| if fold_case { v.to_lowercase() } else { v.to_string() })
        .collect()
}

fn non_empty(key: &str, raw: &str) -> Result<String, ConfigError> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(ConfigError::Empty {
            key: key.to_string(),
        });
    }
    Ok(value.to_string())
}

fn parse_int(key: &str, raw: &str) -> Result<i64, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidInteger {
        key: key.to_string(),
        value: raw.to_string(),
    })
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "" | "0" | "f" | "false" | "no" | "off" => Ok(false),
        "1" | "t" | "true" | "yes" | "on" => Ok(true),
        _ => Err(ConfigError::InvalidBool {
            key: key.to_string(),
            value: raw.to_string(),
        }),
    }
}

/// Where configuration key-value pairs come from.
pub trait ConfigSource: Send + Sync {
    /// Current key-value pairs.
    fn vars(&self) -> HashMap<String, String>;
}

/// The process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl ConfigSource for ProcessEnv {
    fn vars(&self) -> HashMap<String, String> {
        std::env::vars().collect()
    }
}

impl ConfigSource for HashMap<String, String> {
    fn vars(&self) -> HashMap<String, String> {
        self.clone()
    }
}

/// Process-wide configuration snapshot with explicit reload.
///
/// Readers get an `Arc` to one complete snapshot; a reload builds a new
/// snapshot first and swaps it in only if parsing succeeded.
pub struct ConfigStore {
    source: Box<dyn ConfigSource>,
    current: RwLock<Option<Arc<GatewayConfig>>>,
}

impl ConfigStore {
    /// Parse once from `source`.
    ///
    /// A failed parse is logged; reads retry it until one succeeds.
    pub fn load(source: impl ConfigSource + 'static) -> Self {
        let parsed = GatewayConfig::from_map(&source.vars());
        if let Err(e) = &parsed {
            error!(error = %e, "invalid gateway configuration");
        }
        Self {
            source: Box::new(source),
            current: RwLock::new(parsed.ok().map(Arc::new)),
        }
    }

    /// The current snapshot.
    pub fn current(&self) -> Result<Arc<GatewayConfig>, ConfigError> {
        let cached = self
            .current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match cached {
            Some(config) => Ok(config),
            None => self.reload(),
        }
    }

    /// Re-parse the source and swap in the new snapshot.
    ///
    /// On error the previous snapshot stays in place.
    pub fn reload(&self) -> Result<Arc<GatewayConfig>, ConfigError> {
        let config = Arc::new(GatewayConfig::from_map(&self.source.vars())?);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(config.clone());
        info!("gateway configuration loaded");
        Ok(config)
    }
}

impl std::fmt::Debug for ConfigStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigStore")
            .field("current", &self.current)
            .finish_non_exhaustive()
    }
}
