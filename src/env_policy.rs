//! Policy for caller-supplied environment overrides.
//!
//! The subprocess inherits the gateway's environment. Requests may add
//! variables on top; this module decides which of those survive.

use std::collections::HashMap;

/// Environment variables a request may never set.
///
/// These can inject code into the child or redirect its network traffic.
pub const ALWAYS_STRIP: &[&str] = &[
    // Library injection
    "LD_PRELOAD",
    "LD_LIBRARY_PATH",
    "LD_AUDIT",
    "DYLD_INSERT_LIBRARIES",
    "DYLD_LIBRARY_PATH",
    "DYLD_FRAMEWORK_PATH",
    // Interpreter and shell start-up
    "PYTHONPATH",
    "PYTHONSTARTUP",
    "NODE_OPTIONS",
    "PERL5OPT",
    "RUBYOPT",
    "BASH_ENV",
    "ENV",
    "SHELLOPTS",
    "IFS",
    // Executable lookup
    "PATH",
    // Proxy hijacking
    "HTTP_PROXY",
    "HTTPS_PROXY",
    "ALL_PROXY",
    "NO_PROXY",
];

/// How request environment overrides are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnvPolicy {
    /// Accept overrides except [`ALWAYS_STRIP`] keys (default).
    #[default]
    StripDangerous,

    /// Accept every well-formed override.
    PassThrough,

    /// Ignore all overrides.
    Deny,
}

/// Result of applying an [`EnvPolicy`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilteredEnv {
    /// Variables to set on the child.
    pub kept: HashMap<String, String>,
    /// Keys that were refused, sorted.
    pub dropped: Vec<String>,
}

impl EnvPolicy {
    /// Parse a policy name: `strip`, `allow`, or `deny`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "strip" => Some(EnvPolicy::StripDangerous),
            "allow" => Some(EnvPolicy::PassThrough),
            "deny" => Some(EnvPolicy::Deny),
            _ => None,
        }
    }

    /// Filter overrides from a request.
    ///
    /// Keys that are empty or contain `=` or NUL are always refused.
    pub fn apply(&self, overrides: &HashMap<String, String>) -> FilteredEnv {
        let mut filtered = FilteredEnv::default();

        for (key, value) in overrides {
            let accept = match self {
                EnvPolicy::Deny => false,
                EnvPolicy::PassThrough => is_well_formed(key, value),
                EnvPolicy::StripDangerous => {
                    is_well_formed(key, value) && !Self::is_forbidden(key)
                }
            };
            if accept {
                filtered.kept.insert(key.clone(), value.clone());
            } else {
                filtered.dropped.push(key.clone());
            }
        }

        filtered.dropped.sort();
        filtered
    }

    /// Check if a specific key is on the [`ALWAYS_STRIP`] list.
    pub fn is_forbidden(key: &str) -> bool {
        ALWAYS_STRIP.iter().any(|&s| s.eq_ignore_ascii_case(key))
    }
}

fn is_well_formed(key: &str, value: &str) -> bool {
    !key.is_empty() && !key.contains(['=', '\0']) && !value.contains('\0')
}
