//! Invocation policy.
//!
//! `GatewayPolicy` turns a parsed token list into the vetted argv handed to
//! the runner: it classifies the subcommand, enforces the subcommand and
//! namespace allow-lists, and injects the endpoint and credential flags.

use crate::arg_parser::{classify_subcommand, extract_target, has_any_flag, TargetRef};
use crate::error::Violation;
use crate::inject::inject_flag;
use std::collections::HashSet;
use tracing::{debug, warn};

/// A flag the policy adds when the caller did not supply it.
#[derive(Clone, PartialEq, Eq)]
pub struct InjectedFlag {
    /// Flag name, e.g. `--endpoint`.
    pub flag: String,
    /// Other spellings that count as the flag being present, e.g. `-k`.
    pub aliases: Vec<String>,
    /// Value spliced after the flag.
    pub value: String,
    /// Whether the value may appear in logs and debug output.
    pub secret: bool,
}

impl InjectedFlag {
    /// A public flag with no aliases.
    pub fn new(flag: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            flag: flag.into(),
            aliases: Vec::new(),
            value: value.into(),
            secret: false,
        }
    }

    /// A flag whose value is credential material.
    pub fn secret(flag: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            secret: true,
            ..Self::new(flag, value)
        }
    }

    /// Add alias spellings.
    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases.extend(aliases.into_iter().map(Into::into));
        self
    }

    fn is_present(&self, argv: &[String]) -> bool {
        let names: Vec<&str> = std::iter::once(self.flag.as_str())
            .chain(self.aliases.iter().map(String::as_str))
            .collect();
        has_any_flag(argv, &names)
    }

    fn apply(&self, argv: Vec<String>) -> Vec<String> {
        if self.is_present(&argv) {
            debug!(flag = %self.flag, "flag supplied by caller, not injecting");
            return argv;
        }
        debug!(flag = %self.flag, "injecting flag");
        inject_flag(argv, &self.flag, &self.value)
    }
}

impl std::fmt::Debug for InjectedFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let value = if self.secret { "<redacted>" } else { self.value.as_str() };
        f.debug_struct("InjectedFlag")
            .field("flag", &self.flag)
            .field("aliases", &self.aliases)
            .field("value", &value)
            .finish()
    }
}

/// Argv that passed the policy, with what the policy learned about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VettedArgs {
    /// Arguments to run, including injected flags.
    pub argv: Vec<String>,
    /// Case-folded subcommand; empty for flag-only invocations.
    pub subcommand: String,
    /// Target found for a target-scoped subcommand.
    pub target: Option<TargetRef>,
}

/// Argument policy for the wrapped executable.
///
/// Create using `GatewayPolicy::builder()`.
#[derive(Debug, Clone, Default)]
pub struct GatewayPolicy {
    /// Allowed subcommands (case-folded). Empty allows every subcommand.
    allowed_subcommands: HashSet<String>,

    /// Allowed target namespaces (case-folded). Empty disables the check.
    allowed_namespaces: HashSet<String>,

    /// Subcommands that get target enforcement and flag injection.
    target_scoped: HashSet<String>,

    /// Default endpoint flag.
    endpoint: Option<InjectedFlag>,

    /// Credential flag.
    credential: Option<InjectedFlag>,
}

impl GatewayPolicy {
    /// Create a new policy builder.
    pub fn builder() -> GatewayPolicyBuilder {
        GatewayPolicyBuilder::new()
    }

    /// Reject a subcommand that is not allow-listed.
    ///
    /// An empty subcommand (flag-only invocation) always passes.
    pub fn check_subcommand(&self, subcommand: &str) -> Result<(), Violation> {
        if self.allowed_subcommands.is_empty() || subcommand.is_empty() {
            return Ok(());
        }
        if self.allowed_subcommands.contains(&subcommand.to_lowercase()) {
            return Ok(());
        }
        Err(Violation::SubcommandNotAllowed {
            subcommand: subcommand.to_string(),
        })
    }

    /// Whether `subcommand` gets target enforcement and injection.
    pub fn is_target_scoped(&self, subcommand: &str) -> bool {
        self.target_scoped.contains(&subcommand.to_lowercase())
    }

    /// Enforce the namespace allow-list for a target-scoped subcommand.
    ///
    /// With an empty allow-list any target (or none) passes.
    pub fn check_target(
        &self,
        subcommand: &str,
        argv: &[String],
    ) -> Result<Option<TargetRef>, Violation> {
        let target = extract_target(argv);
        if self.allowed_namespaces.is_empty() {
            return Ok(target);
        }

        let Some(target) = target else {
            return Err(Violation::MissingTarget {
                subcommand: subcommand.to_string(),
            });
        };
        if !self.allowed_namespaces.contains(&target.namespace) {
            return Err(Violation::NamespaceNotAllowed {
                namespace: target.namespace,
            });
        }
        Ok(Some(target))
    }

    /// Validate a token list and produce the argv to execute.
    ///
    /// The target is checked before any flag is injected, so injected values
    /// can never satisfy the namespace allow-list.
    ///
    /// # Errors
    ///
    /// Returns a `Violation` if the arguments don't conform to the policy.
    pub fn prepare(&self, argv: Vec<String>) -> Result<VettedArgs, Violation> {
        let subcommand = classify_subcommand(&argv)?;

        if let Err(violation) = self.check_subcommand(&subcommand) {
            warn!(%subcommand, "subcommand denied");
            return Err(violation);
        }

        if !self.is_target_scoped(&subcommand) {
            debug!(%subcommand, "subcommand allowed");
            return Ok(VettedArgs {
                argv,
                subcommand,
                target: None,
            });
        }

        let target = match self.check_target(&subcommand, &argv) {
            Ok(target) => target,
            Err(violation) => {
                warn!(%subcommand, reason = %violation, "target denied");
                return Err(violation);
            }
        };
        debug!(%subcommand, ?target, "target-scoped subcommand allowed");

        let mut argv = argv;
        for flag in [&self.endpoint, &self.credential].into_iter().flatten() {
            argv = flag.apply(argv);
        }

        Ok(VettedArgs {
            argv,
            subcommand,
            target,
        })
    }
}

/// Builder for `GatewayPolicy`.
#[derive(Debug, Clone, Default)]
pub struct GatewayPolicyBuilder {
    policy: GatewayPolicy,
}

impl GatewayPolicyBuilder {
    /// Create a new builder: no restrictions, nothing target-scoped.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add allowed subcommands (trimmed, case-folded, blanks ignored).
    pub fn allow_subcommands<I, S>(mut self, subcommands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.policy
            .allowed_subcommands
            .extend(normalize(subcommands));
        self
    }

    /// Add allowed target namespaces (trimmed, case-folded, blanks ignored).
    pub fn allow_namespaces<I, S>(mut self, namespaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.policy.allowed_namespaces.extend(normalize(namespaces));
        self
    }

    /// Mark subcommands as target-scoped.
    pub fn target_scoped<I, S>(mut self, subcommands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.policy.target_scoped.extend(normalize(subcommands));
        self
    }

    /// Inject this endpoint flag for target-scoped subcommands.
    pub fn endpoint(mut self, flag: InjectedFlag) -> Self {
        self.policy.endpoint = Some(flag).filter(|f| !f.value.trim().is_empty());
        self
    }

    /// Inject this credential flag for target-scoped subcommands.
    pub fn credential(mut self, flag: InjectedFlag) -> Self {
        self.policy.credential = Some(flag).filter(|f| !f.value.trim().is_empty());
        self
    }

    /// Build the policy.
    pub fn build(self) -> GatewayPolicy {
        self.policy
    }
}

fn normalize<I, S>(values: I) -> impl Iterator<Item = String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    values
        .into_iter()
        .map(|v| v.as_ref().trim().to_lowercase())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ViolationKind;

    fn s(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn execute_policy() -> GatewayPolicy {
        GatewayPolicy::builder()
            .allow_subcommands(["execute"])
            .target_scoped(["execute"])
            .build()
    }

    #[test]
    fn test_unrestricted_allows_anything() {
        let policy = GatewayPolicy::builder().build();
        let vetted = policy.prepare(s(&["echo", "hello", "world"])).unwrap();
        assert_eq!(vetted.argv, s(&["echo", "hello", "world"]));
        assert_eq!(vetted.subcommand, "echo");
    }

    #[test]
    fn test_subcommand_denied() {
        let result = execute_policy().prepare(s(&["build", "--flag"]));
        assert_eq!(
            result,
            Err(Violation::SubcommandNotAllowed {
                subcommand: "build".to_string()
            })
        );
        assert_eq!(result.unwrap_err().kind(), ViolationKind::PolicyDenied);
    }

    #[test]
    fn test_subcommand_allow_list_case_insensitive() {
        let policy = GatewayPolicy::builder().allow_subcommands([" Execute "]).build();
        assert!(policy.prepare(s(&["EXECUTE", "--help"])).is_ok());
    }

    #[test]
    fn test_flag_only_always_allowed() {
        let vetted = execute_policy().prepare(s(&["--version"])).unwrap();
        assert_eq!(vetted.subcommand, "");
        assert_eq!(vetted.argv, s(&["--version"]));
    }

    #[test]
    fn test_empty_argv_malformed() {
        assert_eq!(execute_policy().prepare(vec![]), Err(Violation::NoArguments));
    }

    #[test]
    fn test_namespace_denied() {
        let policy = GatewayPolicy::builder()
            .allow_subcommands(["execute"])
            .target_scoped(["execute"])
            .allow_namespaces(["allowed_contract"])
            .build();

        let result = policy.prepare(s(&["execute", "disallowed_contract/token_receive_public"]));
        assert_eq!(
            result,
            Err(Violation::NamespaceNotAllowed {
                namespace: "disallowed_contract".to_string()
            })
        );
    }

    #[test]
    fn test_namespace_allowed_case_insensitive() {
        let policy = GatewayPolicy::builder()
            .target_scoped(["execute"])
            .allow_namespaces(["Token.Aleo"])
            .build();

        let vetted = policy.prepare(s(&["execute", "TOKEN.aleo/mint"])).unwrap();
        assert_eq!(
            vetted.target,
            Some(TargetRef {
                namespace: "token.aleo".to_string(),
                action: "mint".to_string(),
            })
        );
    }

    #[test]
    fn test_missing_target_is_bad_request() {
        let policy = GatewayPolicy::builder()
            .target_scoped(["execute"])
            .allow_namespaces(["token.aleo"])
            .build();

        let result = policy.prepare(s(&["execute", "--help"]));
        assert_eq!(result.clone().unwrap_err().kind(), ViolationKind::BadRequest);
        assert!(matches!(result, Err(Violation::MissingTarget { .. })));
    }

    #[test]
    fn test_target_not_checked_for_other_subcommands() {
        let policy = GatewayPolicy::builder()
            .target_scoped(["execute"])
            .allow_namespaces(["token.aleo"])
            .build();

        assert!(policy.prepare(s(&["build", "other/thing"])).is_ok());
    }

    #[test]
    fn test_endpoint_injected_without_namespace_allow_list() {
        let policy = GatewayPolicy::builder()
            .target_scoped(["execute"])
            .endpoint(InjectedFlag::new("--endpoint", "https://rpc"))
            .build();

        let vetted = policy
            .prepare(s(&["execute", "ns/act", "--network", "testnet"]))
            .unwrap();
        assert_eq!(
            vetted.argv,
            s(&["execute", "--endpoint", "https://rpc", "ns/act", "--network", "testnet"])
        );
    }

    #[test]
    fn test_credential_respects_aliases() {
        let policy = GatewayPolicy::builder()
            .target_scoped(["execute"])
            .credential(InjectedFlag::secret("--private-key", "abc123").with_aliases(["-k"]))
            .build();

        let vetted = policy.prepare(s(&["execute", "ns/act", "-k", "mine"])).unwrap();
        assert_eq!(vetted.argv, s(&["execute", "ns/act", "-k", "mine"]));

        let vetted = policy.prepare(s(&["execute", "ns/act"])).unwrap();
        assert_eq!(vetted.argv, s(&["execute", "--private-key", "abc123", "ns/act"]));
    }

    #[test]
    fn test_no_injection_for_other_subcommands() {
        let policy = GatewayPolicy::builder()
            .target_scoped(["execute"])
            .endpoint(InjectedFlag::new("--endpoint", "https://rpc"))
            .build();

        let vetted = policy.prepare(s(&["build"])).unwrap();
        assert_eq!(vetted.argv, s(&["build"]));
    }

    #[test]
    fn test_blank_injection_values_ignored() {
        let policy = GatewayPolicy::builder()
            .target_scoped(["execute"])
            .endpoint(InjectedFlag::new("--endpoint", "  "))
            .build();

        let vetted = policy.prepare(s(&["execute", "ns/act"])).unwrap();
        assert_eq!(vetted.argv, s(&["execute", "ns/act"]));
    }

    #[test]
    fn test_prepare_is_idempotent() {
        let policy = GatewayPolicy::builder()
            .target_scoped(["execute"])
            .endpoint(InjectedFlag::new("--endpoint", "https://rpc"))
            .credential(InjectedFlag::secret("--private-key", "abc123"))
            .build();

        let once = policy.prepare(s(&["execute", "ns/act"])).unwrap();
        let twice = policy.prepare(once.argv.clone()).unwrap();
        assert_eq!(once.argv, twice.argv);
    }

    #[test]
    fn test_secret_redacted_in_debug() {
        let flag = InjectedFlag::secret("--private-key", "abc123");
        let rendered = format!("{:?}", flag);
        assert!(!rendered.contains("abc123"));
        assert!(rendered.contains("<redacted>"));
    }
}
