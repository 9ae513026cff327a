//! Adversarial tests for exec_gateway.
//!
//! These tests attempt to slip past the subcommand and namespace allow-lists,
//! the flag injection rules and the environment filter. Every attempt must be
//! rejected or neutralized.

use exec_gateway::api::build_request;
use exec_gateway::{
    runner, EnvPolicy, GatewayConfig, GatewayPolicy, InjectedFlag, InvokeRequest, Violation,
    ViolationKind,
};
use std::collections::HashMap;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

// =============================================================================
// Test Helpers
// =============================================================================

fn s(v: &[&str]) -> Vec<String> {
    v.iter().map(|s| s.to_string()).collect()
}

fn locked_policy() -> GatewayPolicy {
    GatewayPolicy::builder()
        .allow_subcommands(["execute"])
        .allow_namespaces(["token.aleo"])
        .target_scoped(["execute"])
        .endpoint(InjectedFlag::new("--endpoint", "https://rpc.example"))
        .credential(InjectedFlag::secret("--private-key", "server-key").with_aliases(["-k"]))
        .build()
}

fn config(pairs: &[(&str, &str)]) -> GatewayConfig {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    GatewayConfig::from_map(&vars).unwrap()
}

fn denied(result: Result<impl std::fmt::Debug, Violation>) -> ViolationKind {
    result.expect_err("attempt should be rejected").kind()
}

// =============================================================================
// Subcommand smuggling
// =============================================================================

#[test]
fn test_terminator_does_not_hide_subcommand() {
    let policy = locked_policy();
    assert_eq!(
        denied(policy.prepare(s(&["--", "deploy", "x"]))),
        ViolationKind::PolicyDenied
    );
}

#[test]
fn test_lone_dash_and_blanks_before_subcommand() {
    let policy = locked_policy();
    assert_eq!(
        denied(policy.prepare(s(&["-", "deploy"]))),
        ViolationKind::PolicyDenied
    );
    assert_eq!(
        denied(policy.prepare(s(&["", "  ", "deploy"]))),
        ViolationKind::PolicyDenied
    );
}

#[test]
fn test_flag_before_subcommand() {
    let policy = locked_policy();
    assert_eq!(
        denied(policy.prepare(s(&["--network", "deploy"]))),
        ViolationKind::PolicyDenied
    );
}

#[test]
fn test_padded_subcommand_is_not_trimmed() {
    let policy = locked_policy();
    assert_eq!(
        denied(policy.prepare(s(&[" execute", "token.aleo/x"]))),
        ViolationKind::PolicyDenied
    );
}

#[test]
fn test_nul_byte_in_subcommand() {
    let policy = locked_policy();
    assert_eq!(
        denied(policy.prepare(s(&["exec\0ute", "token.aleo/x"]))),
        ViolationKind::PolicyDenied
    );
}

#[test]
fn test_shell_separators_are_not_commands() {
    let policy = locked_policy();
    let tokens = InvokeRequest::with_cmd("execute; deploy").tokens().unwrap();
    assert_eq!(tokens, s(&["execute;", "deploy"]));
    assert_eq!(denied(policy.prepare(tokens)), ViolationKind::PolicyDenied);
}

#[test]
fn test_case_folding_cannot_escape() {
    let policy = locked_policy();
    assert!(policy.prepare(s(&["EXECUTE", "TOKEN.ALEO/x"])).is_ok());
    assert_eq!(
        denied(policy.prepare(s(&["Execute", "Evil.Aleo/x"]))),
        ViolationKind::PolicyDenied
    );
}

// =============================================================================
// Namespace smuggling
// =============================================================================

#[test]
fn test_url_is_not_a_target() {
    let policy = locked_policy();
    assert_eq!(
        denied(policy.prepare(s(&["execute", "https://token.aleo/x"]))),
        ViolationKind::BadRequest
    );
}

#[test]
fn test_half_targets_are_not_targets() {
    let policy = locked_policy();
    for token in ["/x", "token.aleo/", "/"] {
        assert_eq!(
            denied(policy.prepare(s(&["execute", token]))),
            ViolationKind::BadRequest,
            "token {token:?}"
        );
    }
}

#[test]
fn test_first_target_decides() {
    let policy = locked_policy();
    assert_eq!(
        denied(policy.prepare(s(&["execute", "evil.aleo/x", "token.aleo/y"]))),
        ViolationKind::PolicyDenied
    );
}

#[test]
fn test_injected_endpoint_cannot_satisfy_namespace() {
    let policy = GatewayPolicy::builder()
        .allow_subcommands(["execute"])
        .allow_namespaces(["token.aleo"])
        .target_scoped(["execute"])
        .endpoint(InjectedFlag::new("--endpoint", "token.aleo/rpc"))
        .build();
    assert_eq!(
        denied(policy.prepare(s(&["execute"]))),
        ViolationKind::BadRequest
    );
}

#[test]
fn test_whitespace_around_namespace() {
    let policy = locked_policy();
    assert_eq!(
        denied(policy.prepare(s(&["execute", "evil.aleo /x"]))),
        ViolationKind::PolicyDenied
    );
}

// =============================================================================
// Flag injection
// =============================================================================

#[test]
fn test_caller_credential_in_equals_form_is_respected() {
    let policy = locked_policy();
    let vetted = policy
        .prepare(s(&["execute", "--private-key=caller", "token.aleo/x"]))
        .unwrap();
    assert!(!vetted.argv.iter().any(|a| a == "server-key"));
}

#[test]
fn test_caller_credential_alias_is_respected() {
    let policy = locked_policy();
    let vetted = policy
        .prepare(s(&["execute", "-k", "caller", "token.aleo/x"]))
        .unwrap();
    assert!(!vetted.argv.iter().any(|a| a == "server-key"));
}

#[test]
fn test_lookalike_flag_does_not_suppress_injection() {
    let policy = locked_policy();
    let vetted = policy
        .prepare(s(&["execute", "--private-keys", "token.aleo/x"]))
        .unwrap();
    assert!(vetted.argv.iter().any(|a| a == "server-key"));
}

#[test]
fn test_endpoint_never_duplicated() {
    let policy = locked_policy();
    let vetted = policy
        .prepare(s(&["execute", "token.aleo/x", "--", "--endpoint"]))
        .unwrap();
    let count = vetted.argv.iter().filter(|a| *a == "--endpoint").count();
    assert_eq!(count, 1);
}

#[test]
fn test_secret_not_in_debug_output() {
    let policy = locked_policy();
    assert!(!format!("{policy:?}").contains("server-key"));
}

// =============================================================================
// Environment
// =============================================================================

#[test]
fn test_loader_variables_stripped_any_case() {
    let overrides: HashMap<String, String> = [
        ("LD_PRELOAD", "/tmp/evil.so"),
        ("ld_preload", "/tmp/evil.so"),
        ("DYLD_INSERT_LIBRARIES", "/tmp/evil.dylib"),
        ("PATH", "/tmp/evil"),
        ("NETWORK", "testnet"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    let filtered = EnvPolicy::StripDangerous.apply(&overrides);
    assert_eq!(filtered.kept.len(), 1);
    assert!(filtered.kept.contains_key("NETWORK"));
    assert_eq!(filtered.dropped.len(), 4);
}

#[test]
fn test_malformed_env_keys_refused() {
    let overrides: HashMap<String, String> = [("A=B", "1"), ("", "1"), ("C\0D", "1")]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let filtered = EnvPolicy::PassThrough.apply(&overrides);
    assert!(filtered.kept.is_empty());
}

#[test]
fn test_env_deny_policy_via_config() {
    let config = config(&[("ALLOWED_COMMANDS", "*"), ("ENV_OVERRIDES", "deny")]);
    let payload = InvokeRequest {
        env: [("NETWORK".to_string(), "testnet".to_string())].into(),
        ..InvokeRequest::with_args(["version"])
    };
    let request = build_request(&config, &payload).unwrap();
    assert!(request.env.is_empty());
}

// =============================================================================
// Execution
// =============================================================================

#[tokio::test]
async fn test_shell_metacharacters_stay_literal() {
    let tmp = TempDir::new().unwrap();
    let marker = tmp.path().join("pwned");
    let config = config(&[
        ("DRY_RUN", "true"),
        ("WORKDIR", tmp.path().to_str().unwrap()),
    ]);
    let payload = InvokeRequest::with_cmd(format!(
        "execute token.aleo/x ; touch {m} && touch {m} $(touch {m})",
        m = marker.display()
    ));

    let request = build_request(&config, &payload).unwrap();
    let outcome = runner::run(&request, &CancellationToken::new()).await;

    assert_eq!(outcome.exit_code, 0);
    assert!(outcome.stdout.contains("$(touch"));
    assert!(!marker.exists());
}

#[test]
fn test_expansion_off_by_default() {
    std::env::set_var("EXEC_GATEWAY_ADV_SECRET", "leaked");
    let config = config(&[("DRY_RUN", "true")]);
    let request = build_request(
        &config,
        &InvokeRequest::with_cmd("execute token.aleo/x $EXEC_GATEWAY_ADV_SECRET"),
    )
    .unwrap();
    assert!(request.argv.iter().all(|a| a != "leaked"));
    assert!(request.argv.iter().any(|a| a == "$EXEC_GATEWAY_ADV_SECRET"));
}
