//! Argument classification.
//!
//! Tokens are classified as flags, positionals, or the `--` terminator.
//! The first non-blank positional is the subcommand; it drives the
//! allow-list checks and marks the point where synthesized flags go.

use crate::error::Violation;

/// Classification of a command-line argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgType {
    /// Starts with `-` (including lone `-`) before any terminator
    Flag(String),
    /// Anything else, or any token after `--`
    Positional(String),
    /// The first literal `--`
    Terminator,
}

/// Classify a single argument.
///
/// * `after_terminator` - If true, every token is positional (we're past `--`)
pub fn classify_arg(arg: &str, after_terminator: bool) -> ArgType {
    if after_terminator {
        return ArgType::Positional(arg.to_string());
    }

    match arg {
        "--" => ArgType::Terminator,
        s if s.starts_with('-') => ArgType::Flag(s.to_string()),
        _ => ArgType::Positional(arg.to_string()),
    }
}

/// Parse an argv vector into classified arguments.
///
/// Returns a vector of (ArgType, original_position) tuples. Only the first
/// `--` is a terminator; later ones are positionals.
pub fn parse_argv(argv: &[String]) -> Vec<(ArgType, usize)> {
    let mut result = Vec::with_capacity(argv.len());
    let mut after_terminator = false;

    for (i, arg) in argv.iter().enumerate() {
        let classified = classify_arg(arg, after_terminator);
        if classified == ArgType::Terminator {
            after_terminator = true;
        }
        result.push((classified, i));
    }

    result
}

/// Index of the subcommand token: the first positional that is not blank.
pub fn subcommand_position(argv: &[String]) -> Option<usize> {
    parse_argv(argv)
        .into_iter()
        .find_map(|(arg_type, i)| match arg_type {
            ArgType::Positional(s) if !s.trim().is_empty() => Some(i),
            _ => None,
        })
}

/// Return the case-folded subcommand.
///
/// A flag-only argv yields an empty string; an empty argv is an error.
pub fn classify_subcommand(argv: &[String]) -> Result<String, Violation> {
    if argv.is_empty() {
        return Err(Violation::NoArguments);
    }
    Ok(subcommand_position(argv)
        .map(|i| argv[i].to_lowercase())
        .unwrap_or_default())
}

/// True if some token is exactly `name` or starts with `name=`.
pub fn has_flag(argv: &[String], name: &str) -> bool {
    argv.iter().any(|arg| {
        arg == name
            || arg
                .strip_prefix(name)
                .is_some_and(|rest| rest.starts_with('='))
    })
}

/// True if any of `names` is present.
pub fn has_any_flag(argv: &[String], names: &[&str]) -> bool {
    names.iter().any(|name| has_flag(argv, name))
}

/// Value of `flag` given as `flag value` or `flag=value`.
///
/// A trailing flag with no value yields `Some("")`.
pub fn flag_value<'a>(argv: &'a [String], flag: &str) -> Option<&'a str> {
    for (i, arg) in argv.iter().enumerate() {
        if arg == flag {
            return Some(argv.get(i + 1).map(String::as_str).unwrap_or(""));
        }
        if let Some(value) = arg.strip_prefix(flag).and_then(|r| r.strip_prefix('=')) {
            return Some(value);
        }
    }
    None
}

/// A `namespace/action` pair named by the arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetRef {
    pub namespace: String,
    pub action: String,
}

/// Find the first `namespace/action` token.
///
/// Flags, blank tokens and anything containing `://` are skipped. The token
/// is split at its first `/`; both sides must be non-empty. Both parts are
/// trimmed and case-folded.
pub fn extract_target(argv: &[String]) -> Option<TargetRef> {
    argv.iter()
        .filter(|tok| !tok.starts_with('-') && !tok.trim().is_empty())
        .filter(|tok| !tok.contains("://"))
        .find_map(|tok| {
            let (namespace, action) = tok.split_once('/')?;
            if namespace.is_empty() || action.is_empty() {
                return None;
            }
            Some(TargetRef {
                namespace: namespace.trim().to_lowercase(),
                action: action.trim().to_lowercase(),
            })
        })
}
