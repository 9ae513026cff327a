//! Inbound request payload.
//!
//! A payload names the arguments either as an explicit `args` array or as a
//! single shell-syntax `cmd` string, never both. [`InvokeResponse`] is the
//! JSON shape returned for every executed request.

use crate::error::Violation;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Body of an invocation request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvokeRequest {
    /// Explicit ordered arguments for the wrapped executable.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    /// Shell-like command line (without the executable itself).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cmd: String,

    /// Working directory override. Blank means the configured default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workdir: Option<String>,

    /// Extra environment variables for the process.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,
}

impl InvokeRequest {
    /// Request with explicit arguments.
    pub fn with_args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Request with a shell-syntax command string.
    pub fn with_cmd(cmd: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            ..Self::default()
        }
    }

    /// Decode a JSON body.
    pub fn from_json(body: &[u8]) -> Result<Self, Violation> {
        serde_json::from_slice(body).map_err(|e| Violation::InvalidJson {
            reason: e.to_string(),
        })
    }

    /// Check that exactly one of `args` / `cmd` is supplied.
    pub fn validate(&self) -> Result<(), Violation> {
        let has_cmd = !self.cmd.trim().is_empty();
        match (self.args.is_empty(), has_cmd) {
            (false, true) => Err(Violation::ArgsAndCmd),
            (true, false) => Err(Violation::MissingArgsOrCmd),
            _ => Ok(()),
        }
    }

    /// The ordered token list, splitting `cmd` with shell word rules.
    pub fn tokens(&self) -> Result<Vec<String>, Violation> {
        self.tokens_inner(None)
    }

    /// Like [`tokens`](Self::tokens), additionally expanding `$VAR` and
    /// `${VAR}` in `cmd` the way a shell would before splitting.
    ///
    /// Single-quoted text and backslash-escaped `$` stay literal. Expanded
    /// values never split into extra words. Unknown variables expand to
    /// nothing, so an unquoted `$UNSET` on its own yields no token.
    pub fn tokens_expanded<F>(&self, lookup: F) -> Result<Vec<String>, Violation>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.tokens_inner(Some(&lookup))
    }

    /// Optional working directory override, trimmed.
    pub fn workdir_override(&self) -> Option<&str> {
        self.workdir
            .as_deref()
            .map(str::trim)
            .filter(|w| !w.is_empty())
    }

    fn tokens_inner(
        &self,
        lookup: Option<&dyn Fn(&str) -> Option<String>>,
    ) -> Result<Vec<String>, Violation> {
        self.validate()?;

        if !self.args.is_empty() {
            return Ok(self.args.clone());
        }

        let words = match lookup {
            None => shell_words::split(&self.cmd),
            Some(lookup) => shell_words::split(&expand_vars(&self.cmd, lookup)),
        }
        .map_err(|e| Violation::ShellSyntax {
            reason: e.to_string(),
        })?;

        if words.is_empty() {
            return Err(Violation::NoArguments);
        }
        Ok(words)
    }
}

/// Body of an invocation response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvokeResponse {
    pub exit_code: i32,
    pub duration_ms: u64,
    pub stdout: String,
    pub stderr: String,
    pub truncated: bool,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub timed_out: bool,

    /// Free-form details such as `workdir`, `bin` and `version`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, String>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Quote {
    None,
    Single,
    Double,
}

/// Expand variables in `cmd`, re-quoting each value for its context so
/// that a later shell-word split sees it as literal text.
fn expand_vars(cmd: &str, lookup: &dyn Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(cmd.len());
    let mut run = String::new();
    let mut quote = Quote::None;
    let mut chars = cmd.chars();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (Quote::Single, '\'') => {
                out.push(c);
                quote = Quote::None;
            }
            (Quote::Single, _) => out.push(c),
            (_, '\\') => {
                flush_run(&mut out, &mut run, quote, lookup);
                out.push(c);
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            }
            (Quote::None, '\'') | (Quote::None, '"') | (Quote::Double, '"') => {
                flush_run(&mut out, &mut run, quote, lookup);
                out.push(c);
                quote = match c {
                    '\'' => Quote::Single,
                    _ if quote == Quote::Double => Quote::None,
                    _ => Quote::Double,
                };
            }
            _ => run.push(c),
        }
    }
    flush_run(&mut out, &mut run, quote, lookup);
    out
}

fn flush_run(
    out: &mut String,
    run: &mut String,
    quote: Quote,
    lookup: &dyn Fn(&str) -> Option<String>,
) {
    if run.is_empty() {
        return;
    }
    out.push_str(&shellexpand::env_with_context_no_errors(
        run.as_str(),
        |key| Some(requote(&lookup(key).unwrap_or_default(), quote)),
    ));
    run.clear();
}

fn requote(value: &str, quote: Quote) -> String {
    match quote {
        Quote::Double => {
            let mut escaped = String::with_capacity(value.len());
            for c in value.chars() {
                if matches!(c, '\\' | '"' | '$' | '`') {
                    escaped.push('\\');
                }
                escaped.push(c);
            }
            escaped
        }
        _ if value.is_empty() => String::new(),
        _ => shell_words::quote(value).into_owned(),
    }
}
