//! Flag injection.
//!
//! Synthesized `flag value` pairs are spliced in right after the subcommand
//! so the wrapped executable parses them as options of that subcommand.

use crate::arg_parser::{has_flag, subcommand_position};

/// Index where synthesized flags are inserted.
///
/// Immediately after the subcommand token, or 0 when there is none.
pub fn injection_point(argv: &[String]) -> usize {
    subcommand_position(argv).map_or(0, |i| i + 1)
}

/// Splice `[flag, value]` at the injection point unless `flag` is present.
///
/// Presence is checked with [`has_flag`], so calling this twice with the
/// same inputs yields the same argv as calling it once. Every other token
/// keeps its relative order.
pub fn inject_flag(argv: Vec<String>, flag: &str, value: &str) -> Vec<String> {
    if has_flag(&argv, flag) {
        return argv;
    }

    let insert_pos = injection_point(&argv);
    let mut result = Vec::with_capacity(argv.len() + 2);
    let mut rest = argv.into_iter();
    result.extend(rest.by_ref().take(insert_pos));
    result.push(flag.to_string());
    result.push(value.to_string());
    result.extend(rest);
    result
}
