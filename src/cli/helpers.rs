//! Shared helper functions for CLI commands

use serde::Serialize;

/// Shorten a record id for table output
///
/// Profile ids are 30 characters; tables show the first 13 with a "..."
/// suffix, which is still enough for `--profile` partial matching.
pub fn format_short_id_str(id: &str) -> String {
    if id.chars().count() > 16 {
        format!("{}...", id.chars().take(13).collect::<String>())
    } else {
        id.to_string()
    }
}

/// Truncate a string to max_len characters, adding "..." if truncated
pub fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Split a `name=value` argument
pub fn split_assignment(arg: &str) -> Option<(&str, &str)> {
    let (name, value) = arg.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        None
    } else {
        Some((name, value))
    }
}

pub fn to_json<T: Serialize>(value: &T) -> miette::Result<String> {
    serde_json::to_string_pretty(value).map_err(|e| miette::miette!("{}", e))
}

pub fn to_yaml<T: Serialize>(value: &T) -> miette::Result<String> {
    serde_yml::to_string(value).map_err(|e| miette::miette!("{}", e))
}
