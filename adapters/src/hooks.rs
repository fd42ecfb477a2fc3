//! The git-hook installer's *named interface* (spec.md §6, SPEC_FULL.md
//! §3.1): a validated `.txrc.json` config and a pure renderer for the
//! `post-commit` script body it controls. No git-porcelain installation —
//! writing the file to `.git/hooks/` is left to the CLI caller.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const DEFAULT_FILE_THRESHOLD: u32 = 10;

#[derive(Debug, Error, PartialEq)]
pub enum HookConfigError {
    #[error("high-value file pattern {0:?} contains a disallowed character")]
    InvalidPattern(String),
}

/// Controls the `post-commit` hook: how many changed files trigger a
/// reminder, and which paths always warrant one regardless of count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookConfig {
    #[serde(default = "default_threshold", deserialize_with = "deserialize_threshold")]
    pub file_threshold: u32,
    #[serde(default)]
    pub high_value_files: Vec<String>,
}

fn default_threshold() -> u32 {
    DEFAULT_FILE_THRESHOLD
}

/// Only positive finite integers are accepted; anything else (zero,
/// negative, non-numeric) falls back to the default rather than failing
/// the whole config load, per spec.md §6.
fn deserialize_threshold<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = serde_json::Value::deserialize(deserializer)?;
    Ok(raw.as_u64().filter(|n| *n > 0).and_then(|n| u32::try_from(n).ok()).unwrap_or(DEFAULT_FILE_THRESHOLD))
}

impl Default for HookConfig {
    fn default() -> Self {
        Self { file_threshold: DEFAULT_FILE_THRESHOLD, high_value_files: Vec::new() }
    }
}

fn allowed_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"^[^"'$;|&`\\\s]+$"#).expect("static hook pattern allow-list"))
}

/// Rejects patterns containing quotes, `$`, `;`, `|`, `&`, backticks,
/// whitespace, backslashes, or newlines before they're ever embedded in a
/// shell script.
pub fn validate_pattern(pattern: &str) -> Result<(), HookConfigError> {
    if pattern.is_empty() || !allowed_pattern().is_match(pattern) {
        return Err(HookConfigError::InvalidPattern(pattern.to_string()));
    }
    Ok(())
}

/// Validates every pattern in `config.high_value_files`, returning the
/// first offending pattern as an error.
pub fn validate_config(config: &HookConfig) -> Result<(), HookConfigError> {
    for pattern in &config.high_value_files {
        validate_pattern(pattern)?;
    }
    Ok(())
}

/// Renders the POSIX `post-commit` script body. Callers are responsible for
/// writing the result to `.git/hooks/post-commit` and marking it executable.
pub fn render_post_commit_script(config: &HookConfig) -> Result<String, HookConfigError> {
    validate_config(config)?;

    let high_value_checks: String = config
        .high_value_files
        .iter()
        .map(|pattern| format!("  if git diff --cached --name-only | grep -qE '{pattern}'; then\n    echo \"tx: high-value file changed: {pattern}\"\n  fi\n"))
        .collect();

    Ok(format!(
        "#!/bin/sh\n\
         # Generated by tx's hook installer; see .txrc.json to reconfigure.\n\
         changed=$(git diff --cached --name-only | wc -l)\n\
         if [ \"$changed\" -ge {threshold} ]; then\n\
         \x20 echo \"tx: {threshold}+ files changed in this commit, consider splitting it\"\n\
         fi\n\
         {high_value_checks}",
        threshold = config.file_threshold,
        high_value_checks = high_value_checks,
    ))
}
