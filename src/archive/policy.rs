// src/archive/policy.rs
//! Declarative permission policy
//!
//! Archive entry modes come from an ordered list of glob rules, never from
//! the source filesystem. The first matching rule wins; unmatched paths get
//! the default mode. Paths are archive-relative with forward slashes.

use crate::error::{Error, Result};
use glob::{MatchOptions, Pattern};

/// rwxr-xr-x
pub const MODE_EXECUTABLE: u32 = 0o755;

/// rw-r--r--
pub const MODE_DATA: u32 = 0o644;

/// Suffixes under `lib/` that are never executable
const LIB_DATA_SUFFIXES: &[&str] = &["h", "inc", "modulemap", "tcc", "txt", "a", "syms"];

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// A single `pattern -> mode` rule
#[derive(Debug, Clone)]
pub struct PolicyRule {
    pattern: Pattern,
    mode: u32,
}

impl PolicyRule {
    /// Compile a rule; `mode` is masked to permission bits
    pub fn new(pattern: &str, mode: u32) -> Result<Self> {
        let compiled = Pattern::new(pattern).map_err(|e| Error::InvalidPolicy {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        if mode > 0o7777 {
            return Err(Error::InvalidPolicy {
                pattern: pattern.to_string(),
                reason: format!("mode {:o} is not a permission mode", mode),
            });
        }
        Ok(Self {
            pattern: compiled,
            mode,
        })
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn mode(&self) -> u32 {
        self.mode
    }

    fn matches(&self, path: &str) -> bool {
        self.pattern.matches_with(path, MATCH_OPTIONS)
    }
}

/// Ordered rule set with a default
#[derive(Debug, Clone)]
pub struct PermissionPolicy {
    rules: Vec<PolicyRule>,
    default_mode: u32,
}

impl PermissionPolicy {
    pub fn new(rules: Vec<PolicyRule>, default_mode: u32) -> Self {
        Self {
            rules,
            default_mode,
        }
    }

    /// Policy for toolchain archives
    ///
    /// `bin/` is executable, shared libraries and tool binaries under `lib/`
    /// are executable, headers, static archives and text are data, and
    /// everything else is data.
    pub fn toolchain() -> Self {
        let mut specs: Vec<(String, u32)> = LIB_DATA_SUFFIXES
            .iter()
            .map(|suffix| (format!("**/lib/**/*.{}", suffix), MODE_DATA))
            .collect();
        specs.extend([
            ("**/lib/**/*.so".to_string(), MODE_EXECUTABLE),
            ("**/lib/**/*.so.*".to_string(), MODE_EXECUTABLE),
            ("**/lib/**/*.dylib".to_string(), MODE_EXECUTABLE),
            ("**/lib/**/bin/**".to_string(), MODE_EXECUTABLE),
            ("**/lib/**".to_string(), MODE_DATA),
            ("**/bin/**".to_string(), MODE_EXECUTABLE),
        ]);

        let rules = specs
            .into_iter()
            .filter_map(|(pattern, mode)| PolicyRule::new(&pattern, mode).ok())
            .collect();

        Self::new(rules, MODE_DATA)
    }

    /// Mode for an archive-relative path
    pub fn mode_for(&self, path: &str) -> u32 {
        self.rules
            .iter()
            .find(|rule| rule.matches(path))
            .map(|rule| rule.mode)
            .unwrap_or(self.default_mode)
    }

    pub fn rules(&self) -> &[PolicyRule] {
        &self.rules
    }

    pub fn default_mode(&self) -> u32 {
        self.default_mode
    }
}

impl Default for PermissionPolicy {
    fn default() -> Self {
        Self::toolchain()
    }
}

/// Parse an octal mode string such as `755` or `0o644`
pub fn parse_mode(mode: &str) -> Result<u32> {
    let digits = mode
        .trim()
        .trim_start_matches("0o")
        .trim_start_matches("0O");
    let value = u32::from_str_radix(digits, 8).map_err(|e| Error::InvalidPolicy {
        pattern: mode.to_string(),
        reason: format!("not an octal mode: {}", e),
    })?;
    if value > 0o7777 {
        return Err(Error::InvalidPolicy {
            pattern: mode.to_string(),
            reason: "mode exceeds 7777".to_string(),
        });
    }
    Ok(value)
}
