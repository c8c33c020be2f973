//! Policy and configuration types.
//!
//! All configuration is passed explicitly; the core reads no environment
//! variables and keeps no mutable global configuration.

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Limits applied to filter expressions before and during parsing.
///
/// Each limit is checked early so oversized inputs are rejected before any
/// allocation proportional to their size.
#[derive(Debug, Clone)]
pub struct DslPolicy {
    /// Maximum expression length in bytes.
    pub max_expression_length: usize,
    /// Maximum number of tokens after lexing.
    pub max_tokens: usize,
    /// Maximum parenthesis nesting depth.
    pub max_depth: usize,
    /// Pattern every identifier must match.
    pub identifier_pattern: Regex,
}

impl DslPolicy {
    fn with_limits(max_expression_length: usize, max_tokens: usize, max_depth: usize) -> Self {
        DslPolicy {
            max_expression_length,
            max_tokens,
            max_depth,
            identifier_pattern: default_identifier_pattern(),
        }
    }

    /// Tight limits for untrusted callers: 1000 bytes, 50 tokens, depth 20.
    pub fn strict() -> Self {
        Self::with_limits(1000, 50, 20)
    }

    /// Default limits: 5000 bytes, 200 tokens, depth 50.
    pub fn defaults() -> Self {
        Self::with_limits(5000, 200, 50)
    }

    /// Loose limits for generated expressions: 10000 bytes, 500 tokens, depth 100.
    pub fn relaxed() -> Self {
        Self::with_limits(10000, 500, 100)
    }

    /// Replace the identifier pattern, keeping the configured limits.
    pub fn with_identifier_pattern(mut self, pattern: Regex) -> Self {
        self.identifier_pattern = pattern;
        self
    }
}

impl Default for DslPolicy {
    fn default() -> Self {
        Self::defaults()
    }
}

fn default_identifier_pattern() -> Regex {
    // The pattern is a compile-time constant; a failure here is a programming
    // error in this crate, not user input.
    Regex::new("^[A-Za-z_][A-Za-z0-9_]*$").expect("default identifier pattern")
}

/// Sizing policy for the compiled-condition cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachePolicy {
    /// Maximum number of cached condition trees before LRU eviction.
    pub max_size: usize,
}

impl Default for CachePolicy {
    fn default() -> Self {
        CachePolicy { max_size: 1024 }
    }
}

/// Behavior when a filter value is null at resolve time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NullValuePolicy {
    /// Raise a validation error.
    StrictException,
    /// Rewrite `(EQ, null)` to `IS_NULL` and `(NE, null)` to `NOT_NULL`;
    /// any other operator with a null value still errors.
    CoerceToIsNull,
    /// Replace the filter with a predicate that matches everything.
    IgnoreFilter,
}

/// Case handling applied to string values during coercion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StringCaseStrategy {
    None,
    Lower,
    Upper,
}

/// Case handling for enum-typed property values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnumMatchMode {
    CaseSensitive,
    CaseInsensitive,
}

/// Resolve-time filter semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterConfig {
    pub null_value_policy: NullValuePolicy,
    pub string_case_strategy: StringCaseStrategy,
    pub enum_match_mode: EnumMatchMode,
}

impl Default for FilterConfig {
    fn default() -> Self {
        FilterConfig {
            null_value_policy: NullValuePolicy::StrictException,
            string_case_strategy: StringCaseStrategy::None,
            enum_match_mode: EnumMatchMode::CaseSensitive,
        }
    }
}

/// Case handling for DTO field lookup during projection planning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldCase {
    CaseSensitive,
    CaseInsensitive,
}

/// Projection planning options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectionPolicy {
    pub field_case: FieldCase,
}

impl Default for ProjectionPolicy {
    fn default() -> Self {
        ProjectionPolicy {
            field_case: FieldCase::CaseSensitive,
        }
    }
}
