use std::fmt;

use serde::{Deserialize, Serialize};

/// Expected value shape for an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperatorArity {
    /// A single scalar value.
    Scalar,
    /// A collection of values.
    Collection,
    /// Exactly two values forming a range.
    Range,
}

/// Filter operator: one of the 14 standard kinds, or a custom code resolved
/// through the custom-operator registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Matches,
    NotMatches,
    In,
    NotIn,
    IsNull,
    NotNull,
    Range,
    NotRange,
    /// Opaque code; stored normalized to UPPER_SNAKE_CASE.
    Custom(String),
}

impl Operator {
    /// Build a custom operator, normalizing the code to upper case.
    pub fn custom(code: impl Into<String>) -> Self {
        Operator::Custom(code.into().to_uppercase())
    }

    /// Resolve an operator code case-insensitively. Codes that do not name a
    /// standard operator become [`Operator::Custom`].
    pub fn parse(code: &str) -> Self {
        match code.to_uppercase().as_str() {
            "EQ" => Operator::Eq,
            "NE" => Operator::Ne,
            "GT" => Operator::Gt,
            "GTE" => Operator::Gte,
            "LT" => Operator::Lt,
            "LTE" => Operator::Lte,
            "MATCHES" => Operator::Matches,
            "NOT_MATCHES" => Operator::NotMatches,
            "IN" => Operator::In,
            "NOT_IN" => Operator::NotIn,
            "IS_NULL" => Operator::IsNull,
            "NOT_NULL" => Operator::NotNull,
            "RANGE" => Operator::Range,
            "NOT_RANGE" => Operator::NotRange,
            other => Operator::Custom(other.to_string()),
        }
    }

    /// Canonical code used in structural cache keys and error messages.
    pub fn code(&self) -> &str {
        match self {
            Operator::Eq => "EQ",
            Operator::Ne => "NE",
            Operator::Gt => "GT",
            Operator::Gte => "GTE",
            Operator::Lt => "LT",
            Operator::Lte => "LTE",
            Operator::Matches => "MATCHES",
            Operator::NotMatches => "NOT_MATCHES",
            Operator::In => "IN",
            Operator::NotIn => "NOT_IN",
            Operator::IsNull => "IS_NULL",
            Operator::NotNull => "NOT_NULL",
            Operator::Range => "RANGE",
            Operator::NotRange => "NOT_RANGE",
            Operator::Custom(code) => code,
        }
    }

    /// Whether the operator needs a value at resolve time.
    pub fn requires_value(&self) -> bool {
        !matches!(self, Operator::IsNull | Operator::NotNull)
    }

    /// Whether the operator accepts more than one value.
    pub fn supports_multiple_values(&self) -> bool {
        matches!(
            self,
            Operator::In | Operator::NotIn | Operator::Range | Operator::NotRange
        )
    }

    pub fn arity(&self) -> OperatorArity {
        match self {
            Operator::In | Operator::NotIn => OperatorArity::Collection,
            Operator::Range | Operator::NotRange => OperatorArity::Range,
            _ => OperatorArity::Scalar,
        }
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, Operator::Custom(_))
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}
