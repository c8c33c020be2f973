use thiserror::Error;

/// Errors raised while assembling filter definitions and requests, or while
/// resolving a definition against the operator registries.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FilterDefinitionError {
    #[error("filters are present but `combine_with` is blank")]
    MissingExpression,

    #[error("`combine_with` is set but the request has no filters")]
    ExpressionWithoutFilters,

    #[error("duplicate filter name `{name}`")]
    DuplicateFilter { name: String },

    #[error("no custom operator provider registered for code `{code}`")]
    UnknownCustomOperator { code: String },

    #[error("filter context returned no condition for `{name}`")]
    EmptyCondition { name: String },
}

/// Resolve-time validation errors. These surface only when a compiled
/// condition is actually evaluated, never while building or caching it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FilterValidationError {
    #[error("operator {operator} is not supported by property `{property}`")]
    UnsupportedOperator { property: String, operator: String },

    #[error("null value for operator {operator} on property `{property}`")]
    NullValue { property: String, operator: String },

    #[error("cannot coerce {actual} to {expected} for property `{property}`")]
    Coercion {
        property: String,
        expected: String,
        actual: String,
    },

    #[error("operator {operator} on `{property}` expects {expected}, got {actual}")]
    Arity {
        property: String,
        operator: String,
        expected: String,
        actual: String,
    },

    #[error(
        "filters bound to the same structural slot carry different values \
         (property `{property}`, operator {operator})"
    )]
    AmbiguousArgument { property: String, operator: String },
}
