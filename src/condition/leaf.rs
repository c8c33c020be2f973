use std::fmt;
use std::sync::Arc;

use crate::condition::backend::QueryBackend;
use crate::condition::context::Arguments;
use crate::config::{FilterConfig, NullValuePolicy};
use crate::model::{
    FilterValidationError, FilterValue, Operator, OperatorArity, PropertyRef,
};

/// The filter a leaf hands to its driver callback once validation and
/// coercion have run: effective operator (after any null-policy rewrite) and
/// the coerced value.
pub struct ResolvedFilter<'a> {
    pub property: &'a Arc<dyn PropertyRef>,
    pub operator: Operator,
    pub value: FilterValue,
}

/// Driver callback producing a backend predicate for one resolved filter.
pub type LeafResolverFn<B> = Arc<
    dyn Fn(
            &<B as QueryBackend>::Root,
            &<B as QueryBackend>::Query,
            &mut <B as QueryBackend>::Builder,
            &ResolvedFilter<'_>,
        ) -> Result<<B as QueryBackend>::Predicate, FilterValidationError>
        + Send
        + Sync,
>;

/// A condition leaf: one `(argument key, property, operator)` triple plus the
/// driver callback that realizes it. The value is read from the per-call
/// argument table at resolve time; nothing here fails while the condition is
/// built or cached.
pub struct LeafNode<B: QueryBackend> {
    pub(crate) arg_key: String,
    pub(crate) property: Arc<dyn PropertyRef>,
    pub(crate) operator: Operator,
    pub(crate) resolver: LeafResolverFn<B>,
}

impl<B: QueryBackend> LeafNode<B> {
    pub fn new(
        arg_key: impl Into<String>,
        property: Arc<dyn PropertyRef>,
        operator: Operator,
        resolver: LeafResolverFn<B>,
    ) -> Self {
        LeafNode {
            arg_key: arg_key.into(),
            property,
            operator,
            resolver,
        }
    }

    pub fn arg_key(&self) -> &str {
        &self.arg_key
    }

    /// Resolve the leaf: read the argument value, apply the null-value
    /// policy, validate operator support and arity, coerce, then delegate to
    /// the driver callback.
    pub fn resolve(
        &self,
        root: &B::Root,
        query: &B::Query,
        builder: &mut B::Builder,
        arguments: &Arguments,
        config: &FilterConfig,
    ) -> Result<B::Predicate, FilterValidationError> {
        // A missing key behaves as a null value and flows into the policy.
        let raw = arguments
            .get(&self.arg_key)
            .cloned()
            .unwrap_or(FilterValue::Null);

        let (operator, value) = if raw.is_null() && self.operator.requires_value() {
            match config.null_value_policy {
                NullValuePolicy::StrictException => {
                    return Err(FilterValidationError::NullValue {
                        property: self.property.name().to_string(),
                        operator: self.operator.code().to_string(),
                    })
                }
                NullValuePolicy::CoerceToIsNull => match self.operator {
                    Operator::Eq => (Operator::IsNull, FilterValue::Null),
                    Operator::Ne => (Operator::NotNull, FilterValue::Null),
                    _ => {
                        return Err(FilterValidationError::NullValue {
                            property: self.property.name().to_string(),
                            operator: self.operator.code().to_string(),
                        })
                    }
                },
                NullValuePolicy::IgnoreFilter => return Ok(B::always_true(builder)),
            }
        } else {
            (self.operator.clone(), raw)
        };

        if !self.property.supports(&operator) {
            return Err(FilterValidationError::UnsupportedOperator {
                property: self.property.name().to_string(),
                operator: operator.code().to_string(),
            });
        }

        let value = coerce_for_operator(&self.property, &operator, value, config)?;
        (self.resolver)(
            root,
            query,
            builder,
            &ResolvedFilter {
                property: &self.property,
                operator,
                value,
            },
        )
    }
}

impl<B: QueryBackend> fmt::Debug for LeafNode<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LeafNode({} {} @{})",
            self.property.name(),
            self.operator.code(),
            self.arg_key
        )
    }
}

/// Arity-aware coercion against the property's declared type. Custom
/// operators pass their value through untouched; the provider owns its
/// semantics.
fn coerce_for_operator(
    property: &Arc<dyn PropertyRef>,
    operator: &Operator,
    value: FilterValue,
    config: &FilterConfig,
) -> Result<FilterValue, FilterValidationError> {
    if operator.is_custom() || !operator.requires_value() {
        return Ok(value);
    }
    let name = property.name();
    let ty = property.value_type();

    match operator.arity() {
        OperatorArity::Scalar => match value {
            FilterValue::List(_) | FilterValue::Range(_, _) => {
                Err(FilterValidationError::Arity {
                    property: name.to_string(),
                    operator: operator.code().to_string(),
                    expected: "a scalar value".to_string(),
                    actual: value.kind().to_string(),
                })
            }
            scalar => scalar.coerce(name, ty, config),
        },
        OperatorArity::Collection => match value {
            FilterValue::List(items) => {
                let coerced = items
                    .into_iter()
                    .map(|item| item.coerce(name, ty, config))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(FilterValue::List(coerced))
            }
            other => Err(FilterValidationError::Arity {
                property: name.to_string(),
                operator: operator.code().to_string(),
                expected: "a collection of values".to_string(),
                actual: other.kind().to_string(),
            }),
        },
        OperatorArity::Range => match value {
            FilterValue::Range(low, high) => Ok(FilterValue::Range(
                Box::new(low.coerce(name, ty, config)?),
                Box::new(high.coerce(name, ty, config)?),
            )),
            FilterValue::List(items) if items.len() == 2 => {
                // Two-element lists are accepted as ranges for convenience.
                let mut coerced = items
                    .into_iter()
                    .map(|item| item.coerce(name, ty, config))
                    .collect::<Result<Vec<_>, _>>()?;
                let high = coerced.pop();
                match (coerced.pop(), high) {
                    (Some(low), Some(high)) => {
                        Ok(FilterValue::Range(Box::new(low), Box::new(high)))
                    }
                    _ => Err(FilterValidationError::Arity {
                        property: name.to_string(),
                        operator: operator.code().to_string(),
                        expected: "exactly two range bounds".to_string(),
                        actual: "list".to_string(),
                    }),
                }
            }
            other => Err(FilterValidationError::Arity {
                property: name.to_string(),
                operator: operator.code().to_string(),
                expected: "exactly two range bounds".to_string(),
                actual: other.kind().to_string(),
            }),
        },
    }
}
