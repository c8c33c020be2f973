//! Composable predicate trees over an opaque query backend.
//!
//! A [`Condition`] is an immutable tree of boolean combinators over deferred
//! backend predicates. Trees are built once per structural cache key and
//! shared; values bind at resolve time through the per-call argument table.

pub mod backend;
pub mod builder;
pub mod context;
pub mod leaf;

pub use backend::{PredicateResolver, QueryBackend};
pub use builder::build_condition;
pub use context::{
    Arguments, ExecutionParams, FilterContext, LeafFactory, StandardFilterContext,
};
pub use leaf::{LeafNode, LeafResolverFn, ResolvedFilter};

use std::fmt;
use std::sync::Arc;

use crate::config::FilterConfig;
use crate::model::FilterValidationError;

/// Predicate tree variants. Deep condition inheritance in comparable systems
/// collapses to these tags; dispatch is a match, not a vtable.
pub enum Condition<B: QueryBackend> {
    Leaf(Arc<LeafNode<B>>),
    And(Vec<Condition<B>>),
    Or(Vec<Condition<B>>),
    Not(Box<Condition<B>>),
    AlwaysTrue,
    AlwaysFalse,
}

impl<B: QueryBackend> Condition<B> {
    /// Conjunction. Flattens nested `And` nodes and folds constants.
    pub fn and(self, other: Condition<B>) -> Condition<B> {
        match (self, other) {
            (Condition::AlwaysFalse, _) | (_, Condition::AlwaysFalse) => Condition::AlwaysFalse,
            (Condition::AlwaysTrue, other) => other,
            (this, Condition::AlwaysTrue) => this,
            (Condition::And(mut left), Condition::And(right)) => {
                left.extend(right);
                Condition::And(left)
            }
            (Condition::And(mut left), right) => {
                left.push(right);
                Condition::And(left)
            }
            (left, Condition::And(mut right)) => {
                right.insert(0, left);
                Condition::And(right)
            }
            (left, right) => Condition::And(vec![left, right]),
        }
    }

    /// Disjunction. Flattens nested `Or` nodes and folds constants.
    pub fn or(self, other: Condition<B>) -> Condition<B> {
        match (self, other) {
            (Condition::AlwaysTrue, _) | (_, Condition::AlwaysTrue) => Condition::AlwaysTrue,
            (Condition::AlwaysFalse, other) => other,
            (this, Condition::AlwaysFalse) => this,
            (Condition::Or(mut left), Condition::Or(right)) => {
                left.extend(right);
                Condition::Or(left)
            }
            (Condition::Or(mut left), right) => {
                left.push(right);
                Condition::Or(left)
            }
            (left, Condition::Or(mut right)) => {
                right.insert(0, left);
                Condition::Or(right)
            }
            (left, right) => Condition::Or(vec![left, right]),
        }
    }

    /// Negation. Constants flip; everything else wraps.
    pub fn negate(self) -> Condition<B> {
        match self {
            Condition::AlwaysTrue => Condition::AlwaysFalse,
            Condition::AlwaysFalse => Condition::AlwaysTrue,
            Condition::Not(inner) => *inner,
            other => Condition::Not(Box::new(other)),
        }
    }

    /// Evaluate the tree into a backend predicate. Only leaves can fail, and
    /// only with validation errors under the request's filter config.
    pub fn resolve(
        &self,
        root: &B::Root,
        query: &B::Query,
        builder: &mut B::Builder,
        arguments: &Arguments,
        config: &FilterConfig,
    ) -> Result<B::Predicate, FilterValidationError> {
        match self {
            Condition::Leaf(leaf) => leaf.resolve(root, query, builder, arguments, config),
            Condition::And(operands) => {
                let mut resolved = Vec::with_capacity(operands.len());
                for operand in operands {
                    resolved.push(operand.resolve(root, query, builder, arguments, config)?);
                }
                Ok(B::and(builder, resolved))
            }
            Condition::Or(operands) => {
                let mut resolved = Vec::with_capacity(operands.len());
                for operand in operands {
                    resolved.push(operand.resolve(root, query, builder, arguments, config)?);
                }
                Ok(B::or(builder, resolved))
            }
            Condition::Not(inner) => {
                let operand = inner.resolve(root, query, builder, arguments, config)?;
                Ok(B::not(builder, operand))
            }
            Condition::AlwaysTrue => Ok(B::always_true(builder)),
            Condition::AlwaysFalse => Ok(B::always_false(builder)),
        }
    }

    /// Structural rendering for logs and tests.
    pub fn shape(&self) -> String {
        match self {
            Condition::Leaf(leaf) => format!("leaf({:?})", leaf),
            Condition::And(operands) => format!(
                "and({})",
                operands.iter().map(Condition::shape).collect::<Vec<_>>().join(", ")
            ),
            Condition::Or(operands) => format!(
                "or({})",
                operands.iter().map(Condition::shape).collect::<Vec<_>>().join(", ")
            ),
            Condition::Not(inner) => format!("not({})", inner.shape()),
            Condition::AlwaysTrue => "true".to_string(),
            Condition::AlwaysFalse => "false".to_string(),
        }
    }
}

impl<B: QueryBackend> Clone for Condition<B> {
    fn clone(&self) -> Self {
        match self {
            Condition::Leaf(leaf) => Condition::Leaf(Arc::clone(leaf)),
            Condition::And(operands) => Condition::And(operands.clone()),
            Condition::Or(operands) => Condition::Or(operands.clone()),
            Condition::Not(inner) => Condition::Not(inner.clone()),
            Condition::AlwaysTrue => Condition::AlwaysTrue,
            Condition::AlwaysFalse => Condition::AlwaysFalse,
        }
    }
}

impl<B: QueryBackend> fmt::Debug for Condition<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.shape())
    }
}
