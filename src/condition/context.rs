use std::collections::HashMap;
use std::sync::Arc;

use crate::condition::backend::{PredicateResolver, QueryBackend};
use crate::condition::leaf::{LeafNode, LeafResolverFn};
use crate::condition::Condition;
use crate::config::FilterConfig;
use crate::model::{FilterDefinitionError, FilterValue, Operator, PropertyRef};
use crate::registry::CustomOperators;

/// Per-invocation argument table. Each `execute(resolver, params)` call sees
/// only the arguments installed on that call; this replaces the source
/// system's thread-local registry with an explicit value.
#[derive(Debug, Clone, Default)]
pub struct Arguments {
    values: HashMap<String, FilterValue>,
}

impl Arguments {
    pub fn new() -> Self {
        Arguments::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FilterValue>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&FilterValue> {
        self.values.get(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<(String, FilterValue)> for Arguments {
    fn from_iter<T: IntoIterator<Item = (String, FilterValue)>>(iter: T) -> Self {
        Arguments {
            values: iter.into_iter().collect(),
        }
    }
}

/// Everything one execution needs: the argument table plus the per-request
/// filter semantics.
#[derive(Debug, Clone, Default)]
pub struct ExecutionParams {
    pub arguments: Arguments,
    pub config: FilterConfig,
}

impl ExecutionParams {
    pub fn new(arguments: Arguments, config: FilterConfig) -> Self {
        ExecutionParams { arguments, config }
    }
}

/// Driver interface consumed by the condition builder: produce leaves for
/// `(argument key, property, operator)` triples and turn finished condition
/// trees into resolvers bound to an argument table.
pub trait FilterContext<B: QueryBackend> {
    /// Produce a leaf whose resolver reads the value bound to `arg_key` at
    /// execution time. Must fail when the operator is custom and no provider
    /// is registered for its code; must NOT fail on a null or missing value.
    fn to_condition(
        &self,
        arg_key: &str,
        property: &Arc<dyn PropertyRef>,
        operator: &Operator,
    ) -> Result<Condition<B>, FilterDefinitionError>;

    /// Bind a condition tree to one invocation's arguments.
    fn to_resolver(&self, condition: Condition<B>, params: ExecutionParams)
        -> PredicateResolver<B>;
}

/// Factory for the driver callbacks behind standard-operator leaves.
pub trait LeafFactory<B: QueryBackend>: Send + Sync {
    fn leaf(
        &self,
        property: &Arc<dyn PropertyRef>,
        operator: &Operator,
    ) -> Result<LeafResolverFn<B>, FilterDefinitionError>;
}

/// Stock [`FilterContext`]: standard operators go through the driver's
/// [`LeafFactory`], custom codes through the [`CustomOperators`] service.
pub struct StandardFilterContext<B: QueryBackend> {
    leaves: Arc<dyn LeafFactory<B>>,
    custom_operators: CustomOperators<B>,
}

impl<B: QueryBackend> StandardFilterContext<B> {
    pub fn new(leaves: Arc<dyn LeafFactory<B>>) -> Self {
        StandardFilterContext {
            leaves,
            custom_operators: CustomOperators::new(),
        }
    }

    pub fn with_custom_operators(
        leaves: Arc<dyn LeafFactory<B>>,
        custom_operators: CustomOperators<B>,
    ) -> Self {
        StandardFilterContext {
            leaves,
            custom_operators,
        }
    }

    pub fn custom_operators(&self) -> &CustomOperators<B> {
        &self.custom_operators
    }
}

impl<B: QueryBackend> FilterContext<B> for StandardFilterContext<B> {
    fn to_condition(
        &self,
        arg_key: &str,
        property: &Arc<dyn PropertyRef>,
        operator: &Operator,
    ) -> Result<Condition<B>, FilterDefinitionError> {
        let resolver = match operator {
            Operator::Custom(code) => self
                .custom_operators
                .lookup(code)
                .ok_or_else(|| FilterDefinitionError::UnknownCustomOperator {
                    code: code.clone(),
                })?
                .to_resolver(property)?,
            standard => self.leaves.leaf(property, standard)?,
        };
        Ok(Condition::Leaf(Arc::new(LeafNode::new(
            arg_key,
            Arc::clone(property),
            operator.clone(),
            resolver,
        ))))
    }

    fn to_resolver(
        &self,
        condition: Condition<B>,
        params: ExecutionParams,
    ) -> PredicateResolver<B> {
        PredicateResolver::new(move |root, query, builder| {
            condition.resolve(root, query, builder, &params.arguments, &params.config)
        })
    }
}
