//! The compile pipeline: parse, simplify, normalize, then build-or-borrow
//! the condition tree through the structural cache.

use std::collections::HashMap;
use std::sync::Arc;

use crate::cache::ConditionCache;
use crate::condition::{build_condition, Arguments, Condition, ExecutionParams, FilterContext, QueryBackend};
use crate::config::{CachePolicy, DslPolicy, FilterConfig};
use crate::dsl::{self, Token};
use crate::errors::Error;
use crate::model::{FilterRequest, FilterValidationError, FilterValue, Operator, PropertyRef};
use crate::normalize::{self, slot_alias, NormalizedFilter};
use crate::simplify::SimplifyMode;

/// A compiled request: the shared condition tree, its structural key and the
/// name-to-slot bindings needed to install argument values per execution.
pub struct CompiledFilter<B: QueryBackend> {
    condition: Arc<Condition<B>>,
    normalized: NormalizedFilter,
}

impl<B: QueryBackend> std::fmt::Debug for CompiledFilter<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledFilter")
            .field("condition", &self.condition)
            .field("normalized", &self.normalized)
            .finish()
    }
}

impl<B: QueryBackend> CompiledFilter<B> {
    pub fn condition(&self) -> &Arc<Condition<B>> {
        &self.condition
    }

    pub fn key(&self) -> &str {
        &self.normalized.key
    }

    /// Build the per-invocation argument table from the request's filter
    /// values. Filters sharing a structural slot must agree on their value;
    /// disagreement would silently drop a constraint, so it is rejected.
    pub fn arguments(&self, request: &FilterRequest) -> Result<Arguments, FilterValidationError> {
        let mut arguments = Arguments::new();
        let mut chosen: HashMap<usize, FilterValue> = HashMap::new();
        for (name, slot) in &self.normalized.bindings {
            let definition = match request.filter(name) {
                Some(definition) => definition,
                None => continue,
            };
            let value = definition.value().clone();
            match chosen.get(slot) {
                Some(existing) if *existing != value => {
                    let structural = &self.normalized.slots[*slot];
                    return Err(FilterValidationError::AmbiguousArgument {
                        property: structural.property.name().to_string(),
                        operator: structural.operator.code().to_string(),
                    });
                }
                Some(_) => {}
                None => {
                    chosen.insert(*slot, value.clone());
                    arguments.insert(slot_alias(*slot), value);
                }
            }
        }
        Ok(arguments)
    }

    /// Convenience: argument table plus filter config, ready for
    /// [`FilterContext::to_resolver`].
    pub fn params(
        &self,
        request: &FilterRequest,
        config: FilterConfig,
    ) -> Result<ExecutionParams, FilterValidationError> {
        Ok(ExecutionParams::new(self.arguments(request)?, config))
    }
}

/// Compiles filter requests into cached condition trees.
pub struct ConditionCompiler<B: QueryBackend> {
    policy: DslPolicy,
    cache: Arc<ConditionCache<B>>,
}

impl<B: QueryBackend> ConditionCompiler<B> {
    pub fn new(policy: DslPolicy, cache_policy: CachePolicy) -> Self {
        ConditionCompiler {
            policy,
            cache: Arc::new(ConditionCache::new(cache_policy)),
        }
    }

    /// Share an existing cache between compilers.
    pub fn with_cache(policy: DslPolicy, cache: Arc<ConditionCache<B>>) -> Self {
        ConditionCompiler { policy, cache }
    }

    pub fn cache(&self) -> &Arc<ConditionCache<B>> {
        &self.cache
    }

    /// Parse, simplify and normalize a request without touching the cache.
    pub fn normalize_request(&self, request: &FilterRequest) -> Result<NormalizedFilter, Error> {
        if request.filters().is_empty() {
            return Ok(trivial_normalized());
        }
        let expression = self.effective_expression(request);
        let parsed = dsl::parse(&expression, &self.policy)?;
        Ok(normalize::normalize(
            &parsed.postfix,
            request.filters(),
            SimplifyMode::EvaluationPreserving,
        )?)
    }

    /// Compile a request. Equal structural keys share one condition tree; at
    /// most one build runs per key under concurrency.
    pub fn compile(
        &self,
        request: &FilterRequest,
        context: &dyn FilterContext<B>,
    ) -> Result<CompiledFilter<B>, Error> {
        let normalized = self.normalize_request(request)?;
        log::debug!(
            "compiling `{}` under structural key `{}`",
            request.combine_with(),
            normalized.key
        );

        let definitions: Vec<(String, (Arc<dyn PropertyRef>, Operator))> = normalized
            .slots
            .iter()
            .enumerate()
            .map(|(index, slot)| {
                (
                    slot_alias(index),
                    (Arc::clone(&slot.property), slot.operator.clone()),
                )
            })
            .collect();

        let condition = self.cache.get_or_build(&normalized.key, || {
            build_condition(&normalized.postfix, &definitions, context)
        })?;

        Ok(CompiledFilter {
            condition,
            normalized,
        })
    }

    fn effective_expression(&self, request: &FilterRequest) -> String {
        let names = request.filter_names();
        dsl::expand_shorthand(request.combine_with(), &names)
            .unwrap_or_else(|| request.combine_with().to_string())
    }
}

fn trivial_normalized() -> NormalizedFilter {
    NormalizedFilter {
        key: Token::True.to_string(),
        postfix: vec![Token::True],
        slots: Vec::new(),
        bindings: Vec::new(),
    }
}
