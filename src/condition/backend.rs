use std::sync::Arc;

use crate::model::FilterValidationError;

/// Marker trait binding the four opaque backend types a driver works with:
/// the query root, the query object, the predicate builder and the backend
/// predicate. The combinator methods are how the core composes predicates
/// without knowing anything about their representation.
pub trait QueryBackend: 'static {
    type Root;
    type Query;
    type Builder;
    type Predicate;

    fn and(builder: &mut Self::Builder, operands: Vec<Self::Predicate>) -> Self::Predicate;
    fn or(builder: &mut Self::Builder, operands: Vec<Self::Predicate>) -> Self::Predicate;
    fn not(builder: &mut Self::Builder, operand: Self::Predicate) -> Self::Predicate;
    fn always_true(builder: &mut Self::Builder) -> Self::Predicate;
    fn always_false(builder: &mut Self::Builder) -> Self::Predicate;
}

type ResolveFn<B> = dyn Fn(
        &<B as QueryBackend>::Root,
        &<B as QueryBackend>::Query,
        &mut <B as QueryBackend>::Builder,
    ) -> Result<<B as QueryBackend>::Predicate, FilterValidationError>
    + Send
    + Sync;

/// Deferred predicate production: given the backend query context, evaluate
/// the condition tree captured at creation time. Each resolver carries its
/// own argument table, so a cached condition binds fresh values per call.
pub struct PredicateResolver<B: QueryBackend> {
    resolve_fn: Arc<ResolveFn<B>>,
}

impl<B: QueryBackend> PredicateResolver<B> {
    pub fn new<F>(resolve_fn: F) -> Self
    where
        F: Fn(&B::Root, &B::Query, &mut B::Builder) -> Result<B::Predicate, FilterValidationError>
            + Send
            + Sync
            + 'static,
    {
        PredicateResolver {
            resolve_fn: Arc::new(resolve_fn),
        }
    }

    pub fn resolve(
        &self,
        root: &B::Root,
        query: &B::Query,
        builder: &mut B::Builder,
    ) -> Result<B::Predicate, FilterValidationError> {
        (self.resolve_fn)(root, query, builder)
    }
}

impl<B: QueryBackend> Clone for PredicateResolver<B> {
    fn clone(&self) -> Self {
        PredicateResolver {
            resolve_fn: Arc::clone(&self.resolve_fn),
        }
    }
}
