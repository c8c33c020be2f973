//! The abstract data source the plan runner drives. Drivers translate these
//! query specs into whatever their backend speaks; rows come back as value
//! vectors in select-list order.

use serde_json::Value;

use crate::condition::{PredicateResolver, QueryBackend};
use crate::model::SortDirection;
use crate::projection::errors::DataSourceError;
use crate::projection::plan::Reducer;

/// One selected column: entity path in, alias out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectField {
    pub entity_path: String,
    pub alias: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub entity_path: String,
    pub direction: SortDirection,
}

/// The root scalar query. `limit: None` means unbounded: the reference
/// default fetches every matching row, callers paginate explicitly.
pub struct RootQuery<'a, B: QueryBackend> {
    pub entity: &'a str,
    pub select: Vec<SelectField>,
    pub predicate: Option<&'a PredicateResolver<B>>,
    pub sort: Vec<SortKey>,
    pub offset: Option<u64>,
    pub limit: Option<u64>,
}

/// A batched child fetch: the child schema columns (join-back parent ids are
/// aliased `_i_pid_{i}`) restricted to parents whose composite id is in
/// `parent_ids`.
#[derive(Debug, Clone)]
pub struct ChildQuery<'a> {
    pub entity: &'a str,
    pub select: Vec<SelectField>,
    /// Entity paths of the parent id columns the `IN` predicate targets.
    pub parent_ref_fields: Vec<String>,
    /// Composite parent ids, ordered value lists. At most 1000 per call.
    pub parent_ids: &'a [Vec<Value>],
    pub sort: Vec<SortKey>,
}

/// A batch aggregate over a collection path, grouped by parent id. One query
/// covers every root id of the request.
#[derive(Debug, Clone)]
pub struct AggregateQuery<'a> {
    pub entity: &'a str,
    pub collection_path: &'a str,
    pub parent_ref_fields: Vec<String>,
    pub parent_ids: &'a [Vec<Value>],
    /// Entity path of the aggregated value within the element.
    pub value_field: &'a str,
    pub reducer: Reducer,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregateRow {
    pub parent_id: Vec<Value>,
    pub value: Value,
}

/// Data-source driver. The connection is scoped to one request: `open` at
/// pipeline step 1, `close` on every exit path. Errors surface unmodified;
/// the core never retries.
pub trait DataSource<B: QueryBackend> {
    fn open(&mut self) -> Result<(), DataSourceError>;

    fn close(&mut self);

    fn fetch_root(&mut self, query: &RootQuery<'_, B>) -> Result<Vec<Vec<Value>>, DataSourceError>;

    fn fetch_children(&mut self, query: &ChildQuery<'_>)
        -> Result<Vec<Vec<Value>>, DataSourceError>;

    fn fetch_aggregate(
        &mut self,
        query: &AggregateQuery<'_>,
    ) -> Result<Vec<AggregateRow>, DataSourceError>;
}
