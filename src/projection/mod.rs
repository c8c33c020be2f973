//! Projection planning and execution: from a requested set of DTO field
//! paths to a layered, batched multi-query plan run against an abstract data
//! source.

pub mod errors;
pub mod fields;
pub mod plan;
pub mod planner;
pub mod row;
pub mod runner;
pub mod schema;
pub mod source;

pub use fields::{CollectionOptions, ExpandedPaths};
pub use plan::{
    AggregateSpec, CollectionPage, CollectionPlan, ComputedFieldPlan, DependencySlot,
    ExecutionPlan, Reducer,
};
pub use planner::ProjectionPlanner;
pub use row::RowBuffer;
pub use runner::{run_plan, CancelToken, IN_BATCH_SIZE};
pub use schema::{FieldSchema, FieldSchemaBuilder, FieldSlot, SlotKind};
pub use source::{
    AggregateQuery, AggregateRow, ChildQuery, DataSource, RootQuery, SelectField, SortKey,
};
