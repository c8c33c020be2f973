//! Execution plan types: the root schema, per-depth collection plans and
//! computed-field descriptors produced by the planner.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::SortDirection;
use crate::projection::schema::FieldSchema;
use crate::registry::ComputeFn;

/// Aggregate function applied to values reachable through a collection path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Reducer {
    Sum,
    Avg,
    Count,
    CountDistinct,
    Min,
    Max,
}

impl Reducer {
    pub fn code(&self) -> &'static str {
        match self {
            Reducer::Sum => "SUM",
            Reducer::Avg => "AVG",
            Reducer::Count => "COUNT",
            Reducer::CountDistinct => "COUNT_DISTINCT",
            Reducer::Min => "MIN",
            Reducer::Max => "MAX",
        }
    }

    pub fn parse(code: &str) -> Option<Reducer> {
        match code.to_uppercase().as_str() {
            "SUM" => Some(Reducer::Sum),
            "AVG" => Some(Reducer::Avg),
            "COUNT" => Some(Reducer::Count),
            "COUNT_DISTINCT" => Some(Reducer::CountDistinct),
            "MIN" => Some(Reducer::Min),
            "MAX" => Some(Reducer::Max),
            _ => None,
        }
    }

    /// Value reported for a parent with no child rows.
    pub fn empty_value(&self) -> Value {
        match self {
            Reducer::Count | Reducer::CountDistinct => Value::from(0),
            Reducer::Sum => Value::from(0),
            Reducer::Avg | Reducer::Min | Reducer::Max => Value::Null,
        }
    }

    /// Reference reduction over already-fetched values. Data sources usually
    /// aggregate natively; this is the shared fallback semantics.
    pub fn apply(&self, values: &[Value]) -> Value {
        let numbers = || values.iter().filter_map(Value::as_f64);
        match self {
            Reducer::Count => Value::from(values.len() as u64),
            Reducer::CountDistinct => {
                let mut seen: Vec<String> = Vec::new();
                for value in values {
                    let rendered = value.to_string();
                    if !seen.contains(&rendered) {
                        seen.push(rendered);
                    }
                }
                Value::from(seen.len() as u64)
            }
            Reducer::Sum => Value::from(numbers().sum::<f64>()),
            Reducer::Avg => {
                if values.is_empty() {
                    Value::Null
                } else {
                    Value::from(numbers().sum::<f64>() / values.len() as f64)
                }
            }
            Reducer::Min => numbers()
                .fold(None::<f64>, |acc, v| Some(acc.map_or(v, |a| a.min(v))))
                .map(Value::from)
                .unwrap_or(Value::Null),
            Reducer::Max => numbers()
                .fold(None::<f64>, |acc, v| Some(acc.map_or(v, |a| a.max(v))))
                .map(Value::from)
                .unwrap_or(Value::Null),
        }
    }
}

impl fmt::Display for Reducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Per-parent pagination of a collection, applied in memory after grouping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectionPage {
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// How one collection level is fetched and attached under its parent.
#[derive(Debug, Clone)]
pub struct CollectionPlan {
    /// Number of collection edges between the root and this collection.
    pub depth: usize,
    /// DTO path of the collection itself, e.g. `orders` or `orders.items`.
    pub path: String,
    /// Element entity.
    pub entity: String,
    pub parent_entity: String,
    /// DTO path of the parent collection; `None` when the parent is the root.
    pub parent_path: Option<String>,
    /// Field on the element entity referencing the parent.
    pub parent_reference_field: String,
    pub parent_id_fields: Vec<String>,
    pub element_id_fields: Vec<String>,
    pub schema: Arc<FieldSchema>,
    /// Slots in `schema` holding the join-back parent ids.
    pub parent_ref_slots: Vec<usize>,
    /// Slots in `schema` holding the element ids.
    pub element_id_slots: Vec<usize>,
    pub page: CollectionPage,
    /// Pre-resolved sort slots and directions.
    pub sort: Vec<(usize, SortDirection)>,
}

/// Everything an aggregate dependency needs at run time.
#[derive(Debug, Clone)]
pub struct AggregateSpec {
    pub collection_path: String,
    /// Element entity the aggregate runs over.
    pub entity: String,
    pub parent_reference_field: String,
    pub parent_id_fields: Vec<String>,
    /// Entity path of the aggregated value within the element.
    pub value_field: String,
    pub reducer: Reducer,
}

/// One dependency of a computed field. Reducer dependencies carry slot `-1`
/// and resolve through a batch aggregate query keyed by root id.
#[derive(Debug, Clone)]
pub struct DependencySlot {
    pub path: String,
    pub slot: i64,
    pub aggregate: Option<AggregateSpec>,
}

/// A computed DTO field: output slot, dependencies and the resolved callable.
#[derive(Clone)]
pub struct ComputedFieldPlan {
    pub dto_field: String,
    pub output_slot: usize,
    pub dependencies: Vec<DependencySlot>,
    pub compute: ComputeFn,
}

impl fmt::Debug for ComputedFieldPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputedFieldPlan")
            .field("dto_field", &self.dto_field)
            .field("output_slot", &self.output_slot)
            .field("dependencies", &self.dependencies)
            .finish()
    }
}

/// The layered projection plan: root scalar schema, collection fetches by
/// ascending depth and computed-field transforms.
#[derive(Debug)]
pub struct ExecutionPlan {
    pub dto: String,
    pub root_entity: String,
    pub root_schema: Arc<FieldSchema>,
    /// Root id slot indices, for keying materialized rows.
    pub root_id_slots: Vec<usize>,
    /// Pre-resolved root ordering from the request's pagination.
    pub root_sort: Vec<crate::projection::source::SortKey>,
    pub collections: BTreeMap<usize, Vec<CollectionPlan>>,
    pub computed: Vec<ComputedFieldPlan>,
    /// Root slots selected only to feed computations; excluded from output.
    pub dependency_only_slots: Vec<usize>,
}

impl ExecutionPlan {
    /// Total number of collection fetch groups.
    pub fn collection_group_count(&self) -> usize {
        self.collections.values().map(Vec::len).sum()
    }

    /// One-line summary for logs.
    pub fn describe(&self) -> String {
        format!(
            "plan[{}<-{}]: {} root slots, {} collection groups, {} computed fields",
            self.dto,
            self.root_entity,
            self.root_schema.len(),
            self.collection_group_count(),
            self.computed.len()
        )
    }

    pub fn collection(&self, path: &str) -> Option<&CollectionPlan> {
        self.collections
            .values()
            .flatten()
            .find(|plan| plan.path == path)
    }

    /// Indented multi-line rendering of the plan layers, for TRACE logs.
    pub fn explain(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "Root {} ({} slots, ids {:?})\n",
            self.root_entity,
            self.root_schema.len(),
            self.root_id_slots
        ));
        for (depth, plans) in &self.collections {
            for plan in plans {
                let indent = "  ".repeat(*depth);
                out.push_str(&format!(
                    "{indent}Collection {} <- {} via {} ({} slots{}{})\n",
                    plan.path,
                    plan.entity,
                    plan.parent_reference_field,
                    plan.schema.len(),
                    plan.page
                        .limit
                        .map(|l| format!(", limit {l}"))
                        .unwrap_or_default(),
                    if plan.sort.is_empty() { "" } else { ", sorted" },
                ));
            }
        }
        for computed in &self.computed {
            let reducers: Vec<String> = computed
                .dependencies
                .iter()
                .filter_map(|d| d.aggregate.as_ref())
                .map(|a| format!("{}({})", a.reducer, a.value_field))
                .collect();
            out.push_str(&format!(
                "Computed {} <- {} deps{}\n",
                computed.dto_field,
                computed.dependencies.len(),
                if reducers.is_empty() {
                    String::new()
                } else {
                    format!(" [{}]", reducers.join(", "))
                }
            ));
        }
        out
    }
}
