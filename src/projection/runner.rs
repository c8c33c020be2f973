//! Plan execution: the five-step pipeline over an abstract data source.
//!
//! 1. open the source and bind the root predicate
//! 2. fetch and materialize root rows
//! 3. fetch collections depth-ascending, one query per group in `IN`
//!    batches of at most [`IN_BATCH_SIZE`] parent ids
//! 4. apply computed fields, one batch aggregate query per
//!    `(collection path, reducer)`
//! 5. serialize root buffers to ordered nested maps
//!
//! Cancellation is cooperative: the signal is checked between steps and
//! between batches. The source is released on every exit path.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::condition::{PredicateResolver, QueryBackend};
use crate::errors::Error;
use crate::model::Pagination;
use crate::projection::errors::{DataSourceError, PlanConstructionError};
use crate::projection::plan::{CollectionPlan, ExecutionPlan};
use crate::projection::row::RowBuffer;
use crate::projection::schema::FieldSchema;
use crate::projection::source::{
    AggregateQuery, ChildQuery, DataSource, RootQuery, SelectField, SortKey,
};

/// Maximum number of parent ids per `IN` statement.
pub const IN_BATCH_SIZE: usize = 1000;

/// Cooperative cancellation signal shared between the caller and the runner.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    fn check(&self) -> Result<(), Error> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Composite ids compare as ordered value lists; this is their map key form.
fn composite_key(values: &[Value]) -> String {
    values
        .iter()
        .map(Value::to_string)
        .collect::<Vec<_>>()
        .join("\u{1}")
}

/// One materialized collection level awaiting attachment.
struct Level<'p> {
    plan: &'p CollectionPlan,
    rows: Vec<RowBuffer>,
    parent_keys: Vec<String>,
    element_keys: Vec<String>,
}

/// Execute a plan. The source is opened first and closed on every exit path.
pub fn run_plan<B, S>(
    plan: &ExecutionPlan,
    predicate: Option<&PredicateResolver<B>>,
    pagination: Option<&Pagination>,
    source: &mut S,
    cancel: &CancelToken,
) -> Result<Vec<Map<String, Value>>, Error>
where
    B: QueryBackend,
    S: DataSource<B>,
{
    source.open()?;
    let result = execute(plan, predicate, pagination, source, cancel);
    source.close();
    result
}

fn execute<B, S>(
    plan: &ExecutionPlan,
    predicate: Option<&PredicateResolver<B>>,
    pagination: Option<&Pagination>,
    source: &mut S,
    cancel: &CancelToken,
) -> Result<Vec<Map<String, Value>>, Error>
where
    B: QueryBackend,
    S: DataSource<B>,
{
    cancel.check()?;

    // Step 2: root query.
    let select_slots = plan.root_schema.select_slots();
    let query = RootQuery {
        entity: &plan.root_entity,
        select: select_fields(&plan.root_schema, &select_slots),
        predicate,
        sort: plan.root_sort.clone(),
        offset: pagination.and_then(|p| p.offset),
        limit: pagination.and_then(|p| p.size),
    };
    let fetched = source.fetch_root(&query)?;
    log::debug!(
        "root query over `{}` returned {} rows",
        plan.root_entity,
        fetched.len()
    );

    let mut root_rows: Vec<RowBuffer> = Vec::with_capacity(fetched.len());
    let mut root_keys: Vec<String> = Vec::with_capacity(fetched.len());
    for row in fetched {
        let buffer = materialize(&plan.root_schema, &select_slots, row)?;
        root_keys.push(composite_key(&buffer.values_at(&plan.root_id_slots)));
        root_rows.push(buffer);
    }
    cancel.check()?;

    // Step 3: collection queries, depth ascending.
    let mut levels: Vec<Level<'_>> = Vec::new();
    let mut level_index: HashMap<&str, usize> = HashMap::new();
    for plans in plan.collections.values() {
        for collection in plans {
            let (parent_keys, parent_ids): (&[String], Vec<Vec<Value>>) =
                match &collection.parent_path {
                    None => (
                        &root_keys,
                        root_rows
                            .iter()
                            .map(|row| row.values_at(&plan.root_id_slots))
                            .collect(),
                    ),
                    Some(parent_path) => {
                        let parent = &levels[level_index[parent_path.as_str()]];
                        (
                            &parent.element_keys,
                            parent
                                .rows
                                .iter()
                                .map(|row| row.values_at(&parent.plan.element_id_slots))
                                .collect(),
                        )
                    }
                };
            let known_parents: HashSet<&str> =
                parent_keys.iter().map(String::as_str).collect();
            let distinct_ids = dedupe_ids(parent_ids);

            let level = fetch_level(collection, &distinct_ids, &known_parents, source, cancel)?;
            level_index.insert(collection.path.as_str(), levels.len());
            levels.push(level);
        }
    }
    cancel.check()?;

    // Attach bottom-up so each level already carries its children when it
    // moves into its parent.
    let root_key_index: HashMap<&str, usize> = root_keys
        .iter()
        .enumerate()
        .map(|(index, key)| (key.as_str(), index))
        .collect();
    while let Some(level) = levels.pop() {
        let grouped = group_by_parent(level.rows, &level.parent_keys);
        let child_name = level
            .plan
            .path
            .rsplit('.')
            .next()
            .unwrap_or(level.plan.path.as_str());

        match &level.plan.parent_path {
            None => {
                attach_groups(
                    grouped,
                    level.plan,
                    child_name,
                    &plan.root_schema,
                    &mut root_rows,
                    &root_key_index,
                )?;
            }
            Some(parent_path) => {
                let parent_position = level_index[parent_path.as_str()];
                let (parent_schema, parent_key_index) = {
                    let parent = &levels[parent_position];
                    let index: HashMap<String, usize> = parent
                        .element_keys
                        .iter()
                        .enumerate()
                        .map(|(i, k)| (k.clone(), i))
                        .collect();
                    (Arc::clone(&parent.plan.schema), index)
                };
                let borrowed: HashMap<&str, usize> = parent_key_index
                    .iter()
                    .map(|(k, &v)| (k.as_str(), v))
                    .collect();
                attach_groups(
                    grouped,
                    level.plan,
                    child_name,
                    &parent_schema,
                    &mut levels[parent_position].rows,
                    &borrowed,
                )?;
            }
        }
    }

    // Step 4: computed fields.
    if !plan.computed.is_empty() {
        cancel.check()?;
        apply_computed(plan, &mut root_rows, &root_keys, source)?;
    }
    cancel.check()?;

    // Step 5: serialize.
    let excluded: HashSet<usize> = plan.dependency_only_slots.iter().copied().collect();
    Ok(root_rows.iter().map(|row| row.to_map(&excluded)).collect())
}

fn select_fields(schema: &FieldSchema, slots: &[usize]) -> Vec<SelectField> {
    slots
        .iter()
        .map(|&index| {
            let slot = schema.slot(index);
            SelectField {
                entity_path: slot.entity_path.clone(),
                alias: slot.dto_path.clone(),
            }
        })
        .collect()
}

fn materialize(
    schema: &Arc<FieldSchema>,
    select_slots: &[usize],
    row: Vec<Value>,
) -> Result<RowBuffer, Error> {
    if row.len() != select_slots.len() {
        return Err(DataSourceError::ColumnCountMismatch {
            expected: select_slots.len(),
            actual: row.len(),
        }
        .into());
    }
    let mut buffer = RowBuffer::new(Arc::clone(schema));
    for (value, &slot) in row.into_iter().zip(select_slots) {
        buffer.set(slot, value);
    }
    for (slot, _) in schema.collection_slots() {
        buffer.init_collection(*slot);
    }
    Ok(buffer)
}

fn dedupe_ids(ids: Vec<Vec<Value>>) -> Vec<Vec<Value>> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        if seen.insert(composite_key(&id)) {
            out.push(id);
        }
    }
    out
}

fn fetch_level<'p, B, S>(
    collection: &'p CollectionPlan,
    parent_ids: &[Vec<Value>],
    known_parents: &HashSet<&str>,
    source: &mut S,
    cancel: &CancelToken,
) -> Result<Level<'p>, Error>
where
    B: QueryBackend,
    S: DataSource<B>,
{
    let select_slots = collection.schema.select_slots();
    let select = select_fields(&collection.schema, &select_slots);
    let parent_ref_fields: Vec<String> = collection
        .parent_ref_slots
        .iter()
        .map(|&slot| collection.schema.slot(slot).entity_path.clone())
        .collect();
    let sort: Vec<SortKey> = collection
        .sort
        .iter()
        .map(|&(slot, direction)| SortKey {
            entity_path: collection.schema.slot(slot).entity_path.clone(),
            direction,
        })
        .collect();

    let mut level = Level {
        plan: collection,
        rows: Vec::new(),
        parent_keys: Vec::new(),
        element_keys: Vec::new(),
    };
    for batch in parent_ids.chunks(IN_BATCH_SIZE) {
        cancel.check()?;
        let query = ChildQuery {
            entity: &collection.entity,
            select: select.clone(),
            parent_ref_fields: parent_ref_fields.clone(),
            parent_ids: batch,
            sort: sort.clone(),
        };
        let fetched = source.fetch_children(&query)?;
        log::debug!(
            "collection `{}` batch of {} parents returned {} rows",
            collection.path,
            batch.len(),
            fetched.len()
        );
        for row in fetched {
            let buffer = materialize(&collection.schema, &select_slots, row)?;
            let parent_key = composite_key(&buffer.values_at(&collection.parent_ref_slots));
            if !known_parents.contains(parent_key.as_str()) {
                return Err(DataSourceError::OrphanChildRow {
                    entity: collection.entity.clone(),
                    parent_key,
                }
                .into());
            }
            level
                .element_keys
                .push(composite_key(&buffer.values_at(&collection.element_id_slots)));
            level.parent_keys.push(parent_key);
            level.rows.push(buffer);
        }
    }
    Ok(level)
}

/// Group rows by parent key, preserving arrival order within each group.
fn group_by_parent(
    rows: Vec<RowBuffer>,
    parent_keys: &[String],
) -> Vec<(String, Vec<RowBuffer>)> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<RowBuffer>> = HashMap::new();
    for (row, key) in rows.into_iter().zip(parent_keys) {
        if !groups.contains_key(key) {
            order.push(key.clone());
        }
        groups.entry(key.clone()).or_default().push(row);
    }
    order
        .into_iter()
        .map(|key| {
            let rows = groups.remove(&key).unwrap_or_default();
            (key, rows)
        })
        .collect()
}

fn attach_groups(
    grouped: Vec<(String, Vec<RowBuffer>)>,
    collection: &CollectionPlan,
    child_name: &str,
    parent_schema: &Arc<FieldSchema>,
    parent_rows: &mut [RowBuffer],
    parent_key_index: &HashMap<&str, usize>,
) -> Result<(), Error> {
    let (slot, _) = parent_schema.slot_by_dto_path(child_name).ok_or_else(|| {
        PlanConstructionError::MissingField {
            entity: collection.parent_entity.clone(),
            field: child_name.to_string(),
        }
    })?;
    let offset = collection.page.offset.unwrap_or(0) as usize;
    for (parent_key, children) in grouped {
        let Some(&parent_index) = parent_key_index.get(parent_key.as_str()) else {
            // Validated during fetch; a miss here is a key-index bug.
            continue;
        };
        let paged: Vec<RowBuffer> = match collection.page.limit {
            Some(limit) => children
                .into_iter()
                .skip(offset)
                .take(limit as usize)
                .collect(),
            None => children.into_iter().skip(offset).collect(),
        };
        parent_rows[parent_index].set_collection(slot, paged);
    }
    Ok(())
}

fn apply_computed<B, S>(
    plan: &ExecutionPlan,
    root_rows: &mut [RowBuffer],
    root_keys: &[String],
    source: &mut S,
) -> Result<(), Error>
where
    B: QueryBackend,
    S: DataSource<B>,
{
    let root_ids: Vec<Vec<Value>> = root_rows
        .iter()
        .map(|row| row.values_at(&plan.root_id_slots))
        .collect();

    // One batch aggregate query per (collection path, reducer), shared
    // across every computed field that depends on it.
    let mut aggregates: HashMap<(String, &'static str), HashMap<String, Value>> = HashMap::new();
    for computed in &plan.computed {
        for dependency in &computed.dependencies {
            let Some(spec) = &dependency.aggregate else {
                continue;
            };
            let cache_key = (spec.collection_path.clone(), spec.reducer.code());
            if aggregates.contains_key(&cache_key) {
                continue;
            }
            let parent_ref_fields: Vec<String> = spec
                .parent_id_fields
                .iter()
                .map(|id| format!("{}.{}", spec.parent_reference_field, id))
                .collect();
            let query = AggregateQuery {
                entity: &spec.entity,
                collection_path: &spec.collection_path,
                parent_ref_fields,
                parent_ids: &root_ids,
                value_field: &spec.value_field,
                reducer: spec.reducer,
            };
            let fetched = source.fetch_aggregate(&query)?;
            log::debug!(
                "aggregate {}({}) over `{}` returned {} groups",
                spec.reducer,
                spec.value_field,
                spec.collection_path,
                fetched.len()
            );
            let by_parent: HashMap<String, Value> = fetched
                .into_iter()
                .map(|row| (composite_key(&row.parent_id), row.value))
                .collect();
            aggregates.insert(cache_key, by_parent);
        }
    }

    for (row, row_key) in root_rows.iter_mut().zip(root_keys) {
        for computed in &plan.computed {
            let mut inputs = Vec::with_capacity(computed.dependencies.len());
            for dependency in &computed.dependencies {
                let value = match &dependency.aggregate {
                    Some(spec) => aggregates
                        .get(&(spec.collection_path.clone(), spec.reducer.code()))
                        .and_then(|by_parent| by_parent.get(row_key).cloned())
                        .unwrap_or_else(|| spec.reducer.empty_value()),
                    None => row
                        .get(dependency.slot as usize)
                        .cloned()
                        .unwrap_or(Value::Null),
                };
                inputs.push(value);
            }
            let value = (computed.compute)(&inputs)?;
            row.set(computed.output_slot, value);
        }
    }
    Ok(())
}
