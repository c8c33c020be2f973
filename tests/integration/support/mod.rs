//! Shared test fixtures: an in-memory query backend, a counting data
//! source, and the Customer/Order/OrderItem metadata set.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Map, Value};

use filterql::condition::{
    Condition, ExecutionParams, FilterContext, LeafFactory, LeafResolverFn, PredicateResolver,
    QueryBackend, ResolvedFilter, StandardFilterContext,
};
use filterql::model::{
    FieldType, FilterDefinition, FilterDefinitionError, FilterValue, Operator, PropertyRef,
    PropertySpec, SortDirection,
};
use filterql::projection::errors::DataSourceError;
use filterql::projection::{
    AggregateQuery, AggregateRow, ChildQuery, DataSource, Reducer, RootQuery, SelectField,
    SortKey,
};
use filterql::registry::{
    ComputedDependency, ComputedMeta, EntityMeta, FnComputationProvider, MetadataRegistry,
    PersistenceMeta, ProjectionFieldMeta, ProjectionMeta,
};

/// Predicate over one in-memory entity row.
pub struct RowPredicate(Arc<dyn Fn(&Map<String, Value>) -> bool + Send + Sync>);

impl std::fmt::Debug for RowPredicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RowPredicate(..)")
    }
}

impl Clone for RowPredicate {
    fn clone(&self) -> Self {
        RowPredicate(Arc::clone(&self.0))
    }
}

impl std::ops::Deref for RowPredicate {
    type Target = dyn Fn(&Map<String, Value>) -> bool + Send + Sync;
    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

/// In-memory backend: rows are JSON maps, predicates are closures.
pub struct MemBackend;

impl QueryBackend for MemBackend {
    type Root = ();
    type Query = ();
    type Builder = ();
    type Predicate = RowPredicate;

    fn and(_: &mut (), operands: Vec<RowPredicate>) -> RowPredicate {
        RowPredicate(Arc::new(move |row| operands.iter().all(|p| p(row))))
    }

    fn or(_: &mut (), operands: Vec<RowPredicate>) -> RowPredicate {
        RowPredicate(Arc::new(move |row| operands.iter().any(|p| p(row))))
    }

    fn not(_: &mut (), operand: RowPredicate) -> RowPredicate {
        RowPredicate(Arc::new(move |row| !operand(row)))
    }

    fn always_true(_: &mut ()) -> RowPredicate {
        RowPredicate(Arc::new(|_| true))
    }

    fn always_false(_: &mut ()) -> RowPredicate {
        RowPredicate(Arc::new(|_| false))
    }
}

fn compare(a: &Value, b: &Value) -> std::cmp::Ordering {
    use std::cmp::Ordering::*;
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Equal),
        _ => a
            .as_str()
            .unwrap_or_default()
            .cmp(b.as_str().unwrap_or_default()),
    }
}

fn matches(operator: &Operator, field: &Value, filter: &FilterValue) -> bool {
    let expected = filter.to_json();
    match operator {
        Operator::Eq => *field == expected,
        Operator::Ne => *field != expected,
        Operator::Gt => compare(field, &expected).is_gt(),
        Operator::Gte => compare(field, &expected).is_ge(),
        Operator::Lt => compare(field, &expected).is_lt(),
        Operator::Lte => compare(field, &expected).is_le(),
        Operator::Matches => match (field.as_str(), expected.as_str()) {
            (Some(haystack), Some(needle)) => haystack.contains(needle),
            _ => false,
        },
        Operator::NotMatches => !matches(&Operator::Matches, field, filter),
        Operator::In => match &expected {
            Value::Array(items) => items.contains(field),
            _ => false,
        },
        Operator::NotIn => !matches(&Operator::In, field, filter),
        Operator::IsNull => field.is_null(),
        Operator::NotNull => !field.is_null(),
        Operator::Range => match &expected {
            Value::Array(bounds) if bounds.len() == 2 => {
                compare(field, &bounds[0]).is_ge() && compare(field, &bounds[1]).is_le()
            }
            _ => false,
        },
        Operator::NotRange => !matches(&Operator::Range, field, filter),
        Operator::Custom(_) => false,
    }
}

/// Leaf factory evaluating filters against row maps keyed by entity path.
pub struct MemLeafFactory;

impl LeafFactory<MemBackend> for MemLeafFactory {
    fn leaf(
        &self,
        _property: &Arc<dyn PropertyRef>,
        _operator: &Operator,
    ) -> Result<LeafResolverFn<MemBackend>, FilterDefinitionError> {
        Ok(Arc::new(
            |_root: &(), _query: &(), _builder: &mut (), filter: &ResolvedFilter<'_>| {
                let field = filter.property.name().to_string();
                let operator = filter.operator.clone();
                let value = filter.value.clone();
                Ok(RowPredicate(Arc::new(move |row: &Map<String, Value>| {
                    let cell = row.get(&field).cloned().unwrap_or(Value::Null);
                    matches(&operator, &cell, &value)
                })))
            },
        ))
    }
}

pub fn context() -> StandardFilterContext<MemBackend> {
    StandardFilterContext::new(Arc::new(MemLeafFactory))
}

/// Context wrapper counting `to_condition` calls, with an optional build
/// delay to widen concurrency windows.
pub struct CountingContext {
    inner: StandardFilterContext<MemBackend>,
    pub to_condition_calls: Arc<AtomicUsize>,
    pub delay: Option<Duration>,
}

impl CountingContext {
    pub fn new() -> Self {
        CountingContext {
            inner: context(),
            to_condition_calls: Arc::new(AtomicUsize::new(0)),
            delay: None,
        }
    }

    pub fn with_delay(delay: Duration) -> Self {
        CountingContext {
            delay: Some(delay),
            ..Self::new()
        }
    }

    pub fn calls(&self) -> usize {
        self.to_condition_calls.load(Ordering::SeqCst)
    }
}

impl FilterContext<MemBackend> for CountingContext {
    fn to_condition(
        &self,
        arg_key: &str,
        property: &Arc<dyn PropertyRef>,
        operator: &Operator,
    ) -> Result<Condition<MemBackend>, FilterDefinitionError> {
        self.to_condition_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        self.inner.to_condition(arg_key, property, operator)
    }

    fn to_resolver(
        &self,
        condition: Condition<MemBackend>,
        params: ExecutionParams,
    ) -> PredicateResolver<MemBackend> {
        self.inner.to_resolver(condition, params)
    }
}

/// In-memory data source over flat row maps keyed by entity path, counting
/// every query it serves.
pub struct MemDataSource {
    tables: HashMap<String, Vec<Map<String, Value>>>,
    pub query_log: Vec<String>,
    pub opened: usize,
    pub closed: usize,
}

impl MemDataSource {
    pub fn new() -> Self {
        MemDataSource {
            tables: HashMap::new(),
            query_log: Vec::new(),
            opened: 0,
            closed: 0,
        }
    }

    pub fn table(mut self, entity: &str, rows: Vec<Value>) -> Self {
        let rows = rows
            .into_iter()
            .filter_map(|row| match row {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect();
        self.tables.insert(entity.to_string(), rows);
        self
    }

    pub fn query_count(&self) -> usize {
        self.query_log.len()
    }

    fn rows(&self, entity: &str) -> Result<&[Map<String, Value>], DataSourceError> {
        self.tables
            .get(entity)
            .map(Vec::as_slice)
            .ok_or_else(|| DataSourceError::backend(format!("unknown table `{entity}`")))
    }

    fn sorted(mut rows: Vec<Map<String, Value>>, sort: &[SortKey]) -> Vec<Map<String, Value>> {
        rows.sort_by(|a, b| {
            for key in sort {
                let left = a.get(&key.entity_path).cloned().unwrap_or(Value::Null);
                let right = b.get(&key.entity_path).cloned().unwrap_or(Value::Null);
                let ordering = match key.direction {
                    SortDirection::Asc => compare(&left, &right),
                    SortDirection::Desc => compare(&right, &left),
                };
                if !ordering.is_eq() {
                    return ordering;
                }
            }
            std::cmp::Ordering::Equal
        });
        rows
    }

    fn project(rows: &[Map<String, Value>], fields: &[SelectField]) -> Vec<Vec<Value>> {
        rows.iter()
            .map(|row| {
                fields
                    .iter()
                    .map(|field| row.get(&field.entity_path).cloned().unwrap_or(Value::Null))
                    .collect()
            })
            .collect()
    }
}

impl DataSource<MemBackend> for MemDataSource {
    fn open(&mut self) -> Result<(), DataSourceError> {
        self.opened += 1;
        Ok(())
    }

    fn close(&mut self) {
        self.closed += 1;
    }

    fn fetch_root(
        &mut self,
        query: &RootQuery<'_, MemBackend>,
    ) -> Result<Vec<Vec<Value>>, DataSourceError> {
        self.query_log.push(format!("root:{}", query.entity));
        let mut rows: Vec<Map<String, Value>> = self.rows(query.entity)?.to_vec();
        if let Some(resolver) = query.predicate {
            let predicate = resolver
                .resolve(&(), &(), &mut ())
                .map_err(|e| DataSourceError::backend(e.to_string()))?;
            rows.retain(|row| predicate(row));
        }
        let rows = Self::sorted(rows, &query.sort);
        let offset = query.offset.unwrap_or(0) as usize;
        let rows: Vec<Map<String, Value>> = match query.limit {
            Some(limit) => rows.into_iter().skip(offset).take(limit as usize).collect(),
            None => rows.into_iter().skip(offset).collect(),
        };
        Ok(Self::project(&rows, &query.select))
    }

    fn fetch_children(
        &mut self,
        query: &ChildQuery<'_>,
    ) -> Result<Vec<Vec<Value>>, DataSourceError> {
        self.query_log.push(format!("children:{}", query.entity));
        let wanted: Vec<Vec<Value>> = query.parent_ids.to_vec();
        let rows: Vec<Map<String, Value>> = self
            .rows(query.entity)?
            .iter()
            .filter(|row| {
                let key: Vec<Value> = query
                    .parent_ref_fields
                    .iter()
                    .map(|field| row.get(field).cloned().unwrap_or(Value::Null))
                    .collect();
                wanted.contains(&key)
            })
            .cloned()
            .collect();
        let rows = Self::sorted(rows, &query.sort);
        Ok(Self::project(&rows, &query.select))
    }

    fn fetch_aggregate(
        &mut self,
        query: &AggregateQuery<'_>,
    ) -> Result<Vec<AggregateRow>, DataSourceError> {
        self.query_log.push(format!(
            "aggregate:{}:{}",
            query.collection_path, query.reducer
        ));
        let wanted: Vec<Vec<Value>> = query.parent_ids.to_vec();
        let mut grouped: Vec<(Vec<Value>, Vec<Value>)> = Vec::new();
        for row in self.rows(query.entity)? {
            let key: Vec<Value> = query
                .parent_ref_fields
                .iter()
                .map(|field| row.get(field).cloned().unwrap_or(Value::Null))
                .collect();
            if !wanted.contains(&key) {
                continue;
            }
            let value = row.get(query.value_field).cloned().unwrap_or(Value::Null);
            match grouped.iter_mut().find(|(k, _)| *k == key) {
                Some((_, values)) => values.push(value),
                None => grouped.push((key, vec![value])),
            }
        }
        Ok(grouped
            .into_iter()
            .map(|(parent_id, values)| AggregateRow {
                parent_id,
                value: query.reducer.apply(&values),
            })
            .collect())
    }
}

// --- metadata fixtures -----------------------------------------------------

/// Register the Customer/Order/OrderItem metadata set and the computation
/// provider for `CustomerDto.total`. Call under `#[serial]` and after
/// clearing the registries.
pub fn register_shop_metadata() {
    MetadataRegistry::clear();
    filterql::registry::ComputationRegistry::clear();

    MetadataRegistry::register_entity(
        EntityMeta::new("Customer", vec!["id".to_string()])
            .field("id", PersistenceMeta::scalar())
            .field("name", PersistenceMeta::scalar())
            .field("email", PersistenceMeta::scalar())
            .field("registered", PersistenceMeta::scalar())
            .field(
                "orders",
                PersistenceMeta::collection("Order").mapped_by("customer"),
            ),
    );
    MetadataRegistry::register_entity(
        EntityMeta::new("Order", vec!["id".to_string()])
            .field("id", PersistenceMeta::scalar())
            .field("date", PersistenceMeta::scalar())
            .field("amount", PersistenceMeta::scalar())
            .field("productName", PersistenceMeta::scalar())
            .field("quantity", PersistenceMeta::scalar())
            .field("customer", PersistenceMeta::to_one("Customer"))
            .field(
                "items",
                PersistenceMeta::collection("OrderItem").mapped_by("order"),
            ),
    );
    MetadataRegistry::register_entity(
        EntityMeta::new("OrderItem", vec!["id".to_string()])
            .field("id", PersistenceMeta::scalar())
            .field("label", PersistenceMeta::scalar())
            .field("qty", PersistenceMeta::scalar())
            .field("order", PersistenceMeta::to_one("Order")),
    );

    MetadataRegistry::register_projection(
        ProjectionMeta::new("CustomerDto", "Customer")
            .field(ProjectionFieldMeta::scalar("name", "name"))
            .field(ProjectionFieldMeta::scalar("email", "email"))
            .field(ProjectionFieldMeta::scalar("registered", "registered"))
            .field(ProjectionFieldMeta::nested("orders", "orders", "OrderDto"))
            .field(ProjectionFieldMeta::computed(
                "total",
                ComputedMeta {
                    dependencies: vec![ComputedDependency::reduced(
                        "orders.amount",
                        Reducer::Sum,
                    )],
                    method: None,
                },
            )),
    );
    MetadataRegistry::register_projection(
        ProjectionMeta::new("OrderDto", "Order")
            .field(ProjectionFieldMeta::scalar("productName", "productName"))
            .field(ProjectionFieldMeta::scalar("quantity", "quantity"))
            .field(ProjectionFieldMeta::scalar("date", "date"))
            .field(ProjectionFieldMeta::scalar("amount", "amount"))
            .field(ProjectionFieldMeta::nested("items", "items", "OrderItemDto")),
    );
    MetadataRegistry::register_projection(
        ProjectionMeta::new("OrderItemDto", "OrderItem")
            .field(ProjectionFieldMeta::scalar("label", "label"))
            .field(ProjectionFieldMeta::scalar("qty", "qty")),
    );

    filterql::registry::ComputationRegistry::register(Arc::new(
        FnComputationProvider::new("shop-computations").computation(
            "CustomerDto",
            "total",
            |deps: &[Value]| Ok(deps.first().cloned().unwrap_or(Value::Null)),
        ),
    ));
}

/// Three customers; customer 1 has twelve orders for pagination tests.
pub fn seed_source() -> MemDataSource {
    let mut orders = vec![];
    for i in 0..12 {
        orders.push(json!({
            "id": 100 + i,
            "date": format!("2024-03-{:02}", i + 1),
            "amount": 10 * (i + 1),
            "productName": format!("product-{i}"),
            "quantity": i + 1,
            "customer.id": 1,
        }));
    }
    orders.push(json!({
        "id": 200, "date": "2024-01-05", "amount": 5,
        "productName": "solo", "quantity": 1, "customer.id": 2,
    }));

    MemDataSource::new()
        .table(
            "Customer",
            vec![
                json!({"id": 1, "name": "Ada", "email": "ada@example.com", "registered": true}),
                json!({"id": 2, "name": "Brian", "email": "brian@example.com", "registered": true}),
                json!({"id": 3, "name": "Cleo", "email": "cleo@example.com", "registered": false}),
            ],
        )
        .table("Order", orders)
        .table(
            "OrderItem",
            vec![
                json!({"id": 1000, "label": "bolt", "qty": 4, "order.id": 100}),
                json!({"id": 1001, "label": "nut", "qty": 2, "order.id": 100}),
                json!({"id": 1002, "label": "washer", "qty": 9, "order.id": 101}),
            ],
        )
}

// --- filter fixtures -------------------------------------------------------

pub fn property(name: &str) -> Arc<dyn PropertyRef> {
    PropertySpec::comparable(name, "Customer", FieldType::String).into_ref()
}

pub fn int_property(name: &str) -> Arc<dyn PropertyRef> {
    PropertySpec::comparable(name, "Customer", FieldType::Int).into_ref()
}

pub fn definition(
    property_name: &str,
    operator: Operator,
    value: impl Into<FilterValue>,
) -> FilterDefinition {
    FilterDefinition::new(property(property_name), operator, value)
}

pub fn typed_definition(
    property_name: &str,
    value_type: FieldType,
    operator: Operator,
    value: impl Into<FilterValue>,
) -> FilterDefinition {
    FilterDefinition::new(
        PropertySpec::comparable(property_name, "Customer", value_type).into_ref(),
        operator,
        value,
    )
}
