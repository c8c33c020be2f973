//! Projection planning and execution against the in-memory shop fixtures:
//! batched collection fetches, per-parent pagination, computed aggregates,
//! query counting (no N+1) and cancellation.

use serial_test::serial;

use serde_json::{json, Value};

use filterql::compiler::ConditionCompiler;
use filterql::config::{CachePolicy, DslPolicy, FilterConfig, ProjectionPolicy};
use filterql::errors::Error;
use filterql::executor::QueryExecutor;
use filterql::model::{FilterRequest, Operator, Pagination, SortSpec};
use filterql::projection::{CancelToken, ProjectionPlanner};

use crate::support::{
    self, register_shop_metadata, seed_source, typed_definition, MemBackend,
};

fn executor() -> QueryExecutor<MemBackend> {
    QueryExecutor::new(
        ConditionCompiler::new(DslPolicy::defaults(), CachePolicy::default()),
        ProjectionPolicy::default(),
        FilterConfig::default(),
    )
}

fn registered_request(paths: &[&str]) -> FilterRequest {
    FilterRequest::builder()
        .filter(
            "active",
            typed_definition(
                "registered",
                filterql::model::FieldType::Bool,
                Operator::Eq,
                true,
            ),
        )
        .combine_with("active")
        .projection(paths.iter().map(|s| s.to_string()).collect())
        .build()
        .unwrap()
}

#[test]
#[serial]
fn nested_collection_projection_runs_two_queries() {
    register_shop_metadata();
    let mut source = seed_source();
    let executor = executor();
    let context = support::context();
    let cancel = CancelToken::new();

    let request = registered_request(&[
        "name",
        "email",
        "orders[limit=10,sort=date:desc].(productName, quantity)",
    ]);
    let rows = executor
        .execute(&request, "CustomerDto", &context, &mut source, &cancel)
        .unwrap();

    // Exactly root + one depth-1 collection query.
    assert_eq!(source.query_count(), 2, "log: {:?}", source.query_log);
    assert_eq!(source.opened, 1);
    assert_eq!(source.closed, 1);

    // Two registered customers, each with a nested orders list.
    assert_eq!(rows.len(), 2);
    let ada = rows
        .iter()
        .find(|r| r.get("name") == Some(&json!("Ada")))
        .unwrap();
    let orders = ada.get("orders").and_then(Value::as_array).unwrap();
    assert_eq!(orders.len(), 10, "per-parent limit applies in memory");
    let products: Vec<&str> = orders
        .iter()
        .filter_map(|o| o.get("productName"))
        .filter_map(Value::as_str)
        .collect();
    // Twelve orders sorted by date:desc, capped at ten.
    let expected: Vec<String> = (2..=11).rev().map(|i| format!("product-{i}")).collect();
    assert_eq!(products, expected, "orders honor date:desc and the limit");
    // Hidden join-back, id and sort-only columns never serialize.
    assert!(orders.iter().all(|o| o.get("_i_pid_0").is_none()));
    assert!(orders.iter().all(|o| o.get("id").is_none()));
    assert!(orders.iter().all(|o| o.get("date").is_none()));

    let brian = rows
        .iter()
        .find(|r| r.get("name") == Some(&json!("Brian")))
        .unwrap();
    assert_eq!(
        brian.get("orders").and_then(Value::as_array).map(Vec::len),
        Some(1)
    );
}

#[test]
#[serial]
fn computed_aggregate_runs_one_batch_query() {
    register_shop_metadata();
    let mut source = seed_source();
    let executor = executor();
    let context = support::context();
    let cancel = CancelToken::new();

    let request = registered_request(&["name", "total"]);
    let rows = executor
        .execute(&request, "CustomerDto", &context, &mut source, &cancel)
        .unwrap();

    // Root query plus a single SUM aggregate, nothing per-row.
    assert_eq!(source.query_count(), 2, "log: {:?}", source.query_log);
    assert!(source.query_log[1].starts_with("aggregate:orders:SUM"));

    let ada = rows
        .iter()
        .find(|r| r.get("name") == Some(&json!("Ada")))
        .unwrap();
    // 10 + 20 + ... + 120
    assert_eq!(ada.get("total").and_then(Value::as_f64), Some(780.0));
    let brian = rows
        .iter()
        .find(|r| r.get("name") == Some(&json!("Brian")))
        .unwrap();
    assert_eq!(brian.get("total").and_then(Value::as_f64), Some(5.0));
}

#[test]
#[serial]
fn query_count_is_one_plus_depths_plus_reducers() {
    register_shop_metadata();
    let mut source = seed_source();
    let executor = executor();
    let context = support::context();
    let cancel = CancelToken::new();

    // Two collection depths (orders, orders.items) and one reducer.
    let request = registered_request(&[
        "name",
        "orders.productName",
        "orders.items.(label, qty)",
        "total",
    ]);
    let rows = executor
        .execute(&request, "CustomerDto", &context, &mut source, &cancel)
        .unwrap();

    assert_eq!(source.query_count(), 4, "log: {:?}", source.query_log);

    let ada = rows
        .iter()
        .find(|r| r.get("name") == Some(&json!("Ada")))
        .unwrap();
    let orders = ada.get("orders").and_then(Value::as_array).unwrap();
    let first = orders
        .iter()
        .find(|o| o.get("productName") == Some(&json!("product-0")))
        .unwrap();
    let items = first.get("items").and_then(Value::as_array).unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].get("label"), Some(&json!("bolt")));
}

#[test]
#[serial]
fn root_sort_and_pagination_apply() {
    register_shop_metadata();
    let mut source = seed_source();
    let executor = executor();
    let context = support::context();
    let cancel = CancelToken::new();

    let request = FilterRequest::builder()
        .filter(
            "any",
            typed_definition(
                "name",
                filterql::model::FieldType::String,
                Operator::NotNull,
                filterql::model::FilterValue::Null,
            ),
        )
        .combine_with("any")
        .projection(vec!["name".to_string()])
        .pagination(Pagination {
            offset: Some(1),
            size: Some(1),
            sort: vec![SortSpec::asc("name")],
        })
        .build()
        .unwrap();

    let rows = executor
        .execute(&request, "CustomerDto", &context, &mut source, &cancel)
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("name"), Some(&json!("Brian")));
}

#[test]
#[serial]
fn compact_notation_expands_to_nested_maps() {
    register_shop_metadata();
    let mut source = seed_source();
    let executor = executor();
    let context = support::context();
    let cancel = CancelToken::new();

    let request = registered_request(&["name", "orders[limit=1].(productName, amount)"]);
    let rows = executor
        .execute(&request, "CustomerDto", &context, &mut source, &cancel)
        .unwrap();
    let ada = rows
        .iter()
        .find(|r| r.get("name") == Some(&json!("Ada")))
        .unwrap();
    let orders = ada.get("orders").and_then(Value::as_array).unwrap();
    assert_eq!(orders.len(), 1);
    assert!(orders[0].get("productName").is_some());
    assert!(orders[0].get("amount").is_some());
}

#[test]
#[serial]
fn plan_errors_are_fatal() {
    register_shop_metadata();
    let planner = ProjectionPlanner::new(ProjectionPolicy::default());

    // Unknown DTO.
    let err = planner
        .plan("GhostDto", &["name".to_string()], None)
        .unwrap_err();
    assert!(matches!(err, Error::Plan(_)));

    // Unknown field is a projection-definition error.
    let err = planner
        .plan("CustomerDto", &["nope".to_string()], None)
        .unwrap_err();
    assert!(matches!(err, Error::Projection(_)));

    // Collection options on a scalar field.
    let err = planner
        .plan("CustomerDto", &["name[limit=3]".to_string()], None)
        .unwrap_err();
    assert!(matches!(err, Error::Projection(_)));

    // Unknown sort field inside a collection.
    let err = planner
        .plan(
            "CustomerDto",
            &["orders[sort=ghost:desc].productName".to_string()],
            None,
        )
        .unwrap_err();
    assert!(matches!(err, Error::Plan(_)));
}

#[test]
#[serial]
fn unresolvable_computation_lists_searched_providers() {
    register_shop_metadata();
    filterql::registry::ComputationRegistry::clear();
    filterql::registry::ComputationRegistry::register(std::sync::Arc::new(
        filterql::registry::FnComputationProvider::new("only-provider"),
    ));

    let planner = ProjectionPlanner::new(ProjectionPolicy::default());
    let err = planner
        .plan("CustomerDto", &["total".to_string()], None)
        .unwrap_err();
    match err {
        Error::Computation(inner) => {
            assert_eq!(inner.searched, vec!["only-provider".to_string()]);
        }
        other => panic!("expected a computation error, got {other:?}"),
    }
}

#[test]
#[serial]
fn cancellation_stops_the_pipeline_and_releases_the_source() {
    register_shop_metadata();
    let mut source = seed_source();
    let executor = executor();
    let context = support::context();
    let cancel = CancelToken::new();
    cancel.cancel();

    let request = registered_request(&["name"]);
    let err = executor
        .execute(&request, "CustomerDto", &context, &mut source, &cancel)
        .unwrap_err();
    assert_eq!(err, Error::Cancelled);
    assert_eq!(source.opened, 1);
    assert_eq!(source.closed, 1, "the source is released on error paths");
    assert_eq!(source.query_count(), 0);
}

#[test]
#[serial]
fn plan_structure_matches_the_request() {
    register_shop_metadata();
    let planner = ProjectionPlanner::new(ProjectionPolicy::default());
    let plan = planner
        .plan(
            "CustomerDto",
            &[
                "name".to_string(),
                "orders[limit=10,sort=date:desc].(productName, quantity)".to_string(),
                "total".to_string(),
            ],
            None,
        )
        .unwrap();

    assert_eq!(plan.root_entity, "Customer");
    assert_eq!(plan.collection_group_count(), 1);
    let orders = plan.collection("orders").unwrap();
    assert_eq!(orders.depth, 1);
    assert_eq!(orders.parent_reference_field, "customer");
    assert_eq!(orders.page.limit, Some(10));
    assert_eq!(orders.sort.len(), 1);

    assert_eq!(plan.computed.len(), 1);
    let total = &plan.computed[0];
    assert_eq!(total.dependencies.len(), 1);
    assert_eq!(total.dependencies[0].slot, -1);
    let aggregate = total.dependencies[0].aggregate.as_ref().unwrap();
    assert_eq!(aggregate.collection_path, "orders");
    assert_eq!(aggregate.value_field, "amount");

    // Root id is selected but internal.
    let (id_slot, _) = plan.root_schema.slot_by_dto_path("id").unwrap();
    assert!(plan.root_schema.slot(id_slot).internal);

    let explained = plan.explain();
    assert!(explained.contains("Root Customer"));
    assert!(explained.contains("Collection orders <- Order via customer"));
    assert!(explained.contains("Computed total <- 1 deps [SUM(amount)]"));
}
