//! End-to-end compile-pipeline scenarios: structural keys, cache sharing,
//! shorthand expansion and resolve-time semantics.

use std::sync::Arc;

use serde_json::{json, Map, Value};

use filterql::compiler::ConditionCompiler;
use filterql::condition::FilterContext;
use filterql::config::{CachePolicy, DslPolicy, FilterConfig, NullValuePolicy};
use filterql::errors::Error;
use filterql::model::{FilterRequest, FilterValue, Operator};

use crate::support::{self, definition, CountingContext, MemBackend};

fn compiler() -> ConditionCompiler<MemBackend> {
    ConditionCompiler::new(DslPolicy::defaults(), CachePolicy::default())
}

fn request(expr: &str, filters: Vec<(&str, filterql::model::FilterDefinition)>) -> FilterRequest {
    let mut builder = FilterRequest::builder().combine_with(expr);
    for (name, def) in filters {
        builder = builder.filter(name, def);
    }
    builder.build().unwrap()
}

fn row(values: Value) -> Map<String, Value> {
    match values {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Resolve a compiled request against one row.
fn matches(
    compiler: &ConditionCompiler<MemBackend>,
    context: &impl FilterContext<MemBackend>,
    req: &FilterRequest,
    config: FilterConfig,
    row_values: Value,
) -> Result<bool, Error> {
    let compiled = compiler.compile(req, context)?;
    let params = compiled.params(req, config)?;
    let resolver = context.to_resolver((**compiled.condition()).clone(), params);
    let predicate = resolver.resolve(&(), &(), &mut ()).map_err(Error::from)?;
    Ok(predicate(&row(row_values)))
}

#[test]
fn structural_key_tokens_appear_once_and_survive_value_changes() {
    let compiler = compiler();
    let expr = "(((f1)) & f2 | (!f3 & f4) & f1)";
    let before = request(
        expr,
        vec![
            ("f1", definition("A", Operator::Eq, "v")),
            ("f2", definition("B", Operator::Eq, "w")),
            ("f3", definition("C", Operator::Eq, "x")),
            ("f4", definition("A", Operator::Ne, "y")),
        ],
    );
    let after = request(
        expr,
        vec![
            ("f1", definition("A", Operator::Eq, "changed")),
            ("f2", definition("B", Operator::Eq, 99)),
            ("f3", definition("C", Operator::Eq, false)),
            ("f4", definition("A", Operator::Ne, "zz")),
        ],
    );

    let key_before = compiler.normalize_request(&before).unwrap().key;
    let key_after = compiler.normalize_request(&after).unwrap().key;
    assert_eq!(key_before, key_after);
    for token in ["A:EQ", "B:EQ", "C:EQ", "A:NE"] {
        assert_eq!(key_before.matches(token).count(), 1, "key: {key_before}");
    }
}

#[test]
fn idempotent_expression_shares_the_single_filter_key() {
    let compiler = compiler();
    let doubled = request("f1 & f1", vec![("f1", definition("A", Operator::Eq, "v"))]);
    let single = request("f1", vec![("f1", definition("A", Operator::Eq, "v"))]);
    assert_eq!(
        compiler.normalize_request(&doubled).unwrap().key,
        compiler.normalize_request(&single).unwrap().key
    );
}

#[test]
fn contradiction_compiles_to_match_nothing() {
    let compiler = compiler();
    let context = support::context();
    let req = request(
        "f1 & !f1",
        vec![("f1", definition("name", Operator::Eq, "Ada"))],
    );
    assert_eq!(
        compiler.normalize_request(&req).unwrap().key,
        "\u{22a5}"
    );
    let matched = matches(
        &compiler,
        &context,
        &req,
        FilterConfig::default(),
        json!({"name": "Ada"}),
    )
    .unwrap();
    assert!(!matched, "a contradiction must match nothing");
}

#[test]
fn duplicate_branches_collapse_to_the_conjunction_key() {
    let compiler = compiler();
    let duplicated = request(
        "(a & b) | (a & b)",
        vec![
            ("a", definition("A", Operator::Eq, "v1")),
            ("b", definition("B", Operator::Eq, "v2")),
        ],
    );
    let simple = request(
        "a & b",
        vec![
            ("a", definition("A", Operator::Eq, "v1")),
            ("b", definition("B", Operator::Eq, "v2")),
        ],
    );
    assert_eq!(
        compiler.normalize_request(&duplicated).unwrap().key,
        compiler.normalize_request(&simple).unwrap().key
    );
}

#[test]
fn equivalent_requests_share_one_cached_tree() {
    let compiler = compiler();
    let context = CountingContext::new();
    let first = request(
        "f1 & f2",
        vec![
            ("f1", definition("A", Operator::Eq, "v1")),
            ("f2", definition("B", Operator::Eq, "v2")),
        ],
    );
    let renamed = request(
        "left & right",
        vec![
            ("left", definition("A", Operator::Eq, "other")),
            ("right", definition("B", Operator::Eq, "values")),
        ],
    );

    let a = compiler.compile(&first, &context).unwrap();
    let b = compiler.compile(&renamed, &context).unwrap();
    assert_eq!(a.key(), b.key());
    assert!(Arc::ptr_eq(a.condition(), b.condition()));
    // Two leaves built once, despite two compiles.
    assert_eq!(context.calls(), 2);
    assert_eq!(compiler.cache().stats().hits, 1);
    assert_eq!(compiler.cache().stats().size, 1);
}

#[test]
fn operand_order_is_preserved_in_keys() {
    let compiler = compiler();
    let ab = request(
        "a & b",
        vec![
            ("a", definition("A", Operator::Eq, "v")),
            ("b", definition("B", Operator::Eq, "v")),
        ],
    );
    let ba = request(
        "b & a",
        vec![
            ("a", definition("A", Operator::Eq, "v")),
            ("b", definition("B", Operator::Eq, "v")),
        ],
    );
    assert_ne!(
        compiler.normalize_request(&ab).unwrap().key,
        compiler.normalize_request(&ba).unwrap().key,
        "evaluation-preserving keys keep user-visible operand order"
    );
}

#[test]
fn shorthand_and_combines_all_filters() {
    let compiler = compiler();
    let context = support::context();
    let req = request(
        "AND",
        vec![
            ("f1", definition("name", Operator::Eq, "Ada")),
            ("f2", definition("registered", Operator::Eq, "yes")),
        ],
    );
    let config = FilterConfig::default();
    assert!(matches(
        &compiler,
        &context,
        &req,
        config,
        json!({"name": "Ada", "registered": "yes"})
    )
    .unwrap());
    assert!(!matches(
        &compiler,
        &context,
        &req,
        config,
        json!({"name": "Ada", "registered": "no"})
    )
    .unwrap());
}

#[test]
fn undefined_filter_name_is_a_compile_error() {
    let compiler = compiler();
    let context = support::context();
    let req = request("f1 & ghost", vec![("f1", definition("A", Operator::Eq, "v"))]);
    let err = compiler.compile(&req, &context).unwrap_err();
    assert!(matches!(
        err,
        Error::Syntax(filterql::dsl::DslSyntaxError::UndefinedFilter { .. })
    ));
}

#[test]
fn null_value_policies_apply_at_resolve_time() {
    let compiler = compiler();
    let context = support::context();
    let req = request(
        "f1",
        vec![("f1", definition("email", Operator::Eq, FilterValue::Null))],
    );

    // Strict: resolving fails; compiling and caching already succeeded.
    let strict = FilterConfig::default();
    let err = matches(&compiler, &context, &req, strict, json!({})).unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    // Coerce: (EQ, null) behaves as IS_NULL.
    let coerce = FilterConfig {
        null_value_policy: NullValuePolicy::CoerceToIsNull,
        ..FilterConfig::default()
    };
    assert!(matches(
        &compiler,
        &context,
        &req,
        coerce,
        json!({"email": Value::Null})
    )
    .unwrap());
    assert!(!matches(
        &compiler,
        &context,
        &req,
        coerce,
        json!({"email": "set@example.com"})
    )
    .unwrap());

    // Ignore: the filter vanishes.
    let ignore = FilterConfig {
        null_value_policy: NullValuePolicy::IgnoreFilter,
        ..FilterConfig::default()
    };
    assert!(matches(
        &compiler,
        &context,
        &req,
        ignore,
        json!({"email": "anything"})
    )
    .unwrap());
}

#[test]
fn unsupported_operator_fails_lazily() {
    let compiler = compiler();
    let context = support::context();
    let spec = filterql::model::PropertySpec::new(
        "flag",
        "Customer",
        filterql::model::FieldType::Bool,
        vec![Operator::Eq],
    );
    let req = request(
        "f1",
        vec![(
            "f1",
            filterql::model::FilterDefinition::new(spec.into_ref(), Operator::Gt, true),
        )],
    );
    // Building and caching succeed; only evaluation trips the check.
    let compiled = compiler.compile(&req, &context).unwrap();
    let params = compiled.params(&req, FilterConfig::default()).unwrap();
    let resolver = context.to_resolver((**compiled.condition()).clone(), params);
    let err = resolver.resolve(&(), &(), &mut ()).unwrap_err();
    assert!(matches!(
        err,
        filterql::model::FilterValidationError::UnsupportedOperator { .. }
    ));
}

#[test]
fn empty_request_compiles_to_always_true() {
    let compiler = compiler();
    let context = support::context();
    let req = FilterRequest::builder().build().unwrap();
    let compiled = compiler.compile(&req, &context).unwrap();
    assert_eq!(compiled.key(), "\u{22a4}");
    let params = compiled.params(&req, FilterConfig::default()).unwrap();
    let resolver = context.to_resolver((**compiled.condition()).clone(), params);
    let predicate = resolver.resolve(&(), &(), &mut ()).unwrap();
    assert!(predicate(&Map::new()));
}
