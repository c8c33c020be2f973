//! Quantified properties over random expressions and filter maps:
//! normalizer value- and name-independence, simplifier fixed point and
//! boolean equivalence.

use std::collections::HashMap;

use proptest::prelude::*;

use filterql::config::DslPolicy;
use filterql::dsl;
use filterql::model::{FilterDefinition, FilterValue, Operator};
use filterql::normalize;
use filterql::simplify::{self, BoolExpr, SimplifyMode};

use crate::support::definition;

const IDENTS: [&str; 4] = ["f1", "f2", "f3", "f4"];
const PROPS: [&str; 3] = ["A", "B", "C"];
const OPS: [fn() -> Operator; 4] = [
    || Operator::Eq,
    || Operator::Ne,
    || Operator::Gt,
    || Operator::In,
];

/// Random boolean expression over the fixed identifier set.
fn arb_expression() -> impl Strategy<Value = String> {
    let leaf = prop::sample::select(IDENTS.to_vec()).prop_map(str::to_string);
    leaf.prop_recursive(4, 24, 2, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone()).prop_map(|(a, b)| format!("({a} & {b})")),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| format!("({a} | {b})")),
            inner.prop_map(|a| format!("!({a})")),
        ]
    })
}

/// Random `(property, operator)` assignment for every identifier.
fn arb_structure() -> impl Strategy<Value = Vec<(usize, usize)>> {
    prop::collection::vec((0..PROPS.len(), 0..OPS.len()), IDENTS.len())
}

fn filters_with_values(
    structure: &[(usize, usize)],
    values: &[i64],
) -> Vec<(String, FilterDefinition)> {
    IDENTS
        .iter()
        .zip(structure)
        .zip(values)
        .map(|((name, (prop, op)), value)| {
            let operator = OPS[*op]();
            let value = if operator.supports_multiple_values() {
                FilterValue::List(vec![FilterValue::Int(*value)])
            } else {
                FilterValue::Int(*value)
            };
            (
                name.to_string(),
                definition(PROPS[*prop], operator, value),
            )
        })
        .collect()
}

fn key_of(expression: &str, filters: &[(String, FilterDefinition)]) -> String {
    let parsed = dsl::parse(expression, &DslPolicy::relaxed()).unwrap();
    normalize::normalize(&parsed.postfix, filters, SimplifyMode::EvaluationPreserving)
        .unwrap()
        .key
}

proptest! {
    /// P1: requests that agree on every (name -> (property, operator)) pair
    /// and on the expression normalize identically whatever their values.
    #[test]
    fn normalizer_is_value_independent(
        expression in arb_expression(),
        structure in arb_structure(),
        values_a in prop::collection::vec(0i64..100, IDENTS.len()),
        values_b in prop::collection::vec(0i64..100, IDENTS.len()),
    ) {
        let filters_a = filters_with_values(&structure, &values_a);
        let filters_b = filters_with_values(&structure, &values_b);
        prop_assert_eq!(key_of(&expression, &filters_a), key_of(&expression, &filters_b));
    }

    /// P2: bijectively renaming filter keys (and the expression) preserves
    /// the key.
    #[test]
    fn normalizer_is_name_independent(
        expression in arb_expression(),
        structure in arb_structure(),
        values in prop::collection::vec(0i64..100, IDENTS.len()),
    ) {
        let filters = filters_with_values(&structure, &values);
        let renamed_expression = IDENTS
            .iter()
            .fold(expression.clone(), |acc, name| {
                acc.replace(name, &format!("{name}_renamed"))
            });
        let renamed_filters: Vec<(String, FilterDefinition)> = filters
            .iter()
            .map(|(name, def)| (format!("{name}_renamed"), def.clone()))
            .collect();
        prop_assert_eq!(
            key_of(&expression, &filters),
            key_of(&renamed_expression, &renamed_filters)
        );
    }

    /// P3: simplification is a fixed point.
    #[test]
    fn simplifier_reaches_a_fixed_point(expression in arb_expression()) {
        for mode in [SimplifyMode::EvaluationPreserving, SimplifyMode::CanonicalStructure] {
            let parsed = dsl::parse(&expression, &DslPolicy::relaxed()).unwrap();
            let once = simplify::simplify_postfix(&parsed.postfix, mode).unwrap();
            let twice = simplify::simplify_postfix(&once, mode).unwrap();
            prop_assert_eq!(&once, &twice);
        }
    }

    /// P4: simplification preserves boolean semantics under every
    /// assignment of the free identifiers.
    #[test]
    fn simplifier_preserves_evaluation(expression in arb_expression()) {
        let parsed = dsl::parse(&expression, &DslPolicy::relaxed()).unwrap();
        let original = BoolExpr::from_postfix(&parsed.postfix).unwrap();
        for mode in [SimplifyMode::EvaluationPreserving, SimplifyMode::CanonicalStructure] {
            let simplified = BoolExpr::from_postfix(
                &simplify::simplify_postfix(&parsed.postfix, mode).unwrap(),
            ).unwrap();
            for mask in 0..(1u32 << IDENTS.len()) {
                let assignment: HashMap<String, bool> = IDENTS
                    .iter()
                    .enumerate()
                    .map(|(bit, name)| (name.to_string(), mask & (1 << bit) != 0))
                    .collect();
                prop_assert_eq!(
                    original.eval(&assignment),
                    simplified.eval(&assignment),
                    "mode {:?}, assignment {:?}", mode, assignment
                );
            }
        }
    }
}
