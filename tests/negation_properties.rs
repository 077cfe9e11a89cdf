use std::collections::BTreeSet;

use proptest::prelude::*;
use serde_json::{json, Map, Value};

use querity::ast::{Condition, ConditionValue, FieldReference, Literal, Operator, PropertyExpression, SimpleCondition};
use querity::memory::{Document, MemoryBackend};
use querity::Query;

const INT_FIELDS: [&str; 2] = ["a", "b"];
const TEXT_FIELD: &str = "s";

fn simple(field: &str, operator: Operator, value: Option<ConditionValue>) -> Condition {
    SimpleCondition::new(PropertyExpression::property(field).unwrap(), operator, value)
        .unwrap()
        .into()
}

fn negate(condition: Condition) -> Condition {
    Condition::not(condition).unwrap()
}

fn arb_int_field() -> impl Strategy<Value = &'static str> {
    prop_oneof![Just(INT_FIELDS[0]), Just(INT_FIELDS[1])]
}

fn arb_comparison() -> impl Strategy<Value = Operator> {
    prop_oneof![
        Just(Operator::Equals),
        Just(Operator::NotEquals),
        Just(Operator::GreaterThan),
        Just(Operator::GreaterThanEquals),
        Just(Operator::LesserThan),
        Just(Operator::LesserThanEquals),
    ]
}

fn arb_text() -> impl Strategy<Value = &'static str> {
    prop_oneof![Just("x"), Just("y"), Just("X"), Just("xy"), Just("")]
}

fn arb_leaf() -> impl Strategy<Value = Condition> {
    prop_oneof![
        (arb_int_field(), arb_comparison(), 0i64..3)
            .prop_map(|(field, op, n)| simple(field, op, Some(Literal::Integer(n).into()))),
        (arb_int_field(), arb_comparison(), arb_int_field()).prop_map(|(field, op, other)| {
            simple(field, op, Some(FieldReference::new(other).unwrap().into()))
        }),
        (
            arb_int_field(),
            prop_oneof![Just(Operator::In), Just(Operator::NotIn)],
            prop::collection::vec(0i64..3, 0..3)
        )
            .prop_map(|(field, op, items)| {
                simple(field, op, Some(ConditionValue::List(items.into_iter().map(Literal::Integer).collect())))
            }),
        (
            prop_oneof![Just("a"), Just("b"), Just(TEXT_FIELD)],
            prop_oneof![Just(Operator::IsNull), Just(Operator::IsNotNull)]
        )
            .prop_map(|(field, op)| simple(field, op, None)),
        (
            prop_oneof![
                Just(Operator::StartsWith),
                Just(Operator::EndsWith),
                Just(Operator::Contains),
                Just(Operator::Equals),
                Just(Operator::NotEquals),
            ],
            arb_text()
        )
            .prop_map(|(op, text)| simple(TEXT_FIELD, op, Some(Literal::from(text).into()))),
    ]
}

/// Never produces an empty connective.
fn arb_condition() -> impl Strategy<Value = Condition> {
    arb_leaf().prop_recursive(4, 32, 3, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 1..4).prop_map(Condition::And),
            prop::collection::vec(inner.clone(), 1..4).prop_map(Condition::Or),
            inner.prop_map(negate),
        ]
    })
}

/// Each field is missing, null, or a value.
fn arb_row() -> impl Strategy<Value = (Option<Value>, Option<Value>, Option<Value>)> {
    let int = prop_oneof![Just(None), Just(Some(Value::Null)), (0i64..3).prop_map(|n| Some(json!(n)))];
    let text = prop_oneof![
        Just(None),
        Just(Some(Value::Null)),
        prop_oneof![Just("x"), Just("xy"), Just("Yx"), Just("y")].prop_map(|s| Some(json!(s))),
    ];
    (int.clone(), int, text)
}

fn backend(rows: Vec<(Option<Value>, Option<Value>, Option<Value>)>) -> MemoryBackend {
    let documents = rows
        .into_iter()
        .enumerate()
        .map(|(id, (a, b, s))| {
            let mut doc: Document = Map::new();
            doc.insert("id".into(), json!(id));
            for (name, value) in [("a", a), ("b", b), (TEXT_FIELD, s)] {
                if let Some(value) = value {
                    doc.insert(name.into(), value);
                }
            }
            doc
        })
        .collect();
    MemoryBackend::new(documents)
}

fn matching(backend: &MemoryBackend, filter: Condition) -> BTreeSet<u64> {
    backend
        .find_all(&Query::builder().filter(filter).build())
        .unwrap()
        .iter()
        .filter_map(|doc| doc["id"].as_u64())
        .collect()
}

proptest! {
    #[test]
    fn double_negation_is_identity(
        condition in arb_condition(),
        rows in prop::collection::vec(arb_row(), 0..12),
    ) {
        let backend = backend(rows);
        let plain = matching(&backend, condition.clone());
        let twice = matching(&backend, negate(negate(condition)));
        prop_assert_eq!(plain, twice);
    }

    #[test]
    fn negation_never_overlaps(
        condition in arb_condition(),
        rows in prop::collection::vec(arb_row(), 0..12),
    ) {
        let backend = backend(rows);
        let plain = matching(&backend, condition.clone());
        let negated = matching(&backend, negate(condition));
        prop_assert!(plain.is_disjoint(&negated), "{:?} / {:?}", plain, negated);
    }

    #[test]
    fn de_morgan(
        left in arb_condition(),
        right in arb_condition(),
        rows in prop::collection::vec(arb_row(), 0..12),
    ) {
        let backend = backend(rows);
        let not_and = matching(&backend, negate(Condition::And(vec![left.clone(), right.clone()])));
        let or_not = matching(&backend, Condition::Or(vec![negate(left.clone()), negate(right.clone())]));
        prop_assert_eq!(not_and, or_not);

        let not_or = matching(&backend, negate(Condition::Or(vec![left.clone(), right.clone()])));
        let and_not = matching(&backend, Condition::And(vec![negate(left), negate(right)]));
        prop_assert_eq!(not_or, and_not);
    }

    #[test]
    fn equals_and_not_equals_partition_rows(
        field in arb_int_field(),
        n in 0i64..3,
        rows in prop::collection::vec(arb_row(), 0..12),
    ) {
        let backend = backend(rows);
        let all: BTreeSet<u64> = (0..backend.documents().len() as u64).collect();
        let eq = matching(&backend, simple(field, Operator::Equals, Some(Literal::Integer(n).into())));
        let ne = matching(&backend, simple(field, Operator::NotEquals, Some(Literal::Integer(n).into())));
        let nulls = matching(&backend, simple(field, Operator::IsNull, None));

        prop_assert!(eq.is_disjoint(&nulls));
        prop_assert!(nulls.is_subset(&ne));
        prop_assert_eq!(eq.union(&ne).copied().collect::<BTreeSet<_>>(), all);
    }

    #[test]
    fn negated_comparison_excludes_null(
        field in arb_int_field(),
        op in arb_comparison().prop_filter("ordering only", |op| {
            !matches!(op, Operator::Equals | Operator::NotEquals)
        }),
        n in 0i64..3,
        rows in prop::collection::vec(arb_row(), 0..12),
    ) {
        let backend = backend(rows);
        let negated = matching(&backend, negate(simple(field, op, Some(Literal::Integer(n).into()))));
        let nulls = matching(&backend, simple(field, Operator::IsNull, None));
        prop_assert!(negated.is_disjoint(&nulls));
    }
}
