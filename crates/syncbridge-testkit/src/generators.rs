//! Proptest generators for property-based testing.

use proptest::prelude::*;

use syncbridge_core::{CommitAction, CommitEvent, Value};

/// A scalar that survives every wire encoding.
pub fn scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Int),
        ".{0,24}".prop_map(Value::String),
    ]
}

/// Map keys, including ones that cannot appear in an XML element name.
pub fn key() -> impl Strategy<Value = String> {
    prop_oneof![
        4 => "[a-z][a-z0-9_]{0,8}",
        1 => "[0-9]{1,3}",
        1 => "[a-z <>&]{1,6}",
    ]
}

/// Nested maps and lists of scalars.
pub fn value_tree() -> impl Strategy<Value = Value> {
    scalar().prop_recursive(4, 48, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::List),
            prop::collection::vec((key(), inner), 0..6)
                .prop_map(|pairs| Value::Map(pairs.into_iter().collect())),
        ]
    })
}

pub fn commit_action() -> impl Strategy<Value = CommitAction> {
    prop_oneof![
        Just(CommitAction::Create),
        Just(CommitAction::Update),
        Just(CommitAction::Delete),
    ]
}

/// Local object ids: one or a few numeric or textual ids.
pub fn local_ids() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[0-9]{1,6}|[A-Z]{2}-[0-9]{1,4}", 1..4)
}

/// A fresh commit event on a `Product`-like type.
pub fn commit_event() -> impl Strategy<Value = CommitEvent> {
    (
        "[A-Z][a-z]{2,10}",
        local_ids(),
        commit_action(),
        "[a-z]{0,8}",
        ".{0,16}",
        0i64..=i64::MAX / 2,
    )
        .prop_map(|(object_type, ids, action, user, comment, now)| {
            CommitEvent::new(object_type, ids, action, user, comment, now)
        })
}
