//! `join` through the query parser

mod common;

use common::{init_tracing, query_column, query_count};
use std::sync::Arc;
use xform_core::data::{String8, XArray};
use xform_core::{ArrayTable, Error, InMemoryCatalog, WorkflowContext, XTable, XqlParser};

const JOIN_FROM: [i32; 9] = [11, 15, 9, 8, 1000, 9, 0, 99, -1000];
const EXPECTED: [i32; 7] = [11, 15, 9, 8, 9, 0, 99];

fn int_tables() -> (ArrayTable, ArrayTable) {
    let from = ArrayTable::builder()
        .column("ID", XArray::from_vec(JOIN_FROM.to_vec()))
        .column("Row", XArray::from_vec((0..9i32).collect()))
        .build()
        .unwrap();
    let to_ids: Vec<i32> = (0..100).rev().collect();
    let labels: Vec<String> = to_ids.iter().map(|id| format!("item-{id}")).collect();
    let to = ArrayTable::builder()
        .column("ID", XArray::from_vec(to_ids))
        .column("Label", XArray::from_strs(&labels))
        .build()
        .unwrap();
    (from, to)
}

fn string_tables() -> (ArrayTable, ArrayTable) {
    let from: Vec<String> = JOIN_FROM.iter().map(i32::to_string).collect();
    let to: Vec<String> = (0..100).rev().map(|id: i32| id.to_string()).collect();
    (
        ArrayTable::builder()
            .column("ID", XArray::from_strs(&from))
            .build()
            .unwrap(),
        ArrayTable::builder()
            .column("ID", XArray::from_strs(&to))
            .build()
            .unwrap(),
    )
}

fn context((from, to): (ArrayTable, ArrayTable)) -> WorkflowContext {
    let catalog = InMemoryCatalog::new();
    catalog.register_table("joinFrom", from);
    catalog.register_table("joinTo", to);
    WorkflowContext::new(Arc::new(catalog))
}

#[test]
fn test_integer_join_keeps_matching_left_rows() {
    init_tracing();
    let context = context(int_tables());
    let query = "read joinFrom\njoin [ID] joinTo [ID] To.";

    let ids = query_column::<i32>(query, &context, "ID");
    assert_eq!(ids, EXPECTED.iter().map(|&id| Some(id)).collect::<Vec<_>>());

    let joined = query_column::<i32>(query, &context, "To.ID");
    assert_eq!(joined, ids);

    let labels = query_column::<String8>(query, &context, "To.Label");
    assert_eq!(labels[0].as_ref().map(String8::as_str), Some("item-11"));
    assert_eq!(labels[6].as_ref().map(String8::as_str), Some("item-99"));

    let rows = query_column::<i32>(query, &context, "Row");
    assert_eq!(
        rows,
        vec![Some(0), Some(1), Some(2), Some(3), Some(5), Some(6), Some(7)]
    );
}

#[test]
fn test_string_join_matches_integer_join() {
    let context = context(string_tables());
    let ids = query_column::<String8>("read joinFrom\njoin [ID] joinTo [ID] To.", &context, "ID");
    let ids: Vec<String> = ids.into_iter().map(|id| id.unwrap().as_str().to_string()).collect();
    let expected: Vec<String> = EXPECTED.iter().map(i32::to_string).collect();
    assert_eq!(ids, expected);
}

#[test]
fn test_join_after_filter_and_count() {
    let context = context(int_tables());
    let count = query_count(
        "read joinFrom\nwhere [ID] < 50\njoin [ID] joinTo [ID] To.\ncount",
        &context,
    );
    assert_eq!(count, 1);
    let total = query_column::<i64>(
        "read joinFrom\nwhere [ID] < 50\njoin [ID] joinTo [ID] To.\ncount",
        &context,
        "Count",
    );
    assert_eq!(total, vec![Some(6)]);
}

#[test]
fn test_join_on_mismatched_types() {
    let (from, _) = int_tables();
    let (_, to) = string_tables();
    let context = context((from, to));
    let err = XqlParser::parse("read joinFrom\njoin [ID] joinTo [ID] To.", &context).unwrap_err();
    assert!(matches!(err, Error::SchemaMismatch(_)));
}

#[test]
fn test_join_needs_seekable_right_side() {
    let (from, to) = int_tables();
    let catalog = InMemoryCatalog::new();
    catalog.register_table("joinFrom", from);
    catalog.register_factory("filtered", move || {
        let inner = InMemoryCatalog::new();
        inner.register_table("joinTo", to.share());
        let context = WorkflowContext::new(Arc::new(inner));
        XqlParser::parse("read joinTo\nwhere [ID] >= 0", &context)
    });
    let context = WorkflowContext::new(Arc::new(catalog));

    let filtered = context.catalog.open("filtered").unwrap();
    assert!(!filtered.is_seekable());

    let err = XqlParser::parse("read joinFrom\njoin [ID] filtered [ID] To.", &context).unwrap_err();
    assert_eq!(err.as_usage().unwrap().value_category, "table");
}
