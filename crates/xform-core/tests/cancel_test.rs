//! Cancellation while a verb builds its result

mod common;

use common::init_tracing;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;
use xform_core::data::XArray;
use xform_core::testing::CancelAfter;
use xform_core::{
    ArrayTable, Binder, EngineConfig, Error, InMemoryCatalog, WorkflowContext, XTable, XqlParser,
};

const ROWS: i32 = 100;
const BATCH_SIZE: usize = 4;

fn numbers() -> ArrayTable {
    ArrayTable::builder()
        .column("K", XArray::from_vec((0..ROWS).map(|i| i % 7).collect()))
        .column("V", XArray::from_vec((0..ROWS).map(i64::from).collect()))
        .build()
        .unwrap()
}

fn context(catalog: InMemoryCatalog) -> WorkflowContext {
    WorkflowContext::new(Arc::new(catalog))
        .with_config(EngineConfig::new().with_batch_size(BATCH_SIZE).with_peek_seed(5))
}

/// Pull the first batch of `table` and expect the build to stop with `Cancelled`
fn assert_cancelled(table: Box<dyn XTable>, column: &str) {
    let mut binder = Binder::new(table);
    let _getter = binder.column(column).unwrap();
    let mut cursor = binder.start();
    let cancel = CancellationToken::new();
    let result = cursor.next(1000, &cancel);
    assert!(matches!(result, Err(Error::Cancelled)), "{result:?}");
    assert!(cancel.is_cancelled());
    drop(cursor);
}

/// Build `query` over a source that cancels after two batches; returns the
/// batches it served
fn cancel_over_source(query: &str, source: ArrayTable, column: &str) -> usize {
    init_tracing();
    let served = Arc::new(AtomicUsize::new(0));
    let source = CancelAfter::new(Box::new(source), 2, served.clone());
    let context = context(InMemoryCatalog::new());
    let table = XqlParser::parse_with_source(query, Box::new(source), &context).unwrap();
    assert_cancelled(table, column);
    served.load(Ordering::SeqCst)
}

#[test]
fn test_group_by_hash_build_stops() {
    let served = cancel_over_source("groupBy [K] with Count() Sum([V])", numbers(), "Count");
    assert_eq!(served, 2);
}

#[test]
fn test_group_by_enum_build_stops() {
    let source = ArrayTable::builder()
        .enum_column(
            "Color",
            XArray::from_strs(&["red", "green", "blue"]),
            (0..ROWS as u32).map(|i| i % 3).collect(),
        )
        .build()
        .unwrap();
    let served = cancel_over_source("groupBy [Color] with Count()", source, "Count");
    assert_eq!(served, 2);
}

#[test]
fn test_choose_build_stops() {
    assert_eq!(cancel_over_source("choose Max [V] [K]", numbers(), "K"), 2);
}

#[test]
fn test_peek_build_stops() {
    assert_eq!(cancel_over_source("peek [K]", numbers(), "Value"), 2);
}

#[test]
fn test_cache_fill_stops() {
    assert_eq!(cancel_over_source("cache", numbers(), "V"), 2);
}

#[test]
fn test_join_index_build_stops() {
    init_tracing();
    let served = Arc::new(AtomicUsize::new(0));
    let lookup = numbers();
    let catalog = InMemoryCatalog::new();
    let counter = served.clone();
    catalog.register_factory("Lookup", move || {
        Ok(Box::new(CancelAfter::new(Box::new(lookup.share()), 2, counter.clone())) as Box<dyn XTable>)
    });
    let context = context(catalog);

    let table = XqlParser::parse_with_source(
        "join [V] Lookup [V] L.",
        Box::new(numbers()),
        &context,
    )
    .unwrap();
    assert_cancelled(table, "L.K");
    assert_eq!(served.load(Ordering::SeqCst), 2);
}

#[test]
fn test_uncancelled_source_still_completes() {
    let served = Arc::new(AtomicUsize::new(0));
    let source = CancelAfter::new(Box::new(numbers()), usize::MAX, served.clone());
    let context = context(InMemoryCatalog::new());
    let table =
        XqlParser::parse_with_source("groupBy [K] with Count()", Box::new(source), &context)
            .unwrap();
    let counts = xform_core::testing::collect_column::<i64>(table, "Count").unwrap();
    assert_eq!(counts.len(), 7);
    assert_eq!(served.load(Ordering::SeqCst), ROWS as usize / BATCH_SIZE);
}
