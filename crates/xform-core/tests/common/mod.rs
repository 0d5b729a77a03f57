#![allow(dead_code)]

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use xform_core::data::{XArray, XValue};
use xform_core::testing::collect_column;
use xform_core::{ArrayTable, InMemoryCatalog, WorkflowContext, XTable, XqlParser, run_count};

/// Route engine logs to the test harness; repeated calls are no-ops
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Context with no registered tables
pub fn empty_context() -> WorkflowContext {
    WorkflowContext::new(Arc::new(InMemoryCatalog::new()))
}

/// One-column table named `name`
pub fn single_column(name: &str, values: XArray) -> Box<dyn XTable> {
    Box::new(ArrayTable::builder().column(name, values).build().unwrap())
}

/// Run `query` and return every value of `column`
pub fn query_column<T: XValue>(query: &str, context: &WorkflowContext, column: &str) -> Vec<Option<T>> {
    let table = XqlParser::parse(query, context).unwrap();
    collect_column::<T>(table, column).unwrap()
}

/// Run `query` and count its rows
pub fn query_count(query: &str, context: &WorkflowContext) -> usize {
    let table = XqlParser::parse(query, context).unwrap();
    run_count(table, 128, &CancellationToken::new()).unwrap()
}
