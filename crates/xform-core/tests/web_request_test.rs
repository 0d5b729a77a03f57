//! End-to-end queries over the WebRequest sample log

mod common;

use common::{init_tracing, query_column, query_count};
use xform_core::data::String8;
use xform_core::testing::{WEB_REQUEST_ROWS, sample_context};
use xform_core::{EngineConfig, XqlParser, suggest};

fn text(values: Vec<Option<String8>>) -> Vec<String> {
    values
        .into_iter()
        .map(|v| v.map(|v| v.as_str().to_string()).unwrap_or_default())
        .collect()
}

#[test]
fn test_where_scenarios() {
    init_tracing();
    let context = sample_context().unwrap();
    assert_eq!(query_count("read WebRequest\nwhere [ServerPort] = 80", &context), 423);
    assert_eq!(
        query_count(
            "read WebRequest\nwhere [ServerPort] = 80 AND [ResponseBytes] > 1200",
            &context
        ),
        22
    );
    assert_eq!(
        query_count("read WebRequest\nwhere [ResponseBytes] < 900", &context),
        95
    );
    assert_eq!(
        query_count(
            "read WebRequest\nwhere [ServerPort] = 80 AND [ResponseBytes] > 1200 OR [ResponseBytes] < 900",
            &context
        ),
        22 + 95
    );
    assert_eq!(
        query_count(
            "read WebRequest\nwhere [ServerPort] = 80 OR [ServerPort] = 443",
            &context
        ),
        WEB_REQUEST_ROWS
    );
}

#[test]
fn test_parser_prints_only_needed_parentheses() {
    let context = sample_context().unwrap();
    let source = context.catalog.open("WebRequest").unwrap();

    let flat = "[ServerPort] = 80 AND [ResponseBytes] > 1200 OR [ResponseBytes] < 900";
    let expr = XqlParser::new(flat, &context)
        .next_expression(source.as_ref())
        .unwrap();
    assert_eq!(expr.to_string(), flat);

    let grouped = "[ServerPort] = 80 AND ([ResponseBytes] > 1200 OR [ResponseBytes] < 900)";
    let expr = XqlParser::new(grouped, &context)
        .next_expression(source.as_ref())
        .unwrap();
    assert_eq!(expr.to_string(), grouped);
}

#[test]
fn test_select_rename_and_limit() {
    let context = sample_context().unwrap();
    let query = "read WebRequest\nselect [ID] [Uri]\nrename [Uri] [Path]\nskip 10\nlimit 5";
    let table = XqlParser::parse(query, &context).unwrap();
    let names: Vec<&str> = table.schema().iter().map(|c| c.name()).collect();
    assert_eq!(names, vec!["ID", "Path"]);
    assert_eq!(
        query_column::<i32>(query, &context, "ID"),
        (10..15).map(Some).collect::<Vec<_>>()
    );
}

#[test]
fn test_set_with_function() {
    let context = sample_context().unwrap();
    let hosts = query_column::<String8>(
        "read WebRequest\nlimit 3\nset [Host] ToUpper([ServerName])",
        &context,
        "Host",
    );
    assert_eq!(text(hosts), vec!["WS-00", "WS-01", "WS-02"]);
}

#[test]
fn test_cast_then_filter_as_text() {
    let context = sample_context().unwrap();
    assert_eq!(
        query_count(
            "read WebRequest\ncast [ServerPort] String\nwhere [ServerPort] = \"80\"",
            &context
        ),
        423
    );
}

#[test]
fn test_count_and_schema() {
    let context = sample_context().unwrap();
    assert_eq!(
        query_column::<i64>("read WebRequest\ncount", &context, "Count"),
        vec![Some(WEB_REQUEST_ROWS as i64)]
    );

    let names = text(query_column::<String8>("read WebRequest\nschema", &context, "Name"));
    let types = text(query_column::<String8>("read WebRequest\nschema", &context, "Type"));
    let port = names.iter().position(|n| n == "ServerPort").unwrap();
    assert_eq!(types[port], "uint16");
    assert_eq!(names.len(), 10);
}

#[test]
fn test_peek_is_exact_on_small_tables() {
    let context = sample_context().unwrap();
    let query = "read WebRequest\npeek [ServerPort]";
    assert_eq!(
        query_column::<u16>(query, &context, "Value"),
        vec![Some(443), Some(80)]
    );
    assert_eq!(
        query_column::<i64>(query, &context, "Count"),
        vec![Some(577), Some(423)]
    );
    assert_eq!(
        text(query_column::<String8>(query, &context, "Percentage")),
        vec!["58%", "42%"]
    );
}

#[test]
fn test_choose_one_row_per_server() {
    let context = sample_context().unwrap();
    let query = "read WebRequest\nchoose Max [ResponseBytes] [ServerName]";
    let servers = text(query_column::<String8>(query, &context, "ServerName"));
    assert_eq!(servers.len(), 8);
    let mut sorted = servers.clone();
    sorted.sort();
    sorted.dedup();
    assert_eq!(sorted.len(), 8);
}

#[test]
fn test_concat_and_cache() {
    let context = sample_context().unwrap();
    assert_eq!(
        query_count("read WebRequest\nconcat WebRequest", &context),
        2 * WEB_REQUEST_ROWS
    );
    assert_eq!(
        query_count("read WebRequest\nwhere [ServerPort] = 80\ncache", &context),
        423
    );
    let ids = query_column::<i32>(
        "read WebRequest\nwhere [ServerPort] = 443\ncache\nlimit 2",
        &context,
        "ID",
    );
    assert_eq!(ids.len(), 2);
}

#[test]
fn test_batch_size_does_not_change_results() {
    let mut context = sample_context().unwrap();
    context.config = EngineConfig::new().with_batch_size(7).with_peek_seed(1);
    assert_eq!(
        query_count(
            "read WebRequest\nwhere [ServerPort] = 80 AND [ResponseBytes] > 1200 OR [ResponseBytes] < 900",
            &context
        ),
        117
    );
    assert_eq!(
        query_column::<i64>(
            "read WebRequest\ngroupBy [HttpMethod] with Count()",
            &context,
            "Count"
        ),
        vec![Some(600), Some(200), Some(100), Some(100)]
    );
}

#[test]
fn test_suggestions_follow_the_query() {
    let context = sample_context().unwrap();

    let operators = suggest("read WebRequest\nwhere [ServerPort] ", &context);
    assert_eq!(operators.category.as_deref(), Some("operator"));
    assert!(operators.values.contains(&"=".to_string()));

    let aggregators = suggest("read WebRequest\ngroupBy [ServerPort] with ", &context);
    assert_eq!(aggregators.category.as_deref(), Some("aggregator"));
    assert_eq!(aggregators.values, vec!["Count(", "Sum(", "Min(", "Max("]);

    let directions = suggest("read WebRequest\nchoose ", &context);
    assert_eq!(directions.values, vec!["Max", "Min"]);

    assert!(suggest("read WebRequest\nwhere [ServerPort] = 80", &context).is_valid);
}

#[test]
fn test_usage_error_names_line_and_token() {
    let context = sample_context().unwrap();
    let err = XqlParser::parse("read WebRequest\nwhere [Missing] = 1", &context).unwrap_err();
    let usage = err.as_usage().unwrap();
    assert_eq!(usage.value_category, "column");
    assert_eq!(usage.line, Some(2));
    assert!(usage.valid_values.contains(&"ServerPort".to_string()));
}

#[test]
fn test_duplicate_output_columns_are_rejected() {
    let context = sample_context().unwrap();
    for query in [
        "read WebRequest\nselect [ID] [id]",
        "read WebRequest\ngroupBy [ServerPort] with Count() Count()",
        "read WebRequest\ngroupBy [ServerPort] [ServerPort] with Count()",
    ] {
        let err = XqlParser::parse(query, &context).unwrap_err();
        let usage = err.as_usage().unwrap();
        assert_eq!(usage.value_category, "column", "{query}");
        assert_eq!(usage.line, Some(2), "{query}");
    }
    assert_eq!(
        query_count("read WebRequest\nselect [ID] [Uri] [ServerPort]", &context),
        WEB_REQUEST_ROWS
    );
}

#[test]
fn test_coalesce_with_literal_fallback() {
    let context = sample_context().unwrap();
    let bytes = query_column::<i32>(
        "read WebRequest\nlimit 4\nset [B] Coalesce([ResponseBytes], 0)",
        &context,
        "B",
    );
    let original = query_column::<i32>("read WebRequest\nlimit 4", &context, "ResponseBytes");
    assert_eq!(bytes, original);
}
