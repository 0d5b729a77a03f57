//! `groupBy` properties and WebRequest groupings

mod common;

use common::{empty_context, init_tracing, query_column, single_column};
use proptest::prelude::*;
use std::collections::BTreeSet;
use xform_core::XqlParser;
use xform_core::data::{String8, XArray};
use xform_core::testing::{WEB_REQUEST_ROWS, collect_column, sample_context};

fn grouped_counts(values: Vec<u8>) -> (usize, i64) {
    let source = single_column("V", XArray::from_vec(values));
    let context = empty_context();
    let table = XqlParser::parse_with_source("groupBy [V] with Count()", source, &context).unwrap();
    let counts = collect_column::<i64>(table, "Count").unwrap();
    let groups = counts.len();
    (groups, counts.into_iter().map(Option::unwrap).sum())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn group_counts_cover_every_row(values in prop::collection::vec(0u8..20, 0..400)) {
        let distinct = values.iter().collect::<BTreeSet<_>>().len();
        let rows = values.len() as i64;
        let (groups, total) = grouped_counts(values);
        prop_assert_eq!(groups, distinct);
        prop_assert_eq!(total, rows);
    }
}

#[test]
fn test_web_requests_by_port() {
    init_tracing();
    let context = sample_context().unwrap();
    let query = "read WebRequest\ngroupBy [ServerPort] with Count() Sum([ResponseBytes])";
    let ports = query_column::<u16>(query, &context, "ServerPort");
    let counts = query_column::<i64>(query, &context, "Count");
    let sums = query_column::<i64>(query, &context, "ResponseBytes.Sum");

    assert_eq!(ports.len(), 2);
    let port_80 = ports.iter().position(|p| *p == Some(80)).unwrap();
    assert_eq!(counts[port_80], Some(423));
    assert_eq!(
        counts.iter().map(|c| c.unwrap()).sum::<i64>(),
        WEB_REQUEST_ROWS as i64
    );
    assert!(sums.iter().all(|s| s.is_some_and(|s| s > 0)));
}

#[test]
fn test_enum_key_groups_in_value_order() {
    let context = sample_context().unwrap();
    let query = "read WebRequest\ngroupBy [HttpMethod] with Count()";
    let methods: Vec<String> = query_column::<String8>(query, &context, "HttpMethod")
        .into_iter()
        .map(|m| m.unwrap().as_str().to_string())
        .collect();
    assert_eq!(methods, vec!["GET", "POST", "PUT", "DELETE"]);
    assert_eq!(
        query_column::<i64>(query, &context, "Count"),
        vec![Some(600), Some(200), Some(100), Some(100)]
    );
}

#[test]
fn test_distinct_uris() {
    let context = sample_context().unwrap();
    let uris = query_column::<String8>("read WebRequest\ngroupBy [Uri]", &context, "Uri");
    assert_eq!(uris.len(), 50);
}

#[test]
fn test_multiple_keys_with_extremes() {
    let context = sample_context().unwrap();
    let query = "read WebRequest\ngroupBy [ServerPort] [HttpStatus] with Min([RequestElapsedMs]) Max([RequestElapsedMs])";
    let mins = query_column::<i32>(query, &context, "RequestElapsedMs.Min");
    let maxes = query_column::<i32>(query, &context, "RequestElapsedMs.Max");
    assert_eq!(mins.len(), 6);
    for (min, max) in mins.into_iter().zip(maxes) {
        let (min, max) = (min.unwrap(), max.unwrap());
        assert!((10..500).contains(&min) && min <= max && max < 500);
    }
}

#[test]
fn test_sum_rejects_text_column() {
    let context = sample_context().unwrap();
    let err = XqlParser::parse("read WebRequest\ngroupBy [ServerPort] with Sum([Uri])", &context)
        .unwrap_err();
    assert!(err.as_usage().is_some());
}
