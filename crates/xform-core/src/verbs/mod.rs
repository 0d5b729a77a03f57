//! Verb registry
//!
//! Each verb is one line of a query. Builders receive the parser positioned
//! after the verb name plus the upstream table, consume their arguments and
//! return the new table.

pub mod aggregators;
pub mod cast;
pub mod choose;
pub mod concat;
pub mod count;
pub mod group_by;
pub mod join;
pub mod limit;
pub mod memory_cacher;
pub mod peek;
pub mod read;
pub mod schema;
pub mod select;
pub mod set;
pub mod where_filter;

pub use cast::CastTable;
pub use choose::{ChooseDirection, ChooseTable};
pub use concat::ConcatenatedTable;
pub use count::CountTable;
pub use group_by::GroupByTable;
pub use join::JoinTable;
pub use limit::{LimitTable, SkipTable};
pub use memory_cacher::MemoryCacher;
pub use peek::PeekTable;
pub use select::SelectTable;
pub use set::SetTable;
pub use where_filter::WhereTable;

use crate::Result;
use crate::data::ColumnDetails;
use crate::query::parser::XqlParser;
use crate::query::usage::UsageError;
use crate::table::XTable;

/// Builds one verb's table from the parser and the upstream table
pub type VerbBuilder = fn(&mut XqlParser<'_>, Option<Box<dyn XTable>>) -> Result<Box<dyn XTable>>;

/// Registry entry
pub struct VerbEntry {
    /// Name as written (matched case-insensitively)
    pub name: &'static str,
    /// Usage line shown in errors
    pub usage: &'static str,
    /// Builder
    pub build: VerbBuilder,
}

/// Every verb the parser knows
pub static VERBS: &[VerbEntry] = &[
    VerbEntry {
        name: "read",
        usage: "read {Table}",
        build: read::build,
    },
    VerbEntry {
        name: "select",
        usage: "select {Column} [, {Column}]...",
        build: select::build_select,
    },
    VerbEntry {
        name: "columns",
        usage: "columns {Column} [, {Column}]...",
        build: select::build_select,
    },
    VerbEntry {
        name: "removeColumns",
        usage: "removeColumns {Column} [, {Column}]...",
        build: select::build_remove,
    },
    VerbEntry {
        name: "rename",
        usage: "rename {Column} {NewName}",
        build: select::build_rename,
    },
    VerbEntry {
        name: "set",
        usage: "set {Column} {Value}",
        build: set::build,
    },
    VerbEntry {
        name: "cast",
        usage: "cast {Column} {Type} [Strict|Lenient] [{Default}]",
        build: cast::build,
    },
    VerbEntry {
        name: "where",
        usage: "where {Condition}",
        build: where_filter::build,
    },
    VerbEntry {
        name: "limit",
        usage: "limit {RowCount}",
        build: limit::build_limit,
    },
    VerbEntry {
        name: "skip",
        usage: "skip {RowCount}",
        build: limit::build_skip,
    },
    VerbEntry {
        name: "count",
        usage: "count",
        build: count::build,
    },
    VerbEntry {
        name: "schema",
        usage: "schema",
        build: schema::build,
    },
    VerbEntry {
        name: "join",
        usage: "join {FromColumn} {ToTable} {ToColumn} {Prefix}",
        build: join::build,
    },
    VerbEntry {
        name: "groupBy",
        usage: "groupBy {Column} [, {Column}]... with {Aggregator} [, {Aggregator}]...",
        build: group_by::build,
    },
    VerbEntry {
        name: "choose",
        usage: "choose {Max|Min} {RankColumn} {KeyColumn} [, {KeyColumn}]...",
        build: choose::build,
    },
    VerbEntry {
        name: "peek",
        usage: "peek {Column}",
        build: peek::build,
    },
    VerbEntry {
        name: "cache",
        usage: "cache",
        build: memory_cacher::build,
    },
    VerbEntry {
        name: "concat",
        usage: "concat {Table} [, {Table}]...",
        build: concat::build,
    },
];

/// Find a verb by name
pub fn lookup_verb(name: &str) -> Option<&'static VerbEntry> {
    VERBS.iter().find(|v| v.name.eq_ignore_ascii_case(name))
}

/// Names of every verb
pub fn verb_names() -> Vec<String> {
    VERBS.iter().map(|v| v.name.to_string()).collect()
}

/// Fail when two output columns share a name; names compare case-insensitively
pub fn check_unique_columns(schema: &[ColumnDetails]) -> Result<()> {
    for (index, column) in schema.iter().enumerate() {
        if schema[..index].iter().any(|earlier| earlier.is_named(column.name())) {
            return Err(UsageError::new("column", column.name(), Vec::new())
                .with_message("appears more than once in the output")
                .into());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive() {
        assert_eq!(lookup_verb("GROUPBY").unwrap().name, "groupBy");
        assert!(lookup_verb("selec").is_none());
        assert_eq!(verb_names().len(), VERBS.len());
    }

    #[test]
    fn test_usage_starts_with_name() {
        for verb in VERBS {
            assert!(verb.usage.starts_with(verb.name), "{}", verb.name);
        }
    }

    #[test]
    fn test_duplicate_output_names() {
        use crate::data::ColumnType;

        let schema = vec![
            ColumnDetails::new("Port", ColumnType::U16),
            ColumnDetails::new("Count", ColumnType::I64),
        ];
        assert!(check_unique_columns(&schema).is_ok());

        let mut repeated = schema.clone();
        repeated.push(ColumnDetails::new("port", ColumnType::I32));
        let err = check_unique_columns(&repeated).unwrap_err();
        assert_eq!(err.as_usage().unwrap().invalid_token, "port");
    }
}
