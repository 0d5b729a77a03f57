//! `read {Table}`

use crate::Result;
use crate::query::parser::XqlParser;
use crate::query::usage::UsageError;
use crate::table::XTable;
use tracing::debug;

/// Open a catalog table; must start the query
pub fn build(parser: &mut XqlParser<'_>, source: Option<Box<dyn XTable>>) -> Result<Box<dyn XTable>> {
    if source.is_some() {
        return Err(UsageError::new("verb", "read", Vec::new())
            .with_message("read must be the first verb; use concat or join to add tables")
            .into());
    }
    let table = parser.next_table()?;
    debug!("Opened table with {} columns", table.schema().len());
    Ok(table)
}
