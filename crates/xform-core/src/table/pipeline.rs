//! Typed two-phase façade over [`XTable`]
//!
//! [`Binder`] only allows binding; [`Binder::start`] consumes it and returns a
//! [`Cursor`] that only allows iteration. Mixing the phases is therefore a
//! compile error for callers that go through this module.

use super::{Getter, GetterKind, XTable, column_index};
use crate::data::{ArraySelector, ColumnDetails, XArray};
use crate::query::usage::UsageError;
use crate::{Error, Result};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Bind phase of a pipeline
pub struct Binder {
    table: Box<dyn XTable>,
}

impl Binder {
    /// Wrap an unstarted table
    pub fn new(table: Box<dyn XTable>) -> Self {
        Self { table }
    }

    /// Output columns
    pub fn schema(&self) -> &[ColumnDetails] {
        self.table.schema()
    }

    /// `Current` getter for a column by name
    pub fn column(&mut self, name: &str) -> Result<Getter> {
        let index = column_index(self.table.as_ref(), name).ok_or_else(|| {
            UsageError::new("column", name, column_names(self.table.schema()))
        })?;
        self.table.bind(index, GetterKind::Current)
    }

    /// Getter of any kind for a column index
    pub fn bind(&mut self, column: usize, kind: GetterKind) -> Result<Getter> {
        self.table.bind(column, kind)
    }

    /// Close the bind phase
    pub fn start(self) -> Cursor {
        Cursor {
            table: self.table,
            row_count: 0,
        }
    }
}

/// Iterate phase of a pipeline
pub struct Cursor {
    table: Box<dyn XTable>,
    row_count: usize,
}

impl Cursor {
    /// Advance to the next batch; `0` when exhausted
    pub fn next(&mut self, desired: usize, cancel: &CancellationToken) -> Result<usize> {
        self.row_count = self.table.next(desired, cancel)?;
        Ok(self.row_count)
    }

    /// Rows in the current batch
    pub fn row_count(&self) -> usize {
        self.row_count
    }

    /// Read a getter for the current batch
    pub fn get(&mut self, getter: &Getter) -> Result<XArray> {
        let array = self.table.get(getter)?;
        if getter.kind() != GetterKind::Values && array.count() != self.row_count {
            return Err(Error::protocol(format!(
                "column {} returned {} rows for a batch of {}",
                getter.column(),
                array.count(),
                self.row_count
            )));
        }
        Ok(array)
    }

    /// Read a seek getter at arbitrary rows
    pub fn seek(&mut self, getter: &Getter, rows: &ArraySelector) -> Result<XArray> {
        self.table.seek(getter, rows)
    }

    /// Rewind to the first batch
    pub fn reset(&mut self) -> Result<()> {
        self.row_count = 0;
        self.table.reset()
    }

    /// Give the table back
    pub fn into_inner(self) -> Box<dyn XTable> {
        self.table
    }
}

/// Drain a table and count its rows without reading any column
pub fn run_count(
    mut table: Box<dyn XTable>,
    batch_size: usize,
    cancel: &CancellationToken,
) -> Result<usize> {
    let mut total = 0;
    loop {
        let count = table.next(batch_size, cancel)?;
        if count == 0 {
            break;
        }
        total += count;
    }
    debug!("Counted {} rows", total);
    Ok(total)
}

pub(crate) fn column_names(schema: &[ColumnDetails]) -> Vec<String> {
    schema.iter().map(|c| c.name().to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::ArrayTable;

    fn table() -> Box<dyn XTable> {
        Box::new(
            ArrayTable::builder()
                .column("A", XArray::from_vec((0..25i32).collect()))
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_binder_cursor_batches() {
        let mut binder = Binder::new(table());
        let a = binder.column("a").unwrap();
        let mut cursor = binder.start();
        let cancel = CancellationToken::new();

        let mut seen = Vec::new();
        while cursor.next(10, &cancel).unwrap() > 0 {
            let batch = cursor.get(&a).unwrap();
            for row in 0..batch.count() {
                seen.push(batch.get::<i32>(row).unwrap().unwrap());
            }
        }
        assert_eq!(seen, (0..25).collect::<Vec<_>>());
    }

    #[test]
    fn test_unknown_column_is_usage_error() {
        let mut binder = Binder::new(table());
        let err = binder.column("Missing").unwrap_err();
        let usage = err.as_usage().unwrap();
        assert_eq!(usage.valid_values, vec!["A".to_string()]);
    }

    #[test]
    fn test_run_count() {
        let cancel = CancellationToken::new();
        assert_eq!(run_count(table(), 7, &cancel).unwrap(), 25);
    }

    #[test]
    fn test_cancelled_before_next() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(run_count(table(), 7, &cancel), Err(Error::Cancelled));
    }
}
