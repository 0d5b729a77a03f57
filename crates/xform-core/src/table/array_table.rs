//! In-memory seekable table
//!
//! Columns are whole [`XArray`]s. A column may be dictionary-encoded (distinct
//! values plus per-row indices), in which case it also serves `Values` and
//! `Indices` getters. Every column supports `Seek`.

use super::{Bindings, ColumnTraits, Getter, GetterKind, XTable, check_bind, check_cancelled};
use crate::data::{ArraySelector, ColumnDetails, XArray};
use crate::{Error, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Clone, Debug)]
struct ArrayColumn {
    /// Every row of the column, reading through the dictionary when encoded
    rows: XArray,
    encoding: Option<Encoding>,
}

#[derive(Clone, Debug)]
struct Encoding {
    values: XArray,
    indices: XArray,
}

/// Table over fully materialized columns
#[derive(Debug)]
pub struct ArrayTable {
    schema: Vec<ColumnDetails>,
    columns: Vec<ArrayColumn>,
    row_count: usize,
    bindings: Bindings<GetterKind>,
    start: usize,
    end: usize,
}

impl ArrayTable {
    /// Start describing a table column by column
    pub fn builder() -> ArrayTableBuilder {
        ArrayTableBuilder::default()
    }

    /// Table from `(details, rows)` pairs of equal length
    pub fn from_columns(columns: Vec<(ColumnDetails, XArray)>) -> Result<Self> {
        let mut builder = Self::builder();
        for (details, rows) in columns {
            builder = builder.typed_column(details, rows);
        }
        builder.build()
    }

    /// Unstarted copy sharing the same buffers
    pub fn share(&self) -> Self {
        Self {
            schema: self.schema.clone(),
            columns: self.columns.clone(),
            row_count: self.row_count,
            bindings: Bindings::new(),
            start: 0,
            end: 0,
        }
    }

    /// Total rows
    pub fn row_count(&self) -> usize {
        self.row_count
    }
}

impl XTable for ArrayTable {
    fn schema(&self) -> &[ColumnDetails] {
        &self.schema
    }

    fn column_traits(&self, column: usize) -> ColumnTraits {
        ColumnTraits {
            seekable: true,
            enum_values: self
                .columns
                .get(column)
                .is_some_and(|c| c.encoding.is_some()),
        }
    }

    fn bind(&mut self, column: usize, kind: GetterKind) -> Result<Getter> {
        let column_type = check_bind(&self.schema, self.column_traits(column), column, kind)?;
        self.bindings.add(column, kind, column_type, kind)
    }

    fn next(&mut self, desired: usize, cancel: &CancellationToken) -> Result<usize> {
        check_cancelled(cancel)?;
        self.bindings.start();
        self.start = self.end;
        self.end = (self.start + desired.max(1)).min(self.row_count);
        Ok(self.end - self.start)
    }

    fn get(&mut self, getter: &Getter) -> Result<XArray> {
        let kind = *self.bindings.slot(getter)?;
        let column = &self.columns[getter.column()];
        let count = self.end - self.start;
        match (kind, &column.encoding) {
            (GetterKind::Current, _) => column.rows.slice(self.start, count),
            (GetterKind::Values, Some(encoding)) => Ok(encoding.values.clone()),
            (GetterKind::Indices, Some(encoding)) => encoding.indices.slice(self.start, count),
            _ => Err(Error::protocol(format!(
                "{kind:?} getter cannot be read with get"
            ))),
        }
    }

    fn seek(&mut self, getter: &Getter, rows: &ArraySelector) -> Result<XArray> {
        if *self.bindings.slot(getter)? != GetterKind::Seek {
            return Err(Error::protocol("seek requires a Seek getter"));
        }
        if rows.required_len() > self.row_count {
            return Err(Error::range(format!(
                "seek past the end of a {}-row table",
                self.row_count
            )));
        }
        Ok(self.columns[getter.column()].rows.select(rows))
    }

    fn reset(&mut self) -> Result<()> {
        self.start = 0;
        self.end = 0;
        Ok(())
    }

    fn is_seekable(&self) -> bool {
        true
    }

    fn count(&self) -> Option<usize> {
        Some(self.row_count)
    }
}

/// Incremental [`ArrayTable`] description; errors surface at [`build`](Self::build)
#[derive(Debug, Default)]
pub struct ArrayTableBuilder {
    schema: Vec<ColumnDetails>,
    columns: Vec<ArrayColumn>,
    error: Option<Error>,
}

impl ArrayTableBuilder {
    /// Add a plain column typed by its array
    pub fn column(self, name: &str, rows: XArray) -> Self {
        let details = ColumnDetails::new(name, rows.column_type());
        self.typed_column(details, rows)
    }

    /// Add a plain column with explicit details
    pub fn typed_column(mut self, details: ColumnDetails, rows: XArray) -> Self {
        if details.column_type() != rows.column_type() {
            self.fail(Error::schema_mismatch(format!(
                "column '{}' declared {} but holds {}",
                details.name(),
                details.column_type(),
                rows.column_type()
            )));
            return self;
        }
        self.schema.push(details);
        self.columns.push(ArrayColumn {
            rows,
            encoding: None,
        });
        self
    }

    /// Add a dictionary-encoded column: distinct `values` and one index per row
    pub fn enum_column(mut self, name: &str, values: XArray, indices: Vec<u32>) -> Self {
        if let Some(&bad) = indices.iter().find(|&&i| i as usize >= values.count()) {
            self.fail(Error::range(format!(
                "enum column '{name}' index {bad} past {} values",
                values.count()
            )));
            return self;
        }
        let indices: Arc<[u32]> = indices.into();
        let rows = values.select(&ArraySelector::map_all(indices.clone()));
        self.schema
            .push(ColumnDetails::new(name, values.column_type()));
        self.columns.push(ArrayColumn {
            rows,
            encoding: Some(Encoding {
                values,
                indices: XArray::from_vec(indices.to_vec()),
            }),
        });
        self
    }

    fn fail(&mut self, error: Error) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    /// Check row counts and produce the table
    pub fn build(self) -> Result<ArrayTable> {
        if let Some(error) = self.error {
            return Err(error);
        }
        let row_count = self.columns.first().map_or(0, |c| c.rows.count());
        for (details, column) in self.schema.iter().zip(&self.columns) {
            if column.rows.count() != row_count {
                return Err(Error::range(format!(
                    "column '{}' has {} rows, expected {row_count}",
                    details.name(),
                    column.rows.count()
                )));
            }
        }
        Ok(ArrayTable {
            schema: self.schema,
            columns: self.columns,
            row_count,
            bindings: Bindings::new(),
            start: 0,
            end: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ColumnType, String8};

    fn encoded() -> ArrayTable {
        ArrayTable::builder()
            .column("Id", XArray::from_vec(vec![1i32, 2, 3, 4]))
            .enum_column("Color", XArray::from_strs(&["red", "blue"]), vec![1, 0, 0, 1])
            .build()
            .unwrap()
    }

    #[test]
    fn test_enum_column_getters() {
        let mut table = encoded();
        let cancel = CancellationToken::new();
        let current = table.bind(1, GetterKind::Current).unwrap();
        let values = table.bind(1, GetterKind::Values).unwrap();
        let indices = table.bind(1, GetterKind::Indices).unwrap();
        assert_eq!(indices.column_type(), ColumnType::U32);

        assert_eq!(table.next(3, &cancel).unwrap(), 3);
        let colors = table.get(&current).unwrap();
        assert_eq!(colors.get::<String8>(0).unwrap().unwrap().as_str(), "blue");
        assert_eq!(table.get(&values).unwrap().count(), 2);
        assert_eq!(table.get(&indices).unwrap().get::<u32>(2).unwrap(), Some(0));

        assert_eq!(table.next(3, &cancel).unwrap(), 1);
        assert_eq!(table.next(3, &cancel).unwrap(), 0);
    }

    #[test]
    fn test_seek_and_reset() {
        let mut table = encoded();
        let cancel = CancellationToken::new();
        let seek = table.bind(0, GetterKind::Seek).unwrap();
        let rows = table
            .seek(&seek, &ArraySelector::map_all(vec![3, 0].into()))
            .unwrap();
        assert_eq!(rows.get::<i32>(0).unwrap(), Some(4));
        assert_eq!(rows.get::<i32>(1).unwrap(), Some(1));

        assert_eq!(table.next(10, &cancel).unwrap(), 4);
        table.reset().unwrap();
        assert_eq!(table.next(10, &cancel).unwrap(), 4);
    }

    #[test]
    fn test_plain_column_has_no_values_getter() {
        let mut table = encoded();
        assert!(table.bind(0, GetterKind::Values).is_err());
    }

    #[test]
    fn test_ragged_columns_rejected() {
        let result = ArrayTable::builder()
            .column("A", XArray::from_vec(vec![1i32]))
            .column("B", XArray::from_vec(vec![1i32, 2]))
            .build();
        assert!(matches!(result, Err(Error::Range(_))));
    }
}
