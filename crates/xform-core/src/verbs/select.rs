//! `select`, `removeColumns` and `rename`
//!
//! All three are projections: each output column is one source column,
//! possibly renamed. Getters are requested straight from the source, so the
//! projection adds no work per batch.

use crate::data::{ArraySelector, ColumnDetails, XArray};
use crate::query::parser::XqlParser;
use crate::query::usage::UsageError;
use crate::table::{ColumnTraits, Getter, GetterKind, XTable};
use crate::{Error, Result};
use tokio_util::sync::CancellationToken;

/// Reordered, subset or renamed view of a source
#[derive(Debug)]
pub struct SelectTable {
    source: Box<dyn XTable>,
    mapping: Vec<usize>,
    schema: Vec<ColumnDetails>,
    bindings: crate::table::Bindings<Getter>,
}

impl SelectTable {
    /// Output column `i` is source column `mapping[i]`, described by `schema[i]`
    pub fn new(source: Box<dyn XTable>, mapping: Vec<usize>, schema: Vec<ColumnDetails>) -> Result<Self> {
        if mapping.len() != schema.len() {
            return Err(Error::internal("projection mapping and schema disagree"));
        }
        if let Some(&bad) = mapping.iter().find(|&&c| c >= source.schema().len()) {
            return Err(Error::internal(format!("projection of missing column {bad}")));
        }
        Ok(Self {
            source,
            mapping,
            schema,
            bindings: crate::table::Bindings::new(),
        })
    }

    /// Keep `columns` in the given order
    pub fn select(source: Box<dyn XTable>, columns: Vec<usize>) -> Result<Self> {
        let schema = columns
            .iter()
            .map(|&c| source.schema()[c].clone())
            .collect();
        Self::new(source, columns, schema)
    }

    /// Drop `removed`, keeping the rest in order
    pub fn remove(source: Box<dyn XTable>, removed: &[usize]) -> Result<Self> {
        let kept = (0..source.schema().len())
            .filter(|c| !removed.contains(c))
            .collect();
        Self::select(source, kept)
    }

    /// Rename one column
    pub fn rename(source: Box<dyn XTable>, column: usize, name: &str) -> Result<Self> {
        let mut schema = source.schema().to_vec();
        schema[column] = schema[column].rename(name);
        let mapping = (0..schema.len()).collect();
        Self::new(source, mapping, schema)
    }
}

impl XTable for SelectTable {
    fn schema(&self) -> &[ColumnDetails] {
        &self.schema
    }

    fn column_traits(&self, column: usize) -> ColumnTraits {
        self.mapping
            .get(column)
            .map(|&c| self.source.column_traits(c))
            .unwrap_or_default()
    }

    fn bind(&mut self, column: usize, kind: GetterKind) -> Result<Getter> {
        let source_column = *self
            .mapping
            .get(column)
            .ok_or_else(|| Error::protocol(format!("column index {column} out of range")))?;
        let upstream = self.source.bind(source_column, kind)?;
        self.bindings
            .add(column, kind, upstream.column_type(), upstream)
    }

    fn next(&mut self, desired: usize, cancel: &CancellationToken) -> Result<usize> {
        self.bindings.start();
        self.source.next(desired, cancel)
    }

    fn get(&mut self, getter: &Getter) -> Result<XArray> {
        let upstream = *self.bindings.slot(getter)?;
        self.source.get(&upstream)
    }

    fn seek(&mut self, getter: &Getter, rows: &ArraySelector) -> Result<XArray> {
        let upstream = *self.bindings.slot(getter)?;
        self.source.seek(&upstream, rows)
    }

    fn reset(&mut self) -> Result<()> {
        self.source.reset()
    }

    fn is_seekable(&self) -> bool {
        self.source.is_seekable()
    }

    fn count(&self) -> Option<usize> {
        self.source.count()
    }
}

fn next_columns(parser: &mut XqlParser<'_>, source: &dyn XTable) -> Result<Vec<usize>> {
    let mut columns = vec![parser.next_column(source)?];
    while parser.has_another_argument() {
        columns.push(parser.next_column(source)?);
    }
    Ok(columns)
}

/// `select {Column}...`
pub fn build_select(
    parser: &mut XqlParser<'_>,
    source: Option<Box<dyn XTable>>,
) -> Result<Box<dyn XTable>> {
    let source = parser.require_source(source)?;
    let columns = next_columns(parser, source.as_ref())?;
    let table = SelectTable::select(source, columns)?;
    super::check_unique_columns(table.schema())?;
    Ok(Box::new(table))
}

/// `removeColumns {Column}...`
pub fn build_remove(
    parser: &mut XqlParser<'_>,
    source: Option<Box<dyn XTable>>,
) -> Result<Box<dyn XTable>> {
    let source = parser.require_source(source)?;
    let columns = next_columns(parser, source.as_ref())?;
    Ok(Box::new(SelectTable::remove(source, &columns)?))
}

/// `rename {Column} {NewName}`
pub fn build_rename(
    parser: &mut XqlParser<'_>,
    source: Option<Box<dyn XTable>>,
) -> Result<Box<dyn XTable>> {
    let source = parser.require_source(source)?;
    let column = parser.next_column(source.as_ref())?;
    let name = parser.next_output_column_name()?;
    if let Some(existing) = crate::data::find_column(source.schema(), &name) {
        if existing != column {
            return Err(UsageError::new("column name", &name, Vec::new())
                .with_message("a column with this name already exists")
                .into());
        }
    }
    Ok(Box::new(SelectTable::rename(source, column, &name)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::ArrayTable;

    fn source() -> Box<dyn XTable> {
        Box::new(
            ArrayTable::builder()
                .column("A", XArray::from_vec(vec![1i32, 2]))
                .column("B", XArray::from_strs(&["x", "y"]))
                .column("C", XArray::from_vec(vec![true, false]))
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_select_forwards_upstream_arrays() {
        let mut table = SelectTable::select(source(), vec![2, 0]).unwrap();
        assert_eq!(table.schema()[0].name(), "C");
        let a = table.bind(1, GetterKind::Current).unwrap();
        let cancel = CancellationToken::new();
        assert_eq!(table.next(10, &cancel).unwrap(), 2);
        assert_eq!(table.get(&a).unwrap().get::<i32>(1).unwrap(), Some(2));
        assert!(table.bind(0, GetterKind::Current).is_err());
    }

    #[test]
    fn test_remove_and_rename() {
        let removed = SelectTable::remove(source(), &[1]).unwrap();
        let names: Vec<&str> = removed.schema().iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["A", "C"]);

        let renamed = SelectTable::rename(source(), 1, "Label").unwrap();
        assert_eq!(renamed.schema()[1].name(), "Label");
        assert_eq!(renamed.count(), Some(2));
        assert!(renamed.is_seekable());
    }
}
