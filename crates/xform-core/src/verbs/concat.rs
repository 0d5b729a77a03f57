//! `concat {Table}...`
//!
//! Streams several tables back to back under one schema: the union of their
//! columns by name. A column missing from one table reads as nulls while
//! that table is current.

use crate::data::{ColumnDetails, XArray, find_column};
use crate::query::parser::XqlParser;
use crate::table::{Bindings, ColumnTraits, Getter, GetterKind, XTable, check_bind};
use crate::{Error, Result};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Several tables read one after another
#[derive(Debug)]
pub struct ConcatenatedTable {
    sources: Vec<Box<dyn XTable>>,
    schema: Vec<ColumnDetails>,
    /// `mapping[source][column]`: the source's index for an output column
    mapping: Vec<Vec<Option<usize>>>,
    bindings: Bindings<Vec<Option<Getter>>>,
    current: usize,
    row_count: usize,
}

impl ConcatenatedTable {
    /// Concatenate `sources`; same-named columns must share a type
    pub fn new(sources: Vec<Box<dyn XTable>>) -> Result<Self> {
        if sources.is_empty() {
            return Err(Error::internal("concat needs at least one table"));
        }
        let mut schema: Vec<ColumnDetails> = Vec::new();
        for source in &sources {
            for column in source.schema() {
                match find_column(&schema, column.name()) {
                    Some(existing) if schema[existing].column_type() != column.column_type() => {
                        return Err(Error::schema_mismatch(format!(
                            "column '{}' is {} in one table and {} in another",
                            column.name(),
                            schema[existing].column_type(),
                            column.column_type()
                        )));
                    }
                    Some(_) => {}
                    None => schema.push(column.clone()),
                }
            }
        }
        let mapping = sources
            .iter()
            .map(|source| {
                schema
                    .iter()
                    .map(|column| find_column(source.schema(), column.name()))
                    .collect()
            })
            .collect();
        Ok(Self {
            sources,
            schema,
            mapping,
            bindings: Bindings::new(),
            current: 0,
            row_count: 0,
        })
    }
}

impl XTable for ConcatenatedTable {
    fn schema(&self) -> &[ColumnDetails] {
        &self.schema
    }

    fn column_traits(&self, _column: usize) -> ColumnTraits {
        ColumnTraits::default()
    }

    fn bind(&mut self, column: usize, kind: GetterKind) -> Result<Getter> {
        let column_type = check_bind(&self.schema, self.column_traits(column), column, kind)?;
        let mut upstream = Vec::with_capacity(self.sources.len());
        for (source, mapping) in self.sources.iter_mut().zip(&self.mapping) {
            upstream.push(match mapping[column] {
                Some(inner) => Some(source.bind(inner, kind)?),
                None => None,
            });
        }
        self.bindings.add(column, kind, column_type, upstream)
    }

    fn next(&mut self, desired: usize, cancel: &CancellationToken) -> Result<usize> {
        self.bindings.start();
        while self.current < self.sources.len() {
            let count = self.sources[self.current].next(desired, cancel)?;
            if count > 0 {
                self.row_count = count;
                return Ok(count);
            }
            self.current += 1;
        }
        self.row_count = 0;
        Ok(0)
    }

    fn get(&mut self, getter: &Getter) -> Result<XArray> {
        let source = self
            .sources
            .get_mut(self.current)
            .ok_or_else(|| Error::protocol("get after concat was exhausted"))?;
        match self.bindings.slot(getter)?[self.current] {
            Some(upstream) => source.get(&upstream),
            None => Ok(XArray::null(getter.column_type(), self.row_count)),
        }
    }

    fn reset(&mut self) -> Result<()> {
        self.current = 0;
        self.row_count = 0;
        for source in &mut self.sources {
            source.reset()?;
        }
        Ok(())
    }

    fn count(&self) -> Option<usize> {
        self.sources.iter().map(|s| s.count()).sum()
    }
}

/// `concat {Table}...`: the upstream table first, then each named table
pub fn build(parser: &mut XqlParser<'_>, source: Option<Box<dyn XTable>>) -> Result<Box<dyn XTable>> {
    let source = parser.require_source(source)?;
    let mut sources = vec![source, parser.next_table()?];
    while parser.has_another_argument() {
        sources.push(parser.next_table()?);
    }
    debug!("concat {} tables", sources.len());
    Ok(Box::new(ConcatenatedTable::new(sources)?))
}
