//! `cache`
//!
//! Drains the source into memory on the first `next`, keeping only the
//! columns that were bound, then drops the source. Later passes, including
//! after `reset`, read the in-memory copy. The cached table is seekable, so
//! it can sit on the right side of a `join`.

use crate::data::{ArraySelector, ColumnDetails, XArray};
use crate::query::parser::XqlParser;
use crate::table::{ArrayTable, Getter, GetterKind, Materialized, XTable, check_cancelled};
use crate::{Error, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// In-memory copy of the bound columns of a source
#[derive(Debug)]
pub struct MemoryCacher {
    source: Option<Box<dyn XTable>>,
    result: Materialized,
    batch_size: usize,
}

impl MemoryCacher {
    /// Cache `source`, reading it in `batch_size` chunks
    pub fn new(source: Box<dyn XTable>, batch_size: usize) -> Self {
        let schema = source.schema().to_vec();
        Self {
            source: Some(source),
            result: Materialized::new(schema),
            batch_size: batch_size.max(1),
        }
    }

    /// Whether the source has been drained
    pub fn is_cached(&self) -> bool {
        self.result.is_built()
    }

    fn fill(&mut self, cancel: &CancellationToken) -> Result<()> {
        let mut source = self
            .source
            .take()
            .ok_or_else(|| Error::internal("cache source already consumed"))?;
        let bound = self.result.bound_columns();
        let getters = bound
            .iter()
            .map(|&column| source.bind(column, GetterKind::Current))
            .collect::<Result<Vec<_>>>()?;

        let mut parts: Vec<Vec<XArray>> = vec![Vec::new(); getters.len()];
        let mut rows = 0;
        loop {
            check_cancelled(cancel)?;
            let count = source.next(self.batch_size, cancel)?;
            if count == 0 {
                break;
            }
            for (getter, parts) in getters.iter().zip(&mut parts) {
                parts.push(source.get(getter)?);
            }
            rows += count;
        }
        drop(source);

        let schema = self.result.schema().to_vec();
        let mut columns: Vec<XArray> = schema
            .iter()
            .map(|details| XArray::null(details.column_type(), rows))
            .collect();
        for ((&column, getter), parts) in bound.iter().zip(&getters).zip(&parts) {
            columns[column] = XArray::concat(getter.column_type(), parts)?;
        }
        info!("Cached {} rows of {} columns", rows, bound.len());

        let table = ArrayTable::from_columns(schema.into_iter().zip(columns).collect())?;
        self.result.install(table)
    }
}

impl XTable for MemoryCacher {
    fn schema(&self) -> &[ColumnDetails] {
        self.result.schema()
    }

    fn bind(&mut self, column: usize, kind: GetterKind) -> Result<Getter> {
        self.result.bind(column, kind)
    }

    fn next(&mut self, desired: usize, cancel: &CancellationToken) -> Result<usize> {
        if !self.result.is_built() {
            self.fill(cancel)?;
        }
        self.result.next(desired, cancel)
    }

    fn get(&mut self, getter: &Getter) -> Result<XArray> {
        self.result.get(getter)
    }

    fn seek(&mut self, getter: &Getter, rows: &ArraySelector) -> Result<XArray> {
        self.result.seek(getter, rows)
    }

    fn reset(&mut self) -> Result<()> {
        self.result.reset()
    }

    fn is_seekable(&self) -> bool {
        true
    }

    fn count(&self) -> Option<usize> {
        self.result.count()
    }
}

/// `cache`
pub fn build(parser: &mut XqlParser<'_>, source: Option<Box<dyn XTable>>) -> Result<Box<dyn XTable>> {
    let source = parser.require_source(source)?;
    debug!("cache {} columns", source.schema().len());
    let batch_size = parser.context().config.batch_size;
    Ok(Box::new(MemoryCacher::new(source, batch_size)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ColumnType;

    struct Once {
        schema: Vec<ColumnDetails>,
        values: XArray,
        bindings: crate::table::Bindings<()>,
        done: bool,
    }

    impl XTable for Once {
        fn schema(&self) -> &[ColumnDetails] {
            &self.schema
        }

        fn bind(&mut self, column: usize, kind: GetterKind) -> Result<Getter> {
            self.bindings.add(column, kind, self.values.column_type(), ())
        }

        fn next(&mut self, _desired: usize, _cancel: &CancellationToken) -> Result<usize> {
            if self.done {
                return Ok(0);
            }
            self.done = true;
            Ok(self.values.count())
        }

        fn get(&mut self, _getter: &Getter) -> Result<XArray> {
            Ok(self.values.clone())
        }

        fn reset(&mut self) -> Result<()> {
            Err(Error::protocol("this source cannot be replayed"))
        }
    }

    fn cacher() -> MemoryCacher {
        let source = Once {
            schema: vec![
                ColumnDetails::new("N", ColumnType::I32),
                ColumnDetails::new("M", ColumnType::I32),
            ],
            values: XArray::from_vec(vec![4i32, 5, 6]),
            bindings: crate::table::Bindings::new(),
            done: false,
        };
        MemoryCacher::new(Box::new(source), 2)
    }

    #[test]
    fn test_replays_from_memory() {
        let mut cache = cacher();
        let n = cache.bind(0, GetterKind::Current).unwrap();
        let cancel = CancellationToken::new();
        assert_eq!(cache.next(10, &cancel).unwrap(), 3);
        assert!(cache.is_cached());
        cache.reset().unwrap();
        assert_eq!(cache.next(2, &cancel).unwrap(), 2);
        assert_eq!(cache.get(&n).unwrap().get::<i32>(1).unwrap(), Some(5));
        assert_eq!(cache.count(), Some(3));
    }

    #[test]
    fn test_seek_after_fill() {
        let mut cache = cacher();
        let seek = cache.bind(0, GetterKind::Seek).unwrap();
        let cancel = CancellationToken::new();
        while cache.next(10, &cancel).unwrap() > 0 {}
        let rows = cache
            .seek(&seek, &ArraySelector::map_all(vec![2, 0].into()))
            .unwrap();
        assert_eq!(rows.get::<i32>(0).unwrap(), Some(6));
        assert_eq!(rows.get::<i32>(1).unwrap(), Some(4));
    }
}
