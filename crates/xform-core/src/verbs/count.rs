//! `count`

use crate::data::{ArraySelector, ColumnDetails, ColumnType, XArray};
use crate::query::parser::XqlParser;
use crate::table::{ArrayTable, Getter, GetterKind, Materialized, XTable, check_cancelled};
use crate::{Error, Result};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// One row holding the source row count
#[derive(Debug)]
pub struct CountTable {
    source: Option<Box<dyn XTable>>,
    result: Materialized,
    batch_size: usize,
}

impl CountTable {
    /// Count `source`, draining it in `batch_size` chunks unless it knows its count
    pub fn new(source: Box<dyn XTable>, batch_size: usize) -> Self {
        Self {
            source: Some(source),
            result: Materialized::new(vec![ColumnDetails::new("Count", ColumnType::I64)]),
            batch_size: batch_size.max(1),
        }
    }

    fn build(&mut self, cancel: &CancellationToken) -> Result<()> {
        let Some(mut source) = self.source.take() else {
            return Err(Error::internal("count source already consumed"));
        };
        let total = match source.count() {
            Some(count) => count,
            None => {
                let mut total = 0;
                loop {
                    check_cancelled(cancel)?;
                    let count = source.next(self.batch_size, cancel)?;
                    if count == 0 {
                        break;
                    }
                    total += count;
                }
                total
            }
        };
        info!("Counted {} rows", total);

        let total = i64::try_from(total).map_err(|_| Error::range("row count exceeds i64"))?;
        let table = ArrayTable::from_columns(vec![(
            self.result.schema()[0].clone(),
            XArray::from_vec(vec![total]),
        )])?;
        self.result.install(table)
    }
}

impl XTable for CountTable {
    fn schema(&self) -> &[ColumnDetails] {
        self.result.schema()
    }

    fn bind(&mut self, column: usize, kind: GetterKind) -> Result<Getter> {
        self.result.bind(column, kind)
    }

    fn next(&mut self, desired: usize, cancel: &CancellationToken) -> Result<usize> {
        if !self.result.is_built() {
            self.build(cancel)?;
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

    fn count(&self) -> Option<usize> {
        Some(1)
    }
}

/// `count`
pub fn build(parser: &mut XqlParser<'_>, source: Option<Box<dyn XTable>>) -> Result<Box<dyn XTable>> {
    let source = parser.require_source(source)?;
    let batch_size = parser.context().config.batch_size;
    Ok(Box::new(CountTable::new(source, batch_size)))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Unsized {
        remaining: usize,
    }

    impl XTable for Unsized {
        fn schema(&self) -> &[ColumnDetails] {
            &[]
        }

        fn bind(&mut self, _column: usize, _kind: GetterKind) -> Result<Getter> {
            Err(Error::protocol("no columns"))
        }

        fn next(&mut self, desired: usize, _cancel: &CancellationToken) -> Result<usize> {
            let count = desired.min(self.remaining);
            self.remaining -= count;
            Ok(count)
        }

        fn get(&mut self, _getter: &Getter) -> Result<XArray> {
            Err(Error::protocol("no columns"))
        }

        fn reset(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn run(table: &mut CountTable) -> i64 {
        let getter = table.bind(0, GetterKind::Current).unwrap();
        let cancel = CancellationToken::new();
        assert_eq!(table.next(100, &cancel).unwrap(), 1);
        let value = table.get(&getter).unwrap().get::<i64>(0).unwrap().unwrap();
        assert_eq!(table.next(100, &cancel).unwrap(), 0);
        value
    }

    #[test]
    fn test_counts_by_draining() {
        let mut table = CountTable::new(Box::new(Unsized { remaining: 2500 }), 1000);
        assert_eq!(run(&mut table), 2500);
    }

    #[test]
    fn test_uses_known_count() {
        let source = ArrayTable::builder()
            .column("A", XArray::from_vec(vec![1u8; 42]))
            .build()
            .unwrap();
        let mut table = CountTable::new(Box::new(source), 10);
        assert_eq!(run(&mut table), 42);
    }
}
