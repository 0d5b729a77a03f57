//! `limit {RowCount}` and `skip {RowCount}`
//!
//! Both trim upstream batches by row offsets. Upstream tables may return more
//! rows than requested (filters do), so the current batch is sliced whenever
//! it straddles the boundary.

use crate::data::{ColumnDetails, XArray};
use crate::query::parser::XqlParser;
use crate::table::{Bindings, ColumnTraits, Getter, GetterKind, XTable, check_cancelled};
use crate::{Error, Result};
use tokio_util::sync::CancellationToken;
use tracing::debug;

fn bind_passthrough(
    source: &mut dyn XTable,
    bindings: &mut Bindings<Getter>,
    column: usize,
    kind: GetterKind,
) -> Result<Getter> {
    if kind == GetterKind::Seek {
        return Err(Error::protocol("seek getters are not available through limit or skip"));
    }
    let upstream = source.bind(column, kind)?;
    bindings.add(column, kind, upstream.column_type(), upstream)
}

fn traits_without_seek(source: &dyn XTable, column: usize) -> ColumnTraits {
    ColumnTraits {
        seekable: false,
        enum_values: source.column_traits(column).enum_values,
    }
}

/// First `limit` rows of a source
#[derive(Debug)]
pub struct LimitTable {
    source: Box<dyn XTable>,
    limit: usize,
    remaining: usize,
    bindings: Bindings<Getter>,
    row_count: usize,
}

impl LimitTable {
    /// Keep at most `limit` rows
    pub fn new(source: Box<dyn XTable>, limit: usize) -> Self {
        Self {
            source,
            limit,
            remaining: limit,
            bindings: Bindings::new(),
            row_count: 0,
        }
    }
}

impl XTable for LimitTable {
    fn schema(&self) -> &[ColumnDetails] {
        self.source.schema()
    }

    fn column_traits(&self, column: usize) -> ColumnTraits {
        traits_without_seek(self.source.as_ref(), column)
    }

    fn bind(&mut self, column: usize, kind: GetterKind) -> Result<Getter> {
        bind_passthrough(self.source.as_mut(), &mut self.bindings, column, kind)
    }

    fn next(&mut self, desired: usize, cancel: &CancellationToken) -> Result<usize> {
        self.bindings.start();
        if self.remaining == 0 {
            self.row_count = 0;
            return Ok(0);
        }
        let count = self.source.next(desired.min(self.remaining), cancel)?;
        self.row_count = count.min(self.remaining);
        self.remaining -= self.row_count;
        Ok(self.row_count)
    }

    fn get(&mut self, getter: &Getter) -> Result<XArray> {
        let upstream = *self.bindings.slot(getter)?;
        let array = self.source.get(&upstream)?;
        if upstream.kind() == GetterKind::Values || array.count() == self.row_count {
            Ok(array)
        } else {
            array.slice(0, self.row_count)
        }
    }

    fn reset(&mut self) -> Result<()> {
        self.remaining = self.limit;
        self.row_count = 0;
        self.source.reset()
    }

    fn count(&self) -> Option<usize> {
        self.source.count().map(|count| count.min(self.limit))
    }
}

/// A source without its first `skip` rows
#[derive(Debug)]
pub struct SkipTable {
    source: Box<dyn XTable>,
    skip: usize,
    skipped: usize,
    offset: usize,
    bindings: Bindings<Getter>,
    row_count: usize,
    batch_size: usize,
}

impl SkipTable {
    /// Drop the first `skip` rows; skipped rows are pulled in `batch_size` chunks
    pub fn new(source: Box<dyn XTable>, skip: usize, batch_size: usize) -> Self {
        Self {
            source,
            skip,
            skipped: 0,
            offset: 0,
            bindings: Bindings::new(),
            row_count: 0,
            batch_size: batch_size.max(1),
        }
    }
}

impl XTable for SkipTable {
    fn schema(&self) -> &[ColumnDetails] {
        self.source.schema()
    }

    fn column_traits(&self, column: usize) -> ColumnTraits {
        traits_without_seek(self.source.as_ref(), column)
    }

    fn bind(&mut self, column: usize, kind: GetterKind) -> Result<Getter> {
        bind_passthrough(self.source.as_mut(), &mut self.bindings, column, kind)
    }

    fn next(&mut self, desired: usize, cancel: &CancellationToken) -> Result<usize> {
        self.bindings.start();
        self.offset = 0;

        while self.skipped < self.skip {
            check_cancelled(cancel)?;
            let wanted = (self.skip - self.skipped).min(self.batch_size);
            let count = self.source.next(wanted, cancel)?;
            if count == 0 {
                self.row_count = 0;
                return Ok(0);
            }
            let dropped = count.min(self.skip - self.skipped);
            self.skipped += dropped;
            if dropped < count {
                self.offset = dropped;
                self.row_count = count - dropped;
                return Ok(self.row_count);
            }
        }

        self.row_count = self.source.next(desired, cancel)?;
        Ok(self.row_count)
    }

    fn get(&mut self, getter: &Getter) -> Result<XArray> {
        let upstream = *self.bindings.slot(getter)?;
        let array = self.source.get(&upstream)?;
        if upstream.kind() == GetterKind::Values || self.offset == 0 {
            Ok(array)
        } else {
            array.slice(self.offset, self.row_count)
        }
    }

    fn reset(&mut self) -> Result<()> {
        self.skipped = 0;
        self.offset = 0;
        self.row_count = 0;
        self.source.reset()
    }

    fn count(&self) -> Option<usize> {
        self.source
            .count()
            .map(|count| count.saturating_sub(self.skip))
    }
}

/// `limit {RowCount}`
pub fn build_limit(
    parser: &mut XqlParser<'_>,
    source: Option<Box<dyn XTable>>,
) -> Result<Box<dyn XTable>> {
    let source = parser.require_source(source)?;
    let limit = parser.next_count("row count")?;
    debug!("limit {}", limit);
    Ok(Box::new(LimitTable::new(source, limit)))
}

/// `skip {RowCount}`
pub fn build_skip(
    parser: &mut XqlParser<'_>,
    source: Option<Box<dyn XTable>>,
) -> Result<Box<dyn XTable>> {
    let source = parser.require_source(source)?;
    let skip = parser.next_count("row count")?;
    debug!("skip {}", skip);
    let batch_size = parser.context().config.batch_size;
    Ok(Box::new(SkipTable::new(source, skip, batch_size)))
}
