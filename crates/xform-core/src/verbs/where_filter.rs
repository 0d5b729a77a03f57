//! `where {Condition}`
//!
//! Evaluates the condition into a [`BitVector`](crate::data::BitVector) per upstream batch and narrows
//! every requested column through one shared [`RowRemapper`]. Batches with no
//! matches are skipped, so `next` only returns `0` at the end of the source.

use crate::data::{ColumnDetails, RowRemapper, XArray};
use crate::query::expression::{BoundExpr, Expr};
use crate::query::parser::XqlParser;
use crate::table::{Bindings, ColumnTraits, Getter, GetterKind, XTable, check_cancelled};
use crate::{Error, Result};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Smallest upstream request once the selectivity is known
pub const MIN_REQUEST: usize = 256;
/// Growth cap relative to the consumer's request
pub const MAX_REQUEST_FACTOR: usize = 16;
/// Rows retrieved without any match before requesting full batches
pub const NO_MATCH_THRESHOLD: usize = 1024;

/// Rows of a source matching a condition
#[derive(Debug)]
pub struct WhereTable {
    source: Box<dyn XTable>,
    expression: Expr,
    bound: Option<BoundExpr>,
    bindings: Bindings<Getter>,
    remapper: RowRemapper,
    batch_cap: usize,
    retrieved: usize,
    matched: usize,
}

impl WhereTable {
    /// Filter `source` by `expression`; `batch_cap` bounds upstream requests
    pub fn new(source: Box<dyn XTable>, expression: Expr, batch_cap: usize) -> Self {
        Self {
            source,
            expression,
            bound: None,
            bindings: Bindings::new(),
            remapper: RowRemapper::new(),
            batch_cap: batch_cap.max(1),
            retrieved: 0,
            matched: 0,
        }
    }

    /// The condition
    pub fn expression(&self) -> &Expr {
        &self.expression
    }

    /// Upstream rows to request so that roughly `desired` rows match
    pub fn request_size(&self, desired: usize) -> usize {
        let desired = desired.max(1);
        if self.matched == 0 {
            return if self.retrieved > NO_MATCH_THRESHOLD {
                self.batch_cap
            } else {
                desired.min(self.batch_cap)
            };
        }
        let ratio = self.retrieved as f64 / self.matched as f64;
        let estimate = (desired as f64 * ratio).ceil() as usize;
        // The floor wins over the growth cap; only the batch cap bounds it
        estimate
            .min(desired.saturating_mul(MAX_REQUEST_FACTOR))
            .max(MIN_REQUEST)
            .min(self.batch_cap)
    }
}

impl XTable for WhereTable {
    fn schema(&self) -> &[ColumnDetails] {
        self.source.schema()
    }

    fn column_traits(&self, column: usize) -> ColumnTraits {
        ColumnTraits {
            seekable: false,
            enum_values: self.source.column_traits(column).enum_values,
        }
    }

    fn bind(&mut self, column: usize, kind: GetterKind) -> Result<Getter> {
        if kind == GetterKind::Seek {
            return Err(Error::protocol("seek getters are not available through where"));
        }
        let upstream = self.source.bind(column, kind)?;
        self.bindings
            .add(column, kind, upstream.column_type(), upstream)
    }

    fn next(&mut self, desired: usize, cancel: &CancellationToken) -> Result<usize> {
        if self.bound.is_none() {
            self.bound = Some(self.expression.bind(self.source.as_mut())?);
        }
        self.bindings.start();

        loop {
            check_cancelled(cancel)?;
            let request = self.request_size(desired);
            let count = self.source.next(request, cancel)?;
            if count == 0 {
                return Ok(0);
            }

            let bound = self
                .bound
                .as_ref()
                .ok_or_else(|| Error::internal("condition was never bound"))?;
            let matches = bound.evaluate(self.source.as_mut(), count)?;
            let matched = matches.count();
            self.retrieved += count;
            self.matched += matched;

            if matched > 0 {
                self.remapper.set_matches(&matches, count);
                return Ok(matched);
            }
        }
    }

    fn get(&mut self, getter: &Getter) -> Result<XArray> {
        let upstream = *self.bindings.slot(getter)?;
        let array = self.source.get(&upstream)?;
        if upstream.kind() == GetterKind::Values {
            return Ok(array);
        }
        self.remapper.remap(&array)
    }

    fn reset(&mut self) -> Result<()> {
        self.source.reset()
    }
}

/// `where {Condition}`
pub fn build(parser: &mut XqlParser<'_>, source: Option<Box<dyn XTable>>) -> Result<Box<dyn XTable>> {
    let source = parser.require_source(source)?;
    let expression = parser.next_expression(source.as_ref())?;
    debug!("where {}", expression);
    let batch_cap = parser.context().config.batch_size;
    Ok(Box::new(WhereTable::new(source, expression, batch_cap)))
}
