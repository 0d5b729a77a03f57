//! `set {Column} {Value}`
//!
//! Replaces a column (or appends a new one) with a scalar expression. Other
//! columns pass through to the source.

use crate::data::{ArraySelector, ColumnDetails, XArray, find_column};
use crate::query::expression::{BoundScalar, ScalarExpr};
use crate::query::parser::XqlParser;
use crate::table::{Bindings, ColumnTraits, Getter, GetterKind, XTable, check_bind};
use crate::{Error, Result};
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug)]
enum Slot {
    Upstream(Getter),
    Computed,
}

/// Source with one column computed from an expression
#[derive(Debug)]
pub struct SetTable {
    source: Box<dyn XTable>,
    schema: Vec<ColumnDetails>,
    target: usize,
    expression: ScalarExpr,
    bound: Option<BoundScalar>,
    bindings: Bindings<Slot>,
    row_count: usize,
}

impl SetTable {
    /// Set column `name` (replacing a same-named column) to `expression`
    pub fn new(source: Box<dyn XTable>, name: &str, expression: ScalarExpr) -> Self {
        let mut schema = source.schema().to_vec();
        let details = ColumnDetails::new(name, expression.column_type());
        let target = match find_column(&schema, name) {
            Some(index) => {
                schema[index] = details.rename(schema[index].name());
                index
            }
            None => {
                schema.push(details);
                schema.len() - 1
            }
        };
        Self {
            source,
            schema,
            target,
            expression,
            bound: None,
            bindings: Bindings::new(),
            row_count: 0,
        }
    }
}

impl XTable for SetTable {
    fn schema(&self) -> &[ColumnDetails] {
        &self.schema
    }

    fn column_traits(&self, column: usize) -> ColumnTraits {
        if column == self.target {
            ColumnTraits::default()
        } else {
            self.source.column_traits(column)
        }
    }

    fn bind(&mut self, column: usize, kind: GetterKind) -> Result<Getter> {
        if column != self.target {
            let upstream = self.source.bind(column, kind)?;
            return self
                .bindings
                .add(column, kind, upstream.column_type(), Slot::Upstream(upstream));
        }

        let column_type = check_bind(&self.schema, self.column_traits(column), column, kind)?;
        if self.bound.is_none() {
            self.bound = Some(self.expression.bind(self.source.as_mut())?);
        }
        self.bindings.add(column, kind, column_type, Slot::Computed)
    }

    fn next(&mut self, desired: usize, cancel: &CancellationToken) -> Result<usize> {
        self.bindings.start();
        self.row_count = self.source.next(desired, cancel)?;
        Ok(self.row_count)
    }

    fn get(&mut self, getter: &Getter) -> Result<XArray> {
        match self.bindings.slot(getter)? {
            Slot::Upstream(upstream) => {
                let upstream = *upstream;
                self.source.get(&upstream)
            }
            Slot::Computed => {
                let bound = self
                    .bound
                    .as_ref()
                    .ok_or_else(|| Error::internal("computed column was never bound"))?;
                bound.evaluate(self.source.as_mut(), self.row_count)
            }
        }
    }

    fn seek(&mut self, getter: &Getter, rows: &ArraySelector) -> Result<XArray> {
        match self.bindings.slot(getter)? {
            Slot::Upstream(upstream) => {
                let upstream = *upstream;
                self.source.seek(&upstream, rows)
            }
            Slot::Computed => Err(Error::protocol("computed columns are not seekable")),
        }
    }

    fn reset(&mut self) -> Result<()> {
        self.row_count = 0;
        self.source.reset()
    }

    fn count(&self) -> Option<usize> {
        self.source.count()
    }
}

/// `set {Column} {Value}`
pub fn build(parser: &mut XqlParser<'_>, source: Option<Box<dyn XTable>>) -> Result<Box<dyn XTable>> {
    let source = parser.require_source(source)?;
    let name = parser.next_output_column_name()?;
    let expression = parser.next_scalar(source.as_ref())?;
    debug!("set [{}] = {}", name, expression);
    Ok(Box::new(SetTable::new(source, &name, expression)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ColumnType, String8};
    use crate::query::functions;
    use crate::query::expression::FunctionCall;
    use crate::table::ArrayTable;

    fn source() -> Box<dyn XTable> {
        Box::new(
            ArrayTable::builder()
                .column("Name", XArray::from_strs(&["ab", "c"]))
                .column("N", XArray::from_vec(vec![1i32, 2]))
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_set_appends_constant() {
        let mut table = SetTable::new(source(), "Flag", ScalarExpr::literal("yes"));
        assert_eq!(table.schema().len(), 3);
        let flag = table.bind(2, GetterKind::Current).unwrap();
        let n = table.bind(1, GetterKind::Current).unwrap();
        let cancel = CancellationToken::new();
        assert_eq!(table.next(10, &cancel).unwrap(), 2);
        let values = table.get(&flag).unwrap();
        assert_eq!(values.count(), 2);
        assert_eq!(values.get::<String8>(1).unwrap().unwrap().as_str(), "yes");
        assert_eq!(table.get(&n).unwrap().get::<i32>(0).unwrap(), Some(1));
    }

    #[test]
    fn test_set_replaces_with_function() {
        let source = source();
        let function = functions::lookup("Length")
            .unwrap()
            .resolve(&[ColumnType::String])
            .unwrap();
        let expression = ScalarExpr::Function(FunctionCall {
            function,
            args: vec![ScalarExpr::column(0, source.schema()[0].clone())],
        });
        let mut table = SetTable::new(source, "name", expression);
        assert_eq!(table.schema().len(), 2);
        assert_eq!(table.schema()[0].name(), "Name");
        assert_eq!(table.schema()[0].column_type(), ColumnType::I32);

        let name = table.bind(0, GetterKind::Current).unwrap();
        let cancel = CancellationToken::new();
        table.next(10, &cancel).unwrap();
        assert_eq!(table.get(&name).unwrap().get::<i32>(0).unwrap(), Some(2));
    }
}
