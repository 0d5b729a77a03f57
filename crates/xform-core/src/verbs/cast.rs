//! `cast {Column} {Type} [Strict|Lenient] [{Default}]`

use crate::data::convert::{ConversionMode, can_convert, convert_array, parse_literal};
use crate::data::{ArraySelector, ColumnDetails, ColumnType, XArray};
use crate::query::parser::XqlParser;
use crate::query::usage::UsageError;
use crate::table::{Bindings, ColumnTraits, Getter, GetterKind, XTable, check_bind};
use crate::{Error, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug)]
enum Slot {
    Upstream(Getter),
    Converted(Getter),
}

/// Source with one column converted to another type
#[derive(Debug)]
pub struct CastTable {
    source: Box<dyn XTable>,
    schema: Vec<ColumnDetails>,
    column: usize,
    mode: ConversionMode,
    default: Option<String>,
    bindings: Bindings<Slot>,
    failures: usize,
}

impl CastTable {
    /// Convert `column` to `to`
    pub fn new(
        source: Box<dyn XTable>,
        column: usize,
        to: ColumnType,
        mode: ConversionMode,
        default: Option<String>,
    ) -> Result<Self> {
        let from = source
            .schema()
            .get(column)
            .ok_or_else(|| Error::internal(format!("cast of missing column {column}")))?
            .column_type();
        if !can_convert(from, to) {
            return Err(UsageError::new("type", to.name(), Vec::new())
                .with_message(format!("{from} cannot be cast to {to}"))
                .into());
        }
        if let Some(text) = &default {
            parse_literal(text, to).map_err(|_| {
                Error::from(
                    UsageError::new("default", text, Vec::new())
                        .with_message(format!("not a valid {to}")),
                )
            })?;
        }

        let mut schema = source.schema().to_vec();
        schema[column] = schema[column].change_type(to);
        Ok(Self {
            source,
            schema,
            column,
            mode,
            default,
            bindings: Bindings::new(),
            failures: 0,
        })
    }

    /// Values that failed to convert so far (lenient mode)
    pub fn failures(&self) -> usize {
        self.failures
    }
}

impl XTable for CastTable {
    fn schema(&self) -> &[ColumnDetails] {
        &self.schema
    }

    fn column_traits(&self, column: usize) -> ColumnTraits {
        let traits = self.source.column_traits(column);
        if column == self.column {
            ColumnTraits {
                seekable: traits.seekable,
                enum_values: false,
            }
        } else {
            traits
        }
    }

    fn bind(&mut self, column: usize, kind: GetterKind) -> Result<Getter> {
        if column != self.column {
            let upstream = self.source.bind(column, kind)?;
            return self
                .bindings
                .add(column, kind, upstream.column_type(), Slot::Upstream(upstream));
        }
        let column_type = check_bind(&self.schema, self.column_traits(column), column, kind)?;
        let upstream = self.source.bind(column, kind)?;
        self.bindings
            .add(column, kind, column_type, Slot::Converted(upstream))
    }

    fn next(&mut self, desired: usize, cancel: &CancellationToken) -> Result<usize> {
        self.bindings.start();
        let count = self.source.next(desired, cancel)?;
        if count == 0 && self.failures > 0 {
            warn!(
                "cast of [{}] to {} replaced {} unconvertible values",
                self.schema[self.column].name(),
                self.schema[self.column].column_type(),
                self.failures
            );
        }
        Ok(count)
    }

    fn get(&mut self, getter: &Getter) -> Result<XArray> {
        match *self.bindings.slot(getter)? {
            Slot::Upstream(upstream) => self.source.get(&upstream),
            Slot::Converted(upstream) => {
                let array = self.source.get(&upstream)?;
                self.convert(&array)
            }
        }
    }

    fn seek(&mut self, getter: &Getter, rows: &ArraySelector) -> Result<XArray> {
        match *self.bindings.slot(getter)? {
            Slot::Upstream(upstream) => self.source.seek(&upstream, rows),
            Slot::Converted(upstream) => {
                let array = self.source.seek(&upstream, rows)?;
                self.convert(&array)
            }
        }
    }

    fn reset(&mut self) -> Result<()> {
        self.failures = 0;
        self.source.reset()
    }

    fn is_seekable(&self) -> bool {
        self.source.is_seekable()
    }

    fn count(&self) -> Option<usize> {
        self.source.count()
    }
}

impl CastTable {
    fn convert(&mut self, array: &XArray) -> Result<XArray> {
        let to = self.schema[self.column].column_type();
        let converted = convert_array(array, to, self.mode, self.default.as_deref())?;
        self.failures += converted.failures;
        Ok(converted.array)
    }
}

/// `cast {Column} {Type} [Strict|Lenient] [{Default}]`
pub fn build(parser: &mut XqlParser<'_>, source: Option<Box<dyn XTable>>) -> Result<Box<dyn XTable>> {
    let source = parser.require_source(source)?;
    let column = parser.next_column(source.as_ref())?;
    let to = parser.next_type()?;

    let mut mode = if parser.context().config.strict_cast {
        ConversionMode::Strict
    } else {
        ConversionMode::Lenient
    };
    if parser.has_another_argument() {
        if let Some(explicit) = ConversionMode::parse(&parser.current().value) {
            parser.advance();
            mode = explicit;
        }
    }
    let default = if parser.has_another_argument() {
        Some(parser.next_value("default")?)
    } else {
        None
    };

    debug!("cast column {} to {} ({:?})", column, to, mode);
    Ok(Box::new(CastTable::new(source, column, to, mode, default)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::ArrayTable;

    fn source() -> Box<dyn XTable> {
        Box::new(
            ArrayTable::builder()
                .column("Text", XArray::from_strs(&["1", "two", "3"]))
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_lenient_cast_counts_failures() {
        let mut table = CastTable::new(source(), 0, ColumnType::I64, ConversionMode::Lenient, None)
            .unwrap();
        assert_eq!(table.schema()[0].column_type(), ColumnType::I64);
        let getter = table.bind(0, GetterKind::Current).unwrap();
        assert_eq!(getter.column_type(), ColumnType::I64);
        let cancel = CancellationToken::new();
        table.next(10, &cancel).unwrap();
        let values = table.get(&getter).unwrap();
        assert_eq!(values.get::<i64>(0).unwrap(), Some(1));
        assert!(values.is_null(1));
        assert_eq!(table.failures(), 1);
    }

    #[test]
    fn test_strict_cast_fails_batch() {
        let mut table = CastTable::new(source(), 0, ColumnType::I64, ConversionMode::Strict, None)
            .unwrap();
        let getter = table.bind(0, GetterKind::Current).unwrap();
        let cancel = CancellationToken::new();
        table.next(10, &cancel).unwrap();
        assert!(matches!(table.get(&getter), Err(Error::Conversion { .. })));
    }

    #[test]
    fn test_rejects_impossible_cast_and_bad_default() {
        let numbers: Box<dyn XTable> = Box::new(
            ArrayTable::builder()
                .column("N", XArray::from_vec(vec![1i32]))
                .build()
                .unwrap(),
        );
        assert!(
            CastTable::new(numbers, 0, ColumnType::DateTime, ConversionMode::Lenient, None).is_err()
        );
        assert!(CastTable::new(
            source(),
            0,
            ColumnType::I32,
            ConversionMode::Lenient,
            Some("x".into())
        )
        .is_err());
    }
}
