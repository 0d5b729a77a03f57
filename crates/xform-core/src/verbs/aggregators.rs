//! Aggregators for `groupBy`
//!
//! An aggregator keeps one state slot per bucket. `groupBy` hands it the
//! bucket of every row in a batch and later asks for one output value per
//! emitted bucket.

use crate::data::{ColumnDetails, ColumnType, Num, XArray, XValue};
use crate::dispatch_type;
use crate::query::parser::XqlParser;
use crate::query::scanner::TokenKind;
use crate::query::usage::UsageError;
use crate::table::{Getter, GetterKind, XTable};
use crate::{Error, Result};
use std::cmp::Ordering;
use std::fmt::Debug;

/// Per-bucket accumulator producing one output column
pub trait Aggregator: Debug {
    /// Output column
    fn output(&self) -> ColumnDetails;

    /// Request the getters this aggregator reads
    fn bind(&mut self, source: &mut dyn XTable) -> Result<()>;

    /// Fold the current batch in; `buckets[row]` is the bucket of `row` and
    /// every id is below `bucket_count`
    fn add(&mut self, source: &mut dyn XTable, buckets: &[u32], bucket_count: usize) -> Result<()>;

    /// Values for `buckets`, in that order
    fn finish(&self, buckets: &[u32]) -> Result<XArray>;
}

/// Builds an aggregator from the parser, positioned inside its parentheses
pub type AggregatorBuilder = fn(&mut XqlParser<'_>, &dyn XTable) -> Result<Box<dyn Aggregator>>;

/// Registry entry
pub struct AggregatorEntry {
    /// Name as written
    pub name: &'static str,
    /// Usage line shown in errors
    pub usage: &'static str,
    /// Builder
    pub build: AggregatorBuilder,
}

/// Every aggregator `groupBy` accepts
pub static AGGREGATORS: &[AggregatorEntry] = &[
    AggregatorEntry {
        name: "Count",
        usage: "Count()",
        build: build_count,
    },
    AggregatorEntry {
        name: "Sum",
        usage: "Sum({Numeric})",
        build: build_sum,
    },
    AggregatorEntry {
        name: "Min",
        usage: "Min({Column})",
        build: build_min,
    },
    AggregatorEntry {
        name: "Max",
        usage: "Max({Column})",
        build: build_max,
    },
];

/// Names of every aggregator, as written with their parentheses
pub fn aggregator_names() -> Vec<String> {
    AGGREGATORS.iter().map(|a| format!("{}(", a.name)).collect()
}

/// Parse one `Name(...)` aggregator over `source`
pub fn next_aggregator(parser: &mut XqlParser<'_>, source: &dyn XTable) -> Result<Box<dyn Aggregator>> {
    let token = parser.current().clone();
    let entry = match token.kind {
        TokenKind::FunctionName => AGGREGATORS
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(&token.value)),
        _ => None,
    };
    let Some(entry) = entry else {
        let shown = match token.kind {
            TokenKind::NextTokenHint | TokenKind::Newline | TokenKind::End => "",
            _ => token.value.as_str(),
        };
        return Err(UsageError::new("aggregator", shown, aggregator_names()).into());
    };
    // name, then the '(' the scanner guarantees after it
    parser.advance();
    parser.advance();

    let with_usage = |e: Error| match e {
        Error::Usage(usage) => Error::Usage(usage.with_usage(entry.usage)),
        other => other,
    };
    let aggregator = (entry.build)(parser, source).map_err(with_usage)?;
    if parser.current().kind != TokenKind::CloseParen {
        let found = parser.current().value.clone();
        return Err(with_usage(
            UsageError::new("token", &found, vec![")".to_string()]).into(),
        ));
    }
    parser.advance();
    Ok(aggregator)
}

fn build_count(_parser: &mut XqlParser<'_>, _source: &dyn XTable) -> Result<Box<dyn Aggregator>> {
    Ok(Box::new(CountAggregator::default()))
}

fn build_sum(parser: &mut XqlParser<'_>, source: &dyn XTable) -> Result<Box<dyn Aggregator>> {
    let column = parser.next_column(source)?;
    Ok(Box::new(SumAggregator::new(column, &source.schema()[column])?))
}

fn build_min(parser: &mut XqlParser<'_>, source: &dyn XTable) -> Result<Box<dyn Aggregator>> {
    let column = parser.next_column(source)?;
    Ok(Box::new(ExtremeAggregator::min(column, &source.schema()[column])))
}

fn build_max(parser: &mut XqlParser<'_>, source: &dyn XTable) -> Result<Box<dyn Aggregator>> {
    let column = parser.next_column(source)?;
    Ok(Box::new(ExtremeAggregator::max(column, &source.schema()[column])))
}

fn getter(slot: &Option<Getter>) -> Result<Getter> {
    slot.ok_or_else(|| Error::protocol("aggregator read before it was bound"))
}

/// `Count()`: rows per bucket
#[derive(Debug, Default)]
pub struct CountAggregator {
    counts: Vec<i64>,
}

impl Aggregator for CountAggregator {
    fn output(&self) -> ColumnDetails {
        ColumnDetails::new("Count", ColumnType::I64)
    }

    fn bind(&mut self, _source: &mut dyn XTable) -> Result<()> {
        Ok(())
    }

    fn add(&mut self, _source: &mut dyn XTable, buckets: &[u32], bucket_count: usize) -> Result<()> {
        self.counts.resize(bucket_count, 0);
        for &bucket in buckets {
            self.counts[bucket as usize] += 1;
        }
        Ok(())
    }

    fn finish(&self, buckets: &[u32]) -> Result<XArray> {
        Ok(XArray::from_vec(
            buckets
                .iter()
                .map(|&b| self.counts.get(b as usize).copied().unwrap_or(0))
                .collect(),
        ))
    }
}

/// `Sum([Column])`: `int64` for integer columns, `float64` for floats; null
/// when a bucket has no non-null value
#[derive(Debug)]
pub struct SumAggregator {
    column: usize,
    output: ColumnDetails,
    getter: Option<Getter>,
    integers: Vec<i128>,
    floats: Vec<f64>,
    seen: Vec<bool>,
}

impl SumAggregator {
    /// Sum of `column`, which must be numeric
    pub fn new(column: usize, details: &ColumnDetails) -> Result<Self> {
        let input = details.column_type();
        if !input.is_numeric() {
            return Err(UsageError::new("column", details.name(), Vec::new())
                .with_message(format!("cannot sum {input} values"))
                .into());
        }
        let output_type = if input.is_integer() {
            ColumnType::I64
        } else {
            ColumnType::F64
        };
        Ok(Self {
            column,
            output: ColumnDetails::new(format!("{}.Sum", details.name()), output_type),
            getter: None,
            integers: Vec::new(),
            floats: Vec::new(),
            seen: Vec::new(),
        })
    }

    fn add_typed<T: XValue>(&mut self, batch: &XArray, buckets: &[u32]) -> Result<()> {
        let view = batch.typed::<T>()?;
        for (row, &bucket) in buckets.iter().enumerate() {
            let Some(value) = view.get(row) else {
                continue;
            };
            let bucket = bucket as usize;
            match value.to_num() {
                Some(Num::Int(i)) => {
                    self.integers[bucket] = self.integers[bucket]
                        .checked_add(i)
                        .ok_or_else(|| Error::range(format!("{} overflowed", self.output.name())))?;
                }
                Some(Num::Float(f)) => self.floats[bucket] += f,
                None => continue,
            }
            self.seen[bucket] = true;
        }
        Ok(())
    }
}

impl Aggregator for SumAggregator {
    fn output(&self) -> ColumnDetails {
        self.output.clone()
    }

    fn bind(&mut self, source: &mut dyn XTable) -> Result<()> {
        self.getter = Some(source.bind(self.column, GetterKind::Current)?);
        Ok(())
    }

    fn add(&mut self, source: &mut dyn XTable, buckets: &[u32], bucket_count: usize) -> Result<()> {
        let batch = source.get(&getter(&self.getter)?)?;
        self.integers.resize(bucket_count, 0);
        self.floats.resize(bucket_count, 0.0);
        self.seen.resize(bucket_count, false);
        dispatch_type!(batch.column_type(), T => self.add_typed::<T>(&batch, buckets))
    }

    fn finish(&self, buckets: &[u32]) -> Result<XArray> {
        let seen = |b: usize| self.seen.get(b).copied().unwrap_or(false);
        if self.output.column_type() == ColumnType::F64 {
            return Ok(XArray::from_options(
                buckets
                    .iter()
                    .map(|&b| seen(b as usize).then(|| self.floats[b as usize]))
                    .collect(),
            ));
        }
        let mut values = Vec::with_capacity(buckets.len());
        for &bucket in buckets {
            let bucket = bucket as usize;
            if !seen(bucket) {
                values.push(None);
                continue;
            }
            let sum = i64::try_from(self.integers[bucket])
                .map_err(|_| Error::range(format!("{} exceeds int64", self.output.name())))?;
            values.push(Some(sum));
        }
        Ok(XArray::from_options(values))
    }
}

trait ExtremeState: Debug {
    fn add(&mut self, batch: &XArray, buckets: &[u32], bucket_count: usize) -> Result<()>;
    fn finish(&self, buckets: &[u32]) -> XArray;
}

#[derive(Debug)]
struct TypedExtreme<T: XValue> {
    best: Vec<Option<T>>,
    wins: Ordering,
}

impl<T: XValue> ExtremeState for TypedExtreme<T> {
    fn add(&mut self, batch: &XArray, buckets: &[u32], bucket_count: usize) -> Result<()> {
        self.best.resize(bucket_count, None);
        let view = batch.typed::<T>()?;
        for (row, &bucket) in buckets.iter().enumerate() {
            let Some(value) = view.get(row) else {
                continue;
            };
            let slot = &mut self.best[bucket as usize];
            let replace = match slot {
                Some(current) => value.total_cmp(current) == self.wins,
                None => true,
            };
            if replace {
                *slot = Some(T::from_key(&value.to_key()));
            }
        }
        Ok(())
    }

    fn finish(&self, buckets: &[u32]) -> XArray {
        XArray::from_options(
            buckets
                .iter()
                .map(|&b| self.best.get(b as usize).cloned().flatten())
                .collect(),
        )
    }
}

/// `Min([Column])` / `Max([Column])` under each type's total order
#[derive(Debug)]
pub struct ExtremeAggregator {
    column: usize,
    output: ColumnDetails,
    getter: Option<Getter>,
    state: Box<dyn ExtremeState>,
}

impl ExtremeAggregator {
    /// Smallest value of `column` per bucket
    pub fn min(column: usize, details: &ColumnDetails) -> Self {
        Self::new(column, details, "Min", Ordering::Less)
    }

    /// Largest value of `column` per bucket
    pub fn max(column: usize, details: &ColumnDetails) -> Self {
        Self::new(column, details, "Max", Ordering::Greater)
    }

    fn new(column: usize, details: &ColumnDetails, suffix: &str, wins: Ordering) -> Self {
        let column_type = details.column_type();
        let state = dispatch_type!(column_type, T => Box::new(TypedExtreme::<T> {
            best: Vec::new(),
            wins,
        }) as Box<dyn ExtremeState>);
        Self {
            column,
            output: ColumnDetails::new(format!("{}.{suffix}", details.name()), column_type),
            getter: None,
            state,
        }
    }
}

impl Aggregator for ExtremeAggregator {
    fn output(&self) -> ColumnDetails {
        self.output.clone()
    }

    fn bind(&mut self, source: &mut dyn XTable) -> Result<()> {
        self.getter = Some(source.bind(self.column, GetterKind::Current)?);
        Ok(())
    }

    fn add(&mut self, source: &mut dyn XTable, buckets: &[u32], bucket_count: usize) -> Result<()> {
        let batch = source.get(&getter(&self.getter)?)?;
        self.state.add(&batch, buckets, bucket_count)
    }

    fn finish(&self, buckets: &[u32]) -> Result<XArray> {
        Ok(self.state.finish(buckets))
    }
}
