//! `peek {Column}`
//!
//! Approximate most-common values of one column: the top 20 values covering
//! at least 0.5% of rows, to within ±1% at 95% confidence.
//!
//! Rows are counted into up to five nested samples at once: every row, then
//! successive random eighths of the previous sample. When a smaller sample
//! reaches [`REQUIRED_SAMPLE`] rows, the larger samples above it stop
//! collecting. The smallest sample still collecting at the end is reported,
//! scaled up to the full row count. Counts are exact when it is the
//! all-rows sample.
//!
//! A sample in which no value repeats is reported as empty. This assumes the
//! rest of the column is as spread out as the sample, which is a heuristic.

use crate::data::{ArraySelector, ColumnDetails, ColumnType, String8, XArray, XValue};
use crate::dictionary::KeyDictionary;
use crate::dispatch_type;
use crate::query::parser::XqlParser;
use crate::table::{ArrayTable, Getter, GetterKind, Materialized, XTable, check_cancelled};
use crate::{Error, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt::Debug;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Nested samples counted at once
pub const SAMPLE_LEVELS: usize = 5;
/// Each sample keeps one row in this many of the sample above it
pub const SAMPLE_DENOMINATOR: u32 = 8;
/// Rows needed for ±1% at 95% confidence
pub const REQUIRED_SAMPLE: u64 = 9604;
/// Values reported at most
pub const TOP_VALUES: usize = 20;
/// Smallest share of rows a reported value covers, in 1/1000ths
const MIN_SHARE_PER_MILLE: u64 = 5;

#[derive(Debug)]
struct Level<T: XValue> {
    counts: KeyDictionary<T, u64>,
    nulls: u64,
    observed: u64,
}

impl<T: XValue> Default for Level<T> {
    fn default() -> Self {
        Self {
            counts: KeyDictionary::new(),
            nulls: 0,
            observed: 0,
        }
    }
}

/// Counted values of the chosen sample
struct PeekRows {
    values: XArray,
    counts: Vec<i64>,
    percentages: Vec<String8>,
}

trait PeekCounter: Debug {
    fn add(&mut self, batch: &XArray, rng: &mut StdRng) -> Result<()>;
    fn total(&self) -> u64;
    fn finish(&self) -> PeekRows;
}

#[derive(Debug)]
struct TypedPeek<T: XValue> {
    levels: Vec<Level<T>>,
    lowest_active: usize,
    total: u64,
}

impl<T: XValue> TypedPeek<T> {
    fn new() -> Self {
        Self {
            levels: (0..SAMPLE_LEVELS).map(|_| Level::default()).collect(),
            lowest_active: 0,
            total: 0,
        }
    }
}

impl<T: XValue> PeekCounter for TypedPeek<T> {
    fn add(&mut self, batch: &XArray, rng: &mut StdRng) -> Result<()> {
        let view = batch.typed::<T>()?;
        for row in 0..view.len() {
            self.total += 1;
            let mut depth = 0;
            while depth + 1 < SAMPLE_LEVELS && rng.gen_ratio(1, SAMPLE_DENOMINATOR) {
                depth += 1;
            }
            let lowest = self.lowest_active;
            if depth < lowest {
                continue;
            }

            let value = view.get(row);
            for level in &mut self.levels[lowest..=depth] {
                level.observed += 1;
                match value {
                    Some(value) => *level.counts.get_or_insert_with(value, || 0) += 1,
                    None => level.nulls += 1,
                }
            }

            while self.lowest_active + 1 < SAMPLE_LEVELS
                && self.levels[self.lowest_active + 1].observed >= REQUIRED_SAMPLE
            {
                self.levels[self.lowest_active] = Level::default();
                self.lowest_active += 1;
            }
        }
        Ok(())
    }

    fn total(&self) -> u64 {
        self.total
    }

    fn finish(&self) -> PeekRows {
        let level = &self.levels[self.lowest_active];
        let exact = self.lowest_active == 0;
        let distinct = level.counts.len() as u64 + u64::from(level.nulls > 0);
        if level.observed == 0 || distinct == level.observed {
            return PeekRows {
                values: XArray::empty(T::TYPE),
                counts: Vec::new(),
                percentages: Vec::new(),
            };
        }

        let scale = self.total as f64 / level.observed as f64;
        let mut entries: Vec<(Option<T>, u64)> = level
            .counts
            .iter()
            .map(|(value, &count)| (Some(value), count))
            .collect();
        if level.nulls > 0 {
            entries.push((None, level.nulls));
        }
        entries.retain(|&(_, count)| count * 1000 >= level.observed * MIN_SHARE_PER_MILLE);
        entries.sort_by(|(a, left), (b, right)| {
            right.cmp(left).then_with(|| match (a, b) {
                (Some(a), Some(b)) => a.total_cmp(b),
                (None, _) => std::cmp::Ordering::Greater,
                (_, None) => std::cmp::Ordering::Less,
            })
        });
        entries.truncate(TOP_VALUES);

        let mut counts = Vec::with_capacity(entries.len());
        let mut percentages = Vec::with_capacity(entries.len());
        let mut values = Vec::with_capacity(entries.len());
        for (value, count) in entries {
            let share = count as f64 / level.observed as f64 * 100.0;
            counts.push((count as f64 * scale).round() as i64);
            percentages.push(String8::from(format_percentage(share, exact)));
            values.push(value);
        }
        PeekRows {
            values: XArray::from_options(values),
            counts,
            percentages,
        }
    }
}

/// Whole percent for sampled shares, two significant figures for exact ones
pub fn format_percentage(share: f64, exact: bool) -> String {
    if !exact {
        return format!("{share:.0}%");
    }
    let decimals = |value: f64| {
        if value >= 10.0 {
            0
        } else if value >= 1.0 {
            1
        } else {
            2
        }
    };
    let scale = 10f64.powi(decimals(share));
    let rounded = (share * scale).round() / scale;
    let places = decimals(rounded) as usize;
    format!("{rounded:.places$}%")
}

fn peek_counter(column_type: ColumnType) -> Box<dyn PeekCounter> {
    dispatch_type!(column_type, T => Box::new(TypedPeek::<T>::new()) as Box<dyn PeekCounter>)
}

/// Most common values of one column
#[derive(Debug)]
pub struct PeekTable {
    source: Option<Box<dyn XTable>>,
    column: Getter,
    result: Materialized,
    seed: Option<u64>,
    batch_size: usize,
}

impl PeekTable {
    /// Peek at `column`; `seed` fixes the sampling, `None` draws from entropy
    pub fn new(
        mut source: Box<dyn XTable>,
        column: usize,
        seed: Option<u64>,
        batch_size: usize,
    ) -> Result<Self> {
        let getter = source.bind(column, GetterKind::Current)?;
        let schema = vec![
            ColumnDetails::new("Value", getter.column_type()),
            ColumnDetails::new("Count", ColumnType::I64),
            ColumnDetails::new("Percentage", ColumnType::String),
        ];
        Ok(Self {
            source: Some(source),
            column: getter,
            result: Materialized::new(schema),
            seed,
            batch_size: batch_size.max(1),
        })
    }

    fn build(&mut self, cancel: &CancellationToken) -> Result<()> {
        let mut source = self
            .source
            .take()
            .ok_or_else(|| Error::internal("peek source already consumed"))?;
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut counter = peek_counter(self.column.column_type());
        loop {
            check_cancelled(cancel)?;
            let count = source.next(self.batch_size, cancel)?;
            if count == 0 {
                break;
            }
            counter.add(&source.get(&self.column)?, &mut rng)?;
        }

        let rows = counter.finish();
        info!(
            "peek found {} common values in {} rows",
            rows.counts.len(),
            counter.total()
        );
        let schema = self.result.schema().to_vec();
        let table = ArrayTable::from_columns(vec![
            (schema[0].clone(), rows.values),
            (schema[1].clone(), XArray::from_vec(rows.counts)),
            (schema[2].clone(), XArray::from_vec(rows.percentages)),
        ])?;
        self.result.install(table)
    }
}

impl XTable for PeekTable {
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
        self.result.count()
    }
}

/// `peek {Column}`
pub fn build(parser: &mut XqlParser<'_>, source: Option<Box<dyn XTable>>) -> Result<Box<dyn XTable>> {
    let source = parser.require_source(source)?;
    let column = parser.next_column(source.as_ref())?;
    debug!("peek [{}]", source.schema()[column].name());
    let config = &parser.context().config;
    Ok(Box::new(PeekTable::new(
        source,
        column,
        config.peek_seed,
        config.batch_size,
    )?))
}
