//! `choose {Max|Min} {RankColumn} {KeyColumn}...`
//!
//! Keeps, for each distinct key tuple, the one row with the highest (or
//! lowest) rank. The first `next` drains the source to find the winning row
//! ids, then rewinds it and streams only those rows, in source order.

use crate::data::{ColumnDetails, ColumnType, RowRemapper, XArray, XValue};
use crate::dictionary::GroupKeyDictionary;
use crate::dispatch_type;
use crate::query::parser::XqlParser;
use crate::table::{Bindings, ColumnTraits, Getter, GetterKind, XTable, check_cancelled};
use crate::{Error, Result};
use roaring::RoaringBitmap;
use std::cmp::Ordering;
use std::fmt::Debug;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Which rank wins
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChooseDirection {
    /// Highest rank
    Max,
    /// Lowest rank
    Min,
}

impl ChooseDirection {
    fn winning_order(self) -> Ordering {
        match self {
            ChooseDirection::Max => Ordering::Greater,
            ChooseDirection::Min => Ordering::Less,
        }
    }
}

trait RankState: Debug {
    /// Offer every row of a batch; `first_row` is the global id of row 0
    fn add(&mut self, ranks: &XArray, buckets: &[u32], bucket_count: usize, first_row: u32) -> Result<()>;

    fn winners(&self) -> RoaringBitmap;
}

#[derive(Debug)]
struct TypedRankState<T: XValue> {
    best: Vec<Option<(T, u32)>>,
    wins: Ordering,
}

impl<T: XValue> RankState for TypedRankState<T> {
    fn add(&mut self, ranks: &XArray, buckets: &[u32], bucket_count: usize, first_row: u32) -> Result<()> {
        self.best.resize(bucket_count, None);
        let view = ranks.typed::<T>()?;
        for (row, &bucket) in buckets.iter().enumerate() {
            let Some(rank) = view.get(row) else {
                continue;
            };
            let slot = &mut self.best[bucket as usize];
            let replace = match slot {
                Some((current, _)) => rank.total_cmp(current) == self.wins,
                None => true,
            };
            if replace {
                *slot = Some((rank.clone(), first_row + row as u32));
            }
        }
        Ok(())
    }

    fn winners(&self) -> RoaringBitmap {
        self.best.iter().flatten().map(|&(_, row)| row).collect()
    }
}

fn rank_state(column_type: ColumnType, direction: ChooseDirection) -> Box<dyn RankState> {
    let wins = direction.winning_order();
    dispatch_type!(column_type, T => Box::new(TypedRankState::<T> {
        best: Vec::new(),
        wins,
    }) as Box<dyn RankState>)
}

/// Best-ranked row per key tuple
#[derive(Debug)]
pub struct ChooseTable {
    source: Box<dyn XTable>,
    direction: ChooseDirection,
    rank: Getter,
    keys: Vec<Getter>,
    bindings: Bindings<Getter>,
    winners: Option<RoaringBitmap>,
    remapper: RowRemapper,
    position: u64,
    batch_size: usize,
}

impl ChooseTable {
    /// Keep the `direction`-most `rank` row for each tuple of `keys`
    pub fn new(
        mut source: Box<dyn XTable>,
        direction: ChooseDirection,
        rank: usize,
        keys: &[usize],
        batch_size: usize,
    ) -> Result<Self> {
        let rank = source.bind(rank, GetterKind::Current)?;
        let keys = keys
            .iter()
            .map(|&key| source.bind(key, GetterKind::Current))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            source,
            direction,
            rank,
            keys,
            bindings: Bindings::new(),
            winners: None,
            remapper: RowRemapper::new(),
            position: 0,
            batch_size: batch_size.max(1),
        })
    }

    fn find_winners(&mut self, cancel: &CancellationToken) -> Result<RoaringBitmap> {
        let types: Vec<ColumnType> = self.keys.iter().map(Getter::column_type).collect();
        let mut dictionary = GroupKeyDictionary::new(&types);
        let mut state = rank_state(self.rank.column_type(), self.direction);
        let mut buckets = Vec::new();
        let mut keys = Vec::with_capacity(self.keys.len());
        let mut rows = 0usize;

        loop {
            check_cancelled(cancel)?;
            let count = self.source.next(self.batch_size, cancel)?;
            if count == 0 {
                break;
            }
            let first_row =
                u32::try_from(rows).map_err(|_| Error::range("choose source exceeds u32 rows"))?;
            keys.clear();
            for getter in &self.keys {
                keys.push(self.source.get(getter)?);
            }
            dictionary.find_or_add(&keys, &mut buckets)?;
            let ranks = self.source.get(&self.rank)?;
            state.add(&ranks, &buckets, dictionary.len(), first_row)?;
            rows += count;
        }

        let winners = state.winners();
        info!(
            "choose kept {} rows for {} keys out of {} rows",
            winners.len(),
            dictionary.len(),
            rows
        );
        self.source.reset()?;
        Ok(winners)
    }
}

impl XTable for ChooseTable {
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
            return Err(Error::protocol("seek getters are not available through choose"));
        }
        let upstream = self.source.bind(column, kind)?;
        self.bindings
            .add(column, kind, upstream.column_type(), upstream)
    }

    fn next(&mut self, desired: usize, cancel: &CancellationToken) -> Result<usize> {
        if self.winners.is_none() {
            self.winners = Some(self.find_winners(cancel)?);
        }
        self.bindings.start();

        let mut matches = Vec::new();
        loop {
            check_cancelled(cancel)?;
            let count = self.source.next(desired, cancel)?;
            if count == 0 {
                return Ok(0);
            }
            let winners = self
                .winners
                .as_ref()
                .ok_or_else(|| Error::internal("choose winners missing"))?;
            matches.clear();
            for row in 0..count {
                let global = self.position + row as u64;
                if u32::try_from(global).is_ok_and(|id| winners.contains(id)) {
                    matches.push(row as u32);
                }
            }
            self.position += count as u64;

            if !matches.is_empty() {
                let matched = matches.len();
                self.remapper.set_match_rows(matches, count);
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
        self.position = 0;
        self.source.reset()
    }
}

/// `choose {Max|Min} {RankColumn} {KeyColumn}...`
pub fn build(parser: &mut XqlParser<'_>, source: Option<Box<dyn XTable>>) -> Result<Box<dyn XTable>> {
    let source = parser.require_source(source)?;
    let direction = match parser.next_option("direction", &["Max", "Min"])? {
        0 => ChooseDirection::Max,
        _ => ChooseDirection::Min,
    };
    let rank = parser.next_column(source.as_ref())?;
    let mut keys = vec![parser.next_column(source.as_ref())?];
    while parser.has_another_argument() {
        keys.push(parser.next_column(source.as_ref())?);
    }
    debug!("choose {:?} by column {} over {} keys", direction, rank, keys.len());
    let batch_size = parser.context().config.batch_size;
    Ok(Box::new(ChooseTable::new(source, direction, rank, &keys, batch_size)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::ArrayTable;

    fn source() -> Box<dyn XTable> {
        Box::new(
            ArrayTable::builder()
                .column("Id", XArray::from_vec(vec![0i32, 1, 2, 3, 4, 5]))
                .column("Host", XArray::from_strs(&["a", "b", "a", "b", "a", "c"]))
                .column(
                    "Score",
                    XArray::from_options(vec![Some(5i64), Some(1), Some(9), Some(1), Some(9), None]),
                )
                .build()
                .unwrap(),
        )
    }

    fn chosen_ids(direction: ChooseDirection) -> Vec<i32> {
        let mut table = ChooseTable::new(source(), direction, 2, &[1], 2).unwrap();
        let ids = table.bind(0, GetterKind::Current).unwrap();
        let cancel = CancellationToken::new();
        let mut chosen = Vec::new();
        while table.next(2, &cancel).unwrap() > 0 {
            let batch = table.get(&ids).unwrap();
            for row in 0..batch.count() {
                chosen.push(batch.get::<i32>(row).unwrap().unwrap());
            }
        }
        chosen
    }

    #[test]
    fn test_max_keeps_first_of_ties() {
        // "a" ties at 9 on rows 2 and 4, "b" ties at 1, "c" has only a null rank
        assert_eq!(chosen_ids(ChooseDirection::Max), vec![1, 2]);
    }

    #[test]
    fn test_min() {
        assert_eq!(chosen_ids(ChooseDirection::Min), vec![0, 1]);
    }

    #[test]
    fn test_reset_replays_winners() {
        let mut table = ChooseTable::new(source(), ChooseDirection::Max, 2, &[1], 100).unwrap();
        let cancel = CancellationToken::new();
        assert_eq!(table.next(100, &cancel).unwrap(), 2);
        table.reset().unwrap();
        assert_eq!(table.next(100, &cancel).unwrap(), 2);
        assert_eq!(table.next(100, &cancel).unwrap(), 0);
    }
}
