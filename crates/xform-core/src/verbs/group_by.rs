//! `groupBy {Column}... with {Aggregator}...`
//!
//! The first `next` drains the source once, assigning every row a bucket and
//! folding it into each aggregator, then serves the finished groups as an
//! in-memory table.
//!
//! Groups keyed by one dictionary-encoded column skip hashing: the column's
//! value indices are the buckets, and groups come out in value order with
//! empty values left out. Otherwise groups come out in first-seen order.

use crate::data::{ArraySelector, ColumnDetails, XArray};
use crate::dictionary::GroupKeyDictionary;
use crate::query::parser::XqlParser;
use crate::table::{ArrayTable, Getter, GetterKind, Materialized, XTable, check_cancelled};
use crate::verbs::aggregators::{Aggregator, next_aggregator};
use crate::{Error, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

struct GroupState {
    keys: Vec<XArray>,
    buckets: Vec<u32>,
    aggregators: Vec<Box<dyn Aggregator>>,
}

/// One row per distinct key tuple with aggregated columns
#[derive(Debug)]
pub struct GroupByTable {
    source: Option<Box<dyn XTable>>,
    keys: Vec<usize>,
    aggregators: Vec<Box<dyn Aggregator>>,
    result: Materialized,
    batch_size: usize,
}

impl GroupByTable {
    /// Group `source` by the `keys` columns
    pub fn new(
        source: Box<dyn XTable>,
        keys: Vec<usize>,
        aggregators: Vec<Box<dyn Aggregator>>,
        batch_size: usize,
    ) -> Result<Self> {
        if keys.is_empty() {
            return Err(Error::internal("groupBy needs at least one key column"));
        }
        let mut schema = Vec::with_capacity(keys.len() + aggregators.len());
        for &key in &keys {
            schema.push(
                source
                    .schema()
                    .get(key)
                    .ok_or_else(|| Error::internal(format!("group by missing column {key}")))?
                    .clone(),
            );
        }
        schema.extend(aggregators.iter().map(|a| a.output()));
        Ok(Self {
            source: Some(source),
            keys,
            aggregators,
            result: Materialized::new(schema),
            batch_size: batch_size.max(1),
        })
    }

    fn uses_enum_path(&self, source: &dyn XTable) -> bool {
        self.keys.len() == 1 && source.column_traits(self.keys[0]).enum_values
    }

    fn build(&mut self, cancel: &CancellationToken) -> Result<()> {
        let mut source = self
            .source
            .take()
            .ok_or_else(|| Error::internal("groupBy source already consumed"))?;
        let mut aggregators = std::mem::take(&mut self.aggregators);
        for aggregator in &mut aggregators {
            aggregator.bind(source.as_mut())?;
        }

        let state = if self.uses_enum_path(source.as_ref()) {
            self.group_by_enum(source.as_mut(), aggregators, cancel)?
        } else {
            self.group_by_hash(source.as_mut(), aggregators, cancel)?
        };
        info!(
            "groupBy built {} groups over {} aggregators",
            state.buckets.len(),
            state.aggregators.len()
        );

        let schema = self.result.schema().to_vec();
        let mut columns = state.keys;
        for aggregator in &state.aggregators {
            columns.push(aggregator.finish(&state.buckets)?);
        }
        let table = ArrayTable::from_columns(schema.into_iter().zip(columns).collect())?;
        self.result.install(table)
    }

    fn group_by_hash(
        &self,
        source: &mut dyn XTable,
        mut aggregators: Vec<Box<dyn Aggregator>>,
        cancel: &CancellationToken,
    ) -> Result<GroupState> {
        let getters = self
            .keys
            .iter()
            .map(|&key| source.bind(key, GetterKind::Current))
            .collect::<Result<Vec<Getter>>>()?;
        let types: Vec<_> = getters.iter().map(Getter::column_type).collect();
        let mut dictionary = GroupKeyDictionary::new(&types);
        let mut buckets = Vec::new();
        let mut keys = Vec::with_capacity(getters.len());

        loop {
            check_cancelled(cancel)?;
            let count = source.next(self.batch_size, cancel)?;
            if count == 0 {
                break;
            }
            keys.clear();
            for getter in &getters {
                keys.push(source.get(getter)?);
            }
            dictionary.find_or_add(&keys, &mut buckets)?;
            for aggregator in &mut aggregators {
                aggregator.add(source, &buckets, dictionary.len())?;
            }
        }

        let bucket_count = u32::try_from(dictionary.len())
            .map_err(|_| Error::range("more than u32::MAX groups"))?;
        Ok(GroupState {
            keys: dictionary.finish()?,
            buckets: (0..bucket_count).collect(),
            aggregators,
        })
    }

    fn group_by_enum(
        &self,
        source: &mut dyn XTable,
        mut aggregators: Vec<Box<dyn Aggregator>>,
        cancel: &CancellationToken,
    ) -> Result<GroupState> {
        let key = self.keys[0];
        let values_getter = source.bind(key, GetterKind::Values)?;
        let indices_getter = source.bind(key, GetterKind::Indices)?;
        let mut values: Option<XArray> = None;
        let mut row_counts: Vec<u64> = Vec::new();
        let mut buckets: Vec<u32> = Vec::new();

        loop {
            check_cancelled(cancel)?;
            let count = source.next(self.batch_size, cancel)?;
            if count == 0 {
                break;
            }
            if values.is_none() {
                values = Some(source.get(&values_getter)?);
            }
            let value_count = values.as_ref().map_or(0, XArray::count);
            row_counts.resize(value_count, 0);

            let indices = source.get(&indices_getter)?;
            let view = indices.typed::<u32>()?;
            buckets.clear();
            for row in 0..view.len() {
                let index = *view.value(row);
                let slot = row_counts.get_mut(index as usize).ok_or_else(|| {
                    Error::range(format!("value index {index} past {value_count} values"))
                })?;
                *slot += 1;
                buckets.push(index);
            }
            for aggregator in &mut aggregators {
                aggregator.add(source, &buckets, value_count)?;
            }
        }

        let emitted: Vec<u32> = row_counts
            .iter()
            .enumerate()
            .filter(|&(_, &count)| count > 0)
            .map(|(index, _)| index as u32)
            .collect();
        let keys = match values {
            Some(values) => values
                .select(&ArraySelector::map_all(Arc::from(emitted.clone())))
                .to_contiguous(),
            None => XArray::empty(self.result.schema()[0].column_type()),
        };
        Ok(GroupState {
            keys: vec![keys],
            buckets: emitted,
            aggregators,
        })
    }
}

impl XTable for GroupByTable {
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

/// `groupBy {Column}... with {Aggregator}...`
pub fn build(parser: &mut XqlParser<'_>, source: Option<Box<dyn XTable>>) -> Result<Box<dyn XTable>> {
    let source = parser.require_source(source)?;
    let mut keys = vec![parser.next_column(source.as_ref())?];
    while parser.has_another_argument()
        && !parser.current().is_word("with")
        && !parser.current().is_word("get")
    {
        keys.push(parser.next_column(source.as_ref())?);
    }

    let mut aggregators = Vec::new();
    if parser.accept_word("with") || parser.accept_word("get") {
        aggregators.push(next_aggregator(parser, source.as_ref())?);
        while parser.has_another_argument() {
            aggregators.push(next_aggregator(parser, source.as_ref())?);
        }
    }
    debug!("groupBy {} keys with {} aggregators", keys.len(), aggregators.len());

    let batch_size = parser.context().config.batch_size;
    let table = GroupByTable::new(source, keys, aggregators, batch_size)?;
    super::check_unique_columns(table.schema())?;
    Ok(Box::new(table))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::String8;
    use crate::verbs::aggregators::{CountAggregator, ExtremeAggregator, SumAggregator};

    fn drain(table: &mut GroupByTable) -> Vec<XArray> {
        let getters: Vec<Getter> = (0..table.schema().len())
            .map(|c| table.bind(c, GetterKind::Current).unwrap())
            .collect();
        let cancel = CancellationToken::new();
        assert!(table.next(1000, &cancel).unwrap() > 0);
        getters.iter().map(|g| table.get(g).unwrap()).collect()
    }

    #[test]
    fn test_hash_groups_in_first_seen_order() {
        let source = ArrayTable::builder()
            .column("Port", XArray::from_vec(vec![443i32, 80, 443, 80, 443]))
            .column("Bytes", XArray::from_vec(vec![10i64, 20, 30, 40, 50]))
            .build()
            .unwrap();
        let schema = source.schema().to_vec();
        let aggregators: Vec<Box<dyn Aggregator>> = vec![
            Box::new(CountAggregator::default()),
            Box::new(SumAggregator::new(1, &schema[1]).unwrap()),
            Box::new(ExtremeAggregator::max(1, &schema[1])),
        ];
        let mut table = GroupByTable::new(Box::new(source), vec![0], aggregators, 2).unwrap();
        let names: Vec<&str> = table.schema().iter().map(ColumnDetails::name).collect();
        assert_eq!(names, vec!["Port", "Count", "Bytes.Sum", "Bytes.Max"]);

        let columns = drain(&mut table);
        assert_eq!(columns[0].get::<i32>(0).unwrap(), Some(443));
        assert_eq!(columns[0].get::<i32>(1).unwrap(), Some(80));
        assert_eq!(columns[1].get::<i64>(0).unwrap(), Some(3));
        assert_eq!(columns[2].get::<i64>(0).unwrap(), Some(90));
        assert_eq!(columns[2].get::<i64>(1).unwrap(), Some(60));
        assert_eq!(columns[3].get::<i64>(1).unwrap(), Some(40));
        assert_eq!(table.count(), Some(2));
    }

    #[test]
    fn test_enum_groups_in_value_order() {
        let source = ArrayTable::builder()
            .enum_column(
                "Color",
                XArray::from_strs(&["red", "green", "blue"]),
                vec![2, 0, 2, 2],
            )
            .build()
            .unwrap();
        let aggregators: Vec<Box<dyn Aggregator>> = vec![Box::new(CountAggregator::default())];
        let mut table = GroupByTable::new(Box::new(source), vec![0], aggregators, 3).unwrap();
        let columns = drain(&mut table);
        assert_eq!(columns[0].count(), 2);
        assert_eq!(columns[0].get::<String8>(0).unwrap().unwrap().as_str(), "red");
        assert_eq!(columns[0].get::<String8>(1).unwrap().unwrap().as_str(), "blue");
        assert_eq!(columns[1].get::<i64>(0).unwrap(), Some(1));
        assert_eq!(columns[1].get::<i64>(1).unwrap(), Some(3));
    }

    #[test]
    fn test_null_key_is_its_own_group() {
        let source = ArrayTable::builder()
            .column("K", XArray::from_options(vec![Some(1u8), None, None]))
            .build()
            .unwrap();
        let aggregators: Vec<Box<dyn Aggregator>> = vec![Box::new(CountAggregator::default())];
        let mut table = GroupByTable::new(Box::new(source), vec![0], aggregators, 10).unwrap();
        let columns = drain(&mut table);
        assert!(columns[0].is_null(1));
        assert_eq!(columns[1].get::<i64>(1).unwrap(), Some(2));
    }

    #[test]
    fn test_cancelled_build() {
        let source = ArrayTable::builder()
            .column("K", XArray::from_vec(vec![1u8]))
            .build()
            .unwrap();
        let mut table = GroupByTable::new(Box::new(source), vec![0], Vec::new(), 10).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(matches!(table.next(10, &cancel), Err(Error::Cancelled)));
    }
}
