//! Multi-column key dictionary
//!
//! Assigns dense bucket ids to distinct key tuples in first-seen order. Each
//! key column keeps its distinct values in a typed store; the tuple table is
//! an open-addressing index of bucket ids keyed by combined row hashes.

use super::KeyHasher;
use crate::data::{ColumnType, XArray, XValue};
use crate::dispatch_type;
use crate::{Error, Result};
use std::fmt::Debug;
use std::hash::BuildHasher;
use std::sync::Arc;

const NULL_HASH: u64 = 0x5bd1_e995_5bd1_e995;
const INITIAL_SLOTS: usize = 1024;

/// Typed storage of one key column's distinct values, by bucket
pub trait KeyColumn: Debug {
    /// Element type
    fn column_type(&self) -> ColumnType;

    /// Mix each row's value hash into `hashes`
    fn hash_batch(&self, batch: &XArray, hashes: &mut [u64]) -> Result<()>;

    /// Whether `row` of `batch` equals the key stored for `bucket`
    fn equals(&self, bucket: usize, batch: &XArray, row: usize) -> Result<bool>;

    /// Store `row` of `batch` as the key of the next bucket
    fn push(&mut self, batch: &XArray, row: usize) -> Result<()>;

    /// Distinct keys in bucket order
    fn finish(&self) -> Result<XArray>;
}

#[derive(Debug, Default)]
struct TypedKeyColumn<T: XValue> {
    keys: Vec<T::Key>,
    nulls: Vec<bool>,
}

impl<T: XValue> KeyColumn for TypedKeyColumn<T> {
    fn column_type(&self) -> ColumnType {
        T::TYPE
    }

    fn hash_batch(&self, batch: &XArray, hashes: &mut [u64]) -> Result<()> {
        let view = batch.typed::<T>()?;
        let hasher = KeyHasher::default();
        for (row, hash) in hashes.iter_mut().enumerate() {
            let value_hash = match view.get(row) {
                Some(value) => hasher.hash_one(value.lookup_key()),
                None => NULL_HASH,
            };
            *hash = hash.rotate_left(21) ^ value_hash;
        }
        Ok(())
    }

    fn equals(&self, bucket: usize, batch: &XArray, row: usize) -> Result<bool> {
        let view = batch.typed::<T>()?;
        Ok(match view.get(row) {
            Some(value) => !self.nulls[bucket] && value.lookup_key() == self.keys[bucket],
            None => self.nulls[bucket],
        })
    }

    fn push(&mut self, batch: &XArray, row: usize) -> Result<()> {
        let view = batch.typed::<T>()?;
        match view.get(row) {
            Some(value) => {
                self.keys.push(value.to_key());
                self.nulls.push(false);
            }
            None => {
                self.keys.push(T::default_value().to_key());
                self.nulls.push(true);
            }
        }
        Ok(())
    }

    fn finish(&self) -> Result<XArray> {
        let values: Vec<T> = self.keys.iter().map(T::from_key).collect();
        let mask = self
            .nulls
            .iter()
            .any(|&n| n)
            .then(|| Arc::from(self.nulls.clone()));
        XArray::all_with_nulls(T::wrap(values.into()), mask)
    }
}

/// Typed key store for a column type
pub fn key_column(column_type: ColumnType) -> Box<dyn KeyColumn> {
    dispatch_type!(column_type, T => Box::new(TypedKeyColumn::<T>::default()) as Box<dyn KeyColumn>)
}

/// Distinct key tuples → dense bucket ids
#[derive(Debug)]
pub struct GroupKeyDictionary {
    columns: Vec<Box<dyn KeyColumn>>,
    /// Open-addressing table of `bucket + 1`; 0 marks an empty slot
    slots: Vec<u32>,
    hashes: Vec<u64>,
}

impl GroupKeyDictionary {
    /// Dictionary over key columns of the given types
    pub fn new(types: &[ColumnType]) -> Self {
        Self {
            columns: types.iter().map(|&t| key_column(t)).collect(),
            slots: vec![0; INITIAL_SLOTS],
            hashes: Vec::new(),
        }
    }

    /// Number of distinct tuples
    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    /// Whether no tuple has been added
    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    /// Bucket id of every row of a batch, adding unseen tuples.
    ///
    /// `keys` holds one array per key column, all of the same row count.
    pub fn find_or_add(&mut self, keys: &[XArray], buckets: &mut Vec<u32>) -> Result<()> {
        if keys.len() != self.columns.len() {
            return Err(Error::internal(format!(
                "{} key arrays for {} key columns",
                keys.len(),
                self.columns.len()
            )));
        }
        let count = keys.first().map_or(0, XArray::count);
        if keys.iter().any(|k| k.count() != count) {
            return Err(Error::protocol("key columns disagree on batch size"));
        }

        let mut hashes = vec![0u64; count];
        for (column, batch) in self.columns.iter().zip(keys) {
            column.hash_batch(batch, &mut hashes)?;
        }

        buckets.clear();
        buckets.reserve(count);
        for (row, &hash) in hashes.iter().enumerate() {
            buckets.push(self.find_or_add_row(keys, row, hash)?);
        }
        Ok(())
    }

    fn find_or_add_row(&mut self, keys: &[XArray], row: usize, hash: u64) -> Result<u32> {
        let mask = self.slots.len() - 1;
        let mut index = hash as usize & mask;
        loop {
            let slot = self.slots[index];
            if slot == 0 {
                break;
            }
            let bucket = (slot - 1) as usize;
            if self.hashes[bucket] == hash && self.row_equals(bucket, keys, row)? {
                return Ok(bucket as u32);
            }
            index = (index + 1) & mask;
        }

        let bucket = u32::try_from(self.hashes.len())
            .map_err(|_| Error::range("more than u32::MAX distinct keys"))?;
        for (column, batch) in self.columns.iter_mut().zip(keys) {
            column.push(batch, row)?;
        }
        self.hashes.push(hash);
        self.slots[index] = bucket + 1;

        if self.hashes.len() * 2 > self.slots.len() {
            self.grow();
        }
        Ok(bucket)
    }

    fn row_equals(&self, bucket: usize, keys: &[XArray], row: usize) -> Result<bool> {
        for (column, batch) in self.columns.iter().zip(keys) {
            if !column.equals(bucket, batch, row)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn grow(&mut self) {
        let size = self.slots.len() * 2;
        let mask = size - 1;
        let mut slots = vec![0u32; size];
        for (bucket, &hash) in self.hashes.iter().enumerate() {
            let mut index = hash as usize & mask;
            while slots[index] != 0 {
                index = (index + 1) & mask;
            }
            slots[index] = bucket as u32 + 1;
        }
        self.slots = slots;
    }

    /// Distinct tuples, one array per key column, in bucket order
    pub fn finish(&self) -> Result<Vec<XArray>> {
        self.columns.iter().map(|c| c.finish()).collect()
    }
}
