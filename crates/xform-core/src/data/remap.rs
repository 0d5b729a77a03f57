//! Remapping batches down to matching rows
//!
//! Filters produce the matching logical rows of a batch once; every requested
//! column is then narrowed with [`RowRemapper::remap`]. Columns that share an
//! upstream selector (the common case) reuse one remapped selector.

use crate::data::bitvector::BitVector;
use crate::data::selector::ArraySelector;
use crate::data::xarray::XArray;
use crate::{Error, Result};
use std::sync::Arc;

/// Narrows arrays to the matching rows of the current batch
#[derive(Debug, Default)]
pub struct RowRemapper {
    matches: Option<Arc<[u32]>>,
    batch_count: usize,
    match_count: usize,
    cache: Vec<(ArraySelector, ArraySelector)>,
}

impl RowRemapper {
    /// Create a remapper with no current batch
    pub fn new() -> Self {
        Self::default()
    }

    /// Use the set bits of `matches` as the matching rows of a batch of
    /// `batch_count` rows
    pub fn set_matches(&mut self, matches: &BitVector, batch_count: usize) {
        let rows = matches.to_indices();
        self.set_match_rows(rows, batch_count);
    }

    /// Use `rows` (ascending or not) as the matching rows of a batch
    pub fn set_match_rows(&mut self, rows: Vec<u32>, batch_count: usize) {
        self.cache.clear();
        self.batch_count = batch_count;
        self.match_count = rows.len();
        let every_row = rows.len() == batch_count
            && rows.iter().enumerate().all(|(i, &row)| row as usize == i);
        self.matches = if every_row { None } else { Some(rows.into()) };
    }

    /// Number of matching rows in the current batch
    pub fn count(&self) -> usize {
        self.match_count
    }

    /// Narrow `array`, a batch of the current upstream rows, to the matches
    pub fn remap(&mut self, array: &XArray) -> Result<XArray> {
        if array.count() != self.batch_count {
            return Err(Error::protocol(format!(
                "remapping a batch of {} rows, expected {}",
                array.count(),
                self.batch_count
            )));
        }

        let Some(matches) = &self.matches else {
            return Ok(array.clone());
        };

        if array.selector().is_single() {
            return array.reselect(ArraySelector::single(self.match_count));
        }

        if let Some((_, remapped)) = self
            .cache
            .iter()
            .find(|(upstream, _)| upstream.is_same(array.selector()))
        {
            return array.reselect(remapped.clone());
        }

        let remapped = array
            .selector()
            .select(&ArraySelector::map_all(matches.clone()));
        self.cache.push((array.selector().clone(), remapped.clone()));
        array.reselect(remapped)
    }
}
