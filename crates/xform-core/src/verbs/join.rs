//! `join {FromColumn} {ToTable} {ToColumn} {Prefix}`
//!
//! Inner equi-join. The right table is drained once into a key → row id index
//! (a later duplicate key replaces an earlier one); every left batch is then
//! probed against it. Left columns are narrowed to the matched rows, right
//! columns are seeked to the matched right row ids in the same order.

use crate::data::{ArraySelector, ColumnDetails, ColumnType, RowRemapper, XArray, XValue};
use crate::dictionary::KeyDictionary;
use crate::dispatch_type;
use crate::query::parser::XqlParser;
use crate::query::usage::UsageError;
use crate::table::{Bindings, ColumnTraits, Getter, GetterKind, XTable, check_cancelled};
use crate::{Error, Result};
use std::fmt::Debug;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Key → right row id index over one key type
pub trait JoinIndex: Debug {
    /// Add a batch of right keys; the batch starts at right row `first_row`
    fn add(&mut self, keys: &XArray, first_row: u32) -> Result<()>;

    /// Find matches for a batch of left keys, pushing matched left rows and
    /// their right rows in left order
    fn probe(&self, keys: &XArray, left_rows: &mut Vec<u32>, right_rows: &mut Vec<u32>) -> Result<()>;

    /// Distinct keys indexed
    fn len(&self) -> usize;

    /// Whether no key was indexed
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Default)]
struct TypedJoinIndex<T: XValue> {
    rows: KeyDictionary<T, u32>,
}

impl<T: XValue> JoinIndex for TypedJoinIndex<T> {
    fn add(&mut self, keys: &XArray, first_row: u32) -> Result<()> {
        let view = keys.typed::<T>()?;
        for row in 0..view.len() {
            if let Some(value) = view.get(row) {
                self.rows.insert(value, first_row + row as u32);
            }
        }
        Ok(())
    }

    fn probe(&self, keys: &XArray, left_rows: &mut Vec<u32>, right_rows: &mut Vec<u32>) -> Result<()> {
        let view = keys.typed::<T>()?;
        for row in 0..view.len() {
            let Some(value) = view.get(row) else {
                continue;
            };
            if let Some(&right) = self.rows.get(value) {
                left_rows.push(row as u32);
                right_rows.push(right);
            }
        }
        Ok(())
    }

    fn len(&self) -> usize {
        self.rows.len()
    }
}

/// Empty index for keys of `column_type`
pub fn join_index(column_type: ColumnType) -> Box<dyn JoinIndex> {
    dispatch_type!(column_type, T => Box::new(TypedJoinIndex::<T>::default()) as Box<dyn JoinIndex>)
}

#[derive(Debug)]
enum Slot {
    Left(Getter),
    Right(Getter),
}

/// Inner join of a source against a seekable table
#[derive(Debug)]
pub struct JoinTable {
    left: Box<dyn XTable>,
    right: Box<dyn XTable>,
    left_key: Getter,
    right_key: usize,
    schema: Vec<ColumnDetails>,
    bindings: Bindings<Slot>,
    index: Option<Box<dyn JoinIndex>>,
    remapper: RowRemapper,
    right_rows: Arc<[u32]>,
    batch_size: usize,
}

impl JoinTable {
    /// Join `left[left_key]` to `right[right_key]`, prefixing right column names
    pub fn new(
        mut left: Box<dyn XTable>,
        left_key: usize,
        right: Box<dyn XTable>,
        right_key: usize,
        prefix: &str,
        batch_size: usize,
    ) -> Result<Self> {
        if !right.is_seekable() {
            return Err(UsageError::new("table", "", Vec::new())
                .with_message("the joined table must be seekable; cache it first")
                .into());
        }
        let left_type = left
            .schema()
            .get(left_key)
            .ok_or_else(|| Error::internal(format!("join on missing column {left_key}")))?
            .column_type();
        let right_details = right
            .schema()
            .get(right_key)
            .ok_or_else(|| Error::internal(format!("join to missing column {right_key}")))?;
        if right_details.column_type() != left_type {
            return Err(Error::schema_mismatch(format!(
                "join key types differ: {} on the left, {} for [{}]",
                left_type,
                right_details.column_type(),
                right_details.name()
            )));
        }

        let mut schema = left.schema().to_vec();
        schema.extend(
            right
                .schema()
                .iter()
                .map(|c| c.rename(format!("{prefix}{}", c.name()))),
        );
        let left_key = left.bind(left_key, GetterKind::Current)?;

        Ok(Self {
            left,
            right,
            left_key,
            right_key,
            schema,
            bindings: Bindings::new(),
            index: None,
            remapper: RowRemapper::new(),
            right_rows: Arc::from(Vec::new()),
            batch_size: batch_size.max(1),
        })
    }

    fn left_width(&self) -> usize {
        self.left.schema().len()
    }

    fn build_index(&mut self, cancel: &CancellationToken) -> Result<Box<dyn JoinIndex>> {
        let key_type = self.right.schema()[self.right_key].column_type();
        let getter = self.right.bind(self.right_key, GetterKind::Current)?;
        let mut index = join_index(key_type);
        let mut rows = 0usize;
        loop {
            check_cancelled(cancel)?;
            let count = self.right.next(self.batch_size, cancel)?;
            if count == 0 {
                break;
            }
            let first_row =
                u32::try_from(rows).map_err(|_| Error::range("joined table exceeds u32 rows"))?;
            index.add(&self.right.get(&getter)?, first_row)?;
            rows += count;
        }
        info!("Join index built: {} keys from {} rows", index.len(), rows);
        Ok(index)
    }
}

impl XTable for JoinTable {
    fn schema(&self) -> &[ColumnDetails] {
        &self.schema
    }

    fn column_traits(&self, column: usize) -> ColumnTraits {
        if column < self.left_width() {
            ColumnTraits {
                seekable: false,
                enum_values: self.left.column_traits(column).enum_values,
            }
        } else {
            ColumnTraits::default()
        }
    }

    fn bind(&mut self, column: usize, kind: GetterKind) -> Result<Getter> {
        if kind == GetterKind::Seek {
            return Err(Error::protocol("seek getters are not available through join"));
        }
        let width = self.left_width();
        if column < width {
            let upstream = self.left.bind(column, kind)?;
            return self
                .bindings
                .add(column, kind, upstream.column_type(), Slot::Left(upstream));
        }
        if kind != GetterKind::Current {
            return Err(Error::protocol(format!(
                "joined column '{}' only offers current values",
                self.schema
                    .get(column)
                    .map(ColumnDetails::name)
                    .unwrap_or_default()
            )));
        }
        let upstream = self.right.bind(column - width, GetterKind::Seek)?;
        self.bindings
            .add(column, kind, upstream.column_type(), Slot::Right(upstream))
    }

    fn next(&mut self, desired: usize, cancel: &CancellationToken) -> Result<usize> {
        if self.index.is_none() {
            self.index = Some(self.build_index(cancel)?);
        }
        self.bindings.start();

        let mut left_rows = Vec::new();
        let mut right_rows = Vec::new();
        loop {
            check_cancelled(cancel)?;
            let count = self.left.next(desired, cancel)?;
            if count == 0 {
                return Ok(0);
            }
            let keys = self.left.get(&self.left_key)?;
            let index = self
                .index
                .as_ref()
                .ok_or_else(|| Error::internal("join index missing"))?;
            left_rows.clear();
            right_rows.clear();
            index.probe(&keys, &mut left_rows, &mut right_rows)?;

            if !left_rows.is_empty() {
                let matched = left_rows.len();
                self.remapper.set_match_rows(left_rows, count);
                self.right_rows = Arc::from(right_rows);
                return Ok(matched);
            }
        }
    }

    fn get(&mut self, getter: &Getter) -> Result<XArray> {
        match *self.bindings.slot(getter)? {
            Slot::Left(upstream) => {
                let array = self.left.get(&upstream)?;
                if upstream.kind() == GetterKind::Values {
                    Ok(array)
                } else {
                    self.remapper.remap(&array)
                }
            }
            Slot::Right(upstream) => self
                .right
                .seek(&upstream, &ArraySelector::map_all(self.right_rows.clone())),
        }
    }

    fn reset(&mut self) -> Result<()> {
        self.right_rows = Arc::from(Vec::new());
        self.left.reset()
    }
}

/// `join {FromColumn} {ToTable} {ToColumn} {Prefix}`
pub fn build(parser: &mut XqlParser<'_>, source: Option<Box<dyn XTable>>) -> Result<Box<dyn XTable>> {
    let source = parser.require_source(source)?;
    let left_key = parser.next_column(source.as_ref())?;
    let right = parser.next_table()?;
    let right_key = parser.next_column(right.as_ref())?;
    let prefix = parser.next_value("prefix")?;
    debug!(
        "join [{}] to [{}] with prefix '{}'",
        source.schema()[left_key].name(),
        right.schema()[right_key].name(),
        prefix
    );
    let batch_size = parser.context().config.batch_size;
    let table = JoinTable::new(source, left_key, right, right_key, &prefix, batch_size)?;
    super::check_unique_columns(table.schema())?;
    Ok(Box::new(table))
}
