//! Pull-iteration protocol
//!
//! Every operator is an [`XTable`]. A table is driven in two phases:
//!
//! 1. **Bind**: the consumer asks for [`Getter`] handles on the columns it will
//!    read. Operators forward the request upstream, so unrequested columns are
//!    never computed.
//! 2. **Iterate**: `next` advances to a new batch and returns its row count
//!    (`0` once exhausted); `get` reads a bound column of the current batch.
//!
//! Binding after the first `next` is a protocol violation. Consumers normally
//! go through [`Binder`]/[`Cursor`] in [`pipeline`], which make the two phases
//! distinct types.

pub mod array_table;
pub mod catalog;
pub mod materialized;
pub mod pipeline;

pub use array_table::{ArrayTable, ArrayTableBuilder};
pub use catalog::{InMemoryCatalog, TableCatalog};
pub use materialized::Materialized;
pub use pipeline::{Binder, Cursor, run_count};

use crate::data::{ArraySelector, ColumnDetails, ColumnType, XArray, find_column};
use crate::{Error, Result};
use tokio_util::sync::CancellationToken;

/// Which view of a column a getter reads
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GetterKind {
    /// Values of the current batch
    Current,
    /// Values at arbitrary rows (seekable tables only)
    Seek,
    /// Distinct values of a dictionary-encoded column
    Values,
    /// Per-row `u32` indices into [`GetterKind::Values`] for the current batch
    Indices,
}

/// Handle to a bound column view. Only valid for the table that issued it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Getter {
    id: usize,
    column: usize,
    kind: GetterKind,
    column_type: ColumnType,
}

impl Getter {
    /// Column index in the issuing table's schema
    pub fn column(&self) -> usize {
        self.column
    }

    /// View kind
    pub fn kind(&self) -> GetterKind {
        self.kind
    }

    /// Type of arrays this getter returns
    pub fn column_type(&self) -> ColumnType {
        self.column_type
    }
}

/// What a column supports beyond `Current` reads
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ColumnTraits {
    /// `Seek` getters are available
    pub seekable: bool,
    /// `Values`/`Indices` getters are available
    pub enum_values: bool,
}

/// A stage of a query pipeline
pub trait XTable {
    /// Columns, stable for the table's lifetime
    fn schema(&self) -> &[ColumnDetails];

    /// Capabilities of one column
    fn column_traits(&self, _column: usize) -> ColumnTraits {
        ColumnTraits::default()
    }

    /// Request a getter. Must happen before the first `next`.
    fn bind(&mut self, column: usize, kind: GetterKind) -> Result<Getter>;

    /// Advance to the next batch of at most roughly `desired` rows; `0` when
    /// exhausted
    fn next(&mut self, desired: usize, cancel: &CancellationToken) -> Result<usize>;

    /// Read a `Current`, `Values` or `Indices` getter for the current batch
    fn get(&mut self, getter: &Getter) -> Result<XArray>;

    /// Read a `Seek` getter at `rows` (logical rows of the whole table)
    fn seek(&mut self, getter: &Getter, _rows: &ArraySelector) -> Result<XArray> {
        Err(Error::protocol(format!(
            "column {} does not support seeking",
            getter.column()
        )))
    }

    /// Return to the unstarted state; getters stay valid
    fn reset(&mut self) -> Result<()>;

    /// Whether the table supports random access through `Seek` getters
    fn is_seekable(&self) -> bool {
        false
    }

    /// Total row count, when known without iterating
    fn count(&self) -> Option<usize> {
        None
    }
}

impl std::fmt::Debug for dyn XTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XTable")
            .field("schema", &self.schema())
            .finish()
    }
}

/// Index of a column by case-insensitive name
pub fn column_index(table: &dyn XTable, name: &str) -> Option<usize> {
    find_column(table.schema(), name)
}

/// Fail with [`Error::Cancelled`] once the token has fired
#[inline]
pub fn check_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(Error::Cancelled)
    } else {
        Ok(())
    }
}

/// Getter bookkeeping shared by table implementations.
///
/// Each bound getter owns one slot of operator-specific state `S`.
#[derive(Debug)]
pub struct Bindings<S> {
    slots: Vec<S>,
    started: bool,
}

impl<S> Default for Bindings<S> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            started: false,
        }
    }
}

impl<S> Bindings<S> {
    /// Empty binding table
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a getter backed by `slot`
    pub fn add(
        &mut self,
        column: usize,
        kind: GetterKind,
        column_type: ColumnType,
        slot: S,
    ) -> Result<Getter> {
        if self.started {
            return Err(Error::protocol(format!(
                "getter for column {column} requested after iteration started"
            )));
        }
        self.slots.push(slot);
        Ok(Getter {
            id: self.slots.len() - 1,
            column,
            kind,
            column_type,
        })
    }

    /// Slot state of a getter issued by this table
    pub fn slot(&self, getter: &Getter) -> Result<&S> {
        self.slots
            .get(getter.id)
            .ok_or_else(|| Error::protocol(format!("unknown getter {}", getter.id)))
    }

    /// Mutable slot state of a getter issued by this table
    pub fn slot_mut(&mut self, getter: &Getter) -> Result<&mut S> {
        self.slots
            .get_mut(getter.id)
            .ok_or_else(|| Error::protocol(format!("unknown getter {}", getter.id)))
    }

    /// All slots in issue order
    pub fn slots(&self) -> &[S] {
        &self.slots
    }

    /// Close the bind phase
    pub fn start(&mut self) {
        self.started = true;
    }

    /// Whether iteration has begun
    pub fn is_started(&self) -> bool {
        self.started
    }
}

/// Validate a bind request against a schema and column traits
pub fn check_bind(
    schema: &[ColumnDetails],
    traits: ColumnTraits,
    column: usize,
    kind: GetterKind,
) -> Result<ColumnType> {
    let details = schema
        .get(column)
        .ok_or_else(|| Error::protocol(format!("column index {column} out of range")))?;
    match kind {
        GetterKind::Seek if !traits.seekable => Err(Error::protocol(format!(
            "column '{}' is not seekable",
            details.name()
        ))),
        GetterKind::Values | GetterKind::Indices if !traits.enum_values => Err(Error::protocol(
            format!("column '{}' is not dictionary-encoded", details.name()),
        )),
        GetterKind::Indices => Ok(ColumnType::U32),
        _ => Ok(details.column_type()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bindings_close_after_start() {
        let mut bindings: Bindings<usize> = Bindings::new();
        let getter = bindings
            .add(0, GetterKind::Current, ColumnType::I32, 7)
            .unwrap();
        assert_eq!(*bindings.slot(&getter).unwrap(), 7);
        bindings.start();
        assert!(matches!(
            bindings.add(1, GetterKind::Current, ColumnType::I32, 8),
            Err(Error::ProtocolViolation(_))
        ));
    }

    #[test]
    fn test_check_bind_kinds() {
        let schema = vec![ColumnDetails::new("A", ColumnType::String)];
        let plain = ColumnTraits::default();
        assert!(check_bind(&schema, plain, 0, GetterKind::Seek).is_err());
        assert!(check_bind(&schema, plain, 0, GetterKind::Values).is_err());
        assert!(check_bind(&schema, plain, 1, GetterKind::Current).is_err());

        let encoded = ColumnTraits {
            seekable: true,
            enum_values: true,
        };
        assert_eq!(
            check_bind(&schema, encoded, 0, GetterKind::Indices).unwrap(),
            ColumnType::U32
        );
        assert_eq!(
            check_bind(&schema, encoded, 0, GetterKind::Values).unwrap(),
            ColumnType::String
        );
    }
}
