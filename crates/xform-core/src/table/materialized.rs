//! Deferred output for verbs that compute their whole result up front
//!
//! `groupBy`, `count`, `peek` and `cache` know their schema when built but can
//! only produce rows after draining their source. [`Materialized`] records
//! getters during the bind phase and replays them onto the result table once
//! it is installed.

use super::{ArrayTable, Bindings, ColumnTraits, Getter, GetterKind, XTable};
use crate::data::{ArraySelector, ColumnDetails, XArray};
use crate::{Error, Result};
use tokio_util::sync::CancellationToken;

/// Getter recorder plus the eventual result table
#[derive(Debug)]
pub struct Materialized {
    schema: Vec<ColumnDetails>,
    bindings: Bindings<(usize, GetterKind)>,
    result: Option<(ArrayTable, Vec<Getter>)>,
}

impl Materialized {
    /// Result of the given shape, not yet computed
    pub fn new(schema: Vec<ColumnDetails>) -> Self {
        Self {
            schema,
            bindings: Bindings::new(),
            result: None,
        }
    }

    /// Output columns
    pub fn schema(&self) -> &[ColumnDetails] {
        &self.schema
    }

    /// Record a getter. Only `Current` and `Seek` are offered.
    pub fn bind(&mut self, column: usize, kind: GetterKind) -> Result<Getter> {
        let traits = ColumnTraits {
            seekable: true,
            enum_values: false,
        };
        let column_type = super::check_bind(&self.schema, traits, column, kind)?;
        self.bindings.add(column, kind, column_type, (column, kind))
    }

    /// Whether the result has been installed
    pub fn is_built(&self) -> bool {
        self.result.is_some()
    }

    /// Columns that have at least one getter; others may be left empty
    pub fn bound_columns(&self) -> Vec<usize> {
        let mut columns: Vec<usize> = self.bindings.slots().iter().map(|&(c, _)| c).collect();
        columns.sort_unstable();
        columns.dedup();
        columns
    }

    /// Install the computed result and bind the recorded getters on it
    pub fn install(&mut self, mut table: ArrayTable) -> Result<()> {
        if table.schema().len() != self.schema.len() {
            return Err(Error::internal(format!(
                "materialized {} columns, expected {}",
                table.schema().len(),
                self.schema.len()
            )));
        }
        let inner = self
            .bindings
            .slots()
            .iter()
            .map(|&(column, kind)| table.bind(column, kind))
            .collect::<Result<Vec<_>>>()?;
        self.bindings.start();
        self.result = Some((table, inner));
        Ok(())
    }

    fn inner(&mut self, getter: &Getter) -> Result<(&mut ArrayTable, Getter)> {
        let id = self.index_of(getter)?;
        let (table, inner) = self
            .result
            .as_mut()
            .ok_or_else(|| Error::protocol("result read before the first next"))?;
        Ok((table, inner[id]))
    }

    fn index_of(&self, getter: &Getter) -> Result<usize> {
        self.bindings.slot(getter)?;
        Ok(getter.id)
    }

    /// Advance the installed result
    pub fn next(&mut self, desired: usize, cancel: &CancellationToken) -> Result<usize> {
        match &mut self.result {
            Some((table, _)) => table.next(desired, cancel),
            None => Err(Error::protocol("next before the result was installed")),
        }
    }

    /// Read a recorded `Current` getter
    pub fn get(&mut self, getter: &Getter) -> Result<XArray> {
        let (table, inner) = self.inner(getter)?;
        table.get(&inner)
    }

    /// Read a recorded `Seek` getter
    pub fn seek(&mut self, getter: &Getter, rows: &ArraySelector) -> Result<XArray> {
        let (table, inner) = self.inner(getter)?;
        table.seek(&inner, rows)
    }

    /// Rewind the installed result; a no-op before installation
    pub fn reset(&mut self) -> Result<()> {
        match &mut self.result {
            Some((table, _)) => table.reset(),
            None => Ok(()),
        }
    }

    /// Row count of the installed result
    pub fn count(&self) -> Option<usize> {
        self.result.as_ref().map(|(table, _)| table.row_count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ColumnType;

    #[test]
    fn test_replays_bindings_after_install() {
        let schema = vec![ColumnDetails::new("N", ColumnType::I64)];
        let mut result = Materialized::new(schema.clone());
        let getter = result.bind(0, GetterKind::Current).unwrap();
        assert_eq!(result.bound_columns(), vec![0]);

        let cancel = CancellationToken::new();
        assert!(result.next(10, &cancel).is_err());

        let table = ArrayTable::from_columns(vec![(
            schema[0].clone(),
            XArray::from_vec(vec![5i64, 6]),
        )])
        .unwrap();
        result.install(table).unwrap();
        assert_eq!(result.next(10, &cancel).unwrap(), 2);
        assert_eq!(result.get(&getter).unwrap().get::<i64>(1).unwrap(), Some(6));
        assert!(result.bind(0, GetterKind::Current).is_err());
    }
}
