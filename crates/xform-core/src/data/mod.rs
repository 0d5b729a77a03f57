//! Columnar data model
//!
//! - [`ArraySelector`]: logical row → buffer position indirection
//! - [`BitVector`]: packed match sets with paging
//! - [`XArray`]: one column's typed batch with nulls
//! - [`RowRemapper`]: narrowing batches to matching rows
//! - [`convert`]: typed value conversion for `cast`

pub mod bitvector;
pub mod convert;
pub mod remap;
pub mod selector;
pub mod string8;
pub mod types;
pub mod xarray;

pub use bitvector::BitVector;
pub use remap::RowRemapper;
pub use selector::ArraySelector;
pub use string8::{String8, String8Builder};
pub use types::{ArrayData, ColumnDetails, ColumnType, Num, XValue, find_column};
pub use xarray::{TypedView, XArray};
