//! Typed value conversion
//!
//! Every pair of [`ColumnType`]s converts through one of two bridges: text
//! (whenever either side is a string) or [`Num`](crate::data::Num) for numeric
//! and boolean types. `DateTime` converts only to and from text.

use crate::data::types::{ColumnType, XValue};
use crate::data::xarray::{TypedView, XArray};
use crate::dispatch_type;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// What to do with a value that does not convert
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConversionMode {
    /// Replace it with the default value, or null when there is none
    Lenient,
    /// Fail the batch with [`Error::Conversion`]
    Strict,
}

impl ConversionMode {
    /// Parse `strict` / `lenient`, case-insensitively
    pub fn parse(text: &str) -> Option<Self> {
        if text.eq_ignore_ascii_case("strict") {
            Some(Self::Strict)
        } else if text.eq_ignore_ascii_case("lenient") {
            Some(Self::Lenient)
        } else {
            None
        }
    }
}

/// Result of converting one batch
#[derive(Clone, Debug)]
pub struct Converted {
    /// The converted batch
    pub array: XArray,
    /// Non-null source values that did not convert
    pub failures: usize,
}

/// Convert one value between element types
pub fn convert_value<F: XValue, T: XValue>(value: &F) -> Option<T> {
    if F::TYPE == ColumnType::String || T::TYPE == ColumnType::String {
        T::parse_text(&value.to_string())
    } else {
        value.to_num().and_then(T::from_num)
    }
}

/// Whether any value of `from` could convert to `to`
pub fn can_convert(from: ColumnType, to: ColumnType) -> bool {
    from == to
        || from == ColumnType::String
        || to == ColumnType::String
        || (from != ColumnType::DateTime && to != ColumnType::DateTime)
}

/// Parse a literal as `to`, failing with a conversion error
pub fn parse_literal(text: &str, to: ColumnType) -> Result<XArray> {
    dispatch_type!(to, T => match T::parse_text(text) {
        Some(value) => Ok(XArray::single(value, 1)),
        None => Err(Error::conversion(text, ColumnType::String, to)),
    })
}

/// Convert a batch to `to`.
///
/// `default` is the literal substituted for failures in lenient mode.
pub fn convert_array(
    array: &XArray,
    to: ColumnType,
    mode: ConversionMode,
    default: Option<&str>,
) -> Result<Converted> {
    let from = array.column_type();
    if from == to {
        return Ok(Converted {
            array: array.clone(),
            failures: 0,
        });
    }
    dispatch_type!(from, F => {
        let view = array.typed::<F>()?;
        dispatch_type!(to, T => convert_typed::<F, T>(&view, mode, default))
    })
}

fn convert_typed<F: XValue, T: XValue>(
    view: &TypedView<'_, F>,
    mode: ConversionMode,
    default: Option<&str>,
) -> Result<Converted> {
    let default = match default {
        Some(text) => Some(
            T::parse_text(text).ok_or_else(|| Error::conversion(text, ColumnType::String, T::TYPE))?,
        ),
        None => None,
    };

    let count = view.len();
    let mut values: Vec<T> = Vec::with_capacity(count);
    let mut nulls: Vec<bool> = Vec::with_capacity(count);
    let mut any_null = false;
    let mut failures = 0;

    for row in 0..count {
        let Some(value) = view.get(row) else {
            values.push(T::default_value());
            nulls.push(true);
            any_null = true;
            continue;
        };
        match convert_value::<F, T>(value) {
            Some(converted) => {
                values.push(converted);
                nulls.push(false);
            }
            None => {
                if mode == ConversionMode::Strict {
                    return Err(Error::conversion(value.to_string(), F::TYPE, T::TYPE));
                }
                failures += 1;
                match &default {
                    Some(fallback) => {
                        values.push(fallback.clone());
                        nulls.push(false);
                    }
                    None => {
                        values.push(T::default_value());
                        nulls.push(true);
                        any_null = true;
                    }
                }
            }
        }
    }

    let array = XArray::all_with_nulls(T::wrap(values.into()), any_null.then(|| Arc::from(nulls)))?;
    Ok(Converted { array, failures })
}
