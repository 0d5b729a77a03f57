//! Column types and the typed value trait
//!
//! [`ColumnType`] is the closed set of element types a column can hold.
//! [`XValue`] ties each Rust element type to its tag, its [`ArrayData`]
//! variant and the per-value operations the verbs need. Typed kernels are
//! written once against `XValue` and instantiated through [`dispatch_type!`].

use crate::data::string8::String8;
use chrono::{NaiveDate, NaiveDateTime};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::Hash;
use std::str::FromStr;
use std::sync::Arc;

/// Element type of a column
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    /// `bool`
    Bool,
    /// `i8`
    I8,
    /// `u8`
    U8,
    /// `i16`
    I16,
    /// `u16`
    U16,
    /// `i32`
    I32,
    /// `u32`
    U32,
    /// `i64`
    I64,
    /// `u64`
    U64,
    /// `f32`
    F32,
    /// `f64`
    F64,
    /// UTF-8 text ([`String8`])
    String,
    /// Timestamp without zone (`chrono::NaiveDateTime`)
    DateTime,
}

impl ColumnType {
    /// Every type, in declaration order
    pub const ALL: [ColumnType; 13] = [
        ColumnType::Bool,
        ColumnType::I8,
        ColumnType::U8,
        ColumnType::I16,
        ColumnType::U16,
        ColumnType::I32,
        ColumnType::U32,
        ColumnType::I64,
        ColumnType::U64,
        ColumnType::F32,
        ColumnType::F64,
        ColumnType::String,
        ColumnType::DateTime,
    ];

    /// Canonical query-language name
    pub fn name(&self) -> &'static str {
        match self {
            ColumnType::Bool => "bool",
            ColumnType::I8 => "int8",
            ColumnType::U8 => "uint8",
            ColumnType::I16 => "int16",
            ColumnType::U16 => "uint16",
            ColumnType::I32 => "int32",
            ColumnType::U32 => "uint32",
            ColumnType::I64 => "int64",
            ColumnType::U64 => "uint64",
            ColumnType::F32 => "float32",
            ColumnType::F64 => "float64",
            ColumnType::String => "string",
            ColumnType::DateTime => "datetime",
        }
    }

    /// Parse a type name, accepting common aliases, case-insensitively
    pub fn parse(name: &str) -> Option<Self> {
        let lower = name.trim().to_ascii_lowercase();
        let found = match lower.as_str() {
            "bool" | "boolean" => ColumnType::Bool,
            "int8" | "sbyte" => ColumnType::I8,
            "uint8" | "byte" => ColumnType::U8,
            "int16" | "short" => ColumnType::I16,
            "uint16" | "ushort" => ColumnType::U16,
            "int32" | "int" => ColumnType::I32,
            "uint32" | "uint" => ColumnType::U32,
            "int64" | "long" => ColumnType::I64,
            "uint64" | "ulong" => ColumnType::U64,
            "float32" | "float" | "single" => ColumnType::F32,
            "float64" | "double" => ColumnType::F64,
            "string" | "string8" | "text" => ColumnType::String,
            "datetime" | "date" => ColumnType::DateTime,
            _ => return None,
        };
        Some(found)
    }

    /// Canonical names of every type, for suggestions
    pub fn names() -> Vec<String> {
        Self::ALL.iter().map(|t| t.name().to_string()).collect()
    }

    /// Integer or floating point
    pub fn is_numeric(&self) -> bool {
        !matches!(
            self,
            ColumnType::Bool | ColumnType::String | ColumnType::DateTime
        )
    }

    /// Signed or unsigned integer
    pub fn is_integer(&self) -> bool {
        self.is_numeric() && !matches!(self, ColumnType::F32 | ColumnType::F64)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ColumnType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("unknown type '{s}'"))
    }
}

/// Name and type of one column. Names compare case-insensitively.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDetails {
    name: String,
    column_type: ColumnType,
}

impl ColumnDetails {
    /// Describe a column
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }

    /// Column name as declared
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Element type
    pub fn column_type(&self) -> ColumnType {
        self.column_type
    }

    /// Same column under a new name
    pub fn rename(&self, name: impl Into<String>) -> Self {
        Self::new(name, self.column_type)
    }

    /// Same column with a new type
    pub fn change_type(&self, column_type: ColumnType) -> Self {
        Self::new(self.name.clone(), column_type)
    }

    /// Case-insensitive name comparison
    pub fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

/// Index of `name` in `columns`, compared case-insensitively
pub fn find_column(columns: &[ColumnDetails], name: &str) -> Option<usize> {
    columns.iter().position(|c| c.is_named(name))
}

/// Type-erased buffer behind an [`XArray`](crate::data::XArray)
#[derive(Clone, Debug)]
pub enum ArrayData {
    /// `bool` values
    Bool(Arc<[bool]>),
    /// `i8` values
    I8(Arc<[i8]>),
    /// `u8` values
    U8(Arc<[u8]>),
    /// `i16` values
    I16(Arc<[i16]>),
    /// `u16` values
    U16(Arc<[u16]>),
    /// `i32` values
    I32(Arc<[i32]>),
    /// `u32` values
    U32(Arc<[u32]>),
    /// `i64` values
    I64(Arc<[i64]>),
    /// `u64` values
    U64(Arc<[u64]>),
    /// `f32` values
    F32(Arc<[f32]>),
    /// `f64` values
    F64(Arc<[f64]>),
    /// text values
    String(Arc<[String8]>),
    /// timestamps
    DateTime(Arc<[NaiveDateTime]>),
}

impl ArrayData {
    /// Element type of the buffer
    pub fn column_type(&self) -> ColumnType {
        match self {
            ArrayData::Bool(_) => ColumnType::Bool,
            ArrayData::I8(_) => ColumnType::I8,
            ArrayData::U8(_) => ColumnType::U8,
            ArrayData::I16(_) => ColumnType::I16,
            ArrayData::U16(_) => ColumnType::U16,
            ArrayData::I32(_) => ColumnType::I32,
            ArrayData::U32(_) => ColumnType::U32,
            ArrayData::I64(_) => ColumnType::I64,
            ArrayData::U64(_) => ColumnType::U64,
            ArrayData::F32(_) => ColumnType::F32,
            ArrayData::F64(_) => ColumnType::F64,
            ArrayData::String(_) => ColumnType::String,
            ArrayData::DateTime(_) => ColumnType::DateTime,
        }
    }

    /// Physical buffer length
    pub fn len(&self) -> usize {
        match self {
            ArrayData::Bool(v) => v.len(),
            ArrayData::I8(v) => v.len(),
            ArrayData::U8(v) => v.len(),
            ArrayData::I16(v) => v.len(),
            ArrayData::U16(v) => v.len(),
            ArrayData::I32(v) => v.len(),
            ArrayData::U32(v) => v.len(),
            ArrayData::I64(v) => v.len(),
            ArrayData::U64(v) => v.len(),
            ArrayData::F32(v) => v.len(),
            ArrayData::F64(v) => v.len(),
            ArrayData::String(v) => v.len(),
            ArrayData::DateTime(v) => v.len(),
        }
    }

    /// Whether the buffer holds no values
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Numeric bridge used by casts and aggregation
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Num {
    /// Any integer value
    Int(i128),
    /// Any floating point value
    Float(f64),
}

impl Num {
    /// Lossy float view
    pub fn as_f64(&self) -> f64 {
        match *self {
            Num::Int(i) => i as f64,
            Num::Float(f) => f,
        }
    }

    /// Exact integer view; floats qualify only when integral and finite
    pub fn as_i128(&self) -> Option<i128> {
        match *self {
            Num::Int(i) => Some(i),
            Num::Float(f) if f.is_finite() && f.fract() == 0.0 => {
                if f >= i128::MIN as f64 && f <= i128::MAX as f64 {
                    Some(f as i128)
                } else {
                    None
                }
            }
            Num::Float(_) => None,
        }
    }
}

/// A Rust element type storable in a column
pub trait XValue:
    Clone + PartialEq + PartialOrd + fmt::Debug + fmt::Display + Send + Sync + 'static
{
    /// Type tag
    const TYPE: ColumnType;

    /// Hashable, owning form used as a dictionary key
    type Key: Eq + Hash + Clone + fmt::Debug;

    /// Wrap a typed buffer
    fn wrap(values: Arc<[Self]>) -> ArrayData;

    /// View a buffer as this type
    fn unwrap(data: &ArrayData) -> Option<&Arc<[Self]>>;

    /// Placeholder stored under null rows
    fn default_value() -> Self;

    /// Key for dictionaries; copies out of shared buffers where needed
    fn to_key(&self) -> Self::Key;

    /// Key for probing only; may keep referencing the shared buffer
    fn lookup_key(&self) -> Self::Key {
        self.to_key()
    }

    /// Value back from a dictionary key
    fn from_key(key: &Self::Key) -> Self;

    /// Total order used by `min`/`max`/`choose` (floats order NaN last)
    fn total_cmp(&self, other: &Self) -> Ordering;

    /// Numeric view, when the type is numeric or boolean
    fn to_num(&self) -> Option<Num>;

    /// Convert from a number; `None` when out of range or inexact
    fn from_num(num: Num) -> Option<Self>;

    /// Parse from text; `None` when malformed
    fn parse_text(text: &str) -> Option<Self>;
}

macro_rules! impl_integer_value {
    ($rust:ty, $variant:ident) => {
        impl XValue for $rust {
            const TYPE: ColumnType = ColumnType::$variant;
            type Key = $rust;

            fn wrap(values: Arc<[Self]>) -> ArrayData {
                ArrayData::$variant(values)
            }

            fn unwrap(data: &ArrayData) -> Option<&Arc<[Self]>> {
                match data {
                    ArrayData::$variant(values) => Some(values),
                    _ => None,
                }
            }

            fn default_value() -> Self {
                0
            }

            fn to_key(&self) -> Self::Key {
                *self
            }

            fn from_key(key: &Self::Key) -> Self {
                *key
            }

            fn total_cmp(&self, other: &Self) -> Ordering {
                self.cmp(other)
            }

            fn to_num(&self) -> Option<Num> {
                Some(Num::Int(*self as i128))
            }

            fn from_num(num: Num) -> Option<Self> {
                num.as_i128().and_then(|i| <$rust>::try_from(i).ok())
            }

            fn parse_text(text: &str) -> Option<Self> {
                text.trim().parse().ok()
            }
        }
    };
}

impl_integer_value!(i8, I8);
impl_integer_value!(u8, U8);
impl_integer_value!(i16, I16);
impl_integer_value!(u16, U16);
impl_integer_value!(i32, I32);
impl_integer_value!(u32, U32);
impl_integer_value!(i64, I64);
impl_integer_value!(u64, U64);

macro_rules! impl_float_value {
    ($rust:ty, $variant:ident) => {
        impl XValue for $rust {
            const TYPE: ColumnType = ColumnType::$variant;
            type Key = OrderedFloat<$rust>;

            fn wrap(values: Arc<[Self]>) -> ArrayData {
                ArrayData::$variant(values)
            }

            fn unwrap(data: &ArrayData) -> Option<&Arc<[Self]>> {
                match data {
                    ArrayData::$variant(values) => Some(values),
                    _ => None,
                }
            }

            fn default_value() -> Self {
                0.0
            }

            fn to_key(&self) -> Self::Key {
                OrderedFloat(*self)
            }

            fn from_key(key: &Self::Key) -> Self {
                key.0
            }

            fn total_cmp(&self, other: &Self) -> Ordering {
                OrderedFloat(*self).cmp(&OrderedFloat(*other))
            }

            fn to_num(&self) -> Option<Num> {
                Some(Num::Float(*self as f64))
            }

            fn from_num(num: Num) -> Option<Self> {
                let value = num.as_f64();
                if value.is_finite() && (value.abs() > <$rust>::MAX as f64) {
                    None
                } else {
                    Some(value as $rust)
                }
            }

            fn parse_text(text: &str) -> Option<Self> {
                text.trim().parse().ok()
            }
        }
    };
}

impl_float_value!(f32, F32);
impl_float_value!(f64, F64);

impl XValue for bool {
    const TYPE: ColumnType = ColumnType::Bool;
    type Key = bool;

    fn wrap(values: Arc<[Self]>) -> ArrayData {
        ArrayData::Bool(values)
    }

    fn unwrap(data: &ArrayData) -> Option<&Arc<[Self]>> {
        match data {
            ArrayData::Bool(values) => Some(values),
            _ => None,
        }
    }

    fn default_value() -> Self {
        false
    }

    fn to_key(&self) -> Self::Key {
        *self
    }

    fn from_key(key: &Self::Key) -> Self {
        *key
    }

    fn total_cmp(&self, other: &Self) -> Ordering {
        self.cmp(other)
    }

    fn to_num(&self) -> Option<Num> {
        Some(Num::Int(i128::from(*self)))
    }

    fn from_num(num: Num) -> Option<Self> {
        match num.as_i128() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        }
    }

    fn parse_text(text: &str) -> Option<Self> {
        match text.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => None,
        }
    }
}

impl XValue for String8 {
    const TYPE: ColumnType = ColumnType::String;
    type Key = String8;

    fn wrap(values: Arc<[Self]>) -> ArrayData {
        ArrayData::String(values)
    }

    fn unwrap(data: &ArrayData) -> Option<&Arc<[Self]>> {
        match data {
            ArrayData::String(values) => Some(values),
            _ => None,
        }
    }

    fn default_value() -> Self {
        String8::empty()
    }

    fn to_key(&self) -> Self::Key {
        self.compact()
    }

    fn lookup_key(&self) -> Self::Key {
        self.clone()
    }

    fn from_key(key: &Self::Key) -> Self {
        key.clone()
    }

    fn total_cmp(&self, other: &Self) -> Ordering {
        self.cmp(other)
    }

    fn to_num(&self) -> Option<Num> {
        let text = self.as_str().trim();
        text.parse::<i128>()
            .map(Num::Int)
            .ok()
            .or_else(|| text.parse::<f64>().ok().map(Num::Float))
    }

    fn from_num(num: Num) -> Option<Self> {
        Some(match num {
            Num::Int(i) => String8::from(i.to_string()),
            Num::Float(f) => String8::from(f.to_string()),
        })
    }

    fn parse_text(text: &str) -> Option<Self> {
        Some(String8::from(text))
    }
}

const DATE_TIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
];

impl XValue for NaiveDateTime {
    const TYPE: ColumnType = ColumnType::DateTime;
    type Key = NaiveDateTime;

    fn wrap(values: Arc<[Self]>) -> ArrayData {
        ArrayData::DateTime(values)
    }

    fn unwrap(data: &ArrayData) -> Option<&Arc<[Self]>> {
        match data {
            ArrayData::DateTime(values) => Some(values),
            _ => None,
        }
    }

    fn default_value() -> Self {
        NaiveDateTime::default()
    }

    fn to_key(&self) -> Self::Key {
        *self
    }

    fn from_key(key: &Self::Key) -> Self {
        *key
    }

    fn total_cmp(&self, other: &Self) -> Ordering {
        self.cmp(other)
    }

    fn to_num(&self) -> Option<Num> {
        None
    }

    fn from_num(_num: Num) -> Option<Self> {
        None
    }

    fn parse_text(text: &str) -> Option<Self> {
        let text = text.trim();
        DATE_TIME_FORMATS
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
            .or_else(|| {
                NaiveDate::parse_from_str(text, "%Y-%m-%d")
                    .ok()
                    .and_then(|date| date.and_hms_opt(0, 0, 0))
            })
    }
}

/// Run `$body` with `$T` aliased to the Rust type behind a [`ColumnType`].
///
/// ```ignore
/// let len = dispatch_type!(column_type, T => typed_len::<T>(&array));
/// ```
#[macro_export]
macro_rules! dispatch_type {
    ($column_type:expr, $T:ident => $body:expr) => {
        match $column_type {
            $crate::data::ColumnType::Bool => {
                type $T = bool;
                $body
            }
            $crate::data::ColumnType::I8 => {
                type $T = i8;
                $body
            }
            $crate::data::ColumnType::U8 => {
                type $T = u8;
                $body
            }
            $crate::data::ColumnType::I16 => {
                type $T = i16;
                $body
            }
            $crate::data::ColumnType::U16 => {
                type $T = u16;
                $body
            }
            $crate::data::ColumnType::I32 => {
                type $T = i32;
                $body
            }
            $crate::data::ColumnType::U32 => {
                type $T = u32;
                $body
            }
            $crate::data::ColumnType::I64 => {
                type $T = i64;
                $body
            }
            $crate::data::ColumnType::U64 => {
                type $T = u64;
                $body
            }
            $crate::data::ColumnType::F32 => {
                type $T = f32;
                $body
            }
            $crate::data::ColumnType::F64 => {
                type $T = f64;
                $body
            }
            $crate::data::ColumnType::String => {
                type $T = $crate::data::String8;
                $body
            }
            $crate::data::ColumnType::DateTime => {
                type $T = ::chrono::NaiveDateTime;
                $body
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_names_round_trip() {
        for t in ColumnType::ALL {
            assert_eq!(ColumnType::parse(t.name()), Some(t));
        }
        assert_eq!(ColumnType::parse("INT"), Some(ColumnType::I32));
        assert_eq!(ColumnType::parse("nope"), None);
    }

    #[test]
    fn test_integer_from_num_range_checks() {
        assert_eq!(i8::from_num(Num::Int(127)), Some(127));
        assert_eq!(i8::from_num(Num::Int(128)), None);
        assert_eq!(u16::from_num(Num::Int(-1)), None);
        assert_eq!(i32::from_num(Num::Float(12.0)), Some(12));
        assert_eq!(i32::from_num(Num::Float(12.5)), None);
    }

    #[test]
    fn test_parse_text() {
        assert_eq!(i32::parse_text(" 42 "), Some(42));
        assert_eq!(bool::parse_text("Yes"), Some(true));
        assert_eq!(f64::parse_text("2.5"), Some(2.5));
        let dt = NaiveDateTime::parse_text("2017-03-01").unwrap();
        assert_eq!(dt.to_string(), "2017-03-01 00:00:00");
        assert!(NaiveDateTime::parse_text("2017-03-01 10:20:30").is_some());
    }

    #[test]
    fn test_dispatch_type_binds_alias() {
        fn tag<T: XValue>() -> ColumnType {
            T::TYPE
        }
        for t in ColumnType::ALL {
            assert_eq!(dispatch_type!(t, T => tag::<T>()), t);
        }
    }

    #[test]
    fn test_float_keys_are_hashable() {
        use std::collections::HashSet;
        let keys: HashSet<_> = [1.5f64, 1.5, 2.0].iter().map(|v| v.to_key()).collect();
        assert_eq!(keys.len(), 2);
    }

    #[test]
    fn test_column_details_case_insensitive() {
        let columns = vec![
            ColumnDetails::new("ServerPort", ColumnType::I32),
            ColumnDetails::new("Uri", ColumnType::String),
        ];
        assert_eq!(find_column(&columns, "serverport"), Some(0));
        assert_eq!(find_column(&columns, "URI"), Some(1));
        assert_eq!(columns[0].rename("Port").name(), "Port");
        assert_eq!(
            columns[0].change_type(ColumnType::I64).column_type(),
            ColumnType::I64
        );
    }
}
