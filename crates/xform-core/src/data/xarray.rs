//! One column's batch of values
//!
//! An [`XArray`] is a typed buffer, an optional per-buffer-position null mask,
//! and an [`ArraySelector`] choosing which buffer positions form the batch.
//! Filtering and joining only swap selectors; values are copied only by
//! [`XArray::to_contiguous`] and explicit materialization.

use crate::data::selector::ArraySelector;
use crate::data::string8::{String8, String8Builder};
use crate::data::types::{ArrayData, ColumnType, XValue};
use crate::dispatch_type;
use crate::{Error, Result};
use std::sync::Arc;

/// Typed batch with selector-based row indirection
#[derive(Clone, Debug)]
pub struct XArray {
    data: ArrayData,
    nulls: Option<Arc<[bool]>>,
    selector: ArraySelector,
}

impl XArray {
    /// Build from parts, checking that buffer and mask cover the selector
    pub fn new(data: ArrayData, nulls: Option<Arc<[bool]>>, selector: ArraySelector) -> Result<Self> {
        let required = selector.required_len();
        if data.len() < required {
            return Err(Error::range(format!(
                "selector addresses {required} values but buffer holds {}",
                data.len()
            )));
        }
        if let Some(mask) = &nulls {
            if mask.len() < required {
                return Err(Error::range(format!(
                    "selector addresses {required} rows but null mask holds {}",
                    mask.len()
                )));
            }
        }
        Ok(Self {
            data,
            nulls,
            selector,
        })
    }

    /// Whole buffer, no nulls
    pub fn all(data: ArrayData) -> Self {
        let selector = ArraySelector::all(data.len());
        Self {
            data,
            nulls: None,
            selector,
        }
    }

    /// Whole buffer with an optional null mask of the same length
    pub fn all_with_nulls(data: ArrayData, nulls: Option<Arc<[bool]>>) -> Result<Self> {
        let selector = ArraySelector::all(data.len());
        Self::new(data, nulls, selector)
    }

    /// Whole typed vector, no nulls
    pub fn from_vec<T: XValue>(values: Vec<T>) -> Self {
        Self::all(T::wrap(values.into()))
    }

    /// Whole typed vector where `None` marks a null row
    pub fn from_options<T: XValue>(values: Vec<Option<T>>) -> Self {
        let mut nulls = Vec::with_capacity(values.len());
        let mut data = Vec::with_capacity(values.len());
        for value in values {
            nulls.push(value.is_none());
            data.push(value.unwrap_or_else(T::default_value));
        }
        let mask = nulls.iter().any(|&n| n).then(|| Arc::from(nulls));
        Self {
            selector: ArraySelector::all(data.len()),
            data: T::wrap(data.into()),
            nulls: mask,
        }
    }

    /// Strings packed into one shared block
    pub fn from_strs<S: AsRef<str>>(values: &[S]) -> Self {
        let mut builder = String8Builder::new();
        for value in values {
            builder.push(value.as_ref());
        }
        Self::from_vec::<String8>(builder.finish())
    }

    /// `count` rows all holding `value`
    pub fn single<T: XValue>(value: T, count: usize) -> Self {
        Self {
            data: T::wrap(Arc::from(vec![value])),
            nulls: None,
            selector: ArraySelector::single(count),
        }
    }

    /// `count` rows repeating buffer position 0 of `data`, and its null flag
    pub fn single_from(data: ArrayData, nulls: Option<Arc<[bool]>>, count: usize) -> Result<Self> {
        Self::new(data, nulls, ArraySelector::single(count))
    }

    /// `count` null rows of `column_type`
    pub fn null(column_type: ColumnType, count: usize) -> Self {
        let data = dispatch_type!(column_type, T => T::wrap(Arc::from(vec![T::default_value()])));
        Self {
            data,
            nulls: Some(Arc::from(vec![true])),
            selector: ArraySelector::single(count),
        }
    }

    /// Zero rows of `column_type`
    pub fn empty(column_type: ColumnType) -> Self {
        let data = dispatch_type!(column_type, T => T::wrap(Arc::from(Vec::<T>::new())));
        Self::all(data)
    }

    /// Number of logical rows
    #[inline]
    pub fn count(&self) -> usize {
        self.selector.count()
    }

    /// Element type
    pub fn column_type(&self) -> ColumnType {
        self.data.column_type()
    }

    /// Physical buffer
    pub fn data(&self) -> &ArrayData {
        &self.data
    }

    /// Physical null mask
    pub fn nulls(&self) -> Option<&Arc<[bool]>> {
        self.nulls.as_ref()
    }

    /// Row indirection
    pub fn selector(&self) -> &ArraySelector {
        &self.selector
    }

    /// Whether any row could be null
    pub fn has_nulls(&self) -> bool {
        self.nulls.is_some()
    }

    /// Whether logical row `row` is null
    #[inline]
    pub fn is_null(&self, row: usize) -> bool {
        match &self.nulls {
            Some(mask) => mask[self.selector.index(row)],
            None => false,
        }
    }

    /// Typed view of this batch
    pub fn typed<T: XValue>(&self) -> Result<TypedView<'_, T>> {
        let values = T::unwrap(&self.data).ok_or_else(|| {
            Error::protocol(format!(
                "array holds {} but {} was requested",
                self.column_type(),
                T::TYPE
            ))
        })?;
        Ok(TypedView {
            values,
            nulls: self.nulls.as_deref(),
            selector: &self.selector,
        })
    }

    /// Owned value at logical row `row`, `None` when null
    pub fn get<T: XValue>(&self, row: usize) -> Result<Option<T>> {
        Ok(self.typed::<T>()?.get(row).cloned())
    }

    /// Same buffer under a different selector (selector indexes the buffer)
    pub fn reselect(&self, selector: ArraySelector) -> Result<Self> {
        Self::new(self.data.clone(), self.nulls.clone(), selector)
    }

    /// Keep the logical rows chosen by `inner`
    pub fn select(&self, inner: &ArraySelector) -> Self {
        Self {
            data: self.data.clone(),
            nulls: self.nulls.clone(),
            selector: self.selector.select(inner),
        }
    }

    /// Logical rows `[from, from + count)`
    pub fn slice(&self, from: usize, count: usize) -> Result<Self> {
        Ok(Self {
            data: self.data.clone(),
            nulls: self.nulls.clone(),
            selector: self.selector.slice_rows(from, count)?,
        })
    }

    /// Copy the logical rows into fresh buffers with an `all` selector
    pub fn to_contiguous(&self) -> Self {
        if self.selector.is_contiguous()
            && self.selector.start() == 0
            && self.data.len() == self.count()
        {
            return self.clone();
        }
        dispatch_type!(self.column_type(), T => match self.typed::<T>() {
            Ok(view) => contiguous_of(&view),
            Err(_) => self.clone(),
        })
    }

    /// Concatenate batches of one type into a single contiguous array
    pub fn concat(column_type: ColumnType, parts: &[XArray]) -> Result<Self> {
        dispatch_type!(column_type, T => {
            let total: usize = parts.iter().map(XArray::count).sum();
            let mut values: Vec<T> = Vec::with_capacity(total);
            let mut nulls: Vec<bool> = Vec::with_capacity(total);
            let mut any_null = false;
            for part in parts {
                let view = part.typed::<T>()?;
                for row in 0..view.len() {
                    let null = view.is_null(row);
                    any_null |= null;
                    nulls.push(null);
                    values.push(view.value(row).clone());
                }
            }
            Self::all_with_nulls(T::wrap(values.into()), any_null.then(|| Arc::from(nulls)))
        })
    }
}

fn contiguous_of<T: XValue>(view: &TypedView<'_, T>) -> XArray {
    let count = view.len();
    let values: Vec<T> = (0..count).map(|row| view.value(row).clone()).collect();
    let nulls = if view.nulls.is_some() {
        let mask: Vec<bool> = (0..count).map(|row| view.is_null(row)).collect();
        mask.iter().any(|&n| n).then(|| Arc::from(mask))
    } else {
        None
    };
    XArray {
        data: T::wrap(values.into()),
        nulls,
        selector: ArraySelector::all(count),
    }
}

/// Borrowed typed access to an [`XArray`]
#[derive(Clone, Copy, Debug)]
pub struct TypedView<'a, T> {
    values: &'a [T],
    nulls: Option<&'a [bool]>,
    selector: &'a ArraySelector,
}

impl<'a, T: XValue> TypedView<'a, T> {
    /// Number of logical rows
    #[inline]
    pub fn len(&self) -> usize {
        self.selector.count()
    }

    /// Whether the view has no rows
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether row `row` is null
    #[inline]
    pub fn is_null(&self, row: usize) -> bool {
        match self.nulls {
            Some(mask) => mask[self.selector.index(row)],
            None => false,
        }
    }

    /// Value at row `row`, ignoring the null mask
    #[inline]
    pub fn value(&self, row: usize) -> &'a T {
        &self.values[self.selector.index(row)]
    }

    /// Value at row `row`, `None` when null
    #[inline]
    pub fn get(&self, row: usize) -> Option<&'a T> {
        let index = self.selector.index(row);
        match self.nulls {
            Some(mask) if mask[index] => None,
            _ => Some(&self.values[index]),
        }
    }

    /// Whether this batch repeats one physical value
    pub fn is_single(&self) -> bool {
        self.selector.is_single()
    }

    /// Whether any row could be null
    pub fn has_nulls(&self) -> bool {
        self.nulls.is_some()
    }
}
