//! Row indirection descriptors
//!
//! An [`ArraySelector`] says which real buffer positions a batch's logical rows
//! `[0, count)` occupy. Selectors are small immutable values; composing or
//! slicing one always yields a new selector.

use crate::{Error, Result};
use std::sync::Arc;

#[derive(Clone, Debug)]
enum Shape {
    /// Logical row `i` is buffer position `start + i`
    Range,
    /// Logical row `i` is buffer position `indices[start + i]`
    Indexed(Arc<[u32]>),
    /// Every logical row is buffer position 0
    Single,
}

/// Maps logical rows of a batch onto positions of a shared buffer
#[derive(Clone, Debug)]
pub struct ArraySelector {
    shape: Shape,
    start: usize,
    end: usize,
}

impl ArraySelector {
    /// Contiguous selector over `[0, count)`
    pub fn all(count: usize) -> Self {
        Self::range(0, count)
    }

    /// Contiguous selector over `[start, end)`
    pub fn range(start: usize, end: usize) -> Self {
        debug_assert!(start <= end);
        Self {
            shape: Shape::Range,
            start,
            end,
        }
    }

    /// Indexed selector over the window `[start, end)` of `indices`
    pub fn map(indices: Arc<[u32]>, start: usize, end: usize) -> Self {
        debug_assert!(start <= end && end <= indices.len());
        Self {
            shape: Shape::Indexed(indices),
            start,
            end,
        }
    }

    /// Indexed selector over every entry of `indices`
    pub fn map_all(indices: Arc<[u32]>) -> Self {
        let end = indices.len();
        Self::map(indices, 0, end)
    }

    /// `count` logical rows all reading buffer position 0
    pub fn single(count: usize) -> Self {
        Self {
            shape: Shape::Single,
            start: 0,
            end: count,
        }
    }

    /// Number of logical rows
    #[inline]
    pub fn count(&self) -> usize {
        self.end - self.start
    }

    /// First position of the window (buffer or index array)
    #[inline]
    pub fn start(&self) -> usize {
        self.start
    }

    /// End of the window (exclusive)
    #[inline]
    pub fn end(&self) -> usize {
        self.end
    }

    /// The index array, when this selector is indexed
    pub fn indices(&self) -> Option<&Arc<[u32]>> {
        match &self.shape {
            Shape::Indexed(indices) => Some(indices),
            _ => None,
        }
    }

    /// Whether every row reads the same buffer position
    #[inline]
    pub fn is_single(&self) -> bool {
        matches!(self.shape, Shape::Single)
    }

    /// Whether logical rows map to consecutive buffer positions
    #[inline]
    pub fn is_contiguous(&self) -> bool {
        matches!(self.shape, Shape::Range)
    }

    /// Buffer position of logical row `row`
    #[inline]
    pub fn index(&self, row: usize) -> usize {
        match &self.shape {
            Shape::Range => self.start + row,
            Shape::Indexed(indices) => indices[self.start + row] as usize,
            Shape::Single => 0,
        }
    }

    /// Highest buffer position addressed plus one (0 when empty)
    pub fn required_len(&self) -> usize {
        if self.count() == 0 {
            return 0;
        }
        match &self.shape {
            Shape::Range => self.end,
            Shape::Indexed(indices) => indices[self.start..self.end]
                .iter()
                .map(|&i| i as usize + 1)
                .max()
                .unwrap_or(0),
            Shape::Single => 1,
        }
    }

    /// Narrow the window to `[start, end)`, expressed in this selector's
    /// window coordinates (so `slice(s.start(), s.start())` is empty).
    pub fn slice(&self, start: usize, end: usize) -> Result<Self> {
        if start < self.start || start > end || end > self.end {
            return Err(Error::range(format!(
                "cannot slice [{start}, {end}) out of [{}, {})",
                self.start, self.end
            )));
        }
        Ok(Self {
            shape: self.shape.clone(),
            start,
            end,
        })
    }

    /// Slice by logical row offsets `[from, from + count)`
    pub fn slice_rows(&self, from: usize, count: usize) -> Result<Self> {
        self.slice(self.start + from, self.start + from + count)
    }

    /// Compose with `inner`, which selects among this selector's logical rows.
    ///
    /// Row `i` of the result reads buffer position `self.index(inner.index(i))`.
    pub fn select(&self, inner: &ArraySelector) -> Self {
        match (&self.shape, &inner.shape) {
            (Shape::Single, _) => Self::single(inner.count()),
            (Shape::Range, Shape::Range) => {
                Self::range(self.start + inner.start, self.start + inner.end)
            }
            _ => {
                let indices: Vec<u32> = (0..inner.count())
                    .map(|row| self.index(inner.index(row)) as u32)
                    .collect();
                Self::map_all(indices.into())
            }
        }
    }

    /// Identity comparison: same shape, same window and the same shared index
    /// array (pointer equality). Used to share remap work between columns.
    pub fn is_same(&self, other: &ArraySelector) -> bool {
        if self.start != other.start || self.end != other.end {
            return false;
        }
        match (&self.shape, &other.shape) {
            (Shape::Range, Shape::Range) | (Shape::Single, Shape::Single) => true,
            (Shape::Indexed(a), Shape::Indexed(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Default for ArraySelector {
    fn default() -> Self {
        Self::all(0)
    }
}
