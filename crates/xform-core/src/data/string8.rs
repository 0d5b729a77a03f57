//! UTF-8 string views over shared blocks
//!
//! A batch of strings is usually backed by one `Arc<str>` block; each
//! [`String8`] is a byte range into it. Cloning a view is a refcount bump.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Immutable string view into a shared UTF-8 block
#[derive(Clone)]
pub struct String8 {
    block: Arc<str>,
    start: u32,
    len: u32,
}

impl String8 {
    /// The empty string
    pub fn empty() -> Self {
        Self::from("")
    }

    /// View `block[start..start + len]`; the range must sit on char boundaries
    pub fn from_block(block: Arc<str>, start: usize, len: usize) -> Self {
        debug_assert!(block.is_char_boundary(start) && block.is_char_boundary(start + len));
        Self {
            block,
            start: start as u32,
            len: len as u32,
        }
    }

    /// The viewed text
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.block[self.start as usize..(self.start + self.len) as usize]
    }

    /// Length in bytes
    #[inline]
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// Whether the view is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether this view keeps a larger block alive than it needs
    pub fn is_shared(&self) -> bool {
        self.block.len() != self.len as usize
    }

    /// Copy the text into its own block so the source block can be freed.
    ///
    /// Dictionaries call this before inserting keys taken from a batch.
    pub fn compact(&self) -> Self {
        if self.is_shared() {
            Self::from(self.as_str())
        } else {
            self.clone()
        }
    }

    /// Case-insensitive substring test
    pub fn contains_ignore_case(&self, needle: &str) -> bool {
        if needle.is_empty() {
            return true;
        }
        self.as_str()
            .to_lowercase()
            .contains(&needle.to_lowercase())
    }
}

impl From<&str> for String8 {
    fn from(value: &str) -> Self {
        let len = value.len();
        Self::from_block(Arc::from(value), 0, len)
    }
}

impl From<String> for String8 {
    fn from(value: String) -> Self {
        let len = value.len();
        Self::from_block(Arc::from(value), 0, len)
    }
}

impl PartialEq for String8 {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for String8 {}

impl PartialOrd for String8 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for String8 {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_str().cmp(other.as_str())
    }
}

impl Hash for String8 {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_str().hash(state);
    }
}

impl Default for String8 {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Display for String8 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for String8 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

/// Accumulates many strings into a single block
#[derive(Debug, Default)]
pub struct String8Builder {
    text: String,
    ranges: Vec<(usize, usize)>,
}

impl String8Builder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one value
    pub fn push(&mut self, value: &str) {
        let start = self.text.len();
        self.text.push_str(value);
        self.ranges.push((start, value.len()));
    }

    /// Number of values appended so far
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// Whether nothing has been appended
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Freeze into views sharing one block
    pub fn finish(self) -> Vec<String8> {
        let block: Arc<str> = Arc::from(self.text);
        self.ranges
            .into_iter()
            .map(|(start, len)| String8::from_block(block.clone(), start, len))
            .collect()
    }
}
