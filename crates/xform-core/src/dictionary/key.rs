//! Single-column key dictionary

use super::KeyHasher;
use crate::data::XValue;
use std::collections::HashMap;

/// Map from column values to `V`.
///
/// Inserting copies the value out of its batch ([`XValue::to_key`]); lookups
/// probe without copying ([`XValue::lookup_key`]).
#[derive(Debug)]
pub struct KeyDictionary<T: XValue, V> {
    map: HashMap<T::Key, V, KeyHasher>,
}

impl<T: XValue, V> Default for KeyDictionary<T, V> {
    fn default() -> Self {
        Self {
            map: HashMap::default(),
        }
    }
}

impl<T: XValue, V> KeyDictionary<T, V> {
    /// Empty dictionary
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty dictionary sized for `capacity` keys
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            map: HashMap::with_capacity_and_hasher(capacity, KeyHasher::default()),
        }
    }

    /// Set the value for `key`, replacing (and returning) any earlier one
    pub fn insert(&mut self, key: &T, value: V) -> Option<V> {
        self.map.insert(key.to_key(), value)
    }

    /// Value for `key`
    pub fn get(&self, key: &T) -> Option<&V> {
        self.map.get(&key.lookup_key())
    }

    /// Value for `key`, inserting `make()` first when absent
    pub fn get_or_insert_with(&mut self, key: &T, make: impl FnOnce() -> V) -> &mut V {
        let probe = key.lookup_key();
        let key = if self.map.contains_key(&probe) {
            probe
        } else {
            key.to_key()
        };
        self.map.entry(key).or_insert_with(make)
    }

    /// Number of distinct keys
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether no key has been added
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Keys (as values) with their entries, in arbitrary order
    pub fn iter(&self) -> impl Iterator<Item = (T, &V)> {
        self.map.iter().map(|(key, value)| (T::from_key(key), value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{String8, XArray};

    #[test]
    fn test_last_insert_wins() {
        let mut dictionary: KeyDictionary<i32, u32> = KeyDictionary::new();
        assert_eq!(dictionary.insert(&9, 2), None);
        assert_eq!(dictionary.insert(&9, 4), Some(2));
        assert_eq!(dictionary.get(&9), Some(&4));
        assert_eq!(dictionary.get(&8), None);
        assert_eq!(dictionary.len(), 1);
    }

    #[test]
    fn test_string_keys_are_copied_out_of_batches() {
        let batch = XArray::from_strs(&["alpha", "beta", "alpha"]);
        let view = batch.typed::<String8>().unwrap();
        let mut counts: KeyDictionary<String8, usize> = KeyDictionary::with_capacity(4);
        for row in 0..view.len() {
            *counts.get_or_insert_with(view.value(row), || 0) += 1;
        }
        drop(batch);

        let mut entries: Vec<(String, usize)> = counts
            .iter()
            .map(|(key, count)| (key.as_str().to_string(), *count))
            .collect();
        entries.sort();
        assert_eq!(entries, vec![("alpha".into(), 2), ("beta".into(), 1)]);
        assert!(counts.iter().all(|(key, _)| !key.is_shared()));
    }

    #[test]
    fn test_float_keys() {
        let mut dictionary: KeyDictionary<f64, ()> = KeyDictionary::new();
        dictionary.insert(&1.5, ());
        assert!(dictionary.get(&1.5).is_some());
        assert!(dictionary.get(&2.5).is_none());
    }
}
