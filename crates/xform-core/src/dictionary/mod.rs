//! Hash dictionaries keyed by column values
//!
//! [`KeyDictionary`] maps single-column values (join keys, peek counts);
//! [`GroupKeyDictionary`] assigns bucket ids to multi-column key tuples
//! (`groupBy`, `choose`). Both hash with xxh3.

pub mod group;
pub mod key;

pub use group::{GroupKeyDictionary, KeyColumn, key_column};
pub use key::KeyDictionary;

/// Hasher used by every dictionary
pub type KeyHasher = std::hash::BuildHasherDefault<xxhash_rust::xxh3::Xxh3>;
