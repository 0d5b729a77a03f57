//! Packed bitset over row ids
//!
//! [`BitVector`] is the match set produced by `where`, `join` and `choose`.
//! Matches are streamed out with [`BitVector::page`] instead of being collected
//! all at once.

use crate::{Error, Result};

const WORD_BITS: usize = 64;

/// Branch-free SWAR Hamming weight
#[cfg_attr(target_feature = "popcnt", allow(dead_code))]
#[inline]
fn hamming_weight(word: u64) -> u32 {
    let mut v = word;
    v -= (v >> 1) & 0x5555_5555_5555_5555;
    v = (v & 0x3333_3333_3333_3333) + ((v >> 2) & 0x3333_3333_3333_3333);
    v = (v + (v >> 4)) & 0x0f0f_0f0f_0f0f_0f0f;
    (v.wrapping_mul(0x0101_0101_0101_0101) >> 56) as u32
}

#[inline]
fn popcount(word: u64) -> u32 {
    #[cfg(target_feature = "popcnt")]
    {
        word.count_ones()
    }
    #[cfg(not(target_feature = "popcnt"))]
    {
        hamming_weight(word)
    }
}

/// Fixed-capacity bitset backed by 64-bit words
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BitVector {
    words: Vec<u64>,
    capacity: usize,
}

impl BitVector {
    /// Create an all-clear vector able to hold `capacity` bits
    pub fn new(capacity: usize) -> Self {
        Self {
            words: vec![0; capacity.div_ceil(WORD_BITS)],
            capacity,
        }
    }

    /// Number of addressable bits
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Grow (never shrink) to hold at least `capacity` bits, clearing all bits
    pub fn reset_to(&mut self, capacity: usize) {
        let words = capacity.div_ceil(WORD_BITS);
        if self.words.len() < words {
            self.words.resize(words, 0);
        }
        self.capacity = self.capacity.max(capacity);
        self.none();
    }

    /// Set bit `index`
    #[inline]
    pub fn set(&mut self, index: usize) {
        debug_assert!(index < self.capacity);
        self.words[index / WORD_BITS] |= 1u64 << (index % WORD_BITS);
    }

    /// Clear bit `index`
    #[inline]
    pub fn clear(&mut self, index: usize) {
        debug_assert!(index < self.capacity);
        self.words[index / WORD_BITS] &= !(1u64 << (index % WORD_BITS));
    }

    /// Whether bit `index` is set
    #[inline]
    pub fn get(&self, index: usize) -> bool {
        index < self.capacity && self.words[index / WORD_BITS] & (1u64 << (index % WORD_BITS)) != 0
    }

    /// Number of set bits
    pub fn count(&self) -> usize {
        self.words.iter().map(|&w| popcount(w) as usize).sum()
    }

    /// Whether no bit is set
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Write up to `out.len()` set indices, resuming at `cursor`.
    ///
    /// Returns the number of indices written. `cursor` is advanced past the
    /// last index written and becomes `None` once every set bit has been
    /// returned. Start from `Some(0)` and loop until `0` comes back.
    pub fn page(&self, out: &mut [u32], cursor: &mut Option<usize>) -> usize {
        let Some(from) = *cursor else {
            return 0;
        };
        let mut written = 0;
        let mut word_index = from / WORD_BITS;
        // Mask off bits below the resume point in the first word.
        let mut word = match self.words.get(word_index) {
            Some(&w) => w & (!0u64 << (from % WORD_BITS)),
            None => {
                *cursor = None;
                return 0;
            }
        };

        loop {
            while word != 0 {
                if written == out.len() {
                    *cursor = Some(word_index * WORD_BITS + word.trailing_zeros() as usize);
                    return written;
                }
                let bit = word.trailing_zeros() as usize;
                out[written] = (word_index * WORD_BITS + bit) as u32;
                written += 1;
                word &= word - 1;
            }
            word_index += 1;
            match self.words.get(word_index) {
                Some(&w) => word = w,
                None => break,
            }
        }

        *cursor = None;
        written
    }

    /// Collect every set index
    pub fn to_indices(&self) -> Vec<u32> {
        let mut out = vec![0u32; self.count()];
        let mut cursor = Some(0);
        let written = self.page(&mut out, &mut cursor);
        out.truncate(written);
        out
    }

    fn check_len(&self, other: &BitVector) -> Result<()> {
        if self.capacity != other.capacity {
            return Err(Error::range(format!(
                "bit vector lengths differ: {} vs {}",
                self.capacity, other.capacity
            )));
        }
        Ok(())
    }

    /// `self &= other`
    pub fn and(&mut self, other: &BitVector) -> Result<&mut Self> {
        self.check_len(other)?;
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            *a &= *b;
        }
        Ok(self)
    }

    /// `self |= other`
    pub fn or(&mut self, other: &BitVector) -> Result<&mut Self> {
        self.check_len(other)?;
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            *a |= *b;
        }
        Ok(self)
    }

    /// `self &= !other`
    pub fn and_not(&mut self, other: &BitVector) -> Result<&mut Self> {
        self.check_len(other)?;
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            *a &= !*b;
        }
        Ok(self)
    }

    /// Flip every bit below `length` and clear everything at or above it
    pub fn not(&mut self, length: usize) -> &mut Self {
        for w in self.words.iter_mut() {
            *w = !*w;
        }
        self.clear_above(length)
    }

    /// Clear every bit at index `length` or higher
    pub fn clear_above(&mut self, length: usize) -> &mut Self {
        let full_words = length / WORD_BITS;
        let remainder = length % WORD_BITS;
        let mut index = full_words;
        if remainder != 0 && index < self.words.len() {
            self.words[index] &= (1u64 << remainder) - 1;
            index += 1;
        }
        for w in self.words.iter_mut().skip(index) {
            *w = 0;
        }
        self
    }

    /// Set exactly the bits `[0, length)`
    pub fn all(&mut self, length: usize) -> &mut Self {
        for w in self.words.iter_mut() {
            *w = !0;
        }
        self.clear_above(length.min(self.capacity))
    }

    /// Clear every bit
    pub fn none(&mut self) -> &mut Self {
        for w in self.words.iter_mut() {
            *w = 0;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_set_get_clear() {
        let mut v = BitVector::new(130);
        v.set(0);
        v.set(64);
        v.set(129);
        assert!(v.get(0) && v.get(64) && v.get(129));
        assert!(!v.get(1));
        v.clear(64);
        assert!(!v.get(64));
        assert_eq!(v.count(), 2);
    }

    #[test]
    fn test_hamming_weight_matches_count_ones() {
        for word in [0u64, 1, u64::MAX, 0xdead_beef_cafe_f00d, 1 << 63, 0x5555] {
            assert_eq!(hamming_weight(word), word.count_ones());
        }
    }

    #[test]
    fn test_page_resumes() {
        let mut v = BitVector::new(300);
        let expected: Vec<u32> = (0..300).filter(|i| i % 7 == 0).collect();
        for &i in &expected {
            v.set(i as usize);
        }

        let mut buffer = [0u32; 10];
        let mut cursor = Some(0);
        let mut collected = Vec::new();
        loop {
            let n = v.page(&mut buffer, &mut cursor);
            if n == 0 {
                break;
            }
            collected.extend_from_slice(&buffer[..n]);
        }
        assert_eq!(collected, expected);
        assert!(cursor.is_none());
        assert_eq!(collected.len(), v.count());
    }

    #[test]
    fn test_all_not_is_empty() {
        for n in [0, 1, 63, 64, 65, 1000] {
            let mut v = BitVector::new(n);
            v.all(n).not(n);
            assert_eq!(v.count(), 0);
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_or_with_complement_is_full(bits in proptest::collection::vec(any::<bool>(), 0..=700)) {
            let n = bits.len();
            let mut v = BitVector::new(n);
            for (i, &bit) in bits.iter().enumerate() {
                if bit {
                    v.set(i);
                }
            }
            let mut complement = v.clone();
            complement.not(n);
            prop_assert_eq!(complement.count(), n - v.count());

            v.or(&complement).unwrap();
            prop_assert_eq!(v.count(), n);
        }
    }

    #[test]
    fn test_bulk_ops_require_equal_length() {
        let mut a = BitVector::new(10);
        let b = BitVector::new(11);
        assert!(a.and(&b).is_err());
        assert!(a.or(&b).is_err());
        assert!(a.and_not(&b).is_err());
    }

    #[test]
    fn test_clear_above() {
        let mut v = BitVector::new(128);
        v.all(128).clear_above(70);
        assert_eq!(v.count(), 70);
        assert!(v.get(69));
        assert!(!v.get(70));
    }
}
