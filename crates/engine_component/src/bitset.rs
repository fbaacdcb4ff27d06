//! Growable bit vector used for entity masks and query masks.
//!
//! A [`BitSet`] stores one bit per slot in 32-bit words. It grows on
//! [`BitSet::add`] and never shrinks. Every binary operation treats words
//! past the end of either operand as zero, so two sets that differ only in
//! trailing zero words compare (and hash) equal.

use std::hash::{Hash, Hasher};

const WORD_BITS: usize = 32;

#[inline]
fn split(n: usize) -> (usize, u32) {
    (n / WORD_BITS, 1u32 << (n % WORD_BITS))
}

/// A growable set of small non-negative integers.
#[derive(Debug, Clone, Default)]
pub struct BitSet {
    words: Vec<u32>,
}

impl BitSet {
    /// Create an empty bitset.
    #[must_use]
    pub fn new() -> Self {
        Self { words: Vec::new() }
    }

    /// Create a bitset containing every slot in `slots`.
    #[must_use]
    pub fn from_slots(slots: &[usize]) -> Self {
        slots.iter().copied().collect()
    }

    /// Returns `true` if `n` is in the set.
    #[must_use]
    pub fn has(&self, n: usize) -> bool {
        let (index, bit) = split(n);
        self.word(index) & bit != 0
    }

    /// Insert `n`, growing the word array to `n / 32 + 1` words if needed.
    pub fn add(&mut self, n: usize) {
        let (index, bit) = split(n);
        if index >= self.words.len() {
            self.words.resize(index + 1, 0);
        }
        self.words[index] |= bit;
    }

    /// Remove `n`. Removing a slot past the end is a no-op.
    pub fn remove(&mut self, n: usize) {
        let (index, bit) = split(n);
        if let Some(word) = self.words.get_mut(index) {
            *word &= !bit;
        }
    }

    /// Reset every bit to zero, keeping the allocation.
    pub fn clear(&mut self) {
        self.words.fill(0);
    }

    /// Containment test: `true` iff `other` has every bit that `self` has.
    ///
    /// Despite the name this is *not* a symmetric intersection test. For
    /// every word index of `self`, `(self.word & other.word) == self.word`
    /// must hold. Query matching relies on exactly this behaviour, with the
    /// query's required set as `self` and the entity mask as `other`.
    #[must_use]
    pub fn intersects(&self, other: &BitSet) -> bool {
        self.words
            .iter()
            .enumerate()
            .all(|(index, &word)| word & other.word(index) == word)
    }

    /// Bit-for-bit equality, ignoring trailing zero words.
    #[must_use]
    pub fn equals(&self, other: &BitSet) -> bool {
        let len = self.words.len().max(other.words.len());
        (0..len).all(|index| self.word(index) == other.word(index))
    }

    /// Number of bits set in `self` but not in `other`.
    #[must_use]
    pub fn difference_size(&self, other: &BitSet) -> usize {
        self.words
            .iter()
            .enumerate()
            .map(|(index, &word)| (word & !other.word(index)).count_ones() as usize)
            .sum()
    }

    /// Number of bits set in both `self` and `other`.
    #[must_use]
    pub fn intersection_size(&self, other: &BitSet) -> usize {
        self.words
            .iter()
            .zip(other.words.iter())
            .map(|(a, b)| (a & b).count_ones() as usize)
            .sum()
    }

    /// Number of bits set in `self`, `other`, or both.
    #[must_use]
    pub fn union_size(&self, other: &BitSet) -> usize {
        let len = self.words.len().max(other.words.len());
        (0..len)
            .map(|index| (self.word(index) | other.word(index)).count_ones() as usize)
            .sum()
    }

    /// Number of bits set.
    #[must_use]
    pub fn size(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Returns `true` if no bit is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Iterate the set slots in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(index, &word)| {
            (0..WORD_BITS)
                .filter(move |bit| word & (1u32 << *bit) != 0)
                .map(move |bit| index * WORD_BITS + bit)
        })
    }

    /// The backing words, including any trailing zero words.
    #[must_use]
    pub fn words(&self) -> &[u32] {
        &self.words
    }

    #[inline]
    fn word(&self, index: usize) -> u32 {
        self.words.get(index).copied().unwrap_or(0)
    }

    fn significant_words(&self) -> &[u32] {
        let end = self
            .words
            .iter()
            .rposition(|&w| w != 0)
            .map_or(0, |last| last + 1);
        &self.words[..end]
    }
}

impl PartialEq for BitSet {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

impl Eq for BitSet {}

impl Hash for BitSet {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.significant_words().hash(state);
    }
}

impl FromIterator<usize> for BitSet {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        let mut set = BitSet::new();
        for n in iter {
            set.add(n);
        }
        set
    }
}
