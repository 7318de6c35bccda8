/// A dynamically sized bit array.
///
/// Bits outside the allocated range read as unset,
/// so a set can be queried with any index without growing it first.
#[derive(Clone, Debug, Default)]
pub struct BitSet {
    words: Vec<u64>,
}

impl BitSet {
    /// Create a bitset with room for at least `bit_capacity` bits, all unset.
    pub fn with_capacity(bit_capacity: usize) -> Self {
        Self {
            words: vec![0; bit_capacity / 64 + 1],
        }
    }

    /// Number of bits that can be set without growing.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.words.len() * 64
    }

    /// Make room for at least `bit_capacity` bits. Never shrinks.
    pub fn grow(&mut self, bit_capacity: usize) {
        let needed_words = bit_capacity / 64 + 1;
        if needed_words > self.words.len() {
            self.words.resize(needed_words, 0);
        }
    }

    /// Set the bit at an index.
    ///
    /// # Panics
    /// Panics if the index is outside the allocated range.
    #[inline]
    pub fn set(&mut self, idx: usize) {
        let word_idx = idx / 64;
        let bit_idx = idx % 64;
        self.words[word_idx] |= 1_u64 << bit_idx;
    }

    /// Set the bit at an index, growing the set if needed.
    #[inline]
    pub fn set_grow(&mut self, idx: usize) {
        let word_idx = idx / 64;
        if word_idx >= self.words.len() {
            // double to amortize repeated growth from increasing body ids
            let new_len = (word_idx + 1).max(2 * self.words.len());
            self.words.resize(new_len, 0);
        }
        self.set(idx);
    }

    /// Unset the bit at an index. Indices outside the allocated range are ignored.
    #[inline]
    pub fn clear_bit(&mut self, idx: usize) {
        let word_idx = idx / 64;
        if let Some(word) = self.words.get_mut(word_idx) {
            *word &= !(1_u64 << (idx % 64));
        }
    }

    #[inline]
    pub fn get(&self, idx: usize) -> bool {
        let word_idx = idx / 64;
        match self.words.get(word_idx) {
            Some(word) => word & (1_u64 << (idx % 64)) != 0,
            None => false,
        }
    }

    /// Unset every bit, keeping the allocation.
    #[inline]
    pub fn clear(&mut self) {
        self.words.iter_mut().for_each(|w| *w = 0);
    }

    pub fn count_ones(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    /// Iterate over the indices of set bits in ascending order.
    pub fn iter(&self) -> BitSetIter<'_> {
        BitSetIter {
            words: &self.words,
            word_idx: 0,
            curr_word: self.words.first().copied().unwrap_or(0),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BitSetIter<'a> {
    words: &'a [u64],
    word_idx: usize,
    // copy each word into the iterator so we can remove bits from it
    // instead of reading from the original bitset every time
    curr_word: u64,
}

impl<'a> Iterator for BitSetIter<'a> {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.curr_word != 0 {
                let first_bit_idx = self.curr_word.trailing_zeros();
                self.curr_word ^= 1 << first_bit_idx;
                return Some(self.word_idx * 64 + first_bit_idx as usize);
            }
            self.word_idx += 1;
            if self.word_idx >= self.words.len() {
                return None;
            }
            self.curr_word = self.words[self.word_idx];
        }
    }
}

//
// tests
//
