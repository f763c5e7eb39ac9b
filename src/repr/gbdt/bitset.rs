//! Bitset helpers for categorical splits.
//!
//! Category sets are stored as sequences of 32-bit words: category `c` is a
//! member when bit `c & 31` of word `c >> 5` is set. This is the layout
//! LightGBM uses for `cat_threshold` and the layout of the per-tree pool.

/// Test bit `pos` of a single word. Positions past the word are not members.
#[inline]
pub fn find_in_word(word: u32, pos: u32) -> bool {
    if pos >= 32 {
        return false;
    }
    (word >> pos) & 1 == 1
}

/// Test membership of `pos` in a multi-word bitset.
///
/// Positions past the end of the bitset are not members.
#[inline]
pub fn find_in_bitset(words: &[u32], pos: u32) -> bool {
    let word_idx = (pos >> 5) as usize;
    match words.get(word_idx) {
        Some(&word) => find_in_word(word, pos & 31),
        None => false,
    }
}

/// Position of the lowest set bit across all words, or `None` if the bitset is empty.
pub fn first_set_bit(words: &[u32]) -> Option<u32> {
    let mut base = 0u32;
    for &word in words {
        if word != 0 {
            return Some(base + word.trailing_zeros());
        }
        base += 32;
    }
    None
}

/// Total population count.
#[inline]
pub fn count_set_bits(words: &[u32]) -> u32 {
    words.iter().map(|w| w.count_ones()).sum()
}

/// Build a bitset from a list of category ids.
///
/// The result is just long enough to hold the largest id.
pub fn construct_bitset(categories: &[u32]) -> Vec<u32> {
    let Some(&max) = categories.iter().max() else {
        return Vec::new();
    };
    let mut words = vec![0u32; (max / 32) as usize + 1];
    for &cat in categories {
        words[(cat >> 5) as usize] |= 1 << (cat & 31);
    }
    words
}
