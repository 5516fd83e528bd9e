//! Fixed-width bit-set indexing the 256 slots of a trie node.

use std::fmt;

use crate::error::{Error, Result};

/// Number of slots per node (one full digest byte per level).
pub const WIDTH: usize = 256;

const WORDS: usize = WIDTH / 64;

/// 256-bit occupancy map of a node.
///
/// Bit `i` is set when slot `i` (digest byte value `i`) holds a pointer.
/// [`rank`](Self::rank) maps a slot to its position in the compacted
/// pointer array.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Bitfield([u64; WORDS]);

impl Bitfield {
    /// Creates an empty bit-set.
    #[must_use]
    pub const fn new() -> Self {
        Self([0; WORDS])
    }

    /// Returns `true` if bit `pos` is set.
    #[inline]
    #[must_use]
    pub const fn test(&self, pos: u8) -> bool {
        let (word, bit) = split(pos);
        self.0[word] & (1 << bit) != 0
    }

    /// Sets bit `pos`.
    #[inline]
    pub const fn set(&mut self, pos: u8) {
        let (word, bit) = split(pos);
        self.0[word] |= 1 << bit;
    }

    /// Clears bit `pos`.
    #[inline]
    pub const fn clear(&mut self, pos: u8) {
        let (word, bit) = split(pos);
        self.0[word] &= !(1 << bit);
    }

    /// Number of set bits strictly below `pos`.
    #[inline]
    #[must_use]
    pub const fn rank(&self, pos: u8) -> usize {
        let (word, bit) = split(pos);
        let mut count = 0;
        let mut i = 0;
        while i < word {
            count += self.0[i].count_ones() as usize;
            i += 1;
        }
        count + (self.0[word] & ((1 << bit) - 1)).count_ones() as usize
    }

    /// Total number of set bits.
    #[must_use]
    pub const fn count_ones(&self) -> usize {
        let mut count = 0;
        let mut i = 0;
        while i < WORDS {
            count += self.0[i].count_ones() as usize;
            i += 1;
        }
        count
    }

    /// Returns `true` if no bit is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count_ones() == 0
    }

    /// Iterates set bit positions in ascending order.
    pub fn iter_ones(&self) -> impl Iterator<Item = u8> + '_ {
        (0..=u8::MAX).filter(|&pos| self.test(pos))
    }

    /// Minimal big-endian byte form: no leading zero bytes, empty when no
    /// bit is set.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(WIDTH / 8);
        for word in self.0.iter().rev() {
            out.extend_from_slice(&word.to_be_bytes());
        }
        let first = out.iter().position(|&b| b != 0).unwrap_or(out.len());
        out.split_off(first)
    }

    /// Parses the big-endian byte form produced by [`to_bytes`](Self::to_bytes).
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedTree`] if `bytes` is wider than 256 bits or
    /// carries leading zero bytes (non-canonical).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() > WIDTH / 8 {
            return Err(Error::MalformedTree("bitfield wider than 256 bits"));
        }
        if bytes.first() == Some(&0) {
            return Err(Error::MalformedTree("bitfield has leading zero bytes"));
        }
        let mut padded = [0_u8; WIDTH / 8];
        padded[WIDTH / 8 - bytes.len()..].copy_from_slice(bytes);

        let mut words = [0_u64; WORDS];
        for (i, chunk) in padded.chunks_exact(8).enumerate() {
            let mut buf = [0_u8; 8];
            buf.copy_from_slice(chunk);
            words[WORDS - 1 - i] = u64::from_be_bytes(buf);
        }
        Ok(Self(words))
    }
}

#[inline]
const fn split(pos: u8) -> (usize, u32) {
    ((pos as usize) / 64, (pos as u32) % 64)
}

impl fmt::Debug for Bitfield {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter_ones()).finish()
    }
}
