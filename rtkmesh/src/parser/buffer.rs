#[cfg(feature = "alloc")]
use alloc::vec::Vec;

use core::cmp::min;

/// Sink for correction frames extracted by the decoder. We provide
/// implementations for `Vec<u8>`, `[u8; N]`([FixedBuffer]), and for `&mut [u8]` ([FixedLinearBuffer]),
/// so the decoder runs with or without an allocator.
pub trait UnderlyingBuffer {
    /// Removes all elements from the buffer.
    fn clear(&mut self);

    /// Returns the number of elements currently stored in the buffer.
    fn len(&self) -> usize;

    /// Returns the maximum capacity of this buffer.
    ///
    /// The Vec implementation returns `usize::MAX`; Vec panics on its own if an
    /// allocation cannot be honoured.
    fn max_capacity(&self) -> usize;

    /// Appends `other`, returning the number of bytes that did not fit.
    fn extend_from_slice(&mut self, other: &[u8]) -> usize;

    /// Stored bytes, oldest first.
    fn as_bytes(&self) -> &[u8];

    /// Returns whether the buffer is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes that can still be appended without loss.
    fn spare_capacity(&self) -> usize {
        self.max_capacity() - self.len()
    }
}

#[cfg(feature = "alloc")]
impl UnderlyingBuffer for Vec<u8> {
    fn clear(&mut self) {
        self.clear();
    }

    fn len(&self) -> usize {
        self.len()
    }

    fn max_capacity(&self) -> usize {
        usize::MAX
    }

    fn extend_from_slice(&mut self, other: &[u8]) -> usize {
        self.extend_from_slice(other);
        0
    }

    fn as_bytes(&self) -> &[u8] {
        self.as_slice()
    }
}

/// Holds a mutable reference to a fixed byte array
pub struct FixedLinearBuffer<'a> {
    buffer: &'a mut [u8],
    len: usize,
}

impl<'a> FixedLinearBuffer<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self {
            buffer: buf,
            len: 0,
        }
    }
}

impl UnderlyingBuffer for FixedLinearBuffer<'_> {
    fn clear(&mut self) {
        self.len = 0;
    }

    fn len(&self) -> usize {
        self.len
    }

    fn max_capacity(&self) -> usize {
        self.buffer.len()
    }

    fn extend_from_slice(&mut self, other: &[u8]) -> usize {
        let available_space = self.buffer.len() - self.len;
        let to_copy = min(other.len(), available_space);

        self.buffer[self.len..self.len + to_copy].copy_from_slice(&other[..to_copy]);
        self.len += to_copy;

        other.len() - to_copy // Remainder that didn't fit in the buffer
    }

    fn as_bytes(&self) -> &[u8] {
        &self.buffer[..self.len]
    }
}

/// An owned, fixed-size linear buffer with a capacity known at compile time.
///
/// This struct owns its data in a `[u8; N]` array, a drop-in replacement for
/// `FixedLinearBuffer` where owned data is preferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FixedBuffer<const N: usize> {
    buffer: [u8; N],
    len: usize,
}

impl<const N: usize> FixedBuffer<N> {
    /// Creates a new, empty `FixedBuffer`.
    pub const fn new() -> Self {
        Self {
            buffer: [0; N],
            len: 0,
        }
    }
}

impl<const N: usize> Default for FixedBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> UnderlyingBuffer for FixedBuffer<N> {
    fn clear(&mut self) {
        self.len = 0;
    }

    fn len(&self) -> usize {
        self.len
    }

    fn max_capacity(&self) -> usize {
        N
    }

    fn extend_from_slice(&mut self, other: &[u8]) -> usize {
        let available_space = N - self.len;
        let to_copy = min(other.len(), available_space);

        self.buffer[self.len..self.len + to_copy].copy_from_slice(&other[..to_copy]);
        self.len += to_copy;

        other.len() - to_copy
    }

    fn as_bytes(&self) -> &[u8] {
        &self.buffer[..self.len]
    }
}

/// One UART read, consumed front to back by the decoder.
///
/// Consumed prefixes are skipped by moving a start cursor over the backing
/// slice; nothing is shifted in memory.
#[derive(Debug, Clone, Copy)]
pub struct RawFrame<'a> {
    data: &'a [u8],
    start: usize,
}

impl<'a> RawFrame<'a> {
    pub const fn new(data: &'a [u8]) -> Self {
        Self { data, start: 0 }
    }

    /// Unconsumed bytes.
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.start..]
    }

    /// Number of unconsumed bytes.
    pub fn len(&self) -> usize {
        self.data.len() - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes consumed so far, counted from the start of the read.
    pub fn position(&self) -> usize {
        self.start
    }

    pub fn peek(&self, index: usize) -> Option<u8> {
        self.remaining().get(index).copied()
    }

    /// Skips `count` bytes; saturates at the end of the frame.
    pub fn advance(&mut self, count: usize) {
        self.start = min(self.start + count, self.data.len());
    }

    /// Drops everything still pending and returns how many bytes were lost.
    pub fn discard(&mut self) -> usize {
        let lost = self.len();
        self.start = self.data.len();
        lost
    }

    /// Skips to the next byte for which `is_sync` holds, searching past the
    /// current head. Returns the number of bytes skipped.
    pub(crate) fn skip_to_next(&mut self, is_sync: impl Fn(u8) -> bool) -> usize {
        let rest = self.remaining();
        match rest.iter().skip(1).position(|b| is_sync(*b)) {
            Some(pos) => {
                self.advance(pos + 1);
                pos + 1
            },
            None => self.discard(),
        }
    }
}
