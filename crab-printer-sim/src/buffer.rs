//! Growable byte accumulator for per-connection stream data
//!
//! Bytes arrive from the socket in arbitrary chunks. The accumulator keeps
//! them contiguous so cut markers can be searched for across chunk
//! boundaries, and hands complete jobs back out from the front.

use crate::error::{PrinterError, PrinterResult};

/// Default starting capacity
pub const DEFAULT_CAPACITY: usize = 1024;

/// Append-only byte buffer with front extraction
///
/// Capacity doubles on demand and never shrinks. Only the first
/// [`size`](Self::size) bytes are meaningful.
#[derive(Debug, Clone)]
pub struct ByteAccumulator {
    buf: Vec<u8>,
    written: usize,
}

impl ByteAccumulator {
    /// Create an accumulator with the given starting capacity (at least 1)
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: vec![0; capacity.max(1)],
            written: 0,
        }
    }

    /// Append `src[offset..offset + length]`
    ///
    /// # Errors
    ///
    /// [`PrinterError::InvalidArgument`] when the range falls outside `src`.
    pub fn write(&mut self, src: &[u8], offset: usize, length: usize) -> PrinterResult<()> {
        if length == 0 {
            return Ok(());
        }
        let end = offset
            .checked_add(length)
            .filter(|&end| end <= src.len())
            .ok_or_else(|| {
                PrinterError::InvalidArgument(format!(
                    "offset {offset} + length {length} exceeds source of {} bytes",
                    src.len()
                ))
            })?;

        self.ensure_capacity(self.written + length);
        self.buf[self.written..self.written + length].copy_from_slice(&src[offset..end]);
        self.written += length;
        Ok(())
    }

    /// Append the whole of `src`
    pub fn write_all(&mut self, src: &[u8]) {
        if src.is_empty() {
            return;
        }
        self.ensure_capacity(self.written + src.len());
        self.buf[self.written..self.written + src.len()].copy_from_slice(src);
        self.written += src.len();
    }

    /// Number of valid bytes held
    pub fn size(&self) -> usize {
        self.written
    }

    pub fn is_empty(&self) -> bool {
        self.written == 0
    }

    /// Current capacity of the backing buffer
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// First index of `byte` within the valid region
    pub fn index_of(&self, byte: u8) -> Option<usize> {
        self.as_slice().iter().position(|&b| b == byte)
    }

    /// First index where `pattern` occurs within the valid region
    ///
    /// An empty pattern matches at 0. Returns `None` if the pattern is longer
    /// than the valid region or does not occur.
    pub fn index_of_pattern(&self, pattern: &[u8]) -> Option<usize> {
        if pattern.is_empty() {
            return Some(0);
        }
        if pattern.len() > self.written {
            return None;
        }
        let limit = self.written - pattern.len();
        (0..=limit).find(|&i| self.buf[i..i + pattern.len()] == *pattern)
    }

    /// Remove and return the first `count` valid bytes
    ///
    /// The remaining bytes are shifted to the front.
    ///
    /// # Errors
    ///
    /// [`PrinterError::OutOfRange`] when `count` exceeds [`size`](Self::size).
    pub fn pop_from_top(&mut self, count: usize) -> PrinterResult<Vec<u8>> {
        if count > self.written {
            return Err(PrinterError::OutOfRange {
                requested: count,
                available: self.written,
            });
        }
        if count == 0 {
            return Ok(Vec::new());
        }

        let out = self.buf[..count].to_vec();
        self.buf.copy_within(count..self.written, 0);
        self.written -= count;
        Ok(out)
    }

    /// Drop all valid bytes, keeping capacity
    pub fn clear(&mut self) {
        self.written = 0;
    }

    /// The valid region
    pub fn as_slice(&self) -> &[u8] {
        &self.buf[..self.written]
    }

    /// The whole backing buffer, including unused tail capacity
    ///
    /// Bytes past [`size`](Self::size) are stale and carry no meaning.
    pub fn snapshot(&self) -> &[u8] {
        &self.buf
    }

    fn ensure_capacity(&mut self, required: usize) {
        if required <= self.buf.len() {
            return;
        }
        let mut new_len = self.buf.len();
        while new_len < required {
            new_len *= 2;
        }
        self.buf.resize(new_len, 0);
    }
}

impl Default for ByteAccumulator {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_grows_by_doubling() {
        let mut acc = ByteAccumulator::with_capacity(4);
        acc.write(b"abcdefghij", 0, 10).unwrap();
        assert_eq!(acc.size(), 10);
        assert_eq!(acc.capacity(), 16);
        assert_eq!(acc.as_slice(), b"abcdefghij");
    }

    #[test]
    fn test_write_subrange() {
        let mut acc = ByteAccumulator::default();
        acc.write(b"xxHELLOxx", 2, 5).unwrap();
        assert_eq!(acc.as_slice(), b"HELLO");
    }

    #[test]
    fn test_write_out_of_bounds() {
        let mut acc = ByteAccumulator::default();
        let err = acc.write(b"abc", 2, 2).unwrap_err();
        assert!(matches!(err, PrinterError::InvalidArgument(_)));
        assert!(acc.is_empty());

        let err = acc.write(b"abc", usize::MAX, 2).unwrap_err();
        assert!(matches!(err, PrinterError::InvalidArgument(_)));
    }

    #[test]
    fn test_zero_length_write_is_noop() {
        let mut acc = ByteAccumulator::default();
        acc.write(b"abc", 99, 0).unwrap();
        assert_eq!(acc.size(), 0);
    }

    #[test]
    fn test_chunked_writes_pop_back_in_order() {
        let data: Vec<u8> = (0..=255u8).cycle().take(5000).collect();
        for chunk in [1, 3, 7, 64, 1000, 4999] {
            let mut acc = ByteAccumulator::with_capacity(2);
            for part in data.chunks(chunk) {
                acc.write(part, 0, part.len()).unwrap();
            }
            let all = acc.pop_from_top(acc.size()).unwrap();
            assert_eq!(all, data, "chunk size {chunk}");
            assert!(acc.is_empty());
        }
    }

    #[test]
    fn test_index_of_pattern_edges() {
        let mut acc = ByteAccumulator::default();
        assert_eq!(acc.index_of_pattern(&[]), Some(0));
        assert_eq!(acc.index_of_pattern(b"a"), None);

        acc.write_all(b"Hello");
        assert_eq!(acc.index_of_pattern(&[]), Some(0));
        assert_eq!(acc.index_of_pattern(b"He"), Some(0));
        assert_eq!(acc.index_of_pattern(b"lo"), Some(3));
        assert_eq!(acc.index_of_pattern(b"Hello!"), None);
        assert_eq!(acc.index_of_pattern(b"xyz"), None);
        assert_eq!(acc.index_of(b'l'), Some(2));
    }

    #[test]
    fn test_index_ignores_stale_tail() {
        let mut acc = ByteAccumulator::with_capacity(16);
        acc.write_all(b"abcCUT");
        acc.pop_from_top(6).unwrap();
        acc.write_all(b"ab");
        // "CUT" is still physically in the buffer past the valid region
        assert_eq!(acc.index_of_pattern(b"CUT"), None);
        assert_eq!(&acc.snapshot()[3..6], b"CUT");
    }

    #[test]
    fn test_pop_from_top_shifts_remainder() {
        let mut acc = ByteAccumulator::default();
        acc.write_all(b"0123456789");
        assert_eq!(acc.pop_from_top(0).unwrap(), Vec::<u8>::new());
        assert_eq!(acc.pop_from_top(9).unwrap(), b"012345678");
        assert_eq!(acc.as_slice(), b"9");
    }

    #[test]
    fn test_pop_beyond_size() {
        let mut acc = ByteAccumulator::default();
        acc.write_all(b"abc");
        let err = acc.pop_from_top(4).unwrap_err();
        assert!(matches!(
            err,
            PrinterError::OutOfRange {
                requested: 4,
                available: 3
            }
        ));
        assert_eq!(acc.size(), 3);
    }

    #[test]
    fn test_clear_keeps_capacity() {
        let mut acc = ByteAccumulator::with_capacity(2);
        acc.write_all(b"abcdef");
        let cap = acc.capacity();
        acc.clear();
        assert!(acc.is_empty());
        assert_eq!(acc.capacity(), cap);
    }
}
