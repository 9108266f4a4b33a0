//! Growable byte buffer.
//!
//! `GrowableBuffer` is an append-only byte container used by the stream
//! receiver to accumulate network bytes and to hold one assembled frame.
//!
//! The buffer:
//! - Grows in place by exactly the shortfall when an append does not fit
//! - Tracks a write offset (`count`); only `[0, count)` is meaningful
//! - Resets by rewinding the write offset, never by clearing or shrinking storage
//!
//! Bytes in `[count, capacity)` are stale and are overwritten by later appends.

use std::io::{self, Read};

/// Append-only byte container with explicit capacity growth.
#[derive(Debug, Clone)]
pub struct GrowableBuffer {
    /// Backing storage. `storage.len()` is the buffer capacity.
    storage: Vec<u8>,
    /// Write offset: number of valid bytes from index 0.
    count: usize,
}

impl GrowableBuffer {
    /// Create a buffer with `initial_capacity` bytes of storage.
    pub fn with_capacity(initial_capacity: usize) -> Self {
        Self {
            storage: vec![0u8; initial_capacity],
            count: 0,
        }
    }

    /// Number of valid bytes.
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Total number of bytes the buffer can hold without growing.
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Bytes left before the next append has to grow the storage.
    pub fn remaining(&self) -> usize {
        self.storage.len() - self.count
    }

    /// The valid region `[0, count)`.
    pub fn as_slice(&self) -> &[u8] {
        &self.storage[..self.count]
    }

    /// Read up to `max_bytes` from `reader` into the buffer at the write offset.
    ///
    /// Storage is grown first if fewer than `max_bytes` are free. The write
    /// offset advances by the number of bytes actually read, which may be less
    /// than requested (short read) or zero (end of stream / starved stream).
    pub fn append_from_stream<R: Read + ?Sized>(
        &mut self,
        reader: &mut R,
        max_bytes: usize,
    ) -> io::Result<usize> {
        self.ensure_remaining(max_bytes);
        let end = self.count + max_bytes;
        let read = reader.read(&mut self.storage[self.count..end])?;
        self.count += read;
        Ok(read)
    }

    /// Copy `length` bytes of `source` starting at `source_offset` into the buffer.
    ///
    /// # Panics
    ///
    /// Panics if `source_offset + length` runs past the end of `source`.
    pub fn append_bytes(&mut self, source: &[u8], source_offset: usize, length: usize) {
        assert!(
            source_offset
                .checked_add(length)
                .is_some_and(|end| end <= source.len()),
            "append_bytes: range {}..+{} exceeds source of {} bytes",
            source_offset,
            length,
            source.len()
        );
        self.ensure_remaining(length);
        self.storage[self.count..self.count + length]
            .copy_from_slice(&source[source_offset..source_offset + length]);
        self.count += length;
    }

    /// Find the left-most occurrence of `pattern` at or after index `from`.
    ///
    /// Only windows lying entirely inside the valid region are considered.
    /// Returns `None` when the pattern does not occur.
    ///
    /// # Panics
    ///
    /// Panics if `pattern` is empty.
    pub fn find_pattern(&self, from: usize, pattern: &[u8]) -> Option<usize> {
        assert!(!pattern.is_empty(), "find_pattern: pattern must not be empty");
        if from >= self.count {
            return None;
        }
        self.storage[from..self.count]
            .windows(pattern.len())
            .position(|window| window == pattern)
            .map(|offset| from + offset)
    }

    /// Rewind the write offset to zero. Storage is left untouched.
    pub fn reset(&mut self) {
        self.count = 0;
    }

    fn ensure_remaining(&mut self, needed: usize) {
        let shortfall = needed.saturating_sub(self.remaining());
        if shortfall > 0 {
            let new_capacity = self.storage.len() + shortfall;
            self.storage.reserve_exact(shortfall);
            self.storage.resize(new_capacity, 0);
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Reader that hands out at most `step` bytes per call.
    struct Trickle {
        data: Vec<u8>,
        pos: usize,
        step: usize,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.step.min(buf.len()).min(self.data.len() - self.pos);
            buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    #[test]
    fn find_pattern_returns_leftmost_index() {
        let mut buf = GrowableBuffer::with_capacity(8);
        buf.append_bytes(&[0xAA, 0xBB, 0xFF, 0xD8, 0xD9], 0, 5);
        assert_eq!(buf.find_pattern(0, &[0xFF, 0xD8]), Some(2));
        assert_eq!(buf.find_pattern(3, &[0xFF, 0xD8]), None);
        assert_eq!(buf.find_pattern(0, &[0xFF, 0xD9]), None);
    }

    #[test]
    fn find_pattern_ignores_stale_bytes() {
        let mut buf = GrowableBuffer::with_capacity(8);
        buf.append_bytes(&[1, 2, 0xFF, 0xD9], 0, 4);
        buf.reset();
        buf.append_bytes(&[1, 2, 0xFF], 0, 3);
        // 0xD9 from the previous fill is still in storage but not valid.
        assert_eq!(buf.find_pattern(0, &[0xFF, 0xD9]), None);
    }

    #[test]
    fn find_pattern_past_end_is_none() {
        let mut buf = GrowableBuffer::with_capacity(4);
        buf.append_bytes(&[0xFF, 0xD8], 0, 2);
        assert_eq!(buf.find_pattern(10, &[0xFF]), None);
    }

    #[test]
    #[should_panic(expected = "pattern must not be empty")]
    fn find_pattern_rejects_empty_pattern() {
        let buf = GrowableBuffer::with_capacity(4);
        buf.find_pattern(0, &[]);
    }

    #[test]
    fn append_grows_by_exact_shortfall() {
        let mut buf = GrowableBuffer::with_capacity(4);
        buf.append_bytes(b"abc", 0, 3);
        assert_eq!(buf.capacity(), 4);

        buf.append_bytes(b"defghi", 0, 6);
        // 1 byte free, 6 needed: grows by 5.
        assert_eq!(buf.capacity(), 9);
        assert_eq!(buf.count(), 9);
        assert_eq!(buf.as_slice(), b"abcdefghi");
    }

    #[test]
    fn append_bytes_honours_source_offset() {
        let mut buf = GrowableBuffer::with_capacity(2);
        buf.append_bytes(b"xxpayloadyy", 2, 7);
        assert_eq!(buf.as_slice(), b"payload");
    }

    #[test]
    fn append_from_stream_tracks_partial_reads() {
        let mut buf = GrowableBuffer::with_capacity(4);
        let mut reader = Trickle {
            data: (0u8..10).collect(),
            pos: 0,
            step: 3,
        };
        let mut total = 0;
        loop {
            let n = buf.append_from_stream(&mut reader, 5).unwrap();
            if n == 0 {
                break;
            }
            total += n;
            assert_eq!(buf.count(), total);
            assert!(buf.capacity() >= buf.count());
        }
        assert_eq!(total, 10);
        assert_eq!(buf.as_slice(), &(0u8..10).collect::<Vec<_>>()[..]);
    }

    #[test]
    fn append_from_stream_at_eof_reads_nothing() {
        let mut buf = GrowableBuffer::with_capacity(4);
        let mut reader = Cursor::new(Vec::<u8>::new());
        assert_eq!(buf.append_from_stream(&mut reader, 16).unwrap(), 0);
        assert_eq!(buf.count(), 0);
        // Growth happens before the read, even if nothing arrives.
        assert_eq!(buf.capacity(), 16);
    }

    #[test]
    fn reset_is_idempotent_and_keeps_capacity() {
        let mut buf = GrowableBuffer::with_capacity(2);
        buf.append_bytes(b"hello", 0, 5);
        let capacity = buf.capacity();
        buf.reset();
        assert_eq!(buf.count(), 0);
        buf.reset();
        assert_eq!(buf.count(), 0);
        assert!(buf.is_empty());
        assert_eq!(buf.capacity(), capacity);
    }
}
