//! Fixed-capacity byte ring used by the serial channel
//!
//! Storage is allocated once at construction; no operation allocates or
//! blocks, and every operation is bounded by the number of bytes it moves.

/// A fixed-capacity circular byte store
#[derive(Debug, Clone)]
pub struct ByteRing {
    /// Ring storage, always `capacity` long
    data: Box<[u8]>,
    /// Index of the oldest unread byte
    head: usize,
    /// Number of unread bytes
    len: usize,
}

impl ByteRing {
    /// Create a ring holding at most `capacity` bytes
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            head: 0,
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.capacity()
    }

    /// Free space left before the ring is full
    pub fn remaining(&self) -> usize {
        self.capacity() - self.len
    }

    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
    }

    /// Append as much of `bytes` as fits; the excess is rejected
    ///
    /// Returns the number of bytes accepted.
    pub fn push_truncating(&mut self, bytes: &[u8]) -> usize {
        let accepted = bytes.len().min(self.remaining());
        self.copy_in(&bytes[..accepted]);
        accepted
    }

    /// Append all of `bytes`, dropping the oldest unread bytes to make room
    ///
    /// Returns how many bytes were lost. When `bytes` alone exceeds the capacity
    /// only its newest `capacity` bytes are kept and the rest count as lost too.
    pub fn push_overwriting(&mut self, bytes: &[u8]) -> usize {
        let capacity = self.capacity();
        if capacity == 0 {
            return bytes.len();
        }

        if bytes.len() >= capacity {
            let dropped = self.len + (bytes.len() - capacity);
            self.clear();
            self.copy_in(&bytes[bytes.len() - capacity..]);
            return dropped;
        }

        let dropped = bytes.len().saturating_sub(self.remaining());
        self.discard(dropped);
        self.copy_in(bytes);
        dropped
    }

    /// Move up to `out.len()` of the oldest bytes into `out`
    pub fn pop_into(&mut self, out: &mut [u8]) -> usize {
        let n = self.peek_into(out);
        self.discard(n);
        n
    }

    /// Copy up to `out.len()` of the oldest bytes into `out` without consuming them
    pub fn peek_into(&self, out: &mut [u8]) -> usize {
        let n = out.len().min(self.len);
        let capacity = self.capacity();
        let first = n.min(capacity - self.head);
        out[..first].copy_from_slice(&self.data[self.head..self.head + first]);
        out[first..n].copy_from_slice(&self.data[..n - first]);
        n
    }

    /// Remove every unread byte, oldest first
    pub fn drain_all(&mut self) -> Vec<u8> {
        let mut out = vec![0u8; self.len];
        self.pop_into(&mut out);
        out
    }

    /// Drop the `n` oldest bytes (clamped to what is buffered)
    pub fn discard(&mut self, n: usize) {
        let n = n.min(self.len);
        if n == 0 {
            return;
        }
        self.head = (self.head + n) % self.capacity();
        self.len -= n;
        if self.len == 0 {
            self.head = 0;
        }
    }

    /// Copy bytes that are known to fit after the newest byte
    fn copy_in(&mut self, bytes: &[u8]) {
        let capacity = self.capacity();
        debug_assert!(bytes.len() <= self.remaining());
        if bytes.is_empty() {
            return;
        }

        let tail = (self.head + self.len) % capacity;
        let first = bytes.len().min(capacity - tail);
        self.data[tail..tail + first].copy_from_slice(&bytes[..first]);
        self.data[..bytes.len() - first].copy_from_slice(&bytes[first..]);
        self.len += bytes.len();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncating_push_accepts_up_to_capacity() {
        let mut ring = ByteRing::new(8);
        assert_eq!(ring.push_truncating(&[1, 2, 3, 4, 5]), 5);
        assert_eq!(ring.push_truncating(&[6, 7, 8, 9, 10]), 3);
        assert!(ring.is_full());
        assert_eq!(ring.drain_all(), vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn overwriting_push_drops_oldest() {
        let mut ring = ByteRing::new(4);
        assert_eq!(ring.push_overwriting(&[1, 2, 3]), 0);
        assert_eq!(ring.push_overwriting(&[4, 5]), 1);
        assert_eq!(ring.drain_all(), vec![2, 3, 4, 5]);
    }

    #[test]
    fn overwriting_push_larger_than_capacity_keeps_newest() {
        let mut ring = ByteRing::new(4);
        ring.push_overwriting(&[9, 9]);
        assert_eq!(ring.push_overwriting(&[1, 2, 3, 4, 5, 6]), 4);
        assert_eq!(ring.drain_all(), vec![3, 4, 5, 6]);
    }

    #[test]
    fn wraps_around_storage_end() {
        let mut ring = ByteRing::new(5);
        ring.push_truncating(&[1, 2, 3, 4]);
        let mut out = [0u8; 3];
        assert_eq!(ring.pop_into(&mut out), 3);
        assert_eq!(out, [1, 2, 3]);

        // head = 3, tail wraps
        assert_eq!(ring.push_truncating(&[5, 6, 7, 8]), 4);
        assert_eq!(ring.len(), 5);
        assert_eq!(ring.drain_all(), vec![4, 5, 6, 7, 8]);
        assert!(ring.is_empty());
    }

    #[test]
    fn peek_does_not_consume() {
        let mut ring = ByteRing::new(4);
        ring.push_truncating(b"ab");
        let mut out = [0u8; 4];
        assert_eq!(ring.peek_into(&mut out), 2);
        assert_eq!(&out[..2], b"ab");
        assert_eq!(ring.len(), 2);
    }

    #[test]
    fn zero_capacity_ring_accepts_nothing() {
        let mut ring = ByteRing::new(0);
        assert_eq!(ring.push_truncating(&[1]), 0);
        assert_eq!(ring.push_overwriting(&[1]), 1);
        assert!(ring.is_empty());
    }
}
