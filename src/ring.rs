//! A lock-free single-producer/single-consumer byte ring buffer.
//!
//! This is the handoff between the pipeline thread (producer) and an audio-driver-owned
//! callback thread (consumer) used by callback-driven backends such as JACK. Its shape follows
//! `jack_ringbuffer_t`: a capacity fixed at construction, a write that never blocks (it
//! short-writes instead), and a read-vector API that exposes the (at most two) contiguous
//! segments currently available to read so a caller can reassemble a sample that straddles the
//! wrap point before converting it.

use std::sync::atomic::{AtomicUsize, Ordering};

/// One of the (at most two) contiguous readable segments returned by [`ByteRing::read_vector`].
#[derive(Copy, Clone, Debug)]
pub struct ReadSegment<'a> {
    pub buf: &'a [u8],
}

pub struct ByteRing {
    buf: Box<[u8]>,
    capacity: usize,
    /// Total bytes ever written, never wrapped. Only the producer mutates this; the consumer
    /// reads it with Acquire. Using a monotonic counter rather than a `% capacity` index avoids
    /// the classic ambiguity of distinguishing "empty" from "full" when the two indices coincide.
    written: AtomicUsize,
    /// Total bytes ever consumed, never wrapped. Only the consumer mutates this; the producer
    /// reads it with Acquire.
    read: AtomicUsize,
}

impl ByteRing {
    /// Allocates a ring of `capacity` bytes, all initially empty.
    pub fn new(capacity: usize) -> Self {
        ByteRing {
            buf: vec![0u8; capacity].into_boxed_slice(),
            capacity,
            written: AtomicUsize::new(0),
            read: AtomicUsize::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn written_relaxed(&self) -> usize {
        self.written.load(Ordering::Relaxed)
    }

    fn read_relaxed(&self) -> usize {
        self.read.load(Ordering::Relaxed)
    }

    /// Bytes currently available to read. Safe to call from either side; the producer uses it to
    /// compute free space, the consumer to compute available bytes.
    pub fn available(&self) -> usize {
        let w = self.written.load(Ordering::Acquire);
        let r = self.read.load(Ordering::Acquire);
        w.wrapping_sub(r)
    }

    pub fn free_space(&self) -> usize {
        self.capacity - self.available()
    }

    /// Writes `data` into the ring. If there is not enough free space for the whole slice, writes
    /// nothing and returns 0 (a "short write", logged by the caller) rather than partially
    /// filling the ring.
    pub fn write(&self, data: &[u8]) -> usize {
        if data.len() > self.free_space() {
            return 0;
        }

        let start = self.written_relaxed() % self.capacity;
        let first_len = (self.capacity - start).min(data.len());
        self.buf_write(start, &data[..first_len]);
        if first_len < data.len() {
            self.buf_write(0, &data[first_len..]);
        }

        // Release: make the bytes visible before publishing the new write counter.
        let new_written = self.written_relaxed().wrapping_add(data.len());
        self.written.store(new_written, Ordering::Release);
        data.len()
    }

    fn buf_write(&self, start: usize, chunk: &[u8]) {
        // SAFETY: single producer, and the region [start, start+chunk.len()) is disjoint from
        // whatever the consumer is concurrently reading because `free_space` guaranteed it was
        // not yet occupied.
        let ptr = self.buf.as_ptr() as *mut u8;
        unsafe {
            std::ptr::copy_nonoverlapping(chunk.as_ptr(), ptr.add(start), chunk.len());
        }
    }

    /// Returns the (at most two) contiguous segments currently readable, without consuming them.
    /// Call [`ByteRing::advance_read`] after processing to release the bytes.
    pub fn read_vector(&self) -> [ReadSegment<'_>; 2] {
        let available = self.available();
        let start = self.read_relaxed() % self.capacity;
        let first_len = (self.capacity - start).min(available);
        let second_len = available - first_len;

        [
            ReadSegment { buf: &self.buf[start..start + first_len] },
            ReadSegment { buf: &self.buf[0..second_len] },
        ]
    }

    /// Releases `len` bytes previously observed via `read_vector`, as consumed.
    pub fn advance_read(&self, len: usize) {
        debug_assert!(len <= self.available());
        let new_read = self.read_relaxed().wrapping_add(len);
        // Release: subsequent producer free-space checks observe the space we just freed.
        self.read.store(new_read, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn write_then_read_round_trips() {
        let ring = ByteRing::new(16);
        assert_eq!(ring.write(&[1, 2, 3, 4]), 4);
        assert_eq!(ring.available(), 4);

        let segs = ring.read_vector();
        let mut collected = Vec::new();
        collected.extend_from_slice(segs[0].buf);
        collected.extend_from_slice(segs[1].buf);
        assert_eq!(collected, vec![1, 2, 3, 4]);
        ring.advance_read(4);
        assert_eq!(ring.available(), 0);
    }

    #[test]
    fn short_write_is_rejected_wholesale() {
        let ring = ByteRing::new(4);
        assert_eq!(ring.write(&[1, 2, 3, 4, 5]), 0);
        assert_eq!(ring.available(), 0);
    }

    #[test]
    fn wraparound_segments_are_exposed_separately() {
        let ring = ByteRing::new(8);
        assert_eq!(ring.write(&[1, 2, 3, 4, 5, 6]), 6);
        ring.advance_read(6);
        assert_eq!(ring.write(&[7, 8, 9, 10]), 4);

        let segs = ring.read_vector();
        // write index wrapped: bytes land as [9,10, _,_,_,_,7,8]
        assert_eq!(segs[0].buf, &[7, 8]);
        assert_eq!(segs[1].buf, &[9, 10]);
    }

    #[test]
    fn byte_accounting_invariant_holds_across_operations() {
        let ring = ByteRing::new(32);
        let mut written = 0usize;
        let mut read = 0usize;

        for chunk in [5usize, 7, 3, 11, 2] {
            let data = vec![0u8; chunk];
            let n = ring.write(&data);
            written += n;
            assert_eq!(written - read, ring.available());

            if chunk % 2 == 0 {
                let avail = ring.available();
                ring.advance_read(avail);
                read += avail;
                assert_eq!(written - read, ring.available());
            }
        }
    }

    proptest! {
        /// For any sequence of write chunk sizes (each possibly rejected as an over-large short
        /// write) interleaved with full drains, `available() == total written - total read` holds
        /// after every operation.
        #[test]
        fn byte_accounting_holds_over_arbitrary_write_sequences(
            capacity in 8usize..256,
            ops in prop::collection::vec((0usize..300, any::<bool>()), 0..64),
        ) {
            let ring = ByteRing::new(capacity);
            let mut written = 0usize;
            let mut read = 0usize;

            for (chunk_len, drain) in ops {
                let data = vec![0u8; chunk_len];
                let n = ring.write(&data);
                prop_assert!(n == 0 || n == chunk_len);
                written += n;
                prop_assert_eq!(written - read, ring.available());

                if drain {
                    let avail = ring.available();
                    ring.advance_read(avail);
                    read += avail;
                    prop_assert_eq!(written - read, ring.available());
                }
            }
        }
    }
}
