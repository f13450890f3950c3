//! Single-producer/single-consumer byte FIFO (component A, spec §4.2), built
//! on the `ringbuf` crate the same way the teacher's `audio/engine.rs` feeds
//! its `cpal` output stream from a `HeapRb`-backed producer/consumer split.
//!
//! The teacher keeps its split halves as two separate owned values (one
//! moved into the decode thread, one captured by the stream callback)
//! because each side only ever runs on the thread it was handed to. Here
//! both halves live behind one shared `Arc<ByteRing>` instead, since the
//! pipeline hands the same ring to whichever producer/worker pairing is
//! active for a slot; the `Mutex` around each half exists only to give
//! `&self` access to what is still, by construction, single-producer/
//! single-consumer traffic — the lock is never contended.

use std::sync::Mutex;

use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

pub struct ByteRing {
    producer: Mutex<HeapProd<u8>>,
    consumer: Mutex<HeapCons<u8>>,
    capacity: usize,
}

impl ByteRing {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring buffer capacity must be non-zero");
        let (producer, consumer) = HeapRb::<u8>::new(capacity).split();
        Self {
            producer: Mutex::new(producer),
            consumer: Mutex::new(consumer),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn used(&self) -> usize {
        self.consumer.lock().unwrap().occupied_len()
    }

    pub fn free(&self) -> usize {
        self.producer.lock().unwrap().vacant_len()
    }

    pub fn is_empty(&self) -> bool {
        self.used() == 0
    }

    /// Writes as much of `src` as fits, producer-side only. Returns the
    /// number of bytes actually written, which may be less than `src.len()`
    /// if full.
    pub fn write(&self, src: &[u8]) -> usize {
        if src.is_empty() {
            return 0;
        }
        self.producer.lock().unwrap().push_slice(src)
    }

    /// Consumer-side only. Copies up to `dst.len()` buffered bytes into
    /// `dst` and advances the read cursor by that amount. Returns the
    /// number of bytes actually copied.
    pub fn read_into(&self, dst: &mut [u8]) -> usize {
        if dst.is_empty() {
            return 0;
        }
        self.consumer.lock().unwrap().pop_slice(dst)
    }

    /// Consumer-side only. Discards up to `n` buffered bytes without
    /// reading them. Returns the number actually discarded.
    pub fn skip(&self, n: usize) -> usize {
        if n == 0 {
            return 0;
        }
        self.consumer.lock().unwrap().skip(n)
    }

    /// Drops all buffered bytes. Only safe when the opposite side is
    /// quiescent (e.g. at slot rotation, after the worker has moved on).
    pub fn reset(&self) {
        self.consumer.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips() {
        let ring = ByteRing::new(16);
        assert_eq!(ring.write(b"hello"), 5);
        assert_eq!(ring.used(), 5);
        let mut out = [0u8; 5];
        assert_eq!(ring.read_into(&mut out), 5);
        assert_eq!(&out, b"hello");
        assert_eq!(ring.used(), 0);
    }

    #[test]
    fn write_short_when_full() {
        let ring = ByteRing::new(4);
        assert_eq!(ring.write(b"abcdef"), 4);
        assert_eq!(ring.free(), 0);
    }

    #[test]
    fn read_into_follows_wraparound() {
        let ring = ByteRing::new(8);
        ring.write(&[1, 2, 3, 4, 5, 6]);
        let mut first = [0u8; 6];
        assert_eq!(ring.read_into(&mut first), 6);
        // write cursor now sits at 6; the next write wraps through the start.
        ring.write(&[7, 8, 9, 10]);
        assert_eq!(ring.used(), 4);
        let mut second = [0u8; 4];
        assert_eq!(ring.read_into(&mut second), 4);
        assert_eq!(second, [7, 8, 9, 10]);
    }

    #[test]
    fn skip_clamps_to_used() {
        let ring = ByteRing::new(8);
        ring.write(&[1, 2, 3]);
        assert_eq!(ring.skip(100), 3);
        assert_eq!(ring.used(), 0);
    }

    #[test]
    fn reset_drops_buffered_bytes() {
        let ring = ByteRing::new(8);
        ring.write(&[1, 2, 3]);
        ring.reset();
        assert_eq!(ring.used(), 0);
        assert_eq!(ring.free(), 8);
    }

    #[test]
    fn concurrent_producer_consumer_preserves_bytes() {
        use std::sync::Arc;
        use std::thread;

        let ring = Arc::new(ByteRing::new(1024));
        let total = 200_000usize;

        let producer_ring = Arc::clone(&ring);
        let producer = thread::spawn(move || {
            let mut sent = 0usize;
            let mut next_byte: u8 = 0;
            let mut chunk = [0u8; 37];
            while sent < total {
                for b in chunk.iter_mut() {
                    *b = next_byte;
                    next_byte = next_byte.wrapping_add(1);
                }
                let to_send = chunk.len().min(total - sent);
                let mut offset = 0;
                while offset < to_send {
                    let n = producer_ring.write(&chunk[offset..to_send]);
                    offset += n;
                    if n == 0 {
                        thread::yield_now();
                    }
                }
                sent += to_send;
            }
        });

        let mut received = Vec::with_capacity(total);
        let mut chunk = [0u8; 37];
        while received.len() < total {
            let n = ring.read_into(&mut chunk);
            if n == 0 {
                thread::yield_now();
                continue;
            }
            received.extend_from_slice(&chunk[..n]);
        }
        producer.join().unwrap();

        let mut expected: u8 = 0;
        for (i, b) in received.iter().enumerate() {
            assert_eq!(*b, expected, "mismatch at byte {i}");
            expected = expected.wrapping_add(1);
        }
    }
}
