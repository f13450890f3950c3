//! Ring-of-rings pipeline (component D, spec §3/§4.4). A fixed array of 8
//! format-tagged slots, each wrapping its own [`ByteRing`]. The producer
//! mutates only the slot at `write`, the worker mutates only the slot at
//! `read`; `filled` is the atomic publication fence between them.
//!
//! `filled` here counts the slot at `read` itself plus every slot queued
//! ahead of it that has been activated by `add_slot`/`flush` and not yet
//! retired — i.e. `filled >= 1` whenever there is a live current read slot,
//! and an underrun with `filled <= 1` means nothing more is queued. See
//! DESIGN.md for why this convention was chosen over a literal `(write -
//! read) mod 8` derivation, which the source pseudocode doesn't pin down
//! precisely enough to implement without this kind of explicit choice.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::clock::{Pts, NO_PTS};
use crate::error::AudioError;
use crate::ringbuf::ByteRing;

pub const RING_SLOTS: usize = 8;

/// ~1.68 MiB, the product given in spec.md §3 for the per-slot byte capacity.
pub const SLOT_CAPACITY: usize = 3 * 5 * 7 * 8 * 2 * 1000;

/// One entry of the pipeline ring (spec.md §3 "Slot"). Fields the worker may
/// read while the producer still owns the slot (or vice versa, briefly around
/// a rotation) are atomics so that handoff needs no lock of its own.
pub struct Slot {
    pub buffer: Arc<ByteRing>,
    pub flush_buffers: AtomicBool,
    pub use_ac3: AtomicBool,
    pub packet_size: AtomicUsize,
    pub in_rate: AtomicU32,
    pub in_channels: AtomicU8,
    pub hw_rate: AtomicU32,
    pub hw_channels: AtomicU8,
    pub pts: AtomicI64,
}

impl Slot {
    fn new() -> Self {
        Self {
            buffer: Arc::new(ByteRing::new(SLOT_CAPACITY)),
            flush_buffers: AtomicBool::new(false),
            use_ac3: AtomicBool::new(false),
            packet_size: AtomicUsize::new(0),
            in_rate: AtomicU32::new(0),
            in_channels: AtomicU8::new(0),
            hw_rate: AtomicU32::new(0),
            hw_channels: AtomicU8::new(0),
            pts: AtomicI64::new(NO_PTS),
        }
    }

    pub fn hw_rate(&self) -> u32 {
        self.hw_rate.load(Ordering::Acquire)
    }

    pub fn hw_channels(&self) -> u8 {
        self.hw_channels.load(Ordering::Acquire)
    }

    pub fn use_ac3(&self) -> bool {
        self.use_ac3.load(Ordering::Acquire)
    }

    pub fn pts(&self) -> Pts {
        self.pts.load(Ordering::Acquire)
    }

    pub fn set_pts(&self, pts: Pts) {
        self.pts.store(pts, Ordering::Release);
    }

    /// (use_ac3, hw_rate, hw_channels) — the tuple Advance compares across a
    /// slot rotation to decide whether the backend needs re-`setup`.
    fn format_tuple(&self) -> (bool, u32, u8) {
        (self.use_ac3(), self.hw_rate(), self.hw_channels())
    }

    fn init(&self, in_rate: u32, in_channels: u8, hw_rate: u32, hw_channels: u8, use_ac3: bool) {
        self.buffer.reset();
        self.flush_buffers.store(true, Ordering::Release);
        self.use_ac3.store(use_ac3, Ordering::Relaxed);
        self.packet_size.store(0, Ordering::Relaxed);
        self.in_rate.store(in_rate, Ordering::Relaxed);
        self.in_channels.store(in_channels, Ordering::Relaxed);
        self.hw_rate.store(hw_rate, Ordering::Release);
        self.hw_channels.store(hw_channels, Ordering::Release);
        self.pts.store(NO_PTS, Ordering::Release);
    }
}

pub struct Pipeline {
    slots: Vec<Slot>,
    write: AtomicUsize,
    read: AtomicUsize,
    filled: AtomicUsize,
}

impl Pipeline {
    pub fn new() -> Self {
        Self {
            slots: (0..RING_SLOTS).map(|_| Slot::new()).collect(),
            write: AtomicUsize::new(0),
            read: AtomicUsize::new(0),
            filled: AtomicUsize::new(0),
        }
    }

    pub fn filled(&self) -> usize {
        self.filled.load(Ordering::Acquire)
    }

    pub fn write_slot(&self) -> &Slot {
        &self.slots[self.write.load(Ordering::Acquire) % RING_SLOTS]
    }

    pub fn read_slot(&self) -> &Slot {
        &self.slots[self.read.load(Ordering::Acquire) % RING_SLOTS]
    }

    /// §4.4 "Add slot", steps 3-6: the matrix lookup (steps 1-2) is the
    /// caller's job (`capability::CapabilityMatrix::resolve`), since that
    /// lookup has nothing to do with ring bookkeeping.
    pub fn add_slot(
        &self,
        in_rate: u32,
        in_channels: u8,
        hw_rate: u32,
        hw_channels: u8,
        use_ac3: bool,
    ) -> Result<(), AudioError> {
        self.activate(in_rate, in_channels, hw_rate, hw_channels, use_ac3, false)
    }

    /// §4.4 "Flush": identical to Add but reuses the outgoing write slot's
    /// format and additionally drops whatever was buffered in it.
    pub fn flush(&self) -> Result<(), AudioError> {
        let current = self.write_slot();
        let (use_ac3, hw_rate, hw_channels) = current.format_tuple();
        let in_rate = current.in_rate.load(Ordering::Relaxed);
        let in_channels = current.in_channels.load(Ordering::Relaxed);
        current.buffer.reset();
        self.activate(in_rate, in_channels, hw_rate, hw_channels, use_ac3, true)
    }

    fn activate(
        &self,
        in_rate: u32,
        in_channels: u8,
        hw_rate: u32,
        hw_channels: u8,
        use_ac3: bool,
        is_flush: bool,
    ) -> Result<(), AudioError> {
        let filled = self.filled.load(Ordering::Acquire);
        if filled >= RING_SLOTS {
            return Err(AudioError::RingFull);
        }

        let idx = if filled == 0 {
            // Nothing queued yet: reinitialize the current slot in place
            // rather than stranding it and rotating onto an unrelated index.
            self.write.load(Ordering::Relaxed) % RING_SLOTS
        } else {
            let next = (self.write.load(Ordering::Relaxed) + 1) % RING_SLOTS;
            self.write.store(next, Ordering::Release);
            next
        };

        let slot = &self.slots[idx];
        slot.init(in_rate, in_channels, hw_rate, hw_channels, use_ac3);
        let _ = is_flush; // flush-ness is entirely captured by the caller having drained the old slot above.
        self.filled.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    /// §4.4 Advance's flush-marker scan: walks forward from `read` through
    /// the filled range, retiring any slot that carries `flush_buffers` until
    /// (and including) the last one found, so a burst of producer-requested
    /// flushes collapses into a single jump rather than being replayed one at
    /// a time. Returns whether any marker was consumed.
    pub fn consume_flush_markers(&self) -> bool {
        let mut consumed = false;
        let filled = self.filled.load(Ordering::Acquire);
        if filled <= 1 {
            // The current read slot itself always starts life with
            // flush_buffers=true (set by activate/init); that's not a
            // "marker to scan past", it's the normal post-rotation state the
            // worker clears the first time it looks at a fresh slot.
            let slot = self.read_slot();
            if slot.flush_buffers.swap(false, Ordering::AcqRel) {
                consumed = true;
            }
            return consumed;
        }

        let read = self.read.load(Ordering::Relaxed);
        let mut last_marker_offset = None;
        for offset in 0..filled {
            let idx = (read + offset) % RING_SLOTS;
            if self.slots[idx].flush_buffers.load(Ordering::Acquire) {
                last_marker_offset = Some(offset);
            }
        }

        if let Some(offset) = last_marker_offset {
            for step in 0..=offset {
                let idx = (read + step) % RING_SLOTS;
                self.slots[idx].flush_buffers.store(false, Ordering::Release);
            }
            self.read.store((read + offset) % RING_SLOTS, Ordering::Release);
            self.filled.fetch_sub(offset, Ordering::AcqRel);
            consumed = true;
        } else {
            self.read_slot().flush_buffers.store(false, Ordering::Release);
        }
        consumed
    }

    /// Retires the current read slot and moves on to the next one. Returns
    /// `None` if there is nothing queued beyond the current slot (the worker
    /// should return to the outer wait); otherwise returns whether the new
    /// slot's format differs from the old one.
    pub fn advance_read(&self) -> Option<bool> {
        let filled = self.filled.load(Ordering::Acquire);
        if filled <= 1 {
            return None;
        }
        let old_format = self.read_slot().format_tuple();
        let next = (self.read.load(Ordering::Relaxed) + 1) % RING_SLOTS;
        self.read.store(next, Ordering::Release);
        self.filled.fetch_sub(1, Ordering::AcqRel);
        let new_format = self.read_slot().format_tuple();
        Some(old_format != new_format)
    }

    /// Updates the current read slot's hw format after a downgraded backend
    /// `setup` (the pipeline must adapt, per §4.1).
    pub fn set_read_hw_format(&self, hw_rate: u32, hw_channels: u8) {
        let slot = self.read_slot();
        slot.hw_rate.store(hw_rate, Ordering::Release);
        slot.hw_channels.store(hw_channels, Ordering::Release);
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_add_slot_initializes_in_place() {
        let p = Pipeline::new();
        assert_eq!(p.filled(), 0);
        p.add_slot(48_000, 2, 48_000, 2, false).unwrap();
        assert_eq!(p.filled(), 1);
        assert_eq!(p.read_slot().hw_rate(), 48_000);
        assert_eq!(p.write_slot().hw_rate(), 48_000);
    }

    #[test]
    fn second_add_slot_rotates_write_and_keeps_read() {
        let p = Pipeline::new();
        p.add_slot(48_000, 2, 48_000, 2, false).unwrap();
        p.add_slot(44_100, 6, 44_100, 6, false).unwrap();
        assert_eq!(p.filled(), 2);
        assert_eq!(p.read_slot().hw_rate(), 48_000);
        assert_eq!(p.write_slot().hw_rate(), 44_100);
    }

    #[test]
    fn ring_full_after_eight_pending_slots() {
        let p = Pipeline::new();
        for _ in 0..RING_SLOTS {
            p.add_slot(48_000, 2, 48_000, 2, false).unwrap();
        }
        assert_eq!(p.filled(), RING_SLOTS);
        assert!(matches!(p.add_slot(48_000, 2, 48_000, 2, false), Err(AudioError::RingFull)));
    }

    #[test]
    fn advance_read_reports_format_change() {
        let p = Pipeline::new();
        p.add_slot(48_000, 2, 48_000, 2, false).unwrap();
        p.add_slot(44_100, 6, 44_100, 6, false).unwrap();
        let changed = p.advance_read().unwrap();
        assert!(changed);
        assert_eq!(p.filled(), 1);
        assert_eq!(p.read_slot().hw_rate(), 44_100);
    }

    #[test]
    fn advance_read_returns_none_when_nothing_queued() {
        let p = Pipeline::new();
        p.add_slot(48_000, 2, 48_000, 2, false).unwrap();
        assert_eq!(p.advance_read(), None);
        assert_eq!(p.filled(), 1);
    }

    #[test]
    fn flush_reuses_format_and_drains_old_buffer() {
        let p = Pipeline::new();
        p.add_slot(48_000, 2, 48_000, 2, false).unwrap();
        p.write_slot().buffer.write(&[1, 2, 3, 4]);
        p.flush().unwrap();
        assert_eq!(p.filled(), 2);
        assert_eq!(p.write_slot().hw_rate(), 48_000);
        assert_eq!(p.write_slot().hw_channels(), 2);
    }

    #[test]
    fn flush_marker_burst_collapses_to_one_jump() {
        let p = Pipeline::new();
        p.add_slot(48_000, 2, 48_000, 2, false).unwrap();
        p.flush().unwrap();
        p.flush().unwrap();
        assert_eq!(p.filled(), 3);
        let consumed = p.consume_flush_markers();
        assert!(consumed);
        assert_eq!(p.filled(), 1);
    }
}
