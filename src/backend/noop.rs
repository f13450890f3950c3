//! Inert fallback backend (component H). Used when no real device is bound,
//! or when the requested backend is unknown at init (§7 error policy: "falls
//! back to the noop backend only at init if the requested backend is unknown").

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::{BackendFormat, OutputBackend, ThreadResult};
use crate::error::AudioError;
use crate::ringbuf::ByteRing;

/// Upper bound on one backend iteration, per spec §4.1.
const ITERATION_MS: u64 = 24;

pub struct NoopBackend {
    format: Option<(u32, u8)>,
    iteration_bytes: usize,
    volume: u32,
}

impl NoopBackend {
    pub fn new() -> Self {
        Self {
            format: None,
            iteration_bytes: 0,
            volume: 1000,
        }
    }
}

impl Default for NoopBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputBackend for NoopBackend {
    fn init(&mut self) -> Result<(), AudioError> {
        Ok(())
    }

    fn exit(&mut self) {
        self.format = None;
    }

    fn setup(&mut self, rate: u32, channels: u8, _use_ac3: bool) -> Result<BackendFormat, AudioError> {
        self.format = Some((rate, channels));
        let bytes_per_frame = channels as u64 * 2;
        self.iteration_bytes = ((rate as u64 * bytes_per_frame * ITERATION_MS) / 1000) as usize;
        Ok(BackendFormat {
            rate,
            channels,
            downgraded: false,
        })
    }

    fn play(&mut self) {}
    fn pause(&mut self) {}
    fn flush_buffers(&mut self) {}

    fn get_delay(&self) -> i64 {
        0
    }

    fn set_volume(&mut self, volume: u32) {
        self.volume = volume.min(1000);
    }

    fn thread_iteration(
        &mut self,
        slot: &Arc<ByteRing>,
        paused: &AtomicBool,
        cancel: &AtomicBool,
    ) -> ThreadResult {
        if cancel.load(Ordering::Relaxed) || paused.load(Ordering::Relaxed) {
            return ThreadResult::Running;
        }

        let to_drain = self.iteration_bytes.min(slot.used());
        slot.skip(to_drain);

        if slot.used() == 0 {
            ThreadResult::Underrun
        } else {
            ThreadResult::Running
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    #[test]
    fn drains_up_to_one_iteration_worth_of_bytes() {
        let mut backend = NoopBackend::new();
        backend.setup(48_000, 2, false).unwrap();
        let ring = Arc::new(ByteRing::new(1 << 20));
        ring.write(&vec![0u8; 1_000_000]);

        let paused = AtomicBool::new(false);
        let cancel = AtomicBool::new(false);
        let before = ring.used();
        let result = backend.thread_iteration(&ring, &paused, &cancel);
        assert_eq!(result, ThreadResult::Running);
        assert!(ring.used() < before);
    }

    #[test]
    fn reports_underrun_when_slot_empties() {
        let mut backend = NoopBackend::new();
        backend.setup(48_000, 2, false).unwrap();
        let ring = Arc::new(ByteRing::new(1024));
        ring.write(&[0u8; 10]);

        let paused = AtomicBool::new(false);
        let cancel = AtomicBool::new(false);
        let result = backend.thread_iteration(&ring, &paused, &cancel);
        assert_eq!(result, ThreadResult::Underrun);
    }

    #[test]
    fn pause_is_a_no_op_iteration() {
        let mut backend = NoopBackend::new();
        backend.setup(48_000, 2, false).unwrap();
        let ring = Arc::new(ByteRing::new(1024));
        ring.write(&[0u8; 100]);

        let paused = AtomicBool::new(true);
        let cancel = AtomicBool::new(false);
        let before = ring.used();
        let result = backend.thread_iteration(&ring, &paused, &cancel);
        assert_eq!(result, ThreadResult::Running);
        assert_eq!(ring.used(), before);
    }
}
