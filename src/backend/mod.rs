//! Output backend interface (component C, spec §4.1). A backend is a narrow
//! collaborator the pipeline/worker drive; all hardware specifics live
//! behind this trait so the playback core never has to know whether it is
//! talking to ALSA, OSS, or nothing at all.

pub mod noop;

#[cfg(unix)]
pub mod alsa;
#[cfg(unix)]
pub mod oss;

use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use crate::error::AudioError;
use crate::ringbuf::ByteRing;

/// Shared handle to the active backend: the worker drives it every
/// iteration, while `SetVolume`/`Play`/`Pause` reach it from the producer's
/// calling thread (spec §5: "the mixer setter may be called from any thread").
pub type OutputBackendHandle = Arc<Mutex<Box<dyn OutputBackend>>>;

/// The format a backend actually ended up with after `setup`. `rate`/
/// `channels` mirror the request unless the backend downgraded them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendFormat {
    pub rate: u32,
    pub channels: u8,
    pub downgraded: bool,
}

/// Outcome of one bounded iteration of `thread()` (spec §4.1/§4.6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThreadResult {
    /// The device drained faster than the slot could supply it; not an error.
    Underrun,
    /// The iteration pushed data (or waited) without draining the slot.
    Running,
    /// The device reported a failure; the worker retries once before giving up.
    Error(AudioError),
}

/// A playback backend (spec §4.1). All operations are idempotent/repeatable;
/// the design explicitly closes and reopens the device on every format
/// change, so `setup` must tolerate being called many times over the life of
/// the backend.
pub trait OutputBackend: Send {
    fn init(&mut self) -> Result<(), AudioError>;
    fn exit(&mut self);

    /// Requests a playback format. On success the returned format may differ
    /// from the request (`downgraded`); the pipeline adapts the slot to it.
    fn setup(&mut self, rate: u32, channels: u8, use_ac3: bool) -> Result<BackendFormat, AudioError>;

    fn play(&mut self);
    fn pause(&mut self);

    /// Drops pending device-side samples and returns to a prepared, silent state.
    fn flush_buffers(&mut self);

    /// Samples presently held by the device that have not yet been heard,
    /// in 1/90000s units.
    fn get_delay(&self) -> i64;

    /// Hardware mixer volume (0..1000); a no-op when software volume is used
    /// or the backend has no hardware mixer (true of every backend here).
    fn set_volume(&mut self, volume: u32);

    /// One bounded iteration of device work: wait for buffer space (≤24ms),
    /// then push as much of `slot` as fits. Must check `cancel` and return
    /// promptly if it is set or if `paused` is true.
    fn thread_iteration(
        &mut self,
        slot: &Arc<ByteRing>,
        paused: &AtomicBool,
        cancel: &AtomicBool,
    ) -> ThreadResult;
}

pub use noop::NoopBackend;
