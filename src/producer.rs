//! Producer API & clock (component F, spec §4.5) plus the global control
//! state (spec §3 "Global control state" / §5's wake channel) that the
//! worker reads on the other side of the handshake.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use log::debug;

use crate::backend::OutputBackendHandle;
use crate::capability::CapabilityMatrix;
use crate::clock::{advance, bytes_to_pts, round_down_to_frame, Pts, NO_PTS};
use crate::config::EngineConfig;
use crate::error::{AudioError, SetupOutcome};
use crate::filters::FilterChain;
use crate::pipeline::{Pipeline, Slot, SLOT_CAPACITY};

/// Matches the backend iteration bound used across `backend/*`; the start
/// threshold's `period_bytes` term models one such iteration's worth of data.
const ITERATION_MS: i64 = 24;

/// `running`/`paused`/the wake channel (spec §5), plus the producer-owned
/// bookkeeping flags from spec §3's "Global control state".
pub struct ControlState {
    pub running: AtomicBool,
    pub paused: AtomicBool,
    pub video_ready: AtomicBool,
    pub skip_bytes: AtomicUsize,
    pub volume: AtomicU32,
    pub cancel: AtomicBool,
    wake_mutex: Mutex<()>,
    wake_cond: Condvar,
}

impl ControlState {
    pub fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            video_ready: AtomicBool::new(false),
            skip_bytes: AtomicUsize::new(0),
            volume: AtomicU32::new(1000),
            cancel: AtomicBool::new(false),
            wake_mutex: Mutex::new(()),
            wake_cond: Condvar::new(),
        }
    }

    pub fn signal_running(&self) {
        self.running.store(true, Ordering::Release);
        let _guard = self.wake_mutex.lock().unwrap();
        self.wake_cond.notify_all();
    }

    pub fn wake(&self) {
        let _guard = self.wake_mutex.lock().unwrap();
        self.wake_cond.notify_all();
    }

    /// Worker-side outer wait: blocks until `running` or `cancel` is set.
    pub fn wait_until_runnable(&self) {
        let mut guard = self.wake_mutex.lock().unwrap();
        while !self.running.load(Ordering::Acquire) && !self.cancel.load(Ordering::Acquire) {
            let (next_guard, _timeout) = self
                .wake_cond
                .wait_timeout(guard, Duration::from_millis(200))
                .unwrap();
            guard = next_guard;
        }
    }

    pub fn request_cancel(&self) {
        self.cancel.store(true, Ordering::Release);
        self.wake();
    }
}

impl Default for ControlState {
    fn default() -> Self {
        Self::new()
    }
}

/// The producer-facing half of the engine (spec §4.5): `Enqueue`, `SetClock`,
/// `GetClock`, `VideoReady`, `FlushBuffers`, plus `Setup`'s matrix lookup.
pub struct Producer {
    pub pipeline: std::sync::Arc<Pipeline>,
    pub control: std::sync::Arc<ControlState>,
    pub filters: std::sync::Arc<Mutex<FilterChain>>,
    pub config: std::sync::Arc<Mutex<EngineConfig>>,
    pub backend: OutputBackendHandle,
    pub capability: Mutex<Option<CapabilityMatrix>>,
}

impl Producer {
    /// §4.4 Add-slot steps 1-2 (matrix lookup) then 3-6 (`Pipeline::add_slot`).
    /// No resampling is performed (spec.md §1 Non-goals), so `hw_rate` always
    /// equals the requested `rate`; only the channel count may be remapped.
    ///
    /// If the pipeline is currently idle (`filled() == 0`) there is no
    /// "old" slot for the worker's `Advance` to transition away from, so the
    /// backend would otherwise never receive its first `setup` call; this
    /// method configures the backend directly in that case. A format change
    /// while already playing instead defers to the worker (spec §4.4
    /// Advance), so the device keeps draining the old format until the new
    /// slot is actually reached.
    pub fn setup(&self, rate: u32, in_channels: u8, use_ac3: bool) -> Result<SetupOutcome, AudioError> {
        if rate == 0 || in_channels == 0 {
            return Err(AudioError::BadArgument("rate and channels must be non-zero"));
        }
        let hw_channels = {
            let guard = self.capability.lock().unwrap();
            let matrix = guard
                .as_ref()
                .ok_or_else(|| AudioError::BackendOpenFailed("capability probe has not run".into()))?;
            matrix
                .resolve(rate, in_channels)
                .ok_or(AudioError::UnsupportedFormat { rate, channels: in_channels })?
        };

        let was_idle = self.pipeline.filled() == 0;
        self.pipeline.add_slot(rate, in_channels, rate, hw_channels, use_ac3)?;

        let mut downgraded = hw_channels != in_channels;
        if was_idle {
            let fmt = self.backend.lock().unwrap().setup(rate, hw_channels, use_ac3)?;
            if fmt.downgraded {
                downgraded = true;
                self.pipeline.set_read_hw_format(fmt.rate, fmt.channels);
            }
        }

        Ok(if downgraded { SetupOutcome::Downgraded } else { SetupOutcome::Ok })
    }

    /// §4.5 `Enqueue`. `buf` is wire-format bytes: opaque for AC3 slots,
    /// native-endian interleaved i16 PCM otherwise.
    pub fn enqueue(&self, buf: &[u8]) {
        let slot = self.pipeline.write_slot();
        if slot.hw_rate() == 0 {
            return; // step 1: no format set yet.
        }
        if slot.packet_size.load(Ordering::Relaxed) == 0 && !buf.is_empty() {
            slot.packet_size.store(buf.len(), Ordering::Relaxed); // step 2, informational.
        }

        let written = if slot.use_ac3() {
            slot.buffer.write(buf)
        } else {
            let in_channels = slot.in_channels.load(Ordering::Relaxed);
            let hw_channels = slot.hw_channels();
            let in_samples: Vec<i16> = buf
                .chunks_exact(2)
                .map(|c| i16::from_ne_bytes([c[0], c[1]]))
                .collect();
            let out_samples = {
                let mut chain = self.filters.lock().unwrap();
                chain.process(&in_samples, in_channels, hw_channels)
            };
            let mut out_bytes = Vec::with_capacity(out_samples.len() * 2);
            for s in out_samples {
                out_bytes.extend_from_slice(&s.to_ne_bytes());
            }
            slot.buffer.write(&out_bytes)
        };

        self.consider_startup(slot);

        if slot.pts() != NO_PTS {
            let new_pts = advance(slot.pts(), written as u64, slot.hw_rate(), slot.hw_channels());
            slot.set_pts(new_pts);
        }
    }

    /// §4.5 Enqueue step 5. Only touches the slot's head when it is not yet
    /// being drained by the worker (`filled <= 1`, i.e. this slot is also the
    /// current read slot) — otherwise a second party is already consuming it
    /// and skip-bytes accounting alone would race the worker's read cursor.
    fn consider_startup(&self, slot: &Slot) {
        if self.control.running.load(Ordering::Acquire) {
            return;
        }
        if self.pipeline.filled() <= 1 {
            let skip = self.control.skip_bytes.swap(0, Ordering::AcqRel);
            if skip > 0 {
                let used = slot.buffer.used();
                let drop = skip.min(used);
                slot.buffer.skip(drop);
                if skip > drop {
                    self.control.skip_bytes.store(skip - drop, Ordering::Release);
                }
            }
        }

        let used = slot.buffer.used();
        let threshold = self.start_threshold(slot);
        let video_ready = self.control.video_ready.load(Ordering::Acquire);
        if used > 4 * threshold || (video_ready && used > threshold) {
            debug!("start threshold reached ({used} > threshold {threshold}), waking worker");
            self.control.signal_running();
        }
    }

    pub fn set_clock(&self, pts: Pts) {
        self.pipeline.write_slot().set_pts(pts);
    }

    /// §4.5 `GetClock`.
    pub fn get_clock(&self) -> Pts {
        if !self.control.running.load(Ordering::Acquire) {
            return NO_PTS;
        }
        let slot = self.pipeline.read_slot();
        if slot.hw_rate() == 0 {
            return NO_PTS;
        }
        if self.pipeline.filled() > 1 {
            return NO_PTS; // transition in flight: delay is meaningless.
        }
        let delay = self.backend.lock().unwrap().get_delay();
        if delay == 0 {
            return NO_PTS;
        }
        let used_pts = bytes_to_pts(slot.buffer.used() as u64, slot.hw_rate(), slot.hw_channels());
        slot.pts().wrapping_sub(delay).wrapping_sub(used_pts)
    }

    pub fn get_delay(&self) -> i64 {
        self.backend.lock().unwrap().get_delay()
    }

    pub fn free_bytes(&self) -> usize {
        self.pipeline.write_slot().buffer.free()
    }

    pub fn used_bytes(&self) -> usize {
        self.pipeline.read_slot().buffer.used()
    }

    /// §4.5 `VideoReady`.
    pub fn video_ready(&self, video_pts: Pts) {
        let slot = self.pipeline.write_slot();
        if video_pts == NO_PTS || slot.pts() == NO_PTS {
            self.control.video_ready.store(true, Ordering::Release);
            return;
        }

        if !self.control.running.load(Ordering::Acquire) {
            let used_pts = bytes_to_pts(slot.buffer.used() as u64, slot.hw_rate(), slot.hw_channels());
            let audio_pts = slot.pts().wrapping_sub(used_pts);
            let (buffer_time_ms, video_audio_delay) = {
                let cfg = self.config.lock().unwrap();
                (cfg.buffer_time_ms as i64, cfg.video_audio_delay_90k)
            };
            let skip = video_pts - 15 * 20 * 90 - buffer_time_ms * 90 - audio_pts + video_audio_delay;
            if skip > 0 && skip < 2_000 * 90 {
                let channels = slot.hw_channels();
                let skip_bytes_raw = (skip as i64 * slot.hw_rate() as i64 * channels as i64 * 2) / 90_000;
                let skip_bytes = round_down_to_frame(skip_bytes_raw, channels).max(0) as usize;

                let drop_now = if self.pipeline.filled() <= 1 {
                    let used = slot.buffer.used();
                    let drop = skip_bytes.min(used);
                    slot.buffer.skip(drop);
                    drop
                } else {
                    0
                };
                let remainder = skip_bytes - drop_now;
                if remainder > 0 {
                    self.control.skip_bytes.store(remainder, Ordering::Release);
                }
            }

            if slot.buffer.used() > self.start_threshold(slot) {
                self.control.signal_running();
            }
        }

        self.control.video_ready.store(true, Ordering::Release);
    }

    /// §4.5 `FlushBuffers`: rotate to a fresh same-format slot, clear
    /// `video_ready`/`skip_bytes`, wake the worker, then poll up to 48 ms.
    pub fn flush_buffers(&self) -> Result<(), AudioError> {
        self.pipeline.flush()?;
        self.control.video_ready.store(false, Ordering::Release);
        self.control.skip_bytes.store(0, Ordering::Release);
        self.control.signal_running();

        let deadline = Instant::now() + Duration::from_millis(48);
        while Instant::now() < deadline && self.pipeline.filled() > 0 {
            thread::sleep(Duration::from_millis(2));
        }
        Ok(())
    }

    pub fn play(&self) {
        self.control.paused.store(false, Ordering::Release);
        self.backend.lock().unwrap().play();
    }

    pub fn pause(&self) {
        self.control.paused.store(true, Ordering::Release);
        self.backend.lock().unwrap().pause();
    }

    pub fn set_volume(&self, volume: u32) {
        let v = volume.min(1000);
        self.control.volume.store(v, Ordering::Release);
        let softvol = self.config.lock().unwrap().softvol;
        if softvol {
            let descent = self.config.lock().unwrap().stereo_descent_permille;
            let gain = crate::filters::amplifier::effective_gain_permille(v, descent);
            self.filters.lock().unwrap().amplifier.set_gain_permille(gain);
        } else {
            self.backend.lock().unwrap().set_volume(v);
        }
    }

    fn start_threshold(&self, slot: &Slot) -> usize {
        let cfg = self.config.lock().unwrap();
        start_threshold_for(slot, &cfg)
    }
}

/// §4.4 "Start threshold": `max(period_bytes, rate·ch·bps·(buffer_time +
/// max(0, video_audio_delay/90)) / 1000)` capped at `ring_capacity/3`.
/// `period_bytes` (the size of one backend device period) has no equivalent
/// exposed by `OutputBackend`, so it is modeled as one `ITERATION_MS`
/// iteration's worth of bytes — the same bound every backend's
/// `thread_iteration` already observes (see DESIGN.md). Free function so the
/// worker can reuse it after `Advance` without needing a `Producer` handle.
pub fn start_threshold_for(slot: &Slot, cfg: &EngineConfig) -> usize {
    let hw_rate = slot.hw_rate() as i64;
    let bytes_per_frame = slot.hw_channels() as i64 * 2;
    let period_bytes = (hw_rate * bytes_per_frame * ITERATION_MS) / 1000;

    let delay_ms = (cfg.video_audio_delay_90k / 90).max(0);
    let by_time = (hw_rate * bytes_per_frame * (cfg.buffer_time_ms as i64 + delay_ms)) / 1000;

    let threshold = period_bytes.max(by_time).max(0) as usize;
    threshold.min(SLOT_CAPACITY / 3)
}
