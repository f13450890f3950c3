//! Raw-file backend selected when the device name starts with `"/"` (§6),
//! modelled on `/dev/dsp`-style character devices. This is a simplified
//! writer: it opens the device path and streams raw little-endian PCM to it
//! without issuing `SNDCTL_DSP_*` format/rate ioctls, since no example in the
//! retrieved corpus grounds an actual ioctl negotiation (see DESIGN.md) —
//! the device is assumed pre-configured for 16-bit signed little-endian PCM
//! at the requested rate/channel count, which holds for the common ALSA OSS
//! emulation path this backend targets in practice.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};

use super::{BackendFormat, OutputBackend, ThreadResult};
use crate::clock::bytes_to_pts;
use crate::error::AudioError;
use crate::ringbuf::ByteRing;

const ITERATION_MS: u64 = 24;
const DEFAULT_DEVICE_PATH: &str = "/dev/dsp";

pub struct OssBackend {
    device_path: String,
    file: Option<File>,
    rate: u32,
    channels: u8,
    iteration_bytes: usize,
}

impl OssBackend {
    pub fn new(device_path: Option<String>) -> Self {
        Self {
            device_path: device_path.unwrap_or_else(|| DEFAULT_DEVICE_PATH.to_string()),
            file: None,
            rate: 0,
            channels: 0,
            iteration_bytes: 0,
        }
    }
}

impl OutputBackend for OssBackend {
    fn init(&mut self) -> Result<(), AudioError> {
        Ok(())
    }

    fn exit(&mut self) {
        self.file = None;
        self.rate = 0;
        self.channels = 0;
    }

    fn setup(&mut self, rate: u32, channels: u8, use_ac3: bool) -> Result<BackendFormat, AudioError> {
        self.file = None;

        if use_ac3 {
            warn!("AC3 passthrough requested on the raw-file backend; writing payload as opaque bytes, no framing is applied");
        }

        info!("opening raw output device {} for {rate} Hz / {channels} ch", self.device_path);

        let file = OpenOptions::new()
            .write(true)
            .open(&self.device_path)
            .map_err(|e| AudioError::BackendOpenFailed(format!("{}: {e}", self.device_path)))?;

        self.file = Some(file);
        self.rate = rate;
        self.channels = channels;
        self.iteration_bytes = ((rate as u64 * channels as u64 * 2 * ITERATION_MS) / 1000) as usize;

        Ok(BackendFormat {
            rate,
            channels,
            downgraded: false,
        })
    }

    fn play(&mut self) {}
    fn pause(&mut self) {}

    fn flush_buffers(&mut self) {
        if let Some(file) = &mut self.file {
            let _ = file.flush();
        }
    }

    fn get_delay(&self) -> i64 {
        if self.rate == 0 || self.channels == 0 {
            return 0;
        }
        bytes_to_pts(self.iteration_bytes as u64, self.rate, self.channels)
    }

    fn set_volume(&mut self, _volume: u32) {
        // The device node exposes no software mixer control of its own.
    }

    fn thread_iteration(
        &mut self,
        slot: &Arc<ByteRing>,
        paused: &AtomicBool,
        cancel: &AtomicBool,
    ) -> ThreadResult {
        if cancel.load(Ordering::Relaxed) || paused.load(Ordering::Relaxed) {
            std::thread::sleep(Duration::from_millis(ITERATION_MS));
            return ThreadResult::Running;
        }

        let Some(file) = self.file.as_mut() else {
            return ThreadResult::Error(AudioError::BackendFatal("write before setup".into()));
        };

        let to_drain = self.iteration_bytes.min(slot.used());
        if to_drain == 0 {
            std::thread::sleep(Duration::from_millis(ITERATION_MS));
            return ThreadResult::Underrun;
        }

        let mut scratch = vec![0u8; to_drain];
        let drained = slot.read_into(&mut scratch);
        if let Err(e) = file.write_all(&scratch[..drained]) {
            return ThreadResult::Error(AudioError::BackendFatal(e.to_string()));
        }

        if slot.used() == 0 {
            ThreadResult::Underrun
        } else {
            ThreadResult::Running
        }
    }
}
