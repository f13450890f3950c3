//! ALSA-style backend: an opaque device name not starting with `"/"` selects
//! this backend (§6). Built on `cpal`'s default host the way the teacher
//! engine drives its WASAPI output stream — an audio callback pulls bytes
//! from a shared ring buffer rather than blocking the worker thread directly,
//! since cpal's stream model is callback-driven rather than a blocking
//! `write()` loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate, Stream, StreamConfig};
use log::{info, warn};

use super::{BackendFormat, OutputBackend, ThreadResult};
use crate::clock::bytes_to_pts;
use crate::error::AudioError;
use crate::ringbuf::ByteRing;

const ITERATION_MS: u64 = 24;

type SharedRing = Arc<Mutex<Option<Arc<ByteRing>>>>;

pub struct AlsaBackend {
    device_name: Option<String>,
    host: cpal::Host,
    stream: Option<Stream>,
    shared_ring: SharedRing,
    stream_paused: Arc<AtomicBool>,
    buffer_frames: u32,
    rate: u32,
    channels: u8,
}

impl AlsaBackend {
    pub fn new(device_name: Option<String>) -> Self {
        Self {
            device_name,
            host: cpal::default_host(),
            stream: None,
            shared_ring: Arc::new(Mutex::new(None)),
            stream_paused: Arc::new(AtomicBool::new(true)),
            buffer_frames: 1024,
            rate: 0,
            channels: 0,
        }
    }

    fn select_device(&self) -> Result<cpal::Device, AudioError> {
        match &self.device_name {
            Some(name) if !name.is_empty() => self
                .host
                .output_devices()
                .map_err(|e| AudioError::BackendOpenFailed(e.to_string()))?
                .find(|d| d.name().map(|n| &n == name).unwrap_or(false))
                .ok_or_else(|| AudioError::BackendOpenFailed(format!("device '{name}' not found"))),
            _ => self
                .host
                .default_output_device()
                .ok_or_else(|| AudioError::BackendOpenFailed("no default output device".into())),
        }
    }

    fn select_stream_config(
        device: &cpal::Device,
        rate: u32,
        channels: u8,
    ) -> Result<(StreamConfig, SampleFormat, bool), AudioError> {
        let mut preferred = None;
        let mut fallback = None;

        let ranges = device
            .supported_output_configs()
            .map_err(|e| AudioError::BackendOpenFailed(e.to_string()))?;

        for cfg in ranges {
            let cfg_channels = cfg.channels();
            let sample_format = cfg.sample_format();
            let min = cfg.min_sample_rate().0;
            let max = cfg.max_sample_rate().0;
            let exact_rate = rate >= min && rate <= max;
            let exact_channels = cfg_channels == channels as u16;

            if exact_rate && exact_channels {
                let chosen = (
                    StreamConfig {
                        channels: cfg_channels,
                        sample_rate: SampleRate(rate),
                        buffer_size: cpal::BufferSize::Default,
                    },
                    sample_format,
                    true,
                );
                if matches!(sample_format, SampleFormat::I16) {
                    return Ok(chosen);
                }
                preferred.get_or_insert(chosen);
            }

            if fallback.is_none() {
                fallback = Some((
                    StreamConfig {
                        channels: cfg_channels,
                        sample_rate: cfg.max_sample_rate(),
                        buffer_size: cpal::BufferSize::Default,
                    },
                    sample_format,
                    false,
                ));
            }
        }

        preferred
            .or(fallback)
            .ok_or_else(|| AudioError::BackendOpenFailed("no usable output stream config".into()))
    }
}

impl OutputBackend for AlsaBackend {
    fn init(&mut self) -> Result<(), AudioError> {
        self.host = cpal::default_host();
        Ok(())
    }

    fn exit(&mut self) {
        self.stream.take();
        *self.shared_ring.lock().unwrap() = None;
        self.rate = 0;
        self.channels = 0;
    }

    fn setup(&mut self, rate: u32, channels: u8, use_ac3: bool) -> Result<BackendFormat, AudioError> {
        // Closing and reopening on every format change recovers reliably from
        // device re-handshakes (HDMI et al.) that a live-reconfigure can miss.
        self.stream.take();

        if use_ac3 {
            warn!("AC3 passthrough requested on the cpal backend; writing payload as opaque PCM bytes, no SPDIF/IEC61937 framing is applied");
        }

        let device = self.select_device()?;
        let (stream_config, sample_format, exact) = Self::select_stream_config(&device, rate, channels)?;
        let accepted_rate = stream_config.sample_rate.0;
        let accepted_channels = stream_config.channels as u8;

        info!(
            "opening output device for {accepted_rate} Hz / {accepted_channels} ch (requested {rate} Hz / {channels} ch, exact match: {exact})"
        );

        self.buffer_frames = match stream_config.buffer_size {
            cpal::BufferSize::Fixed(n) => n,
            cpal::BufferSize::Default => (accepted_rate as u64 * ITERATION_MS / 1000) as u32,
        };

        let shared_ring = Arc::clone(&self.shared_ring);
        let paused = Arc::clone(&self.stream_paused);
        let err_fn = |err| warn!("audio stream error: {err}");

        let stream = match sample_format {
            SampleFormat::I16 => device
                .build_output_stream(
                    &stream_config,
                    move |output: &mut [i16], _| fill_i16(output, &shared_ring, &paused),
                    err_fn,
                    None,
                )
                .map_err(|e| AudioError::BackendOpenFailed(e.to_string()))?,
            SampleFormat::F32 => device
                .build_output_stream(
                    &stream_config,
                    move |output: &mut [f32], _| fill_f32(output, &shared_ring, &paused),
                    err_fn,
                    None,
                )
                .map_err(|e| AudioError::BackendOpenFailed(e.to_string()))?,
            other => {
                return Err(AudioError::BackendOpenFailed(format!(
                    "unsupported output sample format {other:?}"
                )))
            }
        };

        stream
            .play()
            .map_err(|e| AudioError::BackendOpenFailed(e.to_string()))?;
        self.stream_paused.store(false, Ordering::SeqCst);
        self.stream = Some(stream);
        self.rate = accepted_rate;
        self.channels = accepted_channels;

        Ok(BackendFormat {
            rate: accepted_rate,
            channels: accepted_channels,
            downgraded: !exact,
        })
    }

    fn play(&mut self) {
        self.stream_paused.store(false, Ordering::SeqCst);
        if let Some(stream) = &self.stream {
            let _ = stream.play();
        }
    }

    fn pause(&mut self) {
        self.stream_paused.store(true, Ordering::SeqCst);
        if let Some(stream) = &self.stream {
            let _ = stream.pause();
        }
    }

    fn flush_buffers(&mut self) {
        if let Some(ring) = self.shared_ring.lock().unwrap().as_ref() {
            ring.reset();
        }
        if let Some(stream) = &self.stream {
            let _ = stream.pause();
            let _ = stream.play();
        }
    }

    fn get_delay(&self) -> i64 {
        if self.rate == 0 || self.channels == 0 {
            return 0;
        }
        bytes_to_pts(
            self.buffer_frames as u64 * self.channels as u64 * 2,
            self.rate,
            self.channels,
        )
    }

    fn set_volume(&mut self, _volume: u32) {
        // cpal exposes no hardware mixer; software volume (the amplifier
        // filter) is the only volume control available on this backend.
    }

    fn thread_iteration(
        &mut self,
        slot: &Arc<ByteRing>,
        paused: &AtomicBool,
        cancel: &AtomicBool,
    ) -> ThreadResult {
        if cancel.load(Ordering::Relaxed) {
            return ThreadResult::Running;
        }

        {
            let mut guard = self.shared_ring.lock().unwrap();
            let needs_update = !matches!(guard.as_ref(), Some(cur) if Arc::ptr_eq(cur, slot));
            if needs_update {
                *guard = Some(Arc::clone(slot));
            }
        }
        self.stream_paused.store(paused.load(Ordering::Relaxed), Ordering::Relaxed);

        std::thread::sleep(Duration::from_millis(ITERATION_MS));

        if paused.load(Ordering::Relaxed) {
            return ThreadResult::Running;
        }
        if slot.used() == 0 {
            ThreadResult::Underrun
        } else {
            ThreadResult::Running
        }
    }
}

fn fill_i16(output: &mut [i16], shared_ring: &SharedRing, paused: &AtomicBool) {
    if paused.load(Ordering::Relaxed) {
        output.fill(0);
        return;
    }
    let Some(ring) = shared_ring.lock().unwrap().clone() else {
        output.fill(0);
        return;
    };
    let wanted_bytes = output.len() * 2;
    let mut scratch = vec![0u8; wanted_bytes];
    let filled = ring.read_into(&mut scratch);
    for (i, sample) in output.iter_mut().enumerate() {
        let byte_off = i * 2;
        *sample = if byte_off + 1 < filled {
            i16::from_le_bytes([scratch[byte_off], scratch[byte_off + 1]])
        } else {
            0
        };
    }
}

fn fill_f32(output: &mut [f32], shared_ring: &SharedRing, paused: &AtomicBool) {
    if paused.load(Ordering::Relaxed) {
        output.fill(0.0);
        return;
    }
    let Some(ring) = shared_ring.lock().unwrap().clone() else {
        output.fill(0.0);
        return;
    };
    let wanted_bytes = output.len() * 2;
    let mut scratch = vec![0u8; wanted_bytes];
    let filled = ring.read_into(&mut scratch);
    for (i, sample) in output.iter_mut().enumerate() {
        let byte_off = i * 2;
        *sample = if byte_off + 1 < filled {
            i16::from_le_bytes([scratch[byte_off], scratch[byte_off + 1]]) as f32 / i16::MAX as f32
        } else {
            0.0
        };
    }
}
