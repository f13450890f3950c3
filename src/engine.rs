//! Facade tying components A-H into the external interface of spec.md §6.
//! `Engine` is the single owned value the encapsulation note in §9 asks for:
//! all of its mutable state lives behind atomics/mutexes reached through
//! `&self`, so callers never need `&mut Engine`.

use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use log::{info, warn};

use crate::backend::{NoopBackend, OutputBackend, OutputBackendHandle};
use crate::capability::CapabilityMatrix;
use crate::clock::Pts;
use crate::config::EngineConfig;
use crate::error::{setup_status_code, AudioError};
use crate::filters::FilterChain;
use crate::pipeline::Pipeline;
use crate::producer::{ControlState, Producer};
use crate::worker::Worker;

#[cfg(unix)]
use crate::backend::{alsa::AlsaBackend, oss::OssBackend};

const ENV_DEVICE_FALLBACK: &str = "AUDIOENGINE_DEVICE";

/// Which concrete backend a device name resolves to (spec §6 "Backend
/// device naming" / §9 "sum-typed variants {Alsa, Oss, Noop}").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Alsa,
    Oss,
    Noop,
}

impl BackendKind {
    pub fn classify(device_name: &str) -> Self {
        if device_name.is_empty() {
            BackendKind::Noop
        } else if device_name.starts_with('/') {
            BackendKind::Oss
        } else {
            BackendKind::Alsa
        }
    }
}

fn build_backend(device_name: &str) -> Box<dyn OutputBackend> {
    match BackendKind::classify(device_name) {
        BackendKind::Noop => Box::new(NoopBackend::new()),
        #[cfg(unix)]
        BackendKind::Oss => Box::new(OssBackend::new(Some(device_name.to_string()))),
        #[cfg(unix)]
        BackendKind::Alsa => Box::new(AlsaBackend::new(Some(device_name.to_string()))),
        #[cfg(not(unix))]
        BackendKind::Oss | BackendKind::Alsa => {
            warn!("no real backend is available on this target; falling back to noop");
            Box::new(NoopBackend::new())
        }
    }
}

pub struct Engine {
    producer: Producer,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let pipeline = Arc::new(Pipeline::new());
        let control = Arc::new(ControlState::new());
        let filters = Arc::new(Mutex::new(FilterChain::new(
            config.compression_max_permille,
            config.normalize_max_permille,
        )));
        let config = Arc::new(Mutex::new(config));
        let backend: OutputBackendHandle = Arc::new(Mutex::new(Box::new(NoopBackend::new())));

        let producer = Producer {
            pipeline,
            control,
            filters,
            config,
            backend,
            capability: Mutex::new(None),
        };

        Self { producer, worker: Mutex::new(None) }
    }

    fn resolve_device_name(&self, use_ac3: bool) -> String {
        let cfg = self.producer.config.lock().unwrap();
        let configured = if use_ac3 { cfg.device_ac3.clone() } else { cfg.device.clone() };
        configured
            .or_else(|| std::env::var(ENV_DEVICE_FALLBACK).ok())
            .unwrap_or_default()
    }

    /// `Init`: acquires the device, probes its capability matrix, and starts
    /// the playback worker thread. Idempotent.
    pub fn init(&self) -> Result<(), AudioError> {
        let device_name = self.resolve_device_name(false);
        let mut backend = build_backend(&device_name);
        if let Err(e) = backend.init() {
            warn!("backend init failed ({e}); falling back to the noop backend");
            backend = Box::new(NoopBackend::new());
            backend.init()?;
        }

        let matrix = CapabilityMatrix::probe(backend.as_mut());
        *self.producer.capability.lock().unwrap() = Some(matrix);
        *self.producer.backend.lock().unwrap() = backend;

        let mut worker_slot = self.worker.lock().unwrap();
        if worker_slot.is_none() {
            self.producer.control.cancel.store(false, std::sync::atomic::Ordering::Release);
            *worker_slot = Some(Worker::spawn(
                Arc::clone(&self.producer.pipeline),
                Arc::clone(&self.producer.control),
                Arc::clone(&self.producer.filters),
                Arc::clone(&self.producer.config),
                Arc::clone(&self.producer.backend),
            ));
        }
        info!("engine initialized against device '{device_name}'");
        Ok(())
    }

    /// `Exit`: cooperatively cancels the worker, joins it, then releases the device.
    pub fn exit(&self) {
        self.producer.control.request_cancel();
        if let Some(handle) = self.worker.lock().unwrap().take() {
            let _ = handle.join();
        }
        self.producer.backend.lock().unwrap().exit();
    }

    /// `Setup(rate, channels, use_ac3) -> {0 ok | 1 downgraded | -1 fail}`.
    pub fn setup(&self, rate: u32, channels: u8, use_ac3: bool) -> i32 {
        let result = self.producer.setup(rate, channels, use_ac3);
        if let Err(ref e) = result {
            warn!("Setup({rate}, {channels}, {use_ac3}) failed: {e}");
        }
        setup_status_code(&result)
    }

    pub fn enqueue(&self, buf: &[u8]) {
        self.producer.enqueue(buf);
    }

    pub fn flush_buffers(&self) -> i32 {
        match self.producer.flush_buffers() {
            Ok(()) => 0,
            Err(e) => {
                warn!("FlushBuffers failed: {e}");
                -1
            }
        }
    }

    pub fn set_clock(&self, pts: Pts) {
        self.producer.set_clock(pts);
    }

    pub fn get_clock(&self) -> Pts {
        self.producer.get_clock()
    }

    pub fn get_delay(&self) -> i64 {
        self.producer.get_delay()
    }

    pub fn free_bytes(&self) -> usize {
        self.producer.free_bytes()
    }

    pub fn used_bytes(&self) -> usize {
        self.producer.used_bytes()
    }

    pub fn video_ready(&self, video_pts: Pts) {
        self.producer.video_ready(video_pts);
    }

    pub fn play(&self) {
        self.producer.play();
    }

    pub fn pause(&self) {
        self.producer.pause();
    }

    pub fn set_volume(&self, volume: u32) {
        self.producer.set_volume(volume);
    }

    pub fn set_buffer_time(&self, ms: u32) {
        self.producer.config.lock().unwrap().buffer_time_ms = ms;
    }

    pub fn set_softvol(&self, on: bool) {
        self.producer.config.lock().unwrap().softvol = on;
    }

    pub fn set_normalize(&self, on: bool, max_permille: u32) {
        let mut cfg = self.producer.config.lock().unwrap();
        cfg.normalize_enabled = on;
        cfg.normalize_max_permille = max_permille;
        let mut chain = self.producer.filters.lock().unwrap();
        chain.normalize_enabled = on;
        chain.normalizer.set_max_norm_permille(max_permille);
    }

    pub fn set_compression(&self, on: bool, max_permille: u32) {
        let mut cfg = self.producer.config.lock().unwrap();
        cfg.compression_enabled = on;
        cfg.compression_max_permille = max_permille;
        let mut chain = self.producer.filters.lock().unwrap();
        chain.compression_enabled = on;
        chain.compressor.set_max_compression_permille(max_permille);
    }

    pub fn set_stereo_descent(&self, permille: u32) {
        self.producer.config.lock().unwrap().stereo_descent_permille = permille;
        let volume = self.producer.control.volume.load(std::sync::atomic::Ordering::Acquire);
        self.set_volume(volume);
    }

    pub fn set_device(&self, name: Option<String>) {
        self.producer.config.lock().unwrap().device = name;
    }

    pub fn set_device_ac3(&self, name: Option<String>) {
        self.producer.config.lock().unwrap().device_ac3 = name;
    }

    /// Simplified relative to the full naming scheme a hardware routing layer
    /// would expose: stores the requested output channel-route name for
    /// informational/logging purposes. No backend here exposes distinct
    /// named output routes (ALSA "channel maps" are out of scope per the
    /// Non-goals on dynamic sample-rate conversion and mixer control).
    pub fn set_channel(&self, name: String) {
        info!("channel route requested: {name}");
    }
}
