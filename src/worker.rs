//! Playback worker (component E, spec §4.6): one thread for the process
//! lifetime, consuming the pipeline's current read slot and driving the
//! backend, advancing to the next slot on underrun.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{error, info, warn};

use crate::backend::{OutputBackendHandle, ThreadResult};
use crate::config::EngineConfig;
use crate::filters::FilterChain;
use crate::pipeline::Pipeline;
use crate::producer::{start_threshold_for, ControlState};

/// Backoff after a backend error before the next retry, per §4.6.
const ERROR_RETRY_MS: u64 = 24;

pub struct Worker {
    pipeline: Arc<Pipeline>,
    control: Arc<ControlState>,
    filters: Arc<Mutex<FilterChain>>,
    config: Arc<Mutex<EngineConfig>>,
    backend: OutputBackendHandle,
}

impl Worker {
    pub fn spawn(
        pipeline: Arc<Pipeline>,
        control: Arc<ControlState>,
        filters: Arc<Mutex<FilterChain>>,
        config: Arc<Mutex<EngineConfig>>,
        backend: OutputBackendHandle,
    ) -> JoinHandle<()> {
        let worker = Worker { pipeline, control, filters, config, backend };
        thread::spawn(move || worker.run())
    }

    fn run(&self) {
        'outer: loop {
            self.control.running.store(false, Ordering::Release);
            self.control.wait_until_runnable();
            if self.control.cancel.load(Ordering::Acquire) {
                break 'outer;
            }

            loop {
                if self.control.cancel.load(Ordering::Acquire) {
                    break 'outer;
                }

                self.pipeline.consume_flush_markers();

                let result = {
                    let slot = self.pipeline.read_slot();
                    let mut backend = self.backend.lock().unwrap();
                    backend.thread_iteration(&slot.buffer, &self.control.paused, &self.control.cancel)
                };

                match result {
                    ThreadResult::Running => {}
                    ThreadResult::Error(e) => {
                        error!("backend iteration failed: {e}");
                        thread::sleep(Duration::from_millis(ERROR_RETRY_MS));
                    }
                    ThreadResult::Underrun => match self.pipeline.advance_read() {
                        None => break, // nothing queued beyond the current slot: go idle.
                        Some(format_changed) => {
                            if format_changed {
                                if !self.apply_format_change() {
                                    break;
                                }
                            } else {
                                self.filters.lock().unwrap().reset();
                            }
                        }
                    },
                }

                if self.pipeline.read_slot().hw_rate() == 0 {
                    break 'outer;
                }
            }
        }
        self.control.running.store(false, Ordering::Release);
    }

    /// Re-`setup`s the backend for the newly-current read slot and resets
    /// filter state. Returns `false` if the worker should return to the
    /// outer wait (the new slot is below its start threshold).
    fn apply_format_change(&self) -> bool {
        let slot = self.pipeline.read_slot();
        let hw_rate = slot.hw_rate();
        let hw_channels = slot.hw_channels();
        let use_ac3 = slot.use_ac3();

        let setup_result = self.backend.lock().unwrap().setup(hw_rate, hw_channels, use_ac3);
        match setup_result {
            Ok(fmt) => {
                if fmt.downgraded {
                    warn!(
                        "backend downgraded format change to {} Hz / {} ch (requested {hw_rate} Hz / {hw_channels} ch)",
                        fmt.rate, fmt.channels
                    );
                    self.pipeline.set_read_hw_format(fmt.rate, fmt.channels);
                } else {
                    info!("backend re-setup for {hw_rate} Hz / {hw_channels} ch");
                }
            }
            Err(e) => {
                error!("backend setup failed on format change: {e}");
                return false;
            }
        }

        self.filters.lock().unwrap().reset();

        let slot = self.pipeline.read_slot();
        let cfg = self.config.lock().unwrap();
        let threshold = start_threshold_for(slot, &cfg);
        slot.buffer.used() >= threshold
    }
}
