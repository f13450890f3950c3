//! Audio output engine for a video playback stack: buffers decoded PCM (or
//! AC3 passthrough) from a decoder, remixes/filters it to a format the
//! output device accepts, feeds a hardware playback device, and exposes an
//! audio clock synchronized against a video presentation clock.
//!
//! [`Engine`] is the single entry point; everything else is an internal
//! collaborator reached through it.

pub mod backend;
pub mod capability;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod filters;
pub mod pipeline;
pub mod producer;
pub mod ringbuf;
pub mod worker;

pub use clock::{Pts, NO_PTS};
pub use config::EngineConfig;
pub use engine::{BackendKind, Engine};
pub use error::AudioError;
