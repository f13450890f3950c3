//! Capability probe & channel remap matrix (component G, spec §4.7).
//!
//! At init, every `(rate, channels)` combination the device might be asked
//! for is probed once through the real backend's `setup`; the result is
//! folded into a 9-entry (channels 1..=8, index 0 unused) remap vector per
//! rate, consulted by `Pipeline::add_slot`'s matrix lookup.

use log::{info, warn};

use crate::backend::OutputBackend;

pub const SUPPORTED_RATES: [u32; 2] = [44_100, 48_000];
pub const MAX_CHANNELS: u8 = 8;

/// Fallback search order once `c` itself isn't supported, documented
/// per-cell in spec.md §4.7 ("1→2, 2→4→5→6→7→8, ..., 8→6→2→1").
fn fallback_order(c: u8) -> &'static [u8] {
    match c {
        1 => &[2],
        2 => &[4, 5, 6, 7, 8, 1],
        3 => &[4, 5, 6, 7, 8, 2, 1],
        4 => &[5, 6, 7, 8, 2, 1],
        5 => &[6, 7, 8, 4, 2, 1],
        6 => &[8, 7, 5, 4, 2, 1],
        7 => &[8, 6, 5, 4, 2, 1],
        8 => &[6, 2, 1],
        _ => &[],
    }
}

pub struct CapabilityMatrix {
    /// `remap[rate_index][channels]` (channels 1..=8, index 0 unused).
    remap: [[Option<u8>; 9]; SUPPORTED_RATES.len()],
}

impl CapabilityMatrix {
    pub fn rate_index(rate: u32) -> Option<usize> {
        SUPPORTED_RATES.iter().position(|&r| r == rate)
    }

    /// Probes `backend` across the full (rate, channels) grid and builds the
    /// remap vectors. The backend is left in whatever state the last probing
    /// `setup` call put it in; the caller re-`setup`s it for real traffic.
    pub fn probe(backend: &mut dyn OutputBackend) -> Self {
        let mut supported = [[false; 9]; SUPPORTED_RATES.len()];

        for (ri, &rate) in SUPPORTED_RATES.iter().enumerate() {
            for channels in 1..=MAX_CHANNELS {
                match backend.setup(rate, channels, false) {
                    Ok(fmt) if !fmt.downgraded => supported[ri][channels as usize] = true,
                    Ok(_) => {}
                    Err(e) => warn!("capability probe: {rate} Hz / {channels} ch rejected: {e}"),
                }
            }
        }

        let mut remap = [[None; 9]; SUPPORTED_RATES.len()];
        for (ri, &rate) in SUPPORTED_RATES.iter().enumerate() {
            for c in 1..=MAX_CHANNELS {
                let c = c as usize;
                remap[ri][c] = if supported[ri][c] {
                    Some(c as u8)
                } else {
                    fallback_order(c as u8)
                        .iter()
                        .find(|&&alt| supported[ri][alt as usize])
                        .copied()
                };
            }
            info!("capability probe for {rate} Hz complete: {:?}", &remap[ri][1..]);
        }

        Self { remap }
    }

    /// §4.4 Add-slot steps 1-2: look up `rate` and resolve `in_channels` to
    /// the hardware channel count to request, or `None` if the rate itself
    /// isn't in the supported table.
    pub fn resolve(&self, rate: u32, in_channels: u8) -> Option<u8> {
        let ri = Self::rate_index(rate)?;
        if !(1..=MAX_CHANNELS).contains(&in_channels) {
            return None;
        }
        self.remap[ri][in_channels as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NoopBackend;

    #[test]
    fn noop_backend_supports_every_requested_combination() {
        let mut backend = NoopBackend::new();
        let matrix = CapabilityMatrix::probe(&mut backend);
        for &rate in &SUPPORTED_RATES {
            for c in 1..=MAX_CHANNELS {
                assert_eq!(matrix.resolve(rate, c), Some(c));
            }
        }
    }

    #[test]
    fn unsupported_rate_resolves_to_none() {
        let mut backend = NoopBackend::new();
        let matrix = CapabilityMatrix::probe(&mut backend);
        assert_eq!(matrix.resolve(96_000, 2), None);
    }

    #[test]
    fn fallback_order_prefers_documented_first_choice() {
        assert_eq!(fallback_order(1)[0], 2);
        assert_eq!(fallback_order(2)[..5], [4, 5, 6, 7, 8]);
        assert_eq!(fallback_order(8), &[6, 2, 1]);
    }
}
