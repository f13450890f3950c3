//! Software amplifier (spec §4.3). Gain and mute are read from atomics so the
//! producer thread can update volume without a lock on the hot enqueue path,
//! mirroring how the teacher engine keeps `volume_bits`/`preamp_db_bits` as
//! atomics read directly inside the per-sample loop.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

#[inline]
fn clamp_i16(v: i32) -> i16 {
    v.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

pub struct Amplifier {
    gain_permille: AtomicU32,
    mute: AtomicBool,
}

impl Amplifier {
    pub fn new() -> Self {
        Self {
            gain_permille: AtomicU32::new(1000),
            mute: AtomicBool::new(false),
        }
    }

    pub fn set_gain_permille(&self, gain: u32) {
        self.gain_permille.store(gain, Ordering::Relaxed);
    }

    pub fn gain_permille(&self) -> u32 {
        self.gain_permille.load(Ordering::Relaxed)
    }

    pub fn set_mute(&self, mute: bool) {
        self.mute.store(mute, Ordering::Relaxed);
    }

    pub fn is_muted(&self) -> bool {
        self.mute.load(Ordering::Relaxed)
    }

    /// In-place gain application: `s <- clamp(s * gain / 1000)`, or silence
    /// when muted or the gain is zero.
    pub fn process(&self, samples: &mut [i16]) {
        let gain = self.gain_permille.load(Ordering::Relaxed);
        if self.mute.load(Ordering::Relaxed) || gain == 0 {
            samples.fill(0);
            return;
        }
        if gain == 1000 {
            return;
        }
        for s in samples.iter_mut() {
            *s = clamp_i16((*s as i32 * gain as i32) / 1000);
        }
    }
}

impl Default for Amplifier {
    fn default() -> Self {
        Self::new()
    }
}

/// `clamp(volume - stereo_descent, 0, 1000)`, the effective gain rule tested
/// by spec §8's `SetVolume`/stereo-descent invariant.
pub fn effective_gain_permille(volume: u32, stereo_descent: u32) -> u32 {
    volume.saturating_sub(stereo_descent).min(1000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mute_forces_silence() {
        let amp = Amplifier::new();
        amp.set_mute(true);
        let mut samples = [100i16, -100, 32767];
        amp.process(&mut samples);
        assert_eq!(samples, [0, 0, 0]);
    }

    #[test]
    fn zero_gain_forces_silence() {
        let amp = Amplifier::new();
        amp.set_gain_permille(0);
        let mut samples = [100i16, -100];
        amp.process(&mut samples);
        assert_eq!(samples, [0, 0]);
    }

    #[test]
    fn half_gain_halves_samples() {
        let amp = Amplifier::new();
        amp.set_gain_permille(500);
        let mut samples = [1000i16, -1000];
        amp.process(&mut samples);
        assert_eq!(samples, [500, -500]);
    }

    #[test]
    fn gain_application_clamps_to_i16_range() {
        let amp = Amplifier::new();
        amp.set_gain_permille(2000);
        let mut samples = [30000i16];
        amp.process(&mut samples);
        assert_eq!(samples, [i16::MAX]);
    }

    #[test]
    fn effective_gain_matches_volume_minus_descent_clamped() {
        assert_eq!(effective_gain_permille(1000, 100), 900);
        assert_eq!(effective_gain_permille(50, 100), 0);
        assert_eq!(effective_gain_permille(1500, 0), 1000);
    }
}
