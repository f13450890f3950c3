//! Look-ahead-free per-packet compressor (spec §4.3).

use std::sync::atomic::{AtomicU32, Ordering};

const I16_MAX_I32: i32 = i16::MAX as i32;

#[inline]
fn clamp_i16(v: i64) -> i16 {
    v.clamp(i16::MIN as i64, i16::MAX as i64) as i16
}

pub struct Compressor {
    cur_permille: AtomicU32,
    max_compression_permille: AtomicU32,
}

impl Compressor {
    pub fn new(max_compression_permille: u32) -> Self {
        let cur = max_compression_permille.min(2000);
        Self {
            cur_permille: AtomicU32::new(cur),
            max_compression_permille: AtomicU32::new(max_compression_permille),
        }
    }

    pub fn set_max_compression_permille(&self, max_compression: u32) {
        self.max_compression_permille
            .store(max_compression, Ordering::Relaxed);
    }

    pub fn current_permille(&self) -> u32 {
        self.cur_permille.load(Ordering::Relaxed)
    }

    /// `cur = min(2000, max_compression)`, the reset rule on format change.
    pub fn reset(&self) {
        let max = self.max_compression_permille.load(Ordering::Relaxed);
        self.cur_permille.store(max.min(2000), Ordering::Relaxed);
    }

    pub fn process(&self, samples: &mut [i16]) {
        let peak = samples.iter().map(|s| (*s as i32).unsigned_abs()).max().unwrap_or(0);
        if peak == 0 {
            return;
        }

        let target = (I16_MAX_I32 as u64 * 1000) / peak as u64;
        let target = target.min(u32::MAX as u64) as u32;

        let prev = self.cur_permille.load(Ordering::Relaxed);
        let ewma = ((prev as u64 * 950 + target as u64 * 50) / 1000) as u32;
        let max_compression = self.max_compression_permille.load(Ordering::Relaxed);
        let cur = ewma.min(target).min(max_compression);
        self.cur_permille.store(cur, Ordering::Relaxed);

        for s in samples.iter_mut() {
            *s = clamp_i16((*s as i64 * cur as i64) / 1000);
        }
    }
}

impl Default for Compressor {
    fn default() -> Self {
        Self::new(2000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silent_packet_is_a_no_op() {
        let comp = Compressor::new(2000);
        let before = comp.current_permille();
        let mut samples = [0i16; 8];
        comp.process(&mut samples);
        assert_eq!(samples, [0i16; 8]);
        assert_eq!(comp.current_permille(), before);
    }

    #[test]
    fn factor_never_exceeds_peak_derived_target() {
        let comp = Compressor::new(5000);
        let mut samples = [100i16, -8000, 200];
        comp.process(&mut samples);
        let peak = 8000u32;
        let target = (i16::MAX as u32 * 1000) / peak;
        assert!(comp.current_permille() <= target);
    }

    #[test]
    fn factor_is_bounded_by_max_compression() {
        let comp = Compressor::new(1100);
        for _ in 0..50 {
            let mut samples = [1i16, -1, 1];
            comp.process(&mut samples);
        }
        assert!(comp.current_permille() <= 1100);
    }

    #[test]
    fn reset_clamps_to_two_thousand_or_max() {
        let comp = Compressor::new(5000);
        comp.cur_permille.store(4999, Ordering::Relaxed);
        comp.reset();
        assert_eq!(comp.current_permille(), 2000);

        let comp = Compressor::new(500);
        comp.reset();
        assert_eq!(comp.current_permille(), 500);
    }
}
