//! Windowed block-average RMS normalizer (spec §4.3). Filter state here is
//! process-global and single-producer — unlike the amplifier/compressor it
//! is not shared with any other thread, so plain fields behind `&mut self`
//! are enough; no atomics needed.

const BLOCK_SIZE: u32 = 4096;
const TABLE_LEN: usize = 128;
const MIN_NORM_PERMILLE: u32 = 100;

#[inline]
fn clamp_i16(v: i64) -> i16 {
    v.clamp(i16::MIN as i64, i16::MAX as i64) as i16
}

pub struct Normalizer {
    table: [u64; TABLE_LEN],
    block_sum: u64,
    block_count: u32,
    idx: usize,
    ready_blocks: u32,
    cur_permille: u32,
    max_norm_permille: u32,
}

impl Normalizer {
    pub fn new(max_norm_permille: u32) -> Self {
        Self {
            table: [0; TABLE_LEN],
            block_sum: 0,
            block_count: 0,
            idx: 0,
            ready_blocks: 0,
            cur_permille: 1000,
            max_norm_permille,
        }
    }

    pub fn set_max_norm_permille(&mut self, max_norm: u32) {
        self.max_norm_permille = max_norm;
    }

    pub fn current_permille(&self) -> u32 {
        self.cur_permille
    }

    pub fn is_warm(&self) -> bool {
        self.ready_blocks as usize >= TABLE_LEN
    }

    /// Zeros the table, `idx=0`, `ready=0`, `cur=1000`.
    pub fn reset(&mut self) {
        self.table = [0; TABLE_LEN];
        self.block_sum = 0;
        self.block_count = 0;
        self.idx = 0;
        self.ready_blocks = 0;
        self.cur_permille = 1000;
    }

    /// Applies the *pre-update* factor across the whole packet, then updates
    /// the running block accumulator (and, once warm, recomputes the factor)
    /// based on the original, pre-gain samples.
    pub fn process(&mut self, samples: &mut [i16]) {
        let cur = self.cur_permille;
        for s in samples.iter_mut() {
            let orig = *s as i64;
            if cur != 1000 {
                *s = clamp_i16(orig * cur as i64 / 1000);
            }

            self.block_sum = self.block_sum.saturating_add((orig * orig) as u64);
            self.block_count += 1;
            if self.block_count == BLOCK_SIZE {
                self.complete_block();
            }
        }
    }

    fn complete_block(&mut self) {
        let avg = self.block_sum / BLOCK_SIZE as u64;
        self.table[self.idx] = avg;
        self.idx = (self.idx + 1) % TABLE_LEN;
        self.table[self.idx] = 0;
        self.block_sum = 0;
        self.block_count = 0;

        if self.ready_blocks < TABLE_LEN as u32 {
            self.ready_blocks += 1;
        }
        if !self.is_warm() {
            return;
        }

        let sum: u128 = self.table.iter().map(|&v| v as u128).sum();
        let avg_sq = (sum / TABLE_LEN as u128) as f64;
        let rms = avg_sq.sqrt().max(1.0);
        let target = ((i16::MAX as f64 / 8.0) * 1000.0 / rms).round();
        let target = target.clamp(0.0, u32::MAX as f64) as u32;

        let new_cur = ((self.cur_permille as u64 * 500 + target as u64 * 500) / 1000) as u32;
        self.cur_permille = new_cur.clamp(MIN_NORM_PERMILLE, self.max_norm_permille.max(MIN_NORM_PERMILLE));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warmup_holds_factor_at_one_thousand() {
        let mut norm = Normalizer::new(2000);
        let mut buf = vec![3000i16; 4096];
        // 127 blocks: still in warmup.
        for _ in 0..127 {
            norm.process(&mut buf);
            assert_eq!(norm.current_permille(), 1000);
        }
        assert!(!norm.is_warm());
    }

    #[test]
    fn becomes_warm_after_128_blocks() {
        let mut norm = Normalizer::new(2000);
        let mut buf = vec![3000i16; 4096];
        for _ in 0..128 {
            norm.process(&mut buf);
        }
        assert!(norm.is_warm());
    }

    #[test]
    fn factor_is_clamped_to_norm_range() {
        let mut norm = Normalizer::new(1500);
        // Very quiet signal should try to push the factor up, but it must
        // never exceed max_norm.
        let mut buf = vec![1i16; 4096];
        for _ in 0..200 {
            norm.process(&mut buf);
        }
        assert!(norm.current_permille() <= 1500);
        assert!(norm.current_permille() >= 100);
    }

    #[test]
    fn reset_returns_to_defaults() {
        let mut norm = Normalizer::new(2000);
        let mut buf = vec![3000i16; 4096];
        for _ in 0..128 {
            norm.process(&mut buf);
        }
        norm.reset();
        assert_eq!(norm.current_permille(), 1000);
        assert!(!norm.is_warm());
    }

    #[test]
    fn silence_does_not_panic_on_sqrt() {
        let mut norm = Normalizer::new(2000);
        let mut buf = vec![0i16; 4096];
        for _ in 0..128 {
            norm.process(&mut buf);
        }
        assert!(norm.current_permille() <= 2000);
    }
}
