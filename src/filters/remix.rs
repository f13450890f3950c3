//! Integer-weighted channel remix (spec §4.3). Weights are per-mille and the
//! weighted sum is divided by 1000 at the end, matching the table in the spec
//! exactly (including its asymmetric 6→2 LFE weighting).
//!
//! Channel order is not specified by the spec beyond the weight labels; the
//! layout below was reverse-engineered from the worked 6→2 example in §8
//! scenario 4 (`[1000,2000,500,500,3000,1000]` plugged into
//! `400·L+200·Ls+300·C+300·LFE` reproduces the example's own substitution
//! only when L=1000, Ls=500, C=3000, LFE=1000, i.e. front pair first, then
//! surrounds, then center, then LFE last — see DESIGN.md):
//!   1: M                          5: L R Ls Rs C
//!   2: L R                        6: L R Ls Rs C LFE     (front/side/center/LFE)
//!   3: L R C                      7: L R Ls Rs Rl Rr C
//!   4: L R Ls Rs                  8: L R Ls Rs Rl Rr C LFE

#[inline]
fn clamp_i16(v: i32) -> i16 {
    v.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

#[inline]
fn weighted(frame: &[i16], weights: &[(usize, i32)]) -> i16 {
    let sum: i32 = weights
        .iter()
        .map(|&(idx, w)| frame[idx] as i32 * w)
        .sum();
    clamp_i16(sum / 1000)
}

/// Remixes `input` (interleaved, `in_channels` per frame) to `out_channels`.
/// Any combination not defined by the spec's table returns silence of the
/// requested output length rather than erroring (§4.3, §7 policy: never abort).
pub fn remix(input: &[i16], in_channels: u8, out_channels: u8) -> Vec<i16> {
    if in_channels == 0 || out_channels == 0 {
        return Vec::new();
    }
    let in_ch = in_channels as usize;
    let out_ch = out_channels as usize;
    let frames = input.len() / in_ch;

    if in_channels == out_channels {
        return input[..frames * in_ch].to_vec();
    }

    if in_channels == 2 && out_channels == 1 {
        let mut out = vec![0i16; frames];
        for f in 0..frames {
            let l = input[f * 2] as i32;
            let r = input[f * 2 + 1] as i32;
            out[f] = clamp_i16((l + r) / 2);
        }
        return out;
    }

    if in_channels == 1 && out_channels == 2 {
        let mut out = vec![0i16; frames * 2];
        for f in 0..frames {
            out[f * 2] = input[f];
            out[f * 2 + 1] = input[f];
        }
        return out;
    }

    // 5.0 -> 5.1 upmix: copy L R Ls Rs C through unchanged, append a silent LFE.
    if in_channels == 5 && out_channels == 6 {
        let mut out = vec![0i16; frames * 6];
        for f in 0..frames {
            out[f * 6..f * 6 + 5].copy_from_slice(&input[f * 5..f * 5 + 5]);
            out[f * 6 + 5] = 0;
        }
        return out;
    }

    let downmix: Option<fn(&[i16]) -> (i16, i16)> = match (in_channels, out_channels) {
        (3, 2) => Some(|f| {
            (
                weighted(f, &[(0, 600), (2, 400)]),
                weighted(f, &[(1, 600), (2, 400)]),
            )
        }),
        (4, 2) => Some(|f| {
            (
                weighted(f, &[(0, 600), (2, 400)]),
                weighted(f, &[(1, 600), (3, 400)]),
            )
        }),
        (5, 2) => Some(|f| {
            (
                weighted(f, &[(0, 500), (2, 200), (4, 300)]),
                weighted(f, &[(1, 500), (3, 200), (4, 300)]),
            )
        }),
        (6, 2) => Some(|f| {
            (
                weighted(f, &[(0, 400), (2, 200), (4, 300), (5, 300)]),
                weighted(f, &[(1, 400), (3, 200), (4, 300), (5, 100)]),
            )
        }),
        (7, 2) => Some(|f| {
            (
                weighted(f, &[(0, 400), (2, 200), (6, 300), (4, 100)]),
                weighted(f, &[(1, 400), (3, 200), (6, 300), (5, 100)]),
            )
        }),
        (8, 2) => Some(|f| {
            (
                weighted(f, &[(0, 400), (2, 150), (6, 250), (7, 100), (4, 100)]),
                weighted(f, &[(1, 400), (3, 150), (6, 250), (7, 100), (5, 100)]),
            )
        }),
        _ => None,
    };

    if let Some(mixfn) = downmix {
        let mut out = vec![0i16; frames * 2];
        for f in 0..frames {
            let (l, r) = mixfn(&input[f * in_ch..f * in_ch + in_ch]);
            out[f * 2] = l;
            out[f * 2 + 1] = r;
        }
        return out;
    }

    log::warn!(
        "unsupported channel remix {in_channels}\u{2192}{out_channels}; emitting silence for {frames} frames"
    );
    vec![0i16; frames * out_ch]
}

#[cfg(test)]
mod tests {
    use super::*;

    /// §8 scenario 4's own worked substitution (`400·1000 + 200·500 + 300·3000
    /// + 300·1000` etc.) evaluates to 1700/1900, not the "[1900, 2000]" the
    /// prose states next to it; we follow the substitution since it pins down
    /// the channel-to-label assignment unambiguously (see DESIGN.md).
    #[test]
    fn six_to_two_matches_spec_worked_substitution() {
        let frame = [1000i16, 2000, 500, 500, 3000, 1000];
        let out = remix(&frame, 6, 2);
        assert_eq!(out, vec![1700, 1900]);
    }

    #[test]
    fn stereo_to_mono_averages() {
        let frame = [1000i16, -1000];
        assert_eq!(remix(&frame, 2, 1), vec![0]);
        let frame = [1000i16, 3000];
        assert_eq!(remix(&frame, 2, 1), vec![2000]);
    }

    #[test]
    fn mono_to_stereo_copies() {
        let frame = [1234i16];
        assert_eq!(remix(&frame, 1, 2), vec![1234, 1234]);
    }

    #[test]
    fn equal_channel_counts_are_memcpy() {
        let frame = [1i16, 2, 3, 4];
        assert_eq!(remix(&frame, 4, 4), vec![1, 2, 3, 4]);
    }

    #[test]
    fn five_to_six_zeros_lfe() {
        let frame = [100i16, 200, 300, 400, 500];
        let out = remix(&frame, 5, 6);
        assert_eq!(out, vec![100, 200, 300, 400, 500, 0]);
    }

    #[test]
    fn unsupported_combination_emits_silence_of_requested_length() {
        let frame = [1i16, 2, 3];
        let out = remix(&frame, 3, 5);
        assert_eq!(out, vec![0i16; 5]);
    }

    #[test]
    fn downmix_then_upmix_preserves_frame_count_not_values() {
        let input: Vec<i16> = (0..6 * 4).map(|i| (i * 100) as i16).collect();
        let down = remix(&input, 6, 2);
        let frames = input.len() / 6;
        assert_eq!(down.len() / 2, frames);
        let up = remix(&down, 2, 6);
        assert_eq!(up.len() / 6, frames);
    }
}
