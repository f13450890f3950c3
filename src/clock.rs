//! PTS arithmetic, centralized. The engine's clock domain is 90 kHz throughout
//! (spec.md §6 "Timestamp units"); every component that advances or reads a
//! timestamp goes through here instead of repeating the `90_000 / (rate*ch*bps)`
//! conversion inline.

/// Sentinel for "no timestamp", matches `INT64_MIN` from the source design.
pub const NO_PTS: i64 = i64::MIN;

/// Bytes per sample for the 16-bit PCM wire format (§6).
pub const BYTES_PER_SAMPLE: u32 = 2;

pub type Pts = i64;

/// Converts a byte count in a given hardware format to a duration in 1/90000s units.
#[inline]
pub fn bytes_to_pts(bytes: u64, hw_rate: u32, hw_channels: u8) -> i64 {
    let bytes_per_frame = hw_channels as u64 * BYTES_PER_SAMPLE as u64;
    if bytes_per_frame == 0 || hw_rate == 0 {
        return 0;
    }
    // frames * 90000 / rate, done in one division against bytes to avoid losing
    // fractional frames when `bytes` isn't frame-aligned.
    ((bytes * 90_000) / (hw_rate as u64 * bytes_per_frame)) as i64
}

/// Advances a PTS by the duration represented by `count` bytes already written
/// in hardware format, honoring the `NO_PTS` sentinel (§4.5 Enqueue step 6).
#[inline]
pub fn advance(pts: Pts, count: u64, hw_rate: u32, hw_channels: u8) -> Pts {
    if pts == NO_PTS {
        return NO_PTS;
    }
    pts.wrapping_add(bytes_to_pts(count, hw_rate, hw_channels))
}

/// Rounds a byte count down to the nearest whole frame for `channels` channels
/// of 16-bit samples, used when converting a skip duration into a byte count
/// that must land on a frame boundary (§4.5 VideoReady).
#[inline]
pub fn round_down_to_frame(bytes: i64, channels: u8) -> i64 {
    let frame = channels as i64 * BYTES_PER_SAMPLE as i64;
    if frame == 0 {
        return 0;
    }
    (bytes / frame) * frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_pts_is_sticky() {
        assert_eq!(advance(NO_PTS, 1000, 48_000, 2), NO_PTS);
    }

    #[test]
    fn advances_by_expected_amount() {
        // 1 second of 48kHz stereo 16-bit audio is 48000*2*2 bytes, i.e. 90000 pts units.
        let bytes = 48_000u64 * 2 * 2;
        let pts = advance(0, bytes, 48_000, 2);
        assert_eq!(pts, 90_000);
    }

    #[test]
    fn frame_rounding_truncates_partial_frames() {
        // frame = 4 bytes (2ch * 2 bytes); 10 bytes -> 2 whole frames -> 8 bytes.
        assert_eq!(round_down_to_frame(10, 2), 8);
        assert_eq!(round_down_to_frame(0, 2), 0);
    }
}
