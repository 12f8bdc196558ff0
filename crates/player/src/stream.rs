use native_decoder::StreamHint;
use playback_clock::{frame_ticks, Fps, Ticks};
use tracing::{error, warn};

const MIN_FRAME_RATE: f64 = 5.0;
const MAX_FRAME_RATE: f64 = 100.0;
/// Used when the configured default rate is itself unusable.
const FALLBACK_FRAME_RATE: f64 = 25.0;

/// Autosync divisor when the stream's frame rate is trusted.
const AUTOSYNC_TRUSTED: i64 = 10;
/// Autosync divisor when it is guessed: follow the clock fully.
const AUTOSYNC_GUESSED: i64 = 1;

/// Frame timing derived from a stream hint when the stream is opened.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamTiming {
    pub frame_rate: f64,
    /// Nominal duration of one frame.
    pub frame_time: Ticks,
    /// Higher means more confidence in frame durations over the clock.
    pub autosync: i64,
}

impl StreamTiming {
    pub fn from_hint(hint: &StreamHint, default_rate: f64) -> Self {
        let default_rate = if valid_rate(default_rate) {
            default_rate
        } else {
            warn!(default_rate, fallback = FALLBACK_FRAME_RATE, "configured default framerate out of range");
            FALLBACK_FRAME_RATE
        };
        let fps = Fps::new(hint.fps_rate, hint.fps_scale);
        let (mut frame_rate, mut autosync) = if hint.fps_rate > 0 && hint.fps_scale > 0 {
            (fps.as_f64(), AUTOSYNC_TRUSTED)
        } else {
            (default_rate, AUTOSYNC_GUESSED)
        };

        if !valid_rate(frame_rate) {
            error!(frame_rate, fallback = default_rate, "invalid framerate, using forced rate and trusting timestamps");
            frame_rate = default_rate;
            autosync = AUTOSYNC_GUESSED;
        }

        Self::new(frame_rate, autosync)
    }

    pub fn new(frame_rate: f64, autosync: i64) -> Self {
        Self { frame_rate, frame_time: frame_ticks(frame_rate), autosync: autosync.max(1) }
    }
}

fn valid_rate(rate: f64) -> bool { (MIN_FRAME_RATE..=MAX_FRAME_RATE).contains(&rate) }

#[cfg(test)]
mod tests {
    use super::*;
    use native_decoder::CodecId;

    fn hint(rate: u32, scale: u32) -> StreamHint {
        StreamHint::new(CodecId::Mpeg2Video, 720, 576).with_fps(rate, scale)
    }

    #[test]
    fn test_known_rate_is_trusted() {
        let t = StreamTiming::from_hint(&hint(25, 1), 25.0);
        assert_eq!(t.frame_time, 40_000);
        assert_eq!(t.autosync, 10);

        let t = StreamTiming::from_hint(&hint(30000, 1001), 25.0);
        assert_eq!(t.frame_time, 33_366);
    }

    #[test]
    fn test_unknown_rate_uses_default() {
        let t = StreamTiming::from_hint(&hint(0, 0), 25.0);
        assert_eq!(t.frame_rate, 25.0);
        assert_eq!(t.autosync, 1);
    }

    #[test]
    fn test_out_of_range_rate_is_clamped() {
        let t = StreamTiming::from_hint(&hint(1000, 1), 25.0);
        assert_eq!(t.frame_rate, 25.0);
        assert_eq!(t.autosync, 1);
        let t = StreamTiming::from_hint(&hint(1, 1), 25.0);
        assert_eq!(t.frame_time, 40_000);
    }

    #[test]
    fn test_unusable_default_rate_falls_back() {
        for default_rate in [0.0, -1.0, 1000.0, f64::NAN] {
            let t = StreamTiming::from_hint(&hint(0, 0), default_rate);
            assert_eq!(t.frame_rate, 25.0);
            assert_eq!(t.frame_time, 40_000);
        }
        let t = StreamTiming::from_hint(&hint(1000, 1), 0.0);
        assert_eq!(t.frame_rate, 25.0);
        assert_eq!(t.autosync, 1);
    }
}
