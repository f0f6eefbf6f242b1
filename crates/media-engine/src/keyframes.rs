//! Keyframe timing and cut planning.

use cliprelay_common::config::ExtractionMode;
use cliprelay_timeline::TrimWindow;

/// Parse `ffprobe -show_entries frame=pts_time -of csv=p=0` output.
///
/// Returns sorted, de-duplicated keyframe times. Lines that do not parse
/// (`N/A`, blank) are skipped.
pub fn parse_keyframe_times(output: &str) -> Vec<f64> {
    let mut times: Vec<f64> = output
        .lines()
        .filter_map(|line| line.trim().trim_end_matches(',').parse::<f64>().ok())
        .filter(|t| t.is_finite() && *t >= 0.0)
        .collect();
    times.sort_by(f64::total_cmp);
    times.dedup_by(|a, b| (*a - *b).abs() < 1e-9);
    times
}

/// Latest keyframe at or before `t`; 0 when none precedes it.
pub fn keyframe_at_or_before(keyframes: &[f64], t: f64) -> f64 {
    let idx = keyframes.partition_point(|k| *k <= t + 1e-6);
    if idx == 0 {
        0.0
    } else {
        keyframes[idx - 1]
    }
}

/// How one usage is cut out of its source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CutPlan {
    /// Input seek position in seconds.
    pub seek: f64,
    /// Seconds to copy from `seek`.
    pub length: f64,
    /// Leading bleed the consumer must skip.
    pub adjustment: f64,
    /// Stream copy instead of re-encoding.
    pub stream_copy: bool,
}

impl CutPlan {
    /// Plan a cut for `window`.
    ///
    /// Fast mode without keyframe data degrades to an exact cut, since any
    /// other choice would report a wrong adjustment.
    pub fn for_window(mode: ExtractionMode, window: TrimWindow, keyframes: Option<&[f64]>) -> Self {
        let duration = window.duration();
        match (mode, keyframes) {
            (ExtractionMode::Fast, Some(keyframes)) => {
                let seek = keyframe_at_or_before(keyframes, window.in_point);
                let bleed = (window.in_point - seek).max(0.0);
                Self {
                    seek,
                    length: duration + bleed,
                    adjustment: bleed,
                    stream_copy: true,
                }
            }
            _ => Self {
                seek: window.in_point,
                length: duration,
                adjustment: 0.0,
                stream_copy: false,
            },
        }
    }
}
