/// SQLite stores playback positions in ticks: 10,000,000 per second.
pub const TICKS_PER_SECOND: i64 = 10_000_000;

/// Tolerance for treating two pause events as the same moment (±0.1s).
pub const DEDUP_WINDOW_TICKS: i64 = TICKS_PER_SECOND / 10;

pub fn ticks_to_seconds(ticks: i64) -> f64 {
    ticks as f64 / TICKS_PER_SECOND as f64
}

pub fn seconds_to_ticks(seconds: f64) -> i64 {
    (seconds * TICKS_PER_SECOND as f64) as i64
}

/// Evenly spaced sample offsets (in seconds) across a window centered on the
/// pause point. Candidates at or before the start of the video are dropped,
/// so the result can be shorter than `count`, or empty for a pause right at
/// the beginning.
///
/// `count == 1` degenerates to a single sample at the pivot.
pub fn sample_offsets(pivot_secs: f64, window_secs: f64, count: usize) -> Vec<f64> {
    let candidates: Vec<f64> = match count {
        0 => Vec::new(),
        1 => vec![pivot_secs],
        n => (0..n)
            .map(|i| {
                pivot_secs - window_secs / 2.0
                    + i as f64 * (window_secs / (n as f64 - 1.0))
            })
            .collect(),
    };

    candidates.into_iter().filter(|t| *t > 0.0).collect()
}
