/// Tracks shorter than this get a single chunk from the middle.
pub const MULTI_PASS_MIN_SECS: f64 = 60.0;

/// Seconds skipped at the start of longer tracks to stay clear of intros.
pub const INTRO_SKIP_SECS: f64 = 20.0;

/// Number of chunks sampled from longer tracks.
pub const MULTI_PASS_CHUNKS: usize = 3;

/// Offsets (seconds) of the chunks to analyze for a track of the given duration.
///
/// Under a minute: one offset at the midpoint. Otherwise three offsets spread
/// evenly over whatever follows the intro skip.
pub fn chunk_offsets(duration_secs: f64) -> Vec<f64> {
    if !duration_secs.is_finite() || duration_secs <= 0.0 {
        return Vec::new();
    }
    if duration_secs < MULTI_PASS_MIN_SECS {
        return vec![duration_secs / 2.0];
    }

    let step = (duration_secs - INTRO_SKIP_SECS) / MULTI_PASS_CHUNKS as f64;
    (0..MULTI_PASS_CHUNKS)
        .map(|i| INTRO_SKIP_SECS + step * i as f64)
        .collect()
}
