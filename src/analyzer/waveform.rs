//! Preview waveform: a fixed number of RMS bars normalised to `[0, 1]`.
//!
//! Display only. Nothing downstream analyses these values.

/// Bars drawn by the player UI.
pub const DEFAULT_BARS: usize = 250;

/// Shortest RMS frame in samples. Frames are centred on their hop, with zero
/// padding past either end of the signal.
pub const FRAME_LENGTH: usize = 2048;

/// Decimal digits kept per bar.
const PRECISION: f64 = 1000.0;

/// Reduce a low-rate signal to exactly `target_bars` normalised RMS bars.
///
/// The hop is `ceil(len / target_bars)`, so the frames always reach the end of
/// the signal; whatever lies past it is zero padding. Each frame spans at
/// least one hop. Bars are min-max normalised when the loudest bar is above
/// zero; silence stays all zeros, and a perfectly flat non-zero signal becomes
/// all ones.
pub fn downsample(signal: &[f32], target_bars: usize) -> Vec<f64> {
    if signal.is_empty() || target_bars == 0 {
        return Vec::new();
    }

    let hop = signal.len().div_ceil(target_bars);
    let frame_len = FRAME_LENGTH.max(hop);
    let half = frame_len / 2;

    let rms: Vec<f64> = (0..target_bars)
        .map(|frame| {
            let center = frame * hop + hop / 2;
            let start = center.saturating_sub(half).min(signal.len());
            let end = (center + half).min(signal.len()).max(start);
            let energy: f64 = signal[start..end]
                .iter()
                .map(|&s| (s as f64) * (s as f64))
                .sum();
            // Padding counts toward the frame length
            (energy / frame_len as f64).sqrt()
        })
        .collect();

    normalize(&rms)
}

fn normalize(rms: &[f64]) -> Vec<f64> {
    let max = rms.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let min = rms.iter().cloned().fold(f64::INFINITY, f64::min);

    if max.is_nan() || max <= 0.0 {
        return rms.iter().map(|v| round(*v)).collect();
    }
    let range = max - min;
    if range <= 0.0 {
        return vec![1.0; rms.len()];
    }
    rms.iter().map(|v| round((v - min) / range)).collect()
}

fn round(v: f64) -> f64 {
    (v * PRECISION).round() / PRECISION
}
