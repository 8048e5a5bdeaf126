//! Mix cue points: detect intro/outro windows in the sample domain, then turn
//! their starts into seconds.

use super::decode::MonoAudio;
use super::ExtractionError;

/// Rate assumed for windows whose detector didn't say which rate it used.
pub const DEFAULT_CUE_SAMPLE_RATE: u32 = 44100;

/// Half-open `[start, end)` span in samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleWindow {
    pub start: u64,
    pub end: u64,
}

/// Intro and outro windows of a whole track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CueWindows {
    pub intro: SampleWindow,
    pub outro: SampleWindow,
    /// Rate the windows are expressed in, when the detector knows it.
    pub sample_rate: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CuePoints {
    pub cue_in: f64,
    pub cue_out: f64,
}

impl CuePoints {
    /// Pull both points into `[0, duration]` and keep `cue_out >= cue_in`.
    pub fn clamp_to(self, duration_secs: f64) -> Self {
        let duration = if duration_secs.is_finite() { duration_secs.max(0.0) } else { 0.0 };
        let cue_in = finite_or_zero(self.cue_in).clamp(0.0, duration);
        let cue_out = finite_or_zero(self.cue_out).clamp(cue_in, duration);
        Self { cue_in, cue_out }
    }

    /// Whole track: mix in at the top, out at the end.
    pub fn full_track(duration_secs: f64) -> Self {
        Self { cue_in: 0.0, cue_out: duration_secs }.clamp_to(duration_secs)
    }
}

fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() { v } else { 0.0 }
}

/// Convert window starts to seconds. No clamping to the track length.
pub fn translate(windows: &CueWindows, default_rate: u32) -> CuePoints {
    let rate = windows
        .sample_rate
        .filter(|&r| r > 0)
        .unwrap_or(default_rate)
        .max(1) as f64;
    CuePoints {
        cue_in: windows.intro.start as f64 / rate,
        cue_out: windows.outro.start as f64 / rate,
    }
}

/// Finds intro/outro windows over a full decoded track.
pub trait CueDetector: Send + Sync {
    fn name(&self) -> &str;

    fn prepare(&self) -> Result<(), ExtractionError> {
        Ok(())
    }

    fn detect(&self, audio: &MonoAudio) -> Result<CueWindows, ExtractionError>;
}

/// Energy-threshold cue detector.
///
/// Splits the track into short blocks, calls a block "loud" when its RMS is at
/// least `threshold_ratio` of the loudest block, and places the intro window at
/// the first loud block and the outro window so it ends at the last one.
#[derive(Debug, Clone)]
pub struct EnergyCueDetector {
    pub block_secs: f64,
    pub threshold_ratio: f64,
    /// Length of the intro and outro windows.
    pub window_secs: f64,
}

impl Default for EnergyCueDetector {
    fn default() -> Self {
        Self {
            block_secs: 0.5,
            threshold_ratio: 0.1,
            window_secs: 16.0,
        }
    }
}

impl CueDetector for EnergyCueDetector {
    fn name(&self) -> &str {
        "energy-threshold"
    }

    fn prepare(&self) -> Result<(), ExtractionError> {
        if !(self.block_secs > 0.0 && self.window_secs > 0.0) {
            return Err(ExtractionError::Failed(
                "cue block and window lengths must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.threshold_ratio) {
            return Err(ExtractionError::Failed(format!(
                "cue threshold ratio {} outside 0..=1",
                self.threshold_ratio
            )));
        }
        Ok(())
    }

    fn detect(&self, audio: &MonoAudio) -> Result<CueWindows, ExtractionError> {
        let rate = audio.sample_rate as f64;
        let block_len = ((self.block_secs * rate) as usize).max(1);
        if audio.samples.len() < block_len {
            return Err(ExtractionError::TooShort {
                samples: audio.samples.len(),
                needed: block_len,
            });
        }

        let block_rms: Vec<f64> = audio
            .samples
            .chunks(block_len)
            .map(|block| {
                let energy: f64 = block.iter().map(|&s| (s as f64) * (s as f64)).sum();
                (energy / block.len() as f64).sqrt()
            })
            .collect();

        let peak = block_rms.iter().cloned().fold(0.0, f64::max);
        if peak <= 0.0 || !peak.is_finite() {
            return Err(ExtractionError::Silent);
        }
        let threshold = peak * self.threshold_ratio;

        let first = block_rms.iter().position(|&v| v >= threshold).unwrap_or(0);
        let last = block_rms.iter().rposition(|&v| v >= threshold).unwrap_or(first);

        let total = audio.samples.len() as u64;
        let window_len = (self.window_secs * rate) as u64;

        let intro_start = (first * block_len) as u64;
        let intro = SampleWindow {
            start: intro_start,
            end: (intro_start + window_len).min(total),
        };

        let outro_end = (((last + 1) * block_len) as u64).min(total);
        let outro = SampleWindow {
            start: outro_end.saturating_sub(window_len).max(intro_start),
            end: outro_end,
        };

        log::trace!(
            "cue windows: intro {}..{}, outro {}..{} @ {} Hz",
            intro.start, intro.end, outro.start, outro.end, audio.sample_rate
        );

        Ok(CueWindows {
            intro,
            outro,
            sample_rate: Some(audio.sample_rate),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn windows(intro_start: u64, outro_start: u64, rate: Option<u32>) -> CueWindows {
        CueWindows {
            intro: SampleWindow { start: intro_start, end: intro_start + 100 },
            outro: SampleWindow { start: outro_start, end: outro_start + 100 },
            sample_rate: rate,
        }
    }

    #[test]
    fn test_translate_uses_window_starts() {
        let cues = translate(&windows(44100, 441000, Some(44100)), DEFAULT_CUE_SAMPLE_RATE);
        assert_eq!(cues, CuePoints { cue_in: 1.0, cue_out: 10.0 });
    }

    #[test]
    fn test_translate_falls_back_to_default_rate() {
        let cues = translate(&windows(22050, 88200, None), DEFAULT_CUE_SAMPLE_RATE);
        assert_eq!(cues, CuePoints { cue_in: 0.5, cue_out: 2.0 });

        let zero_rate = translate(&windows(22050, 88200, Some(0)), 22050);
        assert_eq!(zero_rate, CuePoints { cue_in: 1.0, cue_out: 4.0 });
    }

    #[test]
    fn test_translate_does_not_clamp() {
        let cues = translate(&windows(0, 44100 * 500, Some(44100)), DEFAULT_CUE_SAMPLE_RATE);
        assert_eq!(cues.cue_out, 500.0);
    }

    #[test]
    fn test_clamp_to_duration() {
        let c = CuePoints { cue_in: 5.0, cue_out: 500.0 }.clamp_to(200.0);
        assert_eq!(c, CuePoints { cue_in: 5.0, cue_out: 200.0 });

        let inverted = CuePoints { cue_in: 50.0, cue_out: 10.0 }.clamp_to(200.0);
        assert_eq!(inverted, CuePoints { cue_in: 50.0, cue_out: 50.0 });

        let bad = CuePoints { cue_in: f64::NAN, cue_out: -3.0 }.clamp_to(60.0);
        assert_eq!(bad, CuePoints { cue_in: 0.0, cue_out: 0.0 });

        assert_eq!(CuePoints::full_track(42.0), CuePoints { cue_in: 0.0, cue_out: 42.0 });
    }

    #[test]
    fn test_energy_detector_skips_silent_edges() {
        let rate = 1000;
        // 4 s silence, 60 s signal, 6 s silence
        let mut samples = vec![0.0f32; 4 * rate];
        samples.extend(std::iter::repeat_n(0.5f32, 60 * rate));
        samples.extend(std::iter::repeat_n(0.0f32, 6 * rate));
        let audio = MonoAudio { samples, sample_rate: rate as u32 };

        let w = EnergyCueDetector::default().detect(&audio).unwrap();
        assert_eq!(w.sample_rate, Some(1000));
        assert_eq!(w.intro.start, 4000);
        assert_eq!(w.intro.end, 20000);
        assert_eq!(w.outro.end, 64000);
        assert_eq!(w.outro.start, 48000);

        let cues = translate(&w, DEFAULT_CUE_SAMPLE_RATE);
        assert_eq!(cues, CuePoints { cue_in: 4.0, cue_out: 48.0 });
    }

    #[test]
    fn test_energy_detector_short_loud_track() {
        let audio = MonoAudio { samples: vec![0.3; 5000], sample_rate: 1000 };
        let w = EnergyCueDetector::default().detect(&audio).unwrap();
        assert_eq!(w.intro.start, 0);
        assert_eq!(w.outro.start, 0);
        assert_eq!(w.outro.end, 5000);
    }

    #[test]
    fn test_energy_detector_rejects_silence() {
        let audio = MonoAudio { samples: vec![0.0; 10_000], sample_rate: 1000 };
        assert_eq!(EnergyCueDetector::default().detect(&audio), Err(ExtractionError::Silent));
    }

    #[test]
    fn test_prepare_validates() {
        assert!(EnergyCueDetector::default().prepare().is_ok());
        let bad = EnergyCueDetector { threshold_ratio: 2.0, ..Default::default() };
        assert!(bad.prepare().is_err());
    }
}
