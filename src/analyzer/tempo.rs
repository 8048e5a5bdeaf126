//! Per-chunk tempo estimation.
//!
//! The engine only depends on [`TempoEstimator`]. The default
//! [`StratumTempoEstimator`] hands the chunk to `stratum-dsp`, which runs
//! onset detection, autocorrelation and a comb filterbank over it.

use super::ExtractionError;
use stratum_dsp::{analyze_audio, AnalysisConfig};

/// Produces one tempo vote (BPM) for a chunk of mono audio.
pub trait TempoEstimator: Send + Sync {
    fn name(&self) -> &str;

    /// Check parameters / load resources. Called once by the engine's `load()`.
    fn prepare(&self) -> Result<(), ExtractionError> {
        Ok(())
    }

    fn estimate(&self, samples: &[f32], sample_rate: u32) -> Result<f64, ExtractionError>;
}

/// Chunks shorter than this carry too few beats to vote.
const MIN_CHUNK_SECS: f64 = 4.0;
/// Peak amplitude below this counts as silence.
const SILENCE_PEAK: f32 = 1e-4;

/// Tempo estimator backed by `stratum_dsp::analyze_audio`.
#[derive(Debug, Clone)]
pub struct StratumTempoEstimator {
    pub min_bpm: f32,
    pub max_bpm: f32,
}

impl Default for StratumTempoEstimator {
    fn default() -> Self {
        let config = AnalysisConfig::default();
        Self {
            min_bpm: config.min_bpm,
            max_bpm: config.max_bpm,
        }
    }
}

impl StratumTempoEstimator {
    fn config(&self) -> AnalysisConfig {
        let mut config = AnalysisConfig::default();
        config.min_bpm = self.min_bpm;
        config.max_bpm = self.max_bpm;
        config
    }
}

impl TempoEstimator for StratumTempoEstimator {
    fn name(&self) -> &str {
        "stratum-dsp"
    }

    fn prepare(&self) -> Result<(), ExtractionError> {
        if !(self.min_bpm > 0.0 && self.min_bpm < self.max_bpm) {
            return Err(ExtractionError::Failed(format!(
                "invalid tempo range {}..{}",
                self.min_bpm, self.max_bpm
            )));
        }
        Ok(())
    }

    fn estimate(&self, samples: &[f32], sample_rate: u32) -> Result<f64, ExtractionError> {
        if sample_rate == 0 {
            return Err(ExtractionError::Failed("sample rate is zero".to_string()));
        }
        let needed = (MIN_CHUNK_SECS * sample_rate as f64).ceil() as usize;
        if samples.len() < needed {
            return Err(ExtractionError::TooShort {
                samples: samples.len(),
                needed,
            });
        }
        if samples.iter().all(|s| s.abs() < SILENCE_PEAK) {
            return Err(ExtractionError::Silent);
        }

        let result = analyze_audio(samples, sample_rate, self.config())
            .map_err(|e| ExtractionError::Failed(format!("BPM analysis failed: {e}")))?;

        let bpm = result.bpm as f64;
        log::trace!(
            "stratum-dsp: {:.2} BPM (confidence {:.2})",
            bpm,
            result.bpm_confidence
        );
        if bpm.is_finite() && bpm > 0.0 {
            Ok(bpm)
        } else {
            Err(ExtractionError::Failed("no periodicity found".to_string()))
        }
    }
}
