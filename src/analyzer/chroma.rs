//! Chromagram extraction for key estimation.

use super::ExtractionError;
use rustfft::{num_complex::Complex, FftPlanner};
use std::f64::consts::PI;

/// Produces a chromagram (one 12-bin pitch-class frame per analysis window)
/// for a chunk of mono audio.
pub trait ChromaExtractor: Send + Sync {
    fn name(&self) -> &str;

    fn prepare(&self) -> Result<(), ExtractionError> {
        Ok(())
    }

    fn extract(&self, samples: &[f32], sample_rate: u32)
        -> Result<Vec<[f64; 12]>, ExtractionError>;
}

/// Short-time FFT chromagram, 12-TET at A4 = 440 Hz.
///
/// Spectral power between `min_freq` and `max_freq` is folded onto pitch
/// classes, and each frame is scaled so its loudest class is 1.0.
#[derive(Debug, Clone)]
pub struct FftChromaExtractor {
    pub fft_size: usize,
    pub hop_size: usize,
    pub min_freq: f64,
    pub max_freq: f64,
}

impl Default for FftChromaExtractor {
    fn default() -> Self {
        Self {
            fft_size: 4096,
            hop_size: 2048,
            min_freq: 65.0,
            max_freq: 2000.0,
        }
    }
}

impl FftChromaExtractor {
    fn pitch_class_of_bins(&self, sample_rate: u32) -> Vec<Option<usize>> {
        (0..self.fft_size / 2 + 1)
            .map(|bin| {
                let freq = bin as f64 * sample_rate as f64 / self.fft_size as f64;
                if freq < self.min_freq || freq > self.max_freq {
                    return None;
                }
                // Semitones from A4, shifted so C = 0
                let semitones = 12.0 * (freq / 440.0).log2();
                Some((semitones.round() as i64 + 9).rem_euclid(12) as usize)
            })
            .collect()
    }
}

impl ChromaExtractor for FftChromaExtractor {
    fn name(&self) -> &str {
        "stft-chroma"
    }

    fn prepare(&self) -> Result<(), ExtractionError> {
        if self.fft_size < 2 || self.hop_size == 0 {
            return Err(ExtractionError::Failed(format!(
                "invalid chroma frame {} / hop {}",
                self.fft_size, self.hop_size
            )));
        }
        if !(self.min_freq > 0.0 && self.min_freq < self.max_freq) {
            return Err(ExtractionError::Failed(format!(
                "invalid chroma band {}..{} Hz",
                self.min_freq, self.max_freq
            )));
        }
        Ok(())
    }

    fn extract(
        &self,
        samples: &[f32],
        sample_rate: u32,
    ) -> Result<Vec<[f64; 12]>, ExtractionError> {
        if sample_rate == 0 {
            return Err(ExtractionError::Failed("sample rate is zero".to_string()));
        }
        if samples.len() < self.fft_size {
            return Err(ExtractionError::TooShort {
                samples: samples.len(),
                needed: self.fft_size,
            });
        }

        let mut planner = FftPlanner::<f64>::new();
        let fft = planner.plan_fft_forward(self.fft_size);

        let window: Vec<f64> = (0..self.fft_size)
            .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f64 / (self.fft_size - 1) as f64).cos()))
            .collect();
        let bins = self.pitch_class_of_bins(sample_rate);

        let n_frames = (samples.len() - self.fft_size) / self.hop_size + 1;
        let mut chromagram = Vec::with_capacity(n_frames);
        let mut buffer = vec![Complex::new(0.0, 0.0); self.fft_size];

        for frame_idx in 0..n_frames {
            let start = frame_idx * self.hop_size;
            let frame = &samples[start..start + self.fft_size];
            for ((slot, &s), w) in buffer.iter_mut().zip(frame).zip(&window) {
                *slot = Complex::new(s as f64 * w, 0.0);
            }
            fft.process(&mut buffer);

            let mut chroma = [0.0f64; 12];
            for (bin, pc) in bins.iter().enumerate() {
                if let Some(pc) = pc {
                    chroma[*pc] += buffer[bin].norm_sqr();
                }
            }

            let peak = chroma.iter().cloned().fold(0.0, f64::max);
            if peak > 0.0 && peak.is_finite() {
                for v in chroma.iter_mut() {
                    *v /= peak;
                }
            }
            chromagram.push(chroma);
        }

        Ok(chromagram)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::key::estimate_key;

    fn tone(freqs: &[f64], sample_rate: u32, secs: f64) -> Vec<f32> {
        let n = (sample_rate as f64 * secs) as usize;
        (0..n)
            .map(|i| {
                let t = i as f64 / sample_rate as f64;
                let sum: f64 = freqs.iter().map(|f| (2.0 * PI * f * t).sin()).sum();
                (sum / freqs.len() as f64) as f32
            })
            .collect()
    }

    #[test]
    fn test_a440_lands_on_a() {
        let chroma = FftChromaExtractor::default()
            .extract(&tone(&[440.0], 22050, 1.0), 22050)
            .unwrap();
        assert!(!chroma.is_empty());
        for frame in &chroma {
            let argmax = frame
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(b.1))
                .map(|(i, _)| i)
                .unwrap();
            assert_eq!(argmax, 9);
            assert!((frame[9] - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_frame_count() {
        let ex = FftChromaExtractor::default();
        let chroma = ex.extract(&vec![0.1; 4096 + 2048 * 3], 22050).unwrap();
        assert_eq!(chroma.len(), 4);
    }

    #[test]
    fn test_c_major_triad_estimates_c_major() {
        let samples = tone(&[261.63, 329.63, 392.0], 22050, 2.0);
        let chroma = FftChromaExtractor::default().extract(&samples, 22050).unwrap();
        assert_eq!(estimate_key(&chroma).to_string(), "C Major");
    }

    #[test]
    fn test_silence_gives_zero_frames() {
        let chroma = FftChromaExtractor::default().extract(&vec![0.0; 8192], 22050).unwrap();
        assert!(chroma.iter().all(|f| f.iter().all(|&v| v == 0.0)));
        assert_eq!(estimate_key(&chroma).to_string(), "Unknown");
    }

    #[test]
    fn test_too_short() {
        let result = FftChromaExtractor::default().extract(&[0.5; 100], 22050);
        assert_eq!(result, Err(ExtractionError::TooShort { samples: 100, needed: 4096 }));
    }
}
