//! The fingerprinting pipeline and its estimator lifecycle.
//!
//! One run: decode once, sample chunks, vote tempo and key per chunk, reach
//! consensus, detect cue windows on the whole track, and draw the preview
//! waveform. Estimators are injected and must be `load()`ed before use.

use super::chroma::{ChromaExtractor, FftChromaExtractor};
use super::consensus::{Vote, VoteSet};
use super::cue::{self, CueDetector, CuePoints, EnergyCueDetector};
use super::decode::{self, MonoAudio};
use super::key::{self, MusicalKey};
use super::sampler;
use super::tempo::{StratumTempoEstimator, TempoEstimator};
use super::waveform;
use super::AnalyzeError;
use crate::config::AnalysisConfig;
use crate::db::models::TrackFingerprint;
use rayon::prelude::*;
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineState {
    Unloaded,
    Ready,
    Failed(String),
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unloaded => f.write_str("engine not loaded"),
            Self::Ready => f.write_str("ready"),
            Self::Failed(msg) => write!(f, "engine failed to load: {msg}"),
        }
    }
}

pub struct FingerprintEngine {
    tempo: Box<dyn TempoEstimator>,
    chroma: Box<dyn ChromaExtractor>,
    cues: Box<dyn CueDetector>,
    settings: AnalysisConfig,
    state: EngineState,
}

impl FingerprintEngine {
    /// Engine with the built-in estimators. Still needs `load()`.
    pub fn new(settings: AnalysisConfig) -> Self {
        Self::with_components(
            settings,
            Box::new(StratumTempoEstimator::default()),
            Box::new(FftChromaExtractor::default()),
            Box::new(EnergyCueDetector::default()),
        )
    }

    pub fn with_components(
        settings: AnalysisConfig,
        tempo: Box<dyn TempoEstimator>,
        chroma: Box<dyn ChromaExtractor>,
        cues: Box<dyn CueDetector>,
    ) -> Self {
        Self {
            tempo,
            chroma,
            cues,
            settings,
            state: EngineState::Unloaded,
        }
    }

    /// Validate settings and prepare every estimator.
    pub fn load(&mut self) -> Result<(), AnalyzeError> {
        match self.prepare() {
            Ok(()) => {
                log::debug!(
                    "Engine ready: tempo={}, chroma={}, cues={}",
                    self.tempo.name(),
                    self.chroma.name(),
                    self.cues.name()
                );
                self.state = EngineState::Ready;
                Ok(())
            }
            Err(msg) => {
                self.state = EngineState::Failed(msg);
                Err(AnalyzeError::NotReady(self.state.to_string()))
            }
        }
    }

    fn prepare(&self) -> Result<(), String> {
        let s = &self.settings;
        if s.analysis_sample_rate == 0 || s.waveform_sample_rate == 0 || s.cue_sample_rate == 0 {
            return Err("sample rates must be non-zero".to_string());
        }
        if !(s.chunk_seconds.is_finite() && s.chunk_seconds > 0.0) {
            return Err(format!("invalid chunk length {}", s.chunk_seconds));
        }
        if s.waveform_bars == 0 {
            return Err("waveform needs at least one bar".to_string());
        }
        self.tempo
            .prepare()
            .map_err(|e| format!("{}: {}", self.tempo.name(), e))?;
        self.chroma
            .prepare()
            .map_err(|e| format!("{}: {}", self.chroma.name(), e))?;
        self.cues
            .prepare()
            .map_err(|e| format!("{}: {}", self.cues.name(), e))?;
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.state == EngineState::Ready
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn unload(&mut self) {
        self.state = EngineState::Unloaded;
    }

    fn ensure_ready(&self) -> Result<(), AnalyzeError> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(AnalyzeError::NotReady(self.state.to_string()))
        }
    }

    /// Decode a file and fingerprint it.
    pub fn fingerprint_file(&self, path: &Path) -> Result<TrackFingerprint, AnalyzeError> {
        self.ensure_ready()?;
        let audio = decode::load_mono(path)?;
        self.fingerprint_audio(&audio)
    }

    /// Fingerprint already decoded audio at its native rate.
    pub fn fingerprint_audio(&self, audio: &MonoAudio) -> Result<TrackFingerprint, AnalyzeError> {
        self.ensure_ready()?;

        let duration = audio.duration_secs();
        let votes = self.collect_votes(audio);
        for vote in votes.votes() {
            log::trace!(
                "chunk {:.1}s: tempo={:?} key={}",
                vote.offset_secs,
                vote.tempo_bpm,
                vote.key
            );
        }
        let (tempo_bpm, musical_key) = votes.consensus().inspect_err(|e| log::warn!("{}", e))?;

        let cues = match self.cues.detect(audio) {
            Ok(windows) => cue::translate(&windows, self.settings.cue_sample_rate).clamp_to(duration),
            Err(e) => {
                log::warn!("Cue detection failed, using whole track: {}", e);
                CuePoints::full_track(duration)
            }
        };

        let preview = audio.resampled(self.settings.waveform_sample_rate);
        let waveform = waveform::downsample(&preview.samples, self.settings.waveform_bars);

        Ok(TrackFingerprint {
            tempo_bpm,
            musical_key,
            cue_in: cues.cue_in,
            cue_out: cues.cue_out,
            duration_secs: duration,
            waveform,
        })
    }

    /// One vote per sampled chunk. Chunks are independent and run in parallel.
    fn collect_votes(&self, audio: &MonoAudio) -> VoteSet {
        let offsets = sampler::chunk_offsets(audio.duration_secs());
        let rate = self.settings.analysis_sample_rate;

        let votes: Vec<Vote> = offsets
            .par_iter()
            .map(|&offset_secs| {
                let chunk = decode::resample(
                    audio.window(offset_secs, self.settings.chunk_seconds),
                    audio.sample_rate,
                    rate,
                );

                let tempo_bpm = match self.tempo.estimate(&chunk, rate) {
                    Ok(bpm) => Some(bpm),
                    Err(e) => {
                        log::warn!("Tempo vote at {:.1}s dropped: {}", offset_secs, e);
                        None
                    }
                };
                let key = match self.chroma.extract(&chunk, rate) {
                    Ok(chromagram) => key::estimate_key(&chromagram),
                    Err(e) => {
                        log::warn!("Key vote at {:.1}s unknown: {}", offset_secs, e);
                        MusicalKey::Unknown
                    }
                };

                Vote { offset_secs, tempo_bpm, key }
            })
            .collect();

        votes.into_iter().collect()
    }
}
