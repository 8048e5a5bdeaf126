//! JSON objects printed by the CLI.
//!
//! Every numeric measurement is an `f64` so it always serializes as a JSON
//! float (`120.0`, never `120`). Track ids stay integers.

use crate::config::StreamBaseUrl;
use crate::db::models::{AnalysisStatus, CatalogEntry, TrackFingerprint};
use crate::flow::{FlowStep, Transition};
use crate::recommend::Recommendation;
use serde::Serialize;

pub const LIBRARY_EMPTY: &str = "Library empty or not analyzed";
pub const TRACK_NOT_FOUND: &str = "Current track not found in DB";
pub const NO_CANDIDATES: &str = "No other analyzed track to recommend";

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

/// Result of `analyze <file>`.
#[derive(Debug, Serialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnalyzeOutput {
    Success {
        bpm: f64,
        key: String,
        waveform: Vec<f64>,
        cue_in: f64,
        cue_out: f64,
        duration: f64,
    },
    Error {
        message: String,
    },
}

impl AnalyzeOutput {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error { message: message.into() }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

impl From<&TrackFingerprint> for AnalyzeOutput {
    fn from(fp: &TrackFingerprint) -> Self {
        Self::Success {
            bpm: round_to(fp.tempo_bpm, 1),
            key: fp.musical_key.to_string(),
            waveform: fp.waveform.clone(),
            cue_in: round_to(fp.cue_in, 3),
            cue_out: round_to(fp.cue_out, 3),
            duration: round_to(fp.duration_secs, 3),
        }
    }
}

#[derive(Debug, Serialize, PartialEq)]
pub struct RecommendedTrack {
    pub id: i64,
    pub title: String,
    pub artist: String,
    pub bpm: f64,
    pub key: String,
    pub url: String,
    pub cover: Option<String>,
    pub score: f64,
}

/// Result of `recommend <track>`.
#[derive(Debug, Serialize, PartialEq)]
#[serde(untagged)]
pub enum RecommendOutput {
    Success {
        success: bool,
        recommendation: RecommendedTrack,
    },
    Error {
        error: String,
    },
}

impl RecommendOutput {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error { error: message.into() }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn from_recommendation(rec: &Recommendation, base: &StreamBaseUrl) -> Self {
        match rec {
            Recommendation::Found { entry, score } => {
                let (bpm, key) = entry
                    .fingerprint
                    .as_ref()
                    .map(|fp| (fp.tempo_bpm, fp.musical_key.to_string()))
                    .unwrap_or((0.0, "Unknown".to_string()));
                Self::Success {
                    success: true,
                    recommendation: RecommendedTrack {
                        id: entry.id,
                        title: entry.title.clone(),
                        artist: entry.artist.clone(),
                        bpm,
                        key,
                        url: base.stream_url(entry.id),
                        cover: entry
                            .cover_path
                            .as_deref()
                            .filter(|p| !p.is_empty())
                            .map(|p| base.cover_url(p)),
                        score: round_to(score.total_score, 2),
                    },
                }
            }
            Recommendation::LibraryEmpty => Self::error(LIBRARY_EMPTY),
            Recommendation::TrackNotFound(_) => Self::error(TRACK_NOT_FOUND),
            Recommendation::NoCandidates => Self::error(NO_CANDIDATES),
        }
    }
}

/// Stored analysis of one catalog entry (`track <id>`).
#[derive(Debug, Serialize)]
pub struct TrackView {
    pub id: i64,
    pub external_id: Option<String>,
    pub title: String,
    pub artist: String,
    pub file_path: String,
    pub analysis_status: AnalysisStatus,
    pub analysis_error: Option<String>,
    pub analyzed_at: Option<String>,
    pub bpm: Option<f64>,
    pub key: Option<String>,
    pub cue_in: Option<f64>,
    pub cue_out: Option<f64>,
    pub duration: Option<f64>,
    pub waveform: Vec<f64>,
}

impl From<&CatalogEntry> for TrackView {
    fn from(e: &CatalogEntry) -> Self {
        let fp = e.fingerprint.as_ref();
        Self {
            id: e.id,
            external_id: e.external_id.clone(),
            title: e.title.clone(),
            artist: e.artist.clone(),
            file_path: e.file_path.clone(),
            analysis_status: e.status,
            analysis_error: e.analysis_error.clone(),
            analyzed_at: e.analyzed_at.clone(),
            bpm: fp.map(|f| f.tempo_bpm),
            key: fp.map(|f| f.musical_key.to_string()),
            cue_in: fp.map(|f| f.cue_in),
            cue_out: fp.map(|f| f.cue_out),
            duration: fp.map(|f| f.duration_secs),
            waveform: fp.map(|f| f.waveform.clone()).unwrap_or_default(),
        }
    }
}

/// One row of `flow`.
#[derive(Debug, Serialize)]
pub struct FlowItem {
    pub id: i64,
    pub title: String,
    pub artist: String,
    pub bpm: f64,
    pub key: String,
    pub duration: f64,
    pub transition: Transition,
}

impl From<&FlowStep> for FlowItem {
    fn from(step: &FlowStep) -> Self {
        let fp = step.entry.fingerprint.as_ref();
        Self {
            id: step.entry.id,
            title: step.entry.title.clone(),
            artist: step.entry.artist.clone(),
            bpm: step.bpm,
            key: fp.map(|f| f.musical_key.to_string()).unwrap_or_else(|| "Unknown".to_string()),
            duration: fp.map(|f| f.duration_secs).unwrap_or(0.0),
            transition: step.transition,
        }
    }
}
