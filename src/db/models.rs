use crate::analyzer::key::MusicalKey;
use serde::Serialize;
use std::fmt;

/// Data for inserting or updating a track (ingest phase).
#[derive(Debug, Clone)]
pub struct NewTrack {
    pub file_path: String,
    pub file_size: i64,
    pub file_modified: String,
    pub format: String,

    pub external_id: Option<String>,
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub cover_path: Option<String>,

    /// Duration from tags (seconds), may be absent before analysis
    pub duration_secs: Option<f64>,
}

/// A track row queued for analysis.
#[derive(Debug, Clone)]
pub struct Track {
    pub id: i64,
    pub file_path: String,
    pub title: String,
}

/// Where a catalog entry is in the analysis lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    Pending,
    Analyzed,
    Error,
}

impl AnalysisStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Analyzed => "analyzed",
            Self::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "analyzed" => Some(Self::Analyzed),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

impl fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tempo, key, cue points and preview waveform of one track.
///
/// Written once per successful analysis; a re-analysis replaces the whole value.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackFingerprint {
    pub tempo_bpm: f64,
    pub musical_key: MusicalKey,
    pub cue_in: f64,
    pub cue_out: f64,
    pub duration_secs: f64,
    pub waveform: Vec<f64>,
}

/// A catalog row joined with its fingerprint.
///
/// `fingerprint` is `Some` exactly when `status` is `Analyzed`.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub id: i64,
    pub external_id: Option<String>,
    pub title: String,
    pub artist: String,
    pub file_path: String,
    pub cover_path: Option<String>,
    pub status: AnalysisStatus,
    pub analysis_error: Option<String>,
    pub analyzed_at: Option<String>,
    pub fingerprint: Option<TrackFingerprint>,
}

/// Library statistics.
#[derive(Debug)]
pub struct LibraryStats {
    pub total_tracks: i64,
    pub pending_tracks: i64,
    pub analyzed_tracks: i64,
    pub error_tracks: i64,
    pub total_duration_hours: f64,
    pub formats: Vec<(String, i64)>,
    pub keys: Vec<(String, i64)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        for status in [AnalysisStatus::Pending, AnalysisStatus::Analyzed, AnalysisStatus::Error] {
            assert_eq!(AnalysisStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(AnalysisStatus::parse("failed"), None);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&AnalysisStatus::Analyzed).unwrap();
        assert_eq!(json, "\"analyzed\"");
    }
}
