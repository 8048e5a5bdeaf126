pub mod chroma;
pub mod consensus;
pub mod cue;
pub mod decode;
pub mod engine;
pub mod key;
pub mod sampler;
pub mod tempo;
pub mod waveform;

use crate::db::models::Track;
use crate::db::Database;
use engine::FingerprintEngine;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use thiserror::Error;

/// An estimator could not produce a value for one chunk.
///
/// The pipeline absorbs these: the chunk's tempo vote is dropped and its key
/// vote becomes `Unknown`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExtractionError {
    #[error("chunk too short: {samples} samples, need at least {needed}")]
    TooShort { samples: usize, needed: usize },
    #[error("chunk is silent")]
    Silent,
    #[error("{0}")]
    Failed(String),
}

#[derive(Error, Debug)]
pub enum AnalyzeError {
    #[error("Input error: {0}")]
    Input(String),
    #[error("Decode error: {0}")]
    Decode(#[from] decode::DecodeError),
    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractionError),
    #[error("No usable tempo votes across {chunks} chunks")]
    AggregationDegenerate { chunks: usize },
    #[error("Engine not ready: {0}")]
    NotReady(String),
    #[error("Worker pool error: {0}")]
    WorkerPool(String),
    #[error("Database error: {0}")]
    Db(#[from] crate::db::DbError),
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct AnalyzeResult {
    pub analyzed: u64,
    pub failed: u64,
}

/// Fingerprint catalog entries in parallel.
///
/// Tracks are processed in chunks: fingerprint a chunk with rayon, write every
/// result, move on. A crash loses at most one chunk of work, and each entry
/// moves exactly once to `analyzed` or `error`.
pub fn analyze_tracks(
    db: &Database,
    engine: &FingerprintEngine,
    force: bool,
    jobs: usize,
    filter: Option<&str>,
) -> std::result::Result<AnalyzeResult, AnalyzeError> {
    if !engine.is_ready() {
        return Err(AnalyzeError::NotReady(engine.state().to_string()));
    }

    let tracks = if force {
        db.get_all_tracks()?
    } else {
        db.get_pending_tracks()?
    };

    let tracks: Vec<Track> = if let Some(pattern) = filter {
        let pattern_lower = pattern.to_lowercase();
        tracks
            .into_iter()
            .filter(|t| t.file_path.to_lowercase().contains(&pattern_lower))
            .collect()
    } else {
        tracks
    };

    if tracks.is_empty() {
        log::info!("No tracks to analyze");
        return Ok(AnalyzeResult::default());
    }

    let jobs = jobs.max(1);
    log::info!("Analyzing {} tracks with {} workers", tracks.len(), jobs);

    let pb = ProgressBar::new(tracks.len() as u64);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-"),
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs)
        .build()
        .map_err(|e| AnalyzeError::WorkerPool(e.to_string()))?;

    let mut result = AnalyzeResult::default();
    let chunk_size = jobs * 2;

    for chunk in tracks.chunks(chunk_size) {
        let fingerprints: Vec<_> = pool.install(|| {
            use rayon::prelude::*;
            chunk
                .par_iter()
                .map(|track| {
                    let fp = analyze_file(engine, Path::new(&track.file_path));
                    pb.inc(1);
                    (track, fp)
                })
                .collect()
        });

        for (track, fp) in fingerprints {
            match fp {
                Ok(fp) => match db.store_fingerprint(track.id, &fp) {
                    Ok(()) => result.analyzed += 1,
                    Err(e) => {
                        log::error!("DB error storing fingerprint for track {}: {}", track.id, e);
                        result.failed += 1;
                    }
                },
                Err(e) => {
                    log::warn!("Analysis failed for {}: {}", track.title, e);
                    if let Err(db_err) = db.mark_error(track.id, &e.to_string()) {
                        log::error!("DB error marking track {} failed: {}", track.id, db_err);
                    }
                    result.failed += 1;
                }
            }
        }

        pb.set_message(format!("{} stored, {} failed", result.analyzed, result.failed));
    }

    pb.finish_with_message(format!(
        "Done: {} analyzed, {} failed",
        result.analyzed, result.failed
    ));

    Ok(result)
}

/// Fingerprint one audio file without touching the catalog.
pub fn analyze_file(
    engine: &FingerprintEngine,
    path: &Path,
) -> std::result::Result<crate::db::models::TrackFingerprint, AnalyzeError> {
    log::debug!(
        "Analyzing: {}",
        path.file_name().and_then(|f| f.to_str()).unwrap_or("?")
    );

    if !path.is_file() {
        return Err(AnalyzeError::Input(format!(
            "file not found: {}",
            path.display()
        )));
    }

    engine.fingerprint_file(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::decode::tests::write_wav;
    use crate::analyzer::engine::tests::stub_engine;
    use crate::db::models::{AnalysisStatus, NewTrack};

    fn register(db: &Database, path: &Path) -> i64 {
        db.upsert_track(
            &NewTrack {
                file_path: path.to_string_lossy().into_owned(),
                file_size: 1,
                file_modified: "0".to_string(),
                format: "wav".to_string(),
                external_id: None,
                title: path.file_stem().unwrap().to_string_lossy().into_owned(),
                artist: "Unknown".to_string(),
                album: None,
                cover_path: None,
                duration_secs: None,
            },
            false,
        )
        .unwrap()
        .id()
    }

    #[test]
    fn test_batch_marks_each_entry_once() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.wav");
        let tone: Vec<f32> = (0..8000 * 5)
            .map(|i| (i as f32 * 440.0 * std::f32::consts::TAU / 8000.0).sin() * 0.5)
            .collect();
        write_wav(&good, 8000, 1, &tone);
        let missing = dir.path().join("gone.wav");

        let db = Database::open_in_memory().unwrap();
        let good_id = register(&db, &good);
        let missing_id = register(&db, &missing);

        let engine = stub_engine(Some(124.0));
        let result = analyze_tracks(&db, &engine, false, 2, None).unwrap();
        assert_eq!(result, AnalyzeResult { analyzed: 1, failed: 1 });

        let good_entry = db.get_entry(good_id).unwrap().unwrap();
        assert_eq!(good_entry.status, AnalysisStatus::Analyzed);
        assert_eq!(good_entry.fingerprint.unwrap().tempo_bpm, 124.0);

        let missing_entry = db.get_entry(missing_id).unwrap().unwrap();
        assert_eq!(missing_entry.status, AnalysisStatus::Error);
        assert!(missing_entry.fingerprint.is_none());
        assert!(missing_entry.analysis_error.unwrap().contains("not found"));

        // Nothing left pending
        let again = analyze_tracks(&db, &engine, false, 2, None).unwrap();
        assert_eq!(again, AnalyzeResult::default());
    }

    #[test]
    fn test_batch_filter_limits_tracks() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_in_memory().unwrap();
        register(&db, &dir.path().join("alpha.wav"));
        register(&db, &dir.path().join("beta.wav"));

        let engine = stub_engine(Some(124.0));
        let result = analyze_tracks(&db, &engine, false, 1, Some("ALPHA")).unwrap();
        assert_eq!(result.analyzed + result.failed, 1);
        assert_eq!(db.get_pending_tracks().unwrap().len(), 1);
    }

    #[test]
    fn test_batch_requires_ready_engine() {
        let db = Database::open_in_memory().unwrap();
        let mut engine = stub_engine(Some(124.0));
        engine.unload();
        assert!(matches!(
            analyze_tracks(&db, &engine, false, 1, None),
            Err(AnalyzeError::NotReady(_))
        ));
    }

    #[test]
    fn test_analyze_missing_file_is_input_error() {
        let engine = stub_engine(Some(124.0));
        let err = analyze_file(&engine, Path::new("/nope/missing.mp3")).unwrap_err();
        assert!(matches!(err, AnalyzeError::Input(_)));
    }
}
