//! Next-track recommendation.
//!
//! Every other analyzed track is scored against the one playing now on tempo,
//! key and a random novelty term, and the best one wins. The novelty draw is
//! fresh on every query unless a seeded or fixed source is injected.

use crate::analyzer::key::MusicalKey;
use crate::db::models::{CatalogEntry, TrackFingerprint};
use crate::db::{Database, DbError};
use rand::rngs::{StdRng, ThreadRng};
use rand::{Rng, SeedableRng};
use thiserror::Error;

pub const TEMPO_WEIGHT: f64 = 0.45;
pub const KEY_WEIGHT: f64 = 0.35;
pub const NOVELTY_WEIGHT: f64 = 0.20;

/// Relative tempo tolerance for a match, and for the half/double-time bonus.
const TEMPO_TOLERANCE: f64 = 0.05;
/// BPM distance at which the linear tempo score reaches zero.
const TEMPO_FALLOFF_BPM: f64 = 30.0;
const HALF_DOUBLE_SCORE: f64 = 0.9;

const KEY_MATCH_SCORE: f64 = 1.0;
const KEY_CLASH_SCORE: f64 = 0.2;
const KEY_UNKNOWN_SCORE: f64 = 0.5;

#[derive(Error, Debug)]
pub enum RecommendError {
    #[error("Database error: {0}")]
    Db(#[from] DbError),
}

/// How well `candidate` tempo mixes out of `current`, in `[0, 1]`.
///
/// The half/double-time checks measure tolerance against the candidate's
/// tempo while the direct match uses the current one.
pub fn tempo_score(current: f64, candidate: f64) -> f64 {
    if candidate == 0.0 || !candidate.is_finite() || !current.is_finite() {
        return 0.0;
    }
    let diff = (current - candidate).abs();
    if diff < current * TEMPO_TOLERANCE {
        return 1.0;
    }
    if (current * 2.0 - candidate).abs() < candidate * TEMPO_TOLERANCE {
        return HALF_DOUBLE_SCORE;
    }
    if (current / 2.0 - candidate).abs() < candidate * TEMPO_TOLERANCE {
        return HALF_DOUBLE_SCORE;
    }
    (1.0 - diff / TEMPO_FALLOFF_BPM).max(0.0)
}

/// Exact key equality only; relative keys and fifths count as a clash.
pub fn key_score(current: MusicalKey, candidate: MusicalKey) -> f64 {
    if !current.is_known() || !candidate.is_known() {
        KEY_UNKNOWN_SCORE
    } else if current == candidate {
        KEY_MATCH_SCORE
    } else {
        KEY_CLASH_SCORE
    }
}

/// Source of the per-candidate novelty term.
pub trait NoveltySource {
    /// A value in `[0, 1]`.
    fn draw(&mut self) -> f64;
}

/// Uniform random novelty.
pub struct RandomNovelty<R: Rng>(pub R);

impl RandomNovelty<ThreadRng> {
    /// Fresh, unseeded randomness: each query ranks near-ties differently.
    pub fn fresh() -> Self {
        Self(rand::thread_rng())
    }
}

impl RandomNovelty<StdRng> {
    pub fn seeded(seed: u64) -> Self {
        Self(StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> NoveltySource for RandomNovelty<R> {
    fn draw(&mut self) -> f64 {
        self.0.gen_range(0.0..=1.0)
    }
}

/// The same novelty for every candidate.
#[derive(Debug, Clone, Copy)]
pub struct FixedNovelty(pub f64);

impl NoveltySource for FixedNovelty {
    fn draw(&mut self) -> f64 {
        self.0.clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub candidate_id: i64,
    pub score_bpm: f64,
    pub score_key: f64,
    pub score_random: f64,
    pub total_score: f64,
}

impl ScoredCandidate {
    fn score(current: &TrackFingerprint, id: i64, candidate: &TrackFingerprint, novelty: f64) -> Self {
        let score_bpm = tempo_score(current.tempo_bpm, candidate.tempo_bpm);
        let score_key = key_score(current.musical_key, candidate.musical_key);
        Self {
            candidate_id: id,
            score_bpm,
            score_key,
            score_random: novelty,
            total_score: TEMPO_WEIGHT * score_bpm + KEY_WEIGHT * score_key + NOVELTY_WEIGHT * novelty,
        }
    }
}

/// Outcome of a recommendation query. Only `Found` carries a track.
#[derive(Debug, Clone)]
pub enum Recommendation {
    Found {
        entry: Box<CatalogEntry>,
        score: ScoredCandidate,
    },
    /// Nothing in the catalog is analyzed yet.
    LibraryEmpty,
    /// The reference matched no analyzed entry by id or external id.
    TrackNotFound(String),
    /// The current track is the only analyzed one.
    NoCandidates,
}

/// Score every candidate and sort best first. Equal totals keep catalog order.
pub fn rank_candidates(
    current: &TrackFingerprint,
    candidates: &[&CatalogEntry],
    novelty: &mut dyn NoveltySource,
) -> Vec<ScoredCandidate> {
    let mut scored: Vec<ScoredCandidate> = candidates
        .iter()
        .filter_map(|entry| {
            let fp = entry.fingerprint.as_ref()?;
            Some(ScoredCandidate::score(current, entry.id, fp, novelty.draw()))
        })
        .collect();
    scored.sort_by(|a, b| b.total_score.total_cmp(&a.total_score));
    scored
}

/// Locate the current track among analyzed entries: primary id first, then
/// external id.
fn find_current<'a>(entries: &'a [CatalogEntry], track_ref: &str) -> Option<&'a CatalogEntry> {
    let track_ref = track_ref.trim();
    track_ref
        .parse::<i64>()
        .ok()
        .and_then(|id| entries.iter().find(|e| e.id == id))
        .or_else(|| {
            entries
                .iter()
                .find(|e| e.external_id.as_deref() == Some(track_ref))
        })
}

/// Pick the next track from an already loaded set of analyzed entries.
pub fn recommend_from(
    entries: Vec<CatalogEntry>,
    track_ref: &str,
    novelty: &mut dyn NoveltySource,
) -> Recommendation {
    if entries.is_empty() {
        return Recommendation::LibraryEmpty;
    }

    let Some(current) = find_current(&entries, track_ref) else {
        return Recommendation::TrackNotFound(track_ref.to_string());
    };
    let Some(current_fp) = current.fingerprint.as_ref() else {
        return Recommendation::TrackNotFound(track_ref.to_string());
    };
    let current_id = current.id;

    let candidates: Vec<&CatalogEntry> = entries.iter().filter(|e| e.id != current_id).collect();
    let ranked = rank_candidates(current_fp, &candidates, novelty);

    log::debug!(
        "Ranked {} candidates for track {}: top {:?}",
        ranked.len(),
        current_id,
        ranked.first().map(|c| (c.candidate_id, c.total_score))
    );

    let Some(best) = ranked.into_iter().next() else {
        return Recommendation::NoCandidates;
    };
    let winner = entries.into_iter().find(|e| e.id == best.candidate_id);
    match winner {
        Some(entry) => Recommendation::Found {
            entry: Box::new(entry),
            score: best,
        },
        None => Recommendation::NoCandidates,
    }
}

/// Recommend what to play after `track_ref` (a track id or external id).
pub fn recommend(
    db: &Database,
    track_ref: &str,
    novelty: &mut dyn NoveltySource,
) -> Result<Recommendation, RecommendError> {
    let entries = db.get_analyzed_entries()?;
    Ok(recommend_from(entries, track_ref, novelty))
}
