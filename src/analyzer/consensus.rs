//! Combine per-chunk votes into one tempo and key per track.

use super::key::MusicalKey;
use super::AnalyzeError;

/// What one sampled chunk said about the track.
#[derive(Debug, Clone, PartialEq)]
pub struct Vote {
    pub offset_secs: f64,
    /// `None` when the tempo estimator failed on this chunk.
    pub tempo_bpm: Option<f64>,
    pub key: MusicalKey,
}

/// Ordered votes of one analysis run, in chunk order.
#[derive(Debug, Clone, Default)]
pub struct VoteSet {
    votes: Vec<Vote>,
}

impl VoteSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, vote: Vote) {
        self.votes.push(vote);
    }

    pub fn len(&self) -> usize {
        self.votes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.votes.is_empty()
    }

    pub fn votes(&self) -> &[Vote] {
        &self.votes
    }

    /// Usable tempo votes: finite and positive.
    pub fn tempo_votes(&self) -> Vec<f64> {
        self.votes
            .iter()
            .filter_map(|v| v.tempo_bpm)
            .filter(|t| t.is_finite() && *t > 0.0)
            .collect()
    }

    pub fn key_votes(&self) -> Vec<MusicalKey> {
        self.votes.iter().map(|v| v.key).collect()
    }

    /// Consensus `(tempo, key)`, or `AggregationDegenerate` when no chunk
    /// produced a usable tempo.
    pub fn consensus(&self) -> Result<(f64, MusicalKey), AnalyzeError> {
        let tempo = consensus_tempo(&self.tempo_votes())
            .filter(|t| *t > 0.0)
            .ok_or(AnalyzeError::AggregationDegenerate { chunks: self.len() })?;
        Ok((tempo, consensus_key(&self.key_votes())))
    }
}

impl FromIterator<Vote> for VoteSet {
    fn from_iter<I: IntoIterator<Item = Vote>>(iter: I) -> Self {
        Self {
            votes: iter.into_iter().collect(),
        }
    }
}

/// Mode of the votes rounded to whole BPM when at least two agree, else the
/// mean of the raw votes. `None` for no votes.
///
/// Rounding is half-to-even, so 120.5 and 121.5 both land on even numbers.
pub fn consensus_tempo(votes: &[f64]) -> Option<f64> {
    if votes.is_empty() {
        return None;
    }

    let rounded: Vec<f64> = votes.iter().map(|v| v.round_ties_even()).collect();
    let (mode, count) = first_mode(&rounded)?;

    if count > 1 {
        Some(mode)
    } else {
        Some(votes.iter().sum::<f64>() / votes.len() as f64)
    }
}

/// Plurality key; ties go to the label seen first. `Unknown` votes count
/// like any other label.
pub fn consensus_key(votes: &[MusicalKey]) -> MusicalKey {
    first_mode(votes).map(|(key, _)| key).unwrap_or_default()
}

/// Most frequent value with its count, earliest first-occurrence winning ties.
fn first_mode<T: PartialEq + Copy>(values: &[T]) -> Option<(T, usize)> {
    let mut tally: Vec<(T, usize)> = Vec::new();
    for &v in values {
        match tally.iter_mut().find(|(seen, _)| *seen == v) {
            Some((_, n)) => *n += 1,
            None => tally.push((v, 1)),
        }
    }

    let mut best: Option<(T, usize)> = None;
    for (v, n) in tally {
        if best.is_none_or(|(_, b)| n > b) {
            best = Some((v, n));
        }
    }
    best
}
