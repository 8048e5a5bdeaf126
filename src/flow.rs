//! BPM flow: analyzed tracks ordered by tempo, each labelled with how the mix
//! into the next one will feel.

use crate::db::models::CatalogEntry;
use serde::Serialize;

/// Below this BPM gap the mix is seamless.
const SMOOTH_MAX_DIFF: f64 = 5.0;
/// Below this BPM gap the next track noticeably lifts the energy.
const BOOST_MAX_DIFF: f64 = 15.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    Smooth,
    Boost,
    HardCut,
    /// Last track of the flow.
    Final,
}

impl Transition {
    pub fn between(from_bpm: f64, to_bpm: f64) -> Self {
        let diff = (to_bpm - from_bpm).abs();
        if diff < SMOOTH_MAX_DIFF {
            Self::Smooth
        } else if diff < BOOST_MAX_DIFF {
            Self::Boost
        } else {
            Self::HardCut
        }
    }
}

#[derive(Debug, Clone)]
pub struct FlowStep {
    pub entry: CatalogEntry,
    pub bpm: f64,
    /// Transition into the following step.
    pub transition: Transition,
}

/// Order analyzed entries by ascending BPM. Entries without a positive tempo
/// are left out; equal tempos keep their incoming order.
pub fn bpm_flow(entries: Vec<CatalogEntry>) -> Vec<FlowStep> {
    let mut tracks: Vec<(f64, CatalogEntry)> = entries
        .into_iter()
        .filter_map(|e| {
            let bpm = e.fingerprint.as_ref()?.tempo_bpm;
            (bpm.is_finite() && bpm > 0.0).then_some((bpm, e))
        })
        .collect();
    tracks.sort_by(|a, b| a.0.total_cmp(&b.0));

    let next_bpms: Vec<Option<f64>> = tracks
        .iter()
        .skip(1)
        .map(|(bpm, _)| Some(*bpm))
        .chain(std::iter::once(None))
        .collect();

    tracks
        .into_iter()
        .zip(next_bpms)
        .map(|((bpm, entry), next)| FlowStep {
            entry,
            bpm,
            transition: next.map_or(Transition::Final, |n| Transition::between(bpm, n)),
        })
        .collect()
}
