//! Musical key type and chroma-profile key estimation.
//!
//! The summed chroma profile of a chunk is rotated through all 12 tonics and
//! Pearson-correlated with the Krumhansl-Schmuckler major and minor profiles.
//! The best of the 24 scores wins. Anything numerically degenerate (silence,
//! a flat profile, non-finite energy) yields `MusicalKey::Unknown`.

use serde::{Serialize, Serializer};
use std::fmt;

/// Pitch-class names, C = 0.
pub const PITCH_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Krumhansl-Schmuckler major profile, tonic first.
pub const MAJOR_PROFILE: [f64; 12] = [
    6.35, 2.23, 3.48, 2.33, 4.38, 4.09, 2.52, 5.19, 2.39, 3.66, 2.29, 2.88,
];

/// Krumhansl-Schmuckler minor profile, tonic first.
pub const MINOR_PROFILE: [f64; 12] = [
    6.33, 2.68, 3.52, 5.38, 2.60, 3.53, 2.54, 4.75, 3.98, 2.69, 3.34, 3.17,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Major,
    Minor,
}

impl Mode {
    fn label(&self) -> &'static str {
        match self {
            Self::Major => "Major",
            Self::Minor => "Minor",
        }
    }
}

/// One of the 24 major/minor keys, or Unknown when estimation had nothing to go on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MusicalKey {
    Known { pitch_class: u8, mode: Mode },
    #[default]
    Unknown,
}

impl MusicalKey {
    pub fn is_known(&self) -> bool {
        matches!(self, Self::Known { .. })
    }

    /// Parse a stored label like `"C# Minor"`. Anything unrecognised is `Unknown`.
    pub fn parse(label: &str) -> Self {
        let mut parts = label.split_whitespace();
        let (Some(tonic), Some(mode), None) = (parts.next(), parts.next(), parts.next()) else {
            return Self::Unknown;
        };
        let mode = match mode.to_ascii_lowercase().as_str() {
            "major" => Mode::Major,
            "minor" => Mode::Minor,
            _ => return Self::Unknown,
        };
        match PITCH_NAMES.iter().position(|name| name.eq_ignore_ascii_case(tonic)) {
            Some(pc) => Self::Known { pitch_class: pc as u8, mode },
            None => Self::Unknown,
        }
    }
}

impl fmt::Display for MusicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known { pitch_class, mode } => {
                write!(f, "{} {}", PITCH_NAMES[*pitch_class as usize % 12], mode.label())
            }
            Self::Unknown => f.write_str("Unknown"),
        }
    }
}

impl Serialize for MusicalKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Estimate the key of a chunk from its chromagram (one 12-bin frame per row).
pub fn estimate_key(chromagram: &[[f64; 12]]) -> MusicalKey {
    // Sum chroma energy across time
    let mut profile = [0.0f64; 12];
    for frame in chromagram {
        for (acc, v) in profile.iter_mut().zip(frame) {
            *acc += v;
        }
    }
    estimate_key_from_profile(&profile)
}

/// Estimate the key from an already time-summed 12-bin profile.
pub fn estimate_key_from_profile(profile: &[f64; 12]) -> MusicalKey {
    if profile.iter().any(|v| !v.is_finite()) {
        return MusicalKey::Unknown;
    }

    let mut best: Option<(MusicalKey, f64)> = None;
    for tonic in 0..12 {
        // Rotate so the candidate tonic sits at index 0
        let rotated: [f64; 12] = std::array::from_fn(|i| profile[(i + tonic) % 12]);

        for (mode, reference) in [(Mode::Major, &MAJOR_PROFILE), (Mode::Minor, &MINOR_PROFILE)] {
            let Some(r) = pearson(reference, &rotated) else {
                return MusicalKey::Unknown;
            };
            // Strict comparison keeps the first of equal scores
            if best.is_none_or(|(_, b)| r > b) {
                best = Some((MusicalKey::Known { pitch_class: tonic as u8, mode }, r));
            }
        }
    }

    best.map(|(key, _)| key).unwrap_or_default()
}

/// Pearson correlation; `None` when either side has zero variance.
fn pearson(a: &[f64; 12], b: &[f64; 12]) -> Option<f64> {
    let mean_a = a.iter().sum::<f64>() / 12.0;
    let mean_b = b.iter().sum::<f64>() / 12.0;

    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (x, y) in a.iter().zip(b) {
        let dx = x - mean_a;
        let dy = y - mean_b;
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }

    let denom = (var_a * var_b).sqrt();
    if !denom.is_finite() || denom < 1e-12 {
        return None;
    }
    let r = cov / denom;
    r.is_finite().then_some(r)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rotate_profile(reference: &[f64; 12], tonic: usize) -> [f64; 12] {
        // Energy at pitch class p is the reference weight for degree (p - tonic)
        std::array::from_fn(|p| reference[(p + 12 - tonic) % 12])
    }

    #[test]
    fn test_major_profile_is_c_major() {
        assert_eq!(
            estimate_key_from_profile(&MAJOR_PROFILE),
            MusicalKey::Known { pitch_class: 0, mode: Mode::Major }
        );
    }

    #[test]
    fn test_every_rotated_profile_is_recovered() {
        for tonic in 0..12 {
            let major = rotate_profile(&MAJOR_PROFILE, tonic);
            let minor = rotate_profile(&MINOR_PROFILE, tonic);
            assert_eq!(
                estimate_key_from_profile(&major),
                MusicalKey::Known { pitch_class: tonic as u8, mode: Mode::Major }
            );
            assert_eq!(
                estimate_key_from_profile(&minor),
                MusicalKey::Known { pitch_class: tonic as u8, mode: Mode::Minor }
            );
        }
    }

    #[test]
    fn test_chromagram_frames_are_summed() {
        let a_minor = rotate_profile(&MINOR_PROFILE, 9);
        let half: [f64; 12] = std::array::from_fn(|i| a_minor[i] / 2.0);
        let key = estimate_key(&[half, half]);
        assert_eq!(key.to_string(), "A Minor");
    }

    #[test]
    fn test_silence_is_unknown() {
        assert_eq!(estimate_key(&[[0.0; 12]; 4]), MusicalKey::Unknown);
        assert_eq!(estimate_key(&[]), MusicalKey::Unknown);
    }

    #[test]
    fn test_flat_profile_is_unknown() {
        assert_eq!(estimate_key_from_profile(&[0.3; 12]), MusicalKey::Unknown);
    }

    #[test]
    fn test_non_finite_is_unknown() {
        let mut profile = MAJOR_PROFILE;
        profile[3] = f64::NAN;
        assert_eq!(estimate_key_from_profile(&profile), MusicalKey::Unknown);
    }

    #[test]
    fn test_label_roundtrip() {
        for pc in 0..12u8 {
            for mode in [Mode::Major, Mode::Minor] {
                let key = MusicalKey::Known { pitch_class: pc, mode };
                assert_eq!(MusicalKey::parse(&key.to_string()), key);
            }
        }
        assert_eq!(MusicalKey::parse("Unknown"), MusicalKey::Unknown);
        assert_eq!(MusicalKey::parse(""), MusicalKey::Unknown);
        assert_eq!(MusicalKey::parse("H Major"), MusicalKey::Unknown);
        assert_eq!(MusicalKey::parse("C Dorian"), MusicalKey::Unknown);
        assert_eq!(MusicalKey::parse("c major"), MusicalKey::Known { pitch_class: 0, mode: Mode::Major });
    }

    #[test]
    fn test_serializes_as_label() {
        let key = MusicalKey::Known { pitch_class: 1, mode: Mode::Minor };
        assert_eq!(serde_json::to_string(&key).unwrap(), "\"C# Minor\"");
        assert_eq!(serde_json::to_string(&MusicalKey::Unknown).unwrap(), "\"Unknown\"");
    }
}
