use std::path::PathBuf;

use directories::ProjectDirs;
use serde::Deserialize;

/// Application configuration loaded from TOML config file.
/// Every field has a default, so the config file is optional.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Directories to ingest from (used when `ingest` has no CLI args).
    pub media_dirs: Vec<PathBuf>,
    /// Custom database path (overrides XDG default).
    pub db_path: Option<PathBuf>,
    /// Number of parallel workers. 0 = auto-detect (cores / 2, min 1).
    pub workers: usize,
    /// Base URL of the streaming server, used for recommendation links.
    pub stream_base_url: StreamBaseUrl,
    /// Fingerprinting parameters.
    pub analysis: AnalysisConfig,
    /// Recommendation parameters.
    pub recommend: RecommendConfig,
}

/// Base URL wrapper so the default lives next to the type.
#[derive(Debug, Deserialize, Clone)]
#[serde(transparent)]
pub struct StreamBaseUrl(pub String);

impl Default for StreamBaseUrl {
    fn default() -> Self {
        Self("http://localhost:3001".to_string())
    }
}

impl StreamBaseUrl {
    pub fn stream_url(&self, track_id: i64) -> String {
        format!("{}/stream/{}", self.0.trim_end_matches('/'), track_id)
    }

    pub fn cover_url(&self, cover_path: &str) -> String {
        format!("{}/uploads/{}", self.0.trim_end_matches('/'), cover_path)
    }
}

/// Fingerprinting parameters.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Rate each tempo/key chunk is resampled to before estimation.
    pub analysis_sample_rate: u32,
    /// Length of each sampled chunk in seconds.
    pub chunk_seconds: f64,
    /// Low rate used to compute the preview waveform.
    pub waveform_sample_rate: u32,
    /// Number of bars in the preview waveform.
    pub waveform_bars: usize,
    /// Rate assumed for cue windows whose source doesn't report one.
    pub cue_sample_rate: u32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            analysis_sample_rate: 22050,
            chunk_seconds: 15.0,
            waveform_sample_rate: 4000,
            waveform_bars: 250,
            cue_sample_rate: crate::analyzer::cue::DEFAULT_CUE_SAMPLE_RATE,
        }
    }
}

/// Recommendation parameters.
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct RecommendConfig {
    /// Pin the novelty draw. Unset means fresh randomness on every query.
    pub seed: Option<u64>,
}

impl AppConfig {
    /// Load config from `~/.config/spectra/config.toml`.
    /// Returns default config if file doesn't exist.
    /// Logs a warning if the file exists but can't be parsed.
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => {
                log::debug!("No config file found, using defaults");
                Self::default()
            }
        }
    }

    /// Load config from an explicit path, falling back to defaults on any error.
    pub fn load_from(path: &std::path::Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<AppConfig>(&contents) {
                Ok(config) => {
                    log::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    log::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                log::warn!("Failed to read {}: {}. Using defaults.", path.display(), e);
                Self::default()
            }
        }
    }

    /// Resolve worker count: 0 → auto-detect (cores / 2, min 1).
    pub fn resolve_workers(&self) -> usize {
        if self.workers > 0 {
            self.workers
        } else {
            let cores = std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(2);
            (cores / 2).max(1)
        }
    }

    /// Get the config file path.
    fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", crate::APP_NAME)
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

/// Resolve the default database path using XDG data directory.
pub fn default_db_path() -> PathBuf {
    if let Some(dirs) = ProjectDirs::from("", "", crate::APP_NAME) {
        let data_dir = dirs.data_dir();
        std::fs::create_dir_all(data_dir).ok();
        data_dir.join("spectra.db")
    } else {
        // Fallback: current directory
        PathBuf::from("spectra.db")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.analysis.waveform_bars, 250);
        assert_eq!(config.analysis.analysis_sample_rate, 22050);
        assert_eq!(config.analysis.cue_sample_rate, 44100);
        assert!(config.recommend.seed.is_none());
        assert_eq!(config.stream_base_url.stream_url(7), "http://localhost:3001/stream/7");
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "workers = 3\nstream_base_url = \"http://dj.local:9000/\"\n\n[analysis]\nwaveform_bars = 100\n\n[recommend]\nseed = 42"
        )
        .unwrap();

        let config = AppConfig::load_from(file.path());
        assert_eq!(config.workers, 3);
        assert_eq!(config.resolve_workers(), 3);
        assert_eq!(config.analysis.waveform_bars, 100);
        assert_eq!(config.analysis.chunk_seconds, 15.0);
        assert_eq!(config.recommend.seed, Some(42));
        assert_eq!(config.stream_base_url.cover_url("a.jpg"), "http://dj.local:9000/uploads/a.jpg");
    }

    #[test]
    fn test_unparsable_file_falls_back() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "workers = \"many\"").unwrap();
        let config = AppConfig::load_from(file.path());
        assert_eq!(config.workers, 0);
        assert!(config.resolve_workers() >= 1);
    }
}
