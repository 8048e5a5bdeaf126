pub mod analyzer;
pub mod config;
pub mod db;
pub mod flow;
pub mod output;
pub mod recommend;
pub mod scanner;

/// Audio file extensions we support (everything symphonia is built with)
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "mp3", "flac", "wav", "ogg", "m4a", "aac", "mp4",
];

/// Application name for XDG paths
pub const APP_NAME: &str = "spectra";
