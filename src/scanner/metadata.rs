use lofty::file::TaggedFileExt;
use lofty::prelude::*;
use std::path::Path;

/// Artist recorded when the file has no artist tag.
pub const UNKNOWN_ARTIST: &str = "Unknown";

/// Tags extracted from audio file metadata.
#[derive(Debug, Default)]
pub struct TagInfo {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub duration_secs: Option<f64>,
}

/// Read tags from an audio file. Returns empty tags on failure.
pub fn read_tags(path: &Path) -> TagInfo {
    let tagged_file = match lofty::read_from_path(path) {
        Ok(f) => f,
        Err(e) => {
            log::debug!("Could not read tags from {}: {}", path.display(), e);
            return TagInfo::default();
        }
    };

    let duration_secs = {
        let secs = tagged_file.properties().duration().as_secs_f64();
        (secs > 0.0).then_some(secs)
    };

    // Try primary tag, then fall back
    let Some(tag) = tagged_file
        .primary_tag()
        .or_else(|| tagged_file.first_tag())
    else {
        return TagInfo {
            duration_secs,
            ..Default::default()
        };
    };

    TagInfo {
        title: non_empty(tag.title().map(|s| s.to_string())),
        artist: non_empty(tag.artist().map(|s| s.to_string())),
        album: non_empty(tag.album().map(|s| s.to_string())),
        duration_secs,
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Title to use when the file carries none: the file name without extension.
pub fn title_from_path(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "Untitled".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_from_path() {
        assert_eq!(title_from_path(Path::new("/music/Night Drive.mp3")), "Night Drive");
        assert_eq!(title_from_path(Path::new("/music/archive.tar.flac")), "archive.tar");
        assert_eq!(title_from_path(Path::new("/")), "Untitled");
    }

    #[test]
    fn test_non_empty() {
        assert_eq!(non_empty(Some("  ".to_string())), None);
        assert_eq!(non_empty(Some(" Artist ".to_string())), Some("Artist".to_string()));
        assert_eq!(non_empty(None), None);
    }

    #[test]
    fn test_unreadable_file_has_no_tags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.mp3");
        std::fs::write(&path, b"garbage").unwrap();
        let tags = read_tags(&path);
        assert!(tags.title.is_none());
        assert!(tags.artist.is_none());
    }

    #[test]
    fn test_untagged_wav_has_duration() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.wav");
        crate::analyzer::decode::tests::write_wav(&path, 8000, 1, &vec![0.1; 16000]);
        let tags = read_tags(&path);
        assert!(tags.title.is_none());
        let secs = tags.duration_secs.unwrap();
        assert!((secs - 2.0).abs() < 0.05, "duration {secs}");
    }
}
