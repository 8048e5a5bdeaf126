pub mod metadata;

use crate::db::models::NewTrack;
use crate::db::queries::{upsert_track_row, UpsertOutcome};
use crate::db::{Database, DbError};
use crate::SUPPORTED_EXTENSIONS;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// Image names checked next to an audio file, in order.
const COVER_NAMES: &[&str] = &[
    "cover.jpg", "cover.jpeg", "cover.png",
    "folder.jpg", "folder.jpeg", "folder.png",
    "front.jpg", "front.png",
];

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Database error: {0}")]
    Db(#[from] DbError),
    #[error("--external-id needs exactly one audio file, found {0}")]
    ExternalIdNeedsSingleFile(usize),
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct IngestResult {
    pub scanned: u64,
    pub new: u64,
    pub updated: u64,
    pub unchanged: u64,
    pub errors: u64,
}

/// An audio file and the directory it was found under.
struct Candidate {
    path: PathBuf,
    root: PathBuf,
}

/// Register audio files (or every supported file under directories) as
/// `pending` catalog entries.
///
/// Unchanged files keep their id and fingerprint; changed files, or any file
/// with `force`, go back to `pending`.
pub fn ingest(
    db: &Database,
    paths: &[PathBuf],
    external_id: Option<&str>,
    force: bool,
) -> std::result::Result<IngestResult, ScanError> {
    let files = collect_audio_files(paths);

    if external_id.is_some() && files.len() != 1 {
        return Err(ScanError::ExternalIdNeedsSingleFile(files.len()));
    }

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({per_sec}) ({eta}) {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-"),
    );
    pb.set_message("Ingesting...");

    let mut result = IngestResult::default();

    // One transaction for the whole batch
    let tx = db.conn.unchecked_transaction().map_err(DbError::from)?;

    for file in &files {
        result.scanned += 1;

        match register_file(&tx, file, external_id, force) {
            Ok(UpsertOutcome::New(id)) => {
                log::debug!("Registered {} as track {}", file.path.display(), id);
                result.new += 1;
            }
            Ok(UpsertOutcome::Updated(_)) => result.updated += 1,
            Ok(UpsertOutcome::Unchanged(_)) => result.unchanged += 1,
            Err(e) => {
                log::warn!("Error ingesting {}: {}", file.path.display(), e);
                result.errors += 1;
            }
        }

        pb.inc(1);
    }

    tx.commit().map_err(DbError::from)?;

    pb.finish_with_message(format!(
        "Done: {} new, {} updated, {} unchanged, {} errors",
        result.new, result.updated, result.unchanged, result.errors
    ));

    Ok(result)
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SUPPORTED_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn collect_audio_files(paths: &[PathBuf]) -> Vec<Candidate> {
    let mut files = Vec::new();

    for path in paths {
        let root = if path.is_file() {
            path.parent().map(Path::to_path_buf).unwrap_or_default()
        } else {
            path.clone()
        };

        let mut entries: Vec<PathBuf> = WalkDir::new(path)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| match e {
                Ok(entry) => Some(entry),
                Err(err) => {
                    log::warn!("Skipping unreadable path: {}", err);
                    None
                }
            })
            .filter(|e| e.file_type().is_file() && is_supported(e.path()))
            .map(|e| e.into_path())
            .collect();
        entries.sort();

        files.extend(entries.into_iter().map(|p| Candidate {
            path: p,
            root: root.clone(),
        }));
    }

    files
}

fn register_file(
    conn: &rusqlite::Connection,
    file: &Candidate,
    external_id: Option<&str>,
    force: bool,
) -> std::result::Result<UpsertOutcome, ScanError> {
    let path = file.path.as_path();
    let meta = std::fs::metadata(path)?;

    let format = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    let tags = metadata::read_tags(path);
    let title = tags.title.unwrap_or_else(|| metadata::title_from_path(path));
    let artist = tags.artist.unwrap_or_else(|| metadata::UNKNOWN_ARTIST.to_string());

    let track = NewTrack {
        file_path: path.to_string_lossy().into_owned(),
        file_size: meta.len() as i64,
        file_modified: format_mtime(&meta),
        format,
        external_id: external_id.map(str::to_string),
        title,
        artist,
        album: tags.album,
        cover_path: find_cover(path, &file.root),
        duration_secs: tags.duration_secs,
    };

    Ok(upsert_track_row(conn, &track, force)?)
}

/// Cover image next to `audio`, as a path relative to `root` (or just the
/// file name when it isn't under `root`).
fn find_cover(audio: &Path, root: &Path) -> Option<String> {
    let dir = audio.parent()?;
    let names: Vec<String> = std::fs::read_dir(dir)
        .ok()?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter_map(|e| e.file_name().into_string().ok())
        .collect();

    let found = COVER_NAMES
        .iter()
        .find_map(|want| names.iter().find(|n| n.eq_ignore_ascii_case(want)))?;
    let cover = dir.join(found);

    let relative = cover
        .strip_prefix(root)
        .map(Path::to_path_buf)
        .unwrap_or_else(|_| PathBuf::from(found));
    Some(relative.to_string_lossy().replace('\\', "/"))
}

fn format_mtime(meta: &std::fs::Metadata) -> String {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs().to_string())
        .unwrap_or_default()
}
