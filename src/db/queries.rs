use super::models::{AnalysisStatus, CatalogEntry, LibraryStats, NewTrack, Track, TrackFingerprint};
use super::{Database, DbError, Result};
use crate::analyzer::key::MusicalKey;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

const ENTRY_COLUMNS: &str = "id, external_id, title, artist, file_path, cover_path,
     analysis_status, analysis_error, analyzed_at,
     bpm, key_signature, cue_in, cue_out, duration, waveform_data";

const CLEAR_FINGERPRINT: &str = "bpm = NULL, key_signature = NULL, cue_in = NULL, cue_out = NULL,
     duration = NULL, waveform_data = NULL, analyzed_at = NULL";

/// What registering a file did to the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    New(i64),
    /// Metadata refreshed and fingerprint reset to pending.
    Updated(i64),
    /// Same size and mtime as the stored row; nothing but the external id touched.
    Unchanged(i64),
}

impl UpsertOutcome {
    pub fn id(&self) -> i64 {
        match *self {
            Self::New(id) | Self::Updated(id) | Self::Unchanged(id) => id,
        }
    }
}

/// Insert or refresh a track on any connection (plain or inside a transaction).
///
/// A changed file (or `force`) drops its old fingerprint: the entry goes back to `pending`.
pub fn upsert_track_row(conn: &Connection, t: &NewTrack, force: bool) -> Result<UpsertOutcome> {
    let existing: Option<(i64, i64, String)> = conn
        .query_row(
            "SELECT id, file_size, file_modified FROM tracks WHERE file_path = ?1",
            params![t.file_path],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;

    let Some((id, size, mtime)) = existing else {
        conn.execute(
            "INSERT INTO tracks (
                file_path, file_size, file_modified, format, external_id,
                title, artist, album, cover_path, duration_secs
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                t.file_path, t.file_size, t.file_modified, t.format, t.external_id,
                t.title, t.artist, t.album, t.cover_path, t.duration_secs,
            ],
        )?;
        return Ok(UpsertOutcome::New(conn.last_insert_rowid()));
    };

    if !force && size == t.file_size && mtime == t.file_modified {
        conn.execute(
            "UPDATE tracks SET external_id = COALESCE(?2, external_id) WHERE id = ?1",
            params![id, t.external_id],
        )?;
        return Ok(UpsertOutcome::Unchanged(id));
    }

    conn.execute(
        &format!(
            "UPDATE tracks SET
                file_size = ?2, file_modified = ?3, format = ?4,
                external_id = COALESCE(?5, external_id),
                title = ?6, artist = ?7, album = ?8, cover_path = ?9, duration_secs = ?10,
                analysis_status = 'pending', analysis_error = NULL,
                {CLEAR_FINGERPRINT},
                updated_at = datetime('now')
             WHERE id = ?1"
        ),
        params![
            id, t.file_size, t.file_modified, t.format, t.external_id,
            t.title, t.artist, t.album, t.cover_path, t.duration_secs,
        ],
    )?;
    Ok(UpsertOutcome::Updated(id))
}

fn track_from_row(row: &Row) -> rusqlite::Result<Track> {
    Ok(Track {
        id: row.get(0)?,
        file_path: row.get(1)?,
        title: row.get(2)?,
    })
}

fn entry_from_row(row: &Row) -> rusqlite::Result<CatalogEntry> {
    let status_text: String = row.get(6)?;
    let status = AnalysisStatus::parse(&status_text).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            6,
            Type::Text,
            format!("unknown analysis status {status_text:?}").into(),
        )
    })?;

    let fingerprint = match status {
        AnalysisStatus::Analyzed => {
            let tempo_bpm: f64 = row.get::<_, Option<f64>>(9)?.ok_or_else(|| {
                rusqlite::Error::FromSqlConversionFailure(
                    9,
                    Type::Null,
                    "analyzed track has no bpm".into(),
                )
            })?;
            let key: Option<String> = row.get(10)?;
            let waveform_json: Option<String> = row.get(14)?;
            let waveform = match waveform_json {
                Some(json) => serde_json::from_str(&json).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(14, Type::Text, Box::new(e))
                })?,
                None => Vec::new(),
            };
            Some(TrackFingerprint {
                tempo_bpm,
                musical_key: key.as_deref().map(MusicalKey::parse).unwrap_or_default(),
                cue_in: row.get::<_, Option<f64>>(11)?.unwrap_or(0.0),
                cue_out: row.get::<_, Option<f64>>(12)?.unwrap_or(0.0),
                duration_secs: row.get::<_, Option<f64>>(13)?.unwrap_or(0.0),
                waveform,
            })
        }
        AnalysisStatus::Pending | AnalysisStatus::Error => None,
    };

    Ok(CatalogEntry {
        id: row.get(0)?,
        external_id: row.get(1)?,
        title: row.get(2)?,
        artist: row.get(3)?,
        file_path: row.get(4)?,
        cover_path: row.get(5)?,
        status,
        analysis_error: row.get(7)?,
        analyzed_at: row.get(8)?,
        fingerprint,
    })
}

impl Database {
    /// Insert or refresh a track. Returns what happened and the track id.
    pub fn upsert_track(&self, t: &NewTrack, force: bool) -> Result<UpsertOutcome> {
        upsert_track_row(&self.conn, t, force)
    }

    /// Get all tracks still waiting for a fingerprint.
    pub fn get_pending_tracks(&self) -> Result<Vec<Track>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, file_path, title FROM tracks
             WHERE analysis_status = 'pending'
             ORDER BY id",
        )?;
        let tracks = stmt
            .query_map([], track_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(tracks)
    }

    /// Get all tracks (for --force re-analysis).
    pub fn get_all_tracks(&self) -> Result<Vec<Track>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, file_path, title FROM tracks ORDER BY id")?;
        let tracks = stmt
            .query_map([], track_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(tracks)
    }

    /// Look up one entry by primary id, whatever its status.
    pub fn get_entry(&self, id: i64) -> Result<Option<CatalogEntry>> {
        let entry = self
            .conn
            .query_row(
                &format!("SELECT {ENTRY_COLUMNS} FROM tracks WHERE id = ?1"),
                params![id],
                entry_from_row,
            )
            .optional()?;
        Ok(entry)
    }

    /// Look up one entry by the id it had in its originating source.
    pub fn find_by_external_id(&self, external_id: &str) -> Result<Option<CatalogEntry>> {
        let entry = self
            .conn
            .query_row(
                &format!("SELECT {ENTRY_COLUMNS} FROM tracks WHERE external_id = ?1"),
                params![external_id],
                entry_from_row,
            )
            .optional()?;
        Ok(entry)
    }

    /// Look up one entry by primary id, falling back to the external id.
    pub fn lookup_entry(&self, track_ref: &str) -> Result<Option<CatalogEntry>> {
        let track_ref = track_ref.trim();
        if let Ok(id) = track_ref.parse::<i64>() {
            if let Some(entry) = self.get_entry(id)? {
                return Ok(Some(entry));
            }
        }
        self.find_by_external_id(track_ref)
    }

    /// All analyzed entries in catalog (id) order.
    pub fn get_analyzed_entries(&self) -> Result<Vec<CatalogEntry>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ENTRY_COLUMNS} FROM tracks
             WHERE analysis_status = 'analyzed'
             ORDER BY id"
        ))?;
        let entries = stmt
            .query_map([], entry_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Atomically mark a track analyzed and replace its fingerprint.
    pub fn store_fingerprint(&self, track_id: i64, fp: &TrackFingerprint) -> Result<()> {
        let waveform_json = serde_json::to_string(&fp.waveform)?;
        let changed = self.conn.execute(
            "UPDATE tracks SET
                analysis_status = 'analyzed', analysis_error = NULL,
                bpm = ?2, key_signature = ?3, cue_in = ?4, cue_out = ?5,
                duration = ?6, waveform_data = ?7,
                analyzed_at = datetime('now'), updated_at = datetime('now')
             WHERE id = ?1",
            params![
                track_id,
                fp.tempo_bpm,
                fp.musical_key.to_string(),
                fp.cue_in,
                fp.cue_out,
                fp.duration_secs,
                waveform_json,
            ],
        )?;
        if changed == 0 {
            return Err(DbError::NotFound(track_id));
        }
        Ok(())
    }

    /// Atomically mark a track failed, dropping any previous fingerprint.
    pub fn mark_error(&self, track_id: i64, message: &str) -> Result<()> {
        let changed = self.conn.execute(
            &format!(
                "UPDATE tracks SET
                    analysis_status = 'error', analysis_error = ?2,
                    {CLEAR_FINGERPRINT},
                    updated_at = datetime('now')
                 WHERE id = ?1"
            ),
            params![track_id, message],
        )?;
        if changed == 0 {
            return Err(DbError::NotFound(track_id));
        }
        Ok(())
    }

    /// Get library statistics.
    pub fn stats(&self) -> Result<LibraryStats> {
        let (total_tracks, pending_tracks, analyzed_tracks, error_tracks): (i64, i64, i64, i64) =
            self.conn.query_row(
                "SELECT COUNT(*),
                        COALESCE(SUM(analysis_status = 'pending'), 0),
                        COALESCE(SUM(analysis_status = 'analyzed'), 0),
                        COALESCE(SUM(analysis_status = 'error'), 0)
                 FROM tracks",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )?;

        let total_duration_hours: f64 = self.conn.query_row(
            "SELECT COALESCE(SUM(COALESCE(duration, duration_secs)), 0.0) / 3600.0 FROM tracks",
            [],
            |row| row.get(0),
        )?;

        let mut fmt_stmt = self.conn.prepare(
            "SELECT format, COUNT(*) FROM tracks GROUP BY format ORDER BY COUNT(*) DESC",
        )?;
        let formats: Vec<(String, i64)> = fmt_stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut key_stmt = self.conn.prepare(
            "SELECT key_signature, COUNT(*) FROM tracks
             WHERE analysis_status = 'analyzed'
             GROUP BY key_signature
             ORDER BY COUNT(*) DESC
             LIMIT 24",
        )?;
        let keys: Vec<(String, i64)> = key_stmt
            .query_map([], |row| {
                let key: Option<String> = row.get(0)?;
                Ok((key.unwrap_or_else(|| MusicalKey::Unknown.to_string()), row.get(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(LibraryStats {
            total_tracks,
            pending_tracks,
            analyzed_tracks,
            error_tracks,
            total_duration_hours,
            formats,
            keys,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::key::Mode;

    fn test_track(path: &str) -> NewTrack {
        NewTrack {
            file_path: path.to_string(),
            file_size: 4_200_000,
            file_modified: "1700000000".to_string(),
            format: "mp3".to_string(),
            external_id: None,
            title: "Midnight Drive".to_string(),
            artist: "Neon Coast".to_string(),
            album: Some("Night Shift".to_string()),
            cover_path: None,
            duration_secs: Some(215.0),
        }
    }

    fn test_fingerprint(bpm: f64) -> TrackFingerprint {
        TrackFingerprint {
            tempo_bpm: bpm,
            musical_key: MusicalKey::Known { pitch_class: 9, mode: Mode::Minor },
            cue_in: 12.5,
            cue_out: 190.0,
            duration_secs: 215.0,
            waveform: vec![0.0, 0.5, 1.0],
        }
    }

    #[test]
    fn test_upsert_new_then_unchanged() {
        let db = Database::open_in_memory().unwrap();
        let t = test_track("/music/a.mp3");
        let first = db.upsert_track(&t, false).unwrap();
        assert!(matches!(first, UpsertOutcome::New(_)));

        let second = db.upsert_track(&t, false).unwrap();
        assert_eq!(second, UpsertOutcome::Unchanged(first.id()));
        assert_eq!(db.stats().unwrap().total_tracks, 1);
    }

    #[test]
    fn test_changed_file_resets_fingerprint() {
        let db = Database::open_in_memory().unwrap();
        let mut t = test_track("/music/a.mp3");
        let id = db.upsert_track(&t, false).unwrap().id();
        db.store_fingerprint(id, &test_fingerprint(124.0)).unwrap();

        t.file_size += 1;
        assert_eq!(db.upsert_track(&t, false).unwrap(), UpsertOutcome::Updated(id));

        let entry = db.get_entry(id).unwrap().unwrap();
        assert_eq!(entry.status, AnalysisStatus::Pending);
        assert!(entry.fingerprint.is_none());
    }

    #[test]
    fn test_force_resets_unchanged_file() {
        let db = Database::open_in_memory().unwrap();
        let t = test_track("/music/a.mp3");
        let id = db.upsert_track(&t, false).unwrap().id();
        db.store_fingerprint(id, &test_fingerprint(124.0)).unwrap();

        assert_eq!(db.upsert_track(&t, true).unwrap(), UpsertOutcome::Updated(id));
        assert_eq!(db.get_pending_tracks().unwrap().len(), 1);
    }

    #[test]
    fn test_store_fingerprint_roundtrip() {
        let db = Database::open_in_memory().unwrap();
        let id = db.upsert_track(&test_track("/music/a.mp3"), false).unwrap().id();
        assert_eq!(db.get_pending_tracks().unwrap().len(), 1);

        let fp = test_fingerprint(128.0);
        db.store_fingerprint(id, &fp).unwrap();

        let entry = db.get_entry(id).unwrap().unwrap();
        assert_eq!(entry.status, AnalysisStatus::Analyzed);
        assert!(entry.analyzed_at.is_some());
        assert_eq!(entry.fingerprint, Some(fp));
        assert!(db.get_pending_tracks().unwrap().is_empty());
    }

    #[test]
    fn test_unknown_key_is_stored_and_read_back() {
        let db = Database::open_in_memory().unwrap();
        let id = db.upsert_track(&test_track("/music/a.mp3"), false).unwrap().id();
        let mut fp = test_fingerprint(100.0);
        fp.musical_key = MusicalKey::Unknown;
        db.store_fingerprint(id, &fp).unwrap();

        let entry = db.get_entry(id).unwrap().unwrap();
        assert_eq!(entry.fingerprint.unwrap().musical_key, MusicalKey::Unknown);
    }

    #[test]
    fn test_mark_error_clears_fingerprint() {
        let db = Database::open_in_memory().unwrap();
        let id = db.upsert_track(&test_track("/music/a.mp3"), false).unwrap().id();
        db.store_fingerprint(id, &test_fingerprint(128.0)).unwrap();
        db.mark_error(id, "decode failed").unwrap();

        let entry = db.get_entry(id).unwrap().unwrap();
        assert_eq!(entry.status, AnalysisStatus::Error);
        assert_eq!(entry.analysis_error.as_deref(), Some("decode failed"));
        assert!(entry.fingerprint.is_none());
        assert!(db.get_analyzed_entries().unwrap().is_empty());
    }

    #[test]
    fn test_writes_to_missing_track_fail() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(
            db.store_fingerprint(99, &test_fingerprint(120.0)),
            Err(DbError::NotFound(99))
        ));
        assert!(matches!(db.mark_error(99, "x"), Err(DbError::NotFound(99))));
    }

    #[test]
    fn test_analyzed_entries_in_id_order() {
        let db = Database::open_in_memory().unwrap();
        let a = db.upsert_track(&test_track("/music/a.mp3"), false).unwrap().id();
        let b = db.upsert_track(&test_track("/music/b.mp3"), false).unwrap().id();
        let c = db.upsert_track(&test_track("/music/c.mp3"), false).unwrap().id();
        db.store_fingerprint(c, &test_fingerprint(90.0)).unwrap();
        db.store_fingerprint(a, &test_fingerprint(120.0)).unwrap();

        let ids: Vec<i64> = db.get_analyzed_entries().unwrap().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![a, c]);
        assert_eq!(db.get_pending_tracks().unwrap()[0].id, b);
    }

    #[test]
    fn test_external_id_lookup() {
        let db = Database::open_in_memory().unwrap();
        let mut t = test_track("/music/a.mp3");
        t.external_id = Some("ia-night-shift-01".to_string());
        let id = db.upsert_track(&t, false).unwrap().id();

        let found = db.find_by_external_id("ia-night-shift-01").unwrap().unwrap();
        assert_eq!(found.id, id);
        assert!(db.find_by_external_id("nope").unwrap().is_none());

        // Re-ingest without an external id keeps the stored one
        t.external_id = None;
        db.upsert_track(&t, true).unwrap();
        assert!(db.find_by_external_id("ia-night-shift-01").unwrap().is_some());
    }

    #[test]
    fn test_lookup_entry_by_id_then_external_id() {
        let db = Database::open_in_memory().unwrap();
        let mut t = test_track("/music/a.mp3");
        t.external_id = Some("ia-7".to_string());
        let id = db.upsert_track(&t, false).unwrap().id();

        assert_eq!(db.lookup_entry(&id.to_string()).unwrap().unwrap().id, id);
        assert_eq!(db.lookup_entry(" ia-7 ").unwrap().unwrap().id, id);
        assert!(db.lookup_entry("999").unwrap().is_none());
        assert!(db.lookup_entry("ia-8").unwrap().is_none());
    }

    #[test]
    fn test_analyzed_row_without_bpm_is_an_error() {
        let db = Database::open_in_memory().unwrap();
        let id = db.upsert_track(&test_track("/music/a.mp3"), false).unwrap().id();
        db.conn
            .execute(
                "UPDATE tracks SET analysis_status = 'analyzed', bpm = NULL WHERE id = ?1",
                params![id],
            )
            .unwrap();

        assert!(matches!(
            db.get_entry(id),
            Err(DbError::Sqlite(rusqlite::Error::FromSqlConversionFailure(9, Type::Null, _)))
        ));
        assert!(db.get_analyzed_entries().is_err());
    }

    #[test]
    fn test_stats_counts_statuses() {
        let db = Database::open_in_memory().unwrap();
        let a = db.upsert_track(&test_track("/music/a.mp3"), false).unwrap().id();
        let b = db.upsert_track(&test_track("/music/b.mp3"), false).unwrap().id();
        db.upsert_track(&test_track("/music/c.mp3"), false).unwrap();
        db.store_fingerprint(a, &test_fingerprint(120.0)).unwrap();
        db.mark_error(b, "boom").unwrap();

        let stats = db.stats().unwrap();
        assert_eq!(stats.total_tracks, 3);
        assert_eq!(stats.pending_tracks, 1);
        assert_eq!(stats.analyzed_tracks, 1);
        assert_eq!(stats.error_tracks, 1);
        assert_eq!(stats.formats, vec![("mp3".to_string(), 3)]);
        assert_eq!(stats.keys, vec![("A Minor".to_string(), 1)]);
    }

    #[test]
    fn test_stats_empty() {
        let db = Database::open_in_memory().unwrap();
        let stats = db.stats().unwrap();
        assert_eq!(stats.total_tracks, 0);
        assert_eq!(stats.analyzed_tracks, 0);
        assert_eq!(stats.total_duration_hours, 0.0);
    }
}
