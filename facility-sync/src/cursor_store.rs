//! Cursor store: the two incremental watermarks.
//!
//! Each watermark is a one-line text file in the state directory
//! (`last_added`, `last_updated`) holding `YYYY-MM-DD HH:MM:SS±HHMM`.
//! Writes use the same atomic `.tmp` + rename pattern as the config store.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, FixedOffset, Utc};

use facility_core::{config, CursorKind, SyncConfig};

use crate::error::{io_err, SyncError};

/// On-disk timestamp format.
pub const CURSOR_FORMAT: &str = "%Y-%m-%d %H:%M:%S%z";

/// A persisted watermark value.
pub type Stamp = DateTime<FixedOffset>;

/// Render a stamp in [`CURSOR_FORMAT`].
pub fn format_stamp(stamp: Stamp) -> String {
    stamp.format(CURSOR_FORMAT).to_string()
}

/// Parse a stamp written by [`format_stamp`].
///
/// Also accepts a colon in the offset and RFC 3339, so hand-edited files load.
pub fn parse_stamp(raw: &str) -> Option<Stamp> {
    let raw = raw.trim();
    DateTime::parse_from_str(raw, CURSOR_FORMAT)
        .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%:z"))
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .ok()
}

/// Shift a stored watermark back by the configured skew before filtering.
pub fn adjust_for_skew(stamp: Stamp, skew_hours: i64) -> Stamp {
    stamp - Duration::hours(skew_hours)
}

/// File-backed store for both watermarks.
#[derive(Debug, Clone)]
pub struct CursorStore {
    dir: PathBuf,
}

impl CursorStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store rooted at the configured (or default) state directory.
    pub fn for_config_at(home: &Path, config: &SyncConfig) -> Self {
        Self::new(config::state_dir_at(home, config))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file backing `kind`, pure, no I/O.
    pub fn path(&self, kind: CursorKind) -> PathBuf {
        self.dir.join(kind.file_name())
    }

    pub fn exists(&self, kind: CursorKind) -> bool {
        self.path(kind).exists()
    }

    /// Read a watermark. A missing or unparsable file is `CursorUnavailable`.
    pub fn read(&self, kind: CursorKind) -> Result<Stamp, SyncError> {
        let path = self.path(kind);
        let unavailable = |reason: String| SyncError::CursorUnavailable {
            kind,
            path: path.clone(),
            reason,
        };
        let contents = std::fs::read_to_string(&path).map_err(|e| unavailable(e.to_string()))?;
        parse_stamp(&contents)
            .ok_or_else(|| unavailable(format!("not a timestamp: {:?}", contents.trim())))
    }

    /// Atomically replace a watermark.
    ///
    /// Writes to `<file>.tmp` then renames onto `<file>`; on failure the old
    /// value is left in place.
    pub fn write(&self, kind: CursorKind, stamp: Stamp) -> Result<(), SyncError> {
        let path = self.path(kind);
        let persist = |source: std::io::Error| SyncError::CursorPersistFailed {
            kind,
            path: path.clone(),
            source,
        };

        std::fs::create_dir_all(&self.dir).map_err(persist)?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, format_stamp(stamp)).map_err(persist)?;
        if let Err(e) = std::fs::rename(&tmp, &path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(persist(e));
        }
        tracing::debug!("{kind} cursor -> {}", format_stamp(stamp));
        Ok(())
    }

    /// Commit a finished half-pass: store `max(previous, now)`.
    ///
    /// Returns the value actually written.
    pub fn advance(
        &self,
        kind: CursorKind,
        previous: Stamp,
        now: DateTime<Utc>,
    ) -> Result<Stamp, SyncError> {
        let now: Stamp = now.into();
        let next = if now > previous { now } else { previous };
        self.write(kind, next)?;
        Ok(next)
    }

    /// Create a watermark only if none exists yet. Returns whether it wrote.
    pub fn seed(&self, kind: CursorKind, stamp: Stamp) -> Result<bool, SyncError> {
        if self.exists(kind) {
            return Ok(false);
        }
        if !self.dir.exists() {
            std::fs::create_dir_all(&self.dir).map_err(|e| io_err(&self.dir, e))?;
        }
        self.write(kind, stamp)?;
        Ok(true)
    }
}
