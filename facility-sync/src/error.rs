//! Error types for facility-sync.

use std::path::PathBuf;

use thiserror::Error;

use facility_core::{CursorKind, SourceId};

/// All errors that can arise from a sync pass.
///
/// Everything except [`SyncError::TargetCreateFailed`] and
/// [`SyncError::NotificationFailed`] aborts the pass.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A watermark file is missing or does not hold a timestamp.
    #[error("{kind} cursor unavailable at {path}: {reason}")]
    CursorUnavailable {
        kind: CursorKind,
        path: PathBuf,
        reason: String,
    },

    /// A watermark could not be written; the previous value is untouched.
    #[error("failed to persist {kind} cursor at {path}: {source}")]
    CursorPersistFailed {
        kind: CursorKind,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Transport failure or non-success status from the registry.
    #[error("source request {url} failed: {reason}")]
    SourceFetchFailed { url: String, reason: String },

    /// The registry answered, but with an `error` field or an undecodable body.
    #[error("source returned a malformed response for {url}: {message}")]
    SourceMalformedResponse { url: String, message: String },

    /// The configured collection name is not in the registry's listing.
    #[error("collection {name:?} not found in the source registry")]
    CollectionNotFound { name: String },

    /// Transport, status, or decoding failure talking to the target.
    #[error("target request {url} failed: {reason}")]
    TargetFetchFailed { url: String, reason: String },

    /// The target refused to create a unit. Recovered inside chain creation.
    #[error("target rejected creation of {code}: {reason}")]
    TargetCreateFailed { code: String, reason: String },

    /// The bulk update call failed or reported an `ERROR` import status.
    #[error("bulk update of {count} units failed: {reason}")]
    TargetBulkUpdateFailed { count: usize, reason: String },

    /// An updated record's parent has no unit in the target.
    #[error("parent {parent} of {code} is not present in the target")]
    ParentUnresolved { code: SourceId, parent: SourceId },

    /// An updated record has no unit of its own in the target.
    #[error("{code} changed but has no unit in the target")]
    UnitUnresolved { code: SourceId },

    /// The parent walk revisited a site or exceeded the depth bound.
    #[error("ancestor chain of {leaf} loops or exceeds {depth} levels")]
    CycleOrDepthExceeded { leaf: SourceId, depth: usize },

    /// The activity feed could not be fetched or parsed.
    #[error("activity feed unavailable: {reason}")]
    FeedUnavailable { reason: String },

    /// A notification could not be posted. Logged and counted, never fatal.
    #[error("failed to send notification {subject:?}: {reason}")]
    NotificationFailed { subject: String, reason: String },

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SyncError {
    /// Whether the pass may continue past this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SyncError::TargetCreateFailed { .. } | SyncError::NotificationFailed { .. }
        )
    }
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
