//! Sync orchestrator: one full pass as an explicit state machine.
//!
//! ```text
//! ReadCursors → CreatedPass → CommitCreated → UpdatedPass → CommitUpdated → NotifyPass → Done
//! ```
//!
//! Any fatal error aborts in the state it occurred in. Each half's cursor is
//! committed as soon as that half succeeds, so a failure in the updated pass
//! keeps the created cursor already written.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use facility_core::{CursorKind, SyncConfig};

use crate::cursor_store::{adjust_for_skew, format_stamp, CursorStore, Stamp};
use crate::error::SyncError;
use crate::hierarchy::{resolve_chain, ChainLimits};
use crate::notifier::{notify_changes, NotifySummary};
use crate::reconcile::reconcile_page;
use crate::report::PassReport;
use crate::source::{PageToken, SitePages, SourceRegistry};
use crate::target::TargetStore;
use crate::upsert::ensure_chain;

// ---------------------------------------------------------------------------
// States and failures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PassState {
    ReadCursors,
    CreatedPass,
    CommitCreated,
    UpdatedPass,
    CommitUpdated,
    NotifyPass,
    Done,
}

impl fmt::Display for PassState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A pass that aborted, with the work it completed before the error.
#[derive(Debug, Error)]
#[error("sync pass aborted in {state}: {error}")]
pub struct PassFailure {
    pub state: PassState,
    #[source]
    pub error: SyncError,
    pub report: PassReport,
}

// ---------------------------------------------------------------------------
// Settings and clock
// ---------------------------------------------------------------------------

/// Source of "now" for cursor commits and log timestamps.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassSettings {
    pub skew_hours: i64,
    pub limits: ChainLimits,
    /// Target user ids to notify; the notification pass is skipped when empty.
    pub recipients: Vec<String>,
    /// Leave both cursors untouched.
    pub dry_run: bool,
}

impl PassSettings {
    pub fn from_config(config: &SyncConfig, dry_run: bool) -> Self {
        Self {
            skew_hours: config.sync.skew_hours,
            limits: ChainLimits {
                max_depth: config.sync.max_chain_depth,
                root_label: config.sync.root_label.clone(),
            },
            recipients: config.notify.recipients.clone(),
            dry_run,
        }
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct Orchestrator<'a> {
    source: &'a dyn SourceRegistry,
    target: &'a dyn TargetStore,
    cursors: &'a CursorStore,
    settings: PassSettings,
    clock: &'a dyn Clock,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        source: &'a dyn SourceRegistry,
        target: &'a dyn TargetStore,
        cursors: &'a CursorStore,
        settings: PassSettings,
        clock: &'a dyn Clock,
    ) -> Self {
        Self {
            source,
            target,
            cursors,
            settings,
            clock,
        }
    }

    /// Run one full pass.
    pub fn run(&self) -> Result<PassReport, PassFailure> {
        let mut report = PassReport::new(self.clock.now(), self.settings.dry_run);
        match self.drive(&mut report) {
            Ok(()) => {
                self.enter(&mut report, PassState::Done);
                report.finished_at = Some(self.clock.now());
                tracing::info!(
                    "sync pass done: {} created, {} updated",
                    report.created.created,
                    report.updated.submitted
                );
                Ok(report)
            }
            Err((state, error)) => {
                tracing::error!("sync pass aborted in {state}: {error}");
                report.record("Aborted", self.clock.now(), Some(error.to_string()));
                report.finished_at = Some(self.clock.now());
                Err(PassFailure {
                    state,
                    error,
                    report,
                })
            }
        }
    }

    fn drive(&self, report: &mut PassReport) -> Result<(), (PassState, SyncError)> {
        let state = self.enter(report, PassState::ReadCursors);
        let created_prev = self.cursors.read(CursorKind::Created).map_err(at(state))?;
        let updated_prev = self.cursors.read(CursorKind::Updated).map_err(at(state))?;
        let created_since = adjust_for_skew(created_prev, self.settings.skew_hours);
        let updated_since = adjust_for_skew(updated_prev, self.settings.skew_hours);
        report.cursors.created_since = Some(format_stamp(created_since));
        report.cursors.updated_since = Some(format_stamp(updated_since));

        let state = self.enter(report, PassState::CreatedPass);
        self.created_pass(created_since, report).map_err(at(state))?;

        let state = self.enter(report, PassState::CommitCreated);
        report.cursors.committed_created = self
            .commit(CursorKind::Created, created_prev)
            .map_err(at(state))?
            .map(format_stamp);

        let state = self.enter(report, PassState::UpdatedPass);
        self.updated_pass(updated_since, report).map_err(at(state))?;

        let state = self.enter(report, PassState::CommitUpdated);
        report.cursors.committed_updated = self
            .commit(CursorKind::Updated, updated_prev)
            .map_err(at(state))?
            .map(format_stamp);

        let state = self.enter(report, PassState::NotifyPass);
        report.notified = self.notify_pass(updated_since).map_err(at(state))?;
        Ok(())
    }

    fn enter(&self, report: &mut PassReport, state: PassState) -> PassState {
        tracing::debug!("sync pass -> {state}");
        report.record(state.to_string(), self.clock.now(), None);
        state
    }

    fn created_pass(&self, since: Stamp, report: &mut PassReport) -> Result<(), SyncError> {
        let first = PageToken::First {
            kind: CursorKind::Created,
            since: format_stamp(since),
        };
        for page in SitePages::new(self.source, first) {
            let sites = page?;
            report.created.pages += 1;
            for site in &sites {
                report.created.sites += 1;
                let chain = resolve_chain(site, self.source, self.target, &self.settings.limits)?;
                if chain.is_present() {
                    report.created.already_present += 1;
                    continue;
                }
                let outcome =
                    ensure_chain(&chain.missing, chain.anchor.map(|u| u.id), self.target)?;
                report.created.absorb(&outcome);
                report.record(
                    format!("Register in target - {}", site.id),
                    self.clock.now(),
                    Some(format!(
                        "{} created, {} existing, {} rejected",
                        outcome.created(),
                        outcome.existing(),
                        outcome.rejected()
                    )),
                );
            }
        }
        Ok(())
    }

    fn updated_pass(&self, since: Stamp, report: &mut PassReport) -> Result<(), SyncError> {
        let first = PageToken::First {
            kind: CursorKind::Updated,
            since: format_stamp(since),
        };
        for page in SitePages::new(self.source, first) {
            let sites = page?;
            report.updated.pages += 1;
            let submitted = reconcile_page(&sites, self.target)?;
            report.updated.submitted += submitted;
            report.record(
                format!("Bulk update page {}", report.updated.pages),
                self.clock.now(),
                Some(format!("{submitted} units")),
            );
        }
        Ok(())
    }

    /// Store `max(previous, now)`, or nothing in dry-run mode.
    fn commit(&self, kind: CursorKind, previous: Stamp) -> Result<Option<Stamp>, SyncError> {
        if self.settings.dry_run {
            tracing::info!("[dry-run] {kind} cursor not committed");
            return Ok(None);
        }
        self.cursors
            .advance(kind, previous, self.clock.now())
            .map(Some)
    }

    fn notify_pass(&self, since: Stamp) -> Result<Option<NotifySummary>, SyncError> {
        if self.settings.recipients.is_empty() {
            tracing::info!("no notification recipients configured; skipping");
            return Ok(None);
        }
        let items = self.source.fetch_activity()?;
        notify_changes(&items, since, &self.settings.recipients, self.target).map(Some)
    }
}

fn at(state: PassState) -> impl FnOnce(SyncError) -> (PassState, SyncError) {
    move |error| (state, error)
}
