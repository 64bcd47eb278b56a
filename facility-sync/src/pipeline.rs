//! Shared sync pipeline entrypoint used by CLI and daemon.

use std::path::Path;

use facility_core::{ExistingUnit, SourceId, SyncConfig};

use crate::cursor_store::CursorStore;
use crate::error::SyncError;
use crate::hierarchy::{resolve_chain, ChainLimits};
use crate::http::{HttpSource, HttpTarget};
use crate::orchestrator::{Clock, Orchestrator, PassFailure, PassSettings, SystemClock};
use crate::phcu::{classify, PhcuPlan};
use crate::report::{Envelope, PassReport};
use crate::source::SourceRegistry;
use crate::target::{DryRunTarget, StagedWrites, TargetStore};

/// Result of one pipeline run.
#[derive(Debug)]
pub struct SyncRun {
    pub result: Result<PassReport, PassFailure>,
    /// What a dry run would have written.
    pub staged: Option<StagedWrites>,
}

impl SyncRun {
    pub fn envelope(&self) -> Envelope {
        Envelope::from_result(&self.result)
    }
}

/// Run one pass against the systems named in `config`.
///
/// This is the canonical sync entrypoint for both `facility sync` and the
/// daemon's trigger endpoint.
pub fn run_pass_at(home: &Path, config: &SyncConfig, dry_run: bool) -> SyncRun {
    let source = HttpSource::from_config(config);
    let target = HttpTarget::from_config(config);
    let cursors = CursorStore::for_config_at(home, config);
    run_with(&source, &target, &cursors, config, dry_run, &SystemClock)
}

/// Run one pass over explicit collaborators. In dry-run mode the target is
/// wrapped so nothing is written.
pub fn run_with(
    source: &dyn SourceRegistry,
    target: &dyn TargetStore,
    cursors: &CursorStore,
    config: &SyncConfig,
    dry_run: bool,
    clock: &dyn Clock,
) -> SyncRun {
    let settings = PassSettings::from_config(config, dry_run);
    if dry_run {
        let staging = DryRunTarget::new(target);
        let result = Orchestrator::new(source, &staging, cursors, settings, clock).run();
        SyncRun {
            result,
            staged: Some(staging.staged()),
        }
    } else {
        SyncRun {
            result: Orchestrator::new(source, target, cursors, settings, clock).run(),
            staged: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Chain preview
// ---------------------------------------------------------------------------

/// One site that a pass would create, with its PHCU plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewStep {
    pub code: SourceId,
    pub name: String,
    pub plan: PhcuPlan,
}

/// Read-only view of what creating a site would involve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainPreview {
    pub leaf: SourceId,
    pub anchor: Option<ExistingUnit>,
    /// Root-most first; empty when the site already exists.
    pub steps: Vec<PreviewStep>,
}

/// Resolve `site_id`'s missing chain against the configured systems without writing.
pub fn preview_chain(config: &SyncConfig, site_id: &SourceId) -> Result<ChainPreview, SyncError> {
    let source = HttpSource::from_config(config);
    let target = HttpTarget::from_config(config);
    let limits = PassSettings::from_config(config, true).limits;
    preview_with(&source, &target, &limits, site_id)
}

pub fn preview_with(
    source: &dyn SourceRegistry,
    target: &dyn TargetStore,
    limits: &ChainLimits,
    site_id: &SourceId,
) -> Result<ChainPreview, SyncError> {
    let leaf = source.fetch_site(site_id)?;
    let chain = resolve_chain(&leaf, source, target, limits)?;
    Ok(ChainPreview {
        leaf: leaf.id.clone(),
        steps: chain
            .missing
            .iter()
            .map(|record| PreviewStep {
                code: record.id.clone(),
                name: record.name.clone(),
                plan: classify(record),
            })
            .collect(),
        anchor: chain.anchor,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor_store::parse_stamp;
    use crate::test_support::{phcu, MemorySource, MemoryTarget};
    use facility_core::config::{
        DaemonConfig, EngineConfig, NotifyConfig, SourceConfig, TargetConfig,
    };
    use facility_core::{CursorKind, SourceRecord, TargetId};
    use tempfile::TempDir;

    fn config() -> SyncConfig {
        SyncConfig {
            source: SourceConfig {
                base_url: "http://mfr".into(),
                username: "u".into(),
                password: "p".into(),
                collection_name: "c".into(),
                collection_id: Some("1".into()),
            },
            target: TargetConfig {
                base_url: "http://dhis".into(),
                username: "u".into(),
                password: "p".into(),
            },
            sync: EngineConfig::default(),
            notify: NotifyConfig::default(),
            daemon: DaemonConfig::default(),
        }
    }

    #[test]
    fn dry_run_reports_staged_writes() {
        let tmp = TempDir::new().expect("tmp");
        let cursors = CursorStore::new(tmp.path());
        let start = parse_stamp("2024-01-01 00:00:00+0000").expect("stamp");
        cursors.seed(CursorKind::Created, start).expect("seed");
        cursors.seed(CursorKind::Updated, start).expect("seed");

        let source = MemorySource::default()
            .with_page(CursorKind::Created, vec![SourceRecord::new("F1", "Clinic")]);
        let target = MemoryTarget::default();

        let run = run_with(&source, &target, &cursors, &config(), true, &SystemClock);
        assert!(run.envelope().is_success());
        let staged = run.staged.expect("staged");
        assert_eq!(staged.created.len(), 1);
        assert_eq!(target.create_calls(), 0);
        assert_eq!(cursors.read(CursorKind::Created).expect("read"), start);
    }

    #[test]
    fn failed_run_produces_failed_envelope() {
        let tmp = TempDir::new().expect("tmp");
        let cursors = CursorStore::new(tmp.path());
        let run = run_with(
            &MemorySource::default(),
            &MemoryTarget::default(),
            &cursors,
            &config(),
            false,
            &SystemClock,
        );
        let envelope = run.envelope();
        assert!(!envelope.is_success());
        assert_eq!(envelope.http_status, 500);
        assert!(run.staged.is_none());
    }

    #[test]
    fn preview_lists_missing_chain_with_plans() {
        let source = MemorySource::default()
            .with_site(SourceRecord::new("W1", "Woreda").reporting_to("Z1"))
            .with_site(phcu("F2", "Dukem HP", None).reporting_to("W1"));
        let target = MemoryTarget::default().with_unit("Z1", "T-Z1");
        let limits = PassSettings::from_config(&config(), true).limits;

        let preview = preview_with(&source, &target, &limits, &SourceId::from("F2")).expect("preview");
        let codes: Vec<&str> = preview.steps.iter().map(|s| s.code.as_str()).collect();
        assert_eq!(codes, vec!["W1", "F2"]);
        assert_eq!(preview.steps[1].plan.shell_code(), Some("F2PHCU"));
        assert_eq!(preview.anchor.map(|u| u.id), Some(TargetId::from("T-Z1")));
        assert_eq!(target.create_calls(), 0);
    }
}
