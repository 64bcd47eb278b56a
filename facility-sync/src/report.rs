//! Pass report and the boundary envelope returned to triggers.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::notifier::NotifySummary;
use crate::orchestrator::PassFailure;
use crate::upsert::ChainOutcome;

// ---------------------------------------------------------------------------
// Pass report
// ---------------------------------------------------------------------------

/// One named step of the orchestration log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub name: String,
    pub at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Filters used and values committed for both watermarks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorWindow {
    pub created_since: Option<String>,
    pub updated_since: Option<String>,
    pub committed_created: Option<String>,
    pub committed_updated: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedSummary {
    pub pages: usize,
    pub sites: usize,
    /// Listed sites that already had a unit.
    pub already_present: usize,
    pub created: usize,
    /// Ancestors and shells found on the way.
    pub existing: usize,
    /// Codes the target refused to create.
    pub rejected: Vec<String>,
}

impl CreatedSummary {
    pub fn absorb(&mut self, outcome: &ChainOutcome) {
        self.created += outcome.created();
        self.existing += outcome.existing();
        self.rejected.extend(
            outcome
                .steps
                .iter()
                .filter(|s| matches!(s, crate::upsert::StepOutcome::Rejected { .. }))
                .map(|s| s.code().to_string()),
        );
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatedSummary {
    pub pages: usize,
    pub submitted: usize,
}

/// Everything a single pass did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PassReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub dry_run: bool,
    pub cursors: CursorWindow,
    pub created: CreatedSummary,
    pub updated: UpdatedSummary,
    /// `None` when the notification pass did not run.
    pub notified: Option<NotifySummary>,
    #[serde(skip)]
    pub log: Vec<LogEntry>,
}

impl PassReport {
    pub fn new(started_at: DateTime<Utc>, dry_run: bool) -> Self {
        Self {
            started_at,
            finished_at: None,
            dry_run,
            cursors: CursorWindow::default(),
            created: CreatedSummary::default(),
            updated: UpdatedSummary::default(),
            notified: None,
            log: Vec::new(),
        }
    }

    pub fn record(&mut self, name: impl Into<String>, at: DateTime<Utc>, detail: Option<String>) {
        self.log.push(LogEntry {
            name: name.into(),
            at,
            detail,
        });
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnvelopeStatus {
    Successful,
    Failed,
}

/// `{status, httpStatus, body, orchestrationLog, properties}` as returned by
/// the trigger endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub status: EnvelopeStatus,
    pub http_status: u16,
    pub body: serde_json::Value,
    pub orchestration_log: Vec<LogEntry>,
    pub properties: BTreeMap<String, String>,
}

impl Envelope {
    pub fn success(report: &PassReport) -> Self {
        let mut properties = BTreeMap::new();
        properties.insert("state".to_string(), "Done".to_string());
        properties.insert("dryRun".to_string(), report.dry_run.to_string());
        Self {
            status: EnvelopeStatus::Successful,
            http_status: 200,
            body: serde_json::to_value(report).unwrap_or_default(),
            orchestration_log: report.log.clone(),
            properties,
        }
    }

    pub fn failure(failure: &PassFailure) -> Self {
        let mut properties = BTreeMap::new();
        properties.insert("state".to_string(), failure.state.to_string());
        properties.insert("dryRun".to_string(), failure.report.dry_run.to_string());
        Self {
            status: EnvelopeStatus::Failed,
            http_status: 500,
            body: serde_json::json!({
                "error": failure.error.to_string(),
                "state": failure.state,
                "report": failure.report,
            }),
            orchestration_log: failure.report.log.clone(),
            properties,
        }
    }

    pub fn from_result(result: &Result<PassReport, PassFailure>) -> Self {
        match result {
            Ok(report) => Self::success(report),
            Err(failure) => Self::failure(failure),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == EnvelopeStatus::Successful
    }
}
