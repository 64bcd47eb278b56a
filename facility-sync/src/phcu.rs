//! PHCU splitting policy.
//!
//! A site flagged `isphcu` is materialised under a synthetic "shell" unit
//! whose code is the owning PHCU's id plus [`SHELL_SUFFIX`].

use facility_core::types::SHORT_NAME_MAX_CHARS;
use facility_core::{SourceRecord, TargetEntity, TargetId};

use crate::mapping;

pub const SHELL_SUFFIX: &str = "PHCU";

/// How a site maps onto target units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhcuPlan {
    /// One unit, code = site id.
    Simple,
    /// The site heads its own PHCU: shell `<id>PHCU`, then the site under it.
    ShellThenChild { shell_code: String },
    /// The site belongs to another PHCU: shell `<phcuparentid>PHCU`, then the site under it.
    ChildOfExistingShell { shell_code: String },
}

impl PhcuPlan {
    pub fn shell_code(&self) -> Option<&str> {
        match self {
            PhcuPlan::Simple => None,
            PhcuPlan::ShellThenChild { shell_code }
            | PhcuPlan::ChildOfExistingShell { shell_code } => Some(shell_code.as_str()),
        }
    }
}

pub fn shell_code_for(id: &str) -> String {
    format!("{id}{SHELL_SUFFIX}")
}

pub fn classify(record: &SourceRecord) -> PhcuPlan {
    if !record.properties.is_phcu {
        return PhcuPlan::Simple;
    }
    match &record.properties.phcu_parent_id {
        None => PhcuPlan::ShellThenChild {
            shell_code: shell_code_for(record.id.as_str()),
        },
        Some(owner) => PhcuPlan::ChildOfExistingShell {
            shell_code: shell_code_for(owner.as_str()),
        },
    }
}

/// Shell unit for `record`, named after the site that triggered it.
pub fn shell_entity(record: &SourceRecord, shell_code: &str, parent: Option<&TargetId>) -> TargetEntity {
    let mut shell = mapping::to_entity(record, parent);
    let suffix = format!(" {SHELL_SUFFIX}");
    let room = SHORT_NAME_MAX_CHARS - suffix.chars().count();
    let base: String = shell.short_name.chars().take(room).collect();

    shell.code = shell_code.to_string();
    shell.name = format!("{}{suffix}", shell.name);
    shell.short_name = format!("{}{suffix}", base.trim_end());
    shell.latitude = None;
    shell.longitude = None;
    shell.phone_number = None;
    shell
}
