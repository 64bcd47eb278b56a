//! Hierarchy resolver: the missing-ancestor chain of a site.
//!
//! The leaf is looked up in the target by code. While it is missing, each
//! `reports_to` parent is looked up in the target before it is fetched from the
//! source: the first hit ends the walk and becomes the anchor, a miss is
//! fetched and queued. A site without a parent is a hierarchy root and ends the
//! walk with no anchor.

use std::collections::HashSet;

use facility_core::{ExistingUnit, SourceRecord};

use crate::error::SyncError;
use crate::source::SourceRegistry;
use crate::target::TargetStore;

/// Limits applied while walking upward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainLimits {
    pub max_depth: usize,
    /// Name given to a missing root whose own name is blank.
    pub root_label: String,
}

/// Result of walking a leaf's ancestry.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedChain {
    /// Sites absent from the target, root-most first, leaf last.
    pub missing: Vec<SourceRecord>,
    /// The existing unit the chain hangs from; `None` when it starts at a root.
    pub anchor: Option<ExistingUnit>,
}

impl ResolvedChain {
    /// The leaf itself is already in the target.
    pub fn is_present(&self) -> bool {
        self.missing.is_empty()
    }
}

pub fn resolve_chain(
    leaf: &SourceRecord,
    source: &dyn SourceRegistry,
    target: &dyn TargetStore,
    limits: &ChainLimits,
) -> Result<ResolvedChain, SyncError> {
    if let Some(unit) = target.find_by_code(leaf.id.as_str())? {
        return Ok(ResolvedChain {
            missing: Vec::new(),
            anchor: Some(unit),
        });
    }

    let exceeded = || SyncError::CycleOrDepthExceeded {
        leaf: leaf.id.clone(),
        depth: limits.max_depth,
    };

    let mut missing: Vec<SourceRecord> = Vec::new();
    let mut visited = HashSet::from([leaf.id.clone()]);
    let mut current = leaf.clone();

    loop {
        let parent = current.parent_ref().cloned();
        missing.push(current);
        if missing.len() > limits.max_depth {
            return Err(exceeded());
        }

        let Some(parent_id) = parent else {
            if let Some(root) = missing.last_mut() {
                if root.name.trim().is_empty() {
                    root.name = limits.root_label.clone();
                }
            }
            missing.reverse();
            tracing::debug!("{}: chain of {} reaches a root", leaf.id, missing.len());
            return Ok(ResolvedChain {
                missing,
                anchor: None,
            });
        };

        if !visited.insert(parent_id.clone()) {
            return Err(exceeded());
        }

        if let Some(unit) = target.find_by_code(parent_id.as_str())? {
            tracing::debug!("{}: anchored at {} ({})", leaf.id, parent_id, unit.id);
            missing.reverse();
            return Ok(ResolvedChain {
                missing,
                anchor: Some(unit),
            });
        }

        current = source.fetch_site(&parent_id)?;
    }
}
