//! Upsert executor: materialise a missing chain top-down.
//!
//! Every unit is looked up by code before it is created, so replaying a chain
//! never duplicates a code. The id obtained for one element (or its shell)
//! becomes the parent of the next.

use facility_core::{SourceRecord, TargetEntity, TargetId};

use crate::error::SyncError;
use crate::mapping;
use crate::phcu;
use crate::target::TargetStore;

/// What happened to one unit of a chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Found by code; nothing written.
    Existing { code: String, id: TargetId },
    Created { code: String, id: TargetId },
    /// The target refused the create; the previous parent was carried forward.
    Rejected { code: String, reason: String },
}

impl StepOutcome {
    pub fn code(&self) -> &str {
        match self {
            StepOutcome::Existing { code, .. }
            | StepOutcome::Created { code, .. }
            | StepOutcome::Rejected { code, .. } => code,
        }
    }
}

/// Result of [`ensure_chain`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainOutcome {
    /// Parent id in effect after the leaf; the leaf's own id unless it was rejected.
    pub final_parent: Option<TargetId>,
    pub steps: Vec<StepOutcome>,
}

impl ChainOutcome {
    pub fn created(&self) -> usize {
        self.count(|s| matches!(s, StepOutcome::Created { .. }))
    }

    pub fn existing(&self) -> usize {
        self.count(|s| matches!(s, StepOutcome::Existing { .. }))
    }

    pub fn rejected(&self) -> usize {
        self.count(|s| matches!(s, StepOutcome::Rejected { .. }))
    }

    fn count(&self, pred: impl Fn(&StepOutcome) -> bool) -> usize {
        self.steps.iter().filter(|s| pred(s)).count()
    }
}

/// Walk `chain` root to leaf, creating whatever the target lacks.
///
/// `root_parent` is the anchor the chain hangs from (`None` for a chain that
/// starts at a hierarchy root). Rejected creates are recorded and skipped;
/// any other error aborts.
pub fn ensure_chain(
    chain: &[SourceRecord],
    root_parent: Option<TargetId>,
    target: &dyn TargetStore,
) -> Result<ChainOutcome, SyncError> {
    let mut parent = root_parent;
    let mut steps = Vec::new();

    for record in chain {
        let plan = phcu::classify(record);
        if let Some(shell_code) = plan.shell_code() {
            let shell = phcu::shell_entity(record, shell_code, parent.as_ref());
            if let Some(id) = lookup_or_create(&shell, target, &mut steps)? {
                parent = Some(id);
            }
        }

        let entity = mapping::to_entity(record, parent.as_ref());
        if let Some(id) = lookup_or_create(&entity, target, &mut steps)? {
            parent = Some(id);
        }
    }

    Ok(ChainOutcome {
        final_parent: parent,
        steps,
    })
}

fn lookup_or_create(
    entity: &TargetEntity,
    target: &dyn TargetStore,
    steps: &mut Vec<StepOutcome>,
) -> Result<Option<TargetId>, SyncError> {
    if let Some(unit) = target.find_by_code(&entity.code)? {
        steps.push(StepOutcome::Existing {
            code: entity.code.clone(),
            id: unit.id.clone(),
        });
        return Ok(Some(unit.id));
    }

    match target.create(entity) {
        Ok(id) => {
            tracing::info!(
                "created {} ({}) under {}",
                entity.code,
                id,
                entity.parent_id().map_or("<root>", |p| p.as_str())
            );
            steps.push(StepOutcome::Created {
                code: entity.code.clone(),
                id: id.clone(),
            });
            Ok(Some(id))
        }
        Err(err) if err.is_recoverable() => {
            tracing::warn!("{err}; continuing with previous parent");
            steps.push(StepOutcome::Rejected {
                code: entity.code.clone(),
                reason: err.to_string(),
            });
            Ok(None)
        }
        Err(err) => Err(err),
    }
}
