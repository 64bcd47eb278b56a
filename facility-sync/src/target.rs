//! Target store seam and the dry-run staging wrapper.

use std::cell::{Cell, RefCell};

use facility_core::{ExistingUnit, Notification, TargetEntity, TargetId};

use crate::error::SyncError;

/// Read/write access to the organisation-unit store.
///
/// Every existence check goes through [`TargetStore::find_by_code`]; the
/// target's own ids are only ever learned from it or from `create`.
pub trait TargetStore {
    fn find_by_code(&self, code: &str) -> Result<Option<ExistingUnit>, SyncError>;

    /// Create one unit and return its assigned id.
    ///
    /// A refusal by the target is `TargetCreateFailed`; transport problems
    /// are reported as `TargetFetchFailed`.
    fn create(&self, entity: &TargetEntity) -> Result<TargetId, SyncError>;

    /// Replace a batch of existing units in a single call.
    fn bulk_update(&self, entities: &[TargetEntity]) -> Result<(), SyncError>;

    fn send_message(&self, message: &Notification) -> Result<(), SyncError>;
}

/// Writes staged by a [`DryRunTarget`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StagedWrites {
    pub created: Vec<TargetEntity>,
    pub updated: Vec<TargetEntity>,
    pub messages: Vec<Notification>,
}

/// Wraps a real target: lookups are forwarded, writes are only recorded.
///
/// Staged creates get synthetic ids and are visible to later lookups, so a
/// chain resolves the same way it would for real.
pub struct DryRunTarget<'a> {
    inner: &'a dyn TargetStore,
    staged: RefCell<StagedWrites>,
    next_id: Cell<u32>,
}

impl<'a> DryRunTarget<'a> {
    pub fn new(inner: &'a dyn TargetStore) -> Self {
        Self {
            inner,
            staged: RefCell::new(StagedWrites::default()),
            next_id: Cell::new(1),
        }
    }

    pub fn staged(&self) -> StagedWrites {
        self.staged.borrow().clone()
    }
}

impl TargetStore for DryRunTarget<'_> {
    fn find_by_code(&self, code: &str) -> Result<Option<ExistingUnit>, SyncError> {
        let staged = self
            .staged
            .borrow()
            .created
            .iter()
            .find(|e| e.code == code)
            .map(|e| ExistingUnit {
                id: e.id.clone().unwrap_or_else(|| TargetId::from("")),
                code: Some(e.code.clone()),
                display_name: Some(e.name.clone()),
            });
        match staged {
            Some(unit) => Ok(Some(unit)),
            None => self.inner.find_by_code(code),
        }
    }

    fn create(&self, entity: &TargetEntity) -> Result<TargetId, SyncError> {
        let n = self.next_id.get();
        self.next_id.set(n + 1);
        let id = TargetId(format!("dry-run-{n}"));
        let mut staged = entity.clone();
        staged.id = Some(id.clone());
        tracing::info!("[dry-run] would create {} ({})", entity.code, entity.name);
        self.staged.borrow_mut().created.push(staged);
        Ok(id)
    }

    fn bulk_update(&self, entities: &[TargetEntity]) -> Result<(), SyncError> {
        tracing::info!("[dry-run] would update {} units", entities.len());
        self.staged.borrow_mut().updated.extend_from_slice(entities);
        Ok(())
    }

    fn send_message(&self, message: &Notification) -> Result<(), SyncError> {
        tracing::info!("[dry-run] would send {:?}", message.subject);
        self.staged.borrow_mut().messages.push(message.clone());
        Ok(())
    }
}
