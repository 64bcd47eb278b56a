//! Update reconciler: full-replacement payloads for the updated-since pass.

use facility_core::{SourceRecord, TargetId};

use crate::error::SyncError;
use crate::mapping;
use crate::phcu;
use crate::target::TargetStore;

/// Build the page's batch and submit it in a single bulk update. Returns the
/// number of units sent.
///
/// Unlike chain creation this is strict: an unresolvable parent, a record with
/// no unit of its own, or a failed bulk call aborts the pass before anything
/// from the page is written.
pub fn reconcile_page(
    records: &[SourceRecord],
    target: &dyn TargetStore,
) -> Result<usize, SyncError> {
    let mut batch = Vec::with_capacity(records.len());

    for record in records {
        let parent = resolve_parent(record, target)?;

        let own = target
            .find_by_code(record.id.as_str())?
            .ok_or_else(|| SyncError::UnitUnresolved {
                code: record.id.clone(),
            })?;

        let mut entity = mapping::to_entity(record, parent.as_ref());
        entity.id = Some(own.id);
        batch.push(entity);
    }

    if !batch.is_empty() {
        target.bulk_update(&batch)?;
        tracing::info!("updated {} units", batch.len());
    }

    Ok(batch.len())
}

/// The unit a site should sit under: its PHCU shell when one exists,
/// otherwise its `reports_to` parent. A root has no parent.
fn resolve_parent(
    record: &SourceRecord,
    target: &dyn TargetStore,
) -> Result<Option<TargetId>, SyncError> {
    let parent = match record.parent_ref() {
        None => None,
        Some(parent_id) => {
            let unit = target.find_by_code(parent_id.as_str())?.ok_or_else(|| {
                SyncError::ParentUnresolved {
                    code: record.id.clone(),
                    parent: parent_id.clone(),
                }
            })?;
            Some(unit.id)
        }
    };

    if let Some(shell_code) = phcu::classify(record).shell_code() {
        if let Some(shell) = target.find_by_code(shell_code)? {
            return Ok(Some(shell.id));
        }
    }
    Ok(parent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{phcu, MemoryTarget};

    #[test]
    fn one_bulk_call_per_page_with_ids_and_parents() {
        let target = MemoryTarget::default()
            .with_unit("W1", "T-W1")
            .with_unit("F1", "T-F1")
            .with_unit("F2", "T-F2");
        let mut f2 = SourceRecord::new("F2", "Second").reporting_to("W1");
        f2.properties.year_opened = Some("15/06/1990".into());
        let records = vec![SourceRecord::new("F1", "First").reporting_to("W1"), f2];

        assert_eq!(reconcile_page(&records, &target).unwrap(), 2);

        let calls = target.updates();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0][0].id, Some(TargetId::from("T-F1")));
        assert_eq!(calls[0][1].parent_id(), Some(&TargetId::from("T-W1")));
        assert_eq!(calls[0][1].opening_date.to_string(), "1990-06-15");
    }

    #[test]
    fn unresolvable_parent_is_fatal() {
        let target = MemoryTarget::default().with_unit("F1", "T-F1");
        let records = vec![SourceRecord::new("F1", "First").reporting_to("NOPE")];
        let err = reconcile_page(&records, &target).unwrap_err();
        assert!(matches!(err, SyncError::ParentUnresolved { .. }));
        assert!(target.updates().is_empty());
    }

    #[test]
    fn root_updates_without_parent() {
        let target = MemoryTarget::default().with_unit("ROOT", "T-ROOT");
        reconcile_page(&[SourceRecord::new("ROOT", "Ministry")], &target).unwrap();
        assert!(target.updates()[0][0].parent.is_none());
    }

    #[test]
    fn record_without_own_unit_is_fatal() {
        let target = MemoryTarget::default()
            .with_unit("W1", "T-W1")
            .with_unit("F1", "T-F1");
        let records = vec![
            SourceRecord::new("F1", "First").reporting_to("W1"),
            SourceRecord::new("NEW", "n").reporting_to("W1"),
        ];
        let err = reconcile_page(&records, &target).unwrap_err();
        assert!(matches!(err, SyncError::UnitUnresolved { ref code } if code.as_str() == "NEW"));
        assert!(target.updates().is_empty(), "nothing from the page is sent");
    }

    #[test]
    fn empty_page_sends_nothing() {
        let target = MemoryTarget::default();
        assert_eq!(reconcile_page(&[], &target).unwrap(), 0);
        assert!(target.updates().is_empty());
    }

    #[test]
    fn phcu_member_stays_under_its_shell() {
        let target = MemoryTarget::default()
            .with_unit("W1", "T-W1")
            .with_unit("F2PHCU", "T-SHELL")
            .with_unit("F2", "T-F2");
        let record = phcu("F2", "Dukem HP", None).reporting_to("W1");
        reconcile_page(&[record], &target).unwrap();
        assert_eq!(
            target.updates()[0][0].parent_id(),
            Some(&TargetId::from("T-SHELL"))
        );
    }

    #[test]
    fn failed_bulk_call_is_fatal() {
        let target = MemoryTarget::default()
            .with_unit("F1", "T-F1")
            .failing_bulk();
        let err = reconcile_page(&[SourceRecord::new("F1", "First")], &target).unwrap_err();
        assert!(matches!(err, SyncError::TargetBulkUpdateFailed { count: 1, .. }));
    }
}
