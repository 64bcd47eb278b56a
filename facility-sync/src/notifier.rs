//! Change notifier: tells target users about recently edited facilities.

use chrono::{DateTime, FixedOffset};
use serde::Serialize;

use facility_core::{ChangeFeedItem, ExistingUnit, Notification, UserRef};

use crate::error::SyncError;
use crate::target::TargetStore;

/// Counters for one notification pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NotifySummary {
    /// Feed items at or after the cutoff.
    pub considered: usize,
    pub sent: usize,
    /// Recent items whose site is not in the target.
    pub not_in_target: usize,
    pub failed: usize,
}

/// Compose the message for a feed item whose unit exists in the target.
pub fn compose(item: &ChangeFeedItem, unit: &ExistingUnit, recipients: &[String]) -> Notification {
    let display = unit
        .display_name
        .clone()
        .unwrap_or_else(|| item.item_id.to_string());
    Notification {
        subject: format!("{} : {}", item.action.subject(), display),
        text: format!("{} on {}", item.title, item.pub_date_raw),
        users: recipients
            .iter()
            .map(|id| UserRef { id: id.clone() })
            .collect(),
    }
}

/// Send one message per recent item whose unit exists in the target.
///
/// `since` is the skew-adjusted updated cursor. Lookup failures abort;
/// send failures are logged and counted.
pub fn notify_changes(
    items: &[ChangeFeedItem],
    since: DateTime<FixedOffset>,
    recipients: &[String],
    target: &dyn TargetStore,
) -> Result<NotifySummary, SyncError> {
    let mut summary = NotifySummary::default();

    for item in items.iter().filter(|i| i.pub_date >= since) {
        summary.considered += 1;
        let Some(unit) = target.find_by_code(item.item_id.as_str())? else {
            summary.not_in_target += 1;
            continue;
        };

        let message = compose(item, &unit, recipients);
        match target.send_message(&message) {
            Ok(()) => {
                tracing::info!("notified: {}", message.subject);
                summary.sent += 1;
            }
            Err(err) if err.is_recoverable() => {
                tracing::warn!("{err}");
                summary.failed += 1;
            }
            Err(err) => return Err(err),
        }
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{feed_item, MemoryTarget};

    fn cutoff() -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339("2024-03-05T00:00:00+00:00").unwrap()
    }

    fn recipients() -> Vec<String> {
        vec!["M5zQapPyTZI".into()]
    }

    #[test]
    fn changed_item_for_present_unit_sends_one_message() {
        let target = MemoryTarget::default().with_named_unit("F2", "T-F2", "Dukem Health Post");
        let items = vec![feed_item("F2", "changed", "Tue, 05 Mar 2024 08:51:21 +0000")];

        let summary = notify_changes(&items, cutoff(), &recipients(), &target).unwrap();
        assert_eq!(summary.sent, 1);

        let messages = target.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].subject, "Facility Information Updated : Dukem Health Post");
        assert_eq!(messages[0].text, "F2 edited on Tue, 05 Mar 2024 08:51:21 +0000");
        assert_eq!(messages[0].users, vec![UserRef { id: "M5zQapPyTZI".into() }]);
    }

    #[test]
    fn old_items_and_missing_units_are_ignored() {
        let target = MemoryTarget::default().with_unit("F2", "T-F2");
        let items = vec![
            feed_item("F2", "changed", "Mon, 04 Mar 2024 23:59:59 +0000"),
            feed_item("F404", "created", "Tue, 05 Mar 2024 09:00:00 +0000"),
        ];
        let summary = notify_changes(&items, cutoff(), &recipients(), &target).unwrap();
        assert_eq!(summary.considered, 1);
        assert_eq!(summary.not_in_target, 1);
        assert_eq!(summary.sent, 0);
        assert!(target.messages().is_empty());
    }

    #[test]
    fn cutoff_is_inclusive_across_offsets() {
        let target = MemoryTarget::default().with_unit("F2", "T-F2");
        let items = vec![feed_item("F2", "created", "Tue, 05 Mar 2024 03:00:00 +0300")];
        let summary = notify_changes(&items, cutoff(), &recipients(), &target).unwrap();
        assert_eq!(summary.sent, 1);
        assert!(target.messages()[0].subject.starts_with("New Facility Information Added : "));
    }

    #[test]
    fn send_failures_are_counted_not_fatal() {
        let target = MemoryTarget::default().with_unit("F2", "T-F2").failing_messages();
        let items = vec![feed_item("F2", "deleted", "Tue, 05 Mar 2024 08:00:00 +0000")];
        let summary = notify_changes(&items, cutoff(), &recipients(), &target).unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.sent, 0);
    }
}
