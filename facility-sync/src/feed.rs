//! Recency feed parsing.
//!
//! The registry publishes an RSS 2.0 activity feed whose items carry
//! `rm:collection`, `rm:itemtype`, `rm:itemid` and `rm:action` elements.

use std::io::BufRead;

use chrono::{DateTime, FixedOffset};
use rss::{Channel, Item};

use facility_core::{ChangeFeedItem, FeedAction, SourceId};

use crate::error::SyncError;

const NAMESPACE_PREFIX: &str = "rm";

/// Parse the activity feed. Items without an item id or with an unreadable
/// `pubDate` are dropped with a warning.
pub fn parse_activity_feed(reader: impl BufRead) -> Result<Vec<ChangeFeedItem>, SyncError> {
    let channel = Channel::read_from(reader).map_err(|e| SyncError::FeedUnavailable {
        reason: e.to_string(),
    })?;
    Ok(channel.items().iter().filter_map(to_feed_item).collect())
}

fn to_feed_item(item: &Item) -> Option<ChangeFeedItem> {
    let Some(item_id) = custom_field(item, "itemid") else {
        tracing::warn!("feed item {:?} has no rm:itemid; skipping", item.title());
        return None;
    };
    let raw_date = item.pub_date().unwrap_or_default().trim().to_string();
    let Some(pub_date) = parse_pub_date(&raw_date) else {
        tracing::warn!("feed item {item_id} has unreadable pubDate {raw_date:?}; skipping");
        return None;
    };

    Some(ChangeFeedItem {
        item_id: SourceId::from(item_id),
        action: FeedAction::parse(&custom_field(item, "action").unwrap_or_default()),
        title: item.title().unwrap_or_default().to_string(),
        pub_date,
        pub_date_raw: raw_date,
        collection: custom_field(item, "collection"),
        item_type: custom_field(item, "itemtype"),
    })
}

fn custom_field(item: &Item, name: &str) -> Option<String> {
    item.extensions()
        .get(NAMESPACE_PREFIX)?
        .get(name)?
        .first()?
        .value()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

pub fn parse_pub_date(raw: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc2822(raw)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .ok()
}
