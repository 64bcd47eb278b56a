//! Source site → target unit payload.

use chrono::NaiveDate;

use facility_core::types::{default_opening_date, SHORT_NAME_MAX_CHARS};
use facility_core::{ParentRef, SourceRecord, TargetEntity, TargetId};

/// Registry date format for `year_opened`.
pub const SOURCE_DATE_FORMAT: &str = "%d/%m/%Y";

/// `DD/MM/YYYY` → date; absent, blank or unparsable values fall back to 1980-06-15.
pub fn normalize_opening_date(raw: Option<&str>) -> NaiveDate {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => default_opening_date(),
        Some(text) => NaiveDate::parse_from_str(text, SOURCE_DATE_FORMAT).unwrap_or_else(|_| {
            tracing::warn!("unparsable year_opened {text:?}; using default opening date");
            default_opening_date()
        }),
    }
}

/// Truncate to the target's short-name limit on a character boundary.
pub fn derive_short_name(name: &str) -> String {
    let trimmed = name.trim();
    match trimmed.char_indices().nth(SHORT_NAME_MAX_CHARS) {
        Some((cut, _)) => trimmed[..cut].trim_end().to_string(),
        None => trimmed.to_string(),
    }
}

/// The site's own short name when present, else one derived from its name.
pub fn short_name_for(record: &SourceRecord) -> String {
    record
        .properties
        .short_name
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(derive_short_name)
        .unwrap_or_else(|| derive_short_name(&record.name))
}

/// Full payload for `record`, parented at `parent` when given. `id` is left unset.
pub fn to_entity(record: &SourceRecord, parent: Option<&TargetId>) -> TargetEntity {
    TargetEntity {
        id: None,
        code: record.id.to_string(),
        name: record.name.trim().to_string(),
        short_name: short_name_for(record),
        opening_date: normalize_opening_date(record.properties.year_opened.as_deref()),
        latitude: record.lat,
        longitude: record.long,
        phone_number: record
            .properties
            .phone_number
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        parent: parent.map(|id| ParentRef { id: id.clone() }),
    }
}
