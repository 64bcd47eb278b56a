//! Domain types shared by the sync engine, the daemon and the CLI.
//!
//! Source-side types mirror the facility registry's site documents; target-side
//! types mirror the organisation-unit payloads. The `code` of a target unit is
//! always the source site id and is the only key used to correlate the two.

use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize};

/// Opening date used when a site carries no `year_opened`: 1980-06-15.
pub fn default_opening_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(1980, 6, 15).unwrap_or(NaiveDate::MIN)
}

/// Upper bound the target places on `shortName`.
pub const SHORT_NAME_MAX_CHARS: usize = 50;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A site id in the source registry. Doubles as the target unit `code`.
///
/// The registry emits ids both as JSON numbers and as strings; both decode to
/// the same textual id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SourceId(pub String);

impl SourceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for SourceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SourceId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl<'de> Deserialize<'de> for SourceId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        lenient::id(deserializer).map(SourceId)
    }
}

/// An opaque id assigned by the target store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetId(pub String);

impl TargetId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for TargetId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TargetId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Source side
// ---------------------------------------------------------------------------

/// Custom properties attached to a registry site.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SiteProperties {
    /// Parent site id. `None` marks a hierarchy root.
    #[serde(default, deserialize_with = "lenient::optional_id")]
    pub reports_to: Option<SourceId>,

    #[serde(default, rename = "isphcu", deserialize_with = "lenient::flag")]
    pub is_phcu: bool,

    #[serde(
        default,
        rename = "phcuparentid",
        deserialize_with = "lenient::optional_id"
    )]
    pub phcu_parent_id: Option<SourceId>,

    /// `DD/MM/YYYY` as entered in the registry.
    #[serde(default)]
    pub year_opened: Option<String>,

    #[serde(default)]
    pub short_name: Option<String>,

    #[serde(default, rename = "facility__official_phone_number")]
    pub phone_number: Option<String>,
}

/// A facility record as listed by the source registry.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SourceRecord {
    pub id: SourceId,
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "lenient::optional_number")]
    pub lat: Option<f64>,
    #[serde(default, deserialize_with = "lenient::optional_number")]
    pub long: Option<f64>,
    #[serde(default)]
    pub properties: SiteProperties,
}

impl SourceRecord {
    /// Minimal record with only an id and a name; used by tests and fixtures.
    pub fn new(id: impl Into<SourceId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            lat: None,
            long: None,
            properties: SiteProperties::default(),
        }
    }

    pub fn reporting_to(mut self, parent: impl Into<SourceId>) -> Self {
        self.properties.reports_to = Some(parent.into());
        self
    }

    pub fn parent_ref(&self) -> Option<&SourceId> {
        self.properties.reports_to.as_ref()
    }
}

// ---------------------------------------------------------------------------
// Target side
// ---------------------------------------------------------------------------

/// `{ "id": ... }` reference used for the parent link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentRef {
    pub id: TargetId,
}

/// Full organisation-unit payload, used for both create and bulk update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetEntity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<TargetId>,
    pub code: String,
    pub name: String,
    pub short_name: String,
    pub opening_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<ParentRef>,
}

impl TargetEntity {
    pub fn parent_id(&self) -> Option<&TargetId> {
        self.parent.as_ref().map(|p| &p.id)
    }
}

/// A unit the target already holds, as returned by a lookup by code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExistingUnit {
    pub id: TargetId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

// ---------------------------------------------------------------------------
// Cursors
// ---------------------------------------------------------------------------

/// Which of the two incremental watermarks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CursorKind {
    Created,
    Updated,
}

impl CursorKind {
    pub fn all() -> &'static [CursorKind] {
        &[CursorKind::Created, CursorKind::Updated]
    }

    /// File name of the persisted watermark.
    pub fn file_name(self) -> &'static str {
        match self {
            CursorKind::Created => "last_added",
            CursorKind::Updated => "last_updated",
        }
    }

    /// Query parameter the source registry filters on.
    pub fn query_param(self) -> &'static str {
        match self {
            CursorKind::Created => "created_since",
            CursorKind::Updated => "updated_since",
        }
    }
}

impl fmt::Display for CursorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CursorKind::Created => write!(f, "created"),
            CursorKind::Updated => write!(f, "updated"),
        }
    }
}

// ---------------------------------------------------------------------------
// Change feed
// ---------------------------------------------------------------------------

/// What happened to a site according to the recency feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedAction {
    Created,
    Changed,
    Other(String),
}

impl FeedAction {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "created" => FeedAction::Created,
            "changed" => FeedAction::Changed,
            other => FeedAction::Other(other.to_string()),
        }
    }

    /// Subject prefix for the notification message.
    pub fn subject(&self) -> &'static str {
        match self {
            FeedAction::Created => "New Facility Information Added",
            FeedAction::Changed => "Facility Information Updated",
            FeedAction::Other(_) => "INFO",
        }
    }
}

/// One entry of the registry's activity feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeFeedItem {
    pub item_id: SourceId,
    pub action: FeedAction,
    pub title: String,
    pub pub_date: DateTime<FixedOffset>,
    /// The raw `pubDate` text, quoted back in the message body.
    pub pub_date_raw: String,
    pub collection: Option<String>,
    pub item_type: Option<String>,
}

/// `{ "id": ... }` recipient reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    pub id: String,
}

/// A message conversation posted to the target's messaging endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub subject: String,
    pub text: String,
    pub users: Vec<UserRef>,
}

// ---------------------------------------------------------------------------
// Lenient decoding of registry fields
// ---------------------------------------------------------------------------

mod lenient {
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scalar {
        Bool(bool),
        Int(i64),
        Float(f64),
        Text(String),
    }

    pub(super) fn id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
        match Scalar::deserialize(deserializer)? {
            Scalar::Int(n) => Ok(n.to_string()),
            Scalar::Text(s) => Ok(s),
            Scalar::Float(f) if f.fract() == 0.0 => Ok(format!("{}", f as i64)),
            _ => Err(serde::de::Error::custom("expected a string or integer id")),
        }
    }

    pub(super) fn optional_id<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<super::SourceId>, D::Error> {
        let raw = Option::<Scalar>::deserialize(deserializer)?;
        let text = match raw {
            None | Some(Scalar::Bool(_)) => return Ok(None),
            Some(Scalar::Int(n)) => n.to_string(),
            Some(Scalar::Float(f)) => format!("{}", f as i64),
            Some(Scalar::Text(s)) => s,
        };
        let trimmed = text.trim();
        if trimmed.is_empty() {
            Ok(None)
        } else {
            Ok(Some(super::SourceId(trimmed.to_string())))
        }
    }

    pub(super) fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        Ok(match Option::<Scalar>::deserialize(deserializer)? {
            None => false,
            Some(Scalar::Bool(b)) => b,
            Some(Scalar::Int(n)) => n != 0,
            Some(Scalar::Float(f)) => f != 0.0,
            Some(Scalar::Text(s)) => matches!(
                s.trim().to_ascii_lowercase().as_str(),
                "true" | "yes" | "1"
            ),
        })
    }

    pub(super) fn optional_number<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<f64>, D::Error> {
        Ok(match Option::<Scalar>::deserialize(deserializer)? {
            Some(Scalar::Int(n)) => Some(n as f64),
            Some(Scalar::Float(f)) => Some(f),
            Some(Scalar::Text(s)) => s.trim().parse().ok(),
            _ => None,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newtype_display() {
        assert_eq!(SourceId::from("1234").to_string(), "1234");
        assert_eq!(TargetId::from("Abc123xyz").to_string(), "Abc123xyz");
    }

    #[test]
    fn numeric_ids_decode_as_text() {
        let site: SourceRecord = serde_json::from_str(
            r#"{"id": 9001, "name": "Adama Hospital",
                "properties": {"reports_to": 42, "isphcu": false}}"#,
        )
        .expect("decode");
        assert_eq!(site.id, SourceId::from("9001"));
        assert_eq!(site.parent_ref(), Some(&SourceId::from("42")));
    }

    #[test]
    fn empty_reports_to_marks_a_root() {
        let site: SourceRecord =
            serde_json::from_str(r#"{"id": "F1", "name": "Root", "properties": {"reports_to": ""}}"#)
                .expect("decode");
        assert!(site.parent_ref().is_none());
    }

    #[test]
    fn phcu_flag_accepts_text_values() {
        let site: SourceRecord = serde_json::from_str(
            r#"{"id": "F2", "name": "Health Post", "properties": {"isphcu": "true", "phcuparentid": "77"}}"#,
        )
        .expect("decode");
        assert!(site.properties.is_phcu);
        assert_eq!(site.properties.phcu_parent_id, Some(SourceId::from("77")));
    }

    #[test]
    fn coordinates_accept_strings() {
        let site: SourceRecord =
            serde_json::from_str(r#"{"id": "F3", "name": "Clinic", "lat": "8.54", "long": 39.27}"#)
                .expect("decode");
        assert_eq!(site.lat, Some(8.54));
        assert_eq!(site.long, Some(39.27));
    }

    #[test]
    fn target_entity_serializes_camel_case_and_skips_absent_fields() {
        let entity = TargetEntity {
            id: None,
            code: "F1".into(),
            name: "Adama Hospital".into(),
            short_name: "Adama Hospital".into(),
            opening_date: NaiveDate::from_ymd_opt(1980, 6, 15).unwrap(),
            latitude: None,
            longitude: None,
            phone_number: None,
            parent: Some(ParentRef {
                id: TargetId::from("p1"),
            }),
        };
        let json = serde_json::to_value(&entity).expect("encode");
        assert_eq!(json["shortName"], "Adama Hospital");
        assert_eq!(json["openingDate"], "1980-06-15");
        assert_eq!(json["parent"]["id"], "p1");
        assert!(json.get("id").is_none());
        assert!(json.get("latitude").is_none());
    }

    #[test]
    fn feed_action_subjects() {
        assert_eq!(
            FeedAction::parse("created").subject(),
            "New Facility Information Added"
        );
        assert_eq!(
            FeedAction::parse("changed").subject(),
            "Facility Information Updated"
        );
        assert_eq!(FeedAction::parse("deleted").subject(), "INFO");
    }

    #[test]
    fn cursor_kind_files_and_params() {
        assert_eq!(CursorKind::Created.file_name(), "last_added");
        assert_eq!(CursorKind::Updated.file_name(), "last_updated");
        assert_eq!(CursorKind::Created.query_param(), "created_since");
        assert_eq!(CursorKind::Updated.query_param(), "updated_since");
    }
}
