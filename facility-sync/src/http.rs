//! HTTP adapters for the registry (source) and the org-unit store (target).
//!
//! Both sides use basic auth and a blocking `ureq` agent with a per-request
//! timeout. A timeout surfaces as a transport error and aborts the pass.

use std::cell::OnceCell;
use std::io::BufReader;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use serde_json::Value;

use facility_core::config::{SourceConfig, TargetConfig};
use facility_core::{
    ChangeFeedItem, ExistingUnit, Notification, SourceId, SourceRecord, SyncConfig, TargetEntity,
    TargetId,
};

use crate::error::SyncError;
use crate::feed::parse_activity_feed;
use crate::source::{PageToken, SitePage, SourceRegistry};
use crate::target::TargetStore;

const MAX_ERROR_BODY: usize = 512;

fn basic_auth(username: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{username}:{password}")))
}

fn agent(timeout_secs: u64) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
}

fn trim_base(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

/// Body text of an error response, capped for logs and reports.
fn body_text(response: ureq::Response) -> String {
    let mut text = response.into_string().unwrap_or_default();
    if text.len() > MAX_ERROR_BODY {
        let cut = (0..=MAX_ERROR_BODY)
            .rev()
            .find(|i| text.is_char_boundary(*i))
            .unwrap_or(0);
        text.truncate(cut);
    }
    text
}

fn describe(err: ureq::Error) -> String {
    match err {
        ureq::Error::Status(code, response) => format!("HTTP {code}: {}", body_text(response)),
        ureq::Error::Transport(transport) => transport.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

/// Registry client over its collection/site API.
pub struct HttpSource {
    agent: ureq::Agent,
    base_url: String,
    auth: String,
    collection_name: String,
    collection_id: OnceCell<String>,
}

impl HttpSource {
    pub fn new(config: &SourceConfig, timeout_secs: u64) -> Self {
        let collection_id = OnceCell::new();
        if let Some(id) = config.collection_id.as_deref().filter(|s| !s.trim().is_empty()) {
            let _ = collection_id.set(id.trim().to_string());
        }
        Self {
            agent: agent(timeout_secs),
            base_url: trim_base(&config.base_url),
            auth: basic_auth(&config.username, &config.password),
            collection_name: config.collection_name.clone(),
            collection_id,
        }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(&config.source, config.sync.request_timeout_secs)
    }

    /// Configured id, or the id of the collection named in the config.
    pub fn collection_id(&self) -> Result<String, SyncError> {
        if let Some(id) = self.collection_id.get() {
            return Ok(id.clone());
        }
        let url = format!("{}/api/collections.json", self.base_url);
        let listing = self.get_json(&url, &[])?;
        let id = pick_collection(&listing, &self.collection_name)?;
        tracing::info!("collection {:?} has id {id}", self.collection_name);
        let _ = self.collection_id.set(id.clone());
        Ok(id)
    }

    fn get_json(&self, url: &str, query: &[(&str, &str)]) -> Result<Value, SyncError> {
        tracing::debug!("GET {url} {query:?}");
        let mut request = self.agent.get(url).set("Authorization", &self.auth);
        for (key, value) in query {
            request = request.query(key, value);
        }
        let response = request.call().map_err(|e| SyncError::SourceFetchFailed {
            url: url.to_string(),
            reason: describe(e),
        })?;
        let value: Value =
            response
                .into_json()
                .map_err(|e| SyncError::SourceMalformedResponse {
                    url: url.to_string(),
                    message: e.to_string(),
                })?;
        reject_error_field(url, &value)?;
        Ok(value)
    }
}

impl SourceRegistry for HttpSource {
    fn fetch_page(&self, token: &PageToken) -> Result<SitePage, SyncError> {
        let (url, value) = match token {
            PageToken::First { kind, since } => {
                let url = format!(
                    "{}/api/collections/{}.json",
                    self.base_url,
                    self.collection_id()?
                );
                let query = [(kind.query_param(), since.as_str()), ("page", "1")];
                let value = self.get_json(&url, &query)?;
                (url, value)
            }
            PageToken::Next(url) => (url.clone(), self.get_json(url, &[])?),
        };
        decode_page(&url, value)
    }

    fn fetch_site(&self, id: &SourceId) -> Result<SourceRecord, SyncError> {
        let url = format!("{}/api/sites/{}.json", self.base_url, id);
        let value = self.get_json(&url, &[])?;
        serde_json::from_value(value).map_err(|e| SyncError::SourceMalformedResponse {
            url,
            message: e.to_string(),
        })
    }

    fn fetch_activity(&self) -> Result<Vec<ChangeFeedItem>, SyncError> {
        let url = format!("{}/api/activity.rss", self.base_url);
        tracing::debug!("GET {url}");
        let response = self
            .agent
            .get(&url)
            .set("Authorization", &self.auth)
            .call()
            .map_err(|e| SyncError::FeedUnavailable {
                reason: format!("{url}: {}", describe(e)),
            })?;
        parse_activity_feed(BufReader::new(response.into_reader()))
    }
}

/// A body carrying an `error` field is a failed request even with a 2xx status.
fn reject_error_field(url: &str, value: &Value) -> Result<(), SyncError> {
    match value.get("error") {
        None | Some(Value::Null) => Ok(()),
        Some(err) => Err(SyncError::SourceMalformedResponse {
            url: url.to_string(),
            message: err
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| err.to_string()),
        }),
    }
}

#[derive(Deserialize)]
struct PageBody {
    #[serde(default)]
    sites: Vec<SourceRecord>,
    #[serde(default, rename = "nextPage")]
    next_page: Option<String>,
}

fn decode_page(url: &str, value: Value) -> Result<SitePage, SyncError> {
    let body: PageBody =
        serde_json::from_value(value).map_err(|e| SyncError::SourceMalformedResponse {
            url: url.to_string(),
            message: e.to_string(),
        })?;
    Ok(SitePage {
        sites: body.sites,
        next_page: body.next_page,
    })
}

fn pick_collection(listing: &Value, name: &str) -> Result<String, SyncError> {
    listing
        .as_array()
        .into_iter()
        .flatten()
        .find(|c| c.get("name").and_then(Value::as_str) == Some(name))
        .and_then(|c| match c.get("id")? {
            Value::Number(n) => Some(n.to_string()),
            Value::String(s) => Some(s.clone()),
            _ => None,
        })
        .ok_or_else(|| SyncError::CollectionNotFound {
            name: name.to_string(),
        })
}

// ---------------------------------------------------------------------------
// Target
// ---------------------------------------------------------------------------

/// Org-unit store client.
pub struct HttpTarget {
    agent: ureq::Agent,
    base_url: String,
    auth: String,
}

impl HttpTarget {
    pub fn new(config: &TargetConfig, timeout_secs: u64) -> Self {
        Self {
            agent: agent(timeout_secs),
            base_url: trim_base(&config.base_url),
            auth: basic_auth(&config.username, &config.password),
        }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(&config.target, config.sync.request_timeout_secs)
    }

    fn post(&self, url: &str) -> ureq::Request {
        self.agent
            .post(url)
            .set("Authorization", &self.auth)
            .set("Content-Type", "application/json")
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UnitListing {
    #[serde(default)]
    organisation_units: Vec<ExistingUnit>,
}

impl TargetStore for HttpTarget {
    fn find_by_code(&self, code: &str) -> Result<Option<ExistingUnit>, SyncError> {
        let url = format!("{}/api/organisationUnits", self.base_url);
        let fetch_failed = |reason: String| SyncError::TargetFetchFailed {
            url: format!("{url}?filter=code:eq:{code}"),
            reason,
        };
        let listing: UnitListing = self
            .agent
            .get(&url)
            .set("Authorization", &self.auth)
            .query("filter", &format!("code:eq:{code}"))
            .query("fields", "id,code,displayName")
            .call()
            .map_err(|e| fetch_failed(describe(e)))?
            .into_json()
            .map_err(|e| fetch_failed(e.to_string()))?;
        Ok(listing.organisation_units.into_iter().next())
    }

    fn create(&self, entity: &TargetEntity) -> Result<TargetId, SyncError> {
        let url = format!("{}/api/organisationUnits", self.base_url);
        match self.post(&url).send_json(entity) {
            Ok(response) => {
                let value: Value = response.into_json().map_err(|e| SyncError::TargetFetchFailed {
                    url: url.clone(),
                    reason: e.to_string(),
                })?;
                decode_create(&entity.code, &value)
            }
            Err(ureq::Error::Status(status, response)) => Err(SyncError::TargetCreateFailed {
                code: entity.code.clone(),
                reason: format!("HTTP {status}: {}", body_text(response)),
            }),
            Err(err) => Err(SyncError::TargetFetchFailed {
                url,
                reason: describe(err),
            }),
        }
    }

    fn bulk_update(&self, entities: &[TargetEntity]) -> Result<(), SyncError> {
        let url = format!("{}/api/metadata", self.base_url);
        let failed = |reason: String| SyncError::TargetBulkUpdateFailed {
            count: entities.len(),
            reason,
        };
        let value: Value = self
            .post(&url)
            .query("identifier", "AUTO")
            .query("importStrategy", "UPDATE")
            .send_json(serde_json::json!({ "organisationUnits": entities }))
            .map_err(|e| failed(describe(e)))?
            .into_json()
            .map_err(|e| failed(e.to_string()))?;
        check_import(entities.len(), &value)
    }

    fn send_message(&self, message: &Notification) -> Result<(), SyncError> {
        let url = format!("{}/api/messageConversations", self.base_url);
        self.post(&url)
            .send_json(message)
            .map(|_| ())
            .map_err(|e| SyncError::NotificationFailed {
                subject: message.subject.clone(),
                reason: describe(e),
            })
    }
}

/// `{status: "OK", response: {uid}}` → id; anything else is a rejection.
fn decode_create(code: &str, value: &Value) -> Result<TargetId, SyncError> {
    let status = value.get("status").and_then(Value::as_str);
    let uid = value
        .pointer("/response/uid")
        .and_then(Value::as_str)
        .filter(|uid| !uid.is_empty());
    match (status, uid) {
        (Some("OK"), Some(uid)) => Ok(TargetId::from(uid)),
        _ => Err(SyncError::TargetCreateFailed {
            code: code.to_string(),
            reason: value.to_string(),
        }),
    }
}

/// Fail on an `ERROR` import status.
fn check_import(count: usize, value: &Value) -> Result<(), SyncError> {
    match value.get("status").and_then(Value::as_str) {
        Some("ERROR") => Err(SyncError::TargetBulkUpdateFailed {
            count,
            reason: value
                .get("typeReports")
                .map(Value::to_string)
                .unwrap_or_else(|| "import status ERROR".to_string()),
        }),
        Some(status) => {
            if status == "WARNING" {
                tracing::warn!("bulk update of {count} units finished with WARNING");
            }
            Ok(())
        }
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn auth_header_is_base64_user_colon_password() {
        assert_eq!(basic_auth("admin", "district"), "Basic YWRtaW46ZGlzdHJpY3Q=");
    }

    #[test]
    fn page_decodes_sites_and_next_page() {
        let page = decode_page(
            "u",
            json!({
                "sites": [{"id": 1, "name": "A", "properties": {"reports_to": 9}}],
                "nextPage": "https://mfr/api/collections/5.json?page=2"
            }),
        )
        .unwrap();
        assert_eq!(page.sites.len(), 1);
        assert_eq!(page.sites[0].parent_ref(), Some(&SourceId::from("9")));
        assert!(page.next_page.is_some());
    }

    #[test]
    fn last_page_has_no_next() {
        let page = decode_page("u", json!({"sites": []})).unwrap();
        assert!(page.next_page.is_none());
    }

    #[test]
    fn error_field_is_malformed_response() {
        let err = reject_error_field("u", &json!({"error": "Invalid date"})).unwrap_err();
        assert!(matches!(
            err,
            SyncError::SourceMalformedResponse { ref message, .. } if message == "Invalid date"
        ));
        assert!(reject_error_field("u", &json!({"sites": []})).is_ok());
    }

    #[test]
    fn collection_is_found_by_name() {
        let listing = json!([
            {"id": 3, "name": "Training"},
            {"id": 1337, "name": "Ethiopia Health Facility Registry"}
        ]);
        assert_eq!(
            pick_collection(&listing, "Ethiopia Health Facility Registry").unwrap(),
            "1337"
        );
        assert!(matches!(
            pick_collection(&listing, "Nope"),
            Err(SyncError::CollectionNotFound { .. })
        ));
    }

    #[test]
    fn configured_collection_id_skips_lookup() {
        let source = HttpSource::new(
            &SourceConfig {
                base_url: "http://127.0.0.1:9/".into(),
                username: "u".into(),
                password: "p".into(),
                collection_name: "ignored".into(),
                collection_id: Some("42".into()),
            },
            1,
        );
        assert_eq!(source.collection_id().unwrap(), "42");
        assert_eq!(source.base_url, "http://127.0.0.1:9");
    }

    #[test]
    fn create_response_yields_uid() {
        let ok = json!({"httpStatus": "Created", "status": "OK", "response": {"uid": "Xy12"}});
        assert_eq!(decode_create("F1", &ok).unwrap(), TargetId::from("Xy12"));

        let rejected = json!({"status": "WARNING", "response": {"errorReports": []}});
        let err = decode_create("F1", &rejected).unwrap_err();
        assert!(err.is_recoverable());
    }

    #[test]
    fn import_error_status_fails_bulk_update() {
        assert!(check_import(2, &json!({"status": "OK"})).is_ok());
        assert!(check_import(2, &json!({"status": "WARNING"})).is_ok());
        let err = check_import(2, &json!({"status": "ERROR", "typeReports": []})).unwrap_err();
        assert!(matches!(err, SyncError::TargetBulkUpdateFailed { count: 2, .. }));
    }
}
