//! In-memory source and target used by the unit tests.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};

use chrono::DateTime;

use facility_core::{
    ChangeFeedItem, CursorKind, ExistingUnit, FeedAction, Notification, SourceId, SourceRecord,
    TargetEntity, TargetId,
};

use crate::error::SyncError;
use crate::source::{PageToken, SitePage, SourceRegistry};
use crate::target::TargetStore;

// ---------------------------------------------------------------------------
// Target
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct StoredUnit {
    pub id: TargetId,
    pub code: String,
    pub name: String,
    pub parent: Option<TargetId>,
}

#[derive(Default)]
pub struct MemoryTarget {
    units: RefCell<Vec<StoredUnit>>,
    create_log: RefCell<Vec<TargetEntity>>,
    reject: HashSet<String>,
    updates: RefCell<Vec<Vec<TargetEntity>>>,
    messages: RefCell<Vec<Notification>>,
    fail_bulk: bool,
    fail_messages: bool,
    next_id: Cell<u32>,
}

impl MemoryTarget {
    pub fn with_unit(self, code: &str, id: &str) -> Self {
        self.with_named_unit(code, id, &format!("{code} unit"))
    }

    pub fn with_named_unit(self, code: &str, id: &str, name: &str) -> Self {
        self.units.borrow_mut().push(StoredUnit {
            id: TargetId::from(id),
            code: code.into(),
            name: name.into(),
            parent: None,
        });
        self
    }

    pub fn rejecting(mut self, code: &str) -> Self {
        self.reject.insert(code.into());
        self
    }

    pub fn failing_bulk(mut self) -> Self {
        self.fail_bulk = true;
        self
    }

    pub fn failing_messages(mut self) -> Self {
        self.fail_messages = true;
        self
    }

    /// Every create attempt, rejected ones included, in call order.
    pub fn create_log(&self) -> Vec<TargetEntity> {
        self.create_log.borrow().clone()
    }

    pub fn create_calls(&self) -> usize {
        self.create_log.borrow().len()
    }

    pub fn unit(&self, code: &str) -> Option<StoredUnit> {
        self.units.borrow().iter().find(|u| u.code == code).cloned()
    }

    pub fn codes(&self) -> Vec<String> {
        self.units.borrow().iter().map(|u| u.code.clone()).collect()
    }

    pub fn updates(&self) -> Vec<Vec<TargetEntity>> {
        self.updates.borrow().clone()
    }

    pub fn messages(&self) -> Vec<Notification> {
        self.messages.borrow().clone()
    }
}

impl TargetStore for MemoryTarget {
    fn find_by_code(&self, code: &str) -> Result<Option<ExistingUnit>, SyncError> {
        Ok(self.unit(code).map(|u| ExistingUnit {
            id: u.id,
            code: Some(u.code),
            display_name: Some(u.name),
        }))
    }

    fn create(&self, entity: &TargetEntity) -> Result<TargetId, SyncError> {
        self.create_log.borrow_mut().push(entity.clone());
        if self.reject.contains(&entity.code) {
            return Err(SyncError::TargetCreateFailed {
                code: entity.code.clone(),
                reason: "409 conflict".into(),
            });
        }
        let n = self.next_id.get() + 1;
        self.next_id.set(n);
        let id = TargetId(format!("T{n:04}"));
        self.units.borrow_mut().push(StoredUnit {
            id: id.clone(),
            code: entity.code.clone(),
            name: entity.name.clone(),
            parent: entity.parent_id().cloned(),
        });
        Ok(id)
    }

    fn bulk_update(&self, entities: &[TargetEntity]) -> Result<(), SyncError> {
        if self.fail_bulk {
            return Err(SyncError::TargetBulkUpdateFailed {
                count: entities.len(),
                reason: "import status ERROR".into(),
            });
        }
        self.updates.borrow_mut().push(entities.to_vec());
        Ok(())
    }

    fn send_message(&self, message: &Notification) -> Result<(), SyncError> {
        if self.fail_messages {
            return Err(SyncError::NotificationFailed {
                subject: message.subject.clone(),
                reason: "503".into(),
            });
        }
        self.messages.borrow_mut().push(message.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemorySource {
    sites: HashMap<SourceId, SourceRecord>,
    pages: HashMap<CursorKind, Vec<Vec<SourceRecord>>>,
    feed: Option<Vec<ChangeFeedItem>>,
    fail_page: Option<(CursorKind, usize)>,
    site_fetches: Cell<usize>,
    tokens: RefCell<Vec<PageToken>>,
}

impl MemorySource {
    /// Make `record` fetchable by id.
    pub fn with_site(mut self, record: SourceRecord) -> Self {
        self.sites.insert(record.id.clone(), record);
        self
    }

    /// Append a listing page for `kind`; its sites become fetchable too.
    pub fn with_page(mut self, kind: CursorKind, sites: Vec<SourceRecord>) -> Self {
        for site in &sites {
            self.sites.insert(site.id.clone(), site.clone());
        }
        self.pages.entry(kind).or_default().push(sites);
        self
    }

    pub fn with_feed(mut self, items: Vec<ChangeFeedItem>) -> Self {
        self.feed = Some(items);
        self
    }

    pub fn failing_page(mut self, kind: CursorKind, index: usize) -> Self {
        self.fail_page = Some((kind, index));
        self
    }

    pub fn site_fetches(&self) -> usize {
        self.site_fetches.get()
    }

    pub fn tokens(&self) -> Vec<PageToken> {
        self.tokens.borrow().clone()
    }
}

fn page_url(kind: CursorKind, index: usize) -> String {
    format!("mem://{kind}/{index}")
}

impl SourceRegistry for MemorySource {
    fn fetch_page(&self, token: &PageToken) -> Result<SitePage, SyncError> {
        self.tokens.borrow_mut().push(token.clone());
        let (kind, index) = match token {
            PageToken::First { kind, .. } => (*kind, 0),
            PageToken::Next(url) => {
                let rest = url.trim_start_matches("mem://");
                let (kind, index) = rest.split_once('/').unwrap_or(("created", "0"));
                let kind = if kind == "updated" {
                    CursorKind::Updated
                } else {
                    CursorKind::Created
                };
                (kind, index.parse().unwrap_or(0))
            }
        };
        if self.fail_page == Some((kind, index)) {
            return Err(SyncError::SourceFetchFailed {
                url: page_url(kind, index),
                reason: "connection reset".into(),
            });
        }
        let pages = self.pages.get(&kind).cloned().unwrap_or_default();
        let sites = pages.get(index).cloned().unwrap_or_default();
        let next_page = (index + 1 < pages.len()).then(|| page_url(kind, index + 1));
        Ok(SitePage { sites, next_page })
    }

    fn fetch_site(&self, id: &SourceId) -> Result<SourceRecord, SyncError> {
        self.site_fetches.set(self.site_fetches.get() + 1);
        self.sites
            .get(id)
            .cloned()
            .ok_or_else(|| SyncError::SourceMalformedResponse {
                url: format!("mem://sites/{id}"),
                message: "Site not found".into(),
            })
    }

    fn fetch_activity(&self) -> Result<Vec<ChangeFeedItem>, SyncError> {
        self.feed.clone().ok_or_else(|| SyncError::FeedUnavailable {
            reason: "no feed configured".into(),
        })
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

pub fn phcu(id: &str, name: &str, phcu_parent: Option<&str>) -> SourceRecord {
    let mut record = SourceRecord::new(id, name);
    record.properties.is_phcu = true;
    record.properties.phcu_parent_id = phcu_parent.map(SourceId::from);
    record
}

pub fn feed_item(id: &str, action: &str, pub_date: &str) -> ChangeFeedItem {
    let parsed = DateTime::parse_from_rfc2822(pub_date).unwrap_or_else(|_| {
        DateTime::parse_from_rfc3339("1970-01-01T00:00:00Z").expect("epoch")
    });
    ChangeFeedItem {
        item_id: SourceId::from(id),
        action: FeedAction::parse(action),
        title: format!("{id} edited"),
        pub_date: parsed,
        pub_date_raw: pub_date.into(),
        collection: Some("Ethiopia Health Facility Registry".into()),
        item_type: Some("site".into()),
    }
}
