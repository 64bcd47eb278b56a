//! Source registry seam and the page-following iterator over its sites.

use facility_core::{ChangeFeedItem, CursorKind, SourceId, SourceRecord};

use crate::error::SyncError;

/// Where the next page comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageToken {
    /// First page of a cursor-filtered listing; `since` is already skew-adjusted.
    First { kind: CursorKind, since: String },
    /// A `nextPage` URL reported by the previous page.
    Next(String),
}

/// One page of a collection listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SitePage {
    pub sites: Vec<SourceRecord>,
    pub next_page: Option<String>,
}

/// Read access to the facility registry.
pub trait SourceRegistry {
    /// Fetch a single page. An `error` field in the body is `SourceMalformedResponse`.
    fn fetch_page(&self, token: &PageToken) -> Result<SitePage, SyncError>;

    /// Fetch one site by id, used to walk `reports_to` upward.
    fn fetch_site(&self, id: &SourceId) -> Result<SourceRecord, SyncError>;

    /// Fetch and parse the recency feed.
    fn fetch_activity(&self) -> Result<Vec<ChangeFeedItem>, SyncError>;
}

/// Lazy sequence of pages, following `nextPage` until absent.
///
/// Yields each page's sites. After the last page, or after the first error,
/// it yields `None` forever.
pub struct SitePages<'a> {
    source: &'a dyn SourceRegistry,
    next: Option<PageToken>,
}

impl<'a> SitePages<'a> {
    pub fn new(source: &'a dyn SourceRegistry, first: PageToken) -> Self {
        Self {
            source,
            next: Some(first),
        }
    }
}

impl Iterator for SitePages<'_> {
    type Item = Result<Vec<SourceRecord>, SyncError>;

    fn next(&mut self) -> Option<Self::Item> {
        let token = self.next.take()?;
        match self.source.fetch_page(&token) {
            Ok(page) => {
                self.next = page
                    .next_page
                    .filter(|url| !url.trim().is_empty())
                    .map(PageToken::Next);
                Some(Ok(page.sites))
            }
            Err(e) => Some(Err(e)),
        }
    }
}

impl std::iter::FusedIterator for SitePages<'_> {}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    struct Scripted {
        pages: Vec<Result<SitePage, String>>,
        requested: RefCell<Vec<PageToken>>,
    }

    impl SourceRegistry for Scripted {
        fn fetch_page(&self, token: &PageToken) -> Result<SitePage, SyncError> {
            let index = self.requested.borrow().len();
            self.requested.borrow_mut().push(token.clone());
            match &self.pages[index] {
                Ok(page) => Ok(page.clone()),
                Err(reason) => Err(SyncError::SourceFetchFailed {
                    url: format!("page-{index}"),
                    reason: reason.clone(),
                }),
            }
        }
        fn fetch_site(&self, id: &SourceId) -> Result<SourceRecord, SyncError> {
            Ok(SourceRecord::new(id.clone(), "unused"))
        }
        fn fetch_activity(&self) -> Result<Vec<ChangeFeedItem>, SyncError> {
            Ok(vec![])
        }
    }

    fn first() -> PageToken {
        PageToken::First {
            kind: CursorKind::Created,
            since: "2024-01-01 00:00:00+0000".into(),
        }
    }

    #[test]
    fn follows_next_page_until_absent() {
        let source = Scripted {
            pages: vec![
                Ok(SitePage {
                    sites: vec![SourceRecord::new("A", "a")],
                    next_page: Some("https://mfr/p2".into()),
                }),
                Ok(SitePage {
                    sites: vec![SourceRecord::new("B", "b"), SourceRecord::new("C", "c")],
                    next_page: None,
                }),
            ],
            requested: RefCell::new(vec![]),
        };

        let sizes: Vec<usize> = SitePages::new(&source, first())
            .map(|page| page.expect("page").len())
            .collect();
        assert_eq!(sizes, vec![1, 2]);
        assert_eq!(
            source.requested.borrow().as_slice(),
            &[first(), PageToken::Next("https://mfr/p2".into())]
        );
    }

    #[test]
    fn stops_after_first_error() {
        let source = Scripted {
            pages: vec![
                Ok(SitePage {
                    sites: vec![],
                    next_page: Some("https://mfr/p2".into()),
                }),
                Err("connection reset".into()),
            ],
            requested: RefCell::new(vec![]),
        };

        let mut pages = SitePages::new(&source, first());
        assert!(pages.next().expect("first").is_ok());
        assert!(pages.next().expect("second").is_err());
        assert!(pages.next().is_none());
        assert!(pages.next().is_none());
        assert_eq!(source.requested.borrow().len(), 2);
    }

    #[test]
    fn blank_next_page_ends_the_sequence() {
        let source = Scripted {
            pages: vec![Ok(SitePage {
                sites: vec![],
                next_page: Some("  ".into()),
            })],
            requested: RefCell::new(vec![]),
        };
        assert_eq!(SitePages::new(&source, first()).count(), 1);
    }
}
