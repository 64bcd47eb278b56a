//! Facility core library: domain types, configuration persistence, errors.
//!
//! Public API surface:
//! - [`types`]: newtypes and the source/target domain structs
//! - [`error`]: [`ConfigError`]
//! - [`config`]: load / save / init of `~/.facility/config.yaml`

pub mod config;
pub mod error;
pub mod types;

pub use config::SyncConfig;
pub use error::ConfigError;
pub use types::{
    ChangeFeedItem, CursorKind, ExistingUnit, FeedAction, Notification, ParentRef, SiteProperties,
    SourceId, SourceRecord, TargetEntity, TargetId, UserRef,
};
