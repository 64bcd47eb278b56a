//! # facility-sync
//!
//! Incremental registry → org-unit synchronization engine.
//!
//! Call [`pipeline::run_pass_at`] to run one full pass against the systems in
//! a [`facility_core::SyncConfig`], or build an [`Orchestrator`] over your own
//! [`SourceRegistry`] / [`TargetStore`] implementations.

pub mod cursor_store;
pub mod error;
pub mod feed;
pub mod hierarchy;
pub mod http;
pub mod mapping;
pub mod notifier;
pub mod orchestrator;
pub mod phcu;
pub mod pipeline;
pub mod reconcile;
pub mod report;
pub mod source;
pub mod target;
pub mod upsert;

#[cfg(test)]
mod test_support;

pub use cursor_store::CursorStore;
pub use error::SyncError;
pub use orchestrator::{Orchestrator, PassFailure, PassSettings, PassState};
pub use pipeline::{run_pass_at, SyncRun};
pub use report::{Envelope, PassReport};
pub use source::SourceRegistry;
pub use target::TargetStore;
