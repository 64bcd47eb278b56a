//! Long-running trigger service: HTTP trigger + optional schedule + config reload.

mod error;
pub mod paths;
mod runtime;

pub use error::DaemonError;
pub use runtime::{router, run, start_blocking, PassRunner, TriggerState};
