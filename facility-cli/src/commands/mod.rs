pub mod daemon;
pub mod init;
pub mod resolve;
pub mod status;
pub mod sync;

use std::path::PathBuf;

use anyhow::{Context, Result};
use facility_core::{config, SyncConfig};

pub(crate) fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().context("could not determine home directory")
}

pub(crate) fn load_config(home: &std::path::Path) -> Result<SyncConfig> {
    config::load_at(home).context("failed to load config")
}
