//! `facility init`: write `~/.facility/config.yaml` and seed the watermarks.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, FixedOffset, Utc};
use clap::Args;

use facility_core::config::{
    self, DaemonConfig, EngineConfig, NotifyConfig, SourceConfig, TargetConfig,
    DEFAULT_COLLECTION_NAME,
};
use facility_core::{CursorKind, SyncConfig};
use facility_sync::cursor_store::{format_stamp, parse_stamp};
use facility_sync::CursorStore;

/// Create the deployment config. An existing config is left untouched.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Facility registry base URL.
    #[arg(long)]
    pub source_url: String,

    #[arg(long, env = "FACILITY_SOURCE_USER", default_value = "")]
    pub source_user: String,

    #[arg(long, env = "FACILITY_SOURCE_PASSWORD", default_value = "", hide_env_values = true)]
    pub source_password: String,

    /// Registry collection to sync, matched by name.
    #[arg(long, default_value = DEFAULT_COLLECTION_NAME)]
    pub collection_name: String,

    /// Collection id; skips the lookup by name.
    #[arg(long)]
    pub collection_id: Option<String>,

    /// Org-unit store base URL.
    #[arg(long)]
    pub target_url: String,

    #[arg(long, env = "FACILITY_TARGET_USER", default_value = "")]
    pub target_user: String,

    #[arg(long, env = "FACILITY_TARGET_PASSWORD", default_value = "", hide_env_values = true)]
    pub target_password: String,

    /// Target user id to notify about changes (repeatable).
    #[arg(long = "recipient", value_name = "USER_ID")]
    pub recipients: Vec<String>,

    /// Initial watermark for both passes, e.g. "2024-01-01 00:00:00+0300". Defaults to now.
    #[arg(long)]
    pub since: Option<String>,
}

impl InitArgs {
    pub fn run(self) -> Result<()> {
        let home = super::home_dir()?;
        let since = match self.since.as_deref() {
            Some(raw) => parse_stamp(raw)
                .ok_or_else(|| anyhow!("cannot parse --since '{raw}' as a timestamp"))?,
            None => DateTime::<FixedOffset>::from(Utc::now()),
        };

        let requested = self.into_config();
        let existed = config::config_path_at(&home).exists();
        let config = config::init_at(&home, requested).context("failed to write config")?;

        if existed {
            println!("✓ Config already present, left unchanged");
        } else {
            println!("✓ Wrote config");
        }
        println!("  Saved to: {}", config::config_path_at(&home).display());

        let cursors = CursorStore::for_config_at(&home, &config);
        for kind in CursorKind::all() {
            let seeded = cursors
                .seed(*kind, since)
                .with_context(|| format!("failed to seed {kind} watermark"))?;
            if seeded {
                println!("  {kind} since {}", format_stamp(since));
            } else {
                println!("  {kind} watermark kept: {}", cursors.path(*kind).display());
            }
        }
        Ok(())
    }

    fn into_config(self) -> SyncConfig {
        SyncConfig {
            source: SourceConfig {
                base_url: self.source_url,
                username: self.source_user,
                password: self.source_password,
                collection_name: self.collection_name,
                collection_id: self.collection_id,
            },
            target: TargetConfig {
                base_url: self.target_url,
                username: self.target_user,
                password: self.target_password,
            },
            sync: EngineConfig::default(),
            notify: NotifyConfig {
                recipients: self.recipients,
            },
            daemon: DaemonConfig::default(),
        }
    }
}
