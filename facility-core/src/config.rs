//! YAML configuration for a facility sync deployment.
//!
//! # Storage layout
//!
//! ```text
//! ~/.facility/
//!   config.yaml       (mode 0600, holds both systems' credentials)
//!   state/
//!     last_added      (created-since watermark)
//!     last_updated    (updated-since watermark)
//! ```
//!
//! # API pattern
//!
//! Every function has two forms:
//! - `fn_at(home: &Path, …)`: explicit home; used in tests with `TempDir`
//! - `fn(…)`: derives home from `dirs::home_dir()`, delegates to `_at`
//!
//! Tests must NEVER call the no-arg wrappers; always use `_at`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_COLLECTION_NAME: &str = "Ethiopia Health Facility Registry";
pub const DEFAULT_ROOT_LABEL: &str = "Federal Ministry of Health";
pub const DEFAULT_SKEW_HOURS: i64 = 3;
pub const DEFAULT_MAX_CHAIN_DEPTH: usize = 16;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_LISTEN: &str = "127.0.0.1:7001";

// ---------------------------------------------------------------------------
// 1. Config model
// ---------------------------------------------------------------------------

/// Root of `config.yaml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    pub source: SourceConfig,
    pub target: TargetConfig,
    #[serde(default)]
    pub sync: EngineConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub daemon: DaemonConfig,
}

/// Facility registry connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub base_url: String,
    pub username: String,
    pub password: String,
    /// Collection to sync, matched by name against the collections listing.
    #[serde(default = "default_collection_name")]
    pub collection_name: String,
    /// Skips the name lookup when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_id: Option<String>,
}

/// Organisation-unit store connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetConfig {
    pub base_url: String,
    pub username: String,
    pub password: String,
}

/// Engine tunables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Hours subtracted from each stored watermark before it is used as a filter.
    #[serde(default = "default_skew_hours")]
    pub skew_hours: i64,
    #[serde(default = "default_max_chain_depth")]
    pub max_chain_depth: usize,
    /// Name given to a missing, unnamed hierarchy root.
    #[serde(default = "default_root_label")]
    pub root_label: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Directory holding the watermark files. Defaults to `~/.facility/state`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            skew_hours: DEFAULT_SKEW_HOURS,
            max_chain_depth: DEFAULT_MAX_CHAIN_DEPTH,
            root_label: DEFAULT_ROOT_LABEL.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            state_dir: None,
        }
    }
}

/// Change-notification recipients (target user ids).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyConfig {
    #[serde(default)]
    pub recipients: Vec<String>,
}

/// Trigger server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Run a pass on this period in addition to on-demand triggers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_secs: Option<u64>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            interval_secs: None,
        }
    }
}

fn default_collection_name() -> String {
    DEFAULT_COLLECTION_NAME.to_string()
}
fn default_skew_hours() -> i64 {
    DEFAULT_SKEW_HOURS
}
fn default_max_chain_depth() -> usize {
    DEFAULT_MAX_CHAIN_DEPTH
}
fn default_root_label() -> String {
    DEFAULT_ROOT_LABEL.to_string()
}
fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}
fn default_listen() -> String {
    DEFAULT_LISTEN.to_string()
}

impl SyncConfig {
    /// Reject configs the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("source.base_url is empty".into()));
        }
        if self.target.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("target.base_url is empty".into()));
        }
        if self.source.collection_id.is_none() && self.source.collection_name.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "one of source.collection_id or source.collection_name is required".into(),
            ));
        }
        if self.sync.max_chain_depth == 0 {
            return Err(ConfigError::Invalid("sync.max_chain_depth must be > 0".into()));
        }
        if self.sync.skew_hours < 0 {
            return Err(ConfigError::Invalid("sync.skew_hours must be >= 0".into()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// 2. Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.facility/`
pub fn facility_root(home: &Path) -> PathBuf {
    home.join(".facility")
}

/// `<home>/.facility/config.yaml`: pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    facility_root(home).join("config.yaml")
}

/// Watermark directory: `sync.state_dir` when set, else `<home>/.facility/state`.
pub fn state_dir_at(home: &Path, config: &SyncConfig) -> PathBuf {
    config
        .sync
        .state_dir
        .clone()
        .unwrap_or_else(|| facility_root(home).join("state"))
}

// ---------------------------------------------------------------------------
// 3. Load
// ---------------------------------------------------------------------------

/// Load and validate `<home>/.facility/config.yaml`.
///
/// Returns `ConfigError::ConfigNotFound` if absent,
/// `ConfigError::Parse` (with path + line context) if malformed YAML.
pub fn load_at(home: &Path) -> Result<SyncConfig, ConfigError> {
    load_from(&config_path_at(home))
}

/// Load and validate a config file at an explicit path.
pub fn load_from(path: &Path) -> Result<SyncConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::ConfigNotFound {
            path: path.to_path_buf(),
        });
    }
    let contents = std::fs::read_to_string(path)?;
    let config: SyncConfig = serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })?;
    config.validate()?;
    Ok(config)
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<SyncConfig, ConfigError> {
    load_at(&home()?)
}

// ---------------------------------------------------------------------------
// 4. Save (atomic)
// ---------------------------------------------------------------------------

/// Atomically save the config to `<home>/.facility/config.yaml`.
///
/// Write flow: serialize → `.yaml.tmp` sibling → `chmod 0600` → `rename`.
pub fn save_at(home: &Path, config: &SyncConfig) -> Result<(), ConfigError> {
    let root = facility_root(home);
    if !root.exists() {
        std::fs::create_dir_all(&root)?;
        set_dir_permissions(&root)?;
    }
    let path = config_path_at(home);
    let tmp_path = path.with_file_name("config.yaml.tmp");

    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(&tmp_path, yaml)?;
    set_file_permissions(&tmp_path)?;
    std::fs::rename(&tmp_path, &path)?;
    Ok(())
}

/// `save_at` convenience wrapper.
pub fn save(config: &SyncConfig) -> Result<(), ConfigError> {
    save_at(&home()?, config)
}

// ---------------------------------------------------------------------------
// 5. Init
// ---------------------------------------------------------------------------

/// Write `config` as the deployment config unless one already exists.
///
/// Idempotent: if the file already exists, loads and returns it unchanged.
pub fn init_at(home: &Path, config: SyncConfig) -> Result<SyncConfig, ConfigError> {
    if config_path_at(home).exists() {
        return load_at(home);
    }
    config.validate()?;
    save_at(home, &config)?;
    Ok(config)
}

/// `init_at` convenience wrapper.
pub fn init(config: SyncConfig) -> Result<SyncConfig, ConfigError> {
    init_at(&home()?, config)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_home() -> TempDir {
        TempDir::new().expect("tempdir")
    }

    fn sample() -> SyncConfig {
        SyncConfig {
            source: SourceConfig {
                base_url: "https://mfr.example.org".into(),
                username: "mfr".into(),
                password: "secret".into(),
                collection_name: DEFAULT_COLLECTION_NAME.into(),
                collection_id: None,
            },
            target: TargetConfig {
                base_url: "https://dhis.example.org".into(),
                username: "admin".into(),
                password: "district".into(),
            },
            sync: EngineConfig::default(),
            notify: NotifyConfig::default(),
            daemon: DaemonConfig::default(),
        }
    }

    #[test]
    fn config_path_is_correct() {
        let home = make_home();
        assert!(config_path_at(home.path()).ends_with(".facility/config.yaml"));
    }

    #[test]
    fn save_and_load_roundtrip() {
        let home = make_home();
        save_at(home.path(), &sample()).expect("save");
        let loaded = load_at(home.path()).expect("load");
        assert_eq!(loaded, sample());
    }

    #[test]
    fn saved_config_is_private() {
        let home = make_home();
        save_at(home.path(), &sample()).expect("save");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(config_path_at(home.path()))
                .unwrap()
                .permissions()
                .mode()
                & 0o777;
            assert_eq!(mode, 0o600);
        }
    }

    #[test]
    fn missing_sections_take_defaults() {
        let home = make_home();
        let path = config_path_at(home.path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(
            &path,
            "source:\n  base_url: https://mfr\n  username: u\n  password: p\n\
             target:\n  base_url: https://dhis\n  username: u\n  password: p\n",
        )
        .unwrap();

        let loaded = load_at(home.path()).expect("load");
        assert_eq!(loaded.sync.skew_hours, 3);
        assert_eq!(loaded.sync.max_chain_depth, 16);
        assert_eq!(loaded.sync.root_label, DEFAULT_ROOT_LABEL);
        assert_eq!(loaded.source.collection_name, DEFAULT_COLLECTION_NAME);
        assert_eq!(loaded.daemon.listen, DEFAULT_LISTEN);
        assert!(loaded.notify.recipients.is_empty());
    }

    #[test]
    fn validate_rejects_zero_depth() {
        let mut config = sample();
        config.sync.max_chain_depth = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn init_is_idempotent() {
        let home = make_home();
        init_at(home.path(), sample()).expect("first init");
        let mut other = sample();
        other.target.base_url = "https://elsewhere".into();
        let kept = init_at(home.path(), other).expect("second init");
        assert_eq!(kept.target.base_url, "https://dhis.example.org");
    }

    #[test]
    fn state_dir_defaults_under_root() {
        let home = make_home();
        let dir = state_dir_at(home.path(), &sample());
        assert!(dir.ends_with(".facility/state"));
    }

    #[test]
    fn home_not_found_error_message() {
        assert!(ConfigError::HomeNotFound.to_string().contains("home directory"));
    }
}
