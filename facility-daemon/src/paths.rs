use std::path::{Path, PathBuf};
use std::time::Duration;

pub use facility_core::config::{config_path_at, facility_root};

/// Editors tend to emit several events per save.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(500);

pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// Directory the config watcher listens on.
pub fn watch_dir(home: &Path) -> PathBuf {
    facility_root(home)
}

pub fn is_config_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name == CONFIG_FILE_NAME)
}
