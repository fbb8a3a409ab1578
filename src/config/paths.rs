//! Where the settings file and the job store live.
//!
//! Settings go under the platform config dir, the store (and its `.lock`
//! and `.owners/` siblings) under the local data dir, each in a
//! `page-summarizer` subdirectory.

use std::path::PathBuf;

const APP_DIR: &str = "page-summarizer";

/// `<base>/page-summarizer`, or `./page-summarizer` without a platform base.
fn app_dir(base: Option<PathBuf>) -> PathBuf {
    base.unwrap_or_else(|| PathBuf::from(".")).join(APP_DIR)
}

/// Default locations of the files this application owns.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// `settings.toml`, read by [`AppConfig::load`](super::AppConfig::load).
    pub settings_file: PathBuf,
    /// `jobs.json`, the persisted job store.
    pub store_file: PathBuf,
}

impl AppPaths {
    pub fn new() -> Self {
        Self {
            settings_file: app_dir(dirs::config_dir()).join("settings.toml"),
            store_file: app_dir(dirs::data_local_dir()).join("jobs.json"),
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}
