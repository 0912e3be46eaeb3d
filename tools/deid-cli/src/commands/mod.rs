pub mod anonymize;
pub mod check;
pub mod init;
pub mod process;
pub mod segments;
pub mod validate;

use std::path::Path;

use deid_common::config::AppConfig;

/// Configuration from `path`, or the standard location when unset.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    match path {
        Some(path) => AppConfig::load_from(path)
            .map_err(|e| anyhow::anyhow!("Failed to load config {}: {e}", path.display())),
        None => Ok(AppConfig::load()),
    }
}
