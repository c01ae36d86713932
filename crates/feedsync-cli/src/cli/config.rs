use std::path::{Path, PathBuf};

use anyhow::Result;
use feedsync_core::FeedConfig;
use tracing::debug;

/// `<config dir>/feedsync/config.json`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("feedsync").join("config.json"))
}

/// Pick the config to run with.
///
/// An explicit path must load. Without one, the default location is used when
/// the file exists; otherwise built-in defaults apply.
pub fn resolve_config(explicit: Option<&Path>) -> Result<FeedConfig> {
    resolve_from(explicit, default_config_path().as_deref())
}

fn resolve_from(explicit: Option<&Path>, fallback: Option<&Path>) -> Result<FeedConfig> {
    if let Some(path) = explicit {
        return FeedConfig::load(path);
    }
    match fallback {
        Some(path) if path.exists() => {
            debug!(path = %path.display(), "loading default config");
            FeedConfig::load(path)
        }
        _ => Ok(FeedConfig::default()),
    }
}
