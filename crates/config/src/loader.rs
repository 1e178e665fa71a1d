use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{
    env_subst::substitute_env,
    error::{Error, Result},
    schema::WxhookConfig,
};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &["wxhook.toml", "wxhook.yaml", "wxhook.yml", "wxhook.json"];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> Result<WxhookConfig> {
    let raw = std::fs::read_to_string(path).map_err(|e| Error::read(path, e))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Load the config at `path` when given, otherwise discover it.
///
/// An explicit path must exist and parse; discovery falls back to defaults.
pub fn load_or_discover(path: Option<&Path>) -> Result<WxhookConfig> {
    match path {
        Some(path) => load_config(path),
        None => Ok(discover_and_load()),
    }
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./wxhook.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/wxhook/wxhook.{toml,yaml,yml,json}` (user-global)
///
/// Returns `WxhookConfig::default()` if no config file is found.
pub fn discover_and_load() -> WxhookConfig {
    if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    WxhookConfig::default()
}

/// Find the first config file in standard locations.
pub fn find_config_file() -> Option<PathBuf> {
    CONFIG_FILENAMES
        .iter()
        .map(PathBuf::from)
        .chain(
            config_dir()
                .into_iter()
                .flat_map(|dir| CONFIG_FILENAMES.iter().map(move |name| dir.join(name))),
        )
        .find(|p| p.exists())
}

/// Returns the user-global config directory (`~/.config/wxhook/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "wxhook").map(|d| d.config_dir().to_path_buf())
}

/// Returns the data directory used for plugin output such as message logs.
pub fn data_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "wxhook")
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".wxhook"))
}

fn parse_config(raw: &str, path: &Path) -> Result<WxhookConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => Err(Error::UnsupportedFormat {
            extension: ext.to_string(),
        }),
    }
}
