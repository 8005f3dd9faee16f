use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{env_subst::substitute_env, schema::ParleyConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &["parley.toml", "parley.yaml", "parley.yml", "parley.json"];

/// Load config from `path`, picking the format from its extension.
pub fn load_config(path: &Path) -> anyhow::Result<ParleyConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./parley.{toml,yaml,yml,json}` (project-local)
/// 2. `<user config dir>/parley.{toml,yaml,yml,json}` (user-global)
///
/// Returns `ParleyConfig::default()` if no file is found or it fails to parse.
pub fn discover_and_load() -> ParleyConfig {
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
    ParleyConfig::default()
}

/// First existing config file in the standard locations.
pub fn find_config_file() -> Option<PathBuf> {
    find_in(Path::new(".")).or_else(|| config_dir().and_then(|dir| find_in(&dir)))
}

fn find_in(dir: &Path) -> Option<PathBuf> {
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.exists())
}

/// The user-global config directory.
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "parley").map(|d| d.config_dir().to_path_buf())
}

/// Write `config` as TOML to `path`, creating parent directories.
pub fn save_config(config: &ParleyConfig, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str =
        toml::to_string_pretty(config).map_err(|e| anyhow::anyhow!("serialize config: {e}"))?;
    std::fs::write(path, toml_str)?;
    debug!(path = %path.display(), "saved config");
    Ok(())
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<ParleyConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}
