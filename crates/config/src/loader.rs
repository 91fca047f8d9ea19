use std::{
    path::{Path, PathBuf},
    sync::RwLock,
};

use {
    secrecy::Secret,
    tracing::{debug, warn},
};

use crate::{
    env_subst::substitute_env,
    error::{Error, Result},
    schema::FerrygramConfig,
};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "ferrygram.toml",
    "ferrygram.yaml",
    "ferrygram.yml",
    "ferrygram.json",
];

static CONFIG_DIR_OVERRIDE: RwLock<Option<PathBuf>> = RwLock::new(None);
static DATA_DIR_OVERRIDE: RwLock<Option<PathBuf>> = RwLock::new(None);

/// Override the user-global config directory (e.g. from `--config-dir`).
pub fn set_config_dir(dir: PathBuf) {
    *CONFIG_DIR_OVERRIDE
        .write()
        .unwrap_or_else(|e| e.into_inner()) = Some(dir);
}

/// Override the data directory (e.g. from `--data-dir`).
pub fn set_data_dir(dir: PathBuf) {
    *DATA_DIR_OVERRIDE.write().unwrap_or_else(|e| e.into_inner()) = Some(dir);
}

/// Returns the user-global config directory (`~/.config/ferrygram/`).
pub fn config_dir() -> Option<PathBuf> {
    if let Some(dir) = CONFIG_DIR_OVERRIDE
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .clone()
    {
        return Some(dir);
    }
    directories::ProjectDirs::from("", "", "ferrygram").map(|d| d.config_dir().to_path_buf())
}

/// Returns the data directory (`~/.local/share/ferrygram/` or platform
/// equivalent), falling back to `./.ferrygram`.
pub fn data_dir() -> PathBuf {
    if let Some(dir) = DATA_DIR_OVERRIDE
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .clone()
    {
        return dir;
    }
    directories::ProjectDirs::from("", "", "ferrygram")
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".ferrygram"))
}

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> Result<FerrygramConfig> {
    let raw = std::fs::read_to_string(path).map_err(|e| Error::read(path, e))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations, then apply env
/// overrides.
///
/// Returns `FerrygramConfig::default()` (plus overrides) if no config file is
/// found or the file fails to parse.
pub fn discover_and_load() -> FerrygramConfig {
    let config = match find_config_file() {
        Some(path) => {
            debug!(path = %path.display(), "loading config");
            load_config(&path).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
                FerrygramConfig::default()
            })
        },
        None => {
            debug!("no config file found, using defaults");
            FerrygramConfig::default()
        },
    };
    apply_env_overrides(config)
}

/// Find the first config file in standard locations.
pub fn find_config_file() -> Option<PathBuf> {
    CONFIG_FILENAMES
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
        .or_else(|| {
            let dir = config_dir()?;
            CONFIG_FILENAMES
                .iter()
                .map(|name| dir.join(name))
                .find(|p| p.exists())
        })
}

/// Serialize `config` to TOML and write it to `path`, creating parent
/// directories as needed.
pub fn save_config(config: &FerrygramConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, toml::to_string_pretty(config)?)?;
    debug!(path = %path.display(), "saved config");
    Ok(())
}

/// Apply `FERRYGRAM_*` environment overrides on top of file values.
///
/// `ADMIN_TOKEN` is honoured as a fallback for `FERRYGRAM_ADMIN_TOKEN`.
pub fn apply_env_overrides(config: FerrygramConfig) -> FerrygramConfig {
    apply_env_overrides_with(config, |name| std::env::var(name).ok())
}

fn apply_env_overrides_with(
    mut config: FerrygramConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> FerrygramConfig {
    let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(token) = var("FERRYGRAM_ADMIN_TOKEN").or_else(|| var("ADMIN_TOKEN")) {
        config.auth.admin_token = Some(Secret::new(token));
    }
    if let Some(enabled) = var("FERRYGRAM_RUNTIME_ENABLED") {
        config.runtime.enabled = matches!(
            enabled.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        );
    }
    if let Some(endpoint) = var("FERRYGRAM_RUNTIME_ENDPOINT") {
        config.runtime.endpoint = endpoint;
    }
    if let Some(debug) = var("FERRYGRAM_DEBUG_SESSIONS") {
        config.runtime.debug_sessions = debug.trim() == "1";
    }
    config
}

fn parse_config(raw: &str, path: &Path) -> Result<FerrygramConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        other => Err(Error::UnsupportedFormat {
            extension: other.to_string(),
        }),
    }
}
