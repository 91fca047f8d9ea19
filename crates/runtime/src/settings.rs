//! Where the host reads its configuration from on each start cycle.

use std::{
    path::PathBuf,
    sync::{Mutex, RwLock},
};

use {
    async_trait::async_trait,
    ferrygram_config::{FerrygramConfig, RuntimeConfig},
    secrecy::{ExposeSecret, Secret},
    tracing::{debug, warn},
};

/// The slice of configuration a start cycle needs.
#[derive(Debug, Clone, Default)]
pub struct RuntimeSettings {
    pub runtime: RuntimeConfig,
    pub admin_token: Option<Secret<String>>,
}

impl RuntimeSettings {
    pub fn from_config(config: &FerrygramConfig) -> Self {
        Self {
            runtime: config.runtime.clone(),
            admin_token: config.auth.admin_token.clone(),
        }
    }

    /// The admin token, unless absent or blank.
    pub fn token(&self) -> Option<Secret<String>> {
        self.admin_token
            .as_ref()
            .filter(|t| !t.expose_secret().trim().is_empty())
            .cloned()
    }

    /// Requested instances, else configured ones, else `[0]`; duplicates
    /// dropped, first occurrence wins.
    pub fn resolve_instances(&self, requested: &[i64]) -> Vec<i64> {
        let source: &[i64] = if !requested.is_empty() {
            requested
        } else if !self.runtime.instances.is_empty() {
            &self.runtime.instances
        } else {
            &[0]
        };
        let mut out = Vec::with_capacity(source.len());
        for id in source {
            if !out.contains(id) {
                out.push(*id);
            }
        }
        out
    }
}

/// Supplies fresh settings at the beginning of every start cycle.
#[async_trait]
pub trait SettingsSource: Send + Sync {
    async fn current(&self) -> RuntimeSettings;
}

/// Settings fixed at construction, replaceable at runtime.
#[derive(Debug, Default)]
pub struct StaticSettings {
    settings: RwLock<RuntimeSettings>,
}

impl StaticSettings {
    pub fn new(settings: RuntimeSettings) -> Self {
        Self {
            settings: RwLock::new(settings),
        }
    }

    pub fn set(&self, settings: RuntimeSettings) {
        *self.settings.write().unwrap_or_else(|e| e.into_inner()) = settings;
    }
}

#[async_trait]
impl SettingsSource for StaticSettings {
    async fn current(&self) -> RuntimeSettings {
        self.settings
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

/// Re-reads the config file on every cycle so reload picks up edits.
///
/// The read runs on the blocking pool. A file that fails to parse leaves
/// the last good config in effect.
pub struct ConfigFileSource {
    path: Option<PathBuf>,
    last_good: Mutex<FerrygramConfig>,
}

impl ConfigFileSource {
    /// `path` pins the file; `None` re-runs discovery each cycle.
    pub fn new(path: Option<PathBuf>, initial: FerrygramConfig) -> Self {
        Self {
            path,
            last_good: Mutex::new(initial),
        }
    }
}

fn read_config(path: Option<PathBuf>) -> Option<FerrygramConfig> {
    let path = path.or_else(ferrygram_config::find_config_file)?;
    match ferrygram_config::load_config(&path) {
        Ok(config) => {
            debug!(path = %path.display(), "runtime settings reloaded");
            Some(ferrygram_config::apply_env_overrides(config))
        },
        Err(e) => {
            warn!(
                path = %path.display(),
                error = %e,
                "config reload failed, keeping last good config"
            );
            None
        },
    }
}

#[async_trait]
impl SettingsSource for ConfigFileSource {
    async fn current(&self) -> RuntimeSettings {
        let path = self.path.clone();
        let fresh = tokio::task::spawn_blocking(move || read_config(path))
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "config reload task failed, keeping last good config");
                None
            });
        let mut last_good = self.last_good.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(config) = fresh {
            *last_good = config;
        }
        RuntimeSettings::from_config(&last_good)
    }
}
