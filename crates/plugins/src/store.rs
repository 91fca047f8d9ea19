//! Persisted plugin inventory.
//!
//! The inventory is a single JSON document listing every plugin the
//! operator configured, independent of whether the runtime is currently
//! running any of them. Writes go through a temp file + rename.

use std::{
    path::{Path, PathBuf},
    sync::Mutex,
    time::{SystemTime, UNIX_EPOCH},
};

use {
    serde::{Deserialize, Serialize},
    serde_json::Value,
    tracing::{debug, info},
};

use crate::error::{Error, Result};

const INVENTORY_VERSION: u32 = 1;

/// Where a plugin entry came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PluginSource {
    /// Created through the API/CLI pointing at a catalog module.
    #[default]
    Manual,
    /// Installed from a package directory.
    Package { path: PathBuf },
}

/// One installed package version kept on disk for rollback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstalledVersion {
    pub version: String,
    pub module: String,
    pub installed_at_ms: u64,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginEntry {
    pub id: String,
    pub module: String,
    pub enabled: bool,
    #[serde(default)]
    pub config: Value,
    #[serde(default)]
    pub source: PluginSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub versions: Vec<InstalledVersion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_version: Option<String>,
    #[serde(default)]
    pub updated_at_ms: u64,
}

impl PluginEntry {
    pub fn installed(&self, version: &str) -> Option<&InstalledVersion> {
        self.versions.iter().find(|v| v.version == version)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginInventory {
    pub version: u32,
    #[serde(default)]
    pub plugins: Vec<PluginEntry>,
}

impl Default for PluginInventory {
    fn default() -> Self {
        Self {
            version: INVENTORY_VERSION,
            plugins: Vec::new(),
        }
    }
}

impl PluginInventory {
    pub fn find(&self, id: &str) -> Option<&PluginEntry> {
        self.plugins.iter().find(|p| p.id == id)
    }

    fn find_mut(&mut self, id: &str) -> Option<&mut PluginEntry> {
        self.plugins.iter_mut().find(|p| p.id == id)
    }
}

/// Request to add a plugin entry by hand.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPlugin {
    pub id: String,
    pub module: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub config: Value,
}

fn default_enabled() -> bool {
    true
}

/// Partial update; absent fields are left alone.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginPatch {
    pub enabled: Option<bool>,
    pub config: Option<Value>,
    pub module: Option<String>,
}

impl PluginPatch {
    pub fn is_empty(&self) -> bool {
        self.enabled.is_none() && self.config.is_none() && self.module.is_none()
    }
}

/// JSON-file backed inventory.
pub struct PluginStore {
    path: PathBuf,
    /// Serializes load-modify-save sequences within this process.
    write_lock: Mutex<()>,
}

impl PluginStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the inventory, returning an empty one if the file is missing.
    pub fn load(&self) -> Result<PluginInventory> {
        if !self.path.exists() {
            return Ok(PluginInventory::default());
        }
        let data = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&data)?)
    }

    /// Save atomically via temp file + rename.
    pub fn save(&self, inventory: &PluginInventory) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(inventory)?)?;
        std::fs::rename(&tmp, &self.path)?;
        debug!(
            path = %self.path.display(),
            plugins = inventory.plugins.len(),
            "saved plugin inventory"
        );
        Ok(())
    }

    pub fn list(&self) -> Result<Vec<PluginEntry>> {
        Ok(self.load()?.plugins)
    }

    pub fn get(&self, id: &str) -> Result<PluginEntry> {
        self.load()?
            .find(id)
            .cloned()
            .ok_or_else(|| Error::not_found(id))
    }

    pub fn create(&self, new: NewPlugin) -> Result<PluginEntry> {
        validate_id(&new.id)?;
        validate_module(&new.module)?;
        self.insert(PluginEntry {
            id: new.id,
            module: new.module,
            enabled: new.enabled,
            config: new.config,
            source: PluginSource::Manual,
            version: None,
            versions: Vec::new(),
            previous_version: None,
            updated_at_ms: now_ms(),
        })
    }

    /// Append a fully-formed entry. Fails with a conflict if the id exists.
    pub fn insert(&self, entry: PluginEntry) -> Result<PluginEntry> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut inventory = self.load()?;
        if inventory.find(&entry.id).is_some() {
            return Err(Error::conflict(format!(
                "plugin '{}' already exists",
                entry.id
            )));
        }
        inventory.plugins.push(entry.clone());
        self.save(&inventory)?;
        info!(plugin = %entry.id, module = %entry.module, "plugin added");
        Ok(entry)
    }

    pub fn patch(&self, id: &str, patch: PluginPatch) -> Result<PluginEntry> {
        if let Some(module) = &patch.module {
            validate_module(module)?;
        }
        self.update(id, |entry| {
            if let Some(enabled) = patch.enabled {
                entry.enabled = enabled;
            }
            if let Some(config) = patch.config {
                entry.config = config;
            }
            if let Some(module) = patch.module {
                entry.module = module;
            }
            Ok(())
        })
    }

    /// Apply `f` to the entry under the write lock and persist the result.
    pub fn update(
        &self,
        id: &str,
        f: impl FnOnce(&mut PluginEntry) -> Result<()>,
    ) -> Result<PluginEntry> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut inventory = self.load()?;
        let entry = inventory.find_mut(id).ok_or_else(|| Error::not_found(id))?;
        f(entry)?;
        entry.updated_at_ms = now_ms();
        let updated = entry.clone();
        self.save(&inventory)?;
        debug!(plugin = id, "plugin updated");
        Ok(updated)
    }

    pub fn delete(&self, id: &str) -> Result<PluginEntry> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut inventory = self.load()?;
        let pos = inventory
            .plugins
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| Error::not_found(id))?;
        let removed = inventory.plugins.remove(pos);
        self.save(&inventory)?;
        info!(plugin = id, "plugin removed");
        Ok(removed)
    }
}

/// Plugin ids double as directory names, so keep them path-safe.
pub fn validate_id(id: &str) -> Result<()> {
    if id.is_empty() || id.len() > 64 {
        return Err(Error::invalid_input("plugin id must be 1-64 characters"));
    }
    if id.starts_with('.')
        || !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(Error::invalid_input(format!(
            "invalid plugin id '{id}': use letters, digits, '-', '_' or '.'"
        )));
    }
    Ok(())
}

fn validate_module(module: &str) -> Result<()> {
    if module.trim().is_empty() {
        return Err(Error::invalid_input("plugin module must not be empty"));
    }
    Ok(())
}

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
