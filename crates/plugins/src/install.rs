//! Package installation, upgrade, rollback and removal.
//!
//! A package is a local directory with a `plugin.toml` at its root:
//!
//! ```toml
//! id = "greeter"
//! module = "keyword-reply"
//! version = "1.2.0"
//!
//! [config]
//! rules = { hi = "hello" }
//! ```
//!
//! Each installed version is copied to `<packages_dir>/<id>/<version>` and
//! kept until the plugin is uninstalled, so rollback never needs the
//! original source.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use {
    serde::{Deserialize, Serialize},
    serde_json::Value,
    tracing::{info, warn},
};

use crate::{
    error::{Error, Result},
    store::{InstalledVersion, PluginEntry, PluginSource, PluginStore, now_ms, validate_id},
};

pub const MANIFEST_FILE: &str = "plugin.toml";

/// Parsed `plugin.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct PackageManifest {
    pub id: String,
    pub module: String,
    pub version: String,
    #[serde(default)]
    pub config: Option<Value>,
}

/// Version history of one plugin.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginVersions {
    pub id: String,
    pub current: Option<String>,
    pub previous: Option<String>,
    pub installed: Vec<InstalledVersion>,
}

/// Read and validate the manifest of the package at `dir`.
pub fn read_manifest(dir: &Path) -> Result<PackageManifest> {
    if !dir.is_dir() {
        return Err(Error::invalid_package(dir, "not a directory"));
    }
    let manifest_path = dir.join(MANIFEST_FILE);
    if !manifest_path.is_file() {
        return Err(Error::invalid_package(dir, format!("missing {MANIFEST_FILE}")));
    }
    let raw = std::fs::read_to_string(&manifest_path)?;
    let manifest: PackageManifest = toml::from_str(&raw)?;

    validate_id(&manifest.id).map_err(|e| Error::invalid_package(dir, e.to_string()))?;
    if manifest.module.trim().is_empty() {
        return Err(Error::invalid_package(dir, "module must not be empty"));
    }
    validate_version(&manifest.version).map_err(|e| Error::invalid_package(dir, e))?;
    Ok(manifest)
}

fn validate_version(version: &str) -> std::result::Result<(), String> {
    if version.is_empty()
        || version.starts_with('.')
        || !version
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '+' | '_'))
    {
        return Err(format!("invalid version '{version}'"));
    }
    Ok(())
}

/// Installs packages into a packages directory and records them in the
/// [`PluginStore`].
pub struct PluginInstaller {
    store: Arc<PluginStore>,
    packages_dir: PathBuf,
}

impl PluginInstaller {
    pub fn new(store: Arc<PluginStore>, packages_dir: PathBuf) -> Self {
        Self {
            store,
            packages_dir,
        }
    }

    pub fn packages_dir(&self) -> &Path {
        &self.packages_dir
    }

    pub fn store(&self) -> &Arc<PluginStore> {
        &self.store
    }

    /// Install a new plugin from `source`. Fails if the id is already taken.
    pub fn install(&self, source: &Path, enabled: bool) -> Result<PluginEntry> {
        let manifest = read_manifest(source)?;
        if self.store.load()?.find(&manifest.id).is_some() {
            return Err(Error::conflict(format!(
                "plugin '{}' is already installed, use upgrade",
                manifest.id
            )));
        }

        let installed = self.copy_version(source, &manifest)?;
        let entry = PluginEntry {
            id: manifest.id.clone(),
            module: manifest.module.clone(),
            enabled,
            config: manifest.config.clone().unwrap_or(Value::Null),
            source: PluginSource::Package {
                path: source.to_path_buf(),
            },
            version: Some(manifest.version.clone()),
            versions: vec![installed],
            previous_version: None,
            updated_at_ms: now_ms(),
        };

        match self.store.insert(entry) {
            Ok(entry) => {
                info!(plugin = %entry.id, version = %manifest.version, "plugin installed");
                Ok(entry)
            },
            Err(e) => {
                self.remove_dir(&self.plugin_dir(&manifest.id));
                Err(e)
            },
        }
    }

    /// Install a different version of an existing plugin and switch to it.
    ///
    /// The operator's config is kept; the previous version stays on disk
    /// for [`rollback`](Self::rollback).
    pub fn upgrade(&self, id: &str, source: &Path) -> Result<PluginEntry> {
        let manifest = read_manifest(source)?;
        if manifest.id != id {
            return Err(Error::invalid_input(format!(
                "package id '{}' does not match plugin '{id}'",
                manifest.id
            )));
        }
        let current = self.store.get(id)?;
        if current.version.as_deref() == Some(manifest.version.as_str()) {
            return Err(Error::conflict(format!(
                "plugin '{id}' is already at version {}",
                manifest.version
            )));
        }
        if current.installed(&manifest.version).is_some() {
            return Err(Error::conflict(format!(
                "version {} of '{id}' is already installed, use rollback",
                manifest.version
            )));
        }

        let installed = self.copy_version(source, &manifest)?;
        let version_dir = installed.path.clone();
        let result = self.store.update(id, |entry| {
            entry.previous_version = entry.version.take();
            entry.version = Some(manifest.version.clone());
            entry.module = manifest.module.clone();
            entry.source = PluginSource::Package {
                path: source.to_path_buf(),
            };
            entry.versions.push(installed);
            Ok(())
        });

        match result {
            Ok(entry) => {
                info!(
                    plugin = id,
                    from = ?entry.previous_version,
                    to = %manifest.version,
                    "plugin upgraded"
                );
                Ok(entry)
            },
            Err(e) => {
                self.remove_dir(&version_dir);
                Err(e)
            },
        }
    }

    /// Switch to `version`, or to the previous version when `None`.
    pub fn rollback(&self, id: &str, version: Option<&str>) -> Result<PluginEntry> {
        let entry = self.store.update(id, |entry| {
            let target = match version {
                Some(v) => v.to_string(),
                None => entry.previous_version.clone().ok_or_else(|| {
                    Error::invalid_input(format!("plugin '{id}' has no previous version"))
                })?,
            };
            if entry.version.as_deref() == Some(target.as_str()) {
                return Err(Error::invalid_input(format!(
                    "plugin '{id}' is already at version {target}"
                )));
            }
            let module = entry
                .installed(&target)
                .map(|v| v.module.clone())
                .ok_or_else(|| {
                    Error::invalid_input(format!("version {target} of '{id}' is not installed"))
                })?;

            entry.previous_version = entry.version.take();
            entry.version = Some(target);
            entry.module = module;
            Ok(())
        })?;
        info!(plugin = id, version = ?entry.version, "plugin rolled back");
        Ok(entry)
    }

    /// Remove the inventory entry and every installed version on disk.
    pub fn uninstall(&self, id: &str) -> Result<PluginEntry> {
        let removed = self.store.delete(id)?;
        let dir = self.plugin_dir(id);
        if dir.exists() {
            std::fs::remove_dir_all(&dir)?;
        }
        info!(plugin = id, "plugin uninstalled");
        Ok(removed)
    }

    pub fn versions(&self, id: &str) -> Result<PluginVersions> {
        let entry = self.store.get(id)?;
        Ok(PluginVersions {
            id: entry.id,
            current: entry.version,
            previous: entry.previous_version,
            installed: entry.versions,
        })
    }

    fn plugin_dir(&self, id: &str) -> PathBuf {
        self.packages_dir.join(id)
    }

    fn copy_version(&self, source: &Path, manifest: &PackageManifest) -> Result<InstalledVersion> {
        let target = self.plugin_dir(&manifest.id).join(&manifest.version);
        if target.exists() {
            // Leftover from an interrupted install; the inventory doesn't know it.
            std::fs::remove_dir_all(&target)?;
        }
        copy_dir_recursive(source, &target)?;
        Ok(InstalledVersion {
            version: manifest.version.clone(),
            module: manifest.module.clone(),
            installed_at_ms: now_ms(),
            path: target,
        })
    }

    fn remove_dir(&self, dir: &Path) {
        if let Err(e) = std::fs::remove_dir_all(dir) {
            warn!(path = %dir.display(), error = %e, "failed to clean up package directory");
        }
    }
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<()> {
    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let target = dst.join(entry.file_name());
        if file_type.is_dir() {
            copy_dir_recursive(&entry.path(), &target)?;
        } else if file_type.is_file() {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn write_package(root: &Path, name: &str, version: &str) -> PathBuf {
        let dir = root.join(name);
        std::fs::create_dir_all(dir.join("assets")).unwrap();
        std::fs::write(
            dir.join(MANIFEST_FILE),
            format!(
                "id = \"greeter\"\nmodule = \"keyword-reply\"\nversion = \"{version}\"\n\n[config.rules]\nhi = \"hello\"\n"
            ),
        )
        .unwrap();
        std::fs::write(dir.join("assets/readme.txt"), version).unwrap();
        dir
    }

    fn installer(tmp: &tempfile::TempDir) -> PluginInstaller {
        let store = Arc::new(PluginStore::new(tmp.path().join("plugins.json")));
        PluginInstaller::new(store, tmp.path().join("packages"))
    }

    #[test]
    fn install_copies_files_and_records_entry() {
        let tmp = tempfile::tempdir().unwrap();
        let src = write_package(tmp.path(), "src-v1", "1.0.0");
        let installer = installer(&tmp);

        let entry = installer.install(&src, true).unwrap();
        assert_eq!(entry.id, "greeter");
        assert_eq!(entry.version.as_deref(), Some("1.0.0"));
        assert_eq!(entry.config["rules"]["hi"], "hello");
        assert!(
            tmp.path()
                .join("packages/greeter/1.0.0/assets/readme.txt")
                .is_file()
        );
    }

    #[test]
    fn install_twice_conflicts() {
        let tmp = tempfile::tempdir().unwrap();
        let src = write_package(tmp.path(), "src-v1", "1.0.0");
        let installer = installer(&tmp);
        installer.install(&src, true).unwrap();
        assert!(matches!(
            installer.install(&src, true),
            Err(Error::Conflict { .. })
        ));
    }

    #[test]
    fn missing_manifest_is_invalid_package() {
        let tmp = tempfile::tempdir().unwrap();
        let installer = installer(&tmp);
        assert!(matches!(
            installer.install(tmp.path(), true),
            Err(Error::InvalidPackage { .. })
        ));
    }

    #[test]
    fn upgrade_then_rollback() {
        let tmp = tempfile::tempdir().unwrap();
        let v1 = write_package(tmp.path(), "src-v1", "1.0.0");
        let v2 = write_package(tmp.path(), "src-v2", "2.0.0");
        let installer = installer(&tmp);
        installer.install(&v1, true).unwrap();
        installer
            .store()
            .patch("greeter", crate::store::PluginPatch {
                config: Some(serde_json::json!({ "rules": { "yo": "sup" } })),
                ..Default::default()
            })
            .unwrap();

        let upgraded = installer.upgrade("greeter", &v2).unwrap();
        assert_eq!(upgraded.version.as_deref(), Some("2.0.0"));
        assert_eq!(upgraded.previous_version.as_deref(), Some("1.0.0"));
        // Operator config survives the upgrade.
        assert_eq!(upgraded.config["rules"]["yo"], "sup");

        assert!(matches!(
            installer.upgrade("greeter", &v2),
            Err(Error::Conflict { .. })
        ));

        let rolled = installer.rollback("greeter", None).unwrap();
        assert_eq!(rolled.version.as_deref(), Some("1.0.0"));
        assert_eq!(rolled.previous_version.as_deref(), Some("2.0.0"));

        let versions = installer.versions("greeter").unwrap();
        assert_eq!(versions.installed.len(), 2);
        assert_eq!(versions.current.as_deref(), Some("1.0.0"));
    }

    #[test]
    fn rollback_to_unknown_version_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let v1 = write_package(tmp.path(), "src-v1", "1.0.0");
        let installer = installer(&tmp);
        installer.install(&v1, true).unwrap();

        assert!(matches!(
            installer.rollback("greeter", None),
            Err(Error::InvalidInput { .. })
        ));
        assert!(matches!(
            installer.rollback("greeter", Some("9.9.9")),
            Err(Error::InvalidInput { .. })
        ));
    }

    #[test]
    fn upgrade_rejects_mismatched_id() {
        let tmp = tempfile::tempdir().unwrap();
        let v1 = write_package(tmp.path(), "src-v1", "1.0.0");
        let installer = installer(&tmp);
        installer.install(&v1, true).unwrap();
        assert!(matches!(
            installer.upgrade("other", &v1),
            Err(Error::InvalidInput { .. })
        ));
    }

    #[test]
    fn uninstall_removes_entry_and_files() {
        let tmp = tempfile::tempdir().unwrap();
        let v1 = write_package(tmp.path(), "src-v1", "1.0.0");
        let installer = installer(&tmp);
        installer.install(&v1, false).unwrap();

        installer.uninstall("greeter").unwrap();
        assert!(!tmp.path().join("packages/greeter").exists());
        assert!(matches!(
            installer.versions("greeter"),
            Err(Error::NotFound { .. })
        ));
    }
}
