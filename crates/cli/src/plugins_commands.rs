//! CLI commands for the plugin inventory.
//!
//! These edit the inventory file directly; a running gateway picks the
//! change up on its next reload.

use std::{path::PathBuf, sync::Arc};

use {
    clap::Subcommand,
    ferrygram_config::FerrygramConfig,
    ferrygram_plugins::{PluginEntry, PluginInstaller, PluginPatch, PluginStore},
};

#[derive(Subcommand)]
pub enum PluginAction {
    /// List inventory entries.
    List {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Install a plugin package directory (must contain `plugin.toml`).
    Install {
        path: PathBuf,
        /// Record the plugin without enabling it.
        #[arg(long)]
        disabled: bool,
    },
    /// Install a newer package for an existing plugin.
    Upgrade { id: String, path: PathBuf },
    /// Switch back to the previous, or a named, installed version.
    Rollback {
        id: String,
        #[arg(long)]
        version: Option<String>,
    },
    /// Remove a plugin and its installed packages.
    Uninstall { id: String },
    /// Enable a plugin.
    Enable { id: String },
    /// Disable a plugin.
    Disable { id: String },
    /// Show installed versions of a plugin.
    Versions { id: String },
}

pub fn handle_plugins(action: PluginAction, config: &FerrygramConfig) -> anyhow::Result<()> {
    let store = Arc::new(PluginStore::new(config.plugins.resolved_store()));
    let installer = PluginInstaller::new(Arc::clone(&store), config.plugins.resolved_dir());

    match action {
        PluginAction::List { json } => {
            let plugins = store.list()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&plugins)?);
            } else if plugins.is_empty() {
                println!("No plugins installed.");
            } else {
                for plugin in &plugins {
                    println!("  {}", describe(plugin));
                }
            }
        },
        PluginAction::Install { path, disabled } => {
            let plugin = installer.install(&path, !disabled)?;
            println!("Installed {}", describe(&plugin));
        },
        PluginAction::Upgrade { id, path } => {
            let plugin = installer.upgrade(&id, &path)?;
            println!("Upgraded {}", describe(&plugin));
        },
        PluginAction::Rollback { id, version } => {
            let plugin = installer.rollback(&id, version.as_deref())?;
            println!("Rolled back {}", describe(&plugin));
        },
        PluginAction::Uninstall { id } => {
            installer.uninstall(&id)?;
            println!("Uninstalled '{id}'.");
        },
        PluginAction::Enable { id } => set_enabled(&store, &id, true)?,
        PluginAction::Disable { id } => set_enabled(&store, &id, false)?,
        PluginAction::Versions { id } => {
            let versions = installer.versions(&id)?;
            if versions.installed.is_empty() {
                println!("'{id}' was added by hand and has no installed packages.");
            }
            for v in &versions.installed {
                let marker = if versions.current.as_deref() == Some(v.version.as_str()) {
                    "*"
                } else {
                    " "
                };
                println!("  {marker} {} ({})", v.version, v.path.display());
            }
        },
    }

    Ok(())
}

fn set_enabled(store: &PluginStore, id: &str, enabled: bool) -> anyhow::Result<()> {
    let plugin = store.patch(id, PluginPatch {
        enabled: Some(enabled),
        ..Default::default()
    })?;
    println!("{}", describe(&plugin));
    Ok(())
}

/// One-line summary: `id (module@version) [enabled]`.
fn describe(plugin: &PluginEntry) -> String {
    let version = plugin
        .version
        .as_deref()
        .map(|v| format!("@{v}"))
        .unwrap_or_default();
    let state = if plugin.enabled {
        "enabled"
    } else {
        "disabled"
    };
    format!("{} ({}{version}) [{state}]", plugin.id, plugin.module)
}
