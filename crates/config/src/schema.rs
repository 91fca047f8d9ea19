/// Config schema types (server, bridge runtime, admin auth, plugin storage).
use std::path::PathBuf;

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FerrygramConfig {
    pub server: ServerConfig,
    pub runtime: RuntimeConfig,
    pub auth: AuthConfig,
    pub plugins: PluginsConfig,
}

/// Admin HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to. Defaults to "127.0.0.1".
    pub bind: String,
    /// Port to listen on. Defaults to 8780.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 8780,
        }
    }
}

/// Plugin runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Whether the plugin runtime starts at all. Defaults to true.
    pub enabled: bool,
    /// Bridge gateway endpoint the runtime context attaches to.
    pub endpoint: String,
    /// Bridge instance ids served by the runtime when a start request
    /// doesn't name any.
    pub instances: Vec<i64>,
    /// Identity the runtime context presents to the gateway.
    pub self_id: String,
    /// Log every inbound message event (diagnostics).
    pub debug_sessions: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "ws://127.0.0.1:8765".into(),
            instances: vec![0],
            self_id: "ferrygram".into(),
            debug_sessions: false,
        }
    }
}

/// Admin credential configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Token required by the admin API and by the runtime's gateway adapter.
    #[serde(
        serialize_with = "serialize_option_secret",
        skip_serializing_if = "Option::is_none"
    )]
    pub admin_token: Option<Secret<String>>,
}

impl AuthConfig {
    /// The admin token, if one is configured and non-blank.
    pub fn token(&self) -> Option<&str> {
        self.admin_token
            .as_ref()
            .map(|s| s.expose_secret().as_str())
            .filter(|t| !t.trim().is_empty())
    }
}

/// Plugin inventory locations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginsConfig {
    /// Directory holding installed plugin packages. Defaults to
    /// `<data_dir>/plugins`.
    pub dir: Option<PathBuf>,
    /// Inventory document. Defaults to `<data_dir>/plugins.json`.
    pub store: Option<PathBuf>,
}

impl PluginsConfig {
    pub fn resolved_dir(&self) -> PathBuf {
        self.dir
            .clone()
            .unwrap_or_else(|| crate::loader::data_dir().join("plugins"))
    }

    pub fn resolved_store(&self) -> PathBuf {
        self.store
            .clone()
            .unwrap_or_else(|| crate::loader::data_dir().join("plugins.json"))
    }
}

// ── Serde helpers for Secret<String> ────────────────────────────────────────

fn serialize_option_secret<S: serde::Serializer>(
    secret: &Option<Secret<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match secret {
        Some(s) => serializer.serialize_some(s.expose_secret()),
        None => serializer.serialize_none(),
    }
}
