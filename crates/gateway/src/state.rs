use std::sync::Arc;

use {
    ferrygram_plugins::{PluginInstaller, PluginStore},
    ferrygram_runtime::RuntimeHost,
    secrecy::{ExposeSecret, Secret},
};

use crate::auth_middleware::{AdminAuthenticator, DenyAll};

/// Shared state behind every admin route.
pub struct GatewayState {
    pub host: RuntimeHost,
    pub installer: Arc<PluginInstaller>,
    /// Fixed when the gateway starts; config reloads do not rotate it.
    admin_token: Option<Secret<String>>,
    fallback_auth: Arc<dyn AdminAuthenticator>,
    pub version: &'static str,
}

impl GatewayState {
    pub fn new(
        host: RuntimeHost,
        installer: Arc<PluginInstaller>,
        admin_token: Option<Secret<String>>,
    ) -> Self {
        Self {
            host,
            installer,
            admin_token: admin_token.filter(|t| !t.expose_secret().trim().is_empty()),
            fallback_auth: Arc::new(DenyAll),
            version: env!("CARGO_PKG_VERSION"),
        }
    }

    /// Decides admin access when no token is configured.
    pub fn with_fallback_auth(mut self, auth: Arc<dyn AdminAuthenticator>) -> Self {
        self.fallback_auth = auth;
        self
    }

    pub fn store(&self) -> &Arc<PluginStore> {
        self.installer.store()
    }

    pub fn admin_token(&self) -> Option<&str> {
        self.admin_token.as_ref().map(|t| t.expose_secret().as_str())
    }

    pub fn fallback_auth(&self) -> &dyn AdminAuthenticator {
        self.fallback_auth.as_ref()
    }
}
