use std::fmt;

use serde::{Deserialize, Serialize};

/// Outcome of one start cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeReport {
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instances: Option<Vec<i64>>,
    /// Modules brought up, in load order.
    pub loaded: Vec<String>,
    pub failed: Vec<FailedPlugin>,
}

impl RuntimeReport {
    /// Report for a runtime switched off by configuration.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            endpoint: None,
            instances: None,
            loaded: Vec::new(),
            failed: Vec::new(),
        }
    }

    pub(crate) fn enabled(endpoint: String, instances: Vec<i64>) -> Self {
        Self {
            enabled: true,
            endpoint: Some(endpoint),
            instances: Some(instances),
            loaded: Vec::new(),
            failed: Vec::new(),
        }
    }

    pub fn is_loaded(&self, module: &str) -> bool {
        self.loaded.iter().any(|m| m == module)
    }

    pub fn failure(&self, module: &str) -> Option<&FailedPlugin> {
        self.failed.iter().find(|f| f.module == module)
    }
}

impl Default for RuntimeReport {
    fn default() -> Self {
        Self::disabled()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedPlugin {
    pub module: String,
    pub error: String,
}

impl FailedPlugin {
    pub fn new(module: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            error: error.into(),
        }
    }
}

/// Outcome of reloading one plugin in a running runtime.
///
/// `loaded: false` without an `error` means the plugin is disabled in its
/// spec and was only torn down.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginReload {
    pub module: String,
    pub loaded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PluginReload {
    pub fn loaded(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            loaded: true,
            error: None,
        }
    }

    pub fn disabled(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            loaded: false,
            error: None,
        }
    }

    pub fn failed(module: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            loaded: false,
            error: Some(error.into()),
        }
    }
}

/// Caller-supplied knobs for a start or reload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartOptions {
    /// Bridge instances to serve; empty means the configured default.
    #[serde(default)]
    pub instances: Vec<i64>,
}

impl StartOptions {
    pub fn with_instances(instances: impl Into<Vec<i64>>) -> Self {
        Self {
            instances: instances.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostPhase {
    Idle,
    Starting,
    Running,
    Stopping,
}

impl fmt::Display for HostPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
        })
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_report_omits_endpoint() {
        let json = serde_json::to_value(RuntimeReport::disabled()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "enabled": false, "loaded": [], "failed": [] })
        );
    }

    #[test]
    fn enabled_report_shape() {
        let mut report = RuntimeReport::enabled("ws://x".into(), vec![0, 2]);
        report.loaded.push("gateway-adapter".into());
        report.failed.push(FailedPlugin::new("a", "boom"));

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["endpoint"], "ws://x");
        assert_eq!(json["instances"], serde_json::json!([0, 2]));
        assert_eq!(json["failed"][0]["module"], "a");
        assert!(report.is_loaded("gateway-adapter"));
        assert_eq!(report.failure("a").unwrap().error, "boom");
    }

    #[test]
    fn start_options_accept_empty_body() {
        let opts: StartOptions = serde_json::from_str("{}").unwrap();
        assert!(opts.instances.is_empty());
    }
}
