//! Plugin runtime host for the ferrygram bridge.
//!
//! [`RuntimeHost`] owns the single [`RuntimeContext`] and the
//! [`FeatureRegistry`](ferrygram_plugins::FeatureRegistry) built around it,
//! and records what each start cycle loaded in a [`RuntimeReport`].

pub mod context;
pub mod error;
pub mod host;
pub mod report;
pub mod settings;

pub use {
    context::{
        BridgeContext, BridgeContextFactory, ContextFactory, ContextSettings, GATEWAY_ADAPTER,
        RuntimeContext,
    },
    error::{Error, Result},
    host::{FeatureStatus, PLUGIN_SPECS_MODULE, RuntimeHost, RuntimeHostBuilder},
    report::{FailedPlugin, HostPhase, PluginReload, RuntimeReport, StartOptions},
    settings::{ConfigFileSource, RuntimeSettings, SettingsSource, StaticSettings},
};
