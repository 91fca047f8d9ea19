//! The capability every bridge feature exposes to the host.
//!
//! Built-in features and plugin-supplied ones are the same thing from the
//! host's point of view: a value that may hold resources and may need to
//! release them when the runtime goes down.

use std::{fmt, sync::Arc};

use async_trait::async_trait;

use crate::spec::PluginSetup;

/// A live feature instance owned by the [`FeatureRegistry`](crate::registry::FeatureRegistry).
#[async_trait]
pub trait Feature: Send + Sync {
    /// Release whatever the feature holds (listener tasks, connections).
    ///
    /// Features without teardown keep the default.
    async fn destroy(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Feature names the rest of the bridge consumes through dedicated
/// registry accessors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinSlot {
    Media,
    Commands,
    Forward,
    Recall,
}

impl BuiltinSlot {
    pub const ALL: &'static [BuiltinSlot] =
        &[Self::Media, Self::Commands, Self::Forward, Self::Recall];

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "media" => Some(Self::Media),
            "commands" => Some(Self::Commands),
            "forward" => Some(Self::Forward),
            "recall" => Some(Self::Recall),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Media => "media",
            Self::Commands => "commands",
            Self::Forward => "forward",
            Self::Recall => "recall",
        }
    }
}

impl fmt::Display for BuiltinSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A feature the host always installs before any external plugin.
///
/// Built-ins cannot fail to construct; anything fallible belongs in a
/// plugin spec so the failure lands in the runtime report.
#[derive(Clone, Copy)]
pub struct BuiltinPlugin {
    pub name: &'static str,
    /// Only installed when session debugging is switched on.
    pub debug_only: bool,
    pub build: fn(PluginSetup) -> Arc<dyn Feature>,
}

impl fmt::Debug for BuiltinPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuiltinPlugin")
            .field("name", &self.name)
            .field("debug_only", &self.debug_only)
            .finish_non_exhaustive()
    }
}
