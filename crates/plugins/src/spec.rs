//! Plugin specs: what the host is asked to load on each cycle.

use std::{fmt, sync::Arc};

use {
    async_trait::async_trait,
    futures::{FutureExt, future::BoxFuture},
    serde_json::Value,
};

use crate::{bus::EventPublisher, feature::Feature};

/// Everything a feature constructor gets to work with.
#[derive(Debug, Clone)]
pub struct PluginSetup {
    /// Module identifier the feature is registered under.
    pub module: String,
    pub config: Value,
    /// Bridge instances the current runtime cycle serves.
    pub instances: Vec<i64>,
    pub events: EventPublisher,
}

/// Builds one feature instance. Consumed by the host exactly once.
pub type FeatureConstructor =
    Box<dyn FnOnce(PluginSetup) -> anyhow::Result<Arc<dyn Feature>> + Send>;

/// Reusable constructor, the shape catalog entries take.
pub type FeatureFactory =
    Arc<dyn Fn(PluginSetup) -> anyhow::Result<Arc<dyn Feature>> + Send + Sync>;

type LoadFn =
    Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<FeatureConstructor>> + Send + Sync>;

/// One plugin the host should try to bring up.
///
/// `load` resolves the constructor lazily (it may touch disk or network);
/// both the resolution and the construction are fallible and the host
/// records either failure against `module`.
#[derive(Clone)]
pub struct PluginSpec {
    pub module: String,
    pub enabled: bool,
    pub config: Value,
    load: LoadFn,
}

impl PluginSpec {
    pub fn new<F>(module: impl Into<String>, enabled: bool, config: Value, load: F) -> Self
    where
        F: Fn() -> BoxFuture<'static, anyhow::Result<FeatureConstructor>> + Send + Sync + 'static,
    {
        Self {
            module: module.into(),
            enabled,
            config,
            load: Arc::new(load),
        }
    }

    /// A spec whose constructor is already known.
    pub fn from_factory(
        module: impl Into<String>,
        enabled: bool,
        config: Value,
        factory: FeatureFactory,
    ) -> Self {
        Self::new(module, enabled, config, move || {
            let factory = Arc::clone(&factory);
            async move {
                let ctor: FeatureConstructor = Box::new(move |setup| factory(setup));
                Ok(ctor)
            }
            .boxed()
        })
    }

    /// A spec that always fails to load with `message`.
    pub fn unresolved(
        module: impl Into<String>,
        enabled: bool,
        config: Value,
        message: impl Into<String>,
    ) -> Self {
        let message: Arc<str> = Arc::from(message.into());
        Self::new(module, enabled, config, move || {
            let message = Arc::clone(&message);
            async move { Err::<FeatureConstructor, _>(anyhow::anyhow!("{message}")) }.boxed()
        })
    }

    /// Resolve the feature constructor.
    pub fn load(&self) -> BoxFuture<'static, anyhow::Result<FeatureConstructor>> {
        (self.load)()
    }
}

impl fmt::Debug for PluginSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginSpec")
            .field("module", &self.module)
            .field("enabled", &self.enabled)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Source of plugin specs, asked afresh on every start cycle.
#[async_trait]
pub trait PluginSpecLoader: Send + Sync {
    async fn load(&self) -> anyhow::Result<Vec<PluginSpec>>;
}

/// Fixed list of specs, handed out unchanged each cycle.
#[derive(Debug, Clone, Default)]
pub struct StaticSpecLoader {
    specs: Vec<PluginSpec>,
}

impl StaticSpecLoader {
    pub fn new(specs: Vec<PluginSpec>) -> Self {
        Self { specs }
    }
}

#[async_trait]
impl PluginSpecLoader for StaticSpecLoader {
    async fn load(&self) -> anyhow::Result<Vec<PluginSpec>> {
        Ok(self.specs.clone())
    }
}
