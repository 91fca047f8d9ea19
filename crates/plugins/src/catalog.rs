//! Module name → feature constructor mapping, and the spec loader that
//! resolves inventory entries against it.

use std::{collections::BTreeMap, sync::Arc};

use {async_trait::async_trait, tracing::debug};

use crate::{
    feature::Feature,
    spec::{FeatureFactory, PluginSetup, PluginSpec, PluginSpecLoader},
    store::PluginStore,
};

/// Plugin modules this build knows how to construct.
#[derive(Clone, Default)]
pub struct PluginCatalog {
    modules: BTreeMap<String, FeatureFactory>,
}

impl PluginCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `module`, replacing any earlier constructor under that name.
    pub fn with<F>(mut self, module: impl Into<String>, factory: F) -> Self
    where
        F: Fn(PluginSetup) -> anyhow::Result<Arc<dyn Feature>> + Send + Sync + 'static,
    {
        self.insert(module, factory);
        self
    }

    pub fn insert<F>(&mut self, module: impl Into<String>, factory: F)
    where
        F: Fn(PluginSetup) -> anyhow::Result<Arc<dyn Feature>> + Send + Sync + 'static,
    {
        self.modules.insert(module.into(), Arc::new(factory));
    }

    pub fn get(&self, module: &str) -> Option<FeatureFactory> {
        self.modules.get(module).cloned()
    }

    pub fn contains(&self, module: &str) -> bool {
        self.modules.contains_key(module)
    }

    pub fn modules(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for PluginCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.modules.keys()).finish()
    }
}

/// Reads the inventory on every cycle and turns each entry into a spec.
///
/// Specs are named after the entry id so two entries may share a module
/// with different configs. Entries naming a module outside the catalog
/// still produce a spec; its load fails and the host reports it.
pub struct StoreSpecLoader {
    store: Arc<PluginStore>,
    catalog: PluginCatalog,
}

impl StoreSpecLoader {
    pub fn new(store: Arc<PluginStore>, catalog: PluginCatalog) -> Self {
        Self { store, catalog }
    }
}

#[async_trait]
impl PluginSpecLoader for StoreSpecLoader {
    async fn load(&self) -> anyhow::Result<Vec<PluginSpec>> {
        let store = Arc::clone(&self.store);
        let entries = tokio::task::spawn_blocking(move || store.list()).await??;

        let specs = entries
            .into_iter()
            .map(|entry| match self.catalog.get(&entry.module) {
                Some(factory) => {
                    PluginSpec::from_factory(entry.id, entry.enabled, entry.config, factory)
                },
                None => {
                    let message = format!("unknown plugin module: {}", entry.module);
                    PluginSpec::unresolved(entry.id, entry.enabled, entry.config, message)
                },
            })
            .collect::<Vec<_>>();
        debug!(count = specs.len(), "plugin specs loaded from inventory");
        Ok(specs)
    }
}
