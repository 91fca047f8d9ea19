use std::{collections::BTreeMap, panic::AssertUnwindSafe, sync::Arc};

use {
    futures::FutureExt,
    tracing::{debug, error, info, warn},
};

use crate::feature::{BuiltinSlot, Feature};

struct Entry {
    name: String,
    feature: Arc<dyn Feature>,
}

/// Named feature instances for one runtime cycle.
///
/// Names are unique for the registry's lifetime between teardowns;
/// insertion order is kept so [`destroy`](Self::destroy) tears features
/// down in the order they came up.
#[derive(Default)]
pub struct FeatureRegistry {
    entries: Vec<Entry>,
    media: Option<Arc<dyn Feature>>,
    commands: Option<Arc<dyn Feature>>,
    forward: Option<Arc<dyn Feature>>,
    recall: Option<Arc<dyn Feature>>,
}

impl FeatureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `feature` under `name`.
    ///
    /// Returns `false` without touching the registry when the feature is
    /// absent or the name is already taken.
    pub fn register(
        &mut self,
        name: &str,
        feature: impl Into<Option<Arc<dyn Feature>>>,
    ) -> bool {
        let Some(feature) = feature.into() else {
            return false;
        };
        if self.contains(name) {
            debug!(feature = name, "feature already registered, ignoring");
            return false;
        }

        if let Some(slot) = BuiltinSlot::from_name(name) {
            *self.slot_mut(slot) = Some(Arc::clone(&feature));
            info!(feature = name, "built-in feature slot filled");
        }
        self.entries.push(Entry {
            name: name.to_string(),
            feature,
        });
        debug!(feature = name, count = self.entries.len(), "feature registered");
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Feature>> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| &e.feature)
    }

    /// Mark a feature enabled. Returns `false` for unknown names.
    pub fn enable(&self, name: &str) -> bool {
        if !self.contains(name) {
            warn!(feature = name, "feature not found");
            return false;
        }
        info!(feature = name, "feature enabled");
        true
    }

    /// Mark a feature disabled. Returns `false` for unknown names.
    ///
    /// The instance stays registered and live.
    pub fn disable(&self, name: &str) -> bool {
        if !self.contains(name) {
            warn!(feature = name, "feature not found");
            return false;
        }
        info!(feature = name, "feature disabled");
        true
    }

    /// Presence map: every registered name maps to `true`.
    pub fn status(&self) -> BTreeMap<String, bool> {
        self.entries
            .iter()
            .map(|e| (e.name.clone(), true))
            .collect()
    }

    /// Registered names in insertion order.
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn media(&self) -> Option<&Arc<dyn Feature>> {
        self.media.as_ref()
    }

    pub fn commands(&self) -> Option<&Arc<dyn Feature>> {
        self.commands.as_ref()
    }

    pub fn forward(&self) -> Option<&Arc<dyn Feature>> {
        self.forward.as_ref()
    }

    pub fn recall(&self) -> Option<&Arc<dyn Feature>> {
        self.recall.as_ref()
    }

    pub fn slot(&self, slot: BuiltinSlot) -> Option<&Arc<dyn Feature>> {
        match slot {
            BuiltinSlot::Media => self.media(),
            BuiltinSlot::Commands => self.commands(),
            BuiltinSlot::Forward => self.forward(),
            BuiltinSlot::Recall => self.recall(),
        }
    }

    fn slot_mut(&mut self, slot: BuiltinSlot) -> &mut Option<Arc<dyn Feature>> {
        match slot {
            BuiltinSlot::Media => &mut self.media,
            BuiltinSlot::Commands => &mut self.commands,
            BuiltinSlot::Forward => &mut self.forward,
            BuiltinSlot::Recall => &mut self.recall,
        }
    }

    /// Destroy every feature in insertion order, then empty the registry.
    ///
    /// A failing or panicking destroy is logged and the pass moves on; the
    /// registry is always empty afterwards.
    pub async fn destroy(&mut self) {
        if self.entries.is_empty() {
            return;
        }
        info!(count = self.entries.len(), "destroying features");

        for entry in self.entries.drain(..) {
            destroy_entry(entry).await;
        }

        for slot in BuiltinSlot::ALL {
            *self.slot_mut(*slot) = None;
        }
        info!("all features destroyed");
    }

    /// Destroy one feature and drop it from the registry.
    ///
    /// Returns `false` for unknown names. The name is free again afterwards
    /// even if the destroy failed.
    pub async fn remove(&mut self, name: &str) -> bool {
        let Some(index) = self.entries.iter().position(|e| e.name == name) else {
            return false;
        };
        let entry = self.entries.remove(index);
        if let Some(slot) = BuiltinSlot::from_name(name) {
            *self.slot_mut(slot) = None;
        }
        destroy_entry(entry).await;
        true
    }
}

async fn destroy_entry(entry: Entry) {
    match AssertUnwindSafe(entry.feature.destroy())
        .catch_unwind()
        .await
    {
        Ok(Ok(())) => debug!(feature = %entry.name, "feature destroyed"),
        Ok(Err(e)) => {
            error!(feature = %entry.name, error = %e, "failed to destroy feature");
        },
        Err(_) => error!(feature = %entry.name, "feature destroy panicked"),
    }
}
