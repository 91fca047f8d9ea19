//! Plugin model for the bridge runtime.
//!
//! Features (built-in or plugin-supplied) implement [`Feature`] and live in a
//! [`FeatureRegistry`] for the duration of one runtime cycle. Plugins are
//! described by [`PluginSpec`]s produced by a [`PluginSpecLoader`]; the
//! inventory-backed loader resolves persisted entries against a
//! [`PluginCatalog`]. Events reach features through the [`EventPublisher`].

pub mod bundled;
pub mod bus;
pub mod catalog;
pub mod error;
pub mod events;
pub mod feature;
pub mod install;
pub mod registry;
pub mod spec;
pub mod store;

pub use {
    bus::{EventBus, EventPublisher},
    catalog::{PluginCatalog, StoreSpecLoader},
    error::{Error, Result},
    feature::{BuiltinPlugin, BuiltinSlot, Feature},
    install::{PluginInstaller, PluginVersions},
    registry::FeatureRegistry,
    spec::{
        FeatureConstructor, FeatureFactory, PluginSetup, PluginSpec, PluginSpecLoader,
        StaticSpecLoader,
    },
    store::{NewPlugin, PluginEntry, PluginPatch, PluginStore},
};
