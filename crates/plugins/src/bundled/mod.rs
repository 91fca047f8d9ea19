//! Features shipped with the bridge.
//!
//! `ping-pong` and `session-logger` are built-ins the host installs on
//! every cycle; `keyword-reply` is a catalog plugin operators enable
//! through the inventory.

pub mod keyword_reply;
pub mod ping_pong;
pub mod session_logger;

use std::{future::Future, sync::Mutex};

use {
    tokio::{sync::broadcast::error::RecvError, task::JoinHandle},
    tracing::{debug, warn},
};

use crate::{
    bus::EventPublisher, catalog::PluginCatalog, events::BridgeEvent, feature::BuiltinPlugin,
};

/// Built-ins in installation order.
pub fn builtins() -> Vec<BuiltinPlugin> {
    vec![ping_pong::PLUGIN, session_logger::PLUGIN]
}

/// Catalog with every bundled plugin module.
pub fn catalog() -> PluginCatalog {
    PluginCatalog::new().with(keyword_reply::MODULE, keyword_reply::build)
}

/// Background task feeding bus events to a feature's handler.
///
/// Subscribes before spawning so nothing published after construction is
/// missed. Only events for the cycle's instances reach the handler.
pub(crate) struct EventListener {
    name: String,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl EventListener {
    pub(crate) fn spawn<F, Fut>(
        name: impl Into<String>,
        events: &EventPublisher,
        instances: Vec<i64>,
        handler: F,
    ) -> Self
    where
        F: Fn(BridgeEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        let mut rx = events.subscribe();
        let task_name = name.clone();
        let task = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        if instances.contains(&event.instance_id()) {
                            handler(event).await;
                        }
                    },
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(feature = %task_name, skipped, "listener lagged, events dropped");
                    },
                    Err(RecvError::Closed) => break,
                }
            }
            debug!(feature = %task_name, "listener finished");
        });
        Self {
            name,
            task: Mutex::new(Some(task)),
        }
    }

    pub(crate) fn stop(&self) {
        let task = self.task.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(task) = task {
            task.abort();
            debug!(feature = %self.name, "listener stopped");
        }
    }
}

impl Drop for EventListener {
    fn drop(&mut self) {
        self.stop();
    }
}
