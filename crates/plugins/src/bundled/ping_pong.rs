//! `ping-pong` built-in: answers `ping` with `pong`.

use std::sync::Arc;

use {async_trait::async_trait, tracing::warn};

use crate::{
    bundled::EventListener,
    events::BridgeEvent,
    feature::{BuiltinPlugin, Feature},
    spec::PluginSetup,
};

pub const NAME: &str = "ping-pong";

pub const PLUGIN: BuiltinPlugin = BuiltinPlugin {
    name: NAME,
    debug_only: false,
    build,
};

fn build(setup: PluginSetup) -> Arc<dyn Feature> {
    Arc::new(PingPong::new(setup))
}

/// Liveness check for the bridge: any chat can see the runtime is up.
pub struct PingPong {
    listener: EventListener,
}

impl PingPong {
    pub fn new(setup: PluginSetup) -> Self {
        let listener =
            EventListener::spawn(NAME, &setup.events, setup.instances, |event| async move {
                if let BridgeEvent::Message(msg) = event
                    && msg.message.text == "ping"
                    && let Err(e) = msg.reply("pong").await
                {
                    warn!(instance_id = msg.instance_id, error = %e, "ping-pong: reply failed");
                }
            });
        Self { listener }
    }
}

#[async_trait]
impl Feature for PingPong {
    async fn destroy(&self) -> anyhow::Result<()> {
        self.listener.stop();
        Ok(())
    }
}
