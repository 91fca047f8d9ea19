//! `session-logger` built-in: traces every inbound message.

use std::sync::Arc;

use {async_trait::async_trait, tracing::info};

use crate::{
    bundled::EventListener,
    events::{BridgeEvent, MessageEvent},
    feature::{BuiltinPlugin, Feature},
    spec::PluginSetup,
};

pub const NAME: &str = "session-logger";

const PREVIEW_CHARS: usize = 200;

pub const PLUGIN: BuiltinPlugin = BuiltinPlugin {
    name: NAME,
    debug_only: true,
    build,
};

fn build(setup: PluginSetup) -> Arc<dyn Feature> {
    Arc::new(SessionLogger::new(setup))
}

pub struct SessionLogger {
    listener: EventListener,
}

impl SessionLogger {
    pub fn new(setup: PluginSetup) -> Self {
        let listener =
            EventListener::spawn(NAME, &setup.events, setup.instances, |event| async move {
                if let BridgeEvent::Message(msg) = event {
                    log_message(&msg);
                }
            });
        Self { listener }
    }
}

fn log_message(msg: &MessageEvent) {
    info!(
        platform = %msg.platform,
        instance_id = msg.instance_id,
        channel = %msg.channel_id,
        sender = %msg.sender.user_id,
        sender_name = msg.sender.display_name(),
        text = %preview(&msg.message.text),
        "session message"
    );
}

fn preview(text: &str) -> String {
    text.chars().take(PREVIEW_CHARS).collect()
}

#[async_trait]
impl Feature for SessionLogger {
    async fn destroy(&self) -> anyhow::Result<()> {
        self.listener.stop();
        Ok(())
    }
}
