//! `keyword-reply` plugin: canned answers to exact keywords.
//!
//! ```json
//! { "rules": { "help": "Try /bind or /unbind" } }
//! ```

use std::{collections::BTreeMap, sync::Arc};

use {
    anyhow::Context,
    async_trait::async_trait,
    serde::Deserialize,
    tracing::{debug, warn},
};

use crate::{bundled::EventListener, events::BridgeEvent, feature::Feature, spec::PluginSetup};

pub const MODULE: &str = "keyword-reply";

#[derive(Debug, Deserialize)]
struct KeywordReplyConfig {
    rules: BTreeMap<String, String>,
}

/// Catalog constructor.
pub fn build(setup: PluginSetup) -> anyhow::Result<Arc<dyn Feature>> {
    Ok(Arc::new(KeywordReply::new(setup)?))
}

pub struct KeywordReply {
    listener: EventListener,
}

impl KeywordReply {
    pub fn new(setup: PluginSetup) -> anyhow::Result<Self> {
        let config: KeywordReplyConfig = serde_json::from_value(setup.config.clone())
            .with_context(|| format!("{}: invalid keyword-reply config", setup.module))?;
        let rules: BTreeMap<String, String> = config
            .rules
            .into_iter()
            .map(|(k, v)| (k.trim().to_string(), v))
            .filter(|(k, _)| !k.is_empty())
            .collect();
        if rules.is_empty() {
            anyhow::bail!("{}: keyword-reply needs at least one rule", setup.module);
        }
        debug!(plugin = %setup.module, rules = rules.len(), "keyword-reply configured");

        let rules = Arc::new(rules);
        let name = setup.module.clone();
        let listener = EventListener::spawn(
            setup.module,
            &setup.events,
            setup.instances,
            move |event| {
                let rules = Arc::clone(&rules);
                let name = name.clone();
                async move {
                    let BridgeEvent::Message(msg) = event else {
                        return;
                    };
                    if let Some(reply) = rules.get(msg.message.text.trim())
                        && let Err(e) = msg.reply(reply).await
                    {
                        warn!(plugin = %name, error = %e, "keyword reply failed");
                    }
                }
            },
        );
        Ok(Self { listener })
    }
}

#[async_trait]
impl Feature for KeywordReply {
    async fn destroy(&self) -> anyhow::Result<()> {
        self.listener.stop();
        Ok(())
    }
}
