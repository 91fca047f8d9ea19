//! The live handle standing for "the bridge is running".

use std::fmt;

use {
    anyhow::Context as _,
    async_trait::async_trait,
    ferrygram_plugins::{EventPublisher, events::InstanceStatus},
    secrecy::Secret,
    tracing::{debug, info},
    url::Url,
};

/// Module name reported for the default context adapter.
pub const GATEWAY_ADAPTER: &str = "gateway-adapter";

/// What a context needs to attach to the bridge gateway.
#[derive(Clone)]
pub struct ContextSettings {
    pub endpoint: String,
    pub token: Secret<String>,
    pub instances: Vec<i64>,
    pub self_id: String,
}

impl fmt::Debug for ContextSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextSettings")
            .field("endpoint", &self.endpoint)
            .field("token", &"[REDACTED]")
            .field("instances", &self.instances)
            .field("self_id", &self.self_id)
            .finish()
    }
}

/// One runtime cycle's bridge session.
///
/// Construction and activation are separate steps: the host registers
/// features between [`ContextFactory::create`] and [`start`](Self::start).
#[async_trait]
pub trait RuntimeContext: Send {
    async fn start(&mut self) -> anyhow::Result<()>;
    async fn stop(&mut self) -> anyhow::Result<()>;
}

#[async_trait]
pub trait ContextFactory: Send + Sync {
    /// Name recorded in the report for the context adapter itself.
    fn module(&self) -> &str {
        GATEWAY_ADAPTER
    }

    async fn create(
        &self,
        settings: &ContextSettings,
        events: &EventPublisher,
    ) -> anyhow::Result<Box<dyn RuntimeContext>>;
}

/// Default context: validates the gateway endpoint and announces instance
/// status transitions on the event bus.
pub struct BridgeContext {
    settings: ContextSettings,
    events: EventPublisher,
    endpoint: Option<Url>,
}

impl BridgeContext {
    pub fn new(settings: ContextSettings, events: EventPublisher) -> Self {
        Self {
            settings,
            events,
            endpoint: None,
        }
    }

    pub fn endpoint(&self) -> Option<&Url> {
        self.endpoint.as_ref()
    }

    fn announce(&self, status: InstanceStatus, error: Option<&str>) {
        for id in &self.settings.instances {
            self.events
                .publish_instance_status(*id, status, error.map(str::to_string));
        }
    }
}

fn parse_endpoint(raw: &str) -> anyhow::Result<Url> {
    let url = Url::parse(raw).with_context(|| format!("invalid gateway endpoint '{raw}'"))?;
    match url.scheme() {
        "ws" | "wss" | "http" | "https" => Ok(url),
        other => anyhow::bail!("unsupported gateway endpoint scheme '{other}'"),
    }
}

#[async_trait]
impl RuntimeContext for BridgeContext {
    async fn start(&mut self) -> anyhow::Result<()> {
        self.announce(InstanceStatus::Starting, None);
        match parse_endpoint(&self.settings.endpoint) {
            Ok(url) => {
                info!(
                    endpoint = %url,
                    self_id = %self.settings.self_id,
                    instances = ?self.settings.instances,
                    "bridge context active"
                );
                self.endpoint = Some(url);
                self.announce(InstanceStatus::Running, None);
                Ok(())
            },
            Err(e) => {
                self.announce(InstanceStatus::Error, Some(&format!("{e:#}")));
                Err(e)
            },
        }
    }

    async fn stop(&mut self) -> anyhow::Result<()> {
        if self.endpoint.take().is_none() {
            debug!("bridge context was never active");
            return Ok(());
        }
        self.announce(InstanceStatus::Stopping, None);
        self.announce(InstanceStatus::Stopped, None);
        info!("bridge context stopped");
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct BridgeContextFactory;

#[async_trait]
impl ContextFactory for BridgeContextFactory {
    async fn create(
        &self,
        settings: &ContextSettings,
        events: &EventPublisher,
    ) -> anyhow::Result<Box<dyn RuntimeContext>> {
        Ok(Box::new(BridgeContext::new(settings.clone(), events.clone())))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use ferrygram_plugins::events::BridgeEvent;

    use super::*;

    fn settings(endpoint: &str) -> ContextSettings {
        ContextSettings {
            endpoint: endpoint.into(),
            token: Secret::new("t".into()),
            instances: vec![1, 2],
            self_id: "ferrygram".into(),
        }
    }

    fn drain(
        rx: &mut tokio::sync::broadcast::Receiver<BridgeEvent>,
    ) -> Vec<(i64, InstanceStatus)> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let BridgeEvent::InstanceStatus(s) = event {
                out.push((s.instance_id, s.status));
            }
        }
        out
    }

    #[tokio::test]
    async fn start_and_stop_announce_each_instance() {
        let events = EventPublisher::default();
        let mut rx = events.subscribe();
        let mut ctx = BridgeContext::new(settings("ws://127.0.0.1:8765"), events);

        ctx.start().await.unwrap();
        assert_eq!(drain(&mut rx), vec![
            (1, InstanceStatus::Starting),
            (2, InstanceStatus::Starting),
            (1, InstanceStatus::Running),
            (2, InstanceStatus::Running),
        ]);

        ctx.stop().await.unwrap();
        assert_eq!(drain(&mut rx), vec![
            (1, InstanceStatus::Stopping),
            (2, InstanceStatus::Stopping),
            (1, InstanceStatus::Stopped),
            (2, InstanceStatus::Stopped),
        ]);
        // Second stop is a no-op.
        ctx.stop().await.unwrap();
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn bad_endpoint_fails_activation() {
        let events = EventPublisher::default();
        let mut rx = events.subscribe();
        let mut ctx = BridgeContext::new(settings("ftp://example.com"), events);

        let err = ctx.start().await.unwrap_err();
        assert!(err.to_string().contains("unsupported gateway endpoint scheme"));
        assert!(drain(&mut rx).contains(&(1, InstanceStatus::Error)));
        assert!(ctx.endpoint().is_none());

        assert!(parse_endpoint("not a url").is_err());
    }

    #[test]
    fn debug_redacts_token() {
        let rendered = format!("{:?}", settings("ws://x"));
        assert!(rendered.contains("[REDACTED]"));
        assert!(!rendered.contains("token: \"t\""));
    }
}
