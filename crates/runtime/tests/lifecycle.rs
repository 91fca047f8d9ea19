#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use {
    async_trait::async_trait,
    ferrygram_config::RuntimeConfig,
    ferrygram_plugins::{
        BuiltinSlot, EventPublisher, Feature, FeatureConstructor, FeatureFactory, PluginSpec,
        PluginSpecLoader, StaticSpecLoader,
        events::{BridgeEvent, InstanceStatus},
    },
    ferrygram_runtime::{
        ContextFactory, ContextSettings, Error, FailedPlugin, HostPhase, PLUGIN_SPECS_MODULE,
        PluginReload, RuntimeContext, RuntimeHost, RuntimeReport, RuntimeSettings,
        StartOptions, StaticSettings,
    },
    futures::FutureExt,
    secrecy::Secret,
    serde_json::Value,
};

// ── Fixtures ────────────────────────────────────────────────────────────────

#[derive(Default)]
struct CallCounts {
    created: AtomicUsize,
    started: AtomicUsize,
    stopped: AtomicUsize,
    instances: Mutex<Vec<i64>>,
}

struct MockContext {
    calls: Arc<CallCounts>,
    fail_start: bool,
}

#[async_trait]
impl RuntimeContext for MockContext {
    async fn start(&mut self) -> anyhow::Result<()> {
        self.calls.started.fetch_add(1, Ordering::SeqCst);
        if self.fail_start {
            anyhow::bail!("gateway refused connection");
        }
        Ok(())
    }

    async fn stop(&mut self) -> anyhow::Result<()> {
        self.calls.stopped.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct MockFactory {
    calls: Arc<CallCounts>,
    fail_start: bool,
    delay: Duration,
}

#[async_trait]
impl ContextFactory for MockFactory {
    async fn create(
        &self,
        settings: &ContextSettings,
        _events: &EventPublisher,
    ) -> anyhow::Result<Box<dyn RuntimeContext>> {
        self.calls.created.fetch_add(1, Ordering::SeqCst);
        *self.calls.instances.lock().unwrap() = settings.instances.clone();
        tokio::time::sleep(self.delay).await;
        Ok(Box::new(MockContext {
            calls: Arc::clone(&self.calls),
            fail_start: self.fail_start,
        }))
    }
}

struct Tracked {
    destroyed: Arc<AtomicUsize>,
}

#[async_trait]
impl Feature for Tracked {
    async fn destroy(&self) -> anyhow::Result<()> {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct FailingLoader;

#[async_trait]
impl PluginSpecLoader for FailingLoader {
    async fn load(&self) -> anyhow::Result<Vec<PluginSpec>> {
        anyhow::bail!("inventory unreadable")
    }
}

/// Specs that tests can swap between cycles.
#[derive(Default)]
struct SwappableLoader {
    specs: Mutex<Vec<PluginSpec>>,
}

impl SwappableLoader {
    fn set(&self, specs: Vec<PluginSpec>) {
        *self.specs.lock().unwrap() = specs;
    }
}

#[async_trait]
impl PluginSpecLoader for SwappableLoader {
    async fn load(&self) -> anyhow::Result<Vec<PluginSpec>> {
        Ok(self.specs.lock().unwrap().clone())
    }
}

struct PanickingLoader;

#[async_trait]
impl PluginSpecLoader for PanickingLoader {
    async fn load(&self) -> anyhow::Result<Vec<PluginSpec>> {
        panic!("loader exploded")
    }
}

fn settings(enabled: bool, token: Option<&str>) -> RuntimeSettings {
    RuntimeSettings {
        runtime: RuntimeConfig {
            enabled,
            instances: vec![0],
            ..Default::default()
        },
        admin_token: token.map(|t| Secret::new(t.to_string())),
    }
}

fn ok_spec(module: &str, destroyed: &Arc<AtomicUsize>) -> PluginSpec {
    let destroyed = Arc::clone(destroyed);
    let factory: FeatureFactory = Arc::new(move |_| {
        Ok(Arc::new(Tracked {
            destroyed: Arc::clone(&destroyed),
        }) as Arc<dyn Feature>)
    });
    PluginSpec::from_factory(module, true, Value::Null, factory)
}

fn throwing_spec(module: &str) -> PluginSpec {
    PluginSpec::new(module, true, Value::Null, || {
        async { Err::<FeatureConstructor, _>(anyhow::anyhow!("cannot find module")) }.boxed()
    })
}

fn disabled_spec(module: &str) -> PluginSpec {
    PluginSpec::new(module, false, Value::Null, || {
        async { panic!("disabled plugins must never load") }.boxed()
    })
}

struct Harness {
    host: RuntimeHost,
    calls: Arc<CallCounts>,
    destroyed: Arc<AtomicUsize>,
}

struct HarnessBuilder {
    settings: RuntimeSettings,
    specs: Arc<dyn PluginSpecLoader>,
    destroyed: Arc<AtomicUsize>,
    fail_start: bool,
    delay: Duration,
}

impl HarnessBuilder {
    fn new() -> Self {
        Self {
            settings: settings(true, Some("secret")),
            specs: Arc::new(StaticSpecLoader::default()),
            destroyed: Arc::new(AtomicUsize::new(0)),
            fail_start: false,
            delay: Duration::ZERO,
        }
    }

    fn settings(mut self, settings: RuntimeSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Static specs; `build` gets the shared destroy counter.
    fn specs(mut self, build: impl FnOnce(&Arc<AtomicUsize>) -> Vec<PluginSpec>) -> Self {
        self.specs = Arc::new(StaticSpecLoader::new(build(&self.destroyed)));
        self
    }

    fn loader(mut self, loader: Arc<dyn PluginSpecLoader>) -> Self {
        self.specs = loader;
        self
    }

    fn fail_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn build(self) -> Harness {
        let calls = Arc::new(CallCounts::default());
        let host = RuntimeHost::builder(Arc::new(StaticSettings::new(self.settings)))
            .context_factory(Arc::new(MockFactory {
                calls: Arc::clone(&calls),
                fail_start: self.fail_start,
                delay: self.delay,
            }))
            .spec_loader(self.specs)
            .build();
        Harness {
            host,
            calls,
            destroyed: self.destroyed,
        }
    }
}

fn with_specs(build: impl FnOnce(&Arc<AtomicUsize>) -> Vec<PluginSpec>) -> HarnessBuilder {
    HarnessBuilder::new().specs(build)
}

fn loaded(report: &RuntimeReport) -> Vec<&str> {
    report.loaded.iter().map(String::as_str).collect()
}

// ── Start ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn one_failing_plugin_does_not_abort_the_batch() {
    let h = with_specs(|d| vec![ok_spec("x", d), throwing_spec("y"), ok_spec("z", d)]).build();

    let report = h.host.start(None).await.unwrap();

    assert_eq!(loaded(&report), vec!["gateway-adapter", "ping-pong", "x", "z"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].module, "y");
    assert!(report.failed[0].error.contains("cannot find module"));
    assert_eq!(h.host.phase(), HostPhase::Running);
    assert!(h.host.context_active());
    assert_eq!(h.calls.started.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn mixed_enabled_disabled_and_failing_specs() {
    let h = with_specs(|d| vec![throwing_spec("a"), disabled_spec("b"), ok_spec("c", d)]).build();

    let report = h.host.start(None).await.unwrap();

    assert_eq!(loaded(&report), vec!["gateway-adapter", "ping-pong", "c"]);
    assert_eq!(report.failed, vec![FailedPlugin::new(
        "a",
        report.failed[0].error.clone()
    )]);
    assert!(!report.is_loaded("b"));
    assert!(report.failure("b").is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_starts_share_one_cycle() {
    let h = HarnessBuilder::new()
        .delay(Duration::from_millis(50))
        .build();

    let (a, b) = tokio::join!(h.host.start(None), h.host.start(None));
    let (a, b) = (a.unwrap(), b.unwrap());

    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(h.calls.created.load(Ordering::SeqCst), 1);
    assert!(Arc::ptr_eq(&a, &h.host.last_report()));
}

#[tokio::test]
async fn start_when_running_returns_existing_report() {
    let h = HarnessBuilder::new().build();
    let first = h.host.start(None).await.unwrap();
    let second = h.host.start(Some(StartOptions::with_instances([9]))).await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(h.calls.created.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn disabled_runtime_creates_no_context() {
    let h = HarnessBuilder::new()
        .settings(settings(false, Some("secret")))
        .build();

    let report = h.host.start(None).await.unwrap();

    assert_eq!(*report, RuntimeReport::disabled());
    assert_eq!(h.calls.created.load(Ordering::SeqCst), 0);
    assert!(!h.host.context_active());
    assert_eq!(h.host.phase(), HostPhase::Idle);
}

#[tokio::test]
async fn missing_token_is_reported_not_thrown() {
    let h = HarnessBuilder::new().settings(settings(true, None)).build();

    let report = h.host.start(None).await.unwrap();

    assert!(report.enabled);
    assert!(report.loaded.is_empty());
    assert_eq!(report.failed, vec![FailedPlugin::new(
        "gateway-adapter",
        "missing admin token"
    )]);
    assert_eq!(h.calls.created.load(Ordering::SeqCst), 0);
    assert!(!h.host.context_active());
    assert_eq!(h.host.phase(), HostPhase::Idle);
}

#[tokio::test]
async fn panicking_plugins_are_isolated() {
    let h = with_specs(|d| {
        let panicking_ctor: FeatureFactory =
            Arc::new(|_| -> anyhow::Result<Arc<dyn Feature>> { panic!("constructor exploded") });
        vec![
            PluginSpec::new("loader-panics", true, Value::Null, || {
                async { panic!("loader exploded") }.boxed()
            }),
            PluginSpec::from_factory("ctor-panics", true, Value::Null, panicking_ctor),
            ok_spec("fine", d),
        ]
    })
    .build();

    let report = h.host.start(None).await.unwrap();

    assert_eq!(loaded(&report), vec!["gateway-adapter", "ping-pong", "fine"]);
    let failed: Vec<_> = report.failed.iter().map(|f| f.module.as_str()).collect();
    assert_eq!(failed, vec!["loader-panics", "ctor-panics"]);
    assert!(report.failed[0].error.contains("loader exploded"));
    assert!(report.failed[1].error.contains("constructor exploded"));
    assert_eq!(h.host.phase(), HostPhase::Running);
}

#[tokio::test]
async fn duplicate_names_fail_without_constructing() {
    let built = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&built);
    let counting: FeatureFactory = Arc::new(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(Tracked {
            destroyed: Arc::new(AtomicUsize::new(0)),
        }) as Arc<dyn Feature>)
    });
    let specs = vec![
        PluginSpec::from_factory("ping-pong", true, Value::Null, Arc::clone(&counting)),
        PluginSpec::from_factory("dup", true, Value::Null, Arc::clone(&counting)),
        PluginSpec::from_factory("dup", true, Value::Null, counting),
    ];
    let h = HarnessBuilder::new()
        .loader(Arc::new(StaticSpecLoader::new(specs)))
        .build();

    let report = h.host.start(None).await.unwrap();

    assert_eq!(loaded(&report), vec!["gateway-adapter", "ping-pong", "dup"]);
    let failed: Vec<_> = report.failed.iter().map(|f| f.module.as_str()).collect();
    assert_eq!(failed, vec!["ping-pong", "dup"]);
    assert_eq!(built.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn spec_loader_failure_is_recorded() {
    let h = HarnessBuilder::new().loader(Arc::new(FailingLoader)).build();

    let report = h.host.start(None).await.unwrap();

    assert_eq!(loaded(&report), vec!["gateway-adapter", "ping-pong"]);
    assert_eq!(report.failed[0].module, PLUGIN_SPECS_MODULE);
    assert!(report.failed[0].error.contains("inventory unreadable"));
    assert!(h.host.context_active());
}

#[tokio::test]
async fn panicking_spec_loader_is_recorded() {
    let h = HarnessBuilder::new().loader(Arc::new(PanickingLoader)).build();

    let report = h.host.start(None).await.unwrap();

    assert_eq!(loaded(&report), vec!["gateway-adapter", "ping-pong"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].module, PLUGIN_SPECS_MODULE);
    assert!(report.failed[0].error.contains("loader exploded"));
    assert_eq!(h.host.phase(), HostPhase::Running);
}

#[tokio::test]
async fn debug_sessions_add_session_logger() {
    let mut s = settings(true, Some("secret"));
    s.runtime.debug_sessions = true;
    let h = HarnessBuilder::new().settings(s).build();

    let report = h.host.start(None).await.unwrap();
    assert_eq!(loaded(&report), vec![
        "gateway-adapter",
        "ping-pong",
        "session-logger"
    ]);
}

#[tokio::test]
async fn activation_failure_leaves_host_idle() {
    let h = with_specs(|d| vec![ok_spec("x", d)]).fail_start().build();
    let before = h.host.last_report();

    let err = h.host.start(None).await.unwrap_err();

    assert!(matches!(err, Error::Activation { .. }));
    assert!(err.to_string().contains("gateway refused connection"));
    assert!(!h.host.context_active());
    assert_eq!(h.host.phase(), HostPhase::Idle);
    assert!(Arc::ptr_eq(&before, &h.host.last_report()));
    // Features registered for the failed cycle were torn down.
    assert_eq!(h.destroyed.load(Ordering::SeqCst), 1);
    assert_eq!(h.calls.stopped.load(Ordering::SeqCst), 1);
}

// ── Stop / reload ───────────────────────────────────────────────────────────

#[tokio::test]
async fn stop_without_context_is_a_no_op() {
    let h = HarnessBuilder::new().build();
    let before = h.host.last_report();

    h.host.stop().await;

    assert_eq!(h.host.phase(), HostPhase::Idle);
    assert_eq!(h.calls.stopped.load(Ordering::SeqCst), 0);
    assert!(Arc::ptr_eq(&before, &h.host.last_report()));
}

#[tokio::test]
async fn stop_destroys_features_and_context() {
    let h = with_specs(|d| vec![ok_spec("x", d), ok_spec("y", d)]).build();
    h.host.start(None).await.unwrap();

    h.host.stop().await;

    assert_eq!(h.destroyed.load(Ordering::SeqCst), 2);
    assert_eq!(h.calls.stopped.load(Ordering::SeqCst), 1);
    assert!(!h.host.context_active());
    assert_eq!(h.host.phase(), HostPhase::Idle);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_waits_for_in_flight_start() {
    let h = HarnessBuilder::new()
        .delay(Duration::from_millis(50))
        .build();

    let host = h.host.clone();
    let start = tokio::spawn(async move { host.start(None).await });
    tokio::time::sleep(Duration::from_millis(10)).await;
    h.host.stop().await;

    assert!(start.await.unwrap().is_ok());
    assert_eq!(h.calls.created.load(Ordering::SeqCst), 1);
    assert_eq!(h.calls.started.load(Ordering::SeqCst), 1);
    assert_eq!(h.calls.stopped.load(Ordering::SeqCst), 1);
    assert!(!h.host.context_active());
}

#[tokio::test]
async fn reload_without_prior_start_matches_fresh_start() {
    let fresh = HarnessBuilder::new().build();
    let reloaded = HarnessBuilder::new().build();

    let a = fresh.host.start(None).await.unwrap();
    let b = reloaded.host.reload(None).await.unwrap();

    assert_eq!(*a, *b);
    assert_eq!(reloaded.calls.stopped.load(Ordering::SeqCst), 0);
    assert!(reloaded.host.context_active());
}

#[tokio::test]
async fn reload_reuses_previous_options() {
    let h = HarnessBuilder::new().build();

    let first = h
        .host
        .start(Some(StartOptions::with_instances([3, 3, 4])))
        .await
        .unwrap();
    assert_eq!(first.instances, Some(vec![3, 4]));

    let second = h.host.reload(None).await.unwrap();
    assert_eq!(second.instances, Some(vec![3, 4]));
    assert!(!Arc::ptr_eq(&first, &second));

    let third = h
        .host
        .reload(Some(StartOptions::with_instances([7])))
        .await
        .unwrap();
    assert_eq!(third.instances, Some(vec![7]));
    assert_eq!(*h.calls.instances.lock().unwrap(), vec![7]);

    assert_eq!(h.calls.created.load(Ordering::SeqCst), 3);
    assert_eq!(h.calls.stopped.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn reload_picks_up_new_settings() {
    let source = Arc::new(StaticSettings::new(settings(true, Some("secret"))));
    let host = RuntimeHost::builder(source.clone())
        .context_factory(Arc::new(MockFactory {
            calls: Arc::new(CallCounts::default()),
            fail_start: false,
            delay: Duration::ZERO,
        }))
        .build();

    assert!(host.start(None).await.unwrap().enabled);
    source.set(settings(false, Some("secret")));

    let report = host.reload(None).await.unwrap();
    assert!(!report.enabled);
    assert!(!host.context_active());
}

#[tokio::test]
async fn report_subscribers_see_completed_cycles() {
    let h = HarnessBuilder::new().build();
    let mut reports = h.host.subscribe_reports();
    assert!(!reports.borrow_and_update().enabled);

    h.host.start(None).await.unwrap();

    reports.changed().await.unwrap();
    assert!(reports.borrow().enabled);
}

#[tokio::test]
async fn bridge_context_announces_instance_status() {
    let source = Arc::new(StaticSettings::new(settings(true, Some("secret"))));
    let host = RuntimeHost::builder(source).build();
    let mut events = host.events().subscribe();

    host.start(None).await.unwrap();
    host.stop().await;

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let BridgeEvent::InstanceStatus(status) = event {
            assert_eq!(status.instance_id, 0);
            seen.push(status.status);
        }
    }
    assert_eq!(seen, vec![
        InstanceStatus::Starting,
        InstanceStatus::Running,
        InstanceStatus::Stopping,
        InstanceStatus::Stopped,
    ]);
}

#[tokio::test]
async fn plugin_cannot_take_the_adapter_name() {
    let h = with_specs(|d| vec![ok_spec("gateway-adapter", d), ok_spec("x", d)]).build();

    let report = h.host.start(None).await.unwrap();

    assert_eq!(loaded(&report), vec!["gateway-adapter", "ping-pong", "x"]);
    assert_eq!(report.failed, vec![FailedPlugin::new(
        "gateway-adapter",
        "a feature with this name is already registered"
    )]);
    assert!(!h.host.feature_status().contains_key("gateway-adapter"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn joined_start_options_carry_into_reload() {
    let h = HarnessBuilder::new()
        .delay(Duration::from_millis(50))
        .build();

    let (a, b) = tokio::join!(
        h.host.start(Some(StartOptions::with_instances([1]))),
        h.host.start(Some(StartOptions::with_instances([7]))),
    );
    let (a, b) = (a.unwrap(), b.unwrap());
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(a.instances, Some(vec![1]));
    assert_eq!(h.calls.created.load(Ordering::SeqCst), 1);

    let reloaded = h.host.reload(None).await.unwrap();
    assert_eq!(reloaded.instances, Some(vec![7]));
}

// ── Features ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn feature_status_follows_the_registry() {
    let h = with_specs(|d| vec![ok_spec("forward", d), ok_spec("greeter", d)]).build();
    assert!(h.host.feature_status().is_empty());
    let mut updates = h.host.subscribe_features();

    h.host.start(None).await.unwrap();

    assert!(updates.has_changed().unwrap());
    let status = updates.borrow_and_update().clone();
    assert_eq!(status, h.host.feature_status());
    assert_eq!(status.keys().map(String::as_str).collect::<Vec<_>>(), vec![
        "forward",
        "greeter",
        "ping-pong"
    ]);
    assert!(status.values().all(|present| *present));

    assert!(h.host.feature(BuiltinSlot::Forward).await.is_some());
    assert!(h.host.feature(BuiltinSlot::Media).await.is_none());

    assert!(h.host.disable_feature("greeter").await);
    assert!(h.host.feature_status().contains_key("greeter"));
    assert!(h.host.enable_feature("greeter").await);
    assert!(!h.host.enable_feature("missing").await);
    assert!(!h.host.disable_feature("missing").await);

    h.host.stop().await;
    assert!(h.host.feature_status().is_empty());
    assert!(h.host.feature(BuiltinSlot::Forward).await.is_none());
}

// ── Single plugin reload ────────────────────────────────────────────────────

fn swappable() -> (HarnessBuilder, Arc<SwappableLoader>) {
    let loader = Arc::new(SwappableLoader::default());
    let builder = HarnessBuilder::new().loader(loader.clone());
    (builder, loader)
}

#[tokio::test]
async fn reload_plugin_replaces_only_that_feature() {
    let (builder, loader) = swappable();
    let h = builder.build();
    loader.set(vec![ok_spec("greeter", &h.destroyed), ok_spec("other", &h.destroyed)]);
    let report = h.host.start(None).await.unwrap();

    let result = h.host.reload_plugin("greeter").await.unwrap();

    assert_eq!(result, PluginReload::loaded("greeter"));
    assert_eq!(h.destroyed.load(Ordering::SeqCst), 1);
    assert_eq!(h.calls.created.load(Ordering::SeqCst), 1);
    assert_eq!(h.calls.stopped.load(Ordering::SeqCst), 0);
    assert!(h.host.feature_status().contains_key("greeter"));
    assert!(h.host.feature_status().contains_key("other"));
    assert!(Arc::ptr_eq(&report, &h.host.last_report()));
    assert_eq!(h.host.phase(), HostPhase::Running);
}

#[tokio::test]
async fn reload_plugin_reports_a_failed_load() {
    let (builder, loader) = swappable();
    let h = builder.build();
    loader.set(vec![ok_spec("greeter", &h.destroyed), ok_spec("other", &h.destroyed)]);
    h.host.start(None).await.unwrap();

    loader.set(vec![throwing_spec("greeter"), ok_spec("other", &h.destroyed)]);
    let result = h.host.reload_plugin("greeter").await.unwrap();

    assert!(!result.loaded);
    assert!(result.error.unwrap().contains("cannot find module"));
    assert_eq!(h.destroyed.load(Ordering::SeqCst), 1);
    assert!(!h.host.feature_status().contains_key("greeter"));
    assert!(h.host.feature_status().contains_key("other"));
    assert!(h.host.context_active());

    // The name is free again once the spec loads.
    loader.set(vec![ok_spec("greeter", &h.destroyed)]);
    let result = h.host.reload_plugin("greeter").await.unwrap();
    assert_eq!(result, PluginReload::loaded("greeter"));
}

#[tokio::test]
async fn reload_plugin_tears_down_a_disabled_plugin() {
    let (builder, loader) = swappable();
    let h = builder.build();
    loader.set(vec![ok_spec("greeter", &h.destroyed)]);
    h.host.start(None).await.unwrap();

    loader.set(vec![disabled_spec("greeter")]);
    let result = h.host.reload_plugin("greeter").await.unwrap();

    assert_eq!(result, PluginReload::disabled("greeter"));
    assert_eq!(h.destroyed.load(Ordering::SeqCst), 1);
    assert!(!h.host.feature_status().contains_key("greeter"));
}

#[tokio::test]
async fn reload_plugin_rejects_unknown_and_builtin_names() {
    let (builder, loader) = swappable();
    let h = builder.build();
    loader.set(vec![ok_spec("greeter", &h.destroyed)]);
    h.host.start(None).await.unwrap();

    let err = h.host.reload_plugin("nope").await.unwrap_err();
    assert!(matches!(err, Error::UnknownPlugin { ref module } if module == "nope"));

    for name in ["ping-pong", "gateway-adapter"] {
        let err = h.host.reload_plugin(name).await.unwrap_err();
        assert!(matches!(err, Error::BuiltinFeature { .. }), "{name}: {err}");
    }

    assert_eq!(h.destroyed.load(Ordering::SeqCst), 0);
    assert!(h.host.feature_status().contains_key("greeter"));
}

#[tokio::test]
async fn reload_plugin_needs_a_running_runtime() {
    let (builder, loader) = swappable();
    let h = builder.build();
    loader.set(vec![ok_spec("greeter", &h.destroyed)]);

    let err = h.host.reload_plugin("greeter").await.unwrap_err();

    assert!(matches!(err, Error::NotRunning));
    assert!(!h.host.context_active());
    assert_eq!(h.calls.created.load(Ordering::SeqCst), 0);
}
