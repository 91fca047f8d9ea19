//! Runtime host: owns the bridge context and the features around it.
//!
//! Start, stop, reload and single-plugin reload run one at a time. Each
//! request is executed on its own task and published in a single in-flight
//! slot; a concurrent request of the same kind joins that task's outcome
//! instead of queueing a second attempt, while any other request waits for
//! it to finish first.

use std::{
    any::Any,
    collections::BTreeMap,
    panic::AssertUnwindSafe,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use {
    ferrygram_plugins::{
        BuiltinPlugin, BuiltinSlot, EventPublisher, Feature, FeatureRegistry, PluginSetup,
        PluginSpec, PluginSpecLoader, StaticSpecLoader, bundled,
    },
    futures::{
        FutureExt,
        future::{BoxFuture, Shared},
    },
    serde_json::Value,
    tokio::sync::watch,
    tracing::{debug, error, info, warn},
};

use crate::{
    context::{BridgeContextFactory, ContextFactory, ContextSettings, RuntimeContext},
    error::{Error, Result},
    report::{FailedPlugin, HostPhase, PluginReload, RuntimeReport, StartOptions},
    settings::SettingsSource,
};

/// Failure entry name used when the spec loader itself fails.
pub const PLUGIN_SPECS_MODULE: &str = "plugin-specs";

const MISSING_TOKEN: &str = "missing admin token";
const NAME_TAKEN: &str = "a feature with this name is already registered";

/// Presence map of registered features.
pub type FeatureStatus = BTreeMap<String, bool>;

#[derive(Clone)]
enum Done {
    Report(Arc<RuntimeReport>),
    Plugin(PluginReload),
}

type Outcome = Result<Done>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Start,
    Stop,
    Reload,
    ReloadPlugin,
}

impl Op {
    /// Whether a new request of kind `self` may share the outcome of an
    /// in-flight `other`.
    fn joins(self, other: Op) -> bool {
        matches!(
            (self, other),
            (Op::Start, Op::Start) | (Op::Start, Op::Reload) | (Op::Stop, Op::Stop)
        )
    }
}

/// What a caller asked for.
#[derive(Debug, Clone)]
enum Request {
    Start(Option<StartOptions>),
    Stop,
    Reload(Option<StartOptions>),
    ReloadPlugin(String),
}

impl Request {
    fn op(&self) -> Op {
        match self {
            Self::Start(_) => Op::Start,
            Self::Stop => Op::Stop,
            Self::Reload(_) => Op::Reload,
            Self::ReloadPlugin(_) => Op::ReloadPlugin,
        }
    }
}

/// A request with its start options resolved, ready to execute.
#[derive(Debug)]
enum Job {
    Start(StartOptions),
    Stop,
    Reload(StartOptions),
    ReloadPlugin(String),
}

struct InFlight {
    op: Op,
    id: u64,
    outcome: Shared<BoxFuture<'static, Outcome>>,
}

#[derive(Default)]
struct Lifecycle {
    context: Option<Box<dyn RuntimeContext>>,
    registry: FeatureRegistry,
    /// Instances the running context serves.
    instances: Vec<i64>,
}

struct Inner {
    settings: Arc<dyn SettingsSource>,
    factory: Arc<dyn ContextFactory>,
    specs: Arc<dyn PluginSpecLoader>,
    builtins: Vec<BuiltinPlugin>,
    events: EventPublisher,
    lifecycle: tokio::sync::Mutex<Lifecycle>,
    slot: Mutex<Option<InFlight>>,
    /// Options of the newest start or reload request, reused by a bare
    /// reload. Written under the slot lock so call order wins.
    last_options: Mutex<Option<StartOptions>>,
    next_id: AtomicU64,
    active: AtomicBool,
    phase: watch::Sender<HostPhase>,
    report: watch::Sender<Arc<RuntimeReport>>,
    features: watch::Sender<FeatureStatus>,
}

/// Handle to the plugin runtime. Cheap to clone; all clones drive the same
/// lifecycle.
#[derive(Clone)]
pub struct RuntimeHost {
    inner: Arc<Inner>,
}

pub struct RuntimeHostBuilder {
    settings: Arc<dyn SettingsSource>,
    factory: Option<Arc<dyn ContextFactory>>,
    specs: Option<Arc<dyn PluginSpecLoader>>,
    builtins: Option<Vec<BuiltinPlugin>>,
    events: Option<EventPublisher>,
}

impl RuntimeHostBuilder {
    pub fn context_factory(mut self, factory: Arc<dyn ContextFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    pub fn spec_loader(mut self, specs: Arc<dyn PluginSpecLoader>) -> Self {
        self.specs = Some(specs);
        self
    }

    /// Replace the bundled built-ins.
    pub fn builtins(mut self, builtins: Vec<BuiltinPlugin>) -> Self {
        self.builtins = Some(builtins);
        self
    }

    pub fn events(mut self, events: EventPublisher) -> Self {
        self.events = Some(events);
        self
    }

    pub fn build(self) -> RuntimeHost {
        let (phase, _) = watch::channel(HostPhase::Idle);
        let (report, _) = watch::channel(Arc::new(RuntimeReport::disabled()));
        let (features, _) = watch::channel(FeatureStatus::new());
        RuntimeHost {
            inner: Arc::new(Inner {
                settings: self.settings,
                factory: self
                    .factory
                    .unwrap_or_else(|| Arc::new(BridgeContextFactory)),
                specs: self
                    .specs
                    .unwrap_or_else(|| Arc::new(StaticSpecLoader::default())),
                builtins: self.builtins.unwrap_or_else(bundled::builtins),
                events: self.events.unwrap_or_default(),
                lifecycle: tokio::sync::Mutex::new(Lifecycle::default()),
                slot: Mutex::new(None),
                last_options: Mutex::new(None),
                next_id: AtomicU64::new(1),
                active: AtomicBool::new(false),
                phase,
                report,
                features,
            }),
        }
    }
}

impl RuntimeHost {
    pub fn builder(settings: Arc<dyn SettingsSource>) -> RuntimeHostBuilder {
        RuntimeHostBuilder {
            settings,
            factory: None,
            specs: None,
            builtins: None,
            events: None,
        }
    }

    /// Bring the runtime up. Returns the existing report if it is already
    /// running.
    pub async fn start(&self, options: Option<StartOptions>) -> Result<Arc<RuntimeReport>> {
        let done = self.run(Request::Start(options)).await?;
        Ok(self.inner.report_of(done))
    }

    /// Tear the runtime down. Never fails; teardown problems are logged.
    pub async fn stop(&self) {
        if let Err(e) = self.run(Request::Stop).await {
            error!(error = %e, "plugin runtime stop did not complete");
        }
    }

    /// Stop, then start with `options` or the options of the newest start.
    pub async fn reload(&self, options: Option<StartOptions>) -> Result<Arc<RuntimeReport>> {
        let done = self.run(Request::Reload(options)).await?;
        Ok(self.inner.report_of(done))
    }

    /// Tear down one plugin and bring it back from a fresh spec, leaving the
    /// context and every other feature running.
    ///
    /// A plugin that fails to come back is reported in the result rather
    /// than as an error. The last report is left as it is; the feature
    /// status reflects the change.
    pub async fn reload_plugin(&self, module: &str) -> Result<PluginReload> {
        match self.run(Request::ReloadPlugin(module.to_string())).await? {
            Done::Plugin(result) => Ok(result),
            // Plugin reloads never join another operation.
            Done::Report(_) => Err(Error::aborted("plugin reload was superseded")),
        }
    }

    /// Most recent completed report. Never waits on a lifecycle operation.
    pub fn last_report(&self) -> Arc<RuntimeReport> {
        self.inner.last_report()
    }

    pub fn phase(&self) -> HostPhase {
        *self.inner.phase.borrow()
    }

    /// Whether a bridge context currently exists.
    pub fn context_active(&self) -> bool {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Stream of completed reports, starting with the current one.
    pub fn subscribe_reports(&self) -> watch::Receiver<Arc<RuntimeReport>> {
        self.inner.report.subscribe()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<HostPhase> {
        self.inner.phase.subscribe()
    }

    pub fn events(&self) -> &EventPublisher {
        &self.inner.events
    }

    /// Registered features, each mapped to `true`. Never waits on a
    /// lifecycle operation.
    pub fn feature_status(&self) -> FeatureStatus {
        self.inner.features.borrow().clone()
    }

    /// Stream of feature status snapshots, updated whenever features are
    /// registered or destroyed.
    pub fn subscribe_features(&self) -> watch::Receiver<FeatureStatus> {
        self.inner.features.subscribe()
    }

    /// Returns `false` when no feature is registered under `name`.
    pub async fn enable_feature(&self, name: &str) -> bool {
        self.inner.lifecycle.lock().await.registry.enable(name)
    }

    /// Returns `false` when no feature is registered under `name`. The
    /// feature stays registered.
    pub async fn disable_feature(&self, name: &str) -> bool {
        self.inner.lifecycle.lock().await.registry.disable(name)
    }

    /// The feature filling a built-in slot, if the running cycle has one.
    pub async fn feature(&self, slot: BuiltinSlot) -> Option<Arc<dyn Feature>> {
        self.inner.lifecycle.lock().await.registry.slot(slot).cloned()
    }

    async fn run(&self, request: Request) -> Outcome {
        let op = request.op();
        loop {
            let (outcome, joined) = {
                let mut slot = self.inner.slot.lock().unwrap_or_else(|e| e.into_inner());
                match slot.as_ref() {
                    Some(in_flight) => {
                        let joined = op.joins(in_flight.op);
                        if joined {
                            self.inner.prepare(&request);
                        }
                        (in_flight.outcome.clone(), joined)
                    },
                    None => {
                        let job = self.inner.prepare(&request);
                        let in_flight = self.spawn(op, job);
                        let outcome = in_flight.outcome.clone();
                        *slot = Some(in_flight);
                        (outcome, true)
                    },
                }
            };

            if joined {
                return outcome.await;
            }
            debug!(?op, "waiting for in-flight runtime operation");
            let _ = outcome.await;
        }
    }

    /// Must be called with the slot lock held so the task can't clear the
    /// slot before it has been filled.
    fn spawn(&self, op: Op, job: Job) -> InFlight {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let inner = Arc::clone(&self.inner);

        let task = tokio::spawn(async move {
            let executed = AssertUnwindSafe(inner.execute(job)).catch_unwind().await;
            let outcome = match executed {
                Ok(outcome) => outcome,
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    error!(?op, %message, "runtime operation panicked");
                    inner.recover().await;
                    Err(Error::aborted(message))
                },
            };

            let mut slot = inner.slot.lock().unwrap_or_else(|e| e.into_inner());
            if slot.as_ref().is_some_and(|f| f.id == id) {
                *slot = None;
            }
            outcome
        });

        let outcome = async move {
            task.await
                .unwrap_or_else(|e| Err(Error::aborted(e.to_string())))
        }
        .boxed()
        .shared();

        InFlight { op, id, outcome }
    }
}

impl Inner {
    fn last_report(&self) -> Arc<RuntimeReport> {
        Arc::clone(&self.report.borrow())
    }

    fn set_phase(&self, phase: HostPhase) {
        let previous = self.phase.send_replace(phase);
        if previous != phase {
            debug!(from = %previous, to = %phase, "runtime phase changed");
        }
    }

    fn publish_report(&self, report: Arc<RuntimeReport>) {
        self.report.send_replace(report);
    }

    fn publish_features(&self, registry: &FeatureRegistry) {
        self.features.send_replace(registry.status());
    }

    fn report_of(&self, done: Done) -> Arc<RuntimeReport> {
        match done {
            Done::Report(report) => report,
            Done::Plugin(_) => self.last_report(),
        }
    }

    /// Resolve start options and remember them for the next bare reload.
    /// Runs under the slot lock, for joiners too.
    fn prepare(&self, request: &Request) -> Job {
        let mut last = self.last_options.lock().unwrap_or_else(|e| e.into_inner());
        match request {
            Request::Start(options) => {
                let options = options.clone().unwrap_or_default();
                *last = Some(options.clone());
                Job::Start(options)
            },
            Request::Reload(options) => {
                let options = options
                    .clone()
                    .or_else(|| last.clone())
                    .unwrap_or_default();
                *last = Some(options.clone());
                Job::Reload(options)
            },
            Request::Stop => Job::Stop,
            Request::ReloadPlugin(module) => Job::ReloadPlugin(module.clone()),
        }
    }

    /// Re-derive the phase after a panic unwound through a lifecycle step.
    /// Features left behind by a start that never produced a context are
    /// destroyed.
    async fn recover(&self) {
        let mut lc = self.lifecycle.lock().await;
        if lc.context.is_none() {
            lc.registry.destroy().await;
        }
        self.publish_features(&lc.registry);
        let running = lc.context.is_some();
        self.active.store(running, Ordering::SeqCst);
        self.set_phase(if running {
            HostPhase::Running
        } else {
            HostPhase::Idle
        });
    }

    async fn execute(&self, job: Job) -> Outcome {
        let mut lifecycle = self.lifecycle.lock().await;
        match job {
            Job::Start(options) => {
                self.start_locked(&mut lifecycle, options)
                    .await
                    .map(Done::Report)
            },
            Job::Stop => {
                self.stop_locked(&mut lifecycle).await;
                Ok(Done::Report(self.last_report()))
            },
            Job::Reload(options) => {
                info!(instances = ?options.instances, "reloading plugin runtime");
                self.stop_locked(&mut lifecycle).await;
                self.start_locked(&mut lifecycle, options)
                    .await
                    .map(Done::Report)
            },
            Job::ReloadPlugin(module) => {
                self.reload_plugin_locked(&mut lifecycle, &module)
                    .await
                    .map(Done::Plugin)
            },
        }
    }

    async fn start_locked(
        &self,
        lc: &mut Lifecycle,
        options: StartOptions,
    ) -> Result<Arc<RuntimeReport>> {
        if lc.context.is_some() {
            debug!("plugin runtime already running");
            return Ok(self.last_report());
        }

        self.set_phase(HostPhase::Starting);
        let settings = self.settings.current().await;

        if !settings.runtime.enabled {
            info!("plugin runtime disabled by configuration");
            return Ok(self.finish_idle(RuntimeReport::disabled()));
        }

        let instances = settings.resolve_instances(&options.instances);
        let mut report =
            RuntimeReport::enabled(settings.runtime.endpoint.clone(), instances.clone());

        let Some(token) = settings.token() else {
            warn!("plugin runtime not started: no admin token configured");
            report
                .failed
                .push(FailedPlugin::new(self.factory.module(), MISSING_TOKEN));
            return Ok(self.finish_idle(report));
        };

        let context_settings = ContextSettings {
            endpoint: settings.runtime.endpoint.clone(),
            token,
            instances: instances.clone(),
            self_id: settings.runtime.self_id.clone(),
        };
        let created = AssertUnwindSafe(self.factory.create(&context_settings, &self.events))
            .catch_unwind()
            .await;
        let mut context = match created {
            Ok(Ok(context)) => context,
            Ok(Err(e)) => {
                error!(error = %format!("{e:#}"), "failed to create runtime context");
                self.set_phase(HostPhase::Idle);
                return Err(Error::construction(e));
            },
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(%message, "runtime context construction panicked");
                self.set_phase(HostPhase::Idle);
                return Err(Error::construction(anyhow::anyhow!(message)));
            },
        };
        report.loaded.push(self.factory.module().to_string());

        for builtin in &self.builtins {
            if builtin.debug_only && !settings.runtime.debug_sessions {
                continue;
            }
            let feature = (builtin.build)(self.setup(builtin.name, Value::Null, &instances));
            if !lc.registry.register(builtin.name, feature) {
                warn!(feature = builtin.name, "built-in registered twice");
            }
            report.loaded.push(builtin.name.to_string());
        }

        let specs = self.load_specs().await.unwrap_or_else(|message| {
            error!(error = %message, "failed to load plugin specs");
            report
                .failed
                .push(FailedPlugin::new(PLUGIN_SPECS_MODULE, message));
            Vec::new()
        });

        for spec in specs {
            if !spec.enabled {
                debug!(module = %spec.module, "plugin disabled, skipping");
                continue;
            }
            if spec.module == self.factory.module() || lc.registry.contains(&spec.module) {
                warn!(module = %spec.module, "plugin name already in use");
                report
                    .failed
                    .push(FailedPlugin::new(spec.module, NAME_TAKEN));
                continue;
            }

            let plugin_setup = self.setup(&spec.module, spec.config.clone(), &instances);
            let loaded = load_plugin(&spec, plugin_setup).await;
            match loaded {
                Ok(feature) => {
                    lc.registry.register(&spec.module, feature);
                    info!(module = %spec.module, "plugin loaded");
                    report.loaded.push(spec.module);
                },
                Err(message) => {
                    error!(module = %spec.module, error = %message, "plugin failed to load");
                    report.failed.push(FailedPlugin::new(spec.module, message));
                },
            }
        }

        let activated = AssertUnwindSafe(context.start()).catch_unwind().await;
        let failure = match activated {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e),
            Err(payload) => Some(anyhow::anyhow!(panic_message(payload.as_ref()))),
        };

        if let Some(e) = failure {
            error!(error = %format!("{e:#}"), "runtime context failed to activate");
            lc.registry.destroy().await;
            self.publish_features(&lc.registry);
            let stopped = AssertUnwindSafe(context.stop()).catch_unwind().await;
            if !matches!(stopped, Ok(Ok(()))) {
                warn!("runtime context cleanup after failed activation did not complete");
            }
            self.set_phase(HostPhase::Idle);
            return Err(Error::activation(e));
        }

        lc.context = Some(context);
        lc.instances = instances;
        self.active.store(true, Ordering::SeqCst);
        self.publish_features(&lc.registry);
        let report = Arc::new(report);
        self.publish_report(Arc::clone(&report));
        self.set_phase(HostPhase::Running);
        info!(
            loaded = report.loaded.len(),
            failed = report.failed.len(),
            "plugin runtime started"
        );
        Ok(report)
    }

    async fn reload_plugin_locked(&self, lc: &mut Lifecycle, module: &str) -> Result<PluginReload> {
        if lc.context.is_none() {
            return Err(Error::NotRunning);
        }
        if module == self.factory.module() || self.builtins.iter().any(|b| b.name == module) {
            return Err(Error::builtin_feature(module));
        }

        let specs = match self.load_specs().await {
            Ok(specs) => specs,
            Err(message) => {
                error!(module, error = %message, "failed to load plugin specs");
                return Ok(PluginReload::failed(module, message));
            },
        };
        let Some(spec) = specs.into_iter().find(|s| s.module == module) else {
            return Err(Error::unknown_plugin(module));
        };

        if lc.registry.remove(module).await {
            debug!(module, "plugin torn down for reload");
        }

        let result = if !spec.enabled {
            info!(module, "plugin disabled, not reloading");
            PluginReload::disabled(module)
        } else {
            let setup = self.setup(module, spec.config.clone(), &lc.instances);
            match load_plugin(&spec, setup).await {
                Ok(feature) => {
                    lc.registry.register(module, feature);
                    info!(module, "plugin reloaded");
                    PluginReload::loaded(module)
                },
                Err(message) => {
                    error!(module, error = %message, "plugin failed to reload");
                    PluginReload::failed(module, message)
                },
            }
        };
        self.publish_features(&lc.registry);
        Ok(result)
    }

    fn setup(&self, module: &str, config: Value, instances: &[i64]) -> PluginSetup {
        PluginSetup {
            module: module.to_string(),
            config,
            instances: instances.to_vec(),
            events: self.events.clone(),
        }
    }

    /// Ask the spec loader for this cycle's specs; errors and panics become
    /// a message.
    async fn load_specs(&self) -> std::result::Result<Vec<PluginSpec>, String> {
        match AssertUnwindSafe(self.specs.load()).catch_unwind().await {
            Ok(Ok(specs)) => Ok(specs),
            Ok(Err(e)) => Err(format!("{e:#}")),
            Err(payload) => Err(panic_message(payload.as_ref())),
        }
    }

    fn finish_idle(&self, report: RuntimeReport) -> Arc<RuntimeReport> {
        let report = Arc::new(report);
        self.publish_report(Arc::clone(&report));
        self.set_phase(HostPhase::Idle);
        report
    }

    async fn stop_locked(&self, lc: &mut Lifecycle) {
        let Some(mut context) = lc.context.take() else {
            debug!("plugin runtime not running, nothing to stop");
            return;
        };
        self.set_phase(HostPhase::Stopping);

        let stopped = AssertUnwindSafe(context.stop()).catch_unwind().await;
        match stopped {
            Ok(Ok(())) => {},
            Ok(Err(e)) => {
                error!(error = %format!("{e:#}"), "runtime context failed to stop cleanly");
            },
            Err(payload) => {
                error!(message = %panic_message(payload.as_ref()), "runtime context stop panicked");
            },
        }
        drop(context);

        lc.registry.destroy().await;
        lc.instances.clear();
        self.publish_features(&lc.registry);
        self.active.store(false, Ordering::SeqCst);
        self.set_phase(HostPhase::Idle);
        info!("plugin runtime stopped");
    }
}

/// Resolve and construct one plugin, turning errors and panics alike into
/// a message for the report.
async fn load_plugin(
    spec: &PluginSpec,
    setup: PluginSetup,
) -> std::result::Result<Arc<dyn Feature>, String> {
    let loaded = AssertUnwindSafe(async { spec.load().await })
        .catch_unwind()
        .await;
    let constructor = match loaded {
        Ok(Ok(constructor)) => constructor,
        Ok(Err(e)) => return Err(format!("{e:#}")),
        Err(payload) => return Err(panic_message(payload.as_ref())),
    };

    match std::panic::catch_unwind(AssertUnwindSafe(move || constructor(setup))) {
        Ok(Ok(feature)) => Ok(feature),
        Ok(Err(e)) => Err(format!("{e:#}")),
        Err(payload) => Err(panic_message(payload.as_ref())),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned());
    match detail {
        Some(detail) => format!("panicked: {detail}"),
        None => "panicked".to_string(),
    }
}
