//! Configurable modules for exercising the bootstrap in tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::bail;
use async_trait::async_trait;
use parking_lot::Mutex;

use crate::context::Context;
use crate::flags::FlagSet;
use crate::lifecycle::GracefulShutdown;
use crate::module::{
    App, Apps, CancelGracefulShutdown, Debuggable, Module, ModuleDescriptor, Provisioner,
    SystemLogger, Validator,
};

/// Shared between a test and every instance a descriptor produces.
#[derive(Debug, Default)]
pub(crate) struct Probe {
    instances: AtomicUsize,
    provisions: AtomicUsize,
    starts: AtomicUsize,
    started: AtomicUsize,
    stops: AtomicUsize,
    stopped_before_started: AtomicBool,
    debug_calls: AtomicUsize,
    seen_apps: AtomicUsize,
    stop_saw_cancelled: AtomicBool,
    port: Mutex<Option<i64>>,
    hosts: Mutex<Vec<String>>,
}

impl Probe {
    pub(crate) fn instances(&self) -> usize {
        self.instances.load(Ordering::SeqCst)
    }

    pub(crate) fn provisions(&self) -> usize {
        self.provisions.load(Ordering::SeqCst)
    }

    pub(crate) fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    /// Starts that returned, successfully or not.
    pub(crate) fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub(crate) fn stopped_before_started(&self) -> bool {
        self.stopped_before_started.load(Ordering::SeqCst)
    }

    pub(crate) fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub(crate) fn debug_calls(&self) -> usize {
        self.debug_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn seen_apps(&self) -> usize {
        self.seen_apps.load(Ordering::SeqCst)
    }

    pub(crate) fn stop_saw_cancelled(&self) -> bool {
        self.stop_saw_cancelled.load(Ordering::SeqCst)
    }

    pub(crate) fn port(&self) -> Option<i64> {
        *self.port.lock()
    }

    pub(crate) fn hosts(&self) -> Vec<String> {
        self.hosts.lock().clone()
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum StopBehavior {
    Succeed,
    Fail(&'static str),
    CancelEveryone,
    AbortToken,
    WaitForCancellation,
}

#[derive(Clone)]
pub(crate) struct TestApp {
    id: String,
    flags: FlagSet,
    probe: Arc<Probe>,
    start_delay: Duration,
    provision_delay: Duration,
    panic_on_first_provision: bool,
    start_error: Option<&'static str>,
    stop: StopBehavior,
    invalid: Option<&'static str>,
    required_flag: Option<String>,
    lookup_apps: bool,
    startup_message: Option<String>,
    debug: Option<serde_json::Value>,
}

impl TestApp {
    pub(crate) fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            flags: FlagSet::new(id),
            probe: Arc::new(Probe::default()),
            start_delay: Duration::ZERO,
            provision_delay: Duration::ZERO,
            panic_on_first_provision: false,
            start_error: None,
            stop: StopBehavior::Succeed,
            invalid: None,
            required_flag: None,
            lookup_apps: false,
            startup_message: None,
            debug: None,
        }
    }

    pub(crate) fn flags(mut self, flags: FlagSet) -> Self {
        self.flags = flags;
        self
    }

    pub(crate) fn start_delay(mut self, delay: Duration) -> Self {
        self.start_delay = delay;
        self
    }

    /// Blocks the provisioning thread.
    pub(crate) fn provision_delay(mut self, delay: Duration) -> Self {
        self.provision_delay = delay;
        self
    }

    pub(crate) fn panic_on_first_provision(mut self) -> Self {
        self.panic_on_first_provision = true;
        self
    }

    pub(crate) fn failing_start(mut self, message: &'static str) -> Self {
        self.start_error = Some(message);
        self
    }

    pub(crate) fn on_stop(mut self, behavior: StopBehavior) -> Self {
        self.stop = behavior;
        self
    }

    pub(crate) fn invalid(mut self, message: &'static str) -> Self {
        self.invalid = Some(message);
        self
    }

    pub(crate) fn require_flag(mut self, name: &str) -> Self {
        self.required_flag = Some(name.to_string());
        self
    }

    pub(crate) fn lookup_apps_during_provision(mut self) -> Self {
        self.lookup_apps = true;
        self
    }

    pub(crate) fn startup_message(mut self, message: &str) -> Self {
        self.startup_message = Some(message.to_string());
        self
    }

    pub(crate) fn debug_data(mut self, value: serde_json::Value) -> Self {
        self.debug = Some(value);
        self
    }

    pub(crate) fn probe(&self) -> Arc<Probe> {
        Arc::clone(&self.probe)
    }
}

impl Module for TestApp {
    fn descriptor(&self) -> ModuleDescriptor {
        let template = self.clone();
        ModuleDescriptor::new(self.id.clone(), move || {
            template.probe.instances.fetch_add(1, Ordering::SeqCst);
            Box::new(template.clone())
        })
        .with_flags(self.flags.clone())
    }

    fn as_provisioner(&mut self) -> Option<&mut dyn Provisioner> {
        Some(self)
    }

    fn as_validator(&self) -> Option<&dyn Validator> {
        Some(self)
    }

    fn as_app(self: Arc<Self>) -> Option<Arc<dyn App>> {
        Some(self)
    }

    fn as_debuggable(self: Arc<Self>) -> Option<Arc<dyn Debuggable>> {
        if self.debug.is_some() { Some(self) } else { None }
    }
}

impl Provisioner for TestApp {
    fn provision(&mut self, ctx: &Context) -> anyhow::Result<()> {
        let previous = self.probe.provisions.fetch_add(1, Ordering::SeqCst);
        if self.panic_on_first_provision && previous == 0 {
            panic!("provisioning {} blew up", self.id);
        }
        if !self.provision_delay.is_zero() {
            std::thread::sleep(self.provision_delay);
        }
        if self.flags.get("my-port").is_some() {
            *self.probe.port.lock() = Some(ctx.flags().must_int("my-port")?);
        }
        if self.flags.get("allowed-hosts").is_some() {
            *self.probe.hosts.lock() = ctx.flags().must_string_list("allowed-hosts")?;
        }
        if let Some(name) = &self.required_flag {
            ctx.flags().must_bool(name)?;
        }
        if self.lookup_apps {
            let apps = ctx.modules::<Apps>()?;
            self.probe.seen_apps.store(apps.len(), Ordering::SeqCst);
        }
        Ok(())
    }
}

impl Validator for TestApp {
    fn validate(&self) -> anyhow::Result<()> {
        match self.invalid {
            Some(message) => bail!(message),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl App for TestApp {
    async fn start(&self) -> anyhow::Result<()> {
        self.probe.starts.fetch_add(1, Ordering::SeqCst);
        if !self.start_delay.is_zero() {
            tokio::time::sleep(self.start_delay).await;
        }
        self.probe.started.fetch_add(1, Ordering::SeqCst);
        match self.start_error {
            Some(message) => bail!(message),
            None => Ok(()),
        }
    }

    async fn stop(&self, shutdown: GracefulShutdown) -> anyhow::Result<()> {
        self.probe.stops.fetch_add(1, Ordering::SeqCst);
        if self.probe.started() == 0 {
            self.probe.stopped_before_started.store(true, Ordering::SeqCst);
        }
        self.probe
            .stop_saw_cancelled
            .store(shutdown.is_cancelled(), Ordering::SeqCst);
        match self.stop {
            StopBehavior::Succeed => Ok(()),
            StopBehavior::Fail(message) => bail!(message),
            StopBehavior::CancelEveryone => Err(CancelGracefulShutdown.into()),
            StopBehavior::AbortToken => {
                shutdown.abort();
                Ok(())
            }
            StopBehavior::WaitForCancellation => {
                shutdown.cancelled().await;
                Ok(())
            }
        }
    }

    fn startup_message(&self) -> Option<String> {
        self.startup_message.clone()
    }
}

impl Debuggable for TestApp {
    fn debug(&self) -> serde_json::Value {
        self.probe.debug_calls.fetch_add(1, Ordering::SeqCst);
        self.debug.clone().unwrap_or_default()
    }
}

#[derive(Clone)]
pub(crate) struct TestLogger {
    id: String,
    messages: Vec<String>,
}

impl TestLogger {
    pub(crate) fn new(id: &str, messages: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            messages: messages.iter().map(|m| m.to_string()).collect(),
        }
    }
}

impl Module for TestLogger {
    fn descriptor(&self) -> ModuleDescriptor {
        let template = self.clone();
        ModuleDescriptor::new(self.id.clone(), move || Box::new(template.clone()))
    }

    fn as_system_logger(self: Arc<Self>) -> Option<Arc<dyn SystemLogger>> {
        Some(self)
    }
}

impl SystemLogger for TestLogger {
    fn system_messages(&self) -> Vec<String> {
        self.messages.clone()
    }
}
