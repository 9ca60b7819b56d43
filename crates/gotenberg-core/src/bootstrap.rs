//! The process entry: banner, flags, instantiation, start, wait, shutdown.

use std::ffi::OsString;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::banner::{banner, modules_line};
use crate::console::{Console, StdoutConsole};
use crate::context::Context;
use crate::debug::DebugData;
use crate::error::BootstrapError;
use crate::flags::{BUILD_DEBUG_DATA, Environment, FlagBinder, GRACEFUL_SHUTDOWN_DURATION};
use crate::lifecycle::{LifecycleRecord, Orchestrator};
use crate::module::{Apps, Module, SystemLoggers};
use crate::registry::Registry;
use crate::signals::{OsSignals, Signal, SignalSource};

pub const DEFAULT_VERSION: &str = "snapshot";

/// What a clean run ended with.
#[derive(Debug, Clone, Serialize)]
pub struct ShutdownReport {
    pub signal: Signal,
    /// The deadline was cancelled before it elapsed.
    pub forced: bool,
    pub records: Vec<LifecycleRecord>,
    pub debug: Option<DebugData>,
}

/// Configures and runs one process lifetime.
///
/// # Example
/// ```ignore
/// let mut registry = Registry::new();
/// registry.register_module(&Api::default())?;
///
/// let code = Bootstrap::new(registry).version("8.0.0").execute().await;
/// std::process::exit(code);
/// ```
///
/// Every outside dependency defaults to the real process (argv, environment,
/// stdout, OS signals) and can be replaced, which is how the scenarios in the
/// tests below run in-process.
pub struct Bootstrap {
    registry: Registry,
    args: Vec<OsString>,
    env: Environment,
    console: Arc<dyn Console>,
    version: String,
    signals: Option<Box<dyn SignalSource>>,
}

impl Bootstrap {
    pub fn new(registry: Registry) -> Self {
        Self {
            registry,
            args: std::env::args_os().skip(1).collect(),
            env: Environment::Process,
            console: Arc::new(StdoutConsole),
            version: DEFAULT_VERSION.to_string(),
            signals: None,
        }
    }

    /// Command-line arguments, program name excluded.
    pub fn args<I, T>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn env(mut self, env: Environment) -> Self {
        self.env = env;
        self
    }

    pub fn console(mut self, console: Arc<dyn Console>) -> Self {
        self.console = console;
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Replaces the OS signal handlers.
    pub fn signals(mut self, signals: impl SignalSource + 'static) -> Self {
        self.signals = Some(Box::new(signals));
        self
    }

    /// Runs to completion, reports any failure on the console and returns
    /// the process exit code.
    pub async fn execute(self) -> i32 {
        let console = Arc::clone(&self.console);
        match self.run().await {
            Ok(report) => {
                debug!(signal = %report.signal, forced = report.forced, "clean shutdown");
                0
            }
            Err(err) => {
                console.print_line(err.report().trim_end());
                err.exit_code()
            }
        }
    }

    pub async fn run(self) -> Result<ShutdownReport, BootstrapError> {
        let Bootstrap {
            registry,
            args,
            env,
            console,
            version,
            signals,
        } = self;

        console.print_line(&banner(&version));
        console.print_line(&modules_line(registry.ids()));

        let mut binder = FlagBinder::new();
        for descriptor in registry.descriptors() {
            binder.add(&descriptor.flags)?;
        }
        let flags = binder.bind(args, &env)?;

        let graceful_shutdown_duration = flags.must_duration(GRACEFUL_SHUTDOWN_DURATION)?;
        let build_debug_data = flags.must_bool(BUILD_DEBUG_DATA)?;

        // Armed before any module starts so an early signal is not lost.
        let mut signals = match signals {
            Some(signals) => signals,
            None => Box::new(OsSignals::arm().map_err(BootstrapError::Signals)?),
        };

        let ctx = Context::new(flags, registry.into_descriptors());

        let orchestrator = Orchestrator::new(ctx.modules::<Apps>()?, Arc::clone(&console));
        let mut startup = orchestrator.start();

        for logger in ctx.modules::<SystemLoggers>()? {
            let id = logger.descriptor().id;
            for message in logger.system_messages() {
                console.system(id.as_str(), &message);
            }
        }

        let debug = if build_debug_data {
            Some(DebugData::build(&ctx, &version)?)
        } else {
            None
        };

        let signal = orchestrator
            .wait_for_shutdown(&mut startup, signals.as_mut())
            .await?;
        info!(%signal, "starting graceful shutdown");

        let outcome = orchestrator
            .shutdown(graceful_shutdown_duration, signals.as_mut(), &mut startup)
            .await?;

        Ok(ShutdownReport {
            signal,
            forced: outcome.forced,
            records: orchestrator.records(),
            debug,
        })
    }
}
