//! Concurrent start, signal wait, and concurrent deadline-bounded stop of
//! every runnable application.
//!
//! # Flow
//! 1. `start()` spawns one task per application; each prints its startup
//!    line as soon as its own `start()` returns.
//! 2. `wait_for_shutdown()` blocks until SIGINT/SIGTERM. A start failure
//!    observed meanwhile aborts the process (returned as an error) without
//!    stopping the applications that did start.
//! 3. `shutdown()` first waits for starts still in flight, so `stop()` only
//!    ever runs on a running application. It then creates the
//!    [`GracefulShutdown`] token, re-arms SIGINT as force-quit and stops every
//!    application concurrently.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use parking_lot::Mutex;
use tokio::task::{AbortHandle, JoinSet};
use tracing::{debug, error, info, warn};

use super::phase::{LifecycleRecord, Phase};
use super::shutdown::GracefulShutdown;
use crate::console::Console;
use crate::error::BootstrapError;
use crate::flags::format_duration;
use crate::module::{App, CancelGracefulShutdown, Module, ModuleId};
use crate::signals::{Signal, SignalSource};

struct Runnable {
    id: ModuleId,
    app: Arc<dyn App>,
}

/// Pending start tasks. Dropping it aborts the starts still in flight.
pub struct Startup {
    tasks: JoinSet<Result<(), (usize, anyhow::Error)>>,
}

/// How the stop phase ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownOutcome {
    /// The deadline was cancelled early: a module gave up or a second
    /// interrupt arrived.
    pub forced: bool,
    /// The deadline was already cancelled when the last stop returned.
    pub deadline_cancelled: bool,
}

pub struct Orchestrator {
    console: Arc<dyn Console>,
    runnables: Vec<Runnable>,
    records: Arc<Mutex<Vec<LifecycleRecord>>>,
}

impl Orchestrator {
    pub fn new(apps: Vec<Arc<dyn App>>, console: Arc<dyn Console>) -> Self {
        let runnables: Vec<Runnable> = apps
            .into_iter()
            .map(|app| Runnable {
                id: app.descriptor().id,
                app,
            })
            .collect();
        let records = runnables
            .iter()
            .map(|r| LifecycleRecord::new(r.id.clone()))
            .collect();
        Self {
            console,
            runnables,
            records: Arc::new(Mutex::new(records)),
        }
    }

    /// Snapshot of every application's phase.
    pub fn records(&self) -> Vec<LifecycleRecord> {
        self.records.lock().clone()
    }

    fn advance(records: &Mutex<Vec<LifecycleRecord>>, index: usize, next: Phase) {
        let mut records = records.lock();
        let record = &mut records[index];
        if !record.advance(next) {
            debug!(module = %record.id, from = ?record.phase, to = ?next, "phase transition ignored");
        }
    }

    fn fail(records: &Mutex<Vec<LifecycleRecord>>, index: usize, err: &anyhow::Error) {
        let mut records = records.lock();
        let record = &mut records[index];
        if !record.fail(err) {
            debug!(module = %record.id, from = ?record.phase, "failure after terminal phase ignored");
        }
    }

    /// Starts every application in its own task.
    pub fn start(&self) -> Startup {
        let mut tasks = JoinSet::new();

        for (index, runnable) in self.runnables.iter().enumerate() {
            Self::advance(&self.records, index, Phase::Starting);

            let id = runnable.id.clone();
            let app = Arc::clone(&runnable.app);
            let records = Arc::clone(&self.records);
            let console = Arc::clone(&self.console);

            tasks.spawn(async move {
                debug!(module = %id, "starting application");
                let starting = Arc::clone(&app);
                match isolated(async move { starting.start().await }).await {
                    Ok(()) => {
                        Self::advance(&records, index, Phase::Running);
                        match app.startup_message() {
                            Some(message) if !message.is_empty() => console.system(id.as_str(), &message),
                            _ => console.system(id.as_str(), "application started"),
                        }
                        info!(module = %id, "application started");
                        Ok(())
                    }
                    Err(err) => {
                        Self::fail(&records, index, &err);
                        Err((index, err))
                    }
                }
            });
        }

        Startup { tasks }
    }

    fn start_failure(&self, index: usize, err: anyhow::Error) -> BootstrapError {
        let id = self.runnables[index].id.clone();
        error!(module = %id, error = %err, "application failed to start");
        BootstrapError::Start { id, source: err }
    }

    /// Blocks until a shutdown signal arrives, or fails on the first start
    /// failure.
    pub async fn wait_for_shutdown<S>(
        &self,
        startup: &mut Startup,
        signals: &mut S,
    ) -> Result<Signal, BootstrapError>
    where
        S: SignalSource + ?Sized,
    {
        loop {
            tokio::select! {
                signal = signals.shutdown() => {
                    info!(%signal, "shutdown signal received");
                    return Ok(signal);
                }
                joined = startup.tasks.join_next(), if !startup.tasks.is_empty() => {
                    match joined {
                        Some(Ok(Err((index, err)))) => return Err(self.start_failure(index, err)),
                        Some(Err(join_err)) => warn!(error = %join_err, "start task aborted"),
                        Some(Ok(Ok(()))) | None => {}
                    }
                }
            }
        }
    }

    /// Stops every application concurrently under a `duration` deadline.
    ///
    /// Starts still in flight are awaited first, outside the deadline; a
    /// start failing meanwhile is returned as [`BootstrapError::Start`].
    /// A second interrupt from `signals`, or a module returning
    /// [`CancelGracefulShutdown`], cancels the deadline for everyone; the
    /// remaining stops are still awaited. The first other stop error is
    /// returned once every stop has finished.
    pub async fn shutdown<S>(
        &self,
        duration: Duration,
        signals: &mut S,
        startup: &mut Startup,
    ) -> Result<ShutdownOutcome, BootstrapError>
    where
        S: SignalSource + ?Sized,
    {
        if !startup.tasks.is_empty() {
            info!(pending = startup.tasks.len(), "waiting for applications to finish starting");
        }
        while let Some(joined) = startup.tasks.join_next().await {
            match joined {
                Ok(Err((index, err))) => return Err(self.start_failure(index, err)),
                Err(join_err) => warn!(error = %join_err, "start task aborted"),
                Ok(Ok(())) => {}
            }
        }

        let shutdown = GracefulShutdown::new(duration);
        self.console
            .print_line(&format!("[SYSTEM] graceful shutdown of {}", format_duration(duration)));

        let mut stops = JoinSet::new();
        for (index, runnable) in self.runnables.iter().enumerate() {
            Self::advance(&self.records, index, Phase::Stopping);

            let app = Arc::clone(&runnable.app);
            let token = shutdown.clone();
            stops.spawn(async move { (index, isolated(async move { app.stop(token).await }).await) });
        }

        let mut failures: Vec<(usize, anyhow::Error)> = Vec::new();
        let mut force_quit_armed = true;

        while !stops.is_empty() {
            tokio::select! {
                _ = signals.interrupt(), if force_quit_armed => {
                    force_quit_armed = false;
                    warn!("second interrupt received, forcing shutdown");
                    shutdown.abort();
                }
                joined = stops.join_next() => {
                    match joined {
                        Some(Ok((index, result))) => self.on_stopped(index, result, &shutdown, &mut failures),
                        Some(Err(join_err)) => warn!(error = %join_err, "stop task aborted"),
                        None => break,
                    }
                }
            }
        }

        let outcome = ShutdownOutcome {
            forced: shutdown.was_aborted(),
            deadline_cancelled: shutdown.is_cancelled(),
        };

        let mut failures = failures.into_iter();
        match failures.next() {
            None => Ok(outcome),
            Some((index, err)) => {
                for (other, other_err) in failures {
                    error!(module = %self.runnables[other].id, error = %other_err, "application failed to stop");
                }
                Err(BootstrapError::Stop {
                    id: self.runnables[index].id.clone(),
                    source: err,
                })
            }
        }
    }

    fn on_stopped(
        &self,
        index: usize,
        result: anyhow::Result<()>,
        shutdown: &GracefulShutdown,
        failures: &mut Vec<(usize, anyhow::Error)>,
    ) {
        let id = &self.runnables[index].id;
        match result {
            Ok(()) => {}
            Err(err) if CancelGracefulShutdown::is(&err) => {
                info!(module = %id, "application cancelled the graceful shutdown");
                shutdown.abort();
            }
            Err(err) => {
                error!(module = %id, error = %err, "application failed to stop");
                Self::fail(&self.records, index, &err);
                failures.push((index, err));
                return;
            }
        }

        Self::advance(&self.records, index, Phase::Stopped);
        self.console.system(id.as_str(), "application stopped");
    }
}

/// Aborts the wrapped task when dropped.
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Runs a module future in its own task so a panic surfaces as an error.
/// The task does not outlive the caller.
async fn isolated<F>(future: F) -> anyhow::Result<()>
where
    F: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    let handle = tokio::spawn(future);
    let _guard = AbortOnDrop(handle.abort_handle());
    match handle.await {
        Ok(result) => result,
        Err(join_err) if join_err.is_panic() => Err(anyhow!("panicked")),
        Err(join_err) => Err(anyhow!(join_err)),
    }
}
