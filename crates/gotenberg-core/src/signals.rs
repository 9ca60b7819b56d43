//! OS signal handling.
//!
//! # Responsibilities
//! - SIGINT/SIGTERM trigger the graceful shutdown
//! - A further SIGINT during shutdown forces cancellation
//!
//! [`OsSignals`] registers its handlers on construction, so creating it
//! before any module starts means an early SIGTERM is buffered rather than
//! lost. [`ManualSignals`] drives the same flow from a channel.

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    Interrupt,
    Terminate,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Interrupt => f.write_str("SIGINT"),
            Signal::Terminate => f.write_str("SIGTERM"),
        }
    }
}

/// Source of shutdown requests. Both methods must be cancel-safe: they are
/// polled inside `select!` loops.
#[async_trait]
pub trait SignalSource: Send {
    /// Waits for the first interrupt or terminate signal.
    async fn shutdown(&mut self) -> Signal;

    /// Waits for the next interrupt signal.
    async fn interrupt(&mut self);
}

#[cfg(unix)]
pub struct OsSignals {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl OsSignals {
    /// Installs the handlers. Must be called from within a Tokio runtime.
    pub fn arm() -> std::io::Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};

        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }
}

#[cfg(unix)]
#[async_trait]
impl SignalSource for OsSignals {
    async fn shutdown(&mut self) -> Signal {
        tokio::select! {
            Some(()) = self.interrupt.recv() => Signal::Interrupt,
            Some(()) = self.terminate.recv() => Signal::Terminate,
            else => std::future::pending().await,
        }
    }

    async fn interrupt(&mut self) {
        if self.interrupt.recv().await.is_none() {
            std::future::pending::<()>().await;
        }
    }
}

/// Ctrl-C only; there is no terminate signal to listen to.
#[cfg(not(unix))]
pub struct OsSignals {
    _private: (),
}

#[cfg(not(unix))]
impl OsSignals {
    pub fn arm() -> std::io::Result<Self> {
        Ok(Self { _private: () })
    }
}

#[cfg(not(unix))]
#[async_trait]
impl SignalSource for OsSignals {
    async fn shutdown(&mut self) -> Signal {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
        Signal::Interrupt
    }

    async fn interrupt(&mut self) {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Signals delivered through a channel.
pub struct ManualSignals {
    rx: mpsc::UnboundedReceiver<Signal>,
}

/// Sending half of [`ManualSignals`].
#[derive(Debug, Clone)]
pub struct SignalSender {
    tx: mpsc::UnboundedSender<Signal>,
}

impl SignalSender {
    /// Returns false once the receiving side is gone.
    pub fn send(&self, signal: Signal) -> bool {
        self.tx.send(signal).is_ok()
    }
}

impl ManualSignals {
    pub fn new() -> (Self, SignalSender) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { rx }, SignalSender { tx })
    }
}

#[async_trait]
impl SignalSource for ManualSignals {
    async fn shutdown(&mut self) -> Signal {
        match self.rx.recv().await {
            Some(signal) => signal,
            None => std::future::pending().await,
        }
    }

    async fn interrupt(&mut self) {
        loop {
            match self.rx.recv().await {
                Some(Signal::Interrupt) => return,
                Some(Signal::Terminate) => continue,
                None => std::future::pending::<()>().await,
            }
        }
    }
}
