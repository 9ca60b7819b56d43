//! Lifecycle of runnable applications.
//!
//! ```text
//! pending ──start()──► starting ──ok──► running
//!                           └──err──► failed
//! running ──signal──► stopping ──ok──► stopped
//!                         ├──CancelGracefulShutdown──► stopped (deadline cancelled)
//!                         └──err──► failed
//! ```

pub mod orchestrator;
pub mod phase;
pub mod shutdown;

pub use self::orchestrator::{Orchestrator, ShutdownOutcome, Startup};
pub use self::phase::{LifecycleRecord, Phase};
pub use self::shutdown::GracefulShutdown;
