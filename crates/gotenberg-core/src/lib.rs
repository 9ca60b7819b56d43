//! gotenberg-core
//!
//! Application bootstrap and lifecycle for Gotenberg: every feature of the
//! server is a module, and this crate wires modules together at startup.
//!
//! # Modules
//! - **module**: the `Module` trait, descriptors and capabilities (`App`,
//!   `Provisioner`, `Validator`, `SystemLogger`, `Debuggable`)
//! - **registry**: the process-wide list of descriptors, filled before boot
//! - **flags**: flag declarations, argv + environment binding, `ParsedFlags`
//! - **context**: memoized instantiation and capability lookup
//! - **lifecycle**: concurrent start, signal wait, deadline-bounded stop
//! - **bootstrap**: the entry point tying all of the above together
//! - **signals**, **console**, **banner**, **debug**: process-facing edges

pub mod banner;
pub mod bootstrap;
pub mod console;
pub mod context;
pub mod debug;
pub mod error;
pub mod flags;
pub mod lifecycle;
pub mod module;
pub mod registry;
pub mod signals;

#[cfg(test)]
mod testing;

pub use bootstrap::{Bootstrap, ShutdownReport};
pub use context::{Context, InstantiationError};
pub use error::BootstrapError;
pub use flags::{Environment, FlagError, FlagSet, ParsedFlags};
pub use lifecycle::GracefulShutdown;
pub use module::{
    App, CancelGracefulShutdown, Debuggable, Module, ModuleDescriptor, ModuleId, Provisioner,
    SystemLogger, Validator,
};
pub use registry::{RegistrationError, Registry};
