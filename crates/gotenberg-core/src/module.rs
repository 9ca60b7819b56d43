//! Modules, their descriptors and the capabilities the core knows about.
//!
//! A module is anything produced by a descriptor's factory. What the core
//! does with it depends on which capabilities it exposes:
//!
//! | capability      | trait           | hook on [`Module`]        |
//! |-----------------|-----------------|---------------------------|
//! | provisioning    | [`Provisioner`] | `as_provisioner`          |
//! | self-check      | [`Validator`]   | `as_validator`            |
//! | start/stop      | [`App`]         | `as_app`                  |
//! | startup lines   | [`SystemLogger`]| `as_system_logger`        |
//! | debug dump      | [`Debuggable`]  | `as_debuggable`           |
//!
//! Capability lookups go through [`Capability`] witnesses such as [`Apps`],
//! see [`Context::modules`](crate::context::Context::modules).

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::context::Context;
use crate::flags::FlagSet;
use crate::lifecycle::GracefulShutdown;

/// Identifier of a module, e.g. `api` or `chromium`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ModuleId(String);

impl ModuleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `^[a-z][a-z0-9-]*$`
    pub fn is_conventional(&self) -> bool {
        let mut chars = self.0.chars();
        matches!(chars.next(), Some(c) if c.is_ascii_lowercase())
            && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ModuleId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ModuleId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ModuleId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Produces a fresh module instance.
pub type ModuleFactory = Arc<dyn Fn() -> Box<dyn Module> + Send + Sync>;

/// Passive registration record of a module.
#[derive(Clone)]
pub struct ModuleDescriptor {
    pub id: ModuleId,
    pub flags: FlagSet,
    factory: ModuleFactory,
}

impl ModuleDescriptor {
    pub fn new<F>(id: impl Into<ModuleId>, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Module> + Send + Sync + 'static,
    {
        let id = id.into();
        Self {
            flags: FlagSet::new(id.as_str()),
            id,
            factory: Arc::new(factory),
        }
    }

    pub fn with_flags(mut self, flags: FlagSet) -> Self {
        self.flags = flags;
        self
    }

    /// Only the context instantiates modules.
    pub(crate) fn instantiate(&self) -> Box<dyn Module> {
        (self.factory)()
    }
}

impl fmt::Debug for ModuleDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleDescriptor")
            .field("id", &self.id)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

/// Upcast to `Any`, implemented for every module type.
pub trait AsAny: Any + Send + Sync {
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Every module instance.
///
/// The capability hooks default to "not supported". A module opts in by
/// overriding the hook with `Some(self)`:
///
/// ```ignore
/// impl Module for Api {
///     fn descriptor(&self) -> ModuleDescriptor {
///         ModuleDescriptor::new("api", || Box::new(Api::default()))
///     }
///
///     fn as_app(self: Arc<Self>) -> Option<Arc<dyn App>> {
///         Some(self)
///     }
/// }
/// ```
pub trait Module: AsAny {
    fn descriptor(&self) -> ModuleDescriptor;

    fn as_provisioner(&mut self) -> Option<&mut dyn Provisioner> {
        None
    }

    fn as_validator(&self) -> Option<&dyn Validator> {
        None
    }

    fn as_app(self: Arc<Self>) -> Option<Arc<dyn App>> {
        None
    }

    fn as_system_logger(self: Arc<Self>) -> Option<Arc<dyn SystemLogger>> {
        None
    }

    fn as_debuggable(self: Arc<Self>) -> Option<Arc<dyn Debuggable>> {
        None
    }
}

/// Binds configuration to internal state, once, right after instantiation.
///
/// The context must not be retained past this call.
pub trait Provisioner {
    fn provision(&mut self, ctx: &Context) -> anyhow::Result<()>;
}

/// Post-provisioning self-check.
pub trait Validator {
    fn validate(&self) -> anyhow::Result<()>;
}

/// A runnable application.
#[async_trait]
pub trait App: Module {
    async fn start(&self) -> anyhow::Result<()>;

    /// Stops the application. Cancellation of `shutdown` is a hard stop.
    ///
    /// Returning [`CancelGracefulShutdown`] cancels the deadline for every
    /// application; [`GracefulShutdown::abort`] does the same without
    /// failing.
    async fn stop(&self, shutdown: GracefulShutdown) -> anyhow::Result<()>;

    /// Replaces the default `application started` line.
    fn startup_message(&self) -> Option<String> {
        None
    }
}

/// Supplies informational lines printed once at startup.
pub trait SystemLogger: Module {
    fn system_messages(&self) -> Vec<String>;
}

/// Contributes module-specific data to the debug dump.
pub trait Debuggable: Module {
    fn debug(&self) -> serde_json::Value;
}

/// Returned from [`App::stop`] to give up on the graceful shutdown. Not a
/// failure: the deadline is cancelled for everyone and shutdown continues.
#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("cancel graceful shutdown")]
pub struct CancelGracefulShutdown;

impl CancelGracefulShutdown {
    /// Whether `err` is, or wraps, the sentinel.
    pub fn is(err: &anyhow::Error) -> bool {
        err.chain().any(|cause| cause.is::<CancelGracefulShutdown>())
    }
}

/// Names a capability for [`Context::modules`](crate::context::Context::modules).
pub trait Capability: 'static {
    type Target: ?Sized + Send + Sync;

    const NAME: &'static str;

    fn cast(module: Arc<dyn Module>) -> Option<Arc<Self::Target>>;
}

/// Every module.
pub struct AllModules;

impl Capability for AllModules {
    type Target = dyn Module;
    const NAME: &'static str = "module";

    fn cast(module: Arc<dyn Module>) -> Option<Arc<dyn Module>> {
        Some(module)
    }
}

/// Modules implementing [`App`].
pub struct Apps;

impl Capability for Apps {
    type Target = dyn App;
    const NAME: &'static str = "app";

    fn cast(module: Arc<dyn Module>) -> Option<Arc<dyn App>> {
        module.as_app()
    }
}

/// Modules implementing [`SystemLogger`].
pub struct SystemLoggers;

impl Capability for SystemLoggers {
    type Target = dyn SystemLogger;
    const NAME: &'static str = "system logger";

    fn cast(module: Arc<dyn Module>) -> Option<Arc<dyn SystemLogger>> {
        module.as_system_logger()
    }
}

/// Modules implementing [`Debuggable`].
pub struct DebugContributors;

impl Capability for DebugContributors {
    type Target = dyn Debuggable;
    const NAME: &'static str = "debug contributor";

    fn cast(module: Arc<dyn Module>) -> Option<Arc<dyn Debuggable>> {
        module.as_debuggable()
    }
}

/// Modules of the concrete type `T`. Lets a module find a specific
/// collaborator, e.g. an API module looking up a converter it wraps.
pub struct Concrete<T>(PhantomData<fn() -> T>);

impl<T: Module> Capability for Concrete<T> {
    type Target = T;
    const NAME: &'static str = "concrete module";

    fn cast(module: Arc<dyn Module>) -> Option<Arc<T>> {
        module.into_any().downcast::<T>().ok()
    }
}
