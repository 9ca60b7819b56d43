//! The application context: parsed flags plus the single gate through which
//! modules are instantiated.

use std::fmt;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace};

use crate::flags::ParsedFlags;
use crate::module::{Capability, Module, ModuleDescriptor, ModuleId};

/// Stage at which instantiating a module failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Provision,
    Validate,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Provision => f.write_str("provision"),
            Stage::Validate => f.write_str("validate"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{stage} module {id}: {source}")]
pub struct InstantiationError {
    pub id: ModuleId,
    pub stage: Stage,
    #[source]
    pub source: anyhow::Error,
}

enum Slot {
    Empty,
    /// Being provisioned by the given thread. Nested lookups from that
    /// thread skip it; other threads wait for it.
    Loading(ThreadId),
    Ready(Arc<dyn Module>),
}

/// Resets a slot left `Loading` (failure or panic) and wakes waiters.
struct LoadGuard<'a> {
    ctx: &'a Context,
    index: usize,
    done: bool,
}

impl LoadGuard<'_> {
    fn complete(mut self, module: Arc<dyn Module>) {
        self.ctx.slots.lock()[self.index] = Slot::Ready(module);
        self.done = true;
    }
}

impl Drop for LoadGuard<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.ctx.slots.lock()[self.index] = Slot::Empty;
        }
        self.ctx.loaded.notify_all();
    }
}

/// Handed to every module during provisioning.
///
/// Each descriptor's factory runs at most once for the lifetime of the
/// context, so repeated lookups return the same instances in registration
/// order. A lookup from another thread while a module is being provisioned
/// blocks until it is ready.
pub struct Context {
    flags: ParsedFlags,
    descriptors: Vec<ModuleDescriptor>,
    slots: Mutex<Vec<Slot>>,
    loaded: Condvar,
}

impl Context {
    pub fn new(flags: ParsedFlags, descriptors: Vec<ModuleDescriptor>) -> Self {
        let slots = descriptors.iter().map(|_| Slot::Empty).collect();
        Self {
            flags,
            descriptors,
            slots: Mutex::new(slots),
            loaded: Condvar::new(),
        }
    }

    pub fn flags(&self) -> &ParsedFlags {
        &self.flags
    }

    pub fn descriptors(&self) -> &[ModuleDescriptor] {
        &self.descriptors
    }

    /// Every module satisfying `C`, in registration order.
    ///
    /// The first lookup instantiates, provisions and validates every module.
    ///
    /// # Example
    /// ```ignore
    /// let apps = ctx.modules::<Apps>()?;
    /// for app in &apps {
    ///     app.start().await?;
    /// }
    /// ```
    pub fn modules<C: Capability>(&self) -> Result<Vec<Arc<C::Target>>, InstantiationError> {
        let mut found = Vec::new();
        for index in 0..self.descriptors.len() {
            if let Some(module) = self.load(index)? {
                if let Some(target) = C::cast(module) {
                    found.push(target);
                }
            }
        }
        trace!(capability = C::NAME, count = found.len(), "capability lookup");
        Ok(found)
    }

    /// `None` when the module is still being provisioned further up this
    /// thread's stack.
    fn load(&self, index: usize) -> Result<Option<Arc<dyn Module>>, InstantiationError> {
        let current = thread::current().id();
        {
            let mut slots = self.slots.lock();
            loop {
                match &slots[index] {
                    Slot::Ready(module) => return Ok(Some(Arc::clone(module))),
                    Slot::Loading(owner) if *owner == current => return Ok(None),
                    Slot::Loading(_) => {}
                    Slot::Empty => break,
                }
                self.loaded.wait(&mut slots);
            }
            slots[index] = Slot::Loading(current);
        }

        // Provisioning may look up other modules, so the lock is not held.
        let guard = LoadGuard {
            ctx: self,
            index,
            done: false,
        };
        let module = self.instantiate(&self.descriptors[index])?;
        guard.complete(Arc::clone(&module));
        Ok(Some(module))
    }

    fn instantiate(&self, descriptor: &ModuleDescriptor) -> Result<Arc<dyn Module>, InstantiationError> {
        let id = &descriptor.id;
        debug!(module = %id, "instantiating module");
        let mut module = descriptor.instantiate();

        if let Some(provisioner) = module.as_provisioner() {
            provisioner.provision(self).map_err(|source| InstantiationError {
                id: id.clone(),
                stage: Stage::Provision,
                source,
            })?;
        }

        if let Some(validator) = module.as_validator() {
            validator.validate().map_err(|source| InstantiationError {
                id: id.clone(),
                stage: Stage::Validate,
                source,
            })?;
        }

        Ok(Arc::from(module))
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("flags", &self.flags)
            .field("descriptors", &self.descriptors)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::{Environment, FlagBinder, FlagSet};
    use crate::module::{AllModules, Apps, Concrete, DebugContributors, SystemLoggers};
    use crate::testing::{TestApp, TestLogger};
    use std::panic::AssertUnwindSafe;
    use std::time::Duration;

    fn context(descriptors: Vec<ModuleDescriptor>, env: &[(&str, &str)]) -> Context {
        let mut binder = FlagBinder::new();
        for d in &descriptors {
            binder.add(&d.flags).unwrap();
        }
        let flags = binder
            .bind(Vec::<String>::new(), &Environment::from_pairs(env.iter().copied()))
            .unwrap();
        Context::new(flags, descriptors)
    }

    #[test]
    fn instantiates_each_module_once() {
        let a = TestApp::new("a");
        let b = TestApp::new("b");
        let ctx = context(vec![a.descriptor(), b.descriptor()], &[]);

        let first = ctx.modules::<Apps>().unwrap();
        let second = ctx.modules::<Apps>().unwrap();
        let all = ctx.modules::<AllModules>().unwrap();

        assert_eq!(first.len(), 2);
        assert_eq!(all.len(), 2);
        for (x, y) in first.iter().zip(second.iter()) {
            assert!(Arc::ptr_eq(x, y));
        }
        assert_eq!(a.probe().instances(), 1);
        assert_eq!(b.probe().instances(), 1);
        assert_eq!(a.probe().provisions(), 1);
    }

    #[test]
    fn filters_by_capability_in_registration_order() {
        let ctx = context(
            vec![
                TestLogger::new("logger-1", &["one"]).descriptor(),
                TestApp::new("app-1").descriptor(),
                TestLogger::new("logger-2", &["two"]).descriptor(),
                TestApp::new("app-2").descriptor(),
            ],
            &[],
        );

        let apps: Vec<_> = ctx
            .modules::<Apps>()
            .unwrap()
            .iter()
            .map(|a| a.descriptor().id.to_string())
            .collect();
        let loggers: Vec<_> = ctx
            .modules::<SystemLoggers>()
            .unwrap()
            .iter()
            .map(|l| l.descriptor().id.to_string())
            .collect();

        assert_eq!(apps, vec!["app-1", "app-2"]);
        assert_eq!(loggers, vec!["logger-1", "logger-2"]);
        assert!(ctx.modules::<DebugContributors>().unwrap().is_empty());
    }

    #[test]
    fn provisioning_sees_environment_overrides() {
        let app = TestApp::new("echo").flags(FlagSet::new("echo").int("my-port", 8000, ""));
        let ctx = context(vec![app.descriptor()], &[("MY_PORT", "9000")]);

        ctx.modules::<Apps>().unwrap();
        assert_eq!(app.probe().port(), Some(9000));
    }

    #[test]
    fn provisioning_sees_list_overrides() {
        let app = TestApp::new("hosts").flags(FlagSet::new("hosts").string_list(
            "allowed-hosts",
            &["localhost"],
            "",
        ));
        let ctx = context(vec![app.descriptor()], &[("ALLOWED_HOSTS", "a,b")]);

        ctx.modules::<Apps>().unwrap();
        assert_eq!(app.probe().hosts(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn validation_failure_is_reported_with_stage() {
        let ctx = context(vec![TestApp::new("picky").invalid("missing binary").descriptor()], &[]);

        let Err(err) = ctx.modules::<Apps>() else {
            panic!("validation should fail");
        };
        assert_eq!(err.stage, Stage::Validate);
        assert_eq!(err.to_string(), "validate module picky: missing binary");
    }

    #[test]
    fn provisioning_failure_is_reported_with_stage() {
        let app = TestApp::new("needs-flag").require_flag("does-not-exist");
        let ctx = context(vec![app.descriptor()], &[]);

        let Err(err) = ctx.modules::<Apps>() else {
            panic!("provisioning should fail");
        };
        assert_eq!(err.stage, Stage::Provision);
        assert!(err.to_string().starts_with("provision module needs-flag:"));
    }

    #[test]
    fn concrete_lookup_downcasts() {
        let ctx = context(
            vec![
                TestLogger::new("logger", &[]).descriptor(),
                TestApp::new("app").descriptor(),
            ],
            &[],
        );

        let apps = ctx.modules::<Concrete<TestApp>>().unwrap();
        assert_eq!(apps.len(), 1);
        assert_eq!(apps[0].descriptor().id.as_str(), "app");
    }

    #[test]
    fn nested_lookup_during_provisioning_does_not_deadlock() {
        let outer = TestApp::new("outer").lookup_apps_during_provision();
        let inner = TestApp::new("inner");
        let ctx = context(vec![outer.descriptor(), inner.descriptor()], &[]);

        let apps = ctx.modules::<Apps>().unwrap();
        assert_eq!(apps.len(), 2);
        // The outer module only saw the inner one while provisioning itself.
        assert_eq!(outer.probe().seen_apps(), 1);
        assert_eq!(inner.probe().instances(), 1);
    }

    #[test]
    fn concurrent_lookup_waits_for_provisioning() {
        let slow = TestApp::new("slow").provision_delay(Duration::from_millis(200));
        let ctx = Arc::new(context(vec![slow.descriptor()], &[]));

        let first = {
            let ctx = Arc::clone(&ctx);
            std::thread::spawn(move || ctx.modules::<AllModules>().map(|m| m.len()))
        };
        std::thread::sleep(Duration::from_millis(50));
        let concurrent = ctx.modules::<AllModules>().unwrap();

        assert_eq!(concurrent.len(), 1);
        assert_eq!(first.join().unwrap().unwrap(), 1);
        assert_eq!(slow.probe().instances(), 1);
    }

    #[test]
    fn panicking_provisioner_does_not_hide_the_module() {
        let flaky = TestApp::new("flaky").panic_on_first_provision();
        let ctx = context(vec![flaky.descriptor()], &[]);

        let first = std::panic::catch_unwind(AssertUnwindSafe(|| ctx.modules::<AllModules>().map(|m| m.len())));
        assert!(first.is_err());

        let apps = ctx.modules::<Apps>().unwrap();
        assert_eq!(apps.len(), 1);
        assert_eq!(flaky.probe().instances(), 2);
    }
}
