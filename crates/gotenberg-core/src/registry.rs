use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use crate::flags::builtin_flags;
use crate::module::{Module, ModuleDescriptor, ModuleId};

/// Owner name reported for collisions with the built-in flags.
const BUILTIN_OWNER: &str = "gotenberg";

#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("module id must not be empty")]
    EmptyId,

    #[error("module {0} is already registered")]
    DuplicateId(ModuleId),

    #[error("flag {flag:?} of module {module} is already declared by {owner}")]
    DuplicateFlag {
        module: ModuleId,
        flag: String,
        owner: String,
    },
}

/// Append-only list of module descriptors (module id -> descriptor).
///
/// Design:
/// - Filled at `main` entry, before bootstrap.
/// - Handed by value to the bootstrap, so it cannot change afterwards.
/// - Ids and flag names are unique; collisions fail at `register`, which is
///   before any argv parsing happens.
#[derive(Debug)]
pub struct Registry {
    descriptors: Vec<ModuleDescriptor>,
    /// flag name -> owning module
    flag_owners: HashMap<String, String>,
}

impl Registry {
    pub fn new() -> Self {
        let flag_owners = builtin_flags()
            .flags()
            .iter()
            .map(|f| (f.name.clone(), BUILTIN_OWNER.to_string()))
            .collect();
        Self {
            descriptors: Vec::new(),
            flag_owners,
        }
    }

    pub fn register(&mut self, descriptor: ModuleDescriptor) -> Result<(), RegistrationError> {
        let id = descriptor.id.clone();
        if id.as_str().is_empty() {
            return Err(RegistrationError::EmptyId);
        }
        if self.descriptors.iter().any(|d| d.id == id) {
            return Err(RegistrationError::DuplicateId(id));
        }
        if !id.is_conventional() {
            warn!(module = %id, "module id does not match ^[a-z][a-z0-9-]*$");
        }

        let mut seen: HashSet<&str> = HashSet::new();
        for flag in descriptor.flags.flags() {
            let owner = self
                .flag_owners
                .get(&flag.name)
                .cloned()
                .or_else(|| seen.contains(flag.name.as_str()).then(|| id.to_string()));
            if let Some(owner) = owner {
                return Err(RegistrationError::DuplicateFlag {
                    module: id,
                    flag: flag.name.clone(),
                    owner,
                });
            }
            seen.insert(&flag.name);
        }

        for flag in descriptor.flags.flags() {
            self.flag_owners.insert(flag.name.clone(), id.to_string());
        }
        debug!(module = %id, flags = descriptor.flags.len(), "module registered");
        self.descriptors.push(descriptor);
        Ok(())
    }

    /// Registers the descriptor a module instance reports.
    pub fn register_module(&mut self, module: &dyn Module) -> Result<(), RegistrationError> {
        self.register(module.descriptor())
    }

    /// Descriptors in registration order.
    pub fn descriptors(&self) -> &[ModuleDescriptor] {
        &self.descriptors
    }

    pub fn ids(&self) -> Vec<&ModuleId> {
        self.descriptors.iter().map(|d| &d.id).collect()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub(crate) fn into_descriptors(self) -> Vec<ModuleDescriptor> {
        self.descriptors
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::{BUILD_DEBUG_DATA, FlagSet};
    use crate::testing::TestApp;

    #[test]
    fn keeps_registration_order() {
        let mut registry = Registry::new();
        registry.register(TestApp::new("b").descriptor()).unwrap();
        registry.register(TestApp::new("a").descriptor()).unwrap();
        registry.register(TestApp::new("c").descriptor()).unwrap();

        let ids: Vec<_> = registry.ids().iter().map(|id| id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[test]
    fn duplicate_id_is_rejected() {
        let mut registry = Registry::new();
        registry.register(TestApp::new("echo").descriptor()).unwrap();
        let err = registry.register(TestApp::new("echo").descriptor()).unwrap_err();
        assert!(matches!(err, RegistrationError::DuplicateId(id) if id.as_str() == "echo"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn duplicate_flag_between_modules_is_rejected() {
        let mut registry = Registry::new();
        registry
            .register(
                TestApp::new("first")
                    .flags(FlagSet::new("first").int("shared-port", 1, ""))
                    .descriptor(),
            )
            .unwrap();
        let err = registry
            .register(
                TestApp::new("second")
                    .flags(FlagSet::new("second").int("shared-port", 2, ""))
                    .descriptor(),
            )
            .unwrap_err();

        match err {
            RegistrationError::DuplicateFlag { module, flag, owner } => {
                assert_eq!(module.as_str(), "second");
                assert_eq!(flag, "shared-port");
                assert_eq!(owner, "first");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn duplicate_flag_within_one_module_is_rejected() {
        let mut registry = Registry::new();
        let err = registry
            .register(
                TestApp::new("twice")
                    .flags(FlagSet::new("twice").int("port", 1, "").int("port", 2, ""))
                    .descriptor(),
            )
            .unwrap_err();
        assert!(matches!(err, RegistrationError::DuplicateFlag { .. }));
    }

    #[test]
    fn builtin_flag_names_are_reserved() {
        let mut registry = Registry::new();
        let err = registry
            .register(
                TestApp::new("sneaky")
                    .flags(FlagSet::new("sneaky").bool(BUILD_DEBUG_DATA, false, ""))
                    .descriptor(),
            )
            .unwrap_err();
        assert!(matches!(err, RegistrationError::DuplicateFlag { owner, .. } if owner == "gotenberg"));
    }

    #[test]
    fn empty_id_is_rejected() {
        let mut registry = Registry::new();
        assert!(matches!(
            registry.register(TestApp::new("").descriptor()),
            Err(RegistrationError::EmptyId)
        ));
    }

    #[test]
    fn register_module_uses_the_instance_descriptor() {
        let mut registry = Registry::new();
        registry.register_module(&TestApp::new("echo")).unwrap();
        assert_eq!(registry.descriptors()[0].id.as_str(), "echo");
    }
}
