//! Read-only, typed view over the bound flag surface.

use std::collections::HashMap;
use std::time::Duration;

use regex::Regex;

use super::FlagError;
use super::set::{Flag, FlagKind, FlagValue};

#[derive(Debug, Clone)]
struct Entry {
    flag: Flag,
    value: FlagValue,
    changed: bool,
}

/// The final flag values after argv parsing and the environment overlay.
///
/// Accessors fail with [`FlagError::Unknown`] for undeclared names and with
/// [`FlagError::KindMismatch`] when the flag holds another kind of value.
/// Modules call them with `?` inside provisioning, which makes a bad lookup
/// fatal at startup.
#[derive(Debug, Clone, Default)]
pub struct ParsedFlags {
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
}

impl ParsedFlags {
    /// Every flag at its default value.
    pub fn from_defaults<'a>(flags: impl IntoIterator<Item = &'a Flag>) -> Self {
        let mut parsed = Self::default();
        for flag in flags {
            parsed.insert(flag.clone(), flag.default.clone(), false);
        }
        parsed
    }

    pub(crate) fn insert(&mut self, flag: Flag, value: FlagValue, changed: bool) {
        match self.index.get(&flag.name) {
            Some(&i) => self.entries[i] = Entry { flag, value, changed },
            None => {
                self.index.insert(flag.name.clone(), self.entries.len());
                self.entries.push(Entry { flag, value, changed });
            }
        }
    }

    pub(crate) fn set(&mut self, name: &str, value: FlagValue) -> Result<(), FlagError> {
        let i = *self
            .index
            .get(name)
            .ok_or_else(|| FlagError::Unknown(name.to_string()))?;
        let entry = &mut self.entries[i];
        if entry.value.kind() != value.kind() {
            return Err(FlagError::KindMismatch {
                name: name.to_string(),
                expected: entry.value.kind(),
                actual: value.kind(),
            });
        }
        entry.value = value;
        entry.changed = true;
        Ok(())
    }

    fn entry(&self, name: &str) -> Result<&Entry, FlagError> {
        self.index
            .get(name)
            .map(|&i| &self.entries[i])
            .ok_or_else(|| FlagError::Unknown(name.to_string()))
    }

    /// Whether the value came from argv or the environment.
    pub fn changed(&self, name: &str) -> bool {
        self.entry(name).map(|e| e.changed).unwrap_or(false)
    }

    /// Flags and values in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&Flag, &FlagValue)> {
        self.entries.iter().map(|e| (&e.flag, &e.value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn typed<T>(
        &self,
        name: &str,
        expected: FlagKind,
        extract: impl FnOnce(&FlagValue) -> Option<T>,
    ) -> Result<T, FlagError> {
        let entry = self.entry(name)?;
        extract(&entry.value).ok_or_else(|| FlagError::KindMismatch {
            name: name.to_string(),
            expected,
            actual: entry.value.kind(),
        })
    }

    pub fn must_bool(&self, name: &str) -> Result<bool, FlagError> {
        self.typed(name, FlagKind::Bool, |v| match v {
            FlagValue::Bool(b) => Some(*b),
            _ => None,
        })
    }

    pub fn must_int(&self, name: &str) -> Result<i64, FlagError> {
        self.typed(name, FlagKind::Int, |v| match v {
            FlagValue::Int(i) => Some(*i),
            _ => None,
        })
    }

    pub fn must_float(&self, name: &str) -> Result<f64, FlagError> {
        self.typed(name, FlagKind::Float, |v| match v {
            FlagValue::Float(f) => Some(*f),
            _ => None,
        })
    }

    pub fn must_duration(&self, name: &str) -> Result<Duration, FlagError> {
        self.typed(name, FlagKind::Duration, |v| match v {
            FlagValue::Duration(d) => Some(*d),
            _ => None,
        })
    }

    pub fn must_string(&self, name: &str) -> Result<String, FlagError> {
        self.typed(name, FlagKind::String, |v| match v {
            FlagValue::String(s) => Some(s.clone()),
            _ => None,
        })
    }

    pub fn must_string_list(&self, name: &str) -> Result<Vec<String>, FlagError> {
        self.typed(name, FlagKind::StringList, |v| match v {
            FlagValue::StringList(l) => Some(l.clone()),
            _ => None,
        })
    }

    /// Compiles a string flag. An empty string means "no pattern".
    pub fn must_regex(&self, name: &str) -> Result<Option<Regex>, FlagError> {
        let pattern = self.must_string(name)?;
        if pattern.is_empty() {
            return Ok(None);
        }
        Regex::new(&pattern)
            .map(Some)
            .map_err(|source| FlagError::Regex {
                name: name.to_string(),
                source,
            })
    }

    /// Picks the deprecated flag when only it was set by the operator.
    fn resolve_deprecated<'a>(&self, deprecated: &'a str, replacement: &'a str) -> &'a str {
        if self.changed(deprecated) && !self.changed(replacement) {
            deprecated
        } else {
            replacement
        }
    }

    pub fn must_deprecated_bool(&self, deprecated: &str, replacement: &str) -> Result<bool, FlagError> {
        self.must_bool(self.resolve_deprecated(deprecated, replacement))
    }

    pub fn must_deprecated_int(&self, deprecated: &str, replacement: &str) -> Result<i64, FlagError> {
        self.must_int(self.resolve_deprecated(deprecated, replacement))
    }

    pub fn must_deprecated_duration(
        &self,
        deprecated: &str,
        replacement: &str,
    ) -> Result<Duration, FlagError> {
        self.must_duration(self.resolve_deprecated(deprecated, replacement))
    }

    pub fn must_deprecated_string(&self, deprecated: &str, replacement: &str) -> Result<String, FlagError> {
        self.must_string(self.resolve_deprecated(deprecated, replacement))
    }

    pub fn must_deprecated_string_list(
        &self,
        deprecated: &str,
        replacement: &str,
    ) -> Result<Vec<String>, FlagError> {
        self.must_string_list(self.resolve_deprecated(deprecated, replacement))
    }
}
