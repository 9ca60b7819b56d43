//! Flag declarations: what a module accepts on the command line.

use std::fmt;
use std::time::Duration;

use super::duration::{format_duration, parse_duration};

/// The value kind of a flag. Parsing of both argv and environment values is
/// driven by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagKind {
    Bool,
    Int,
    Float,
    Duration,
    String,
    StringList,
}

impl FlagKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlagKind::Bool => "bool",
            FlagKind::Int => "int",
            FlagKind::Float => "float",
            FlagKind::Duration => "duration",
            FlagKind::String => "string",
            FlagKind::StringList => "string-list",
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, FlagKind::StringList)
    }
}

impl fmt::Display for FlagKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed flag value.
#[derive(Debug, Clone, PartialEq)]
pub enum FlagValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Duration(Duration),
    String(String),
    StringList(Vec<String>),
}

impl FlagValue {
    pub fn kind(&self) -> FlagKind {
        match self {
            FlagValue::Bool(_) => FlagKind::Bool,
            FlagValue::Int(_) => FlagKind::Int,
            FlagValue::Float(_) => FlagKind::Float,
            FlagValue::Duration(_) => FlagKind::Duration,
            FlagValue::String(_) => FlagKind::String,
            FlagValue::StringList(_) => FlagKind::StringList,
        }
    }

    /// Parses a raw string as a value of `kind`.
    ///
    /// List values are split on `,`; an empty input yields an empty list.
    pub fn parse(kind: FlagKind, raw: &str) -> Result<FlagValue, String> {
        match kind {
            FlagKind::Bool => parse_bool(raw).map(FlagValue::Bool),
            FlagKind::Int => raw
                .trim()
                .parse::<i64>()
                .map(FlagValue::Int)
                .map_err(|e| e.to_string()),
            FlagKind::Float => raw
                .trim()
                .parse::<f64>()
                .map(FlagValue::Float)
                .map_err(|e| e.to_string()),
            FlagKind::Duration => parse_duration(raw.trim())
                .map(FlagValue::Duration)
                .map_err(|e| e.to_string()),
            FlagKind::String => Ok(FlagValue::String(raw.to_string())),
            FlagKind::StringList => Ok(FlagValue::StringList(split_list(raw))),
        }
    }
}

impl fmt::Display for FlagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlagValue::Bool(v) => write!(f, "{v}"),
            FlagValue::Int(v) => write!(f, "{v}"),
            FlagValue::Float(v) => write!(f, "{v}"),
            FlagValue::Duration(v) => f.write_str(&format_duration(*v)),
            FlagValue::String(v) => f.write_str(v),
            FlagValue::StringList(v) => write!(f, "[{}]", v.join(",")),
        }
    }
}

/// Accepts the spellings operators commonly use in container environments.
pub(crate) fn parse_bool(raw: &str) -> Result<bool, String> {
    match raw.trim() {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Ok(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Ok(false),
        other => Err(format!("invalid boolean {other:?}")),
    }
}

pub(crate) fn split_list(raw: &str) -> Vec<String> {
    if raw.is_empty() {
        return Vec::new();
    }
    raw.split(',').map(str::to_string).collect()
}

/// One flag declaration.
#[derive(Debug, Clone)]
pub struct Flag {
    pub name: String,
    pub default: FlagValue,
    pub usage: String,
    /// Set when the flag is kept only for backward compatibility.
    pub deprecated: Option<String>,
}

impl Flag {
    pub fn kind(&self) -> FlagKind {
        self.default.kind()
    }

    /// `some-flag-name` -> `SOME_FLAG_NAME`.
    pub fn env_name(&self) -> String {
        env_name(&self.name)
    }
}

pub fn env_name(flag_name: &str) -> String {
    flag_name.replace('-', "_").to_uppercase()
}

/// A named bundle of flag declarations, contributed by one module.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use gotenberg_core::flags::FlagSet;
///
/// let fs = FlagSet::new("api")
///     .int("api-port", 3000, "Set the port on which the API should listen")
///     .duration("api-timeout", Duration::from_secs(30), "Set the time limit for requests")
///     .string_list("api-allowed-hosts", &["localhost"], "Set the hosts allowed to call the API");
/// assert_eq!(fs.len(), 3);
/// ```
#[derive(Debug, Clone, Default)]
pub struct FlagSet {
    name: String,
    flags: Vec<Flag>,
}

impl FlagSet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            flags: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Adds a flag. Duplicate names within one set are caught at registration.
    pub fn flag(mut self, name: impl Into<String>, default: FlagValue, usage: impl Into<String>) -> Self {
        self.flags.push(Flag {
            name: name.into(),
            default,
            usage: usage.into(),
            deprecated: None,
        });
        self
    }

    pub fn bool(self, name: impl Into<String>, default: bool, usage: impl Into<String>) -> Self {
        self.flag(name, FlagValue::Bool(default), usage)
    }

    pub fn int(self, name: impl Into<String>, default: i64, usage: impl Into<String>) -> Self {
        self.flag(name, FlagValue::Int(default), usage)
    }

    pub fn float(self, name: impl Into<String>, default: f64, usage: impl Into<String>) -> Self {
        self.flag(name, FlagValue::Float(default), usage)
    }

    pub fn duration(self, name: impl Into<String>, default: Duration, usage: impl Into<String>) -> Self {
        self.flag(name, FlagValue::Duration(default), usage)
    }

    pub fn string(self, name: impl Into<String>, default: impl Into<String>, usage: impl Into<String>) -> Self {
        self.flag(name, FlagValue::String(default.into()), usage)
    }

    pub fn string_list(self, name: impl Into<String>, default: &[&str], usage: impl Into<String>) -> Self {
        let default = default.iter().map(|s| s.to_string()).collect();
        self.flag(name, FlagValue::StringList(default), usage)
    }

    /// Marks an already declared flag as deprecated. Unknown names are ignored.
    pub fn deprecate(mut self, name: &str, message: impl Into<String>) -> Self {
        if let Some(flag) = self.flags.iter_mut().find(|f| f.name == name) {
            flag.deprecated = Some(message.into());
        }
        self
    }

    pub fn flags(&self) -> &[Flag] {
        &self.flags
    }

    pub fn get(&self, name: &str) -> Option<&Flag> {
        self.flags.iter().find(|f| f.name == name)
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    /// Appends every flag of `other`, stopping at the first name already present.
    pub fn merge(&mut self, other: &FlagSet) -> Result<(), String> {
        for flag in &other.flags {
            if self.get(&flag.name).is_some() {
                return Err(flag.name.clone());
            }
            self.flags.push(flag.clone());
        }
        Ok(())
    }
}
