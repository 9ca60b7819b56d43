//! Merges module flag sets, parses argv with clap, then overlays the
//! environment.

use std::collections::HashMap;
use std::ffi::OsString;
use std::time::Duration;

use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use tracing::{debug, warn};

use super::FlagError;
use super::duration::parse_duration;
use super::parsed::ParsedFlags;
use super::set::{Flag, FlagKind, FlagSet, FlagValue, parse_bool, split_list};

/// Upper bound of the shutdown phase.
pub const GRACEFUL_SHUTDOWN_DURATION: &str = "gotenberg-graceful-shutdown-duration";

/// Whether debug contributors run at startup.
pub const BUILD_DEBUG_DATA: &str = "gotenberg-build-debug-data";

const DEFAULT_GRACEFUL_SHUTDOWN: Duration = Duration::from_secs(30);

/// The flags every process carries regardless of its modules.
pub fn builtin_flags() -> FlagSet {
    FlagSet::new("gotenberg")
        .duration(
            GRACEFUL_SHUTDOWN_DURATION,
            DEFAULT_GRACEFUL_SHUTDOWN,
            "Set the graceful shutdown duration",
        )
        .bool(BUILD_DEBUG_DATA, true, "Set if build data is needed")
}

/// Where environment overrides are read from.
#[derive(Debug, Clone, Default)]
pub enum Environment {
    /// The real process environment.
    #[default]
    Process,
    /// A fixed set of variables, typically in tests or when embedding.
    Map(HashMap<String, String>),
}

impl Environment {
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Environment::Map(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    pub fn lookup(&self, name: &str) -> Option<String> {
        match self {
            Environment::Process => std::env::var(name).ok(),
            Environment::Map(vars) => vars.get(name).cloned(),
        }
    }
}

/// Builds the single parse surface out of the built-in flags and every
/// module's flag set.
#[derive(Debug, Clone)]
pub struct FlagBinder {
    root: FlagSet,
}

impl FlagBinder {
    /// A binder holding only the built-in flags.
    pub fn new() -> Self {
        Self {
            root: builtin_flags(),
        }
    }

    /// Merges a module's flags. A name already on the surface is fatal.
    pub fn add(&mut self, flags: &FlagSet) -> Result<(), FlagError> {
        // clap owns --help.
        if flags.get("help").is_some() {
            return Err(FlagError::Duplicate("help".to_string()));
        }
        self.root.merge(flags).map_err(FlagError::Duplicate)
    }

    pub fn flags(&self) -> &FlagSet {
        &self.root
    }

    /// The clap command equivalent of the merged surface.
    pub fn command(&self) -> Command {
        self.root.flags().iter().fold(
            Command::new(self.root.name().to_string())
                .no_binary_name(true)
                .disable_version_flag(true)
                .about("A containerized API for seamless PDF conversion."),
            |cmd, flag| cmd.arg(arg_for(flag)),
        )
    }

    /// Parses `args` (program name excluded), then applies environment
    /// overrides on top of the command-line values.
    pub fn bind<I, T>(&self, args: I, env: &Environment) -> Result<ParsedFlags, FlagError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = self.command().try_get_matches_from(args)?;
        let mut parsed = ParsedFlags::from_defaults(self.root.flags());

        for flag in self.root.flags() {
            if let Some(value) = value_from_matches(&matches, flag) {
                if let Some(message) = &flag.deprecated {
                    warn!(flag = %flag.name, "flag is deprecated: {message}");
                }
                parsed.set(&flag.name, value)?;
            }
        }

        for flag in self.root.flags() {
            let env_name = flag.env_name();
            let Some(raw) = env.lookup(&env_name) else {
                continue;
            };

            // Lists are replaced, never appended to.
            let value = if flag.kind().is_list() {
                FlagValue::StringList(split_list(&raw))
            } else {
                FlagValue::parse(flag.kind(), &raw).map_err(|reason| FlagError::EnvOverride {
                    env: env_name.clone(),
                    value: raw.clone(),
                    reason,
                })?
            };

            debug!(flag = %flag.name, env = %env_name, "flag overridden from environment");
            if let Some(message) = &flag.deprecated {
                warn!(flag = %flag.name, env = %env_name, "flag is deprecated: {message}");
            }
            parsed.set(&flag.name, value)?;
        }

        Ok(parsed)
    }
}

impl Default for FlagBinder {
    fn default() -> Self {
        Self::new()
    }
}

fn arg_for(flag: &Flag) -> Arg {
    let arg = Arg::new(flag.name.clone())
        .long(flag.name.clone())
        .help(format!("{} (default {})", flag.usage, flag.default))
        .value_name(flag.kind().as_str())
        .action(ArgAction::Append)
        .hide(flag.deprecated.is_some());

    match flag.kind() {
        FlagKind::Bool => arg
            .num_args(0..=1)
            .require_equals(true)
            .default_missing_value("true")
            .value_parser(parse_bool),
        FlagKind::Int => arg
            .num_args(1)
            .allow_negative_numbers(true)
            .value_parser(value_parser!(i64)),
        FlagKind::Float => arg
            .num_args(1)
            .allow_negative_numbers(true)
            .value_parser(value_parser!(f64)),
        FlagKind::Duration => arg.num_args(1).value_parser(parse_duration),
        FlagKind::String => arg
            .num_args(1)
            .allow_hyphen_values(true)
            .value_parser(value_parser!(String)),
        FlagKind::StringList => arg
            .num_args(1)
            .value_delimiter(',')
            .value_parser(value_parser!(String)),
    }
}

fn last<T: Clone + Send + Sync + 'static>(matches: &ArgMatches, id: &str) -> Option<T> {
    matches.get_many::<T>(id).and_then(|values| values.last().cloned())
}

/// The command-line value of `flag`, if it was given. Repeated scalar flags
/// keep the last occurrence; list flags collect every occurrence.
fn value_from_matches(matches: &ArgMatches, flag: &Flag) -> Option<FlagValue> {
    let id = flag.name.as_str();
    match flag.kind() {
        FlagKind::Bool => last::<bool>(matches, id).map(FlagValue::Bool),
        FlagKind::Int => last::<i64>(matches, id).map(FlagValue::Int),
        FlagKind::Float => last::<f64>(matches, id).map(FlagValue::Float),
        FlagKind::Duration => last::<Duration>(matches, id).map(FlagValue::Duration),
        FlagKind::String => last::<String>(matches, id).map(FlagValue::String),
        FlagKind::StringList => matches
            .get_many::<String>(id)
            .map(|values| FlagValue::StringList(values.cloned().collect())),
    }
}
