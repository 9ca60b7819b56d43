//! Configuration surface: flag declarations, argv/environment binding and
//! the typed read-only view modules provision from.
//!
//! ```text
//! builtin FlagSet ─┐
//! module FlagSets ─┴─► FlagBinder ──argv──► clap ──env overlay──► ParsedFlags
//! ```
//!
//! Environment variables win over command-line values. A list flag set from
//! the environment replaces its current value instead of appending to it.

pub mod binder;
pub mod duration;
pub mod parsed;
pub mod set;

pub use self::binder::{
    BUILD_DEBUG_DATA, Environment, FlagBinder, GRACEFUL_SHUTDOWN_DURATION, builtin_flags,
};
pub use self::duration::{DurationError, format_duration, parse_duration};
pub use self::parsed::ParsedFlags;
pub use self::set::{Flag, FlagKind, FlagSet, FlagValue, env_name};

/// Errors raised while declaring, binding or reading flags.
#[derive(Debug, thiserror::Error)]
pub enum FlagError {
    #[error("unknown flag {0:?}")]
    Unknown(String),

    #[error("flag {name:?} is a {actual} flag, not a {expected} flag")]
    KindMismatch {
        name: String,
        expected: FlagKind,
        actual: FlagKind,
    },

    #[error("flag {0:?} is declared more than once")]
    Duplicate(String),

    #[error(transparent)]
    Parse(#[from] clap::Error),

    #[error("invalid overriding value '{value}' from {env}: {reason}")]
    EnvOverride {
        env: String,
        value: String,
        reason: String,
    },

    #[error("flag {name:?} is not a valid regular expression: {source}")]
    Regex {
        name: String,
        #[source]
        source: regex::Error,
    },
}
