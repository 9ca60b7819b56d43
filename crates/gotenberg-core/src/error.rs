use thiserror::Error;

use crate::context::InstantiationError;
use crate::flags::FlagError;
use crate::module::ModuleId;
use crate::registry::RegistrationError;

/// Everything that ends a run early or with a non-zero exit code.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Registration(#[from] RegistrationError),

    #[error(transparent)]
    Flags(#[from] FlagError),

    #[error(transparent)]
    Instantiation(#[from] InstantiationError),

    #[error("starting {id}: {source}")]
    Start {
        id: ModuleId,
        #[source]
        source: anyhow::Error,
    },

    #[error("stopping {id}: {source}")]
    Stop {
        id: ModuleId,
        #[source]
        source: anyhow::Error,
    },

    #[error("installing signal handlers: {0}")]
    Signals(#[source] std::io::Error),
}

impl BootstrapError {
    /// `0` for `--help`, `1` otherwise.
    pub fn exit_code(&self) -> i32 {
        match self {
            BootstrapError::Flags(FlagError::Parse(err)) if !err.use_stderr() => 0,
            _ => 1,
        }
    }

    /// The text to show the operator before exiting.
    ///
    /// Argument errors and help keep clap's own rendering; everything else is
    /// a single `[FATAL]` line.
    pub fn report(&self) -> String {
        match self {
            BootstrapError::Flags(FlagError::Parse(err)) => err.render().to_string(),
            _ => format!("[FATAL] {self}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn start_failure_names_the_module() {
        let err = BootstrapError::Start {
            id: ModuleId::new("api"),
            source: anyhow!("address already in use"),
        };

        assert_eq!(err.to_string(), "starting api: address already in use");
        assert_eq!(err.report(), "[FATAL] starting api: address already in use");
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn registration_failure_is_fatal() {
        let err = BootstrapError::from(RegistrationError::DuplicateId(ModuleId::new("api")));

        assert_eq!(err.report(), "[FATAL] module api is already registered");
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn help_exits_successfully() {
        let help = clap::Command::new("gotenberg")
            .try_get_matches_from(["gotenberg", "--help"])
            .unwrap_err();
        let err = BootstrapError::from(FlagError::Parse(help));

        assert_eq!(err.exit_code(), 0);
        assert!(err.report().contains("Usage"));
    }
}
