//! The built-in `logging` module: turns `log-level` and `log-format` into a
//! `tracing` subscriber.

use std::sync::Arc;

use anyhow::{Context as _, bail};
use gotenberg_core::flags::FlagSet;
use gotenberg_core::{Context, Debuggable, Module, ModuleDescriptor, Provisioner, SystemLogger};
use serde::Serialize;
use serde_json::json;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

const ID: &str = "logging";
const LOG_LEVEL: &str = "log-level";
const LOG_FORMAT: &str = "log-format";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "text" => Ok(LogFormat::Text),
            "compact" => Ok(LogFormat::Compact),
            other => bail!("unknown log format {other:?}, expected text or compact"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Logging {
    level: Level,
    format: LogFormat,
    /// False when another subscriber was already installed.
    installed: bool,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Text,
            installed: false,
        }
    }
}

impl Logging {
    fn flags() -> FlagSet {
        FlagSet::new(ID)
            .string(
                LOG_LEVEL,
                "info",
                "Choose the level of logging detail. Options include error, warn, info, debug or trace",
            )
            .string(
                LOG_FORMAT,
                "text",
                "Specify the format of logging. Options include text or compact",
            )
    }

    /// `RUST_LOG` wins over `log-level` when set.
    fn install(&self) -> bool {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.level.as_str().to_lowercase()));
        let registry = tracing_subscriber::registry().with(filter);
        let result = match self.format {
            LogFormat::Text => registry.with(fmt::layer()).try_init(),
            LogFormat::Compact => registry.with(fmt::layer().compact()).try_init(),
        };
        result.is_ok()
    }
}

impl Module for Logging {
    fn descriptor(&self) -> ModuleDescriptor {
        ModuleDescriptor::new(ID, || Box::new(Logging::default())).with_flags(Logging::flags())
    }

    fn as_provisioner(&mut self) -> Option<&mut dyn Provisioner> {
        Some(self)
    }

    fn as_system_logger(self: Arc<Self>) -> Option<Arc<dyn SystemLogger>> {
        Some(self)
    }

    fn as_debuggable(self: Arc<Self>) -> Option<Arc<dyn Debuggable>> {
        Some(self)
    }
}

impl Provisioner for Logging {
    fn provision(&mut self, ctx: &Context) -> anyhow::Result<()> {
        let flags = ctx.flags();

        let level = flags.must_string(LOG_LEVEL)?;
        self.level = level
            .parse()
            .with_context(|| format!("invalid log level {level:?}"))?;
        self.format = flags.must_string(LOG_FORMAT)?.parse()?;

        self.installed = self.install();
        if !self.installed {
            tracing::debug!("a tracing subscriber is already installed");
        }
        Ok(())
    }
}

impl SystemLogger for Logging {
    fn system_messages(&self) -> Vec<String> {
        vec![format!(
            "log level set to {}",
            self.level.as_str().to_lowercase()
        )]
    }
}

impl Debuggable for Logging {
    fn debug(&self) -> serde_json::Value {
        json!({
            "level": self.level.as_str().to_lowercase(),
            "format": self.format,
            "installed": self.installed,
        })
    }
}
