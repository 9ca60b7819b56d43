use std::process;

use gotenberg_core::bootstrap::DEFAULT_VERSION;
use gotenberg_core::{Bootstrap, BootstrapError, Registry};

mod logging;

use logging::Logging;

/// Set at image build time.
const VERSION: &str = match option_env!("GOTENBERG_VERSION") {
    Some(version) => version,
    None => DEFAULT_VERSION,
};

fn registry() -> Result<Registry, BootstrapError> {
    let mut registry = Registry::new();
    registry.register_module(&Logging::default())?;
    Ok(registry)
}

#[tokio::main]
async fn main() {
    let code = match registry() {
        Ok(registry) => Bootstrap::new(registry).version(VERSION).execute().await,
        Err(err) => {
            println!("{}", err.report());
            err.exit_code()
        }
    };

    process::exit(code);
}
