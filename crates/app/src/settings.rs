//! Configuration resolution for the console client

use lobby_core::{ClientConfig, Error, Result};

const ENV_HOST: &str = "LOBBY_HOST";
const ENV_PORT: &str = "LOBBY_PORT";

/// Config file, then environment, then positional `host [port]` arguments
pub fn resolve(args: impl Iterator<Item = String>) -> Result<ClientConfig> {
    let mut config = match ClientConfig::default_path() {
        Some(path) => ClientConfig::load_or_default(&path)?,
        None => ClientConfig::default(),
    };

    apply_overrides(
        &mut config,
        std::env::var(ENV_HOST).ok(),
        std::env::var(ENV_PORT).ok(),
    )?;

    let mut args = args;
    apply_overrides(&mut config, args.next(), args.next())?;

    tracing::debug!(
        host = %config.host,
        port = config.port,
        transport = ?config.transport,
        "Configuration resolved"
    );
    Ok(config)
}

fn apply_overrides(
    config: &mut ClientConfig,
    host: Option<String>,
    port: Option<String>,
) -> Result<()> {
    if let Some(host) = host.filter(|h| !h.is_empty()) {
        config.host = host;
    }
    if let Some(port) = port.filter(|p| !p.is_empty()) {
        config.port = port
            .parse()
            .map_err(|_| Error::Config(format!("Invalid port: {}", port)))?;
    }
    Ok(())
}
