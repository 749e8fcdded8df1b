//! Command handlers -- one module per subcommand

pub mod config;
pub mod dialects;
pub mod health;
pub mod run;

use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use dbsmoke_core::config::{DbSmokeConfig, GeneralConfig};
use dbsmoke_harness::{ClientTimeouts, HttpProvisioningClient, ResourceClient};

use crate::cli::{Cli, Commands, RunArgs};
use crate::error::CliError;
use crate::logging;
use crate::output::OutputWriter;

/// Where the configuration comes from, plus the CLI flags that override it.
#[derive(Debug, Clone)]
pub struct ConfigSource {
    pub path: PathBuf,
    /// An explicit `--config` path must exist; the default path may be absent.
    pub explicit: bool,
    pub base_url: Option<String>,
    pub log_level: Option<String>,
}

impl ConfigSource {
    pub fn from_cli(cli: &Cli) -> Self {
        Self {
            path: cli.config_path().to_path_buf(),
            explicit: cli.config_is_explicit(),
            base_url: cli.base_url.clone(),
            log_level: cli.log_level.clone(),
        }
    }

    /// Load file + env overrides + CLI overrides, then validate once.
    pub async fn load(&self) -> Result<DbSmokeConfig, CliError> {
        let mut config = if self.explicit {
            DbSmokeConfig::load_unvalidated(&self.path).await?
        } else {
            DbSmokeConfig::load_or_default_unvalidated(&self.path).await?
        };

        if let Some(base_url) = &self.base_url {
            config.api.base_url = base_url.clone();
        }
        if let Some(level) = &self.log_level {
            config.general.log_level = level.clone();
        }
        config.validate()?;

        debug!(path = %self.path.display(), base_url = %config.api.base_url, "configuration loaded");
        Ok(config)
    }
}

/// Build the HTTP-backed resource client from `[api]`.
pub fn resource_client(
    config: &DbSmokeConfig,
) -> Result<ResourceClient<HttpProvisioningClient>, CliError> {
    let api = HttpProvisioningClient::new(&config.api.base_url)?;
    Ok(ResourceClient::new(
        Arc::new(api),
        ClientTimeouts::from_config(&config.api),
    ))
}

/// Route the parsed command line to its handler and return the exit code.
pub async fn dispatch(cli: Cli) -> Result<i32, CliError> {
    let writer = OutputWriter::new(cli.output);
    let source = ConfigSource::from_cli(&cli);

    match cli.command {
        Some(Commands::Config(args)) => {
            // Logging uses defaults so an invalid file can still be reported.
            let general = GeneralConfig {
                log_level: source
                    .log_level
                    .clone()
                    .unwrap_or_else(|| "warn".to_owned()),
                ..GeneralConfig::default()
            };
            logging::init_tracing(&general)?;
            config::execute(args, &source, &writer).await?;
            Ok(0)
        }
        Some(Commands::Health) => {
            let config = prepare(&source).await?;
            health::execute(&config, &writer).await
        }
        Some(Commands::Dialects) => {
            let config = prepare(&source).await?;
            dialects::execute(&config, &writer)
        }
        Some(Commands::Run(args)) => {
            let config = prepare(&source).await?;
            run::execute(args, &config, &writer).await
        }
        None => {
            let config = prepare(&source).await?;
            run::execute(RunArgs::default(), &config, &writer).await
        }
    }
}

async fn prepare(source: &ConfigSource) -> Result<DbSmokeConfig, CliError> {
    let config = source.load().await?;
    logging::init_tracing(&config.general)?;
    dbsmoke_core::metrics::describe_all();
    Ok(config)
}
