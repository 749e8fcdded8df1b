//! CLI argument parsing using clap derive API
//!
//! This module defines the command-line interface structure using clap's derive macros.
//! It is purely declarative with no side effects or I/O.

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};

use dbsmoke_core::types::Dialect;

/// Config file read when `--config` is not given. A missing file is not an error.
pub const DEFAULT_CONFIG_PATH: &str = "dbsmoke.toml";

/// dbsmoke -- smoke tests for the ephemeral database provisioning service.
///
/// With no subcommand, runs the scenario once for the configured dialect.
#[derive(Parser, Debug)]
#[command(name = "dbsmoke", version, about, long_about = None)]
pub struct Cli {
    /// Path to the dbsmoke.toml configuration file [default: dbsmoke.toml].
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the provisioning service base URL.
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// Config path to load, explicit or default.
    pub fn config_path(&self) -> &Path {
        self.config
            .as_deref()
            .unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH))
    }

    /// Whether `--config` was given; an explicit path must exist.
    pub fn config_is_explicit(&self) -> bool {
        self.config.is_some()
    }
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Provision a database, run the scenario, verify, and clean up.
    Run(RunArgs),

    /// Check the provisioning service health endpoint.
    Health,

    /// List supported dialects and their SQL fragments.
    Dialects,

    /// Manage configuration.
    Config(ConfigArgs),
}

// ---- run ----

/// Run the smoke scenario.
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Dialect to test (mysql, mssql; aliases mariadb, sqlserver).
    #[arg(short, long, value_parser = parse_dialect, conflicts_with = "all")]
    pub dialect: Option<Dialect>,

    /// Run every supported dialect, one after another.
    #[arg(long)]
    pub all: bool,

    /// Check service health before provisioning.
    #[arg(long)]
    pub preflight: bool,
}

fn parse_dialect(s: &str) -> Result<Dialect, String> {
    s.parse::<Dialect>().map_err(|e| e.to_string())
}

// ---- config ----

/// Manage dbsmoke configuration.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors.
    Validate,
    /// Show the effective configuration (file + env overrides + defaults).
    Show {
        /// Show only a specific section (general, api, scenario).
        #[arg(long)]
        section: Option<String>,
    },
}
