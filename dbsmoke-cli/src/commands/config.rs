//! `dbsmoke config` command handler

use std::io::Write;

use serde::Serialize;
use tracing::info;

use crate::cli::{ConfigAction, ConfigArgs};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

use super::ConfigSource;

/// Section names accepted by `config show --section`.
const SECTIONS: [&str; 3] = ["general", "api", "scenario"];

/// Execute the `config` command.
pub async fn execute(
    args: ConfigArgs,
    source: &ConfigSource,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    match args.action {
        ConfigAction::Validate => execute_validate(source, writer).await,
        ConfigAction::Show { section } => execute_show(source, section, writer).await,
    }
}

/// Load and validate the configuration, reporting any error.
///
/// # Errors
///
/// Returns `CliError::Config` if the file is missing (when given explicitly),
/// cannot be parsed, or fails validation.
async fn execute_validate(source: &ConfigSource, writer: &OutputWriter) -> Result<(), CliError> {
    info!(path = %source.path.display(), "validating configuration");

    let report = match source.load().await {
        Ok(_) => ConfigValidationReport {
            source: source.path.display().to_string(),
            valid: true,
            errors: Vec::new(),
        },
        Err(e) => ConfigValidationReport {
            source: source.path.display().to_string(),
            valid: false,
            errors: vec![e.to_string()],
        },
    };

    writer.render(&report)?;

    if !report.valid {
        return Err(CliError::Config("configuration is invalid".to_owned()));
    }

    Ok(())
}

/// Display the effective configuration (file + env overrides + CLI flags + defaults).
///
/// Credentials embedded in `api.base_url` are redacted.
async fn execute_show(
    source: &ConfigSource,
    section: Option<String>,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    info!(path = %source.path.display(), "loading configuration");

    let mut config = source.load().await?;
    config.api.base_url = redact_url(&config.api.base_url);

    let config_toml = match section.as_deref() {
        None => toml::to_string_pretty(&config),
        Some("general") => toml::to_string_pretty(&config.general),
        Some("api") => toml::to_string_pretty(&config.api),
        Some("scenario") => toml::to_string_pretty(&config.scenario),
        Some(other) => {
            return Err(CliError::Command(format!(
                "unknown section: {} (expected: {})",
                other,
                SECTIONS.join(", ")
            )));
        }
    }
    .unwrap_or_else(|e| format!("(serialization error: {})", e));

    let report = ConfigReport {
        source: source.path.display().to_string(),
        section,
        config_toml,
    };
    writer.render(&report)?;

    Ok(())
}

/// Replace `user:password@` in a URL with `***REDACTED***@`.
fn redact_url(url: &str) -> String {
    let Some(scheme_end) = url.find("://") else {
        return url.to_owned();
    };
    let scheme = &url[..scheme_end + 3];
    let rest = &url[scheme_end + 3..];

    match rest.find('@') {
        Some(at_pos) if rest.find('/').is_none_or(|slash| at_pos < slash) => {
            format!("{}***REDACTED***{}", scheme, &rest[at_pos..])
        }
        _ => url.to_owned(),
    }
}

/// Configuration display report.
///
/// `config_toml` is only used for text rendering.
#[derive(Serialize)]
pub struct ConfigReport {
    /// Configuration file path
    pub source: String,
    /// Optional section name (None = full config)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(skip)]
    pub config_toml: String,
}

impl Render for ConfigReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        if let Some(ref section) = self.section {
            let section_label = format!("[{}]", section);
            writeln!(
                w,
                "Configuration {} (source: {})",
                section_label.bold(),
                self.source
            )?;
        } else {
            writeln!(w, "Configuration (source: {})", self.source.bold())?;
        }

        writeln!(w)?;
        write!(w, "{}", self.config_toml)?;

        Ok(())
    }
}

/// Configuration validation report.
#[derive(Serialize)]
pub struct ConfigValidationReport {
    /// Configuration file path
    pub source: String,
    pub valid: bool,
    /// Validation error messages (empty if valid)
    pub errors: Vec<String>,
}

impl Render for ConfigValidationReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Config Validation: {}", self.source.bold())?;

        if self.valid {
            writeln!(w, "  Result: {}", "VALID".green().bold())?;
        } else {
            writeln!(w, "  Result: {}", "INVALID".red().bold())?;
            for err in &self.errors {
                writeln!(w, "  Error: {}", err.red())?;
            }
        }

        Ok(())
    }
}
