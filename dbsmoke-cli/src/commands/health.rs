//! `dbsmoke health` command handler

use std::io::Write;
use std::time::Duration;

use serde::Serialize;
use tracing::info;

use dbsmoke_core::config::DbSmokeConfig;
use dbsmoke_core::timing::serialize_secs;
use dbsmoke_harness::HealthReport;
use dbsmoke_harness::lifecycle::EXIT_PROVISION_ERROR;

use crate::error::CliError;
use crate::output::{OutputWriter, Render, format_secs};

/// Execute the `health` command.
///
/// Exits 0 when the service reports healthy, 3 when it is unhealthy or
/// unreachable.
pub async fn execute(config: &DbSmokeConfig, writer: &OutputWriter) -> Result<i32, CliError> {
    let client = super::resource_client(config)?;

    info!(base_url = %config.api.base_url, "checking service health");
    let (report, elapsed) = client.health().await.into_parts();
    let summary = HealthSummary::new(&config.api.base_url, report?, elapsed);

    writer.render(&summary)?;

    Ok(if summary.healthy {
        0
    } else {
        EXIT_PROVISION_ERROR
    })
}

/// Health check result.
#[derive(Debug, Serialize)]
pub struct HealthSummary {
    pub base_url: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docker: Option<String>,
    pub healthy: bool,
    #[serde(rename = "elapsed_secs", serialize_with = "serialize_secs")]
    pub elapsed: Duration,
}

impl HealthSummary {
    fn new(base_url: &str, report: HealthReport, elapsed: Duration) -> Self {
        Self {
            base_url: base_url.to_owned(),
            healthy: report.is_healthy(),
            status: report.status,
            docker: report.docker,
            elapsed,
        }
    }
}

impl Render for HealthSummary {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Service: {}", self.base_url.bold())?;
        if self.healthy {
            writeln!(w, "  Status: {}", self.status.green().bold())?;
        } else {
            writeln!(w, "  Status: {}", self.status.red().bold())?;
        }
        writeln!(
            w,
            "  Docker: {}",
            self.docker.as_deref().unwrap_or("unknown")
        )?;
        writeln!(w, "  Latency: {}", format_secs(self.elapsed))?;
        Ok(())
    }
}
