//! `dbsmoke run` command handler

use std::io::Write;

use serde::Serialize;
use serde_json::Value;
use tracing::info;

use dbsmoke_core::config::DbSmokeConfig;
use dbsmoke_core::types::{Dialect, Verdict};
use dbsmoke_harness::{
    CleanupStatus, DIALECT_TABLE, LifecycleController, ProgressEvent, ProgressSender, RunOutcome,
    RunReport, combined_exit_code,
};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::cli::{OutputFormat, RunArgs};
use crate::error::CliError;
use crate::output::{OutputWriter, Render, format_secs};

/// Execute the `run` command (also the default when no subcommand is given).
///
/// Runs are sequential; with `--all` every dialect in the table is tested in
/// table order. In text mode each remote call is printed to stdout as it
/// starts and finishes. Returns the worst exit code among the runs.
pub async fn execute(
    args: RunArgs,
    config: &DbSmokeConfig,
    writer: &OutputWriter,
) -> Result<i32, CliError> {
    let dialects = select_dialects(&args, config)?;
    let preflight = args.preflight || config.api.preflight;
    let client = super::resource_client(config)?;

    info!(
        base_url = %config.api.base_url,
        dialects = ?dialects,
        preflight,
        "starting smoke runs"
    );

    let (progress, printer) = match writer.format() {
        OutputFormat::Text => {
            let (progress, rx) = ProgressSender::channel();
            let printer = tokio::spawn(write_progress(rx, std::io::stdout()));
            (progress, Some(printer))
        }
        OutputFormat::Json => (ProgressSender::disabled(), None),
    };

    let mut runs = Vec::with_capacity(dialects.len());
    for dialect in dialects {
        let controller = LifecycleController::new(client.clone(), dialect)
            .with_preflight(preflight)
            .with_progress(progress.clone());
        runs.push(controller.run().await);
    }

    // The printer exits once every sender is dropped.
    drop(progress);
    if let Some(printer) = printer {
        printer
            .await
            .map_err(|e| CliError::Command(format!("progress output task failed: {e}")))??;
        println!();
    }

    let exit_code = combined_exit_code(&runs);
    let summary = RunSummary {
        base_url: config.api.base_url.clone(),
        exit_code,
        runs,
    };
    writer.render(&summary)?;

    Ok(exit_code)
}

/// `--all`, then `--dialect`, then `[scenario] dialect`.
fn select_dialects(args: &RunArgs, config: &DbSmokeConfig) -> Result<Vec<Dialect>, CliError> {
    if args.all {
        return Ok(DIALECT_TABLE.iter().map(|row| row.dialect).collect());
    }
    let dialect = match args.dialect {
        Some(dialect) => dialect,
        None => config
            .scenario
            .dialect()
            .map_err(|e| CliError::Config(e.to_string()))?,
    };
    Ok(vec![dialect])
}

/// Write one line per progress event until every sender is dropped.
pub async fn write_progress<W: Write>(
    mut rx: UnboundedReceiver<ProgressEvent>,
    mut w: W,
) -> std::io::Result<()> {
    while let Some(event) = rx.recv().await {
        writeln!(w, "{}", format_progress(&event))?;
    }
    w.flush()
}

/// `[mysql] provision...` / `[mysql] provision ok (1.234s) <detail>`
pub fn format_progress(event: &ProgressEvent) -> String {
    use colored::Colorize;

    match event {
        ProgressEvent::StepStarted { dialect, step } => format!("[{dialect}] {step}..."),
        ProgressEvent::StepFinished {
            dialect,
            step,
            elapsed,
            ok,
            detail,
        } => {
            let status = if *ok {
                "ok".green().to_string()
            } else {
                "FAILED".red().bold().to_string()
            };
            let mut line = format!("[{dialect}] {step} {status} ({})", format_secs(*elapsed));
            if let Some(detail) = detail {
                line.push(' ');
                line.push_str(detail);
            }
            line
        }
    }
}

/// Smoke run summary for one or more dialects.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub base_url: String,
    pub exit_code: i32,
    pub runs: Vec<RunReport>,
}

impl Render for RunSummary {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        for (i, run) in self.runs.iter().enumerate() {
            if i > 0 {
                writeln!(w)?;
                writeln!(w, "{}", "=".repeat(40))?;
                writeln!(w)?;
            }
            render_run(run, &self.base_url, w)?;
        }
        if self.runs.len() > 1 {
            writeln!(w)?;
            writeln!(w, "Exit code: {}", self.exit_code)?;
        }
        Ok(())
    }
}

fn render_run(run: &RunReport, base_url: &str, w: &mut dyn Write) -> std::io::Result<()> {
    use colored::Colorize;

    writeln!(
        w,
        "{} smoke test against {}",
        run.dialect.display_name().bold(),
        base_url
    )?;
    if let Some(db_id) = &run.db_id {
        writeln!(w, "Database: {db_id}")?;
    }

    if let Some(selected) = &run.selected {
        writeln!(w)?;
        writeln!(w, "Columns: {}", selected.columns.join(", "))?;
        for row in &selected.rows {
            let cells: Vec<String> = row.iter().map(format_cell).collect();
            writeln!(w, "  {}", cells.join(" | "))?;
        }
    }

    writeln!(w)?;
    writeln!(w, "{:<14} {:>10}", "Step", "Duration")?;
    writeln!(w, "{}", "-".repeat(25))?;
    for entry in &run.timings {
        writeln!(w, "{:<14} {:>10}", entry.label, format_secs(entry.duration))?;
    }
    writeln!(w, "{}", "-".repeat(25))?;
    writeln!(w, "{:<14} {:>10}", "total", format_secs(run.total))?;
    writeln!(w)?;

    match &run.cleanup {
        CleanupStatus::Destroyed => writeln!(w, "Cleanup: {}", "database destroyed".green())?,
        CleanupStatus::NotNeeded => writeln!(w, "Cleanup: nothing to clean up")?,
        CleanupStatus::Failed { reason } => {
            writeln!(w, "Cleanup: {} {}", "WARNING".yellow().bold(), reason)?
        }
    }

    match &run.outcome {
        RunOutcome::Verified {
            verdict,
            expected_rows,
            actual_rows,
        } => {
            let line = format!("{verdict} ({actual_rows}/{expected_rows} rows)");
            match verdict {
                Verdict::Passed => writeln!(w, "Result: {}", line.green().bold())?,
                Verdict::Failed => writeln!(w, "Result: {}", line.red().bold())?,
            }
        }
        RunOutcome::PreflightFailed { error } => {
            writeln!(w, "Result: {} (preflight) {}", "ERROR".red().bold(), error)?
        }
        RunOutcome::ProvisionFailed { error } => {
            writeln!(w, "Result: {} (provision) {}", "ERROR".red().bold(), error)?
        }
        RunOutcome::ScenarioFailed { step, error } => writeln!(
            w,
            "Result: {} ({}) {}",
            "ERROR".red().bold(),
            step.as_deref().unwrap_or("scenario"),
            error
        )?,
    }

    Ok(())
}

fn format_cell(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "NULL".to_owned(),
        other => other.to_string(),
    }
}
