//! `dbsmoke dialects` command handler

use std::io::Write;

use serde::Serialize;

use dbsmoke_core::config::DbSmokeConfig;
use dbsmoke_harness::{ClientTimeouts, DIALECT_TABLE, DialectSql};

use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `dialects` command.
pub fn execute(config: &DbSmokeConfig, writer: &OutputWriter) -> Result<i32, CliError> {
    let timeouts = ClientTimeouts::from_config(&config.api);
    let list = DialectList {
        dialects: DIALECT_TABLE
            .iter()
            .map(|row| DialectEntry::new(row, &timeouts))
            .collect(),
    };
    writer.render(&list)?;
    Ok(0)
}

/// Supported dialects.
#[derive(Debug, Serialize)]
pub struct DialectList {
    pub dialects: Vec<DialectEntry>,
}

/// One row of the dialect table plus the provisioning timeout actually in effect.
#[derive(Debug, Serialize)]
pub struct DialectEntry {
    pub name: String,
    pub display_name: String,
    pub identity_column: String,
    pub text_type: String,
    pub timestamp_type: String,
    pub timestamp_default: String,
    pub default_provision_timeout_secs: u64,
    pub effective_provision_timeout_secs: u64,
}

impl DialectEntry {
    fn new(row: &DialectSql, timeouts: &ClientTimeouts) -> Self {
        Self {
            name: row.dialect.wire_name().to_owned(),
            display_name: row.dialect.display_name().to_owned(),
            identity_column: row.identity_column.to_owned(),
            text_type: row.text_type.to_owned(),
            timestamp_type: row.timestamp_type.to_owned(),
            timestamp_default: row.timestamp_default.to_owned(),
            default_provision_timeout_secs: row.provision_timeout.as_secs(),
            effective_provision_timeout_secs: timeouts.provision_for(row.dialect).as_secs(),
        }
    }
}

impl Render for DialectList {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "{}", "Supported dialects".bold())?;
        writeln!(w)?;
        writeln!(
            w,
            "{:<8} {:<12} {:<32} {:<14} {:<10} {:<18} {:>9}",
            "NAME", "DISPLAY", "IDENTITY", "TEXT", "TIMESTAMP", "DEFAULT", "PROVISION"
        )?;
        writeln!(w, "{}", "-".repeat(109))?;
        for d in &self.dialects {
            writeln!(
                w,
                "{:<8} {:<12} {:<32} {:<14} {:<10} {:<18} {:>8}s",
                d.name,
                d.display_name,
                d.identity_column,
                d.text_type,
                d.timestamp_type,
                d.timestamp_default,
                d.effective_provision_timeout_secs
            )?;
        }
        Ok(())
    }
}
