//! CLI-specific error types and exit code mapping

use dbsmoke_core::error::DbSmokeError;
use dbsmoke_harness::HarnessError;

/// Exit code for errors that are neither a verdict nor a classified failure.
pub const EXIT_UNRECOVERED_ERROR: i32 = 5;

/// CLI-specific error type.
///
/// Each variant carries enough context for a user-friendly message.
/// The `exit_code()` method maps errors to process exit codes.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// The service could not provision a database or failed its health check.
    #[error("provisioning error: {0}")]
    Provision(String),

    /// A scenario step failed against a provisioned database.
    #[error("scenario error: {0}")]
    Scenario(String),

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (file read, stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped domain error from dbsmoke-core.
    #[error("{0}")]
    Core(#[from] DbSmokeError),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                                |
    /// |------|----------------------------------------|
    /// | 0    | Scenario passed                        |
    /// | 1    | Row count mismatch                     |
    /// | 2    | Configuration error                    |
    /// | 3    | Provisioning or health check failure   |
    /// | 4    | Scenario (query) failure               |
    /// | 5    | Other unrecovered error                |
    /// | 10   | IO error                               |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            Self::Provision(_) => 3,
            Self::Scenario(_) => 4,
            Self::Io(_) => 10,
            Self::Core(DbSmokeError::Config(_)) => 2,
            Self::Core(DbSmokeError::Io(_)) => 10,
            Self::JsonSerialize(_) | Self::Command(_) | Self::Core(_) => EXIT_UNRECOVERED_ERROR,
        }
    }
}

impl From<HarnessError> for CliError {
    fn from(e: HarnessError) -> Self {
        match e.root() {
            HarnessError::Provision { .. } | HarnessError::Health { .. } => {
                Self::Provision(e.to_string())
            }
            HarnessError::Query { .. } => Self::Scenario(e.to_string()),
            HarnessError::UnsupportedDialect(_) => Self::Config(e.to_string()),
            _ => Self::Command(e.to_string()),
        }
    }
}
