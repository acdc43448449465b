use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Step of a backup run an error was raised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Build,
    Record,
    Dump,
    Metadata,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Build => "build",
            Phase::Record => "record",
            Phase::Dump => "dump",
            Phase::Metadata => "metadata",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Executable not found: '{path}'")]
    ExecutableNotFound { path: String },

    #[error("No database selected: tables can only be added after at least one database")]
    NoDatabaseSelected,

    #[error("Output directory is empty; cannot build a dump invocation")]
    MissingOutputDirectory,

    #[error("{tool} exited with status {}: {stderr}", display_status(.exit_status))]
    ExternalToolFailed {
        tool: String,
        exit_status: Option<i32>,
        stderr: String,
    },

    #[error("{tool} did not finish within {secs} seconds")]
    ToolTimedOut { tool: String, secs: u64 },

    #[error("Metadata file {} could not be opened: {source}", path.display())]
    MetadataFileUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Run {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: u64,
        from: &'static str,
        to: &'static str,
    },

    #[error("Unknown {kind} code {code} in stored run record")]
    UnknownCode { kind: &'static str, code: i64 },

    #[error("Run {id} failed during {phase}: {source}")]
    Run {
        id: u64,
        phase: Phase,
        #[source]
        source: Box<AppError>,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl AppError {
    /// Wraps an error with the run identifier and phase it belongs to.
    pub fn in_run(self, id: u64, phase: Phase) -> Self {
        AppError::Run {
            id,
            phase,
            source: Box::new(self),
        }
    }
}

fn display_status(status: &Option<i32>) -> String {
    match status {
        Some(code) => code.to_string(),
        None => "<terminated by signal>".to_string(),
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_error_names_id_and_phase() {
        let err = AppError::MissingOutputDirectory.in_run(42, Phase::Build);
        let message = err.to_string();
        assert!(message.contains("Run 42"));
        assert!(message.contains("build"));
    }

    #[test]
    fn test_tool_failure_without_exit_code() {
        let err = AppError::ExternalToolFailed {
            tool: "mydumper".to_string(),
            exit_status: None,
            stderr: "killed".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "mydumper exited with status <terminated by signal>: killed"
        );
    }
}
