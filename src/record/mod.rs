// dumptool/src/record/mod.rs
pub(crate) mod lifecycle;
pub(crate) mod sqlite;

pub use lifecycle::{BackupRequest, run_backup};
pub use sqlite::SqliteRecorder;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::dump::ConsistencyPoint;
use crate::errors::{AppError, Result};

/// Lifecycle state of a backup run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    Created,
    Running,
    Completed,
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Completed | RunState::Failed)
    }

    pub fn name(self) -> &'static str {
        match self {
            RunState::Created => "created",
            RunState::Running => "running",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
        }
    }
}

/// What a run backs up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunType {
    /// Every database the regex admits.
    Full,
    /// An explicit database/table selection.
    Partial,
}

/// How a run was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMethod {
    Manual,
    Scheduled,
}

/// Integer codes used in the persisted record.
pub trait StoredCode: Sized + Copy + 'static {
    const KIND: &'static str;
    const ALL: &'static [Self];

    fn code(self) -> i64;

    fn from_code(code: i64) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|v| v.code() == code)
            .ok_or(AppError::UnknownCode { kind: Self::KIND, code })
    }
}

impl StoredCode for RunState {
    const KIND: &'static str = "state";
    const ALL: &'static [Self] = &[
        RunState::Created,
        RunState::Running,
        RunState::Completed,
        RunState::Failed,
    ];

    fn code(self) -> i64 {
        match self {
            RunState::Created => 0,
            RunState::Running => 1,
            RunState::Completed => 2,
            RunState::Failed => 3,
        }
    }
}

impl StoredCode for RunType {
    const KIND: &'static str = "type";
    const ALL: &'static [Self] = &[RunType::Full, RunType::Partial];

    fn code(self) -> i64 {
        match self {
            RunType::Full => 0,
            RunType::Partial => 1,
        }
    }
}

impl StoredCode for RunMethod {
    const KIND: &'static str = "method";
    const ALL: &'static [Self] = &[RunMethod::Manual, RunMethod::Scheduled];

    fn code(self) -> i64 {
        match self {
            RunMethod::Manual => 0,
            RunMethod::Scheduled => 1,
        }
    }
}

/// Persisted description of one backup attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunRecord {
    pub id: u64,
    pub run_type: RunType,
    pub method: RunMethod,
    pub state: RunState,
    pub backup_dir: String,
    pub consistency: ConsistencyPoint,
    pub start_timestamp: DateTime<Local>,
    pub end_timestamp: Option<DateTime<Local>>,
}

/// Storage for run records.
///
/// Callers running several backups at once must serialize access per run id;
/// implementations only guarantee per-call atomicity.
#[async_trait]
pub trait Recorder: Send + Sync {
    /// Fails if a record with the same id already exists.
    async fn insert(&self, record: &RunRecord) -> Result<()>;
    async fn update(&self, record: &RunRecord) -> Result<()>;
    async fn delete(&self, id: u64) -> Result<()>;
    async fn query(&self) -> Result<Vec<RunRecord>>;
}
