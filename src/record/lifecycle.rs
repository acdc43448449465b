// dumptool/src/record/lifecycle.rs
//! State machine for one backup attempt and the orchestration around it.
//!
//! `Created -> Running -> Completed | Failed`. The recorder sees an insert on
//! `Created` and one update on the terminal state; `Running` is only persisted
//! when the caller asks for it.

use chrono::Local;
use tracing::{error, info, warn};

use super::{Recorder, RunMethod, RunRecord, RunState, RunType};
use crate::dump::{self, ConsistencyPoint, DumpConfig, build_dump_args};
use crate::errors::{AppError, Phase, Result};
use crate::runner::ProcessRunner;

/// Owns the record of one backup attempt while it is in flight.
#[derive(Debug)]
pub struct BackupRun {
    record: RunRecord,
}

impl BackupRun {
    /// Enters `Created` and inserts the record.
    pub async fn create(
        recorder: &dyn Recorder,
        id: u64,
        run_type: RunType,
        method: RunMethod,
        backup_dir: impl Into<String>,
    ) -> Result<Self> {
        let record = RunRecord {
            id,
            run_type,
            method,
            state: RunState::Created,
            backup_dir: backup_dir.into(),
            consistency: ConsistencyPoint::default(),
            start_timestamp: Local::now(),
            end_timestamp: None,
        };
        recorder.insert(&record).await?;
        info!(id, backup_dir = %record.backup_dir, "Backup run created");
        Ok(BackupRun { record })
    }

    pub fn record(&self) -> &RunRecord {
        &self.record
    }

    fn check_transition(&self, to: RunState) -> Result<()> {
        let from = self.record.state;
        let allowed = matches!(
            (from, to),
            (RunState::Created, RunState::Running)
                | (RunState::Running, RunState::Completed)
                | (RunState::Running, RunState::Failed)
        );
        if !allowed {
            return Err(AppError::InvalidTransition {
                id: self.record.id,
                from: from.name(),
                to: to.name(),
            });
        }
        Ok(())
    }

    /// Persists `next` and adopts it. A failed update leaves the run unchanged.
    async fn commit(&mut self, recorder: &dyn Recorder, next: RunRecord) -> Result<()> {
        recorder.update(&next).await?;
        self.record = next;
        Ok(())
    }

    /// Enters `Running`, meaning the launch of the dump tool has been requested.
    /// Persisted only when `persist` is set.
    pub async fn mark_running(&mut self, recorder: &dyn Recorder, persist: bool) -> Result<()> {
        self.check_transition(RunState::Running)?;
        let mut next = self.record.clone();
        next.state = RunState::Running;
        if persist {
            self.commit(recorder, next).await
        } else {
            self.record = next;
            Ok(())
        }
    }

    /// Enters `Completed`, storing the consistency point.
    pub async fn complete(
        &mut self,
        recorder: &dyn Recorder,
        point: ConsistencyPoint,
    ) -> Result<RunRecord> {
        self.check_transition(RunState::Completed)?;
        let mut next = self.record.clone();
        next.state = RunState::Completed;
        next.consistency = point;
        next.end_timestamp = Some(Local::now());
        self.commit(recorder, next).await?;
        info!(
            id = self.record.id,
            binlog_file = %self.record.consistency.binlog_file_name,
            binlog_pos = self.record.consistency.binlog_file_pos,
            "Backup run completed"
        );
        Ok(self.record.clone())
    }

    /// Enters `Failed`. The consistency point stays at its defaults.
    pub async fn fail(&mut self, recorder: &dyn Recorder) -> Result<RunRecord> {
        self.check_transition(RunState::Failed)?;
        let mut next = self.record.clone();
        next.state = RunState::Failed;
        next.end_timestamp = Some(Local::now());
        self.commit(recorder, next).await?;
        warn!(id = self.record.id, "Backup run failed");
        Ok(self.record.clone())
    }

    /// Records the run as `Failed`, logging rather than returning a store error.
    async fn fail_quietly(&mut self, recorder: &dyn Recorder) {
        if let Err(record_err) = self.fail(recorder).await {
            error!(id = self.record.id, error = %record_err, "Could not record failed run");
        }
    }
}

/// Identity and bookkeeping options for one backup run.
#[derive(Debug, Clone)]
pub struct BackupRequest {
    pub id: u64,
    pub run_type: RunType,
    pub method: RunMethod,
    /// Also persist the `Running` state.
    pub report_running: bool,
}

/// Runs one full backup: build, record, dump, read metadata, record outcome.
///
/// A dump that exits 0 but leaves no readable metadata is still a failed run,
/// and so is one whose completed record cannot be stored. Errors carry the run
/// id and the phase they came from.
pub async fn run_backup(
    config: &DumpConfig,
    runner: &dyn ProcessRunner,
    recorder: &dyn Recorder,
    request: &BackupRequest,
) -> Result<RunRecord> {
    let id = request.id;
    let args = build_dump_args(config).map_err(|e| e.in_run(id, Phase::Build))?;

    let mut run = BackupRun::create(
        recorder,
        id,
        request.run_type,
        request.method,
        config.output_dir(),
    )
    .await
    .map_err(|e| e.in_run(id, Phase::Record))?;

    if let Err(e) = run.mark_running(recorder, request.report_running).await {
        warn!(id, error = %e, "Could not record running state; continuing");
        run.mark_running(recorder, false)
            .await
            .map_err(|e| e.in_run(id, Phase::Record))?;
    }

    let outcome = match dump::execute_dump(config, &args, runner).await {
        Ok(_) => dump::read_consistency_point(config).map_err(|e| (Phase::Metadata, e)),
        Err(e) => Err((Phase::Dump, e)),
    };

    let (phase, cause) = match outcome {
        Ok(point) => match run.complete(recorder, point).await {
            Ok(record) => return Ok(record),
            Err(e) => (Phase::Record, e),
        },
        Err(failure) => failure,
    };
    error!(id, %phase, error = %cause, "Backup run did not succeed");
    run.fail_quietly(recorder).await;
    Err(cause.in_run(id, phase))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::dump::metadata::METADATA_FILE_NAME;
    use crate::dump::options::tests::test_config;
    use crate::record::SqliteRecorder;
    use crate::runner::ToolOutput;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::Mutex;

    /// Keeps records in memory and logs every call it receives.
    #[derive(Default)]
    pub(crate) struct MemoryRecorder {
        pub records: Mutex<Vec<RunRecord>>,
        pub calls: Mutex<Vec<(&'static str, RunState)>>,
        /// Updates to these states are rejected.
        pub reject_updates: Mutex<Vec<RunState>>,
    }

    impl MemoryRecorder {
        pub(crate) fn rejecting(states: &[RunState]) -> Self {
            let recorder = MemoryRecorder::default();
            recorder.reject_updates.lock().expect("lock").extend_from_slice(states);
            recorder
        }
    }

    #[async_trait]
    impl Recorder for MemoryRecorder {
        async fn insert(&self, record: &RunRecord) -> Result<()> {
            let mut records = self.records.lock().expect("lock");
            if records.iter().any(|r| r.id == record.id) {
                return Err(AppError::Config(format!("duplicate run id {}", record.id)));
            }
            records.push(record.clone());
            self.calls.lock().expect("lock").push(("insert", record.state));
            Ok(())
        }

        async fn update(&self, record: &RunRecord) -> Result<()> {
            if self.reject_updates.lock().expect("lock").contains(&record.state) {
                return Err(AppError::Config("record store unavailable".to_string()));
            }
            let mut records = self.records.lock().expect("lock");
            let slot = records
                .iter_mut()
                .find(|r| r.id == record.id)
                .ok_or(AppError::Database(sqlx::Error::RowNotFound))?;
            *slot = record.clone();
            self.calls.lock().expect("lock").push(("update", record.state));
            Ok(())
        }

        async fn delete(&self, id: u64) -> Result<()> {
            self.records.lock().expect("lock").retain(|r| r.id != id);
            Ok(())
        }

        async fn query(&self) -> Result<Vec<RunRecord>> {
            Ok(self.records.lock().expect("lock").clone())
        }
    }

    /// Pretends to be the dump tool: exits with a fixed status and optionally
    /// writes a metadata file into `--outputdir`.
    struct FakeDumper {
        exit_status: i32,
        metadata: Option<&'static str>,
    }

    #[async_trait]
    impl ProcessRunner for FakeDumper {
        async fn run(&self, _program: &Path, args: &[String]) -> Result<ToolOutput> {
            if let Some(contents) = self.metadata {
                let dir = args
                    .iter()
                    .position(|a| a == "--outputdir")
                    .map(|i| args[i + 1].clone())
                    .expect("--outputdir present");
                std::fs::write(Path::new(&dir).join(METADATA_FILE_NAME), contents)?;
            }
            Ok(ToolOutput {
                exit_status: Some(self.exit_status),
                stdout: Vec::new(),
                stderr: b"mydumper: Error connecting to database".to_vec(),
            })
        }
    }

    const METADATA: &str = "Started dump at: 2024-01-01 10:00:00\n\
        SHOW MASTER STATUS:\n\
        \tLog: archlog.000005\n\
        \tPos: 1234\n\
        \tGTID:3E11FA47-71CA-11E1-9E33-C80AA9429562:23\n\
        Finished dump at: 2024-01-01 10:05:00\n";

    fn request(id: u64) -> BackupRequest {
        BackupRequest {
            id,
            run_type: RunType::Full,
            method: RunMethod::Manual,
            report_running: false,
        }
    }

    fn config_in(dir: &tempfile::TempDir) -> DumpConfig {
        let mut config = test_config();
        config.set_output_dir(dir.path().to_string_lossy().into_owned());
        config
    }

    #[tokio::test]
    async fn test_successful_run_completes() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let recorder = MemoryRecorder::default();
        let runner = FakeDumper { exit_status: 0, metadata: Some(METADATA) };

        let record = run_backup(&config_in(&dir), &runner, &recorder, &request(1)).await?;

        assert_eq!(record.state, RunState::Completed);
        assert_eq!(record.consistency.binlog_file_name, "archlog.000005");
        assert_eq!(record.consistency.binlog_file_pos, 1234);
        assert_eq!(record.consistency.binlog_uuid, "3E11FA47-71CA-11E1-9E33-C80AA9429562:23");
        assert!(record.end_timestamp.is_some());
        assert_eq!(
            *recorder.calls.lock().expect("lock"),
            vec![("insert", RunState::Created), ("update", RunState::Completed)]
        );
        assert_eq!(recorder.query().await?, vec![record]);
        Ok(())
    }

    #[tokio::test]
    async fn test_tool_failure_fails_run() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let recorder = MemoryRecorder::default();
        let runner = FakeDumper { exit_status: 2, metadata: Some(METADATA) };

        let err = run_backup(&config_in(&dir), &runner, &recorder, &request(2))
            .await
            .expect_err("non-zero exit must fail");
        match err {
            AppError::Run { id: 2, phase: Phase::Dump, source } => {
                assert!(matches!(*source, AppError::ExternalToolFailed { exit_status: Some(2), .. }))
            }
            other => panic!("unexpected error {:?}", other),
        }

        let stored = recorder.query().await?;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].state, RunState::Failed);
        assert_eq!(stored[0].consistency, ConsistencyPoint::default());
        assert!(stored[0].end_timestamp.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn test_unreadable_metadata_fails_run() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let recorder = MemoryRecorder::default();
        let runner = FakeDumper { exit_status: 0, metadata: None };

        let err = run_backup(&config_in(&dir), &runner, &recorder, &request(3))
            .await
            .expect_err("missing metadata must fail");
        match err {
            AppError::Run { id: 3, phase: Phase::Metadata, source } => {
                assert!(matches!(*source, AppError::MetadataFileUnreadable { .. }))
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(recorder.query().await?[0].state, RunState::Failed);
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_output_dir_creates_no_record() -> anyhow::Result<()> {
        let recorder = MemoryRecorder::default();
        let runner = FakeDumper { exit_status: 0, metadata: None };
        let mut config = test_config();
        config.set_output_dir("");

        let err = run_backup(&config, &runner, &recorder, &request(4))
            .await
            .expect_err("empty output dir must fail");
        assert!(matches!(err, AppError::Run { phase: Phase::Build, .. }));
        assert!(recorder.query().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_duplicate_id_is_rejected_before_dump() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let recorder = MemoryRecorder::default();
        let runner = FakeDumper { exit_status: 0, metadata: Some(METADATA) };
        run_backup(&config_in(&dir), &runner, &recorder, &request(5)).await?;

        let err = run_backup(&config_in(&dir), &runner, &recorder, &request(5))
            .await
            .expect_err("reused id must fail");
        assert!(matches!(err, AppError::Run { phase: Phase::Record, .. }));
        assert_eq!(recorder.query().await?[0].state, RunState::Completed);
        Ok(())
    }

    #[tokio::test]
    async fn test_running_state_persisted_on_request() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let recorder = MemoryRecorder::default();
        let runner = FakeDumper { exit_status: 0, metadata: Some(METADATA) };
        let mut req = request(6);
        req.report_running = true;

        run_backup(&config_in(&dir), &runner, &recorder, &req).await?;
        assert_eq!(
            *recorder.calls.lock().expect("lock"),
            vec![
                ("insert", RunState::Created),
                ("update", RunState::Running),
                ("update", RunState::Completed)
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_terminal_states_are_final() -> anyhow::Result<()> {
        let recorder = MemoryRecorder::default();
        let mut run = BackupRun::create(&recorder, 8, RunType::Full, RunMethod::Manual, "/backup").await?;

        assert!(matches!(
            run.complete(&recorder, ConsistencyPoint::default()).await,
            Err(AppError::InvalidTransition { from: "created", to: "completed", .. })
        ));

        run.mark_running(&recorder, false).await?;
        run.fail(&recorder).await?;
        assert!(matches!(
            run.complete(&recorder, ConsistencyPoint::default()).await,
            Err(AppError::InvalidTransition { from: "failed", .. })
        ));
        assert!(run.mark_running(&recorder, false).await.is_err());
        assert_eq!(run.record().state, RunState::Failed);
        Ok(())
    }

    #[tokio::test]
    async fn test_unstorable_completion_falls_back_to_failed() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let recorder = MemoryRecorder::rejecting(&[RunState::Completed]);
        let runner = FakeDumper { exit_status: 0, metadata: Some(METADATA) };

        let err = run_backup(&config_in(&dir), &runner, &recorder, &request(9))
            .await
            .expect_err("unstored completion must fail");
        assert!(matches!(err, AppError::Run { id: 9, phase: Phase::Record, .. }));

        let stored = recorder.query().await?;
        assert_eq!(stored[0].state, RunState::Failed);
        assert_eq!(stored[0].consistency, ConsistencyPoint::default());
        assert!(stored[0].end_timestamp.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn test_position_too_large_for_store_fails_run() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let recorder = SqliteRecorder::connect("sqlite::memory:").await?;
        let runner = FakeDumper {
            exit_status: 0,
            metadata: Some("Log: mysql-bin.000001\nPos: 18446744073709551615\n"),
        };

        let err = run_backup(&config_in(&dir), &runner, &recorder, &request(10))
            .await
            .expect_err("oversized position cannot be stored");
        assert!(matches!(err, AppError::Run { phase: Phase::Record, .. }));

        let stored = recorder.query().await?;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].state, RunState::Failed);
        assert_eq!(stored[0].consistency.binlog_file_pos, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_running_update_failure_does_not_abort_run() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let recorder = MemoryRecorder::rejecting(&[RunState::Running]);
        let runner = FakeDumper { exit_status: 0, metadata: Some(METADATA) };
        let mut req = request(11);
        req.report_running = true;

        let record = run_backup(&config_in(&dir), &runner, &recorder, &req).await?;
        assert_eq!(record.state, RunState::Completed);
        assert_eq!(
            *recorder.calls.lock().expect("lock"),
            vec![("insert", RunState::Created), ("update", RunState::Completed)]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_rejected_update_keeps_previous_state() -> anyhow::Result<()> {
        let recorder = MemoryRecorder::rejecting(&[RunState::Completed]);
        let mut run = BackupRun::create(&recorder, 12, RunType::Full, RunMethod::Manual, "/backup").await?;
        run.mark_running(&recorder, false).await?;

        assert!(run.complete(&recorder, ConsistencyPoint::default()).await.is_err());
        assert_eq!(run.record().state, RunState::Running);
        assert_eq!(run.record().end_timestamp, None);

        let failed = run.fail(&recorder).await?;
        assert_eq!(failed.state, RunState::Failed);
        assert_eq!(recorder.query().await?, vec![failed]);
        Ok(())
    }
}
