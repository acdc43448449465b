// dumptool/src/backup/mod.rs
use anyhow::{Context, Result};
use chrono::Local;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::config::AppConfig;
use crate::record::{BackupRequest, Recorder, RunRecord, SqliteRecorder, run_backup};
use crate::runner::TokioProcessRunner;

/// Creates `<backup_root>/<timestamp>` for one dump.
pub fn create_backup_dir(backup_root: &Path) -> Result<PathBuf> {
    let timestamp = Local::now().format("%Y-%m-%d_%H_%M_%S").to_string();
    let backup_path = backup_root.join(timestamp);
    fs::create_dir_all(&backup_path).with_context(|| {
        format!("Failed to create backup directory: {}", backup_path.display())
    })?;
    info!(path = %backup_path.display(), "Backup directory created");
    Ok(backup_path)
}

/// Next free run identifier in the store.
pub async fn next_run_id(recorder: &dyn Recorder) -> Result<u64> {
    let records = recorder.query().await.context("Failed to query run records")?;
    Ok(records.iter().map(|r| r.id).max().map_or(1, |id| id + 1))
}

/// Public entry point for the backup process.
pub async fn run_backup_flow(app_config: &AppConfig) -> Result<RunRecord> {
    let backup_dir = create_backup_dir(&app_config.backup.backup_root)?;
    let output_dir = backup_dir
        .to_str()
        .context("Backup directory path is not valid UTF-8")?;
    let dump_config = app_config.dump_config(output_dir)?;

    let recorder = SqliteRecorder::connect(&app_config.recorder.database_url)
        .await
        .with_context(|| {
            format!(
                "Failed to open run record store at {}",
                app_config.recorder.database_url
            )
        })?;

    let runner = match app_config.backup.timeout_secs {
        Some(secs) => TokioProcessRunner::with_deadline(Duration::from_secs(secs)),
        None => TokioProcessRunner::new(),
    };

    let request = BackupRequest {
        id: next_run_id(&recorder).await?,
        run_type: app_config.run_type(&dump_config),
        method: app_config.backup.run_method,
        report_running: app_config.recorder.report_running,
    };

    let record = run_backup(&dump_config, &runner, &recorder, &request).await?;
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::lifecycle::tests::MemoryRecorder;
    use crate::record::{RunMethod, RunState, RunType};
    use crate::dump::ConsistencyPoint;

    #[test]
    fn test_create_backup_dir_under_root() -> anyhow::Result<()> {
        let root = tempfile::tempdir()?;
        let dir = create_backup_dir(root.path())?;
        assert!(dir.is_dir());
        assert_eq!(dir.parent(), Some(root.path()));
        Ok(())
    }

    #[tokio::test]
    async fn test_next_run_id() -> anyhow::Result<()> {
        let recorder = MemoryRecorder::default();
        assert_eq!(next_run_id(&recorder).await?, 1);

        recorder.insert(&RunRecord {
            id: 41,
            run_type: RunType::Full,
            method: RunMethod::Manual,
            state: RunState::Completed,
            backup_dir: "/backup/a".to_string(),
            consistency: ConsistencyPoint::default(),
            start_timestamp: Local::now(),
            end_timestamp: None,
        })
        .await?;
        assert_eq!(next_run_id(&recorder).await?, 42);
        Ok(())
    }
}
