//! Logical Backup/Restore Tool
//!
//! Drives the dump and load tools, records every backup attempt and the
//! binlog position it captured.

// dumptool/src/main.rs
mod backup;
mod config;
mod dump;
mod errors;
mod load;
mod record;
mod restore;
mod runner;

use anyhow::{Context, Result};
use config::{AppConfig, DEFAULT_CONFIG_PATH};
use record::{Recorder, SqliteRecorder};
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Main entry point for the backup/restore tool
#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run_app().await {
        Ok(_) => {
            println!("✅ Operation completed successfully.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("❌ Error: {:?}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_app() -> Result<()> {
    let config_path = env::var("DUMPTOOL_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
    let mut app_config = AppConfig::load_from_json(&config_path)
        .context(format!("Failed to load application configuration from {}", config_path.display()))?;
    app_config.apply_password_override(env::var("DUMPTOOL_PASSWORD").ok());

    let args: Vec<String> = env::args().collect();
    let choice = if args.len() > 1 {
        args[1].trim().to_string()
    } else {
        prompt_choice()?
    };

    match choice.as_str() {
        "1" | "backup" => {
            println!("🚀 Starting Backup Process...");
            let record = backup::run_backup_flow(&app_config)
                .await
                .context("Backup process failed")?;
            println!(
                "Run {} completed: {} @ {} (GTID: {})",
                record.id,
                record.consistency.binlog_file_name,
                record.consistency.binlog_file_pos,
                if record.consistency.binlog_uuid.is_empty() { "-" } else { record.consistency.binlog_uuid.as_str() }
            );
        }
        "2" | "restore" => {
            println!("🔄 Starting Restore Process...");
            let directory = args.get(2).map(String::as_str);
            restore::run_restore_flow(&app_config, directory)
                .await
                .context("Restore process failed")?;
        }
        "3" | "list" => {
            let recorder = open_recorder(&app_config).await?;
            let records = recorder.query().await.context("Failed to query run records")?;
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        "4" | "delete" => {
            let id = match args.get(2) {
                Some(id) => id.clone(),
                None => prompt_line("Run id to delete: ")?,
            };
            let id: u64 = id
                .parse()
                .context("Usage: dumptool delete <id> [--force]; run id must be a non-negative integer")?;
            let force = args.iter().skip(3).any(|a| a == "--force");
            let recorder = open_recorder(&app_config).await?;
            delete_run(&recorder, id, force).await?;
            println!("🗑 Deleted run record {}", id);
        }
        _ => {
            println!("❌ Invalid choice. Please enter '1' (backup), '2' (restore), '3' (list) or '4' (delete).");
            anyhow::bail!("Invalid operation choice");
        }
    }
    Ok(())
}

/// Deletes one run record. Records of unfinished runs need `force`.
async fn delete_run(recorder: &dyn Recorder, id: u64, force: bool) -> Result<()> {
    let records = recorder.query().await.context("Failed to query run records")?;
    match records.iter().find(|r| r.id == id) {
        None => anyhow::bail!("No run record with id {}", id),
        Some(r) if !r.state.is_terminal() && !force => anyhow::bail!(
            "Run {} is still {}; pass --force to delete a stale record",
            id,
            r.state.name()
        ),
        Some(_) => recorder
            .delete(id)
            .await
            .with_context(|| format!("Failed to delete run record {}", id)),
    }
}

async fn open_recorder(app_config: &AppConfig) -> Result<SqliteRecorder> {
    SqliteRecorder::connect(&app_config.recorder.database_url)
        .await
        .with_context(|| {
            format!(
                "Failed to open run record store at {}",
                app_config.recorder.database_url
            )
        })
}

/// Prompts user to select an operation
///
/// Returns the user's choice as String
fn prompt_choice() -> Result<String> {
    println!("Select an operation:");
    println!("1. Take Backup (or type 'backup')");
    println!("2. Restore Backup (or type 'restore')");
    println!("3. List Backup Runs (or type 'list')");
    println!("4. Delete Backup Run (or type 'delete')");
    prompt_line("Enter your choice: ")
}

fn prompt_line(prompt: &str) -> Result<String> {
    use std::io::{Write, stdin, stdout};

    print!("{}", prompt);
    stdout().flush().context("Failed to flush stdout")?;

    let mut input = String::new();
    stdin().read_line(&mut input).context("Failed to read user input")?;
    Ok(input.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::lifecycle::BackupRun;
    use crate::record::lifecycle::tests::MemoryRecorder;
    use crate::record::{RunMethod, RunType};

    #[tokio::test]
    async fn test_delete_requires_force_for_unfinished_runs() -> anyhow::Result<()> {
        let recorder = MemoryRecorder::default();
        BackupRun::create(&recorder, 1, RunType::Full, RunMethod::Manual, "/backup/a").await?;

        assert!(delete_run(&recorder, 1, false).await.is_err());
        assert_eq!(recorder.query().await?.len(), 1);

        delete_run(&recorder, 1, true).await?;
        assert!(recorder.query().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_finished_run_and_unknown_id() -> anyhow::Result<()> {
        let recorder = MemoryRecorder::default();
        let mut run = BackupRun::create(&recorder, 2, RunType::Full, RunMethod::Manual, "/backup/b").await?;
        run.mark_running(&recorder, false).await?;
        run.fail(&recorder).await?;

        delete_run(&recorder, 2, false).await?;
        assert!(recorder.query().await?.is_empty());
        assert!(delete_run(&recorder, 2, true).await.is_err());
        Ok(())
    }
}
