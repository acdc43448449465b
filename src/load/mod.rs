// dumptool/src/load/mod.rs
//! Restore side: configuration and invocation of the load tool.

use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::dump::args::{Flag, FlagRule, push_flags, redacted};
use crate::dump::options::{Connection, DEFAULT_OUTPUT_DIR, Defaults, resolve_executable};
use crate::errors::Result;
use crate::runner::{ProcessRunner, ToolOutput, tool_name};

/// Options for one run of the load tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadConfig {
    executable: PathBuf,
    connection: Connection,
    directory: String,
    queries_per_transaction: u64,
    overwrite_tables: bool,
    /// Restore into this database instead of the dumped one.
    target_database: String,
    /// Only restore this database from the dump.
    source_database: String,
    enable_binlog: bool,
    threads: u64,
    compress_protocol: bool,
}

impl LoadConfig {
    pub fn new(executable: &str, connection: Connection) -> Result<Self> {
        Self::with_defaults(executable, connection, Defaults::detect())
    }

    pub fn with_defaults(executable: &str, connection: Connection, defaults: Defaults) -> Result<Self> {
        Ok(LoadConfig {
            executable: resolve_executable(executable)?,
            connection,
            directory: DEFAULT_OUTPUT_DIR.to_string(),
            queries_per_transaction: 1000,
            overwrite_tables: true,
            target_database: String::new(),
            source_database: String::new(),
            enable_binlog: false,
            threads: defaults.threads,
            compress_protocol: false,
        })
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    pub fn directory(&self) -> &str {
        &self.directory
    }

    pub fn set_source_directory(&mut self, directory: impl Into<String>) {
        self.directory = directory.into();
    }

    pub fn set_queries_per_transaction(&mut self, queries: u64) {
        self.queries_per_transaction = queries;
    }

    pub fn set_overwrite_tables(&mut self, overwrite: bool) {
        self.overwrite_tables = overwrite;
    }

    pub fn set_target_database(&mut self, database: impl Into<String>) {
        self.target_database = database.into();
    }

    pub fn set_source_database(&mut self, database: impl Into<String>) {
        self.source_database = database.into();
    }

    pub fn set_enable_binlog(&mut self, enable: bool) {
        self.enable_binlog = enable;
    }

    pub fn set_threads(&mut self, threads: u64) {
        self.threads = threads;
    }

    pub fn set_compress_protocol(&mut self, enable: bool) {
        self.compress_protocol = enable;
    }
}

const LOAD_FLAGS: &[FlagRule<LoadConfig>] = &[
    ("--host", |c| Flag::Value(c.connection.host.clone())),
    ("--port", |c| Flag::number(u64::from(c.connection.port))),
    ("--user", |c| Flag::Value(c.connection.user.clone())),
    ("--password", |c| Flag::Value(c.connection.password.clone())),
    ("--directory", |c| Flag::text(&c.directory)),
    ("--queries-per-transaction", |c| Flag::number(c.queries_per_transaction)),
    ("--overwrite-tables", |c| Flag::when(c.overwrite_tables)),
    ("--database", |c| Flag::text(&c.target_database)),
    ("--source-db", |c| Flag::text(&c.source_database)),
    ("--enable-binlog", |c| Flag::when(c.enable_binlog)),
    ("--compress-protocol", |c| Flag::when(c.compress_protocol)),
    ("--threads", |c| Flag::number(c.threads)),
];

/// Builds the load tool's argument vector. Never fails; omitted values fall
/// back to the tool's defaults.
pub fn build_load_args(config: &LoadConfig) -> Vec<String> {
    let mut args = Vec::with_capacity(24);
    push_flags(&mut args, config, LOAD_FLAGS);
    args
}

/// Runs the load tool and fails with `ExternalToolFailed` on a non-zero exit.
pub async fn run_load(config: &LoadConfig, runner: &dyn ProcessRunner) -> Result<ToolOutput> {
    let args = build_load_args(config);
    let tool = tool_name(config.executable());
    info!(tool = %tool, directory = config.directory(), "Starting load");
    debug!(args = %redacted(&args), "Load invocation");

    let output = runner.run(config.executable(), &args).await?.into_success(&tool)?;
    debug!(tool = %tool, stdout = %String::from_utf8_lossy(&output.stdout).trim_end(), "Load tool output");
    info!(tool = %tool, "Load finished");
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dump::options::tests::{TEST_EXECUTABLE, test_connection};
    use crate::errors::AppError;
    use crate::runner::ProcessRunner;
    use async_trait::async_trait;
    use std::sync::Mutex;

    fn test_config() -> LoadConfig {
        LoadConfig::with_defaults(TEST_EXECUTABLE, test_connection(), Defaults { threads: 2 })
            .expect("sh should resolve")
    }

    #[test]
    fn test_default_invocation() {
        let args = build_load_args(&test_config());
        assert_eq!(
            args,
            vec![
                "--host", "10.0.0.5", "--port", "3306", "--user", "backup", "--password", "s3cret",
                "--directory", "/backup",
                "--queries-per-transaction", "1000",
                "--overwrite-tables",
                "--threads", "2",
            ]
        );
    }

    #[test]
    fn test_optional_flags() {
        let mut config = test_config();
        config.set_source_directory("/backup/2024-01-01_10_00_00");
        config.set_overwrite_tables(false);
        config.set_target_database("shop_restored");
        config.set_source_database("shop");
        config.set_enable_binlog(true);
        config.set_compress_protocol(true);
        config.set_queries_per_transaction(500);
        config.set_threads(16);
        assert_eq!(
            build_load_args(&config),
            vec![
                "--host", "10.0.0.5", "--port", "3306", "--user", "backup", "--password", "s3cret",
                "--directory", "/backup/2024-01-01_10_00_00",
                "--queries-per-transaction", "500",
                "--database", "shop_restored",
                "--source-db", "shop",
                "--enable-binlog",
                "--compress-protocol",
                "--threads", "16",
            ]
        );
    }

    #[test]
    fn test_missing_executable() {
        let result = LoadConfig::new("", test_connection());
        assert!(matches!(result, Err(AppError::ExecutableNotFound { .. })));
    }

    struct RecordingRunner {
        exit_status: i32,
        calls: Mutex<Vec<Vec<String>>>,
    }

    #[async_trait]
    impl ProcessRunner for RecordingRunner {
        async fn run(&self, _program: &Path, args: &[String]) -> Result<ToolOutput> {
            self.calls.lock().expect("lock").push(args.to_vec());
            Ok(ToolOutput {
                exit_status: Some(self.exit_status),
                stdout: Vec::new(),
                stderr: b"table exists".to_vec(),
            })
        }
    }

    #[tokio::test]
    async fn test_run_load_passes_built_args() -> anyhow::Result<()> {
        let runner = RecordingRunner { exit_status: 0, calls: Mutex::new(Vec::new()) };
        let config = test_config();
        run_load(&config, &runner).await?;
        let calls = runner.calls.lock().expect("lock");
        assert_eq!(calls.as_slice(), [build_load_args(&config)]);
        Ok(())
    }

    #[tokio::test]
    async fn test_run_load_surfaces_failure() {
        let runner = RecordingRunner { exit_status: 1, calls: Mutex::new(Vec::new()) };
        let result = run_load(&test_config(), &runner).await;
        match result {
            Err(AppError::ExternalToolFailed { exit_status, stderr, .. }) => {
                assert_eq!(exit_status, Some(1));
                assert_eq!(stderr, "table exists");
            }
            other => panic!("expected ExternalToolFailed, got {:?}", other),
        }
    }
}
