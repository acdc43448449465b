// dumptool/src/dump/options.rs
use std::path::{Path, PathBuf};
use tracing::debug;
use which::which;

use crate::errors::{AppError, Result};

pub const DEFAULT_OUTPUT_DIR: &str = "/backup";
pub const DEFAULT_REGEX: &str = "^(?!(sys))";
/// Log file value meaning "let the tool write to its own stdout".
pub const STDOUT_LOG_FILE: &str = "stdout";

/// Connection parameters shared by the dump and load tools.
///
/// Credentials are opaque; nothing here checks them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
}

impl Connection {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Connection {
            host: host.into(),
            port,
            user: user.into(),
            password: password.into(),
        }
    }
}

/// Machine-derived defaults, resolved once per configuration construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Defaults {
    pub threads: u64,
}

impl Defaults {
    /// Detects defaults from the current machine.
    pub fn detect() -> Self {
        let threads = std::thread::available_parallelism()
            .map(|n| n.get() as u64)
            .unwrap_or(1);
        Defaults { threads }
    }
}

/// Locates an executable by name or path. Bare names are looked up on `PATH`.
pub fn resolve_executable(executable: &str) -> Result<PathBuf> {
    if executable.trim().is_empty() {
        return Err(AppError::ExecutableNotFound {
            path: executable.to_string(),
        });
    }
    let path = which(executable).map_err(|_| AppError::ExecutableNotFound {
        path: executable.to_string(),
    })?;
    debug!(executable, resolved = %path.display(), "Resolved executable");
    Ok(path)
}

/// How the dump tool locks tables while reading them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LockStrategy {
    /// The tool's own locking behaviour; no flag is passed.
    #[default]
    Default,
    NoLocks,
    NoBackupLocks,
    LessLocking,
    LockAllTables,
}

impl LockStrategy {
    pub fn flag(self) -> Option<&'static str> {
        match self {
            LockStrategy::Default => None,
            LockStrategy::NoLocks => Some("--no-locks"),
            LockStrategy::NoBackupLocks => Some("--no-backup-locks"),
            LockStrategy::LessLocking => Some("--less-locking"),
            LockStrategy::LockAllTables => Some("--lock-all-tables"),
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "" | "default" => Ok(LockStrategy::Default),
            "no-lock" | "no-locks" => Ok(LockStrategy::NoLocks),
            "no-backup-lock" | "no-backup-locks" => Ok(LockStrategy::NoBackupLocks),
            "less-lock" | "less-locking" => Ok(LockStrategy::LessLocking),
            "lock-all-tables" => Ok(LockStrategy::LockAllTables),
            other => Err(AppError::Config(format!("unknown lock strategy '{}'", other))),
        }
    }
}

/// Options for one run of the dump tool.
///
/// Every field starts at the dump tool's own default, so a freshly constructed
/// value already produces a working invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpConfig {
    pub(crate) executable: PathBuf,
    pub(crate) connection: Connection,

    pub(crate) databases: Vec<String>,
    pub(crate) tables: Vec<String>,
    pub(crate) regex: String,

    pub(crate) output_dir: String,
    pub(crate) log_file: String,
    pub(crate) statement_size: u64,
    pub(crate) rows: u64,
    /// MB
    pub(crate) chunk_filesize: u64,
    pub(crate) compress: bool,

    pub(crate) threads: u64,
    pub(crate) long_query_guard: u64,
    pub(crate) kill_long_queries: bool,
    pub(crate) daemon: bool,
    /// Minutes; only meaningful in daemon mode.
    pub(crate) snapshot_interval: u64,
    pub(crate) tz_utc: bool,
    pub(crate) skip_tz_utc: bool,
    pub(crate) lock_strategy: LockStrategy,
    pub(crate) use_savepoints: bool,
    pub(crate) success_on_1146: bool,
    /// Days.
    pub(crate) updated_since: Option<u64>,
    pub(crate) trx_consistency_only: bool,
    pub(crate) complete_insert: bool,
    pub(crate) compress_protocol: bool,

    pub(crate) export_schemas: bool,
    pub(crate) export_data: bool,
    pub(crate) export_triggers: bool,
    pub(crate) export_events: bool,
    pub(crate) export_routines: bool,
    pub(crate) export_views: bool,
}

impl DumpConfig {
    /// Creates a configuration with every tunable at its default.
    ///
    /// Fails with `ExecutableNotFound` when `executable` is empty or cannot be
    /// resolved.
    pub fn new(executable: &str, connection: Connection) -> Result<Self> {
        Self::with_defaults(executable, connection, Defaults::detect())
    }

    pub fn with_defaults(executable: &str, connection: Connection, defaults: Defaults) -> Result<Self> {
        let executable = resolve_executable(executable)?;
        Ok(DumpConfig {
            executable,
            connection,
            databases: Vec::new(),
            tables: Vec::new(),
            regex: DEFAULT_REGEX.to_string(),
            output_dir: DEFAULT_OUTPUT_DIR.to_string(),
            log_file: STDOUT_LOG_FILE.to_string(),
            statement_size: 1_000_000,
            rows: 1_000_000,
            chunk_filesize: 64,
            compress: true,
            threads: defaults.threads,
            long_query_guard: 600,
            kill_long_queries: false,
            daemon: false,
            snapshot_interval: 60,
            tz_utc: false,
            skip_tz_utc: true,
            lock_strategy: LockStrategy::Default,
            use_savepoints: false,
            success_on_1146: false,
            updated_since: None,
            trx_consistency_only: true,
            complete_insert: true,
            compress_protocol: false,
            export_schemas: true,
            export_data: true,
            export_triggers: true,
            export_events: true,
            export_routines: true,
            export_views: true,
        })
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    pub fn output_dir(&self) -> &str {
        &self.output_dir
    }

    pub fn databases(&self) -> &[String] {
        &self.databases
    }

    pub fn tables(&self) -> &[String] {
        &self.tables
    }

    pub fn add_databases<I, S>(&mut self, databases: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.databases.extend(databases.into_iter().map(Into::into));
    }

    /// Adds tables to the selection. Requires at least one database first.
    pub fn add_tables<I, S>(&mut self, tables: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if self.databases.is_empty() {
            return Err(AppError::NoDatabaseSelected);
        }
        self.tables.extend(tables.into_iter().map(Into::into));
        Ok(())
    }

    pub fn set_regex(&mut self, regex: impl Into<String>) {
        self.regex = regex.into();
    }

    pub fn set_output_dir(&mut self, dir: impl Into<String>) {
        self.output_dir = dir.into();
    }

    pub fn set_log_file(&mut self, log_file: impl Into<String>) {
        self.log_file = log_file.into();
    }

    pub fn set_statement_size(&mut self, bytes: u64) {
        self.statement_size = bytes;
    }

    pub fn set_rows(&mut self, rows: u64) {
        self.rows = rows;
    }

    pub fn set_chunk_filesize(&mut self, megabytes: u64) {
        self.chunk_filesize = megabytes;
    }

    pub fn set_compress(&mut self, enable: bool) {
        self.compress = enable;
    }

    pub fn set_threads(&mut self, threads: u64) {
        self.threads = threads;
    }

    pub fn set_long_query_guard(&mut self, seconds: u64) {
        self.long_query_guard = seconds;
    }

    pub fn set_kill_long_queries(&mut self, kill: bool) {
        self.kill_long_queries = kill;
    }

    pub fn set_daemon(&mut self, enable: bool) {
        self.daemon = enable;
    }

    pub fn set_snapshot_interval(&mut self, minutes: u64) {
        self.snapshot_interval = minutes;
    }

    pub fn set_tz_utc(&mut self, enable: bool) {
        self.tz_utc = enable;
    }

    pub fn set_skip_tz_utc(&mut self, skip: bool) {
        self.skip_tz_utc = skip;
    }

    pub fn set_lock_strategy(&mut self, strategy: LockStrategy) {
        self.lock_strategy = strategy;
    }

    pub fn set_use_savepoints(&mut self, enable: bool) {
        self.use_savepoints = enable;
    }

    pub fn set_success_on_1146(&mut self, enable: bool) {
        self.success_on_1146 = enable;
    }

    pub fn set_updated_since(&mut self, days: Option<u64>) {
        self.updated_since = days;
    }

    pub fn set_trx_consistency_only(&mut self, enable: bool) {
        self.trx_consistency_only = enable;
    }

    pub fn set_complete_insert(&mut self, enable: bool) {
        self.complete_insert = enable;
    }

    pub fn set_compress_protocol(&mut self, enable: bool) {
        self.compress_protocol = enable;
    }

    pub fn set_export_schemas(&mut self, export: bool) {
        self.export_schemas = export;
    }

    pub fn set_export_data(&mut self, export: bool) {
        self.export_data = export;
    }

    pub fn set_export_triggers(&mut self, export: bool) {
        self.export_triggers = export;
    }

    pub fn set_export_events(&mut self, export: bool) {
        self.export_events = export;
    }

    pub fn set_export_routines(&mut self, export: bool) {
        self.export_routines = export;
    }

    pub fn set_export_views(&mut self, export: bool) {
        self.export_views = export;
    }
}
