// dumptool/src/config/mod.rs
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::dump::{Connection, DumpConfig, LockStrategy};
use crate::load::LoadConfig;
use crate::record::{RunMethod, RunType};

pub const DEFAULT_CONFIG_PATH: &str = "config.json";
pub const DEFAULT_RECORDER_URL: &str = "sqlite://dumptool.db";
const DEFAULT_DUMPER: &str = "mydumper";
const DEFAULT_LOADER: &str = "myloader";
const DEFAULT_PORT: u16 = 3306;

// Structs for deserializing config.json. Every field is optional; absent
// fields keep the tool defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JsonConnection {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JsonDumperOptions {
    pub executable: Option<String>,
    pub databases: Option<Vec<String>>,
    pub tables: Option<Vec<String>>,
    pub regex: Option<String>,
    pub log_file: Option<String>,
    pub statement_size: Option<u64>,
    pub rows: Option<u64>,
    pub chunk_filesize: Option<u64>,
    pub compress: Option<bool>,
    pub threads: Option<u64>,
    pub long_query_guard: Option<u64>,
    pub kill_long_queries: Option<bool>,
    pub daemon: Option<bool>,
    pub snapshot_interval: Option<u64>,
    pub tz_utc: Option<bool>,
    pub skip_tz_utc: Option<bool>,
    pub lock_strategy: Option<String>,
    pub use_savepoints: Option<bool>,
    pub success_on_1146: Option<bool>,
    pub updated_since: Option<u64>,
    pub trx_consistency_only: Option<bool>,
    pub complete_insert: Option<bool>,
    pub compress_protocol: Option<bool>,
    pub export_schemas: Option<bool>,
    pub export_data: Option<bool>,
    pub export_triggers: Option<bool>,
    pub export_events: Option<bool>,
    pub export_routines: Option<bool>,
    pub export_views: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JsonLoaderOptions {
    pub executable: Option<String>,
    pub directory: Option<String>,
    pub queries_per_transaction: Option<u64>,
    pub overwrite_tables: Option<bool>,
    pub target_database: Option<String>,
    pub source_database: Option<String>,
    pub enable_binlog: Option<bool>,
    pub threads: Option<u64>,
    pub compress_protocol: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JsonRecorderOptions {
    pub database_url: Option<String>,
    pub report_running: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JsonBackupOptions {
    pub backup_root: Option<PathBuf>,
    pub run_type: Option<RunType>,
    pub run_method: Option<RunMethod>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawJsonConfig {
    #[serde(default)]
    pub connection: JsonConnection,
    #[serde(default)]
    pub dumper: JsonDumperOptions,
    #[serde(default)]
    pub loader: JsonLoaderOptions,
    #[serde(default)]
    pub recorder: JsonRecorderOptions,
    #[serde(default)]
    pub backup: JsonBackupOptions,
}

// Application's internal configuration structs
#[derive(Debug, Clone)]
pub struct RecorderSettings {
    pub database_url: String,
    pub report_running: bool,
}

#[derive(Debug, Clone)]
pub struct BackupSettings {
    pub backup_root: PathBuf,
    pub run_type: Option<RunType>,
    pub run_method: RunMethod,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub connection: Connection,
    pub recorder: RecorderSettings,
    pub backup: BackupSettings,
    pub raw_json_config: RawJsonConfig,
}

impl AppConfig {
    pub fn load_from_json(config_path: &Path) -> Result<Self> {
        let config_content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file at {}", config_path.display()))?;
        Self::from_json_str(&config_content).with_context(|| {
            format!(
                "Failed to parse JSON from config file at {}",
                config_path.display()
            )
        })
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let raw_json_config: RawJsonConfig = serde_json::from_str(content)?;
        Self::from_raw(raw_json_config)
    }

    fn from_raw(raw_json_config: RawJsonConfig) -> Result<Self> {
        let raw_conn = &raw_json_config.connection;
        let host = raw_conn
            .host
            .clone()
            .filter(|h| !h.is_empty())
            .context("connection.host must be set in config.json")?;
        let user = raw_conn
            .user
            .clone()
            .filter(|u| !u.is_empty())
            .context("connection.user must be set in config.json")?;
        let connection = Connection::new(
            host,
            raw_conn.port.unwrap_or(DEFAULT_PORT),
            user,
            raw_conn.password.clone().unwrap_or_default(),
        );

        let recorder = RecorderSettings {
            database_url: raw_json_config
                .recorder
                .database_url
                .clone()
                .unwrap_or_else(|| DEFAULT_RECORDER_URL.to_string()),
            report_running: raw_json_config.recorder.report_running.unwrap_or(false),
        };

        let raw_backup = &raw_json_config.backup;
        let backup_root = raw_backup
            .backup_root
            .clone()
            .unwrap_or_else(|| PathBuf::from(crate::dump::options::DEFAULT_OUTPUT_DIR));
        if backup_root.as_os_str().is_empty() {
            anyhow::bail!("backup.backup_root cannot be empty in config.json.");
        }
        let backup = BackupSettings {
            backup_root,
            run_type: raw_backup.run_type,
            run_method: raw_backup.run_method.unwrap_or(RunMethod::Manual),
            timeout_secs: raw_backup.timeout_secs,
        };

        Ok(AppConfig {
            connection,
            recorder,
            backup,
            raw_json_config,
        })
    }

    /// Replaces the password of the configured connection, e.g. from the environment.
    pub fn apply_password_override(&mut self, password: Option<String>) {
        if let Some(password) = password {
            self.connection.password = password;
        }
    }

    /// Builds a dump configuration writing into `output_dir`.
    pub fn dump_config(&self, output_dir: &str) -> Result<DumpConfig> {
        let opts = &self.raw_json_config.dumper;
        let executable = opts.executable.as_deref().unwrap_or(DEFAULT_DUMPER);
        let mut config = DumpConfig::new(executable, self.connection.clone())
            .with_context(|| format!("Dump tool '{}' is not usable", executable))?;

        config.set_output_dir(output_dir);
        if let Some(dbs) = &opts.databases {
            config.add_databases(dbs.iter().cloned());
        }
        if let Some(tables) = &opts.tables {
            config
                .add_tables(tables.iter().cloned())
                .context("dumper.tables requires dumper.databases in config.json")?;
        }
        if let Some(v) = &opts.regex {
            config.set_regex(v.clone());
        }
        if let Some(v) = &opts.log_file {
            config.set_log_file(v.clone());
        }
        if let Some(v) = opts.statement_size {
            config.set_statement_size(v);
        }
        if let Some(v) = opts.rows {
            config.set_rows(v);
        }
        if let Some(v) = opts.chunk_filesize {
            config.set_chunk_filesize(v);
        }
        if let Some(v) = opts.compress {
            config.set_compress(v);
        }
        if let Some(v) = opts.threads {
            config.set_threads(v);
        }
        if let Some(v) = opts.long_query_guard {
            config.set_long_query_guard(v);
        }
        if let Some(v) = opts.kill_long_queries {
            config.set_kill_long_queries(v);
        }
        if let Some(v) = opts.daemon {
            config.set_daemon(v);
        }
        if let Some(v) = opts.snapshot_interval {
            config.set_snapshot_interval(v);
        }
        if let Some(v) = opts.tz_utc {
            config.set_tz_utc(v);
        }
        if let Some(v) = opts.skip_tz_utc {
            config.set_skip_tz_utc(v);
        }
        if let Some(v) = &opts.lock_strategy {
            config.set_lock_strategy(LockStrategy::parse(v)?);
        }
        if let Some(v) = opts.use_savepoints {
            config.set_use_savepoints(v);
        }
        if let Some(v) = opts.success_on_1146 {
            config.set_success_on_1146(v);
        }
        if opts.updated_since.is_some() {
            config.set_updated_since(opts.updated_since);
        }
        if let Some(v) = opts.trx_consistency_only {
            config.set_trx_consistency_only(v);
        }
        if let Some(v) = opts.complete_insert {
            config.set_complete_insert(v);
        }
        if let Some(v) = opts.compress_protocol {
            config.set_compress_protocol(v);
        }
        if let Some(v) = opts.export_schemas {
            config.set_export_schemas(v);
        }
        if let Some(v) = opts.export_data {
            config.set_export_data(v);
        }
        if let Some(v) = opts.export_triggers {
            config.set_export_triggers(v);
        }
        if let Some(v) = opts.export_events {
            config.set_export_events(v);
        }
        if let Some(v) = opts.export_routines {
            config.set_export_routines(v);
        }
        if let Some(v) = opts.export_views {
            config.set_export_views(v);
        }
        Ok(config)
    }

    /// Builds a load configuration. `directory` overrides `loader.directory`.
    pub fn load_config(&self, directory: Option<&str>) -> Result<LoadConfig> {
        let opts = &self.raw_json_config.loader;
        let executable = opts.executable.as_deref().unwrap_or(DEFAULT_LOADER);
        let mut config = LoadConfig::new(executable, self.connection.clone())
            .with_context(|| format!("Load tool '{}' is not usable", executable))?;

        if let Some(dir) = directory.or(opts.directory.as_deref()) {
            config.set_source_directory(dir);
        }
        if let Some(v) = opts.queries_per_transaction {
            config.set_queries_per_transaction(v);
        }
        if let Some(v) = opts.overwrite_tables {
            config.set_overwrite_tables(v);
        }
        if let Some(v) = &opts.target_database {
            config.set_target_database(v.clone());
        }
        if let Some(v) = &opts.source_database {
            config.set_source_database(v.clone());
        }
        if let Some(v) = opts.enable_binlog {
            config.set_enable_binlog(v);
        }
        if let Some(v) = opts.threads {
            config.set_threads(v);
        }
        if let Some(v) = opts.compress_protocol {
            config.set_compress_protocol(v);
        }
        Ok(config)
    }

    /// Run type from config, or derived from whether `dump_config` selects databases.
    pub fn run_type(&self, dump_config: &DumpConfig) -> RunType {
        self.backup.run_type.unwrap_or(if dump_config.databases().is_empty() {
            RunType::Full
        } else {
            RunType::Partial
        })
    }
}
