// dumptool/src/dump/args.rs
//! Translation of a [`DumpConfig`] into the dump tool's argument vector.
//!
//! Output order is fixed by [`DUMP_FLAGS`], never by the order setters were
//! called in, so equal configurations always yield identical vectors.

use super::options::{DumpConfig, STDOUT_LOG_FILE};
use crate::errors::{AppError, Result};

/// What a single table entry contributes to the argument vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flag {
    Omit,
    Bare,
    Value(String),
}

impl Flag {
    pub fn when(enabled: bool) -> Self {
        if enabled { Flag::Bare } else { Flag::Omit }
    }

    /// Empty strings are omitted rather than passed as `""`.
    pub fn text(value: &str) -> Self {
        if value.is_empty() {
            Flag::Omit
        } else {
            Flag::Value(value.to_string())
        }
    }

    pub fn number(value: u64) -> Self {
        Flag::Value(value.to_string())
    }

    pub fn list(values: &[String]) -> Self {
        if values.is_empty() {
            Flag::Omit
        } else {
            Flag::Value(values.join(","))
        }
    }
}

pub type FlagRule<C> = (&'static str, fn(&C) -> Flag);

/// Appends every rule of `table` to `args` in table order.
pub fn push_flags<C>(args: &mut Vec<String>, config: &C, table: &[FlagRule<C>]) {
    for (name, rule) in table {
        match rule(config) {
            Flag::Omit => {}
            Flag::Bare => args.push((*name).to_string()),
            Flag::Value(value) => {
                args.push((*name).to_string());
                args.push(value);
            }
        }
    }
}

/// Canonical flag order for the dump tool. Connection flags come first.
pub const DUMP_FLAGS: &[FlagRule<DumpConfig>] = &[
    ("--host", |c| Flag::Value(c.connection.host.clone())),
    ("--port", |c| Flag::number(u64::from(c.connection.port))),
    ("--user", |c| Flag::Value(c.connection.user.clone())),
    ("--password", |c| Flag::Value(c.connection.password.clone())),
    ("--database", |c| Flag::list(&c.databases)),
    ("--tables-list", |c| Flag::list(&c.tables)),
    ("--outputdir", |c| Flag::text(&c.output_dir)),
    ("--logfile", |c| {
        if c.log_file == STDOUT_LOG_FILE {
            Flag::Omit
        } else {
            Flag::text(&c.log_file)
        }
    }),
    ("--statement-size", |c| Flag::number(c.statement_size)),
    ("--rows", |c| Flag::number(c.rows)),
    ("--chunk-filesize", |c| Flag::number(c.chunk_filesize)),
    ("--compress", |c| Flag::when(c.compress)),
    ("--daemon", |c| Flag::when(c.daemon)),
    ("--long-query-guard", |c| Flag::number(c.long_query_guard)),
    ("--kill-long-queries", |c| Flag::when(c.kill_long_queries)),
    ("--snapshot-interval", |c| Flag::number(c.snapshot_interval)),
    ("--tz-utc", |c| Flag::when(c.tz_utc)),
    ("--skip-tz-utc", |c| Flag::when(c.skip_tz_utc)),
    ("--use-savepoints", |c| Flag::when(c.use_savepoints)),
    ("--success-on-1146", |c| Flag::when(c.success_on_1146)),
    ("--no-locks", |c| lock_flag(c, "--no-locks")),
    ("--no-backup-locks", |c| lock_flag(c, "--no-backup-locks")),
    ("--less-locking", |c| lock_flag(c, "--less-locking")),
    ("--lock-all-tables", |c| lock_flag(c, "--lock-all-tables")),
    ("--updated-since", |c| match c.updated_since {
        Some(days) => Flag::number(days),
        None => Flag::Omit,
    }),
    ("--trx-consistency-only", |c| Flag::when(c.trx_consistency_only)),
    ("--complete-insert", |c| Flag::when(c.complete_insert)),
    ("--threads", |c| Flag::number(c.threads)),
    ("--compress-protocol", |c| Flag::when(c.compress_protocol)),
    ("--no-schemas", |c| Flag::when(!c.export_schemas)),
    ("--no-data", |c| Flag::when(!c.export_data)),
    ("--triggers", |c| Flag::when(c.export_triggers)),
    ("--events", |c| Flag::when(c.export_events)),
    ("--routines", |c| Flag::when(c.export_routines)),
    ("--no-views", |c| Flag::when(!c.export_views)),
    ("--regex", |c| Flag::text(&c.regex)),
];

fn lock_flag(config: &DumpConfig, flag: &str) -> Flag {
    Flag::when(config.lock_strategy.flag() == Some(flag))
}

/// Builds the dump tool's argument vector.
///
/// Fails with `MissingOutputDirectory` when the output directory is empty.
pub fn build_dump_args(config: &DumpConfig) -> Result<Vec<String>> {
    if config.output_dir.is_empty() {
        return Err(AppError::MissingOutputDirectory);
    }
    let mut args = Vec::with_capacity(64);
    push_flags(&mut args, config, DUMP_FLAGS);
    Ok(args)
}

/// Renders an argument vector for logs with the password value masked.
pub fn redacted(args: &[String]) -> String {
    let mut out = Vec::with_capacity(args.len());
    let mut mask_next = false;
    for arg in args {
        if mask_next {
            out.push("******");
            mask_next = false;
        } else {
            mask_next = arg == "--password";
            out.push(arg.as_str());
        }
    }
    out.join(" ")
}
