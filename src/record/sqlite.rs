// dumptool/src/record/sqlite.rs
use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use tracing::{debug, info};

use super::{Recorder, RunMethod, RunRecord, RunState, RunType, StoredCode};
use crate::dump::ConsistencyPoint;
use crate::errors::{AppError, Result};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS t_data_backup (
        id INTEGER NOT NULL PRIMARY KEY,
        type INTEGER NOT NULL,
        method INTEGER NOT NULL,
        state INTEGER NOT NULL,
        backup_dir TEXT NOT NULL DEFAULT '/backup',
        binlog_filename TEXT NOT NULL DEFAULT '',
        binlog_filepos INTEGER NOT NULL DEFAULT 0,
        binlog_uuid TEXT NOT NULL DEFAULT '',
        dump_started_at TEXT,
        dump_finished_at TEXT,
        start_timestamp TEXT NOT NULL,
        end_timestamp TEXT
    )
"#;

const INSERT_RECORD: &str = r#"
    INSERT INTO t_data_backup
        (id, type, method, state, backup_dir, binlog_filename, binlog_filepos, binlog_uuid,
         dump_started_at, dump_finished_at, start_timestamp, end_timestamp)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

const UPDATE_RECORD: &str = r#"
    UPDATE t_data_backup SET
        type = ?, method = ?, state = ?, backup_dir = ?,
        binlog_filename = ?, binlog_filepos = ?, binlog_uuid = ?,
        dump_started_at = ?, dump_finished_at = ?,
        start_timestamp = ?, end_timestamp = ?
    WHERE id = ?
"#;

const DELETE_RECORD: &str = "DELETE FROM t_data_backup WHERE id = ?";

const QUERY_RECORDS: &str = r#"
    SELECT id, type, method, state, backup_dir, binlog_filename, binlog_filepos, binlog_uuid,
           dump_started_at, dump_finished_at, start_timestamp, end_timestamp
    FROM t_data_backup
    ORDER BY id
"#;

/// Run records kept in a SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteRecorder {
    pool: SqlitePool,
}

impl SqliteRecorder {
    /// Opens (creating if needed) the database at `url` and ensures the table exists.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        sqlx::query(SCHEMA).execute(&pool).await?;
        info!(url, "Run record store ready");
        Ok(SqliteRecorder { pool })
    }
}

fn to_i64(field: &str, value: u64) -> Result<i64> {
    i64::try_from(value)
        .map_err(|_| AppError::Config(format!("{} {} does not fit the record store", field, value)))
}

fn to_u64(field: &str, value: i64) -> Result<u64> {
    u64::try_from(value)
        .map_err(|_| AppError::Config(format!("stored {} {} is negative", field, value)))
}

fn utc(ts: Option<DateTime<Local>>) -> Option<DateTime<Utc>> {
    ts.map(|t| t.with_timezone(&Utc))
}

fn local(ts: Option<DateTime<Utc>>) -> Option<DateTime<Local>> {
    ts.map(|t| t.with_timezone(&Local))
}

fn record_from_row(row: &SqliteRow) -> Result<RunRecord> {
    let start: DateTime<Utc> = row.try_get("start_timestamp")?;
    Ok(RunRecord {
        id: to_u64("id", row.try_get("id")?)?,
        run_type: RunType::from_code(row.try_get("type")?)?,
        method: RunMethod::from_code(row.try_get("method")?)?,
        state: RunState::from_code(row.try_get("state")?)?,
        backup_dir: row.try_get("backup_dir")?,
        consistency: ConsistencyPoint {
            start_timestamp: local(row.try_get("dump_started_at")?),
            end_timestamp: local(row.try_get("dump_finished_at")?),
            binlog_file_name: row.try_get("binlog_filename")?,
            binlog_file_pos: to_u64("binlog_filepos", row.try_get("binlog_filepos")?)?,
            binlog_uuid: row.try_get("binlog_uuid")?,
        },
        start_timestamp: start.with_timezone(&Local),
        end_timestamp: local(row.try_get("end_timestamp")?),
    })
}

#[async_trait]
impl Recorder for SqliteRecorder {
    async fn insert(&self, record: &RunRecord) -> Result<()> {
        sqlx::query(INSERT_RECORD)
            .bind(to_i64("id", record.id)?)
            .bind(record.run_type.code())
            .bind(record.method.code())
            .bind(record.state.code())
            .bind(&record.backup_dir)
            .bind(&record.consistency.binlog_file_name)
            .bind(to_i64("binlog_filepos", record.consistency.binlog_file_pos)?)
            .bind(&record.consistency.binlog_uuid)
            .bind(utc(record.consistency.start_timestamp))
            .bind(utc(record.consistency.end_timestamp))
            .bind(record.start_timestamp.with_timezone(&Utc))
            .bind(utc(record.end_timestamp))
            .execute(&self.pool)
            .await?;
        debug!(id = record.id, state = record.state.name(), "Inserted run record");
        Ok(())
    }

    async fn update(&self, record: &RunRecord) -> Result<()> {
        let result = sqlx::query(UPDATE_RECORD)
            .bind(record.run_type.code())
            .bind(record.method.code())
            .bind(record.state.code())
            .bind(&record.backup_dir)
            .bind(&record.consistency.binlog_file_name)
            .bind(to_i64("binlog_filepos", record.consistency.binlog_file_pos)?)
            .bind(&record.consistency.binlog_uuid)
            .bind(utc(record.consistency.start_timestamp))
            .bind(utc(record.consistency.end_timestamp))
            .bind(record.start_timestamp.with_timezone(&Utc))
            .bind(utc(record.end_timestamp))
            .bind(to_i64("id", record.id)?)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::Database(sqlx::Error::RowNotFound));
        }
        debug!(id = record.id, state = record.state.name(), "Updated run record");
        Ok(())
    }

    async fn delete(&self, id: u64) -> Result<()> {
        let result = sqlx::query(DELETE_RECORD)
            .bind(to_i64("id", id)?)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::Database(sqlx::Error::RowNotFound));
        }
        info!(id, "Deleted run record");
        Ok(())
    }

    async fn query(&self) -> Result<Vec<RunRecord>> {
        let rows = sqlx::query(QUERY_RECORDS).fetch_all(&self.pool).await?;
        rows.iter().map(record_from_row).collect()
    }
}
