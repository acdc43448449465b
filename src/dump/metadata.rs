// dumptool/src/dump/metadata.rs
use chrono::offset::LocalResult;
use chrono::{DateTime, Duration, Local, NaiveDateTime, TimeZone};
use serde::Serialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, warn};

use crate::errors::{AppError, Result};

pub const METADATA_FILE_NAME: &str = "metadata";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Binlog coordinates and timestamps recorded by a finished dump.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConsistencyPoint {
    pub start_timestamp: Option<DateTime<Local>>,
    pub end_timestamp: Option<DateTime<Local>>,
    pub binlog_file_name: String,
    pub binlog_file_pos: u64,
    /// Empty when the source has GTID disabled.
    pub binlog_uuid: String,
}

/// Fact markers recognised in a metadata line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    Started,
    Log,
    Pos,
    Gtid,
    Finished,
}

const MARKERS: [(&str, Marker); 5] = [
    ("Started", Marker::Started),
    ("Log", Marker::Log),
    ("Pos", Marker::Pos),
    ("GTID", Marker::Gtid),
    ("Finished", Marker::Finished),
];

/// Returns every marker whose keyword occurs anywhere in `line`.
///
/// Matching is by substring, so one line may yield several markers.
pub fn classify(line: &str) -> Vec<Marker> {
    MARKERS
        .iter()
        .filter(|(keyword, _)| line.contains(keyword))
        .map(|(_, marker)| *marker)
        .collect()
}

/// Everything after the first colon, left-trimmed. Empty if there is no colon.
fn fact_value(line: &str) -> &str {
    line.split_once(':')
        .map(|(_, value)| value.trim_start())
        .unwrap_or("")
}

fn parse_timestamp(value: &str) -> Option<DateTime<Local>> {
    let naive = NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT).ok()?;
    to_local(naive, &Local)
}

/// Resolves a wall-clock time in `tz`. Ambiguous times take the earlier
/// instant; times inside a forward gap are shifted past it.
fn to_local<Tz: TimeZone>(naive: NaiveDateTime, tz: &Tz) -> Option<DateTime<Tz>> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(ts) | LocalResult::Ambiguous(ts, _) => Some(ts),
        LocalResult::None => (1..=24)
            .map(|quarters| naive + Duration::minutes(15 * quarters))
            .find_map(|shifted| tz.from_local_datetime(&shifted).earliest()),
    }
}

impl ConsistencyPoint {
    /// Applies one metadata line. Unparseable values leave their field untouched.
    pub fn apply_line(&mut self, raw: &str) {
        let line = raw.trim();
        for marker in classify(line) {
            let value = fact_value(line);
            match marker {
                Marker::Started => match parse_timestamp(value) {
                    Some(ts) => self.start_timestamp = Some(ts),
                    None => debug!(value, "Ignoring unparseable start timestamp"),
                },
                Marker::Log => self.binlog_file_name = value.to_string(),
                Marker::Pos => match value.parse::<u64>() {
                    Ok(pos) => self.binlog_file_pos = pos,
                    Err(_) => debug!(value, "Ignoring unparseable binlog position"),
                },
                Marker::Gtid => self.binlog_uuid = value.to_string(),
                Marker::Finished => match parse_timestamp(value) {
                    Some(ts) => self.end_timestamp = Some(ts),
                    None => debug!(value, "Ignoring unparseable finish timestamp"),
                },
            }
        }
    }

    /// Parses metadata text read from any buffered source.
    ///
    /// Reading stops at end of input or at the first I/O error. Lines that are
    /// not valid UTF-8 are decoded lossily and still parsed.
    pub fn from_reader<R: BufRead>(mut reader: R) -> Self {
        let mut point = ConsistencyPoint::default();
        let mut line = Vec::new();
        loop {
            line.clear();
            match reader.read_until(b'\n', &mut line) {
                Ok(0) => break,
                Ok(_) => point.apply_line(&String::from_utf8_lossy(&line)),
                Err(e) => {
                    warn!(error = %e, "Stopped reading metadata early");
                    break;
                }
            }
        }
        point
    }

    /// Reads `<output_dir>/metadata`.
    ///
    /// Fails only with `MetadataFileUnreadable` when the file cannot be opened;
    /// missing facts leave their fields at the default.
    pub fn read_from_dir(output_dir: &Path) -> Result<Self> {
        let path = output_dir.join(METADATA_FILE_NAME);
        let file = File::open(&path).map_err(|source| AppError::MetadataFileUnreadable {
            path: path.clone(),
            source,
        })?;
        let point = Self::from_reader(BufReader::new(file));
        debug!(path = %path.display(), ?point, "Parsed dump metadata");
        Ok(point)
    }
}
