use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LogQueryError;

/// Severity classification of a record's `level` text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
    Unknown,
}

impl LogLevel {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "DEBUG" => LogLevel::Debug,
            "INFO" => LogLevel::Info,
            "WARNING" | "WARN" => LogLevel::Warning,
            "ERROR" => LogLevel::Error,
            "CRITICAL" | "FATAL" => LogLevel::Critical,
            _ => LogLevel::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
            LogLevel::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One parsed JSON log line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogRecord {
    /// Timestamp text as written in the file.
    pub timestamp: Option<String>,
    pub level: String,
    pub message: String,
    pub module: String,
    pub function: String,
    pub line: i64,
    /// Source file name.
    pub file: String,
    /// 1-based physical line in `file`.
    pub line_number: usize,
    #[serde(skip)]
    pub parsed_time: Option<NaiveDateTime>,
}

impl LogRecord {
    pub fn severity(&self) -> LogLevel {
        LogLevel::parse(&self.level)
    }
}

/// A log file loaded for one operation.
#[derive(Debug, Clone)]
pub struct LogFile {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
    pub records: Vec<LogRecord>,
    pub parse_failures: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileError {
    pub file: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryFilter {
    #[serde(default)]
    pub files: Option<Vec<String>>,
    #[serde(default)]
    pub level: Option<String>,
    /// Exact match, or prefix match when the value ends in `*`.
    #[serde(default)]
    pub module: Option<String>,
    /// Exact match, or prefix match when the value ends in `*`.
    #[serde(default)]
    pub function: Option<String>,
    #[serde(default)]
    pub message_contains: Option<String>,
    #[serde(default, alias = "startTime")]
    pub start_time: Option<String>,
    #[serde(default, alias = "endTime")]
    pub end_time: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationKey {
    Level,
    Module,
    Function,
    Hour,
}

impl AggregationKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregationKey::Level => "level",
            AggregationKey::Module => "module",
            AggregationKey::Function => "function",
            AggregationKey::Hour => "hour",
        }
    }
}

impl FromStr for AggregationKey {
    type Err = LogQueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "level" => Ok(AggregationKey::Level),
            "module" => Ok(AggregationKey::Module),
            "function" => Ok(AggregationKey::Function),
            "hour" => Ok(AggregationKey::Hour),
            other => Err(LogQueryError::InvalidGroupKey(format!(
                "{other:?} (expected one of level, module, function, hour)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AggregateRequest {
    #[serde(default)]
    pub files: Option<Vec<String>>,
    pub group_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogFileInfo {
    pub name: String,
    pub size: u64,
    pub modified: Option<String>,
    pub record_count: usize,
    pub parse_failures: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListFilesResponse {
    pub files: Vec<LogFileInfo>,
    pub errors: Vec<FileError>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    pub matches: Vec<LogRecord>,
    pub total_matched: usize,
    pub truncated: bool,
    pub files_searched: usize,
    pub file_errors: Vec<FileError>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupCount {
    pub label: String,
    pub count: usize,
    pub percentage: f64,
    pub first_seen: Option<String>,
    pub last_seen: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateResponse {
    pub group_by: String,
    pub groups: Vec<GroupCount>,
    pub total: usize,
    pub file_errors: Vec<FileError>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogStats {
    pub total_files: usize,
    pub total_records: usize,
    pub total_failures: usize,
    pub per_level_counts: BTreeMap<String, usize>,
    pub earliest: Option<String>,
    pub latest: Option<String>,
    pub span_hours: Option<f64>,
    pub per_file_counts: BTreeMap<String, usize>,
    pub unique_modules: Vec<String>,
    pub unique_functions: usize,
    pub file_errors: Vec<FileError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceInfo {
    pub uri: String,
    pub name: String,
    pub description: String,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
}

/// ISO-8601 rendering without offset; fractional seconds only when present.
pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.f").to_string()
}

pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn level_parse_is_case_insensitive() {
        assert_eq!(LogLevel::parse("error"), LogLevel::Error);
        assert_eq!(LogLevel::parse("Warn"), LogLevel::Warning);
        assert_eq!(LogLevel::parse("fatal"), LogLevel::Critical);
        assert_eq!(LogLevel::parse("TRACE"), LogLevel::Unknown);
    }

    #[test]
    fn aggregation_key_rejects_unknown() {
        assert_eq!("hour".parse::<AggregationKey>().unwrap(), AggregationKey::Hour);
        let err = "day".parse::<AggregationKey>().unwrap_err();
        assert!(matches!(err, LogQueryError::InvalidGroupKey(_)));
    }

    #[test]
    fn timestamp_format_keeps_micros() {
        let ts = NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_micro_opt(10, 30, 45, 123456)
            .unwrap();
        assert_eq!(format_timestamp(&ts), "2024-01-15T10:30:45.123456");

        let whole = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap().and_hms_opt(10, 0, 0).unwrap();
        assert_eq!(format_timestamp(&whole), "2024-01-15T10:00:00");
    }
}
