use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};

use crate::model::LogRecord;

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Outcome of parsing one physical line.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedLine {
    Blank,
    Record(LogRecord),
    Malformed,
}

/// Record parser: one line of JSON text into a [`LogRecord`].
#[derive(Clone, Default)]
pub struct LogParser;

impl LogParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse_line(&self, line: &str, file: &str, line_number: usize) -> ParsedLine {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return ParsedLine::Blank;
        }
        match serde_json::from_str::<Value>(trimmed) {
            Ok(Value::Object(obj)) => ParsedLine::Record(record_from_object(&obj, file, line_number)),
            _ => ParsedLine::Malformed,
        }
    }

    /// Parse a whole file's text, returning records in order and the malformed line count.
    pub fn parse_text(&self, text: &str, file: &str) -> (Vec<LogRecord>, usize) {
        let mut records = Vec::new();
        let mut failures = 0usize;
        for (idx, line) in text.lines().enumerate() {
            match self.parse_line(line, file, idx + 1) {
                ParsedLine::Record(r) => records.push(r),
                ParsedLine::Malformed => failures += 1,
                ParsedLine::Blank => {}
            }
        }
        (records, failures)
    }
}

fn record_from_object(obj: &Map<String, Value>, file: &str, line_number: usize) -> LogRecord {
    let timestamp = text_field(obj, "timestamp");
    let parsed_time = match obj.get("timestamp") {
        Some(Value::String(s)) => parse_timestamp(s),
        _ => None,
    };
    LogRecord {
        timestamp,
        level: text_field(obj, "level").unwrap_or_else(|| "UNKNOWN".to_string()),
        message: text_field(obj, "message").unwrap_or_default(),
        module: text_field(obj, "module").unwrap_or_default(),
        function: text_field(obj, "function").unwrap_or_default(),
        line: int_field(obj, "line"),
        file: file.to_string(),
        line_number,
        parsed_time,
    }
}

fn text_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    match obj.get(key) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => Some(other.to_string()),
    }
}

fn int_field(obj: &Map<String, Value>, key: &str) -> i64 {
    match obj.get(key) {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)).unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

/// Parse ISO-8601 timestamp text. Offsets are normalized to UTC and dropped.
pub fn parse_timestamp(input: &str) -> Option<NaiveDateTime> {
    let s = input.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}
