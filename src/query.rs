use chrono::NaiveDateTime;

use crate::error::{LogQueryError, Result};
use crate::model::{LogLevel, LogRecord, QueryFilter};
use crate::parser::parse_timestamp;

/// Exact or prefix match on a text field. A trailing `*` selects prefix mode.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldMatch {
    Exact(String),
    Prefix(String),
}

impl FieldMatch {
    pub fn parse(pattern: &str) -> Self {
        match pattern.strip_suffix('*') {
            Some(prefix) => FieldMatch::Prefix(prefix.to_string()),
            None => FieldMatch::Exact(pattern.to_string()),
        }
    }

    pub fn is_match(&self, value: &str) -> bool {
        match self {
            FieldMatch::Exact(s) => value == s,
            FieldMatch::Prefix(p) => value.starts_with(p.as_str()),
        }
    }
}

/// Level predicate. Known severities match through their aliases (`WARN` is
/// `WARNING`, `FATAL` is `CRITICAL`); anything else compares the uppercased text.
#[derive(Debug, Clone, PartialEq)]
pub enum LevelMatch {
    Severity(LogLevel),
    Text(String),
}

impl LevelMatch {
    pub fn parse(raw: &str) -> Self {
        match LogLevel::parse(raw) {
            LogLevel::Unknown => LevelMatch::Text(raw.to_uppercase()),
            level => LevelMatch::Severity(level),
        }
    }

    pub fn is_match(&self, record: &LogRecord) -> bool {
        match self {
            LevelMatch::Severity(level) => record.severity() == *level,
            LevelMatch::Text(text) => record.level.to_uppercase() == *text,
        }
    }
}

/// A [`QueryFilter`] after validation, ready to apply to records.
#[derive(Debug, Clone)]
pub struct CompiledFilter {
    pub files: Option<Vec<String>>,
    pub level: Option<LevelMatch>,
    pub module: Option<FieldMatch>,
    pub function: Option<FieldMatch>,
    pub message_contains: Option<String>,
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
    pub limit: usize,
}

/// Query processor: validation and predicate evaluation.
#[derive(Clone, Default)]
pub struct QueryProcessor;

impl QueryProcessor {
    pub fn new() -> Self {
        Self
    }

    /// Validate `filter` without touching the file system.
    pub fn compile(&self, filter: &QueryFilter, default_limit: usize) -> Result<CompiledFilter> {
        let limit = match filter.limit {
            Some(n) if n <= 0 => {
                return Err(LogQueryError::InvalidFilter(format!("limit must be positive, got {n}")))
            }
            Some(n) => usize::try_from(n).unwrap_or(usize::MAX),
            None => default_limit,
        };

        let start = parse_bound("start_time", filter.start_time.as_deref())?;
        let end = parse_bound("end_time", filter.end_time.as_deref())?;
        if let (Some(s), Some(e)) = (start, end) {
            if s > e {
                return Err(LogQueryError::InvalidFilter(
                    "start_time is after end_time".to_string(),
                ));
            }
        }

        Ok(CompiledFilter {
            files: filter.files.clone(),
            level: non_empty(filter.level.as_deref()).map(LevelMatch::parse),
            module: non_empty(filter.module.as_deref()).map(FieldMatch::parse),
            function: non_empty(filter.function.as_deref()).map(FieldMatch::parse),
            message_contains: non_empty(filter.message_contains.as_deref()).map(str::to_lowercase),
            start,
            end,
            limit,
        })
    }

    /// Predicates in order: level, module, function, message, start, end.
    pub fn matches(&self, record: &LogRecord, filter: &CompiledFilter) -> bool {
        if let Some(level) = &filter.level {
            if !level.is_match(record) {
                return false;
            }
        }
        if let Some(m) = &filter.module {
            if !m.is_match(&record.module) {
                return false;
            }
        }
        if let Some(f) = &filter.function {
            if !f.is_match(&record.function) {
                return false;
            }
        }
        if let Some(needle) = &filter.message_contains {
            if !record.message.to_lowercase().contains(needle.as_str()) {
                return false;
            }
        }
        self.apply_time_filter(record.parsed_time, filter)
    }

    /// A record without a parsed timestamp fails any explicit bound.
    pub fn apply_time_filter(&self, ts: Option<NaiveDateTime>, filter: &CompiledFilter) -> bool {
        if filter.start.is_none() && filter.end.is_none() {
            return true;
        }
        let Some(ts) = ts else { return false };
        if let Some(start) = filter.start {
            if ts < start {
                return false;
            }
        }
        if let Some(end) = filter.end {
            if ts > end {
                return false;
            }
        }
        true
    }
}

fn non_empty(v: Option<&str>) -> Option<&str> {
    v.filter(|s| !s.is_empty())
}

fn parse_bound(name: &str, raw: Option<&str>) -> Result<Option<NaiveDateTime>> {
    match non_empty(raw) {
        None => Ok(None),
        Some(s) => parse_timestamp(s)
            .map(Some)
            .ok_or_else(|| LogQueryError::InvalidFilter(format!("{name} is not ISO-8601: {s:?}"))),
    }
}
