use std::collections::BTreeSet;

use chrono::NaiveDateTime;

use crate::loader::LoadedSet;
use crate::model::{format_timestamp, round2, LogStats};

/// One pass over every loaded file.
pub fn compute_stats(set: &LoadedSet) -> LogStats {
    let mut stats = LogStats {
        total_files: set.files.len() + set.errors.len(),
        file_errors: set.errors.clone(),
        ..Default::default()
    };
    let mut modules = BTreeSet::new();
    let mut functions = BTreeSet::new();
    let mut earliest: Option<NaiveDateTime> = None;
    let mut latest: Option<NaiveDateTime> = None;

    for file in &set.files {
        stats.total_records += file.records.len();
        stats.total_failures += file.parse_failures;
        stats.per_file_counts.insert(file.name.clone(), file.records.len());

        for record in &file.records {
            *stats.per_level_counts.entry(record.level.clone()).or_insert(0) += 1;
            if !record.module.is_empty() {
                modules.insert(record.module.as_str());
            }
            if !record.function.is_empty() {
                functions.insert(record.function.as_str());
            }
            if let Some(ts) = record.parsed_time {
                earliest = Some(earliest.map_or(ts, |e| e.min(ts)));
                latest = Some(latest.map_or(ts, |l| l.max(ts)));
            }
        }
    }

    stats.unique_modules = modules.into_iter().map(str::to_string).collect();
    stats.unique_functions = functions.len();
    stats.earliest = earliest.as_ref().map(format_timestamp);
    stats.latest = latest.as_ref().map(format_timestamp);
    if let (Some(e), Some(l)) = (earliest, latest) {
        stats.span_hours = Some(round2((l - e).num_milliseconds() as f64 / 3_600_000.0));
    }
    stats
}
