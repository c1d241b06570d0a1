use std::collections::HashMap;

use chrono::NaiveDateTime;

use crate::model::{format_timestamp, round2, AggregationKey, GroupCount, LogRecord};

pub const UNKNOWN_HOUR_LABEL: &str = "unknown";

/// Group label of `record` under `key`.
pub fn group_label(record: &LogRecord, key: AggregationKey) -> String {
    match key {
        AggregationKey::Level => record.level.clone(),
        AggregationKey::Module => record.module.clone(),
        AggregationKey::Function => record.function.clone(),
        AggregationKey::Hour => match record.parsed_time {
            Some(ts) => ts.format("%Y-%m-%dT%H:00:00").to_string(),
            None => UNKNOWN_HOUR_LABEL.to_string(),
        },
    }
}

#[derive(Default)]
struct Bucket {
    count: usize,
    first: Option<NaiveDateTime>,
    last: Option<NaiveDateTime>,
}

/// Counts records per group. Output is ordered by count descending, then label.
#[derive(Debug, Clone, Copy)]
pub struct Aggregator {
    key: AggregationKey,
}

impl Aggregator {
    pub fn new(key: AggregationKey) -> Self {
        Self { key }
    }

    pub fn aggregate<'a>(&self, records: impl IntoIterator<Item = &'a LogRecord>) -> (Vec<GroupCount>, usize) {
        let mut buckets: HashMap<String, Bucket> = HashMap::new();
        let mut total = 0usize;
        for record in records {
            total += 1;
            let bucket = buckets.entry(group_label(record, self.key)).or_default();
            bucket.count += 1;
            if let Some(ts) = record.parsed_time {
                bucket.first = Some(bucket.first.map_or(ts, |f| f.min(ts)));
                bucket.last = Some(bucket.last.map_or(ts, |l| l.max(ts)));
            }
        }

        let mut groups: Vec<GroupCount> = buckets
            .into_iter()
            .map(|(label, b)| GroupCount {
                label,
                count: b.count,
                percentage: if total == 0 { 0.0 } else { round2(b.count as f64 * 100.0 / total as f64) },
                first_seen: b.first.as_ref().map(format_timestamp),
                last_seen: b.last.as_ref().map(format_timestamp),
            })
            .collect();
        groups.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
        (groups, total)
    }
}
