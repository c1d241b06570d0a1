use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use crate::aggregate::Aggregator;
use crate::config::Config;
use crate::error::{LogQueryError, Result};
use crate::loader::LogLoader;
use crate::model::{
    AggregateResponse, AggregationKey, ListFilesResponse, LogFileInfo, LogStats, QueryFilter,
    QueryResponse, ResourceInfo,
};
use crate::query::QueryProcessor;
use crate::scanner::file_name;
use crate::stats::compute_stats;

pub const RESOURCE_SCHEME: &str = "logs";

/// Log engine: the operations exposed to transports. Every call re-reads the
/// log directory.
pub struct LogEngine {
    config: Arc<Config>,
    loader: LogLoader,
    query: QueryProcessor,
}

impl LogEngine {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            loader: LogLoader::new(config.log_dir.clone()),
            query: QueryProcessor::new(),
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn list_log_files(&self) -> Result<ListFilesResponse> {
        let set = self.loader.load(None)?;
        let files = set
            .files
            .iter()
            .map(|f| LogFileInfo {
                name: f.name.clone(),
                size: f.size,
                modified: f.modified.map(|m| m.to_rfc3339()),
                record_count: f.records.len(),
                parse_failures: f.parse_failures,
            })
            .collect();
        Ok(ListFilesResponse { files, errors: set.errors })
    }

    pub fn query_logs(&self, filter: &QueryFilter) -> Result<QueryResponse> {
        let started = Instant::now();
        let compiled = self.query.compile(filter, self.config.query.default_limit)?;
        let set = self.loader.load(compiled.files.as_deref())?;

        let mut matches = Vec::new();
        let mut total_matched = 0usize;
        for record in set.files.iter().flat_map(|f| f.records.iter()) {
            if !self.query.matches(record, &compiled) {
                continue;
            }
            total_matched += 1;
            if matches.len() < compiled.limit {
                matches.push(record.clone());
            }
        }

        debug!(
            "query_logs: {} of {} matched in {:?}",
            total_matched,
            set.record_count(),
            started.elapsed()
        );
        Ok(QueryResponse {
            matches,
            total_matched,
            truncated: total_matched > compiled.limit,
            files_searched: set.files.len(),
            file_errors: set.errors,
        })
    }

    pub fn aggregate_logs(&self, files: Option<&[String]>, group_by: &str) -> Result<AggregateResponse> {
        let key: AggregationKey = group_by.parse()?;
        let set = self.loader.load(files)?;
        let (groups, total) = Aggregator::new(key).aggregate(set.files.iter().flat_map(|f| f.records.iter()));
        debug!("aggregate_logs by {}: {} groups over {} records", key.as_str(), groups.len(), total);
        Ok(AggregateResponse {
            group_by: key.as_str().to_string(),
            groups,
            total,
            file_errors: set.errors,
        })
    }

    pub fn get_log_stats(&self) -> Result<LogStats> {
        let set = self.loader.load(None)?;
        Ok(compute_stats(&set))
    }

    pub fn list_resources(&self) -> Result<Vec<ResourceInfo>> {
        let listing = self.list_log_files()?;
        Ok(listing
            .files
            .into_iter()
            .map(|f| ResourceInfo {
                uri: format!("{RESOURCE_SCHEME}://{}", urlencoding::encode(&f.name)),
                description: format!(
                    "Size: {} bytes, Modified: {}",
                    f.size,
                    f.modified.as_deref().unwrap_or("unknown")
                ),
                name: format!("Log file: {}", f.name),
                mime_type: "application/json".to_string(),
            })
            .collect())
    }

    /// Contents of `logs://<name>` as a JSON array of records.
    pub fn read_resource(&self, uri: &str) -> Result<String> {
        let rest = uri
            .strip_prefix(RESOURCE_SCHEME)
            .and_then(|r| r.strip_prefix("://"))
            .ok_or_else(|| LogQueryError::InvalidRequest(format!("unsupported resource uri: {uri}")))?;
        let name = urlencoding::decode(rest.trim_start_matches('/'))
            .map_err(|e| LogQueryError::InvalidRequest(format!("bad resource uri {uri}: {e}")))?
            .into_owned();
        if name.is_empty() {
            return Err(LogQueryError::InvalidRequest("no file name in resource uri".into()));
        }

        let path = self
            .loader
            .discover()?
            .files
            .into_iter()
            .find(|p| file_name(p) == name)
            .ok_or_else(|| LogQueryError::NotFound(format!("log file {name}")))?;
        let file = self.loader.load_file(&path)?;
        let records: Vec<_> = file
            .records
            .into_iter()
            .take(self.config.query.resource_max_records)
            .collect();
        info!("read resource {} ({} records)", name, records.len());
        serde_json::to_string_pretty(&records)
            .map_err(|e| LogQueryError::InvalidRequest(format!("serialize {name}: {e}")))
    }
}
