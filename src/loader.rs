use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::error::{LogQueryError, Result};
use crate::model::{FileError, LogFile};
use crate::parser::LogParser;
use crate::reader::FileReader;
use crate::scanner::{file_name, Discovery, FileScanner};

/// Files loaded for one operation, plus the ones that could not be read.
#[derive(Debug, Default)]
pub struct LoadedSet {
    pub files: Vec<LogFile>,
    pub errors: Vec<FileError>,
}

impl LoadedSet {
    pub fn record_count(&self) -> usize {
        self.files.iter().map(|f| f.records.len()).sum()
    }
}

/// File loader: discovery, reading and parsing. Nothing is cached between calls.
#[derive(Clone)]
pub struct LogLoader {
    log_dir: PathBuf,
    scanner: FileScanner,
    reader: FileReader,
    parser: LogParser,
}

impl LogLoader {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
            scanner: FileScanner::new(),
            reader: FileReader::default(),
            parser: LogParser::new(),
        }
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    pub fn discover(&self) -> Result<Discovery> {
        self.scanner.scan(&self.log_dir)
    }

    pub fn load_file(&self, path: &Path) -> Result<LogFile> {
        let meta = std::fs::metadata(path).map_err(|e| LogQueryError::FileUnreadable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let name = file_name(path);
        let text = self.reader.read_text(path)?;
        let (records, parse_failures) = self.parser.parse_text(&text, &name);
        if parse_failures > 0 {
            debug!("{}: {} malformed line(s)", name, parse_failures);
        }
        Ok(LogFile {
            name,
            path: path.to_path_buf(),
            size: meta.len(),
            modified: meta.modified().ok().map(DateTime::<Utc>::from),
            records,
            parse_failures,
        })
    }

    /// Load `names` (restricted to discovered files, in name order), or every
    /// discovered file when `names` is `None`. Unknown names are ignored.
    pub fn load(&self, names: Option<&[String]>) -> Result<LoadedSet> {
        let Discovery { files: discovered, errors } = self.discover()?;
        let candidates: Vec<PathBuf> = match names {
            Some(wanted) => discovered
                .into_iter()
                .filter(|p| {
                    let n = file_name(p);
                    wanted.iter().any(|w| *w == n)
                })
                .collect(),
            None => discovered,
        };

        let mut set = LoadedSet { files: Vec::new(), errors };
        for path in candidates {
            match self.load_file(&path) {
                Ok(file) => set.files.push(file),
                Err(e) => {
                    warn!("skipping {}: {}", path.display(), e);
                    set.errors.push(FileError {
                        file: file_name(&path),
                        reason: e.to_string(),
                    });
                }
            }
        }
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn load_counts_records_and_failures() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("a.log"),
            "{\"level\":\"INFO\"}\nnot-json\n\n{\"level\":\"ERROR\"}\n",
        )
        .unwrap();

        let set = LogLoader::new(dir.path()).load(None).unwrap();
        assert_eq!(set.files.len(), 1);
        let file = &set.files[0];
        assert_eq!(file.name, "a.log");
        assert_eq!(file.records.len(), 2);
        assert_eq!(file.parse_failures, 1);
        assert!(file.size > 0);
        assert!(file.modified.is_some());
    }

    #[test]
    fn named_subset_ignores_unknown_names() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.log"), "{}\n").unwrap();
        std::fs::write(dir.path().join("b.log"), "{}\n{}\n").unwrap();

        let loader = LogLoader::new(dir.path());
        let names = vec!["b.log".to_string(), "missing.log".to_string(), "../a.log".to_string()];
        let set = loader.load(Some(&names)).unwrap();
        assert_eq!(set.files.len(), 1);
        assert_eq!(set.files[0].name, "b.log");
        assert_eq!(set.record_count(), 2);

        let none = loader.load(Some(&["nope.log".to_string()])).unwrap();
        assert!(none.files.is_empty());
        assert!(none.errors.is_empty());
    }

    #[test]
    fn unreadable_file_is_reported_not_fatal() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("good.log"), "{}\n").unwrap();
        std::fs::write(dir.path().join("bad.log.gz"), b"not gzip at all").unwrap();

        let set = LogLoader::new(dir.path()).load(None).unwrap();
        assert_eq!(set.files.len(), 1);
        assert_eq!(set.errors.len(), 1);
        assert_eq!(set.errors[0].file, "bad.log.gz");
    }

    #[test]
    fn missing_directory_propagates() {
        let dir = tempdir().unwrap();
        let loader = LogLoader::new(dir.path().join("absent"));
        assert!(matches!(loader.load(None), Err(LogQueryError::DirectoryNotFound { .. })));
    }
}
