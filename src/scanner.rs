use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobMatcher};
use tracing::warn;
use walkdir::WalkDir;

use crate::error::{LogQueryError, Result};
use crate::model::FileError;

pub const LOG_FILE_GLOB: &str = "*.log*";

/// Matching files plus the directory entries that could not be inspected.
#[derive(Debug, Default)]
pub struct Discovery {
    pub files: Vec<PathBuf>,
    pub errors: Vec<FileError>,
}

/// Directory scanner: the files directly inside the log directory whose name
/// matches `*.log*`. Matching is case-sensitive on every platform.
#[derive(Clone)]
pub struct FileScanner {
    matcher: GlobMatcher,
}

impl Default for FileScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl FileScanner {
    pub fn new() -> Self {
        Self::with_pattern(LOG_FILE_GLOB).unwrap_or_else(|_| unreachable!("static glob is valid"))
    }

    pub fn with_pattern(pattern: &str) -> Result<Self> {
        let glob = GlobBuilder::new(pattern)
            .case_insensitive(false)
            .literal_separator(true)
            .build()
            .map_err(|e| LogQueryError::ConfigError(e.to_string()))?;
        Ok(Self { matcher: glob.compile_matcher() })
    }

    /// Sorted by file name. Subdirectories are not descended into.
    /// Entries that cannot be inspected are returned in `errors`; failing to
    /// list the directory itself is fatal.
    pub fn scan(&self, dir: &Path) -> Result<Discovery> {
        if !dir.is_dir() {
            return Err(LogQueryError::DirectoryNotFound { path: dir.to_path_buf() });
        }

        let mut found = Discovery::default();
        for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.depth() == 0 => {
                    return Err(LogQueryError::DirectoryUnreadable {
                        path: dir.to_path_buf(),
                        reason: e.to_string(),
                    });
                }
                Err(e) => {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| dir.to_path_buf());
                    warn!("cannot inspect {}: {}", path.display(), e);
                    found.errors.push(FileError { file: file_name(&path), reason: e.to_string() });
                    continue;
                }
            };
            if !entry.file_type().is_file() && !entry.path().is_file() {
                continue;
            }
            let name = entry.file_name();
            if self.matcher.is_match(Path::new(name)) {
                found.files.push(entry.into_path());
            }
        }

        found.files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        Ok(found)
    }
}

/// File name as used in tool arguments and record provenance.
pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn touch(path: &Path) {
        std::fs::write(path, b"{}\n").unwrap();
    }

    #[test]
    fn scan_matches_log_glob_sorted() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("b.log"));
        touch(&root.join("a.log.1"));
        touch(&root.join("c.log.gz"));
        touch(&root.join("notes.txt"));
        touch(&root.join("UPPER.LOG"));
        std::fs::create_dir_all(root.join("nested")).unwrap();
        touch(&root.join("nested").join("deep.log"));
        std::fs::create_dir_all(root.join("dir.log")).unwrap();

        let found = FileScanner::new().scan(root).unwrap();
        assert!(found.errors.is_empty());
        let names: Vec<String> = found.files.iter().map(|p| file_name(p)).collect();
        assert_eq!(names, vec!["a.log.1", "b.log", "c.log.gz"]);
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("gone");
        let err = FileScanner::new().scan(&missing).unwrap_err();
        match err {
            LogQueryError::DirectoryNotFound { path } => assert_eq!(path, missing),
            other => panic!("expected DirectoryNotFound, got {other:?}"),
        }
    }

    #[test]
    fn regular_file_is_not_a_directory() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("app.log");
        touch(&file);
        assert!(matches!(
            FileScanner::new().scan(&file),
            Err(LogQueryError::DirectoryNotFound { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn unlistable_directory_is_fatal() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let locked = dir.path().join("locked");
        std::fs::create_dir(&locked).unwrap();
        touch(&locked.join("app.log"));
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o000)).unwrap();

        // privileged users can still list it; nothing to check then
        let listable = std::fs::read_dir(&locked).is_ok();
        let result = FileScanner::new().scan(&locked);
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();
        if listable {
            return;
        }

        match result {
            Err(LogQueryError::DirectoryUnreadable { path, .. }) => assert_eq!(path, locked),
            other => panic!("expected DirectoryUnreadable, got {other:?}"),
        }
    }
}
