//! File discovery for staging uploads.
//!
//! Turns `--file` and `--dir` arguments into (name, text) pairs,
//! respecting the configured extensions, excludes, and size limit.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

/// Configuration for file scanning.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// File extensions to include (e.g., ["txt", "eml"])
    pub extensions: Vec<String>,
    /// Names to exclude (e.g., ["node_modules", ".git"])
    pub excludes: Vec<String>,
    /// Maximum file size in bytes
    pub max_file_size: u64,
    /// Maximum number of files taken from one directory
    pub max_files: usize,
}

impl From<&crate::config::ScannerConfig> for ScanConfig {
    fn from(config: &crate::config::ScannerConfig) -> Self {
        Self {
            extensions: config.extensions.clone(),
            excludes: config.excludes.clone(),
            max_file_size: config.max_file_size,
            max_files: config.max_files,
        }
    }
}

/// A file ready to be staged.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedFile {
    /// Display name (path relative to the scanned directory, or file name)
    pub name: String,
    pub path: PathBuf,
    /// Decoded text content
    pub content: String,
}

pub struct FileScanner {
    config: ScanConfig,
}

impl FileScanner {
    pub fn new(config: ScanConfig) -> Self {
        Self { config }
    }

    /// Read one explicitly named file. Unlike directory scans, a file that
    /// cannot be read as text is an error.
    pub fn load_file(&self, path: &Path) -> Result<LoadedFile> {
        let size = std::fs::metadata(path)
            .with_context(|| format!("Failed to read {}", path.display()))?
            .len();
        if size > self.config.max_file_size {
            anyhow::bail!(
                "{} is {} bytes, above the {} byte limit",
                path.display(),
                size,
                self.config.max_file_size
            );
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {} as text", path.display()))?;

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());

        Ok(LoadedFile {
            name,
            path: path.to_path_buf(),
            content,
        })
    }

    /// Collect matching text files under `dir`, sorted by path.
    ///
    /// Unreadable, oversized, non-UTF-8 and empty files are skipped.
    pub fn collect(&self, dir: &Path) -> Result<Vec<LoadedFile>> {
        if !dir.is_dir() {
            anyhow::bail!("Not a directory: {}", dir.display());
        }

        let mut files = Vec::new();
        let walker = WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !self.is_excluded(e));

        for entry in walker {
            if files.len() >= self.config.max_files {
                debug!("Reached max_files ({}) in {}", self.config.max_files, dir.display());
                break;
            }

            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    debug!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };

            if !entry.file_type().is_file() || !self.matches(&entry) {
                continue;
            }

            let path = entry.path();
            match std::fs::read_to_string(path) {
                Ok(content) if content.trim().is_empty() => {
                    debug!("Skipping empty file {}", path.display());
                }
                Ok(content) => {
                    let name = path
                        .strip_prefix(dir)
                        .unwrap_or(path)
                        .to_string_lossy()
                        .to_string();
                    files.push(LoadedFile {
                        name,
                        path: path.to_path_buf(),
                        content,
                    });
                }
                Err(e) => warn!("Skipping {}: {}", path.display(), e),
            }
        }

        Ok(files)
    }

    /// Check extension and size.
    fn matches(&self, entry: &DirEntry) -> bool {
        let ext = entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();
        if !self.config.extensions.iter().any(|e| e.eq_ignore_ascii_case(&ext)) {
            return false;
        }

        match entry.metadata() {
            Ok(metadata) => metadata.len() <= self.config.max_file_size,
            Err(_) => false,
        }
    }

    /// Hidden entries and explicit excludes.
    fn is_excluded(&self, entry: &DirEntry) -> bool {
        let name = entry.file_name().to_string_lossy();
        name.starts_with('.') || self.config.excludes.iter().any(|pattern| name == pattern.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn scanner() -> FileScanner {
        FileScanner::new(ScanConfig::from(&crate::config::ScannerConfig::default()))
    }

    #[test]
    fn test_collect_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("b.txt"), "second").unwrap();
        fs::write(root.join("a.eml"), "first").unwrap();
        fs::write(root.join("image.png"), "not text we want").unwrap();
        fs::write(root.join("empty.txt"), "   ").unwrap();
        fs::write(root.join(".hidden.txt"), "hidden").unwrap();
        fs::create_dir(root.join("node_modules")).unwrap();
        fs::write(root.join("node_modules").join("x.txt"), "excluded").unwrap();
        fs::create_dir(root.join("inbox")).unwrap();
        fs::write(root.join("inbox").join("c.txt"), "nested").unwrap();
        fs::write(root.join("binary.txt"), [0xff, 0xfe, 0x00, 0x80]).unwrap();

        let files = scanner().collect(root).unwrap();
        let names: Vec<_> = files.iter().map(|f| f.name.replace('\\', "/")).collect();

        assert_eq!(names, vec!["a.eml", "b.txt", "inbox/c.txt"]);
        assert_eq!(files[0].content, "first");
    }

    #[test]
    fn test_collect_respects_max_files() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..5 {
            fs::write(dir.path().join(format!("{}.txt", i)), "content").unwrap();
        }

        let mut config = ScanConfig::from(&crate::config::ScannerConfig::default());
        config.max_files = 2;
        let files = FileScanner::new(config).collect(dir.path()).unwrap();
        assert_eq!(files.len(), 2);
    }

    #[test]
    fn test_load_file_uses_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notice.txt");
        fs::write(&path, "Your parcel is waiting").unwrap();

        let loaded = scanner().load_file(&path).unwrap();
        assert_eq!(loaded.name, "notice.txt");
        assert_eq!(loaded.content, "Your parcel is waiting");
    }

    #[test]
    fn test_load_file_rejects_oversized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.txt");
        fs::write(&path, "x".repeat(64)).unwrap();

        let mut config = ScanConfig::from(&crate::config::ScannerConfig::default());
        config.max_file_size = 16;
        assert!(FileScanner::new(config).load_file(&path).is_err());
    }
}
