//! Repository walker shared by the built-in analysis tools.

use crate::error::ToolError;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Directory names never descended into.
pub const DEFAULT_IGNORES: &[&str] = &[
    ".git",
    "target",
    "node_modules",
    ".cargo",
    ".venv",
    "__pycache__",
    "dist",
    "build",
];

/// A regular file inside the repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoFile {
    /// Path relative to the repository root, `/`-separated
    pub relative: String,
    pub absolute: PathBuf,
    pub size: u64,
}

impl RepoFile {
    pub fn file_name(&self) -> &str {
        self.relative.rsplit('/').next().unwrap_or(&self.relative)
    }

    pub fn extension(&self) -> Option<&str> {
        let name = self.file_name();
        let (stem, ext) = name.rsplit_once('.')?;
        if stem.is_empty() {
            None
        } else {
            Some(ext)
        }
    }

    /// Top-level component, or `None` for files at the root.
    pub fn top_level(&self) -> Option<&str> {
        self.relative.split_once('/').map(|(head, _)| head)
    }

    /// Parent directory relative to the root; empty at the root.
    pub fn parent(&self) -> &str {
        self.relative.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
    }

    pub fn depth(&self) -> usize {
        self.relative.matches('/').count()
    }
}

/// Walker configuration
#[derive(Debug, Clone)]
pub struct WalkerConfig {
    pub follow_symlinks: bool,
    pub ignore_names: Vec<String>,
    pub max_depth: Option<usize>,
}

impl Default for WalkerConfig {
    fn default() -> Self {
        Self {
            follow_symlinks: false,
            ignore_names: DEFAULT_IGNORES.iter().map(|s| s.to_string()).collect(),
            max_depth: None,
        }
    }
}

pub struct RepoWalker {
    root: PathBuf,
    config: WalkerConfig,
}

impl RepoWalker {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            config: WalkerConfig::default(),
        }
    }

    pub fn with_config(root: impl Into<PathBuf>, config: WalkerConfig) -> Self {
        Self {
            root: root.into(),
            config,
        }
    }

    /// Collect every regular file, sorted by relative path.
    pub fn files(&self) -> Result<Vec<RepoFile>, ToolError> {
        if !self.root.is_dir() {
            return Err(ToolError::RepositoryUnavailable(format!(
                "{} is not a directory",
                self.root.display()
            )));
        }

        let walker = WalkDir::new(&self.root)
            .follow_links(self.config.follow_symlinks)
            .max_depth(self.config.max_depth.unwrap_or(usize::MAX))
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !self.is_ignored(entry));

        let mut files = Vec::new();
        for entry in walker {
            let entry = entry.map_err(|e| {
                ToolError::IoError(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    format!("Failed to walk repository: {}", e),
                ))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            files.push(RepoFile {
                relative: relative_path(&self.root, entry.path()),
                absolute: entry.path().to_path_buf(),
                size,
            });
        }
        files.sort_by(|a, b| a.relative.cmp(&b.relative));
        Ok(files)
    }

    fn is_ignored(&self, entry: &DirEntry) -> bool {
        if entry.depth() == 0 {
            return false;
        }
        let name = entry.file_name().to_string_lossy();
        self.config.ignore_names.iter().any(|p| p.as_str() == name)
    }
}

fn relative_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
