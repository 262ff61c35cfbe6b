use super::{FileListing, ListedFile, WorkspaceError};
use ignore::{overrides::OverrideBuilder, WalkBuilder};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

const DEFAULT_EXCLUDED_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "__pycache__",
    ".venv",
    "env",
    "target",
    "vendor",
];

#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub max_depth: usize,
    pub max_files: usize,
    /// Files larger than this are listed without content
    pub max_content_bytes: u64,
    pub excluded_dirs: Vec<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_depth: 10,
            max_files: 5000,
            max_content_bytes: 64 * 1024,
            excluded_dirs: DEFAULT_EXCLUDED_DIRS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

pub struct WorkspaceScanner {
    root: PathBuf,
    config: ScanConfig,
}

impl WorkspaceScanner {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            config: ScanConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ScanConfig) -> Self {
        self.config = config;
        self
    }

    pub fn scan(&self) -> Result<FileListing, WorkspaceError> {
        if !self.root.is_dir() {
            return Err(WorkspaceError::NotFound(self.root.clone()));
        }

        let start = Instant::now();

        let mut override_builder = OverrideBuilder::new(&self.root);
        for excluded in &self.config.excluded_dirs {
            override_builder
                .add(&format!("!{}/", excluded))
                .map_err(|e| WorkspaceError::Scan(e.to_string()))?;
        }
        let overrides = override_builder
            .build()
            .map_err(|e| WorkspaceError::Scan(e.to_string()))?;

        let mut entries = Vec::new();

        for result in WalkBuilder::new(&self.root)
            .max_depth(Some(self.config.max_depth))
            .hidden(false)
            .git_ignore(true)
            .require_git(false)
            .overrides(overrides)
            .build()
        {
            let entry = match result {
                Ok(e) => e,
                Err(err) => {
                    warn!(error = %err, "Failed to read directory entry");
                    continue;
                }
            };

            let path = entry.path();
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            if self.is_excluded(path) {
                continue;
            }

            if entries.len() >= self.config.max_files {
                warn!(
                    files_scanned = entries.len(),
                    max_files = self.config.max_files,
                    "Reached file limit, stopping scan"
                );
                break;
            }

            entries.push(self.list_file(path)?);
        }

        info!(
            files = entries.len(),
            scan_time_ms = start.elapsed().as_millis() as u64,
            "Workspace scan completed"
        );

        Ok(FileListing::new(entries))
    }

    fn list_file(&self, path: &Path) -> Result<ListedFile, WorkspaceError> {
        let metadata = std::fs::metadata(path).map_err(|e| WorkspaceError::io(path, e))?;
        let size = metadata.len();

        let content = if size <= self.config.max_content_bytes {
            let bytes = std::fs::read(path).map_err(|e| WorkspaceError::io(path, e))?;
            String::from_utf8(bytes).ok()
        } else {
            debug!(path = %path.display(), size, "Skipping content of large file");
            None
        };

        let rel_path = path
            .strip_prefix(&self.root)
            .unwrap_or(path)
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        Ok(ListedFile {
            path: rel_path,
            size,
            content,
        })
    }

    // Ancestors are checked too, since overrides only match relative to the root
    fn is_excluded(&self, path: &Path) -> bool {
        let rel = path.strip_prefix(&self.root).unwrap_or(path);
        rel.parent()
            .map(|parent| {
                parent.components().any(|c| {
                    let name = c.as_os_str().to_string_lossy();
                    self.config.excluded_dirs.iter().any(|d| d == name.as_ref())
                })
            })
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn create_test_repo() -> TempDir {
        let dir = TempDir::new().unwrap();
        let base = dir.path();

        fs::write(base.join("package.json"), r#"{"name":"web","main":"server.js"}"#).unwrap();
        fs::write(base.join("server.js"), "require('http').createServer().listen(3000)").unwrap();
        fs::create_dir_all(base.join("node_modules/express")).unwrap();
        fs::write(base.join("node_modules/express/index.js"), "module.exports = {}").unwrap();
        fs::create_dir_all(base.join("lib/nested")).unwrap();
        fs::write(base.join("lib/nested/util.js"), "exports.x = 1").unwrap();
        fs::create_dir_all(base.join(".git")).unwrap();
        fs::write(base.join(".git/HEAD"), "ref: refs/heads/main").unwrap();
        fs::write(base.join("logo.png"), [0x89u8, 0x50, 0x4e, 0x47, 0xff, 0xfe]).unwrap();

        dir
    }

    #[test]
    fn test_scan_excludes_vendor_dirs() {
        let repo = create_test_repo();
        let listing = WorkspaceScanner::new(repo.path().to_path_buf()).scan().unwrap();

        assert!(listing.contains("package.json"));
        assert!(listing.contains("server.js"));
        assert!(listing.contains("lib/nested/util.js"));
        assert!(!listing.files().iter().any(|f| f.path.starts_with("node_modules")));
        assert!(!listing.files().iter().any(|f| f.path.starts_with(".git/")));
    }

    #[test]
    fn test_scan_reads_text_content_only() {
        let repo = create_test_repo();
        let listing = WorkspaceScanner::new(repo.path().to_path_buf()).scan().unwrap();

        assert!(listing.content("server.js").unwrap().contains("3000"));
        let logo = listing.get("logo.png").unwrap();
        assert!(logo.content.is_none());
        assert_eq!(logo.size, 6);
    }

    #[test]
    fn test_scan_respects_limits() {
        let repo = create_test_repo();
        let config = ScanConfig {
            max_files: 2,
            max_content_bytes: 4,
            ..Default::default()
        };
        let listing = WorkspaceScanner::new(repo.path().to_path_buf())
            .with_config(config)
            .scan()
            .unwrap();

        assert_eq!(listing.len(), 2);
        assert!(listing.files().iter().all(|f| f.content.is_none()));
    }

    #[test]
    fn test_scan_missing_root() {
        let result = WorkspaceScanner::new(PathBuf::from("/no/such/dir")).scan();
        assert!(matches!(result, Err(WorkspaceError::NotFound(_))));
    }
}
