//! Workspace provider: turns a source directory or archive into a build
//! context on local storage plus a normalized, read-only file listing.

mod archive;
mod listing;
mod remote;
mod scanner;

pub use listing::{FileListing, ListedFile};
pub use remote::GitHubSource;
pub use scanner::{ScanConfig, WorkspaceScanner};

use std::path::{Path, PathBuf};
use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("Source does not exist: {0}")]
    NotFound(PathBuf),

    #[error("Unsupported source {0}: expected a directory, a GitHub URL or a .tar/.tar.gz/.tgz/.zip archive")]
    UnsupportedSource(PathBuf),

    #[error("Failed to download {url}: {message}")]
    Download { url: String, message: String },

    #[error("Archive entry escapes the workspace root: {0}")]
    PathEscape(String),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to scan workspace: {0}")]
    Scan(String),
}

impl WorkspaceError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        WorkspaceError::Io {
            path: path.into(),
            source,
        }
    }
}

/// A build context on local disk
///
/// Archives are unpacked into a temporary directory owned by the workspace and
/// removed when it is dropped, unless [`Workspace::keep`] is called.
#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
    source: PathBuf,
    temp: Option<TempDir>,
}

impl Workspace {
    pub fn open(source: &Path) -> Result<Self, WorkspaceError> {
        if !source.exists() {
            return Err(WorkspaceError::NotFound(source.to_path_buf()));
        }

        if source.is_dir() {
            let root = source
                .canonicalize()
                .map_err(|e| WorkspaceError::io(source, e))?;
            debug!(root = %root.display(), "Using directory workspace");
            return Ok(Self {
                root,
                source: source.to_path_buf(),
                temp: None,
            });
        }

        let kind = archive::ArchiveKind::from_path(source)
            .ok_or_else(|| WorkspaceError::UnsupportedSource(source.to_path_buf()))?;
        Self::unpacked(source, kind, source.to_path_buf())
    }

    /// Downloads a GitHub repository and unpacks it like a local archive
    pub async fn fetch(remote: &GitHubSource) -> Result<Self, WorkspaceError> {
        info!(repository = %remote, "Fetching repository archive");
        let download = remote.download().await?;
        Self::unpacked(
            download.path(),
            archive::ArchiveKind::TarGz,
            PathBuf::from(remote.archive_url()),
        )
    }

    fn unpacked(
        archive_path: &Path,
        kind: archive::ArchiveKind,
        source: PathBuf,
    ) -> Result<Self, WorkspaceError> {
        let temp = tempfile::Builder::new()
            .prefix("healbox-")
            .tempdir()
            .map_err(|e| WorkspaceError::io(std::env::temp_dir(), e))?;

        let entries = archive::unpack(archive_path, kind, temp.path())?;
        let root = archive::effective_root(temp.path())?;

        info!(
            archive = %source.display(),
            entries,
            root = %root.display(),
            "Unpacked source archive"
        );

        Ok(Self {
            root,
            source,
            temp: Some(temp),
        })
    }

    /// Directory used as the build context
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn is_temporary(&self) -> bool {
        self.temp.is_some()
    }

    /// Scans the workspace with the default scan configuration
    pub fn listing(&self) -> Result<FileListing, WorkspaceError> {
        WorkspaceScanner::new(self.root.clone()).scan()
    }

    /// Disowns the temporary directory so it survives the workspace
    pub fn keep(mut self) -> PathBuf {
        if let Some(temp) = self.temp.take() {
            let kept = temp.keep();
            info!(path = %kept.display(), "Workspace preserved");
        }
        self.root.clone()
    }
}
