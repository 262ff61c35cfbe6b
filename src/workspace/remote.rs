use super::WorkspaceError;
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::debug;

const GITHUB_BASE_URL: &str = "https://github.com";
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(120);

/// A public GitHub repository, fetched as its default-branch tarball
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitHubSource {
    pub owner: String,
    pub repo: String,
    base_url: String,
}

impl GitHubSource {
    /// Parses `https://github.com/<owner>/<repo>[.git][/...]`
    pub fn parse(url: &str) -> Option<Self> {
        let rest = url
            .strip_prefix("https://github.com/")
            .or_else(|| url.strip_prefix("http://github.com/"))
            .or_else(|| url.strip_prefix("github.com/"))?;

        let mut segments = rest.split('/').filter(|s| !s.is_empty());
        let owner = segments.next()?;
        let repo = segments.next()?;
        let repo = repo.strip_suffix(".git").unwrap_or(repo);

        let valid = |s: &str| {
            !s.is_empty()
                && s != "."
                && s != ".."
                && s.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        };
        if !valid(owner) || !valid(repo) {
            return None;
        }

        Some(Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            base_url: GITHUB_BASE_URL.to_string(),
        })
    }

    /// Serves archives from another host (GitHub Enterprise, tests)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn archive_url(&self) -> String {
        format!(
            "{}/{}/{}/archive/HEAD.tar.gz",
            self.base_url, self.owner, self.repo
        )
    }

    /// Downloads the repository tarball into a temporary file
    pub(crate) async fn download(&self) -> Result<NamedTempFile, WorkspaceError> {
        let url = self.archive_url();
        let failed = |message: String| WorkspaceError::Download {
            url: url.clone(),
            message,
        };

        let response = reqwest::Client::new()
            .get(&url)
            .timeout(DOWNLOAD_TIMEOUT)
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?;
        if !response.status().is_success() {
            return Err(failed(format!("server answered {}", response.status())));
        }
        let body = response.bytes().await.map_err(|e| failed(e.to_string()))?;
        debug!(url = %url, bytes = body.len(), "Downloaded repository archive");

        let mut file = tempfile::Builder::new()
            .prefix("healbox-download-")
            .suffix(".tar.gz")
            .tempfile()
            .map_err(|e| WorkspaceError::io(std::env::temp_dir(), e))?;
        let path = file.path().to_path_buf();
        file.write_all(&body).map_err(|e| WorkspaceError::io(&path, e))?;
        file.flush().map_err(|e| WorkspaceError::io(&path, e))?;
        Ok(file)
    }
}

impl std::fmt::Display for GitHubSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "github.com/{}/{}", self.owner, self.repo)
    }
}
