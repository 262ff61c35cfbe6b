use serde::{Deserialize, Serialize};

/// One file in the workspace, addressed by its `/`-separated relative path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListedFile {
    pub path: String,
    pub size: u64,
    /// Present for small UTF-8 files
    pub content: Option<String>,
}

impl ListedFile {
    pub fn new(path: impl Into<String>, content: Option<&str>) -> Self {
        let content = content.map(str::to_string);
        Self {
            path: path.into(),
            size: content.as_ref().map(|c| c.len() as u64).unwrap_or(0),
            content,
        }
    }

    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
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

    /// Number of directories above the file (0 for root files)
    pub fn depth(&self) -> usize {
        self.path.matches('/').count()
    }
}

/// Normalized, read-only view of a workspace
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileListing {
    entries: Vec<ListedFile>,
}

impl FileListing {
    /// Entries are kept sorted by path so every consumer sees the same order
    pub fn new(mut entries: Vec<ListedFile>) -> Self {
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        entries.dedup_by(|a, b| a.path == b.path);
        Self { entries }
    }

    pub fn files(&self) -> &[ListedFile] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, path: &str) -> Option<&ListedFile> {
        self.entries
            .binary_search_by(|f| f.path.as_str().cmp(path))
            .ok()
            .map(|i| &self.entries[i])
    }

    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    pub fn content(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(|f| f.content.as_deref())
    }

    pub fn root_files(&self) -> impl Iterator<Item = &ListedFile> {
        self.entries.iter().filter(|f| f.depth() == 0)
    }
}
