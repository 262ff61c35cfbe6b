//! Go modules ecosystem

use super::{EcosystemDefinition, ManifestPattern};
use crate::workspace::FileListing;

pub struct GoEcosystem;

impl EcosystemDefinition for GoEcosystem {
    fn name(&self) -> &str {
        "go"
    }

    fn extensions(&self) -> &[&str] {
        &["go"]
    }

    fn manifest_files(&self) -> &[ManifestPattern] {
        &[
            ManifestPattern {
                filename: "go.mod",
                package_manager: "go",
                priority: 10,
            },
            ManifestPattern {
                filename: "go.sum",
                package_manager: "go",
                priority: 5,
            },
        ]
    }

    fn entry_point_candidates(&self) -> &[&str] {
        &["main.go", "cmd/main.go", "cmd/server/main.go", "cmd/app/main.go"]
    }

    fn port_patterns(&self) -> &[&str] {
        &[
            r"\.Run\([^:)]*:(\d{2,5})",
            r"http\.ListenAndServe\([^:)]*:(\d{2,5})",
            r#"Addr:\s*"[^:]*:(\d{2,5})""#,
        ]
    }

    // Any cmd/<name>/main.go when the conventional paths are absent
    fn declared_entry_point(&self, listing: &FileListing, _manifests: &[String]) -> Option<String> {
        if self
            .entry_point_candidates()
            .iter()
            .any(|c| listing.contains(c))
        {
            return None;
        }
        listing
            .files()
            .iter()
            .map(|f| f.path.as_str())
            .find(|p| p.starts_with("cmd/") && p.ends_with("/main.go") && p.matches('/').count() == 2)
            .map(str::to_string)
    }
}
