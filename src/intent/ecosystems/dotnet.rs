//! .NET ecosystem

use super::{file_name, EcosystemDefinition, ManifestPattern};
use crate::workspace::FileListing;

pub struct DotNetEcosystem;

impl EcosystemDefinition for DotNetEcosystem {
    fn name(&self) -> &str {
        "dotnet"
    }

    fn extensions(&self) -> &[&str] {
        &["cs", "fs"]
    }

    fn manifest_files(&self) -> &[ManifestPattern] {
        &[
            ManifestPattern {
                filename: "global.json",
                package_manager: "dotnet",
                priority: 5,
            },
            ManifestPattern {
                filename: "Directory.Build.props",
                package_manager: "dotnet",
                priority: 5,
            },
        ]
    }

    fn entry_point_candidates(&self) -> &[&str] {
        &["Program.cs", "src/Program.cs"]
    }

    fn port_patterns(&self) -> &[&str] {
        &[r"UseUrls\([^:)]*:(\d{2,5})", r"ASPNETCORE_URLS=[^:]*:(\d{2,5})"]
    }

    // Project files carry arbitrary names
    fn is_manifest(&self, filename: &str) -> bool {
        filename.ends_with(".csproj")
            || filename.ends_with(".fsproj")
            || filename.ends_with(".sln")
            || self.manifest_files().iter().any(|m| m.filename == filename)
    }

    fn declared_entry_point(&self, listing: &FileListing, manifests: &[String]) -> Option<String> {
        if self.entry_point_candidates().iter().any(|c| listing.contains(c)) {
            return None;
        }
        manifests
            .iter()
            .find(|m| {
                let name = file_name(m);
                name.ends_with(".csproj") || name.ends_with(".fsproj")
            })
            .cloned()
    }

    fn package_manager(&self, _listing: &FileListing, manifests: &[String]) -> Option<String> {
        if manifests.is_empty() {
            None
        } else {
            Some("dotnet".to_string())
        }
    }
}
