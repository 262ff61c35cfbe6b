//! Ecosystem definitions used for intent extraction

mod dotnet;
mod go;
mod java;
mod node;
mod php;
mod python;
mod registry;
mod ruby;
mod rust;
mod static_site;

pub use dotnet::DotNetEcosystem;
pub use go::GoEcosystem;
pub use java::JavaEcosystem;
pub use node::NodeEcosystem;
pub use php::PhpEcosystem;
pub use python::PythonEcosystem;
pub use registry::EcosystemRegistry;
pub use ruby::RubyEcosystem;
pub use rust::RustEcosystem;
pub use static_site::StaticSiteEcosystem;

use crate::workspace::FileListing;

/// Pattern for matching manifest files
#[derive(Debug, Clone)]
pub struct ManifestPattern {
    pub filename: &'static str,
    pub package_manager: &'static str,
    pub priority: u8,
}

/// Describes how one language ecosystem shows up in a source tree
pub trait EcosystemDefinition: Send + Sync {
    /// Short lowercase identifier (e.g. "node", "python")
    fn name(&self) -> &str;

    fn extensions(&self) -> &[&str];

    fn manifest_files(&self) -> &[ManifestPattern];

    /// Conventional entry points, most likely first
    fn entry_point_candidates(&self) -> &[&str];

    /// Regexes whose first capture group is a listen port
    fn port_patterns(&self) -> &[&str] {
        &[]
    }

    /// Entry point declared inside a manifest, if the ecosystem has such a field
    fn declared_entry_point(&self, _listing: &FileListing, _manifests: &[String]) -> Option<String> {
        None
    }

    /// Whether the tree ships a ready-to-run artifact that needs no build stage
    fn is_precompiled(&self, _listing: &FileListing, _manifests: &[String]) -> bool {
        false
    }

    /// Package manager implied by the highest-priority manifest found
    fn package_manager(&self, _listing: &FileListing, manifests: &[String]) -> Option<String> {
        self.manifest_files()
            .iter()
            .filter(|pattern| {
                manifests
                    .iter()
                    .any(|m| file_name(m) == pattern.filename)
            })
            .max_by_key(|pattern| pattern.priority)
            .map(|pattern| pattern.package_manager.to_string())
    }

    fn is_manifest(&self, filename: &str) -> bool {
        self.manifest_files().iter().any(|m| m.filename == filename)
    }
}

pub(crate) fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Shallowest manifest with the given file name
pub(crate) fn find_manifest<'a>(manifests: &'a [String], filename: &str) -> Option<&'a String> {
    manifests.iter().find(|m| file_name(m) == filename)
}
