//! Rust ecosystem (cargo)

use super::{find_manifest, EcosystemDefinition, ManifestPattern};
use crate::workspace::FileListing;

pub struct RustEcosystem;

impl EcosystemDefinition for RustEcosystem {
    fn name(&self) -> &str {
        "rust"
    }

    fn extensions(&self) -> &[&str] {
        &["rs"]
    }

    fn manifest_files(&self) -> &[ManifestPattern] {
        &[
            ManifestPattern {
                filename: "Cargo.toml",
                package_manager: "cargo",
                priority: 10,
            },
            ManifestPattern {
                filename: "Cargo.lock",
                package_manager: "cargo",
                priority: 5,
            },
        ]
    }

    fn entry_point_candidates(&self) -> &[&str] {
        &["src/main.rs"]
    }

    fn port_patterns(&self) -> &[&str] {
        &[
            r"\.bind\([^,)]*:(\d{2,5})",
            r#"addr\s*=\s*"[^:]*:(\d{2,5})""#,
            r"SocketAddr::from\(\(\[[\d,\s]+\],\s*(\d{2,5})\)\)",
        ]
    }

    /// First `[[bin]]` path from Cargo.toml
    fn declared_entry_point(&self, listing: &FileListing, manifests: &[String]) -> Option<String> {
        let manifest = find_manifest(manifests, "Cargo.toml")?;
        let content = listing.content(manifest)?;
        let parsed: toml::Value = toml::from_str(content).ok()?;
        let dir = manifest.strip_suffix("Cargo.toml").unwrap_or("");

        parsed
            .get("bin")?
            .as_array()?
            .iter()
            .filter_map(|bin| bin.get("path").and_then(|p| p.as_str()))
            .map(|p| format!("{}{}", dir, p.trim_start_matches("./")))
            .find(|p| listing.contains(p))
    }
}
