//! Node.js ecosystem (npm, yarn, pnpm, bun)

use super::{find_manifest, EcosystemDefinition, ManifestPattern};
use crate::workspace::FileListing;

pub struct NodeEcosystem;

impl EcosystemDefinition for NodeEcosystem {
    fn name(&self) -> &str {
        "node"
    }

    fn extensions(&self) -> &[&str] {
        &["js", "mjs", "cjs", "jsx", "ts", "tsx"]
    }

    fn manifest_files(&self) -> &[ManifestPattern] {
        &[
            ManifestPattern {
                filename: "package.json",
                package_manager: "npm",
                priority: 10,
            },
            ManifestPattern {
                filename: "package-lock.json",
                package_manager: "npm",
                priority: 12,
            },
            ManifestPattern {
                filename: "yarn.lock",
                package_manager: "yarn",
                priority: 15,
            },
            ManifestPattern {
                filename: "pnpm-lock.yaml",
                package_manager: "pnpm",
                priority: 15,
            },
            ManifestPattern {
                filename: "bun.lockb",
                package_manager: "bun",
                priority: 15,
            },
        ]
    }

    fn entry_point_candidates(&self) -> &[&str] {
        &[
            "server.js",
            "index.js",
            "app.js",
            "main.js",
            "src/server.js",
            "src/index.js",
            "src/main.js",
            "server.ts",
            "index.ts",
            "src/index.ts",
            "src/main.ts",
        ]
    }

    fn port_patterns(&self) -> &[&str] {
        &[
            r"\.listen\(\s*(\d{2,5})",
            r"PORT\s*\|\|\s*(\d{2,5})",
            r"PORT\s*\?\?\s*(\d{2,5})",
            r"port:\s*(\d{2,5})",
        ]
    }

    fn declared_entry_point(&self, listing: &FileListing, manifests: &[String]) -> Option<String> {
        let manifest = find_manifest(manifests, "package.json")?;
        let content = listing.content(manifest)?;
        let json: serde_json::Value = serde_json::from_str(content).ok()?;
        let dir = manifest.strip_suffix("package.json").unwrap_or("");

        let from_main = json
            .get("main")
            .and_then(|v| v.as_str())
            .map(|s| s.trim_start_matches("./").to_string());

        // "start": "node server.js"
        let from_start = json
            .get("scripts")
            .and_then(|s| s.get("start"))
            .and_then(|v| v.as_str())
            .and_then(|cmd| {
                cmd.split_whitespace()
                    .find(|token| {
                        token.ends_with(".js") || token.ends_with(".mjs") || token.ends_with(".cjs")
                    })
                    .map(|s| s.trim_start_matches("./").to_string())
            });

        [from_main, from_start]
            .into_iter()
            .flatten()
            .map(|path| format!("{}{}", dir, path))
            .find(|path| listing.contains(path))
    }

    fn package_manager(&self, listing: &FileListing, manifests: &[String]) -> Option<String> {
        if let Some(content) = find_manifest(manifests, "package.json").and_then(|m| listing.content(m)) {
            if let Ok(json) = serde_json::from_str::<serde_json::Value>(content) {
                if let Some(declared) = json.get("packageManager").and_then(|v| v.as_str()) {
                    if let Some(name) = declared.split('@').next().filter(|n| !n.is_empty()) {
                        return Some(name.to_string());
                    }
                }
            }
        }

        self.manifest_files()
            .iter()
            .filter(|p| find_manifest(manifests, p.filename).is_some())
            .max_by_key(|p| p.priority)
            .map(|p| p.package_manager.to_string())
    }
}
