//! PHP ecosystem (composer)

use super::{EcosystemDefinition, ManifestPattern};

pub struct PhpEcosystem;

impl EcosystemDefinition for PhpEcosystem {
    fn name(&self) -> &str {
        "php"
    }

    fn extensions(&self) -> &[&str] {
        &["php"]
    }

    fn manifest_files(&self) -> &[ManifestPattern] {
        &[
            ManifestPattern {
                filename: "composer.json",
                package_manager: "composer",
                priority: 10,
            },
            ManifestPattern {
                filename: "composer.lock",
                package_manager: "composer",
                priority: 12,
            },
        ]
    }

    fn entry_point_candidates(&self) -> &[&str] {
        &["public/index.php", "index.php", "artisan"]
    }
}
