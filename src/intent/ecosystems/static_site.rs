//! Static sites served as-is

use super::{EcosystemDefinition, ManifestPattern};
use crate::workspace::FileListing;

pub struct StaticSiteEcosystem;

impl EcosystemDefinition for StaticSiteEcosystem {
    fn name(&self) -> &str {
        "static"
    }

    fn extensions(&self) -> &[&str] {
        &["html", "htm", "css"]
    }

    fn manifest_files(&self) -> &[ManifestPattern] {
        &[]
    }

    fn entry_point_candidates(&self) -> &[&str] {
        &["index.html", "public/index.html", "dist/index.html", "site/index.html"]
    }

    fn is_precompiled(&self, _listing: &FileListing, _manifests: &[String]) -> bool {
        true
    }
}
