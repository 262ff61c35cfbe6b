//! JVM ecosystem (Maven, Gradle, prebuilt jars)

use super::{EcosystemDefinition, ManifestPattern};
use crate::workspace::FileListing;

pub struct JavaEcosystem;

impl EcosystemDefinition for JavaEcosystem {
    fn name(&self) -> &str {
        "java"
    }

    fn extensions(&self) -> &[&str] {
        &["java", "kt", "jar"]
    }

    fn manifest_files(&self) -> &[ManifestPattern] {
        &[
            ManifestPattern {
                filename: "pom.xml",
                package_manager: "maven",
                priority: 10,
            },
            ManifestPattern {
                filename: "build.gradle",
                package_manager: "gradle",
                priority: 10,
            },
            ManifestPattern {
                filename: "build.gradle.kts",
                package_manager: "gradle",
                priority: 10,
            },
        ]
    }

    fn entry_point_candidates(&self) -> &[&str] {
        &[
            "src/main/java/Main.java",
            "src/main/java/App.java",
            "src/main/kotlin/Main.kt",
            "Main.java",
            "app.jar",
        ]
    }

    fn port_patterns(&self) -> &[&str] {
        &[r"server\.port\s*=\s*(\d{2,5})", r"port:\s*(\d{2,5})"]
    }

    fn declared_entry_point(&self, listing: &FileListing, manifests: &[String]) -> Option<String> {
        if !manifests.is_empty() {
            return None;
        }
        listing
            .root_files()
            .find(|f| f.extension() == Some("jar"))
            .map(|f| f.path.clone())
    }

    /// A jar with no build manifest only needs a runtime stage
    fn is_precompiled(&self, listing: &FileListing, manifests: &[String]) -> bool {
        manifests.is_empty() && listing.files().iter().any(|f| f.extension() == Some("jar"))
    }
}
