//! Project intent: what the source tree is and how it wants to run

pub mod ecosystems;
mod extractor;

pub use ecosystems::{EcosystemDefinition, EcosystemRegistry, ManifestPattern};
pub use extractor::IntentExtractor;

use serde::{Deserialize, Serialize};

/// Immutable summary of a source tree, produced once per run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectIntent {
    /// Ecosystem name, or `unknown`
    pub language: String,
    /// Manifest paths, shallowest first
    pub manifests: Vec<String>,
    /// `None` means unknown; consumers must cope with it
    pub entry_point: Option<String>,
    pub port: Option<u16>,
    pub package_manager: Option<String>,
    /// Ships a ready artifact, so one runtime stage is enough
    pub precompiled: bool,
}

impl ProjectIntent {
    pub const UNKNOWN_LANGUAGE: &'static str = "unknown";

    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            manifests: Vec::new(),
            entry_point: None,
            port: None,
            package_manager: None,
            precompiled: false,
        }
    }

    pub fn unknown() -> Self {
        Self::new(Self::UNKNOWN_LANGUAGE)
    }

    pub fn with_entry_point(mut self, entry_point: impl Into<String>) -> Self {
        self.entry_point = Some(entry_point.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_manifests(mut self, manifests: Vec<String>) -> Self {
        self.manifests = manifests;
        self
    }

    pub fn with_package_manager(mut self, package_manager: impl Into<String>) -> Self {
        self.package_manager = Some(package_manager.into());
        self
    }

    pub fn with_precompiled(mut self, precompiled: bool) -> Self {
        self.precompiled = precompiled;
        self
    }

    pub fn is_unknown(&self) -> bool {
        self.language == Self::UNKNOWN_LANGUAGE
    }
}
