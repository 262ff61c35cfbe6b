use super::ecosystems::{EcosystemDefinition, EcosystemRegistry};
use super::ProjectIntent;
use crate::workspace::{FileListing, ListedFile};
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, info};

/// Patterns that hold regardless of ecosystem
const GENERIC_PORT_PATTERNS: &[&str] = &[
    r"(?m)^\s*EXPOSE\s+(\d{2,5})",
    r"(?m)^\s*PORT\s*=\s*(\d{2,5})",
];

/// Config files worth scanning for a port besides source files
const PORT_CONFIG_FILES: &[&str] = &[
    ".env",
    ".env.example",
    "Procfile",
    "Dockerfile",
    "application.properties",
    "application.yml",
    "application.yaml",
];

struct Candidate {
    ecosystem: Arc<dyn EcosystemDefinition>,
    manifests: Vec<String>,
    source_files: usize,
}

impl Candidate {
    fn score(&self) -> usize {
        self.manifests.len() + self.source_files
    }
}

/// Derives a [`ProjectIntent`] from a file listing without touching the disk
#[derive(Clone, Default)]
pub struct IntentExtractor {
    registry: EcosystemRegistry,
}

impl IntentExtractor {
    pub fn new() -> Self {
        Self::with_registry(EcosystemRegistry::with_defaults())
    }

    pub fn with_registry(registry: EcosystemRegistry) -> Self {
        Self { registry }
    }

    pub fn extract(&self, listing: &FileListing) -> ProjectIntent {
        let candidates = self.candidates(listing);

        let chosen = Self::pick_by_manifest(&candidates).or_else(|| Self::pick_by_extension(&candidates));

        let Some(candidate) = chosen else {
            info!(files = listing.len(), "No ecosystem detected");
            return ProjectIntent::unknown();
        };

        let ecosystem = &candidate.ecosystem;
        let manifests = candidate.manifests.clone();

        let entry_point = ecosystem
            .declared_entry_point(listing, &manifests)
            .or_else(|| Self::conventional_entry_point(ecosystem.as_ref(), listing, &manifests));
        let port = Self::find_port(ecosystem.as_ref(), listing, entry_point.as_deref());

        let intent = ProjectIntent {
            language: ecosystem.name().to_string(),
            package_manager: ecosystem.package_manager(listing, &manifests),
            precompiled: ecosystem.is_precompiled(listing, &manifests),
            manifests,
            entry_point,
            port,
        };

        info!(
            language = %intent.language,
            manifests = intent.manifests.len(),
            entry_point = intent.entry_point.as_deref().unwrap_or("unknown"),
            port = ?intent.port,
            "Extracted project intent"
        );

        intent
    }

    fn candidates(&self, listing: &FileListing) -> Vec<Candidate> {
        self.registry
            .all()
            .iter()
            .map(|ecosystem| {
                let mut manifests: Vec<&ListedFile> = listing
                    .files()
                    .iter()
                    .filter(|f| ecosystem.is_manifest(f.file_name()))
                    .collect();
                manifests.sort_by(|a, b| a.depth().cmp(&b.depth()).then_with(|| a.path.cmp(&b.path)));

                let source_files = listing
                    .files()
                    .iter()
                    .filter(|f| {
                        f.extension()
                            .map(|ext| {
                                let ext = ext.to_lowercase();
                                ecosystem.extensions().iter().any(|e| *e == ext)
                            })
                            .unwrap_or(false)
                    })
                    .count();

                debug!(
                    ecosystem = ecosystem.name(),
                    manifests = manifests.len(),
                    source_files,
                    "Ecosystem evidence"
                );

                Candidate {
                    ecosystem: ecosystem.clone(),
                    manifests: manifests.into_iter().map(|f| f.path.clone()).collect(),
                    source_files,
                }
            })
            .collect()
    }

    // Strictly-greater comparison keeps registry order on ties
    fn pick_by_manifest(candidates: &[Candidate]) -> Option<&Candidate> {
        let mut best: Option<&Candidate> = None;
        for candidate in candidates.iter().filter(|c| !c.manifests.is_empty()) {
            if best.map(|b| candidate.score() > b.score()).unwrap_or(true) {
                best = Some(candidate);
            }
        }
        best
    }

    fn pick_by_extension(candidates: &[Candidate]) -> Option<&Candidate> {
        let mut best: Option<&Candidate> = None;
        for candidate in candidates.iter().filter(|c| c.source_files > 0) {
            if best
                .map(|b| candidate.source_files > b.source_files)
                .unwrap_or(true)
            {
                best = Some(candidate);
            }
        }
        best
    }

    fn conventional_entry_point(
        ecosystem: &dyn EcosystemDefinition,
        listing: &FileListing,
        manifests: &[String],
    ) -> Option<String> {
        let mut prefixes = vec![String::new()];
        if let Some(first) = manifests.first() {
            if let Some((dir, _)) = first.rsplit_once('/') {
                prefixes.insert(0, format!("{}/", dir));
            }
        }

        for prefix in &prefixes {
            for candidate in ecosystem.entry_point_candidates() {
                let path = format!("{}{}", prefix, candidate);
                if listing.contains(&path) {
                    return Some(path);
                }
            }
        }
        None
    }

    fn find_port(
        ecosystem: &dyn EcosystemDefinition,
        listing: &FileListing,
        entry_point: Option<&str>,
    ) -> Option<u16> {
        let patterns: Vec<Regex> = ecosystem
            .port_patterns()
            .iter()
            .chain(GENERIC_PORT_PATTERNS.iter())
            .filter_map(|p| Regex::new(p).ok())
            .collect();

        let is_relevant = |file: &ListedFile| {
            PORT_CONFIG_FILES.contains(&file.file_name())
                || file
                    .extension()
                    .map(|ext| ecosystem.extensions().contains(&ext))
                    .unwrap_or(false)
        };

        // Entry point first, then everything else in listing order
        let ordered = entry_point
            .and_then(|p| listing.get(p))
            .into_iter()
            .chain(
                listing
                    .files()
                    .iter()
                    .filter(|f| Some(f.path.as_str()) != entry_point && is_relevant(f)),
            );

        for file in ordered {
            let Some(content) = file.content.as_deref() else {
                continue;
            };
            for re in &patterns {
                for cap in re.captures_iter(content) {
                    if let Some(port) = cap
                        .get(1)
                        .and_then(|m| m.as_str().parse::<u16>().ok())
                        .filter(|p| *p > 0)
                    {
                        debug!(file = %file.path, port, "Found port hint");
                        return Some(port);
                    }
                }
            }
        }
        None
    }
}
