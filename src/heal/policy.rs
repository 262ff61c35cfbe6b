use crate::definition::{DefinitionConstraints, ImageRef};
use crate::intent::ProjectIntent;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Budget and hardening limits for one heal run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealPolicy {
    pub max_attempts: u32,
    /// Deadline for one architect proposal
    pub generation_timeout: Duration,
    pub build_timeout: Duration,
    /// How long a validation container is watched
    pub observation_window: Duration,
    /// Upper bound on image size, in bytes
    pub max_image_size: u64,
    /// Acceptable runtime base families, e.g. `alpine` or `gcr.io/distroless`
    pub allowed_base_families: Vec<String>,
    /// Truncation bound for failure evidence handed back to the architect
    pub max_evidence_chars: usize,
    pub skip_validation: bool,
    /// Longest the loop waits on any single container engine request
    pub engine_call_timeout: Duration,
}

impl Default for HealPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            generation_timeout: Duration::from_secs(60),
            build_timeout: Duration::from_secs(600),
            observation_window: Duration::from_secs(10),
            max_image_size: 1024 * 1024 * 1024,
            allowed_base_families: vec![
                "alpine".to_string(),
                "gcr.io/distroless".to_string(),
                "cgr.dev/chainguard".to_string(),
            ],
            max_evidence_chars: 4000,
            skip_validation: false,
            engine_call_timeout: Duration::from_secs(30),
        }
    }
}

impl HealPolicy {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_skip_validation(mut self, skip: bool) -> Self {
        self.skip_validation = skip;
        self
    }

    pub fn allows_base(&self, reference: &str) -> bool {
        ImageRef::parse(reference).is_some_and(|image| {
            self.allowed_base_families
                .iter()
                .any(|family| image.belongs_to_family(family))
        })
    }

    /// Hard constraints the architect enforces for `intent`
    pub fn constraints(&self, intent: &ProjectIntent) -> DefinitionConstraints {
        DefinitionConstraints {
            allowed_base_families: self.allowed_base_families.clone(),
            precompiled: intent.precompiled,
        }
    }
}
