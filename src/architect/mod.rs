//! Definition synthesis
//!
//! A [`DefinitionArchitect`] turns a [`ProjectIntent`] (and, on retries, the
//! attempt history) into a fresh [`BuildDefinition`]. The architect is where
//! untrusted backend text becomes a typed definition: anything that does not
//! parse strictly or breaks a hard constraint is rejected, never patched up.

mod llm;
pub mod prompt;

pub use llm::LlmArchitect;
pub use prompt::PromptContext;

use crate::definition::{BuildDefinition, DefinitionError};
use crate::heal::AttemptRecord;
use crate::intent::ProjectIntent;
use crate::llm::BackendError;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Generation backend failed: {0}")]
    Backend(#[from] BackendError),

    #[error("Generation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Backend returned an unparsable definition: {0}")]
    Unparsable(#[from] DefinitionError),

    #[error("Definition violates policy: {0}")]
    PolicyViolation(String),
}

#[async_trait]
pub trait DefinitionArchitect: Send + Sync {
    /// Proposes a definition; `history` is empty on the first call and ends with the latest failure
    async fn propose(
        &self,
        intent: &ProjectIntent,
        history: &[AttemptRecord],
    ) -> Result<BuildDefinition, GenerationError>;

    fn name(&self) -> &str {
        "architect"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = GenerationError::from(DefinitionError::MissingFrom);
        assert!(err.to_string().starts_with("Backend returned an unparsable definition"));

        let err = GenerationError::PolicyViolation("[MinimumStages] one stage".to_string());
        assert_eq!(err.to_string(), "Definition violates policy: [MinimumStages] one stage");
    }
}
