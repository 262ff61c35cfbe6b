use crate::definition::BuildDefinition;
use crate::validator::ValidationReason;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which step of an attempt failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Generation,
    Build,
    Validation,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::Generation => "generation",
            FailureKind::Build => "build",
            FailureKind::Validation => "validation",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success {
        image_ref: String,
    },
    /// The architect produced nothing usable (unreachable, unparsable, policy violation)
    GenerationFailure {
        error: String,
    },
    BuildFailure {
        stage: String,
        exit_code: i64,
        log_tail: String,
    },
    ValidationFailure {
        reason: ValidationReason,
        detail: String,
    },
}

impl AttemptOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, AttemptOutcome::Success { .. })
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            AttemptOutcome::Success { .. } => None,
            AttemptOutcome::GenerationFailure { .. } => Some(FailureKind::Generation),
            AttemptOutcome::BuildFailure { .. } => Some(FailureKind::Build),
            AttemptOutcome::ValidationFailure { .. } => Some(FailureKind::Validation),
        }
    }

    /// Text the architect should see for this outcome
    pub fn evidence(&self) -> String {
        match self {
            AttemptOutcome::Success { image_ref } => format!("built and validated {}", image_ref),
            AttemptOutcome::GenerationFailure { error } => error.clone(),
            AttemptOutcome::BuildFailure { log_tail, .. } => log_tail.clone(),
            AttemptOutcome::ValidationFailure { reason, detail } => {
                format!("{}: {}", reason, detail)
            }
        }
    }
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptOutcome::Success { image_ref } => write!(f, "success ({})", image_ref),
            AttemptOutcome::GenerationFailure { error } => {
                write!(f, "generation failed: {}", error)
            }
            AttemptOutcome::BuildFailure {
                stage, exit_code, ..
            } => write!(f, "build failed at '{}' (exit {})", stage, exit_code),
            AttemptOutcome::ValidationFailure { reason, .. } => {
                write!(f, "validation failed: {}", reason)
            }
        }
    }
}

/// One entry of the run's append-only history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// 1-based
    pub attempt: u32,
    /// Absent when generation failed
    pub definition: Option<BuildDefinition>,
    pub outcome: AttemptOutcome,
    pub timestamp: DateTime<Utc>,
}

impl AttemptRecord {
    pub fn new(attempt: u32, definition: Option<BuildDefinition>, outcome: AttemptOutcome) -> Self {
        Self {
            attempt,
            definition,
            outcome,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_kinds() {
        let success = AttemptOutcome::Success {
            image_ref: "app:latest".to_string(),
        };
        assert!(success.is_success());
        assert_eq!(success.failure_kind(), None);

        let build = AttemptOutcome::BuildFailure {
            stage: "2/5 RUN npm ci".to_string(),
            exit_code: 1,
            log_tail: "npm ERR! missing script".to_string(),
        };
        assert_eq!(build.failure_kind(), Some(FailureKind::Build));
        assert_eq!(build.evidence(), "npm ERR! missing script");
    }

    #[test]
    fn test_validation_evidence_names_reason() {
        let outcome = AttemptOutcome::ValidationFailure {
            reason: ValidationReason::NonZeroExit,
            detail: "exited with code 137".to_string(),
        };
        assert_eq!(outcome.evidence(), "NonZeroExit: exited with code 137");
        assert_eq!(outcome.to_string(), "validation failed: NonZeroExit");
    }

    #[test]
    fn test_record_serializes_tagged_outcome() {
        let record = AttemptRecord::new(
            1,
            None,
            AttemptOutcome::GenerationFailure {
                error: "backend unreachable".to_string(),
            },
        );
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["attempt"], 1);
        assert_eq!(json["outcome"]["kind"], "generation_failure");
        assert!(json["definition"].is_null());
    }
}
