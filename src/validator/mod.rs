//! Runtime validation of built images
//!
//! A built image only counts when a container started from it survives the
//! observation window and the image passes the static hardening checks.

mod checks;
mod runtime;

pub use checks::{check_base_family, check_image_size};
pub use runtime::RuntimeValidator;

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValidationReason {
    /// Two or more exits inside the window
    CrashLooped,
    NonZeroExit,
    Timeout,
    OversizeImage,
    DisallowedBaseImage,
}

impl fmt::Display for ValidationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValidationReason::CrashLooped => "CrashLooped",
            ValidationReason::NonZeroExit => "NonZeroExit",
            ValidationReason::Timeout => "Timeout",
            ValidationReason::OversizeImage => "OversizeImage",
            ValidationReason::DisallowedBaseImage => "DisallowedBaseImage",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ValidationOutcome {
    Pass,
    Fail {
        reason: ValidationReason,
        detail: String,
    },
}

impl ValidationOutcome {
    pub fn fail(reason: ValidationReason, detail: impl Into<String>) -> Self {
        ValidationOutcome::Fail {
            reason,
            detail: detail.into(),
        }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, ValidationOutcome::Pass)
    }

    pub fn reason(&self) -> Option<ValidationReason> {
        match self {
            ValidationOutcome::Pass => None,
            ValidationOutcome::Fail { reason, .. } => Some(*reason),
        }
    }
}
