//! Heal loop state machine
//!
//! `transition` is a pure function of (state, event). The orchestrator feeds
//! it the outcome of each step and does whatever the returned state asks for,
//! so the control flow can be tested without an engine or a backend.

use super::record::FailureKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum HealState {
    Extracting,
    Proposing { attempt: u32 },
    Building { attempt: u32 },
    Validating { attempt: u32 },
    Done(Termination),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "termination", rename_all = "snake_case")]
pub enum Termination {
    Success { attempt: u32 },
    Exhausted { attempts: u32, last_failure: FailureKind },
    Cancelled { attempts: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepEvent {
    IntentExtracted,
    DefinitionProposed,
    GenerationFailed,
    BuildSucceeded,
    BuildFailed,
    ValidationPassed,
    ValidationFailed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Loop already finished: {0:?}")]
    Terminal(Termination),

    #[error("Event {event:?} is not valid in state {state}")]
    Invalid { state: HealState, event: StepEvent },
}

impl HealState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, HealState::Done(_))
    }

    /// Attempt in flight, or the number of attempts made once finished
    pub fn attempt(&self) -> u32 {
        match self {
            HealState::Extracting => 0,
            HealState::Proposing { attempt }
            | HealState::Building { attempt }
            | HealState::Validating { attempt } => *attempt,
            HealState::Done(Termination::Success { attempt }) => *attempt,
            HealState::Done(Termination::Exhausted { attempts, .. })
            | HealState::Done(Termination::Cancelled { attempts }) => *attempts,
        }
    }
}

impl fmt::Display for HealState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealState::Extracting => write!(f, "extracting"),
            HealState::Proposing { attempt } => write!(f, "proposing (attempt {})", attempt),
            HealState::Building { attempt } => write!(f, "building (attempt {})", attempt),
            HealState::Validating { attempt } => write!(f, "validating (attempt {})", attempt),
            HealState::Done(Termination::Success { attempt }) => {
                write!(f, "done: success on attempt {}", attempt)
            }
            HealState::Done(Termination::Exhausted {
                attempts,
                last_failure,
            }) => write!(
                f,
                "done: exhausted after {} attempts ({} failure)",
                attempts, last_failure
            ),
            HealState::Done(Termination::Cancelled { attempts }) => {
                write!(f, "done: cancelled after {} attempts", attempts)
            }
        }
    }
}

/// Next state after `event`, given the attempt budget
pub fn transition(
    state: HealState,
    event: StepEvent,
    max_attempts: u32,
) -> Result<HealState, TransitionError> {
    use HealState::*;
    use StepEvent::*;

    if let Done(termination) = state {
        return Err(TransitionError::Terminal(termination));
    }

    let next = match (state, event) {
        (_, Cancelled) => {
            // An attempt that never reached the architect does not count
            let attempts = match state {
                Extracting => 0,
                other => other.attempt(),
            };
            Done(Termination::Cancelled { attempts })
        }
        (Extracting, IntentExtracted) => Proposing { attempt: 1 },
        (Proposing { attempt }, DefinitionProposed) => Building { attempt },
        (Proposing { attempt }, GenerationFailed) => {
            retry_or_exhaust(attempt, max_attempts, FailureKind::Generation)
        }
        (Building { attempt }, BuildSucceeded) => Validating { attempt },
        (Building { attempt }, BuildFailed) => {
            retry_or_exhaust(attempt, max_attempts, FailureKind::Build)
        }
        (Validating { attempt }, ValidationPassed) => Done(Termination::Success { attempt }),
        (Validating { attempt }, ValidationFailed) => {
            retry_or_exhaust(attempt, max_attempts, FailureKind::Validation)
        }
        (state, event) => return Err(TransitionError::Invalid { state, event }),
    };

    Ok(next)
}

fn retry_or_exhaust(attempt: u32, max_attempts: u32, kind: FailureKind) -> HealState {
    if attempt >= max_attempts {
        HealState::Done(Termination::Exhausted {
            attempts: attempt,
            last_failure: kind,
        })
    } else {
        HealState::Proposing {
            attempt: attempt + 1,
        }
    }
}
