//! The build-validate-heal loop
//!
//! [`HealLoop`] extracts the project intent once, then repeats
//! propose → build → validate, feeding each failure back to the architect,
//! until an attempt succeeds or the attempt budget is spent. Control flow is
//! the pure [`transition`] function; the loop only performs the side effects.

mod cancel;
mod context;
mod orchestrator;
mod policy;
mod record;
mod state;

pub use cancel::CancellationToken;
pub use context::{HealContext, ATTEMPT_REPOSITORY};
pub use orchestrator::{HealError, HealLoop, HealReport};
pub use policy::HealPolicy;
pub use record::{AttemptOutcome, AttemptRecord, FailureKind};
pub use state::{transition, HealState, StepEvent, Termination, TransitionError};
