use super::context::HealContext;
use super::record::{AttemptOutcome, AttemptRecord, FailureKind};
use super::state::{transition, HealState, StepEvent, Termination, TransitionError};
use crate::architect::{DefinitionArchitect, GenerationError};
use crate::builder::{BuildOutcome, EngineBuilder};
use crate::definition::BuildDefinition;
use crate::engine::{ContainerEngine, EngineError, RUN_LABEL};
use crate::intent::{IntentExtractor, ProjectIntent};
use crate::progress::ProgressEvent;
use crate::validator::{RuntimeValidator, ValidationOutcome};
use crate::workspace::FileListing;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Result of a run that ended with a tagged, validated image
#[derive(Debug, Clone, Serialize)]
pub struct HealReport {
    pub run_id: String,
    /// The final tag, now pointing at the validated image
    pub image_ref: String,
    pub attempts: u32,
    pub intent: ProjectIntent,
    pub definition: BuildDefinition,
    pub history: Vec<AttemptRecord>,
    pub elapsed_secs: f64,
}

#[derive(Debug, Error)]
pub enum HealError {
    #[error("Gave up after {} attempts; last failure: {kind}", history.len())]
    Exhausted {
        kind: FailureKind,
        history: Vec<AttemptRecord>,
    },

    #[error("Run cancelled after {} recorded attempts", history.len())]
    Cancelled { history: Vec<AttemptRecord> },

    #[error("Container engine error: {source}")]
    Engine {
        #[source]
        source: EngineError,
        history: Vec<AttemptRecord>,
    },

    #[error("Heal loop state error: {0}")]
    Transition(#[from] TransitionError),
}

impl HealError {
    /// Attempts recorded before the run ended
    pub fn history(&self) -> &[AttemptRecord] {
        match self {
            HealError::Exhausted { history, .. }
            | HealError::Cancelled { history }
            | HealError::Engine { history, .. } => history,
            HealError::Transition(_) => &[],
        }
    }
}

/// Stops an attempt early; the run loop attaches the history
enum Abort {
    Engine(EngineError),
    Transition(TransitionError),
}

impl From<TransitionError> for Abort {
    fn from(e: TransitionError) -> Self {
        Abort::Transition(e)
    }
}

/// Drives extract, then propose/build/validate until success or the budget runs out
pub struct HealLoop {
    extractor: IntentExtractor,
    architect: Arc<dyn DefinitionArchitect>,
    engine: Arc<dyn ContainerEngine>,
}

impl HealLoop {
    pub fn new(architect: Arc<dyn DefinitionArchitect>, engine: Arc<dyn ContainerEngine>) -> Self {
        Self {
            extractor: IntentExtractor::new(),
            architect,
            engine,
        }
    }

    pub fn with_extractor(mut self, extractor: IntentExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    /// Runs the loop to a terminal state
    ///
    /// Attempt images and the run's dangling layers are cleaned up on every
    /// path. The final tag is only touched by a successful attempt.
    pub async fn run(&self, ctx: &HealContext, listing: &FileListing) -> Result<HealReport, HealError> {
        let started = Instant::now();
        let policy = ctx.policy();
        info!(
            run_id = ctx.run_id(),
            source = %ctx.context_dir().display(),
            max_attempts = policy.max_attempts,
            "Starting heal loop"
        );
        ctx.report(ProgressEvent::Started {
            source: ctx.context_dir().display().to_string(),
            run_id: ctx.run_id().to_string(),
        });

        let mut state = HealState::Extracting;
        let scan_start = Instant::now();
        let intent = self.extractor.extract(listing);
        ctx.report(ProgressEvent::IntentExtracted {
            language: intent.language.clone(),
            entry_point: intent.entry_point.clone(),
            port: intent.port,
            scan_time: scan_start.elapsed(),
        });
        advance(&mut state, StepEvent::IntentExtracted, policy.max_attempts)?;

        let builder = EngineBuilder::new(self.engine.clone(), policy.max_evidence_chars)
            .with_label(RUN_LABEL, ctx.run_id());
        let validator = RuntimeValidator::new(self.engine.clone()).with_label(RUN_LABEL, ctx.run_id());

        let mut history: Vec<AttemptRecord> = Vec::new();
        let mut attempt_tags: Vec<String> = Vec::new();

        let termination = loop {
            let attempt = match state {
                HealState::Proposing { attempt } => attempt,
                HealState::Done(termination) => break termination,
                other => {
                    self.cleanup(ctx, &attempt_tags).await;
                    return Err(TransitionError::Invalid {
                        state: other,
                        event: StepEvent::DefinitionProposed,
                    }
                    .into());
                }
            };

            if ctx.is_cancelled() {
                advance(&mut state, StepEvent::Cancelled, policy.max_attempts)?;
                continue;
            }

            attempt_tags.push(ctx.attempt_tag(attempt));
            let step = self
                .attempt(ctx, &intent, &history, attempt, &builder, &validator, &mut state)
                .await;

            match step {
                Ok(Some(record)) => {
                    info!(attempt = record.attempt, outcome = %record.outcome, "Attempt finished");
                    history.push(record);
                }
                Ok(None) => {}
                Err(abort) => {
                    self.cleanup(ctx, &attempt_tags).await;
                    return Err(match abort {
                        Abort::Engine(source) => {
                            ctx.report(ProgressEvent::Failed {
                                attempts: attempt,
                                error: source.to_string(),
                            });
                            HealError::Engine { source, history }
                        }
                        Abort::Transition(e) => HealError::Transition(e),
                    });
                }
            }
        };

        self.cleanup(ctx, &attempt_tags).await;

        match termination {
            Termination::Success { attempt } => {
                let total_time = started.elapsed();
                ctx.report(ProgressEvent::Completed {
                    attempts: attempt,
                    image_ref: ctx.final_tag().to_string(),
                    total_time,
                });
                let definition = history
                    .iter()
                    .rev()
                    .find_map(|r| r.definition.clone())
                    .unwrap_or_else(|| BuildDefinition::new(Vec::new()));
                Ok(HealReport {
                    run_id: ctx.run_id().to_string(),
                    image_ref: ctx.final_tag().to_string(),
                    attempts: attempt,
                    intent,
                    definition,
                    history,
                    elapsed_secs: total_time.as_secs_f64(),
                })
            }
            Termination::Exhausted {
                attempts,
                last_failure,
            } => {
                let error = HealError::Exhausted {
                    kind: last_failure,
                    history,
                };
                warn!(attempts, "{}", error);
                ctx.report(ProgressEvent::Failed {
                    attempts,
                    error: error.to_string(),
                });
                Err(error)
            }
            Termination::Cancelled { attempts } => {
                let error = HealError::Cancelled { history };
                warn!(attempts, "{}", error);
                ctx.report(ProgressEvent::Failed {
                    attempts,
                    error: error.to_string(),
                });
                Err(error)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn attempt(
        &self,
        ctx: &HealContext,
        intent: &ProjectIntent,
        history: &[AttemptRecord],
        attempt: u32,
        builder: &EngineBuilder,
        validator: &RuntimeValidator,
        state: &mut HealState,
    ) -> Result<Option<AttemptRecord>, Abort> {
        let policy = ctx.policy();
        let max = policy.max_attempts;
        ctx.report(ProgressEvent::AttemptStarted {
            attempt,
            max_attempts: max,
        });

        let generation_start = Instant::now();
        let proposal = tokio::select! {
            _ = ctx.cancellation().cancelled() => {
                advance(state, StepEvent::Cancelled, max)?;
                return Ok(None);
            }
            proposal = timeout(policy.generation_timeout, self.architect.propose(intent, history)) => {
                proposal.unwrap_or(Err(GenerationError::Timeout(policy.generation_timeout)))
            }
        };

        let definition = match proposal {
            Ok(definition) => definition,
            Err(e) => {
                warn!(attempt, error = %e, "Definition generation failed");
                ctx.report(ProgressEvent::GenerationFailed {
                    attempt,
                    error: e.to_string(),
                });
                advance(state, StepEvent::GenerationFailed, max)?;
                return Ok(Some(AttemptRecord::new(
                    attempt,
                    None,
                    AttemptOutcome::GenerationFailure {
                        error: e.to_string(),
                    },
                )));
            }
        };

        if let Some(previous) = history.iter().rev().find_map(|r| r.definition.as_ref()) {
            if previous.digest() == definition.digest() {
                warn!(attempt, "Proposed definition is identical to the previous attempt");
            }
        }
        ctx.report(ProgressEvent::DefinitionProposed {
            attempt,
            stages: definition.stage_count(),
            response_time: generation_start.elapsed(),
        });
        debug!(attempt, "Proposed definition:\n{}", definition);
        advance(state, StepEvent::DefinitionProposed, max)?;

        if ctx.is_cancelled() {
            advance(state, StepEvent::Cancelled, max)?;
            return Ok(None);
        }

        let image_ref = ctx.attempt_tag(attempt);
        ctx.report(ProgressEvent::BuildStarted {
            attempt,
            image_ref: image_ref.clone(),
        });
        let build_start = Instant::now();
        let built = tokio::select! {
            _ = ctx.cancellation().cancelled() => {
                advance(state, StepEvent::Cancelled, max)?;
                return Ok(None);
            }
            built = builder.build(&definition, ctx.context_dir(), &image_ref, policy.build_timeout) => {
                built.map_err(Abort::Engine)?
            }
        };
        ctx.report(ProgressEvent::BuildComplete {
            attempt,
            success: built.is_built(),
            build_time: build_start.elapsed(),
        });

        if let BuildOutcome::Failed {
            stage,
            exit_code,
            log_tail,
        } = built
        {
            advance(state, StepEvent::BuildFailed, max)?;
            return Ok(Some(AttemptRecord::new(
                attempt,
                Some(definition),
                AttemptOutcome::BuildFailure {
                    stage,
                    exit_code,
                    log_tail,
                },
            )));
        }
        advance(state, StepEvent::BuildSucceeded, max)?;

        if ctx.is_cancelled() {
            advance(state, StepEvent::Cancelled, max)?;
            return Ok(None);
        }

        let validation = if policy.skip_validation {
            info!(attempt, "Runtime validation skipped");
            ValidationOutcome::Pass
        } else {
            ctx.report(ProgressEvent::ValidationStarted { attempt });
            match validator
                .validate(&image_ref, intent, policy, ctx.cancellation())
                .await
            {
                Ok(outcome) => outcome,
                Err(EngineError::Cancelled) => {
                    advance(state, StepEvent::Cancelled, max)?;
                    return Ok(None);
                }
                Err(e) => return Err(Abort::Engine(e)),
            }
        };
        ctx.report(ProgressEvent::ValidationComplete {
            attempt,
            passed: validation.is_pass(),
            reason: validation.reason().map(|r| r.to_string()),
        });

        match validation {
            ValidationOutcome::Pass => {
                let limit = policy.engine_call_timeout;
                timeout(limit, self.engine.tag_image(&image_ref, ctx.final_tag()))
                    .await
                    .unwrap_or_else(|_| {
                        Err(EngineError::Unavailable(format!(
                            "tagging {} did not finish within {}s",
                            ctx.final_tag(),
                            limit.as_secs()
                        )))
                    })
                    .map_err(Abort::Engine)?;
                advance(state, StepEvent::ValidationPassed, max)?;
                info!(attempt, image = %ctx.final_tag(), "Image tagged");
                Ok(Some(AttemptRecord::new(
                    attempt,
                    Some(definition),
                    AttemptOutcome::Success {
                        image_ref: ctx.final_tag().to_string(),
                    },
                )))
            }
            ValidationOutcome::Fail { reason, detail } => {
                advance(state, StepEvent::ValidationFailed, max)?;
                Ok(Some(AttemptRecord::new(
                    attempt,
                    Some(definition),
                    AttemptOutcome::ValidationFailure { reason, detail },
                )))
            }
        }
    }

    /// Removes attempt tags and prunes dangling images labelled with the run id
    async fn cleanup(&self, ctx: &HealContext, attempt_tags: &[String]) {
        let limit = ctx.policy().engine_call_timeout;
        for tag in attempt_tags {
            match timeout(limit, self.engine.remove_image(tag)).await {
                Ok(Ok(())) => debug!(image = %tag, "Removed attempt image"),
                Ok(Err(EngineError::NotFound(_))) => {}
                Ok(Err(e)) => warn!(image = %tag, error = %e, "Failed to remove attempt image"),
                Err(_) => warn!(image = %tag, "Timed out removing attempt image"),
            }
        }
        match timeout(limit, self.engine.prune_images(&ctx.run_label())).await {
            Ok(Ok(0)) => {}
            Ok(Ok(count)) => debug!(count, "Pruned dangling images"),
            Ok(Err(e)) => warn!(error = %e, "Failed to prune dangling images"),
            Err(_) => warn!("Timed out pruning dangling images"),
        }
    }
}

fn advance(state: &mut HealState, event: StepEvent, max_attempts: u32) -> Result<(), TransitionError> {
    let next = transition(*state, event, max_attempts)?;
    debug!(from = %state, to = %next, ?event, "Heal loop transition");
    *state = next;
    Ok(())
}
