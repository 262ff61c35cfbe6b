use super::checks::{check_base_family, check_image_size};
use super::{ValidationOutcome, ValidationReason};
use crate::engine::{ContainerEngine, ContainerHandle, ContainerSpec, ContainerStatus, EngineError};
use crate::heal::{CancellationToken, HealPolicy};
use crate::intent::ProjectIntent;
use crate::util::tail_chars;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep_until, timeout, Instant};
use tracing::{debug, info, warn};

const MAX_POLL_INTERVAL: Duration = Duration::from_millis(500);
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);
const LOG_TAIL_LINES: usize = 50;

/// Starts a validation container, watches it, then runs the static checks
pub struct RuntimeValidator {
    engine: Arc<dyn ContainerEngine>,
    labels: HashMap<String, String>,
}

enum Observation {
    Settled(ContainerStatus),
    Failed(ValidationOutcome),
}

/// The engine sat on a call past the policy's per-call limit
fn stalled(what: &str, limit: Duration) -> ValidationOutcome {
    ValidationOutcome::fail(
        ValidationReason::Timeout,
        format!(
            "container engine did not answer {} within {:.1}s",
            what,
            limit.as_secs_f32()
        ),
    )
}

impl RuntimeValidator {
    pub fn new(engine: Arc<dyn ContainerEngine>) -> Self {
        Self {
            engine,
            labels: HashMap::new(),
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Validates `image_ref` against `policy`
    ///
    /// The validation container is stopped and removed before this returns, on
    /// every path. Engine faults and cancellation are errors; everything the
    /// image itself is to blame for is a [`ValidationOutcome::Fail`].
    pub async fn validate(
        &self,
        image_ref: &str,
        intent: &ProjectIntent,
        policy: &HealPolicy,
        cancel: &CancellationToken,
    ) -> Result<ValidationOutcome, EngineError> {
        let spec = ContainerSpec {
            name: format!("healbox-check-{}", &uuid::Uuid::new_v4().simple().to_string()[..12]),
            image: image_ref.to_string(),
            ports: intent.port.into_iter().collect(),
            restart_on_failure: true,
            labels: self.labels.clone(),
        };
        let handle = ContainerHandle::new(spec.name.clone());

        let observed = self.observe(&spec, &handle, policy, cancel).await;
        let runtime = match observed {
            Ok(Observation::Settled(status)) => {
                Ok(self.classify(&handle, &status, policy).await)
            }
            Ok(Observation::Failed(outcome)) => Ok(outcome),
            Err(e) => Err(e),
        };
        self.teardown(&handle, policy.engine_call_timeout).await;

        let runtime = runtime?;
        if !runtime.is_pass() {
            return Ok(runtime);
        }
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        self.static_checks(image_ref, policy).await
    }

    async fn observe(
        &self,
        spec: &ContainerSpec,
        handle: &ContainerHandle,
        policy: &HealPolicy,
        cancel: &CancellationToken,
    ) -> Result<Observation, EngineError> {
        let limit = policy.engine_call_timeout;
        let started = tokio::select! {
            _ = cancel.cancelled() => return Err(EngineError::Cancelled),
            started = timeout(limit, self.engine.run_container(spec)) => started,
        };
        match started {
            Err(_) => return Ok(Observation::Failed(stalled("the container start", limit))),
            // The daemon refused to start the image (missing entrypoint, bad command)
            Ok(Err(EngineError::Request(message))) => {
                return Ok(Observation::Failed(ValidationOutcome::fail(
                    ValidationReason::NonZeroExit,
                    format!("container failed to start: {}", message),
                )))
            }
            Ok(Err(e)) => return Err(e),
            Ok(Ok(_)) => {}
        }
        info!(container = %handle.id, window_secs = policy.observation_window.as_secs_f32(), "Observing container");

        let window_end = Instant::now() + policy.observation_window;
        let interval = (policy.observation_window / 10).clamp(MIN_POLL_INTERVAL, MAX_POLL_INTERVAL);
        let mut last_failure_code = None;

        loop {
            let polled = tokio::select! {
                _ = cancel.cancelled() => return Err(EngineError::Cancelled),
                polled = timeout(limit, self.engine.inspect_container(handle)) => polled,
            };
            let Ok(status) = polled else {
                return Ok(Observation::Failed(stalled("a container status request", limit)));
            };
            let mut status = status?;
            if !status.running && status.exit_code.is_some_and(|code| code != 0) {
                last_failure_code = status.exit_code;
            }
            if status.exit_count() >= 2 || status.has_exited() || Instant::now() >= window_end {
                // A restarted container reports the code of its current run
                if status.exit_code.unwrap_or(0) == 0 && last_failure_code.is_some() {
                    status.exit_code = last_failure_code;
                }
                return Ok(Observation::Settled(status));
            }

            let wake = (Instant::now() + interval).min(window_end);
            tokio::select! {
                _ = cancel.cancelled() => return Err(EngineError::Cancelled),
                _ = sleep_until(wake) => {}
            }
        }
    }

    async fn classify(
        &self,
        handle: &ContainerHandle,
        status: &ContainerStatus,
        policy: &HealPolicy,
    ) -> ValidationOutcome {
        let exits = status.exit_count();
        let code = status
            .exit_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "unknown".to_string());

        let (reason, summary) = if exits >= 2 {
            (
                ValidationReason::CrashLooped,
                format!(
                    "container exited {} times within {}s (last exit code {})",
                    exits,
                    policy.observation_window.as_secs(),
                    code
                ),
            )
        } else if status.running && status.restart_count > 0 {
            (
                ValidationReason::NonZeroExit,
                format!(
                    "container restarted {} time(s) within {}s before staying up",
                    status.restart_count,
                    policy.observation_window.as_secs()
                ),
            )
        } else if status.restarting || (status.has_exited() && status.exit_code != Some(0)) {
            (
                ValidationReason::NonZeroExit,
                format!("container exited with code {}", code),
            )
        } else {
            debug!(container = %handle.id, running = status.running, "Container survived observation");
            return ValidationOutcome::Pass;
        };

        let logs = match timeout(
            policy.engine_call_timeout,
            self.engine.container_logs(handle, LOG_TAIL_LINES),
        )
        .await
        {
            Ok(Ok(logs)) if !logs.trim().is_empty() => logs,
            Ok(Ok(_)) => String::new(),
            Ok(Err(e)) => {
                warn!(container = %handle.id, error = %e, "Failed to read container logs");
                String::new()
            }
            Err(_) => {
                warn!(container = %handle.id, "Timed out reading container logs");
                String::new()
            }
        };

        let detail = if logs.is_empty() {
            summary
        } else {
            let budget = policy.max_evidence_chars.saturating_sub(summary.len() + 1);
            format!("{}\n{}", summary, tail_chars(&logs, budget))
        };
        ValidationOutcome::fail(reason, detail)
    }

    async fn static_checks(
        &self,
        image_ref: &str,
        policy: &HealPolicy,
    ) -> Result<ValidationOutcome, EngineError> {
        let limit = policy.engine_call_timeout;
        let info = match timeout(limit, self.engine.inspect_image(image_ref)).await {
            Ok(info) => info?,
            Err(_) => return Ok(stalled("the image inspection", limit)),
        };

        if let Some(failure) = check_image_size(&info, policy) {
            return Ok(failure);
        }
        let base = timeout(
            limit,
            check_base_family(self.engine.as_ref(), image_ref, &info, policy),
        )
        .await;
        match base {
            Ok(Ok(Some(failure))) => Ok(failure),
            Ok(Ok(None)) => Ok(ValidationOutcome::Pass),
            Ok(Err(e)) => Err(e),
            Err(_) => Ok(stalled("the base image lookup", limit)),
        }
    }

    async fn teardown(&self, handle: &ContainerHandle, limit: Duration) {
        match timeout(limit, self.engine.stop_container(handle)).await {
            Ok(Ok(())) | Ok(Err(EngineError::NotFound(_))) => {}
            Ok(Err(e)) => warn!(container = %handle.id, error = %e, "Failed to stop validation container"),
            Err(_) => warn!(container = %handle.id, "Timed out stopping validation container"),
        }
        match timeout(limit, self.engine.remove_container(handle)).await {
            Ok(Ok(())) => debug!(container = %handle.id, "Validation container removed"),
            Ok(Err(EngineError::NotFound(_))) => {}
            Ok(Err(e)) => warn!(container = %handle.id, error = %e, "Failed to remove validation container"),
            Err(_) => warn!(container = %handle.id, "Timed out removing validation container"),
        }
    }
}
