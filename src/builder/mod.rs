//! Runs a build definition through the container engine under a deadline

use crate::definition::BuildDefinition;
use crate::engine::{BuildEvent, BuildRequest, BuildResult, ContainerEngine, EngineError};
use crate::util::TailBuffer;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, info, warn};

/// Stage reported when the build deadline passes
pub const TIMEOUT_STAGE: &str = "timeout";

const DISCARD_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum BuildOutcome {
    Built {
        image_ref: String,
        size_bytes: u64,
    },
    Failed {
        /// Last build step seen, or `timeout`
        stage: String,
        exit_code: i64,
        log_tail: String,
    },
}

impl BuildOutcome {
    pub fn is_built(&self) -> bool {
        matches!(self, BuildOutcome::Built { .. })
    }
}

pub struct EngineBuilder {
    engine: Arc<dyn ContainerEngine>,
    max_log_chars: usize,
    labels: HashMap<String, String>,
}

impl EngineBuilder {
    pub fn new(engine: Arc<dyn ContainerEngine>, max_log_chars: usize) -> Self {
        Self {
            engine,
            max_log_chars,
            labels: HashMap::new(),
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Builds `definition` with `workspace` as context and tags the result `image_ref`
    ///
    /// Build failures and timeouts are outcomes. Only engine faults unrelated
    /// to the definition (daemon unreachable, broken transport) are errors.
    /// On failure or timeout nothing is left tagged `image_ref`.
    pub async fn build(
        &self,
        definition: &BuildDefinition,
        workspace: &Path,
        image_ref: &str,
        timeout: Duration,
    ) -> Result<BuildOutcome, EngineError> {
        let request = BuildRequest {
            dockerfile: definition.to_dockerfile(),
            context_dir: workspace.to_path_buf(),
            image_ref: image_ref.to_string(),
            labels: self.labels.clone(),
        };

        let deadline = Instant::now() + timeout;
        let mut tail = TailBuffer::new(self.max_log_chars);
        let mut current_step = String::from("build");
        let mut events = self.engine.submit_build(request);

        loop {
            let next = match timeout_at(deadline, events.next()).await {
                Ok(next) => next,
                Err(_) => {
                    drop(events);
                    warn!(image = %image_ref, timeout_secs = timeout.as_secs(), "Build timed out");
                    self.discard(image_ref).await;
                    return Ok(BuildOutcome::Failed {
                        stage: TIMEOUT_STAGE.to_string(),
                        exit_code: -1,
                        log_tail: tail.contents(),
                    });
                }
            };

            match next {
                Some(Ok(BuildEvent::Log(line))) => {
                    if let Some(step) = step_of(&line) {
                        current_step = step;
                    }
                    debug!(target: "healbox::build_log", "{}", line);
                    tail.push_line(&line);
                }
                Some(Ok(BuildEvent::Finished(BuildResult::Succeeded))) => {
                    let Ok(info) = timeout_at(deadline, self.engine.inspect_image(image_ref)).await
                    else {
                        warn!(image = %image_ref, "Built image could not be inspected before the deadline");
                        self.discard(image_ref).await;
                        return Ok(BuildOutcome::Failed {
                            stage: TIMEOUT_STAGE.to_string(),
                            exit_code: -1,
                            log_tail: tail.contents(),
                        });
                    };
                    let info = info?;
                    info!(image = %image_ref, size_bytes = info.size_bytes, "Image built");
                    return Ok(BuildOutcome::Built {
                        image_ref: image_ref.to_string(),
                        size_bytes: info.size_bytes,
                    });
                }
                Some(Ok(BuildEvent::Finished(BuildResult::Failed { exit_code, message }))) => {
                    tail.push_line(&message);
                    self.discard(image_ref).await;
                    return Ok(BuildOutcome::Failed {
                        stage: current_step,
                        exit_code: exit_code.unwrap_or(1),
                        log_tail: tail.contents(),
                    });
                }
                Some(Err(e)) => {
                    self.discard(image_ref).await;
                    return Err(e);
                }
                None => {
                    self.discard(image_ref).await;
                    tail.push_line("build stream ended without a result");
                    return Ok(BuildOutcome::Failed {
                        stage: current_step,
                        exit_code: -1,
                        log_tail: tail.contents(),
                    });
                }
            }
        }
    }

    // The attempt tag may or may not exist yet
    async fn discard(&self, image_ref: &str) {
        match timeout(DISCARD_TIMEOUT, self.engine.remove_image(image_ref)).await {
            Ok(Ok(())) => debug!(image = %image_ref, "Removed partial image"),
            Ok(Err(EngineError::NotFound(_))) => {}
            Ok(Err(e)) => warn!(image = %image_ref, error = %e, "Failed to remove partial image"),
            Err(_) => warn!(image = %image_ref, "Timed out removing partial image"),
        }
    }
}

/// "Step 3/7 : RUN npm ci" -> "3/7 RUN npm ci"
fn step_of(line: &str) -> Option<String> {
    let rest = line.trim().strip_prefix("Step ")?;
    let (counter, instruction) = rest.split_once(" : ")?;
    Some(format!("{} {}", counter.trim(), instruction.trim()))
}
