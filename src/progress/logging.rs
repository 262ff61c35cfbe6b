//! Logging-based progress handler

use super::{ProgressEvent, ProgressHandler};
use tracing::{debug, info, warn};

/// Handler that logs progress events using tracing
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

impl ProgressHandler for LoggingHandler {
    fn on_progress(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::Started { source, run_id } => {
                info!(source = %source, run_id = %run_id, "Starting healbox run");
            }
            ProgressEvent::IntentExtracted {
                language,
                entry_point,
                port,
                scan_time,
            } => {
                info!(
                    language = %language,
                    entry_point = entry_point.as_deref().unwrap_or("unknown"),
                    port = ?port,
                    scan_time_ms = scan_time.as_millis(),
                    "Project intent extracted"
                );
            }
            ProgressEvent::AttemptStarted {
                attempt,
                max_attempts,
            } => {
                info!(
                    progress = format!("{}/{}", attempt, max_attempts),
                    "Starting attempt"
                );
            }
            ProgressEvent::DefinitionProposed {
                attempt,
                stages,
                response_time,
            } => {
                debug!(
                    attempt,
                    stages,
                    response_time_ms = response_time.as_millis(),
                    "Definition proposed"
                );
            }
            ProgressEvent::GenerationFailed { attempt, error } => {
                warn!(attempt, error = %error, "Definition generation failed");
            }
            ProgressEvent::BuildStarted { attempt, image_ref } => {
                info!(attempt, image = %image_ref, "Building image");
            }
            ProgressEvent::BuildComplete {
                attempt,
                success,
                build_time,
            } => {
                if *success {
                    info!(
                        attempt,
                        build_time_ms = build_time.as_millis(),
                        "Build succeeded"
                    );
                } else {
                    warn!(
                        attempt,
                        build_time_ms = build_time.as_millis(),
                        "Build failed"
                    );
                }
            }
            ProgressEvent::ValidationStarted { attempt } => {
                debug!(attempt, "Starting runtime validation");
            }
            ProgressEvent::ValidationComplete {
                attempt,
                passed,
                reason,
            } => {
                if *passed {
                    info!(attempt, "Validation passed");
                } else {
                    warn!(attempt, reason = reason.as_deref().unwrap_or(""), "Validation failed");
                }
            }
            ProgressEvent::Completed {
                attempts,
                image_ref,
                total_time,
            } => {
                info!(
                    attempts,
                    image = %image_ref,
                    total_time_ms = total_time.as_millis(),
                    "Image ready"
                );
            }
            ProgressEvent::Failed { attempts, error } => {
                warn!(attempts, error = %error, "Run failed");
            }
        }
    }
}
