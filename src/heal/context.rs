//! Per-run context passed through every heal loop component

use super::cancel::CancellationToken;
use super::policy::HealPolicy;
use crate::progress::{NoOpHandler, ProgressEvent, ProgressHandler};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Repository prefix for per-attempt image tags
pub const ATTEMPT_REPOSITORY: &str = "healbox-attempt";

/// Everything one run shares between its steps
///
/// There is no process-wide state: two contexts with different run ids can
/// drive two loops side by side.
#[derive(Clone)]
pub struct HealContext {
    run_id: String,
    policy: HealPolicy,
    cancel: CancellationToken,
    progress: Arc<dyn ProgressHandler>,
    /// Build context directory (the workspace root)
    context_dir: PathBuf,
    /// Tag applied to the image of a successful attempt
    final_tag: String,
}

impl HealContext {
    pub fn new(context_dir: impl Into<PathBuf>, final_tag: impl Into<String>) -> Self {
        let run_id = uuid::Uuid::new_v4().simple().to_string()[..12].to_string();
        Self {
            run_id,
            policy: HealPolicy::default(),
            cancel: CancellationToken::new(),
            progress: Arc::new(NoOpHandler),
            context_dir: context_dir.into(),
            final_tag: final_tag.into(),
        }
    }

    pub fn with_policy(mut self, policy: HealPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressHandler>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn policy(&self) -> &HealPolicy {
        &self.policy
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn context_dir(&self) -> &Path {
        &self.context_dir
    }

    pub fn final_tag(&self) -> &str {
        &self.final_tag
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Tag for the image built by `attempt`, never the final tag
    pub fn attempt_tag(&self, attempt: u32) -> String {
        format!("{}/{}:{}", ATTEMPT_REPOSITORY, self.run_id, attempt)
    }

    /// `key=value` label used to find this run's leftovers
    pub fn run_label(&self) -> String {
        format!("{}={}", crate::engine::RUN_LABEL, self.run_id)
    }

    pub(crate) fn report(&self, event: ProgressEvent) {
        self.progress.on_progress(&event);
    }
}

impl std::fmt::Debug for HealContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealContext")
            .field("run_id", &self.run_id)
            .field("policy", &self.policy)
            .field("context_dir", &self.context_dir)
            .field("final_tag", &self.final_tag)
            .finish()
    }
}
