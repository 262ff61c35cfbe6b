//! Container engine seam
//!
//! Everything the builder and validator need from a container engine goes
//! through [`ContainerEngine`]. [`DockerEngine`] talks to a local Docker (or
//! Podman) daemon; tests substitute an in-memory engine.

mod build_context;
mod docker;

pub use build_context::{pack_build_context, DEFINITION_FILE_NAME};
pub use docker::DockerEngine;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

/// Label attached to every image and container a run creates
pub const RUN_LABEL: &str = "io.healbox.run";

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Container engine unavailable: {0}")]
    Unavailable(String),

    #[error("Container engine request failed: {0}")]
    Request(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Failed to package build context at {path}: {message}")]
    Context { path: PathBuf, message: String },

    #[error("Operation cancelled")]
    Cancelled,
}

/// A build submission: rendered definition plus context directory
#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub dockerfile: String,
    pub context_dir: PathBuf,
    pub image_ref: String,
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildEvent {
    Log(String),
    Finished(BuildResult),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildResult {
    Succeeded,
    Failed {
        exit_code: Option<i64>,
        message: String,
    },
}

#[derive(Debug, Clone)]
pub struct ContainerSpec {
    /// Also used as the container handle, so cleanup works even if creation times out
    pub name: String,
    pub image: String,
    pub ports: Vec<u16>,
    /// Let the engine restart the process after a failing exit
    pub restart_on_failure: bool,
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerHandle {
    pub id: String,
}

impl ContainerHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerStatus {
    pub running: bool,
    /// Exited and waiting for the engine to restart it
    pub restarting: bool,
    pub exit_code: Option<i64>,
    pub restart_count: u32,
}

impl ContainerStatus {
    /// Process exits observed so far, counting a pending or final exit
    pub fn exit_count(&self) -> u32 {
        let current = if self.restarting || !self.running { 1 } else { 0 };
        self.restart_count + current
    }

    pub fn has_exited(&self) -> bool {
        !self.running && !self.restarting
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub size_bytes: u64,
    /// Root filesystem layer digests, base first
    pub layers: Vec<String>,
}

#[async_trait]
pub trait ContainerEngine: Send + Sync {
    fn name(&self) -> &str;

    async fn ping(&self) -> Result<(), EngineError>;

    /// Streams build output; the stream ends after a [`BuildEvent::Finished`]
    fn submit_build(&self, request: BuildRequest) -> BoxStream<'static, Result<BuildEvent, EngineError>>;

    async fn run_container(&self, spec: &ContainerSpec) -> Result<ContainerHandle, EngineError>;

    async fn inspect_container(&self, handle: &ContainerHandle) -> Result<ContainerStatus, EngineError>;

    async fn container_logs(&self, handle: &ContainerHandle, tail_lines: usize) -> Result<String, EngineError>;

    async fn stop_container(&self, handle: &ContainerHandle) -> Result<(), EngineError>;

    async fn remove_container(&self, handle: &ContainerHandle) -> Result<(), EngineError>;

    async fn inspect_image(&self, image_ref: &str) -> Result<ImageInfo, EngineError>;

    /// Every tag and digest reference in the local store
    async fn list_image_refs(&self) -> Result<Vec<String>, EngineError>;

    async fn tag_image(&self, source: &str, target: &str) -> Result<(), EngineError>;

    async fn remove_image(&self, image_ref: &str) -> Result<(), EngineError>;

    /// Removes dangling images carrying `label`; returns how many were deleted
    async fn prune_images(&self, label: &str) -> Result<u64, EngineError>;
}
