use super::{
    pack_build_context, BuildEvent, BuildRequest, BuildResult, ContainerEngine, ContainerHandle,
    ContainerSpec, ContainerStatus, EngineError, ImageInfo, DEFINITION_FILE_NAME,
};
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, LogsOptions, RemoveContainerOptions,
    StartContainerOptions, StopContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::image::{
    BuildImageOptions, ListImagesOptions, PruneImagesOptions, RemoveImageOptions, TagImageOptions,
};
use bollard::models::{HostConfig, PortBinding, RestartPolicy, RestartPolicyNameEnum};
use bollard::Docker;
use futures_util::stream::{self, BoxStream, StreamExt};
use regex::Regex;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const STOP_GRACE_SECS: i64 = 2;
const BUILD_EVENT_BUFFER: usize = 64;
const MAX_RESTARTS: i64 = 5;

/// [`ContainerEngine`] backed by the local Docker daemon
#[derive(Clone)]
pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    pub fn connect() -> Result<Self, EngineError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| EngineError::Unavailable(e.to_string()))?;
        Ok(Self { docker })
    }

    pub fn with_client(docker: Docker) -> Self {
        Self { docker }
    }
}

impl std::fmt::Debug for DockerEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DockerEngine").finish()
    }
}

fn map_error(err: BollardError) -> EngineError {
    match err {
        BollardError::DockerResponseServerError {
            status_code: 404,
            message,
        } => EngineError::NotFound(message),
        BollardError::DockerResponseServerError { message, .. } => EngineError::Request(message),
        BollardError::HyperResponseError { .. }
        | BollardError::IOError { .. }
        | BollardError::SocketNotFoundError(_)
        | BollardError::RequestTimeoutError => EngineError::Unavailable(err.to_string()),
        other => EngineError::Request(other.to_string()),
    }
}

/// Exit code from classic builder messages like "returned a non-zero code: 127"
fn exit_code_from_message(message: &str) -> Option<i64> {
    let re = Regex::new(r"non-zero code: (-?\d+)").ok()?;
    re.captures(message)?.get(1)?.as_str().parse().ok()
}

/// Aborts the build task, and with it the open build request, when dropped
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn build_failure(message: String, code: Option<i64>) -> BuildEvent {
    BuildEvent::Finished(BuildResult::Failed {
        exit_code: code.or_else(|| exit_code_from_message(&message)),
        message,
    })
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    fn name(&self) -> &str {
        "docker"
    }

    async fn ping(&self) -> Result<(), EngineError> {
        self.docker
            .ping()
            .await
            .map(|_| ())
            .map_err(|e| EngineError::Unavailable(e.to_string()))
    }

    fn submit_build(&self, request: BuildRequest) -> BoxStream<'static, Result<BuildEvent, EngineError>> {
        let (tx, rx) = mpsc::channel(BUILD_EVENT_BUFFER);
        let docker = self.docker.clone();

        // The task owns the build request; dropping the returned stream aborts it
        let task = tokio::spawn(async move {
            let context_dir = request.context_dir.clone();
            let dockerfile = request.dockerfile.clone();
            let packed =
                tokio::task::spawn_blocking(move || pack_build_context(&context_dir, &dockerfile))
                    .await
                    .map_err(|e| EngineError::Request(format!("context packing task failed: {}", e)))
                    .and_then(|r| r);

            let body = match packed {
                Ok(body) => body,
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            };

            let options = BuildImageOptions {
                dockerfile: DEFINITION_FILE_NAME.to_string(),
                t: request.image_ref.clone(),
                rm: true,
                forcerm: true,
                labels: request.labels.clone(),
                ..Default::default()
            };

            debug!(image = %request.image_ref, context_bytes = body.len(), "Submitting build");

            let mut events = Box::pin(docker.build_image(options, None, Some(bytes::Bytes::from(body))));
            loop {
                // A quiet build step sends nothing, so watch for the consumer leaving too
                let item = tokio::select! {
                    _ = tx.closed() => {
                        debug!("Build consumer went away, abandoning build");
                        return;
                    }
                    item = events.next() => item,
                };
                let Some(item) = item else { break };

                let event = match item {
                    Ok(info) => {
                        if let Some(error) = info.error {
                            let code = info.error_detail.and_then(|d| d.code);
                            Ok(build_failure(error, code))
                        } else {
                            let text = info.stream.or(info.status).unwrap_or_default();
                            let text = text.trim_end();
                            if text.is_empty() {
                                continue;
                            }
                            Ok(BuildEvent::Log(text.to_string()))
                        }
                    }
                    // Dockerfile and step errors come from the daemon, not the transport
                    Err(BollardError::DockerStreamError { error }) => Ok(build_failure(error, None)),
                    Err(BollardError::DockerResponseServerError { message, .. }) => {
                        Ok(build_failure(message, None))
                    }
                    Err(other) => Err(map_error(other)),
                };

                let terminal = matches!(event, Ok(BuildEvent::Finished(_)) | Err(_));
                if tx.send(event).await.is_err() {
                    debug!("Build consumer went away, abandoning build");
                    return;
                }
                if terminal {
                    return;
                }
            }

            let _ = tx.send(Ok(BuildEvent::Finished(BuildResult::Succeeded))).await;
        });

        let guard = AbortOnDrop(task);
        stream::unfold((rx, guard), |(mut rx, guard)| async move {
            rx.recv().await.map(|item| (item, (rx, guard)))
        })
        .boxed()
    }

    async fn run_container(&self, spec: &ContainerSpec) -> Result<ContainerHandle, EngineError> {
        let exposed_ports = spec
            .ports
            .iter()
            .map(|p| (format!("{}/tcp", p), HashMap::new()))
            .collect::<HashMap<_, _>>();
        let port_bindings = spec
            .ports
            .iter()
            .map(|p| {
                (
                    format!("{}/tcp", p),
                    Some(vec![PortBinding {
                        host_ip: Some("127.0.0.1".to_string()),
                        host_port: Some("0".to_string()),
                    }]),
                )
            })
            .collect::<HashMap<_, _>>();

        let restart_policy = spec.restart_on_failure.then(|| RestartPolicy {
            name: Some(RestartPolicyNameEnum::ON_FAILURE),
            maximum_retry_count: Some(MAX_RESTARTS),
        });

        let config = Config {
            image: Some(spec.image.clone()),
            labels: Some(spec.labels.clone()),
            exposed_ports: Some(exposed_ports),
            host_config: Some(HostConfig {
                port_bindings: Some(port_bindings),
                restart_policy,
                ..Default::default()
            }),
            ..Default::default()
        };

        self.docker
            .create_container(
                Some(CreateContainerOptions {
                    name: spec.name.clone(),
                    platform: None,
                }),
                config,
            )
            .await
            .map_err(map_error)?;

        self.docker
            .start_container(&spec.name, None::<StartContainerOptions<String>>)
            .await
            .map_err(map_error)?;

        debug!(container = %spec.name, image = %spec.image, "Container started");
        Ok(ContainerHandle::new(spec.name.clone()))
    }

    async fn inspect_container(&self, handle: &ContainerHandle) -> Result<ContainerStatus, EngineError> {
        let inspect = self
            .docker
            .inspect_container(&handle.id, None::<InspectContainerOptions>)
            .await
            .map_err(map_error)?;

        let state = inspect.state.unwrap_or_default();
        Ok(ContainerStatus {
            running: state.running.unwrap_or(false),
            restarting: state.restarting.unwrap_or(false),
            exit_code: state.exit_code,
            restart_count: inspect.restart_count.unwrap_or(0).max(0) as u32,
        })
    }

    async fn container_logs(&self, handle: &ContainerHandle, tail_lines: usize) -> Result<String, EngineError> {
        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            tail: tail_lines.to_string(),
            ..Default::default()
        };

        let mut logs = self.docker.logs(&handle.id, Some(options));
        let mut output = String::new();
        while let Some(chunk) = logs.next().await {
            match chunk {
                Ok(line) => output.push_str(&line.to_string()),
                Err(e) => {
                    warn!(container = %handle.id, error = %e, "Log stream interrupted");
                    break;
                }
            }
        }
        Ok(output)
    }

    async fn stop_container(&self, handle: &ContainerHandle) -> Result<(), EngineError> {
        match self
            .docker
            .stop_container(&handle.id, Some(StopContainerOptions { t: STOP_GRACE_SECS }))
            .await
        {
            Ok(()) => Ok(()),
            // 304: already stopped
            Err(BollardError::DockerResponseServerError {
                status_code: 304, ..
            }) => Ok(()),
            Err(e) => Err(map_error(e)),
        }
    }

    async fn remove_container(&self, handle: &ContainerHandle) -> Result<(), EngineError> {
        self.docker
            .remove_container(
                &handle.id,
                Some(RemoveContainerOptions {
                    force: true,
                    v: true,
                    ..Default::default()
                }),
            )
            .await
            .map_err(map_error)
    }

    async fn inspect_image(&self, image_ref: &str) -> Result<ImageInfo, EngineError> {
        let inspect = self.docker.inspect_image(image_ref).await.map_err(map_error)?;
        Ok(ImageInfo {
            size_bytes: inspect.size.unwrap_or(0).max(0) as u64,
            layers: inspect
                .root_fs
                .and_then(|fs| fs.layers)
                .unwrap_or_default(),
        })
    }

    async fn list_image_refs(&self) -> Result<Vec<String>, EngineError> {
        let images = self
            .docker
            .list_images(Some(ListImagesOptions::<String> {
                all: false,
                ..Default::default()
            }))
            .await
            .map_err(map_error)?;

        Ok(images
            .into_iter()
            .flat_map(|image| image.repo_tags.into_iter().chain(image.repo_digests))
            .filter(|r| !r.starts_with("<none>"))
            .collect())
    }

    async fn tag_image(&self, source: &str, target: &str) -> Result<(), EngineError> {
        let (repo, tag) = match target.rsplit_once(':') {
            Some((repo, tag)) if !tag.contains('/') => (repo, tag),
            _ => (target, "latest"),
        };
        self.docker
            .tag_image(
                source,
                Some(TagImageOptions {
                    repo: repo.to_string(),
                    tag: tag.to_string(),
                }),
            )
            .await
            .map_err(map_error)
    }

    async fn remove_image(&self, image_ref: &str) -> Result<(), EngineError> {
        self.docker
            .remove_image(
                image_ref,
                Some(RemoveImageOptions {
                    force: false,
                    noprune: false,
                }),
                None,
            )
            .await
            .map(|_| ())
            .map_err(map_error)
    }

    async fn prune_images(&self, label: &str) -> Result<u64, EngineError> {
        let mut filters = HashMap::new();
        filters.insert("label".to_string(), vec![label.to_string()]);
        filters.insert("dangling".to_string(), vec!["true".to_string()]);

        let response = self
            .docker
            .prune_images(Some(PruneImagesOptions { filters }))
            .await
            .map_err(map_error)?;

        Ok(response
            .images_deleted
            .map(|deleted| deleted.len() as u64)
            .unwrap_or(0))
    }
}
