use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use healbox::engine::{
    BuildEvent, BuildRequest, BuildResult, ContainerEngine, ContainerHandle, ContainerSpec,
    ContainerStatus, EngineError, ImageInfo,
};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Mutex;

pub const ALPINE: &str = "alpine:3.20";
pub const ALPINE_LAYER: &str = "sha256:alpine-base";
pub const DISTROLESS: &str = "gcr.io/distroless/static:nonroot";
pub const DISTROLESS_LAYER: &str = "sha256:distroless-base";

/// What the next submitted build does
#[derive(Debug, Clone)]
pub enum BuildScript {
    Succeed,
    Fail { exit_code: i64, logs: Vec<String> },
    /// Emits logs, then never finishes
    Hang { logs: Vec<String> },
    /// The engine connection breaks mid-build
    Broken,
}

/// How validation containers behave once started
#[derive(Debug, Clone)]
pub enum ContainerBehavior {
    Running,
    Exits(i64),
    CrashLoop(i64),
    /// Crashed `n` times, then came back up
    Recovers(u32),
    RefusesToStart(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    Build(String),
    Run(String),
    Inspect(String),
    Logs(String),
    Stop(String),
    Remove(String),
    Tag { source: String, target: String },
    RemoveImage(String),
    Prune(String),
}

struct FakeState {
    images: BTreeMap<String, ImageInfo>,
    builds: VecDeque<BuildScript>,
    default_build: BuildScript,
    container: ContainerBehavior,
    inspect_fails: bool,
    inspect_hangs: bool,
    built_image: ImageInfo,
    live_containers: BTreeSet<String>,
    calls: Vec<EngineCall>,
}

/// In-memory container engine with scripted behavior and a call log
pub struct FakeEngine {
    state: Mutex<FakeState>,
}

impl FakeEngine {
    pub fn new() -> Self {
        let mut images = BTreeMap::new();
        images.insert(
            ALPINE.to_string(),
            ImageInfo {
                size_bytes: 8 * 1024 * 1024,
                layers: vec![ALPINE_LAYER.to_string()],
            },
        );
        images.insert(
            DISTROLESS.to_string(),
            ImageInfo {
                size_bytes: 2 * 1024 * 1024,
                layers: vec![DISTROLESS_LAYER.to_string()],
            },
        );

        Self {
            state: Mutex::new(FakeState {
                images,
                builds: VecDeque::new(),
                default_build: BuildScript::Succeed,
                container: ContainerBehavior::Running,
                inspect_fails: false,
                inspect_hangs: false,
                built_image: ImageInfo {
                    size_bytes: 20 * 1024 * 1024,
                    layers: vec![ALPINE_LAYER.to_string(), "sha256:app".to_string()],
                },
                live_containers: BTreeSet::new(),
                calls: Vec::new(),
            }),
        }
    }

    pub fn with_image(self, reference: &str, info: ImageInfo) -> Self {
        self.state.lock().unwrap().images.insert(reference.to_string(), info);
        self
    }

    pub fn push_build(&self, script: BuildScript) {
        self.state.lock().unwrap().builds.push_back(script);
    }

    pub fn set_default_build(&self, script: BuildScript) {
        self.state.lock().unwrap().default_build = script;
    }

    pub fn set_container(&self, behavior: ContainerBehavior) {
        self.state.lock().unwrap().container = behavior;
    }

    pub fn fail_inspect(&self) {
        self.state.lock().unwrap().inspect_fails = true;
    }

    /// Container inspection never answers
    pub fn hang_inspect(&self) {
        self.state.lock().unwrap().inspect_hangs = true;
    }

    pub fn set_built_image(&self, info: ImageInfo) {
        self.state.lock().unwrap().built_image = info;
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count(&self, matches: impl Fn(&EngineCall) -> bool) -> usize {
        self.calls().iter().filter(|c| matches(c)).count()
    }

    pub fn image(&self, reference: &str) -> Option<ImageInfo> {
        self.state.lock().unwrap().images.get(reference).cloned()
    }

    pub fn image_refs(&self) -> Vec<String> {
        self.state.lock().unwrap().images.keys().cloned().collect()
    }

    pub fn live_containers(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .live_containers
            .iter()
            .cloned()
            .collect()
    }

    fn record(&self, call: EngineCall) {
        self.state.lock().unwrap().calls.push(call);
    }
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    fn name(&self) -> &str {
        "fake"
    }

    async fn ping(&self) -> Result<(), EngineError> {
        Ok(())
    }

    fn submit_build(&self, request: BuildRequest) -> BoxStream<'static, Result<BuildEvent, EngineError>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(EngineCall::Build(request.image_ref.clone()));
        let script = state
            .builds
            .pop_front()
            .unwrap_or_else(|| state.default_build.clone());

        match script {
            BuildScript::Succeed => {
                let built = state.built_image.clone();
                state.images.insert(request.image_ref.clone(), built);
                stream::iter(vec![
                    Ok(BuildEvent::Log("Step 1/2 : FROM alpine:3.20".to_string())),
                    Ok(BuildEvent::Log("Step 2/2 : COPY . /app".to_string())),
                    Ok(BuildEvent::Finished(BuildResult::Succeeded)),
                ])
                .boxed()
            }
            BuildScript::Fail { exit_code, logs } => {
                let mut events: Vec<Result<BuildEvent, EngineError>> =
                    logs.into_iter().map(|l| Ok(BuildEvent::Log(l))).collect();
                events.push(Ok(BuildEvent::Finished(BuildResult::Failed {
                    exit_code: Some(exit_code),
                    message: format!("returned a non-zero code: {}", exit_code),
                })));
                stream::iter(events).boxed()
            }
            BuildScript::Hang { logs } => {
                let events: Vec<Result<BuildEvent, EngineError>> =
                    logs.into_iter().map(|l| Ok(BuildEvent::Log(l))).collect();
                stream::iter(events).chain(stream::pending()).boxed()
            }
            BuildScript::Broken => stream::iter(vec![
                Ok(BuildEvent::Log("Step 1/2 : FROM alpine:3.20".to_string())),
                Err(EngineError::Unavailable("connection reset".to_string())),
            ])
            .boxed(),
        }
    }

    async fn run_container(&self, spec: &ContainerSpec) -> Result<ContainerHandle, EngineError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(EngineCall::Run(spec.name.clone()));
        if !state.images.contains_key(&spec.image) {
            return Err(EngineError::NotFound(spec.image.clone()));
        }
        if let ContainerBehavior::RefusesToStart(message) = &state.container {
            return Err(EngineError::Request(message.clone()));
        }
        state.live_containers.insert(spec.name.clone());
        Ok(ContainerHandle::new(spec.name.clone()))
    }

    async fn inspect_container(&self, handle: &ContainerHandle) -> Result<ContainerStatus, EngineError> {
        self.record(EngineCall::Inspect(handle.id.clone()));
        let hangs = self.state.lock().unwrap().inspect_hangs;
        if hangs {
            std::future::pending::<()>().await;
        }
        let state = self.state.lock().unwrap();
        if state.inspect_fails {
            return Err(EngineError::Request("inspect failed".to_string()));
        }
        Ok(match &state.container {
            ContainerBehavior::Running => ContainerStatus {
                running: true,
                restarting: false,
                exit_code: Some(0),
                restart_count: 0,
            },
            ContainerBehavior::Exits(code) => ContainerStatus {
                running: false,
                restarting: false,
                exit_code: Some(*code),
                restart_count: 0,
            },
            ContainerBehavior::CrashLoop(code) => ContainerStatus {
                running: false,
                restarting: true,
                exit_code: Some(*code),
                restart_count: 2,
            },
            ContainerBehavior::Recovers(restarts) => ContainerStatus {
                running: true,
                restarting: false,
                exit_code: Some(0),
                restart_count: *restarts,
            },
            ContainerBehavior::RefusesToStart(_) => ContainerStatus::default(),
        })
    }

    async fn container_logs(&self, handle: &ContainerHandle, _tail_lines: usize) -> Result<String, EngineError> {
        self.record(EngineCall::Logs(handle.id.clone()));
        Ok("Error: Cannot find module '/app/server.js'\n".to_string())
    }

    async fn stop_container(&self, handle: &ContainerHandle) -> Result<(), EngineError> {
        self.record(EngineCall::Stop(handle.id.clone()));
        Ok(())
    }

    async fn remove_container(&self, handle: &ContainerHandle) -> Result<(), EngineError> {
        self.record(EngineCall::Remove(handle.id.clone()));
        let mut state = self.state.lock().unwrap();
        if state.live_containers.remove(&handle.id) {
            Ok(())
        } else {
            Err(EngineError::NotFound(handle.id.clone()))
        }
    }

    async fn inspect_image(&self, image_ref: &str) -> Result<ImageInfo, EngineError> {
        self.state
            .lock()
            .unwrap()
            .images
            .get(image_ref)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(image_ref.to_string()))
    }

    async fn list_image_refs(&self) -> Result<Vec<String>, EngineError> {
        Ok(self.image_refs())
    }

    async fn tag_image(&self, source: &str, target: &str) -> Result<(), EngineError> {
        self.record(EngineCall::Tag {
            source: source.to_string(),
            target: target.to_string(),
        });
        let mut state = self.state.lock().unwrap();
        let info = state
            .images
            .get(source)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(source.to_string()))?;
        state.images.insert(target.to_string(), info);
        Ok(())
    }

    async fn remove_image(&self, image_ref: &str) -> Result<(), EngineError> {
        self.record(EngineCall::RemoveImage(image_ref.to_string()));
        self.state
            .lock()
            .unwrap()
            .images
            .remove(image_ref)
            .map(|_| ())
            .ok_or_else(|| EngineError::NotFound(image_ref.to_string()))
    }

    async fn prune_images(&self, label: &str) -> Result<u64, EngineError> {
        self.record(EngineCall::Prune(label.to_string()));
        Ok(0)
    }
}
