//! healbox - self-healing container image builder
//!
//! Takes an application source tree and produces a working, hardened container
//! image without a hand-written Dockerfile. A generation backend proposes a
//! multi-stage definition, the container engine builds it, a validation container
//! checks that the image actually runs, and every failure is fed back to the
//! backend for the next attempt until one succeeds or the budget is spent.
//!
//! # Core Concepts
//!
//! - **Intent**: what the source tree is (ecosystem, manifests, entry point,
//!   port), extracted once per run by [`IntentExtractor`]
//! - **Definition**: the multi-stage build proposed by a [`DefinitionArchitect`]
//!   and parsed strictly into a [`BuildDefinition`]
//! - **Attempt**: one propose/build/validate cycle, recorded as an
//!   [`AttemptRecord`]
//! - **Heal loop**: the [`HealLoop`] state machine tying it together
//!
//! # Example Usage
//!
//! ```ignore
//! use healbox::{DockerEngine, HealContext, HealLoop, LlmArchitect, Workspace};
//! use std::sync::Arc;
//!
//! async fn build(client: Arc<dyn healbox::LLMClient>) -> anyhow::Result<()> {
//!     let workspace = Workspace::open("app.tar.gz".as_ref())?;
//!     let listing = Arc::new(workspace.listing()?);
//!     let ctx = HealContext::new(workspace.root(), "app:latest");
//!
//!     let architect = Arc::new(LlmArchitect::new(client, listing.clone(), ctx.policy().clone()));
//!     let engine = Arc::new(DockerEngine::connect()?);
//!
//!     let report = HealLoop::new(architect, engine).run(&ctx, &listing).await?;
//!     println!("{} built in {} attempts", report.image_ref, report.attempts);
//!     Ok(())
//! }
//! ```

pub mod architect;
pub mod builder;
pub mod cli;
pub mod config;
pub mod definition;
pub mod engine;
pub mod heal;
pub mod intent;
pub mod llm;
pub mod progress;
pub mod util;
pub mod validator;
pub mod workspace;

pub use architect::{DefinitionArchitect, GenerationError, LlmArchitect};
pub use builder::{BuildOutcome, EngineBuilder};
pub use config::{ConfigError, HealboxConfig};
pub use definition::{parse_definition, BuildDefinition, DefinitionError, Stage};
pub use engine::{ContainerEngine, DockerEngine, EngineError};
pub use heal::{
    AttemptOutcome, AttemptRecord, CancellationToken, HealContext, HealError, HealLoop,
    HealPolicy, HealReport,
};
pub use intent::{IntentExtractor, ProjectIntent};
pub use llm::{BackendError, LLMClient, MockLLMClient};
pub use util::{init_from_env, init_logging, LoggingConfig};
pub use validator::{RuntimeValidator, ValidationOutcome, ValidationReason};
pub use workspace::{FileListing, Workspace, WorkspaceError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
