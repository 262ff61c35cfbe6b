use super::commands::{BuildArgs, HealthArgs};
use super::output::{HealthStatus, OutputFormatter};
use super::{
    EXIT_BUILD_EXHAUSTED, EXIT_CANCELLED, EXIT_ERROR, EXIT_GENERATION_EXHAUSTED, EXIT_SUCCESS,
    EXIT_VALIDATION_EXHAUSTED,
};
use crate::architect::LlmArchitect;
use crate::config::HealboxConfig;
use crate::engine::{ContainerEngine, DockerEngine};
use crate::heal::{CancellationToken, FailureKind, HealContext, HealError, HealLoop};
use crate::llm::select_llm_client;
use crate::progress::{LoggingHandler, NoOpHandler, ProgressHandler};
use crate::workspace::{GitHubSource, Workspace};
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Process exit code for a run that ended without an image
pub fn exit_code_for(error: &HealError) -> i32 {
    match error {
        HealError::Exhausted { kind, .. } => match kind {
            FailureKind::Generation => EXIT_GENERATION_EXHAUSTED,
            FailureKind::Build => EXIT_BUILD_EXHAUSTED,
            FailureKind::Validation => EXIT_VALIDATION_EXHAUSTED,
        },
        HealError::Cancelled { .. } => EXIT_CANCELLED,
        HealError::Engine { .. } | HealError::Transition(_) => EXIT_ERROR,
    }
}

pub async fn handle_build(args: &BuildArgs, quiet: bool) -> i32 {
    let config = match build_config(args) {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {:#}", e);
            eprintln!("Error: {:#}", e);
            return EXIT_ERROR;
        }
    };
    debug!("Configuration:\n{}", config);

    match run_build(args, &config, quiet).await {
        Ok(code) => code,
        Err(e) => {
            error!("Build failed: {:#}", e);
            eprintln!("Error: {:#}", e);
            EXIT_ERROR
        }
    }
}

fn build_config(args: &BuildArgs) -> Result<HealboxConfig> {
    let mut config = HealboxConfig::default();
    if let Some(backend) = args.backend {
        config.provider = backend;
    }
    if let Some(model) = &args.model {
        config.model = model.clone();
    }
    if let Some(max_attempts) = args.max_attempts {
        config.max_attempts = max_attempts;
    }
    if let Some(build_timeout) = args.build_timeout {
        config.build_timeout_secs = build_timeout;
    }
    if let Some(window) = args.observation_window {
        config.observation_window_secs = window;
    }
    config.validate()?;
    Ok(config)
}

async fn run_build(args: &BuildArgs, config: &HealboxConfig, quiet: bool) -> Result<i32> {
    let workspace = match args.source.to_str().and_then(GitHubSource::parse) {
        Some(remote) => Workspace::fetch(&remote)
            .await
            .with_context(|| format!("Failed to fetch {}", remote))?,
        None => Workspace::open(&args.source)
            .with_context(|| format!("Failed to open source {}", args.source.display()))?,
    };
    let listing = Arc::new(workspace.listing().context("Failed to scan workspace")?);
    info!(
        root = %workspace.root().display(),
        files = listing.len(),
        "Workspace ready"
    );

    let selected = select_llm_client(config, args.backend).await?;
    info!("Using generation backend: {}", selected.description);

    let engine: Arc<dyn ContainerEngine> =
        Arc::new(DockerEngine::connect().context("Failed to connect to the container engine")?);
    engine
        .ping()
        .await
        .context("Container engine is not responding")?;

    let policy = config.heal_policy().with_skip_validation(args.skip_validation);
    let architect = Arc::new(LlmArchitect::new(selected.client, listing.clone(), policy.clone()));

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling after cleanup");
            on_interrupt.cancel();
        }
    });

    let progress: Arc<dyn ProgressHandler> = if quiet {
        Arc::new(NoOpHandler)
    } else {
        Arc::new(LoggingHandler)
    };
    let ctx = HealContext::new(workspace.root(), args.tag.clone())
        .with_policy(policy)
        .with_cancellation(cancel)
        .with_progress(progress);

    let formatter = OutputFormatter::new(args.format.into());
    let result = HealLoop::new(architect, engine).run(&ctx, &listing).await;

    let code = match result {
        Ok(report) => {
            if let Some(path) = &args.emit_dockerfile {
                std::fs::write(path, report.definition.to_dockerfile())
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                info!("Dockerfile written to {}", path.display());
            }
            println!("{}", formatter.format_report(&report)?);
            EXIT_SUCCESS
        }
        Err(err) => {
            println!("{}", formatter.format_failure(&err)?);
            exit_code_for(&err)
        }
    };

    // Failed runs keep the unpacked sources for inspection
    if workspace.is_temporary() && (args.keep_workspace || code != EXIT_SUCCESS) {
        let path = workspace.keep();
        info!("Workspace preserved at {}", path.display());
    }

    Ok(code)
}

pub async fn handle_health(args: &HealthArgs) -> i32 {
    let config = HealboxConfig::default();
    let mut results = BTreeMap::new();

    let backend_status = match select_llm_client(&config, args.backend).await {
        Ok(selected) => HealthStatus::available(format!("Using {}", selected.description)),
        Err(e) => HealthStatus::unavailable(e.to_string())
            .with_details(format!("Configured provider: {} ({})", config.provider, config.model)),
    };
    results.insert("generation_backend".to_string(), backend_status);

    let engine_status = match DockerEngine::connect() {
        Ok(engine) => match engine.ping().await {
            Ok(()) => HealthStatus::available(format!("{} is responding", engine.name())),
            Err(e) => HealthStatus::unavailable(e.to_string()),
        },
        Err(e) => HealthStatus::unavailable(e.to_string()),
    };
    results.insert("container_engine".to_string(), engine_status);

    let all_available = results.values().all(|s| s.available);

    let formatter = OutputFormatter::new(args.format.into());
    match formatter.format_health(&results) {
        Ok(output) => println!("{}", output),
        Err(e) => {
            error!("Failed to format health status: {:#}", e);
            return EXIT_ERROR;
        }
    }

    if all_available {
        EXIT_SUCCESS
    } else {
        EXIT_ERROR
    }
}
