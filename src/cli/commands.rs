use clap::{Parser, Subcommand, ValueEnum};
use genai::adapter::AdapterKind;
use std::path::PathBuf;

/// Self-healing container image builder
#[derive(Parser, Debug)]
#[command(
    name = "healbox",
    about = "Turn a source tree into a working, hardened container image",
    version,
    long_about = "healbox reads a source directory, archive or GitHub repository, asks a generation backend \
                  for a multi-stage Dockerfile, builds it, checks that the image actually \
                  runs, and feeds any failure back to the backend until the image works \
                  or the attempt budget is spent."
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, value_name = "LEVEL", help = "Set logging level")]
    pub log_level: Option<String>,

    #[arg(short = 'v', long, global = true, help = "Enable debug logging")]
    pub verbose: bool,

    #[arg(
        short = 'q',
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Quiet mode - suppress non-error output"
    )]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(
        about = "Build a container image from a source tree",
        long_about = "Builds and validates an image, revising the Dockerfile after each failure.\n\n\
                      Examples:\n  \
                      healbox build ./app\n  \
                      healbox build app.tar.gz --tag app:1.0\n  \
                      healbox build https://github.com/acme/api\n  \
                      healbox build ./app --backend anthropic --max-attempts 5\n  \
                      healbox build ./app --skip-validation --emit-dockerfile Dockerfile"
    )]
    Build(BuildArgs),

    #[command(
        about = "Check generation backend and container engine availability",
        long_about = "Checks whether a generation backend can be selected and the container \
                      engine answers.\n\n\
                      Examples:\n  \
                      healbox health\n  \
                      healbox health --backend ollama --format json"
    )]
    Health(HealthArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct BuildArgs {
    #[arg(value_name = "SOURCE", help = "Source directory, .tar/.tar.gz/.tgz/.zip archive or public GitHub URL")]
    pub source: PathBuf,

    #[arg(
        short = 't',
        long,
        value_name = "TAG",
        default_value = "healbox-app:latest",
        help = "Tag for the final image (only set when an attempt succeeds)"
    )]
    pub tag: String,

    #[arg(
        short = 'b',
        long,
        value_parser = parse_adapter_kind,
        help = "Force a specific generation backend (by default, the best available is auto-selected)"
    )]
    pub backend: Option<AdapterKind>,

    #[arg(short = 'm', long, value_name = "MODEL", help = "Model name (provider-specific)")]
    pub model: Option<String>,

    #[arg(long, value_name = "N", help = "Maximum propose/build/validate attempts")]
    pub max_attempts: Option<u32>,

    #[arg(long, value_name = "SECONDS", help = "Per-attempt build timeout")]
    pub build_timeout: Option<u64>,

    #[arg(long, value_name = "SECONDS", help = "How long the validation container is observed")]
    pub observation_window: Option<u64>,

    #[arg(long, help = "Tag the image as soon as it builds, without running it")]
    pub skip_validation: bool,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,

    #[arg(long, value_name = "PATH", help = "Write the final Dockerfile to PATH on success")]
    pub emit_dockerfile: Option<PathBuf>,

    #[arg(long, help = "Keep the unpacked archive directory after the run")]
    pub keep_workspace: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct HealthArgs {
    #[arg(
        short = 'b',
        long,
        value_parser = parse_adapter_kind,
        help = "Specific backend to check"
    )]
    pub backend: Option<AdapterKind>,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormatArg {
    Json,
    Yaml,
    Human,
}

impl From<OutputFormatArg> for super::output::OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Json => super::output::OutputFormat::Json,
            OutputFormatArg::Yaml => super::output::OutputFormat::Yaml,
            OutputFormatArg::Human => super::output::OutputFormat::Human,
        }
    }
}

fn parse_adapter_kind(s: &str) -> Result<AdapterKind, String> {
    crate::config::parse_provider(s).map_err(|_| {
        format!(
            "Invalid provider: {}. Valid options: ollama, openai, anthropic, gemini, xai, groq",
            s
        )
    })
}
