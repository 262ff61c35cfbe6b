//! Configuration management for healbox
//!
//! Settings are loaded from environment variables with sensible defaults and
//! can be overridden field by field from the command line.
//!
//! # Environment Variables
//!
//! - `HEALBOX_PROVIDER`: generation backend (ollama|openai|claude|gemini|grok|groq) - default: "ollama"
//! - `HEALBOX_MODEL`: model name - default: "qwen2.5-coder:7b" for Ollama
//! - `HEALBOX_REQUEST_TIMEOUT`: generation request timeout in seconds - default: "60"
//! - `HEALBOX_MAX_ATTEMPTS`: propose/build/validate attempts - default: "3"
//! - `HEALBOX_BUILD_TIMEOUT`: per-attempt build timeout in seconds - default: "600"
//! - `HEALBOX_OBSERVATION_WINDOW`: runtime observation window in seconds - default: "10"
//! - `HEALBOX_MAX_IMAGE_SIZE_MB`: maximum accepted image size - default: "1024"
//! - `HEALBOX_ALLOWED_BASES`: comma separated runtime base families - default:
//!   "alpine,gcr.io/distroless,cgr.dev/chainguard"
//! - `HEALBOX_MAX_EVIDENCE_CHARS`: failure evidence sent back to the backend - default: "4000"
//! - `HEALBOX_LOG_LEVEL`: logging level - default: "info"
//!
//! Provider credentials (`OPENAI_API_KEY`, `ANTHROPIC_API_KEY`, `OLLAMA_HOST`, ...)
//! are read directly by the genai library.

use crate::heal::HealPolicy;
use genai::adapter::AdapterKind;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_OLLAMA_MODEL: &str = "qwen2.5-coder:7b";
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_BUILD_TIMEOUT_SECS: u64 = 600;
const DEFAULT_OBSERVATION_WINDOW_SECS: u64 = 10;
const DEFAULT_MAX_IMAGE_SIZE_MB: u64 = 1024;
const DEFAULT_MAX_EVIDENCE_CHARS: usize = 4000;
const DEFAULT_ALLOWED_BASES: &[&str] = &["alpine", "gcr.io/distroless", "cgr.dev/chainguard"];

const MAX_ATTEMPTS_CEILING: u32 = 10;
const MIB: u64 = 1024 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid provider: {0}. Valid options: ollama, openai, claude, gemini, grok, groq")]
    InvalidProvider(String),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

#[derive(Debug, Clone)]
pub struct HealboxConfig {
    pub provider: AdapterKind,
    pub model: String,
    pub request_timeout_secs: u64,
    pub max_attempts: u32,
    pub build_timeout_secs: u64,
    pub observation_window_secs: u64,
    pub max_image_size_mb: u64,
    pub allowed_bases: Vec<String>,
    pub max_evidence_chars: usize,
    pub log_level: String,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

/// Maps user-facing provider names (including the genai adapter names) to an adapter
pub fn parse_provider(name: &str) -> Result<AdapterKind, ConfigError> {
    match name.trim().to_lowercase().as_str() {
        "ollama" => Ok(AdapterKind::Ollama),
        "openai" => Ok(AdapterKind::OpenAI),
        "claude" | "anthropic" => Ok(AdapterKind::Anthropic),
        "gemini" => Ok(AdapterKind::Gemini),
        "grok" | "xai" => Ok(AdapterKind::Xai),
        "groq" => Ok(AdapterKind::Groq),
        other => Err(ConfigError::InvalidProvider(other.to_string())),
    }
}

impl Default for HealboxConfig {
    fn default() -> Self {
        let provider = env::var("HEALBOX_PROVIDER")
            .ok()
            .and_then(|s| parse_provider(&s).ok())
            .unwrap_or(AdapterKind::Ollama);

        let model = env::var("HEALBOX_MODEL")
            .ok()
            .unwrap_or_else(|| match provider {
                AdapterKind::Ollama => DEFAULT_OLLAMA_MODEL.to_string(),
                _ => "default-model".to_string(),
            });

        let allowed_bases = env::var("HEALBOX_ALLOWED_BASES")
            .ok()
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|bases| !bases.is_empty())
            .unwrap_or_else(|| DEFAULT_ALLOWED_BASES.iter().map(|s| s.to_string()).collect());

        let log_level = env::var("HEALBOX_LOG_LEVEL")
            .unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string())
            .to_lowercase();

        Self {
            provider,
            model,
            request_timeout_secs: env_or("HEALBOX_REQUEST_TIMEOUT", DEFAULT_REQUEST_TIMEOUT_SECS),
            max_attempts: env_or("HEALBOX_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS),
            build_timeout_secs: env_or("HEALBOX_BUILD_TIMEOUT", DEFAULT_BUILD_TIMEOUT_SECS),
            observation_window_secs: env_or(
                "HEALBOX_OBSERVATION_WINDOW",
                DEFAULT_OBSERVATION_WINDOW_SECS,
            ),
            max_image_size_mb: env_or("HEALBOX_MAX_IMAGE_SIZE_MB", DEFAULT_MAX_IMAGE_SIZE_MB),
            allowed_bases,
            max_evidence_chars: env_or("HEALBOX_MAX_EVIDENCE_CHARS", DEFAULT_MAX_EVIDENCE_CHARS),
            log_level,
        }
    }
}

impl HealboxConfig {
    /// Validates numeric ranges and the log level
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout_secs == 0 || self.request_timeout_secs > 600 {
            return Err(ConfigError::ValidationFailed(
                "Request timeout must be between 1 second and 10 minutes".to_string(),
            ));
        }

        if self.max_attempts == 0 || self.max_attempts > MAX_ATTEMPTS_CEILING {
            return Err(ConfigError::ValidationFailed(format!(
                "Max attempts must be between 1 and {}",
                MAX_ATTEMPTS_CEILING
            )));
        }

        if self.build_timeout_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "Build timeout must be at least 1 second".to_string(),
            ));
        }

        if self.observation_window_secs == 0 || self.observation_window_secs > 300 {
            return Err(ConfigError::ValidationFailed(
                "Observation window must be between 1 second and 5 minutes".to_string(),
            ));
        }

        if self.max_image_size_mb == 0 {
            return Err(ConfigError::ValidationFailed(
                "Max image size must be at least 1 MB".to_string(),
            ));
        }

        if self.allowed_bases.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "At least one allowed base image family is required".to_string(),
            ));
        }

        if self.max_evidence_chars < 256 {
            return Err(ConfigError::ValidationFailed(
                "Max evidence size must be at least 256 characters".to_string(),
            ));
        }

        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(ConfigError::ValidationFailed(format!(
                    "Invalid log level: {}. Valid options: trace, debug, info, warn, error",
                    self.log_level
                )))
            }
        }

        Ok(())
    }

    /// Builds the loop policy from this configuration
    pub fn heal_policy(&self) -> HealPolicy {
        HealPolicy {
            max_attempts: self.max_attempts,
            generation_timeout: Duration::from_secs(self.request_timeout_secs),
            build_timeout: Duration::from_secs(self.build_timeout_secs),
            observation_window: Duration::from_secs(self.observation_window_secs),
            max_image_size: self.max_image_size_mb.saturating_mul(MIB),
            allowed_base_families: self.allowed_bases.clone(),
            max_evidence_chars: self.max_evidence_chars,
            ..HealPolicy::default()
        }
    }

    pub fn to_display_map(&self) -> std::collections::BTreeMap<String, String> {
        let mut map = std::collections::BTreeMap::new();

        map.insert("provider".to_string(), self.provider.as_str().to_string());
        map.insert("model".to_string(), self.model.clone());
        map.insert(
            "request_timeout_secs".to_string(),
            self.request_timeout_secs.to_string(),
        );
        map.insert("max_attempts".to_string(), self.max_attempts.to_string());
        map.insert(
            "build_timeout_secs".to_string(),
            self.build_timeout_secs.to_string(),
        );
        map.insert(
            "observation_window_secs".to_string(),
            self.observation_window_secs.to_string(),
        );
        map.insert(
            "max_image_size_mb".to_string(),
            self.max_image_size_mb.to_string(),
        );
        map.insert("allowed_bases".to_string(), self.allowed_bases.join(","));
        map.insert(
            "max_evidence_chars".to_string(),
            self.max_evidence_chars.to_string(),
        );
        map.insert("log_level".to_string(), self.log_level.clone());

        map
    }
}

impl fmt::Display for HealboxConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Healbox Configuration:")?;
        writeln!(f, "  Provider: {}", self.provider.as_str())?;
        writeln!(f, "  Model: {}", self.model)?;
        writeln!(f, "  Request Timeout: {}s", self.request_timeout_secs)?;
        writeln!(f, "  Max Attempts: {}", self.max_attempts)?;
        writeln!(f, "  Build Timeout: {}s", self.build_timeout_secs)?;
        writeln!(f, "  Observation Window: {}s", self.observation_window_secs)?;
        writeln!(f, "  Max Image Size: {} MB", self.max_image_size_mb)?;
        writeln!(f, "  Allowed Bases: {}", self.allowed_bases.join(", "))?;
        writeln!(f, "  Log Level: {}", self.log_level)?;
        Ok(())
    }
}
