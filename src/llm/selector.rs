use crate::config::HealboxConfig;
use crate::llm::{GenAIClient, LLMClient};
use anyhow::Result;
use genai::adapter::AdapterKind;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const DEFAULT_OLLAMA_MODEL: &str = "qwen2.5-coder:7b";

pub struct SelectedClient {
    pub client: Arc<dyn LLMClient>,
    pub provider: AdapterKind,
    pub description: String,
}

/// Picks the generation backend.
///
/// An explicitly requested provider is used as-is (and fails loudly when its
/// credentials are missing). Otherwise the configured provider is tried, then a
/// local Ollama instance.
pub async fn select_llm_client(
    config: &HealboxConfig,
    forced: Option<AdapterKind>,
) -> Result<SelectedClient> {
    if let Some(provider) = forced {
        if !provider_has_credentials(provider) {
            anyhow::bail!(
                "No credentials for {}. Set {}",
                provider,
                provider.default_key_env_name().unwrap_or("the provider API key")
            );
        }
        let model = if provider == config.provider {
            config.model.clone()
        } else if provider == AdapterKind::Ollama {
            DEFAULT_OLLAMA_MODEL.to_string()
        } else {
            config.model.clone()
        };
        return build_client(provider, model, config.request_timeout_secs)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to initialize {}: {}", provider, e));
    }

    if let Some(selected) = try_configured_provider(config).await {
        return Ok(selected);
    }

    if let Some(selected) = try_ollama(config).await {
        return Ok(selected);
    }

    Err(anyhow::anyhow!(
        "No generation backend available. Please either:\n\
         - Set an API key (ANTHROPIC_API_KEY, OPENAI_API_KEY, GROQ_API_KEY, etc.) and HEALBOX_PROVIDER\n\
         - Start Ollama locally (ollama serve)"
    ))
}

async fn build_client(
    provider: AdapterKind,
    model: String,
    timeout_secs: u64,
) -> Result<SelectedClient, crate::llm::BackendError> {
    let client = GenAIClient::new(provider, model.clone(), Duration::from_secs(timeout_secs)).await?;
    Ok(SelectedClient {
        client: Arc::new(client),
        provider,
        description: format!("{} ({})", provider, model),
    })
}

async fn try_configured_provider(config: &HealboxConfig) -> Option<SelectedClient> {
    let provider = config.provider;

    if provider == AdapterKind::Ollama {
        debug!("Skipping Ollama in configured provider check - will check availability separately");
        return None;
    }

    if !provider_has_credentials(provider) {
        debug!("Skipping {} - no credentials available", provider);
        return None;
    }

    match build_client(provider, config.model.clone(), config.request_timeout_secs).await {
        Ok(selected) => {
            info!("Using configured provider: {} ({})", provider, config.model);
            Some(selected)
        }
        Err(e) => {
            warn!("Failed to initialize {}: {}", provider, e);
            None
        }
    }
}

async fn try_ollama(config: &HealboxConfig) -> Option<SelectedClient> {
    if !is_ollama_available().await {
        debug!("Ollama not available");
        return None;
    }

    let model = if config.provider == AdapterKind::Ollama {
        config.model.clone()
    } else {
        DEFAULT_OLLAMA_MODEL.to_string()
    };

    match build_client(AdapterKind::Ollama, model.clone(), config.request_timeout_secs).await {
        Ok(selected) => {
            info!("Using Ollama with model: {}", model);
            Some(selected)
        }
        Err(e) => {
            warn!("Failed to initialize Ollama: {}", e);
            None
        }
    }
}

fn provider_has_credentials(provider: AdapterKind) -> bool {
    match provider.default_key_env_name() {
        None => true,
        Some(env_var) => std::env::var(env_var).is_ok(),
    }
}

/// Check if Ollama is answering on `OLLAMA_HOST` (default localhost:11434)
pub async fn is_ollama_available() -> bool {
    let base_url =
        std::env::var("OLLAMA_HOST").unwrap_or_else(|_| "http://localhost:11434".to_string());

    let url = format!("{}/api/tags", base_url);

    match reqwest::Client::new()
        .get(&url)
        .timeout(Duration::from_secs(2))
        .send()
        .await
    {
        Ok(resp) => {
            let available = resp.status().is_success();
            debug!("Ollama availability check: {}", available);
            available
        }
        Err(e) => {
            debug!("Ollama not available: {}", e);
            false
        }
    }
}
