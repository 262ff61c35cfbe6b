use super::prompt::PromptContext;
use super::{DefinitionArchitect, GenerationError};
use crate::definition::{parse_definition, BuildDefinition, DefinitionValidator};
use crate::heal::{AttemptRecord, HealPolicy};
use crate::intent::ProjectIntent;
use crate::llm::{BackendError, LLMClient, LLMRequest, LLMResponse};
use crate::workspace::FileListing;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const TEMPERATURE: f32 = 0.2;
const MAX_TOKENS: u32 = 2048;
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(2);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Architect backed by a text-completion service
pub struct LlmArchitect {
    client: Arc<dyn LLMClient>,
    listing: Arc<FileListing>,
    policy: HealPolicy,
    validator: DefinitionValidator,
    max_retries: u32,
    backoff_base: Duration,
}

impl LlmArchitect {
    pub fn new(client: Arc<dyn LLMClient>, listing: Arc<FileListing>, policy: HealPolicy) -> Self {
        Self {
            client,
            listing,
            policy,
            validator: DefinitionValidator::new(),
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base: DEFAULT_BACKOFF_BASE,
        }
    }

    /// Retries rate limits, timeouts and network errors up to `max_retries` times
    ///
    /// Waits `backoff_base * 2^(n-1)` before retry `n`, or the backend's
    /// `retry_after` when it names one, capped at one minute. The heal loop's
    /// generation timeout still bounds the whole exchange.
    pub fn with_retry(mut self, max_retries: u32, backoff_base: Duration) -> Self {
        self.max_retries = max_retries;
        self.backoff_base = backoff_base;
        self
    }

    fn backoff(&self, retry: u32, error: &BackendError) -> Duration {
        let delay = match error {
            BackendError::RateLimitError {
                retry_after: Some(seconds),
            } => Duration::from_secs(*seconds),
            _ => self
                .backoff_base
                .saturating_mul(2u32.saturating_pow(retry.saturating_sub(1))),
        };
        delay.min(MAX_BACKOFF)
    }

    async fn chat_with_retry(&self, request: LLMRequest) -> Result<LLMResponse, BackendError> {
        let mut retry = 0;
        loop {
            match self.client.chat(request.clone()).await {
                Err(e) if e.is_transient() && retry < self.max_retries => {
                    retry += 1;
                    let delay = self.backoff(retry, &e);
                    warn!(
                        backend = self.client.name(),
                        error = %e,
                        retry,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "Transient backend error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                result => return result,
            }
        }
    }

    pub fn with_validator(mut self, validator: DefinitionValidator) -> Self {
        self.validator = validator;
        self
    }
}

#[async_trait]
impl DefinitionArchitect for LlmArchitect {
    async fn propose(
        &self,
        intent: &ProjectIntent,
        history: &[AttemptRecord],
    ) -> Result<BuildDefinition, GenerationError> {
        let prompt = PromptContext::new(
            &self.listing,
            &self.policy.allowed_base_families,
            self.policy.max_evidence_chars,
        );
        let request = LLMRequest::new(prompt.messages(intent, history))
            .with_temperature(TEMPERATURE)
            .with_max_tokens(MAX_TOKENS);

        debug!(
            backend = self.client.name(),
            history = history.len(),
            "Requesting build definition"
        );
        let response = self.chat_with_retry(request).await?;
        info!(
            backend = self.client.name(),
            response_ms = response.response_time.as_millis() as u64,
            "Backend responded"
        );

        let definition = parse_definition(&response.content).map_err(|e| {
            warn!(error = %e, "Rejected backend output");
            e
        })?;

        self.validator
            .validate(&definition, &self.policy.constraints(intent))
            .map_err(|e| GenerationError::PolicyViolation(e.to_string()))?;

        Ok(definition)
    }

    fn name(&self) -> &str {
        self.client.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{BackendError, MockLLMClient, MockResponse};
    use crate::workspace::ListedFile;

    const GOOD: &str = "```dockerfile\nFROM node:20-alpine AS build\nWORKDIR /app\nCOPY . .\nRUN npm ci\n\nFROM gcr.io/distroless/nodejs20-debian12\nCOPY --from=build /app /app\nCMD [\"/app/server.js\"]\n```";

    fn architect(mock: Arc<MockLLMClient>) -> LlmArchitect {
        let listing = FileListing::new(vec![
            ListedFile::new("package.json", Some("{}")),
            ListedFile::new("server.js", Some("")),
        ]);
        LlmArchitect::new(mock, Arc::new(listing), HealPolicy::default())
    }

    fn intent() -> ProjectIntent {
        ProjectIntent::new("node").with_entry_point("server.js")
    }

    #[tokio::test]
    async fn test_propose_parses_fenced_output() {
        let mock = Arc::new(MockLLMClient::new());
        mock.add_response(MockResponse::text(GOOD));

        let definition = architect(mock.clone()).propose(&intent(), &[]).await.unwrap();
        assert_eq!(definition.stage_count(), 2);
        assert_eq!(definition.runtime_base(), Some("gcr.io/distroless/nodejs20-debian12"));

        let requests = mock.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].temperature, Some(TEMPERATURE));
    }

    #[tokio::test]
    async fn test_single_stage_is_a_policy_violation() {
        let mock = Arc::new(MockLLMClient::new());
        mock.add_response(MockResponse::text("FROM node:20-alpine\nCOPY . .\nCMD [\"node\", \"server.js\"]"));

        let err = architect(mock).propose(&intent(), &[]).await.unwrap_err();
        assert!(matches!(err, GenerationError::PolicyViolation(ref m) if m.contains("MinimumStages")));
    }

    #[tokio::test]
    async fn test_disallowed_runtime_base_is_rejected() {
        let mock = Arc::new(MockLLMClient::new());
        mock.add_response(MockResponse::text(
            "FROM node:20 AS build\nRUN npm ci\nFROM ubuntu:22.04\nCOPY --from=build /app /app",
        ));

        let err = architect(mock).propose(&intent(), &[]).await.unwrap_err();
        assert!(matches!(err, GenerationError::PolicyViolation(ref m) if m.contains("AllowedRuntimeBase")));
    }

    #[tokio::test]
    async fn test_prose_is_unparsable() {
        let mock = Arc::new(MockLLMClient::new());
        mock.add_response(MockResponse::text("I cannot help with that."));

        let err = architect(mock).propose(&intent(), &[]).await.unwrap_err();
        assert!(matches!(err, GenerationError::Unparsable(_)));
    }

    #[tokio::test]
    async fn test_backend_error_is_propagated() {
        let mock = Arc::new(MockLLMClient::new());
        mock.add_response(MockResponse::error(BackendError::ConfigurationError {
            message: "missing API key".to_string(),
        }));

        let err = architect(mock.clone()).propose(&intent(), &[]).await.unwrap_err();
        assert!(matches!(err, GenerationError::Backend(_)));
        assert_eq!(mock.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_rate_limit_is_retried() {
        let mock = Arc::new(MockLLMClient::new());
        mock.add_response(MockResponse::error(BackendError::RateLimitError {
            retry_after: Some(0),
        }));
        mock.add_response(MockResponse::text(GOOD));

        let definition = architect(mock.clone()).propose(&intent(), &[]).await.unwrap();

        assert_eq!(definition.stage_count(), 2);
        assert_eq!(mock.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_transient_errors_stop_after_retry_budget() {
        let mock = Arc::new(MockLLMClient::new());
        for _ in 0..4 {
            mock.add_response(MockResponse::error(BackendError::TimeoutError { seconds: 5 }));
        }
        mock.add_response(MockResponse::text(GOOD));

        let err = architect(mock.clone())
            .with_retry(2, Duration::from_millis(1))
            .propose(&intent(), &[])
            .await
            .unwrap_err();

        assert!(matches!(err, GenerationError::Backend(BackendError::TimeoutError { .. })));
        assert_eq!(mock.requests().len(), 3);
    }

    #[test]
    fn test_backoff_doubles_and_honors_retry_after() {
        let arch = architect(Arc::new(MockLLMClient::new()))
            .with_retry(3, Duration::from_millis(100));
        let network = BackendError::NetworkError {
            message: "reset".to_string(),
        };
        assert_eq!(arch.backoff(1, &network), Duration::from_millis(100));
        assert_eq!(arch.backoff(3, &network), Duration::from_millis(400));

        let limited = BackendError::RateLimitError {
            retry_after: Some(7),
        };
        assert_eq!(arch.backoff(1, &limited), Duration::from_secs(7));
        let long = BackendError::RateLimitError {
            retry_after: Some(3600),
        };
        assert_eq!(arch.backoff(1, &long), MAX_BACKOFF);
    }
}
