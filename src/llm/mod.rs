//! Generation backend abstraction
//!
//! The architect talks to a text-completion service through the [`LLMClient`]
//! trait. Concrete backends are the `genai`-based multi-provider client and an
//! in-memory mock used by tests.

mod client;
mod error;
mod genai;
mod mock;
mod selector;
mod types;

pub use client::LLMClient;
pub use error::BackendError;
pub use genai::GenAIClient;
pub use mock::{MockLLMClient, MockResponse};
pub use selector::{is_ollama_available, select_llm_client, SelectedClient};
pub use types::{ChatMessage, LLMRequest, LLMResponse, MessageRole};
