#![allow(dead_code)]

pub mod fake_engine;

pub use fake_engine::{
    BuildScript, ContainerBehavior, EngineCall, FakeEngine, ALPINE, ALPINE_LAYER, DISTROLESS,
    DISTROLESS_LAYER,
};

use async_trait::async_trait;
use healbox::architect::{DefinitionArchitect, GenerationError};
use healbox::definition::{BuildDefinition, Stage};
use healbox::heal::{AttemptRecord, HealPolicy};
use healbox::intent::ProjectIntent;
use healbox::workspace::{FileListing, ListedFile};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

/// Two-stage node definition with an allow-listed runtime base
pub fn node_definition() -> BuildDefinition {
    BuildDefinition::new(vec![
        Stage::new("node:20-alpine")
            .named("build")
            .with("WORKDIR", "/app")
            .with("COPY", ". .")
            .with("RUN", "npm ci --omit=dev"),
        Stage::new("alpine:3.20")
            .with("RUN", "apk add --no-cache nodejs")
            .with("COPY", "--from=build /app /app")
            .with("EXPOSE", "3000")
            .with("CMD", "[\"node\", \"/app/server.js\"]"),
    ])
}

pub const NODE_DOCKERFILE: &str = "FROM node:20-alpine AS build\nWORKDIR /app\nCOPY . .\nRUN npm ci --omit=dev\n\nFROM alpine:3.20\nRUN apk add --no-cache nodejs\nCOPY --from=build /app /app\nEXPOSE 3000\nCMD [\"node\", \"/app/server.js\"]\n";

pub fn node_listing() -> FileListing {
    FileListing::new(vec![
        ListedFile::new(
            "package.json",
            Some(r#"{"name":"api","main":"server.js","scripts":{"start":"node server.js"}}"#),
        ),
        ListedFile::new(
            "server.js",
            Some("const http = require('http');\nhttp.createServer((req, res) => res.end('ok')).listen(3000);\n"),
        ),
    ])
}

/// Short windows so tests finish quickly
pub fn fast_policy(max_attempts: u32) -> HealPolicy {
    HealPolicy {
        max_attempts,
        generation_timeout: Duration::from_secs(2),
        build_timeout: Duration::from_secs(2),
        observation_window: Duration::from_millis(100),
        max_evidence_chars: 4000,
        engine_call_timeout: Duration::from_millis(500),
        ..HealPolicy::default()
    }
}

/// Architect that replays scripted answers and records every history it was shown
pub struct ScriptedArchitect {
    answers: Mutex<VecDeque<Result<BuildDefinition, GenerationError>>>,
    fallback: Option<BuildDefinition>,
    delay: Option<Duration>,
    histories: Mutex<Vec<Vec<AttemptRecord>>>,
}

impl ScriptedArchitect {
    /// Always proposes `definition`
    pub fn always(definition: BuildDefinition) -> Self {
        Self {
            answers: Mutex::new(VecDeque::new()),
            fallback: Some(definition),
            delay: None,
            histories: Mutex::new(Vec::new()),
        }
    }

    /// Replays `answers`, then fails with a backend error
    pub fn sequence(answers: Vec<Result<BuildDefinition, GenerationError>>) -> Self {
        Self {
            answers: Mutex::new(answers.into()),
            fallback: None,
            delay: None,
            histories: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.histories.lock().unwrap().len()
    }

    pub fn histories(&self) -> Vec<Vec<AttemptRecord>> {
        self.histories.lock().unwrap().clone()
    }
}

#[async_trait]
impl DefinitionArchitect for ScriptedArchitect {
    async fn propose(
        &self,
        _intent: &ProjectIntent,
        history: &[AttemptRecord],
    ) -> Result<BuildDefinition, GenerationError> {
        self.histories.lock().unwrap().push(history.to_vec());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.answers.lock().unwrap().pop_front();
        match next {
            Some(answer) => answer,
            None => match &self.fallback {
                Some(definition) => Ok(definition.clone()),
                None => Err(GenerationError::PolicyViolation(
                    "script exhausted".to_string(),
                )),
            },
        }
    }
}
