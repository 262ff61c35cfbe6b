//! Multi-stage build definitions
//!
//! A [`BuildDefinition`] is a value: each attempt produces a fresh one, and
//! nothing mutates it after parsing. It renders to Dockerfile syntax for the
//! engine and hashes to a stable digest for attempt comparison.

mod image_ref;
mod parser;
mod rules;

pub use image_ref::ImageRef;
pub use parser::{clean_backend_output, parse_definition, DefinitionError};
pub use rules::{
    AllowedRuntimeBaseRule, DefinitionConstraints, DefinitionRule, DefinitionValidator,
    MinimumStagesRule, NonEmptyStagesRule, RuntimeArtifactsRule,
};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// One instruction, e.g. `RUN npm ci`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    /// Uppercase keyword
    pub keyword: String,
    pub args: String,
}

impl Instruction {
    pub fn new(keyword: impl Into<String>, args: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into().to_uppercase(),
            args: args.into(),
        }
    }

    /// `COPY --from=<stage> <src...> <dest>` as an artifact declaration
    pub fn as_artifact(&self) -> Option<ArtifactCopy> {
        if self.keyword != "COPY" {
            return None;
        }

        let mut from_stage = None;
        let mut paths = Vec::new();
        for token in self.args.split_whitespace() {
            if let Some(stage) = token.strip_prefix("--from=") {
                from_stage = Some(stage.to_string());
            } else if !token.starts_with("--") {
                paths.push(token);
            }
        }

        let from_stage = from_stage?;
        let (dest, sources) = paths.split_last()?;
        if sources.is_empty() {
            return None;
        }

        Some(ArtifactCopy {
            from_stage,
            source: sources.join(" "),
            dest: dest.to_string(),
        })
    }
}

/// Files carried from an earlier stage into a later one
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactCopy {
    pub from_stage: String,
    pub source: String,
    pub dest: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    pub name: Option<String>,
    /// Base image reference as written, or the name of an earlier stage
    pub base: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    pub instructions: Vec<Instruction>,
}

impl Stage {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            name: None,
            base: base.into(),
            platform: None,
            instructions: Vec::new(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with(mut self, keyword: &str, args: &str) -> Self {
        self.instructions.push(Instruction::new(keyword, args));
        self
    }

    pub fn artifacts(&self) -> Vec<ArtifactCopy> {
        self.instructions
            .iter()
            .filter_map(Instruction::as_artifact)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildDefinition {
    /// `ARG` lines before the first `FROM`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub global_args: Vec<String>,
    pub stages: Vec<Stage>,
}

impl BuildDefinition {
    pub fn new(stages: Vec<Stage>) -> Self {
        Self {
            global_args: Vec::new(),
            stages,
        }
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    pub fn final_stage(&self) -> Option<&Stage> {
        self.stages.last()
    }

    /// Base image of a stage after following references to earlier stages
    pub fn resolved_base(&self, index: usize) -> Option<&str> {
        let mut idx = index;
        loop {
            let stage = self.stages.get(idx)?;
            match self.stages[..idx]
                .iter()
                .rposition(|s| s.name.as_deref() == Some(stage.base.as_str()))
            {
                Some(parent) => idx = parent,
                None => return Some(stage.base.as_str()),
            }
        }
    }

    /// Base image the final image runs on
    pub fn runtime_base(&self) -> Option<&str> {
        self.stages
            .len()
            .checked_sub(1)
            .and_then(|last| self.resolved_base(last))
    }

    pub fn to_dockerfile(&self) -> String {
        let mut out = String::new();
        for arg in &self.global_args {
            out.push_str("ARG ");
            out.push_str(arg);
            out.push('\n');
        }
        if !self.global_args.is_empty() {
            out.push('\n');
        }

        for (i, stage) in self.stages.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            out.push_str("FROM ");
            if let Some(platform) = &stage.platform {
                out.push_str(&format!("--platform={} ", platform));
            }
            out.push_str(&stage.base);
            if let Some(name) = &stage.name {
                out.push_str(" AS ");
                out.push_str(name);
            }
            out.push('\n');
            for instruction in &stage.instructions {
                out.push_str(&instruction.keyword);
                out.push(' ');
                out.push_str(&instruction.args);
                out.push('\n');
            }
        }
        out
    }

    /// Hex SHA-256 of the rendered Dockerfile
    pub fn digest(&self) -> String {
        hex::encode(Sha256::digest(self.to_dockerfile().as_bytes()))
    }
}

impl fmt::Display for BuildDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_dockerfile())
    }
}
