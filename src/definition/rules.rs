use super::{BuildDefinition, ImageRef};
use anyhow::Result;

/// Inputs the hard constraints depend on
#[derive(Debug, Clone)]
pub struct DefinitionConstraints {
    pub allowed_base_families: Vec<String>,
    /// A single runtime stage is acceptable
    pub precompiled: bool,
}

impl DefinitionConstraints {
    pub fn allows_base(&self, reference: &str) -> bool {
        ImageRef::parse(reference)
            .map(|image| {
                self.allowed_base_families
                    .iter()
                    .any(|family| image.belongs_to_family(family))
            })
            .unwrap_or(false)
    }
}

pub trait DefinitionRule: Send + Sync {
    fn name(&self) -> &'static str;
    fn validate(&self, definition: &BuildDefinition, constraints: &DefinitionConstraints) -> Result<()>;
}

pub struct NonEmptyStagesRule;

impl DefinitionRule for NonEmptyStagesRule {
    fn name(&self) -> &'static str {
        "NonEmptyStages"
    }

    fn validate(&self, definition: &BuildDefinition, _constraints: &DefinitionConstraints) -> Result<()> {
        if definition.stages.is_empty() {
            anyhow::bail!("Definition declares no stages");
        }
        for (i, stage) in definition.stages.iter().enumerate() {
            if stage.base.trim().is_empty() {
                anyhow::bail!("Stage {} has no base image", i + 1);
            }
        }
        Ok(())
    }
}

pub struct MinimumStagesRule;

impl DefinitionRule for MinimumStagesRule {
    fn name(&self) -> &'static str {
        "MinimumStages"
    }

    fn validate(&self, definition: &BuildDefinition, constraints: &DefinitionConstraints) -> Result<()> {
        if !constraints.precompiled && definition.stage_count() < 2 {
            anyhow::bail!(
                "Definition must separate build and runtime stages, found {} stage(s)",
                definition.stage_count()
            );
        }
        Ok(())
    }
}

pub struct AllowedRuntimeBaseRule;

impl DefinitionRule for AllowedRuntimeBaseRule {
    fn name(&self) -> &'static str {
        "AllowedRuntimeBase"
    }

    fn validate(&self, definition: &BuildDefinition, constraints: &DefinitionConstraints) -> Result<()> {
        let Some(base) = definition.runtime_base() else {
            anyhow::bail!("Definition has no runtime stage");
        };
        if !constraints.allows_base(base) {
            anyhow::bail!(
                "Runtime base image '{}' is not in the allowed families: {}",
                base,
                constraints.allowed_base_families.join(", ")
            );
        }
        Ok(())
    }
}

/// The runtime stage of a multi-stage definition must carry something forward
pub struct RuntimeArtifactsRule;

impl DefinitionRule for RuntimeArtifactsRule {
    fn name(&self) -> &'static str {
        "RuntimeArtifacts"
    }

    fn validate(&self, definition: &BuildDefinition, _constraints: &DefinitionConstraints) -> Result<()> {
        if definition.stage_count() < 2 {
            return Ok(());
        }
        let last = definition.stage_count() - 1;
        let earlier: Vec<String> = definition.stages[..last]
            .iter()
            .enumerate()
            .flat_map(|(i, s)| {
                let mut ids = vec![i.to_string()];
                if let Some(name) = &s.name {
                    ids.push(name.to_lowercase());
                }
                ids
            })
            .collect();

        let runtime = &definition.stages[last];
        let inherits_stage = earlier.contains(&runtime.base.to_lowercase());
        let copies_forward = runtime
            .artifacts()
            .iter()
            .any(|a| earlier.contains(&a.from_stage.to_lowercase()));

        if !inherits_stage && !copies_forward {
            anyhow::bail!("Runtime stage copies no artifacts from earlier stages");
        }
        Ok(())
    }
}

/// Runs the hard constraints in order; the first failure wins
pub struct DefinitionValidator {
    rules: Vec<Box<dyn DefinitionRule>>,
}

impl DefinitionValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rules(rules: Vec<Box<dyn DefinitionRule>>) -> Self {
        Self { rules }
    }

    pub fn validate(&self, definition: &BuildDefinition, constraints: &DefinitionConstraints) -> Result<()> {
        for rule in &self.rules {
            if let Err(e) = rule.validate(definition, constraints) {
                anyhow::bail!("[{}] {}", rule.name(), e);
            }
        }
        Ok(())
    }
}

impl Default for DefinitionValidator {
    fn default() -> Self {
        Self {
            rules: vec![
                Box::new(NonEmptyStagesRule),
                Box::new(MinimumStagesRule),
                Box::new(AllowedRuntimeBaseRule),
                Box::new(RuntimeArtifactsRule),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::parse_definition;

    fn constraints(precompiled: bool) -> DefinitionConstraints {
        DefinitionConstraints {
            allowed_base_families: vec![
                "alpine".to_string(),
                "gcr.io/distroless".to_string(),
            ],
            precompiled,
        }
    }

    #[test]
    fn test_valid_two_stage_passes() {
        let definition = parse_definition(
            "FROM node:20 AS build\nRUN npm ci\nFROM node:20-alpine\nCOPY --from=build /app /app\nCMD [\"node\", \"/app/server.js\"]\n",
        )
        .unwrap();
        assert!(DefinitionValidator::new()
            .validate(&definition, &constraints(false))
            .is_ok());
    }

    #[test]
    fn test_single_stage_rejected_unless_precompiled() {
        let definition = parse_definition("FROM alpine:3.20\nCOPY index.html /srv/\n").unwrap();
        let err = DefinitionValidator::new()
            .validate(&definition, &constraints(false))
            .unwrap_err();
        assert!(err.to_string().starts_with("[MinimumStages]"));

        assert!(DefinitionValidator::new()
            .validate(&definition, &constraints(true))
            .is_ok());
    }

    #[test]
    fn test_disallowed_runtime_base() {
        let definition = parse_definition(
            "FROM golang:1.22 AS build\nRUN go build\nFROM ubuntu:22.04\nCOPY --from=build /app /app\n",
        )
        .unwrap();
        let err = DefinitionValidator::new()
            .validate(&definition, &constraints(false))
            .unwrap_err();
        assert!(err.to_string().contains("[AllowedRuntimeBase]"));
        assert!(err.to_string().contains("ubuntu:22.04"));
    }

    #[test]
    fn test_lookalike_runtime_bases_rejected() {
        for base in [
            "attacker/alpine:latest",
            "evil.example.com/team/alpine",
            "ubuntu:22.04-alpinefake",
        ] {
            let definition = parse_definition(&format!(
                "FROM golang:1.22 AS build\nRUN go build\nFROM {}\nCOPY --from=build /app /app\n",
                base
            ))
            .unwrap();
            let err = DefinitionValidator::new()
                .validate(&definition, &constraints(false))
                .unwrap_err();
            assert!(err.to_string().contains("[AllowedRuntimeBase]"), "{base} accepted");
        }
    }

    #[test]
    fn test_build_stage_base_not_restricted() {
        let definition = parse_definition(
            "FROM ubuntu:22.04 AS build\nRUN make\nFROM gcr.io/distroless/cc\nCOPY --from=0 /out/app /app\n",
        )
        .unwrap();
        assert!(DefinitionValidator::new()
            .validate(&definition, &constraints(false))
            .is_ok());
    }

    #[test]
    fn test_runtime_stage_must_carry_artifacts() {
        let definition = parse_definition(
            "FROM node:20 AS build\nRUN npm ci\nFROM node:20-alpine\nCOPY . /app\n",
        )
        .unwrap();
        let err = DefinitionValidator::new()
            .validate(&definition, &constraints(false))
            .unwrap_err();
        assert!(err.to_string().contains("[RuntimeArtifacts]"));
    }

    #[test]
    fn test_runtime_inheriting_allowed_stage() {
        let definition = parse_definition(
            "FROM alpine:3.20 AS base\nRUN apk add ca-certificates\nFROM base\nCMD [\"sh\"]\n",
        )
        .unwrap();
        assert!(DefinitionValidator::new()
            .validate(&definition, &constraints(false))
            .is_ok());
    }
}
