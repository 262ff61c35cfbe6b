use super::{BuildDefinition, Instruction, Stage};
use regex::Regex;
use thiserror::Error;
use tracing::debug;

const KEYWORDS: &[&str] = &[
    "FROM",
    "RUN",
    "CMD",
    "LABEL",
    "MAINTAINER",
    "EXPOSE",
    "ENV",
    "ADD",
    "COPY",
    "ENTRYPOINT",
    "VOLUME",
    "USER",
    "WORKDIR",
    "ARG",
    "ONBUILD",
    "STOPSIGNAL",
    "HEALTHCHECK",
    "SHELL",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DefinitionError {
    #[error("Definition is empty")]
    Empty,

    #[error("Definition has no FROM instruction")]
    MissingFrom,

    #[error("Line {line}: {keyword} appears before the first FROM")]
    InstructionBeforeFrom { line: usize, keyword: String },

    #[error("Line {line}: unknown instruction '{keyword}'")]
    UnknownInstruction { line: usize, keyword: String },

    #[error("Line {line}: {keyword} requires arguments")]
    MissingArguments { line: usize, keyword: String },

    #[error("Line {line}: malformed FROM: {detail}")]
    MalformedFrom { line: usize, detail: String },

    #[error("Duplicate stage name '{0}'")]
    DuplicateStageName(String),

    #[error("COPY --from={reference} does not refer to an earlier stage")]
    InvalidStageReference { reference: String },
}

fn keyword_of(line: &str) -> Option<String> {
    let word = line.split_whitespace().next()?;
    let upper = word.to_uppercase();
    KEYWORDS.contains(&upper.as_str()).then_some(upper)
}

fn starts_definition(line: &str) -> bool {
    matches!(keyword_of(line.trim()).as_deref(), Some("FROM") | Some("ARG"))
}

/// Strips markdown fences and surrounding prose from backend output
///
/// Only the outer noise is removed. Anything unexpected between the first
/// `FROM`/`ARG` and the last instruction is left for [`parse_definition`] to reject.
pub fn clean_backend_output(text: &str) -> String {
    let body = extract_fenced_block(text).unwrap_or_else(|| text.to_string());
    let lines: Vec<&str> = body.lines().collect();

    let Some(start) = lines.iter().position(|l| starts_definition(l)) else {
        return String::new();
    };

    let mut end = start;
    let mut continuing = false;
    for (i, line) in lines.iter().enumerate().skip(start) {
        let trimmed = line.trim();
        if trimmed.starts_with('#') {
            continue;
        }
        if keyword_of(trimmed).is_some() || continuing {
            end = i;
            continuing = trimmed.ends_with('\\');
        }
    }

    lines[start..=end].join("\n")
}

fn extract_fenced_block(text: &str) -> Option<String> {
    let re = Regex::new(r"```[A-Za-z]*[ \t]*\r?\n([\s\S]*?)```").ok()?;
    let block = re
        .captures_iter(text)
        .filter_map(|cap| cap.get(1).map(|m| m.as_str().to_string()))
        .find(|block| block.lines().any(starts_definition));
    block
}

/// Joins continuation lines, dropping blanks and comments; yields (first line number, text)
fn logical_lines(text: &str) -> Vec<(usize, String)> {
    let mut result = Vec::new();
    let mut current: Option<(usize, String)> = None;

    for (i, raw) in text.lines().enumerate() {
        let line_no = i + 1;
        let trimmed = raw.trim();

        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let (content, continues) = match trimmed.strip_suffix('\\') {
            Some(stripped) => (stripped.trim_end(), true),
            None => (trimmed, false),
        };

        let entry = current.get_or_insert_with(|| (line_no, String::new()));
        if !entry.1.is_empty() && !content.is_empty() {
            entry.1.push(' ');
        }
        entry.1.push_str(content);

        if !continues {
            if let Some(done) = current.take() {
                result.push(done);
            }
        }
    }

    if let Some(rest) = current {
        result.push(rest);
    }
    result
}

fn parse_from(line: usize, args: &str) -> Result<Stage, DefinitionError> {
    let mut platform = None;
    let mut rest = Vec::new();

    for token in args.split_whitespace() {
        if let Some(value) = token.strip_prefix("--platform=") {
            platform = Some(value.to_string());
        } else if token.starts_with("--") {
            return Err(DefinitionError::MalformedFrom {
                line,
                detail: format!("unsupported flag {}", token),
            });
        } else {
            rest.push(token);
        }
    }

    let (base, name) = match rest.as_slice() {
        [base] => (*base, None),
        [base, as_kw, name] if as_kw.eq_ignore_ascii_case("as") => (*base, Some(name.to_string())),
        [] => {
            return Err(DefinitionError::MalformedFrom {
                line,
                detail: "missing image".to_string(),
            })
        }
        _ => {
            return Err(DefinitionError::MalformedFrom {
                line,
                detail: format!("unexpected tokens in '{}'", args),
            })
        }
    };

    Ok(Stage {
        name,
        base: base.to_string(),
        platform,
        instructions: Vec::new(),
    })
}

/// Parses backend text into a definition, rejecting anything that is not
/// well-formed Dockerfile syntax
pub fn parse_definition(text: &str) -> Result<BuildDefinition, DefinitionError> {
    let cleaned = clean_backend_output(text);
    if cleaned.trim().is_empty() {
        return Err(if text.trim().is_empty() {
            DefinitionError::Empty
        } else {
            DefinitionError::MissingFrom
        });
    }

    let mut definition = BuildDefinition::new(Vec::new());

    for (line, content) in logical_lines(&cleaned) {
        let (word, args) = match content.split_once(char::is_whitespace) {
            Some((w, a)) => (w, a.trim()),
            None => (content.as_str(), ""),
        };
        let keyword = word.to_uppercase();

        if !KEYWORDS.contains(&keyword.as_str()) {
            return Err(DefinitionError::UnknownInstruction {
                line,
                keyword: word.to_string(),
            });
        }
        if args.is_empty() {
            return Err(DefinitionError::MissingArguments { line, keyword });
        }

        match keyword.as_str() {
            "FROM" => {
                let stage = parse_from(line, args)?;
                if let Some(name) = &stage.name {
                    let duplicate = definition.stages.iter().any(|s| {
                        s.name
                            .as_deref()
                            .map(|n| n.eq_ignore_ascii_case(name))
                            .unwrap_or(false)
                    });
                    if duplicate {
                        return Err(DefinitionError::DuplicateStageName(name.clone()));
                    }
                }
                definition.stages.push(stage);
            }
            "ARG" if definition.stages.is_empty() => {
                definition.global_args.push(args.to_string());
            }
            _ => match definition.stages.last_mut() {
                Some(stage) => stage.instructions.push(Instruction::new(keyword, args)),
                None => return Err(DefinitionError::InstructionBeforeFrom { line, keyword }),
            },
        }
    }

    if definition.stages.is_empty() {
        return Err(DefinitionError::MissingFrom);
    }

    check_stage_references(&definition)?;

    debug!(
        stages = definition.stages.len(),
        digest = %definition.digest(),
        "Parsed build definition"
    );

    Ok(definition)
}

// Numeric references must point backwards; names of the current or later
// stages are forward references. Other names are external images.
fn check_stage_references(definition: &BuildDefinition) -> Result<(), DefinitionError> {
    for (index, stage) in definition.stages.iter().enumerate() {
        for artifact in stage.artifacts() {
            let reference = artifact.from_stage.as_str();
            let invalid = match reference.parse::<usize>() {
                Ok(n) => n >= index,
                Err(_) => definition.stages[index..].iter().any(|s| {
                    s.name
                        .as_deref()
                        .map(|n| n.eq_ignore_ascii_case(reference))
                        .unwrap_or(false)
                }),
            };
            if invalid {
                return Err(DefinitionError::InvalidStageReference {
                    reference: reference.to_string(),
                });
            }
        }
    }
    Ok(())
}
