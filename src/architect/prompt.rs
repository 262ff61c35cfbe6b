//! Prompt assembly for the generation backend

use crate::heal::{AttemptRecord, FailureKind};
use crate::intent::ProjectIntent;
use crate::llm::ChatMessage;
use crate::util::{head_chars, tail_chars};
use crate::workspace::FileListing;
use std::fmt::Write;

const MAX_LISTED_FILES: usize = 200;
const MAX_MANIFEST_CHARS: usize = 1000;

/// Files worth telling the backend about when they are missing, so it never COPYs them
const STANDARD_FILES: &[&str] = &[
    ".dockerignore",
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "requirements.txt",
    "poetry.lock",
    "go.sum",
    "Cargo.lock",
    "Gemfile.lock",
    "composer.lock",
];

pub const SYSTEM_PROMPT: &str = r#"You write production Dockerfiles.

Rules:
1. Use a multi-stage build: a build stage with the full toolchain, then a runtime stage that copies only the built artifacts with COPY --from=<stage>.
2. The runtime stage must start FROM an image in one of the allowed base families listed below. Build stages may use any official image.
3. Only COPY files that exist in the file list. Never reference a file listed as missing.
4. Install dependencies from the manifests before copying the rest of the source so layers cache well.
5. Run as a non-root user in the runtime stage when the base image allows it.
6. EXPOSE the listen port when one is known and end with CMD or ENTRYPOINT.

Reply with the Dockerfile only. No explanations, no markdown."#;

pub const BUILD_FIX_PROMPT: &str = r#"You fix Dockerfiles that fail to build.

You get the previous Dockerfile and the tail of the failing build log. Find the instruction that failed and change the Dockerfile so the build succeeds: a missing system package, a wrong path, a missing build tool in the build stage, a lock file that does not exist.
The runtime stage must still start FROM an allowed base family and the build must stay multi-stage.

Reply with the complete corrected Dockerfile only. No explanations, no markdown."#;

pub const RUNTIME_FIX_PROMPT: &str = r#"You fix Dockerfiles whose image builds but does not run.

You get the previous Dockerfile and what happened when a container was started from it: exit codes, crash loops, container logs, or a failed hardening check (image too large, base image not in the allowed families).
Typical causes: wrong entry point or working directory, artifacts not copied into the runtime stage, a shared library or runtime missing from the minimal base, the process exiting instead of serving.

Reply with the complete corrected Dockerfile only. No explanations, no markdown."#;

/// Everything the architect tells the backend about the project
pub struct PromptContext<'a> {
    listing: &'a FileListing,
    allowed_bases: &'a [String],
    max_evidence_chars: usize,
}

impl<'a> PromptContext<'a> {
    pub fn new(listing: &'a FileListing, allowed_bases: &'a [String], max_evidence_chars: usize) -> Self {
        Self {
            listing,
            allowed_bases,
            max_evidence_chars,
        }
    }

    /// Messages for the next proposal, initial or revision depending on `history`
    pub fn messages(&self, intent: &ProjectIntent, history: &[AttemptRecord]) -> Vec<ChatMessage> {
        match history.last() {
            None => self.initial_messages(intent),
            Some(latest) => self.revision_messages(intent, latest, history),
        }
    }

    pub fn initial_messages(&self, intent: &ProjectIntent) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(format!("{}\n\n{}", SYSTEM_PROMPT, self.base_rules())),
            ChatMessage::user(format!(
                "Write an optimized Dockerfile for this project.\n\n{}",
                self.project_section(intent)
            )),
        ]
    }

    pub fn revision_messages(
        &self,
        intent: &ProjectIntent,
        latest: &AttemptRecord,
        history: &[AttemptRecord],
    ) -> Vec<ChatMessage> {
        let system = match latest.outcome.failure_kind() {
            Some(FailureKind::Build) => BUILD_FIX_PROMPT,
            Some(FailureKind::Validation) => RUNTIME_FIX_PROMPT,
            Some(FailureKind::Generation) | None => SYSTEM_PROMPT,
        };

        let mut user = String::new();
        let _ = writeln!(user, "{}\n", self.project_section(intent));

        if let Some(previous) = history.iter().rev().find_map(|r| r.definition.as_ref()) {
            let _ = writeln!(user, "## Previous Dockerfile\n{}", previous.to_dockerfile());
        }

        let heading = match latest.outcome.failure_kind() {
            Some(FailureKind::Build) => "Build log (tail)",
            Some(FailureKind::Validation) => "Runtime check failure",
            _ => "Previous response was rejected",
        };
        let evidence = latest.outcome.evidence();
        let _ = writeln!(
            user,
            "## {} (attempt {})\n{}\n",
            heading,
            latest.attempt,
            tail_chars(&evidence, self.max_evidence_chars)
        );

        let _ = writeln!(user, "## Attempts so far");
        for record in history {
            let _ = writeln!(user, "- attempt {}: {}", record.attempt, record.outcome);
        }
        let _ = write!(user, "\nReturn a corrected Dockerfile that addresses this failure.");

        vec![
            ChatMessage::system(format!("{}\n\n{}", system, self.base_rules())),
            ChatMessage::user(user),
        ]
    }

    fn base_rules(&self) -> String {
        format!(
            "Allowed runtime base families: {}",
            self.allowed_bases.join(", ")
        )
    }

    /// Intent, file list, missing standard files and manifest excerpts
    pub fn project_section(&self, intent: &ProjectIntent) -> String {
        let mut out = String::new();

        let _ = writeln!(out, "## Project");
        let _ = writeln!(out, "Language: {}", intent.language);
        if let Some(pm) = &intent.package_manager {
            let _ = writeln!(out, "Package manager: {}", pm);
        }
        let _ = writeln!(
            out,
            "Entry point: {}",
            intent.entry_point.as_deref().unwrap_or("unknown")
        );
        match intent.port {
            Some(port) => {
                let _ = writeln!(out, "Listen port: {}", port);
            }
            None => {
                let _ = writeln!(out, "Listen port: unknown");
            }
        }
        if intent.precompiled {
            let _ = writeln!(out, "Ships a prebuilt artifact: a single runtime stage is acceptable");
        }

        let root_files: Vec<&str> = self.listing.root_files().map(|f| f.path.as_str()).collect();
        let _ = writeln!(out, "\n## Root files\n{}", root_files.join("\n"));

        let _ = writeln!(out, "\n## All files");
        for file in self.listing.files().iter().take(MAX_LISTED_FILES) {
            let _ = writeln!(out, "{}", file.path);
        }
        if self.listing.len() > MAX_LISTED_FILES {
            let _ = writeln!(out, "... and {} more", self.listing.len() - MAX_LISTED_FILES);
        }

        let missing: Vec<&str> = STANDARD_FILES
            .iter()
            .copied()
            .filter(|name| !self.listing.contains(name))
            .collect();
        if !missing.is_empty() {
            let _ = writeln!(out, "\n## Files that do NOT exist\n{}", missing.join("\n"));
        }

        for manifest in &intent.manifests {
            if let Some(content) = self.listing.content(manifest) {
                let _ = writeln!(
                    out,
                    "\n## {}\n{}",
                    manifest,
                    head_chars(content, MAX_MANIFEST_CHARS)
                );
            }
        }

        out
    }
}
