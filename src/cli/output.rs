//! Output formatting for run reports and health checks
//!
//! Reports and failures render as JSON, YAML or human-readable text. The
//! machine formats always carry the full attempt history.

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::heal::{AttemptOutcome, AttemptRecord, HealError, HealReport};

const RULE: &str = "\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}\u{2501}";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Yaml,
    Human,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub available: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl HealthStatus {
    pub fn available(message: impl Into<String>) -> Self {
        Self {
            available: true,
            message: message.into(),
            details: None,
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            available: false,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

#[derive(Serialize)]
struct FailureOutput<'a> {
    status: &'static str,
    error: String,
    attempts: usize,
    history: &'a [AttemptRecord],
}

pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn format_report(&self, report: &HealReport) -> Result<String> {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(report).context("Failed to serialize report to JSON")
            }
            OutputFormat::Yaml => {
                serde_yaml::to_string(report).context("Failed to serialize report to YAML")
            }
            OutputFormat::Human => Ok(self.format_report_human(report)),
        }
    }

    pub fn format_failure(&self, error: &HealError) -> Result<String> {
        let output = FailureOutput {
            status: match error {
                HealError::Cancelled { .. } => "cancelled",
                _ => "failed",
            },
            error: error.to_string(),
            attempts: error.history().len(),
            history: error.history(),
        };
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(&output)
                .context("Failed to serialize failure to JSON"),
            OutputFormat::Yaml => {
                serde_yaml::to_string(&output).context("Failed to serialize failure to YAML")
            }
            OutputFormat::Human => Ok(self.format_failure_human(error)),
        }
    }

    pub fn format_health(&self, results: &BTreeMap<String, HealthStatus>) -> Result<String> {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(results)
                .context("Failed to serialize health status to JSON"),
            OutputFormat::Yaml => {
                serde_yaml::to_string(results).context("Failed to serialize health status to YAML")
            }
            OutputFormat::Human => Ok(self.format_health_human(results)),
        }
    }

    fn format_report_human(&self, report: &HealReport) -> String {
        let mut output = String::new();

        output.push_str("\u{2713} Image Ready\n");
        output.push_str(RULE);
        output.push_str("\n\n");

        output.push_str(&format!("Image:     {}\n", report.image_ref));
        output.push_str(&format!(
            "Attempts:  {} ({:.1}s)\n\n",
            report.attempts, report.elapsed_secs
        ));

        output.push_str("Project:\n");
        output.push_str(&format!("\u{251C}\u{2500} Language:    {}\n", report.intent.language));
        output.push_str(&format!(
            "\u{251C}\u{2500} Entry Point: {}\n",
            report.intent.entry_point.as_deref().unwrap_or("(unknown)")
        ));
        match report.intent.port {
            Some(port) => output.push_str(&format!("\u{2514}\u{2500} Port:        {}\n\n", port)),
            None => output.push_str("\u{2514}\u{2500} Port:        (none)\n\n"),
        }

        if report.history.len() > 1 {
            output.push_str(&self.format_history_human(&report.history));
            output.push('\n');
        }

        output.push_str("Dockerfile:\n");
        output.push_str(&report.definition.to_dockerfile());
        output
    }

    fn format_failure_human(&self, error: &HealError) -> String {
        let mut output = String::new();

        let title = match error {
            HealError::Cancelled { .. } => "\u{26A0} Run Cancelled",
            _ => "\u{2717} No Working Image",
        };
        output.push_str(title);
        output.push('\n');
        output.push_str(RULE);
        output.push_str("\n\n");
        output.push_str(&format!("{}\n\n", error));

        if !error.history().is_empty() {
            output.push_str(&self.format_history_human(error.history()));
        }

        if let Some(last) = error.history().last() {
            let evidence = match &last.outcome {
                AttemptOutcome::BuildFailure { log_tail, .. } => Some(log_tail.as_str()),
                AttemptOutcome::ValidationFailure { detail, .. } => Some(detail.as_str()),
                AttemptOutcome::GenerationFailure { error } => Some(error.as_str()),
                AttemptOutcome::Success { .. } => None,
            };
            if let Some(evidence) = evidence.filter(|e| !e.trim().is_empty()) {
                output.push_str(&format!("\nLast failure (attempt {}):\n", last.attempt));
                output.push_str(evidence.trim_end());
                output.push('\n');
            }
            if let Some(definition) = &last.definition {
                output.push_str("\nLast Dockerfile:\n");
                output.push_str(&definition.to_dockerfile());
            }
        }

        output
    }

    fn format_history_human(&self, history: &[AttemptRecord]) -> String {
        let mut output = String::from("History:\n");
        for (i, record) in history.iter().enumerate() {
            let connector = if i + 1 == history.len() {
                "\u{2514}"
            } else {
                "\u{251C}"
            };
            let symbol = if record.outcome.is_success() {
                "\u{2713}"
            } else {
                "\u{2717}"
            };
            output.push_str(&format!(
                "{}\u{2500} {} attempt {}: {}\n",
                connector, symbol, record.attempt, record.outcome
            ));
        }
        output
    }

    fn format_health_human(&self, results: &BTreeMap<String, HealthStatus>) -> String {
        let mut output = String::new();

        output.push_str("Health Status\n");
        output.push_str(RULE);
        output.push_str("\n\n");

        for (name, status) in results {
            let symbol = if status.available {
                "\u{2713}"
            } else {
                "\u{2717}"
            };
            output.push_str(&format!("{} {}\n", symbol, name));
            output.push_str(&format!(
                "  Status: {}\n",
                if status.available {
                    "Available"
                } else {
                    "Unavailable"
                }
            ));
            output.push_str(&format!("  Message: {}\n", status.message));
            if let Some(details) = &status.details {
                output.push_str(&format!("  Details: {}\n", details));
            }
            output.push('\n');
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{BuildDefinition, Stage};
    use crate::heal::FailureKind;
    use crate::intent::ProjectIntent;
    use crate::validator::ValidationReason;

    fn definition() -> BuildDefinition {
        BuildDefinition::new(vec![
            Stage::new("golang:1.22-alpine").named("build").with("RUN", "go build -o /app ."),
            Stage::new("gcr.io/distroless/static")
                .with("COPY", "--from=build /app /app")
                .with("ENTRYPOINT", "[\"/app\"]"),
        ])
    }

    fn report() -> HealReport {
        HealReport {
            run_id: "abc123".to_string(),
            image_ref: "app:latest".to_string(),
            attempts: 2,
            intent: ProjectIntent::new("go").with_entry_point("main.go").with_port(8080),
            definition: definition(),
            history: vec![
                AttemptRecord::new(
                    1,
                    Some(definition()),
                    AttemptOutcome::BuildFailure {
                        stage: "2/4 RUN go build".to_string(),
                        exit_code: 1,
                        log_tail: "missing go.sum entry".to_string(),
                    },
                ),
                AttemptRecord::new(
                    2,
                    Some(definition()),
                    AttemptOutcome::Success {
                        image_ref: "app:latest".to_string(),
                    },
                ),
            ],
            elapsed_secs: 42.0,
        }
    }

    #[test]
    fn test_report_json_includes_history() {
        let formatter = OutputFormatter::new(OutputFormat::Json);
        let output = formatter.format_report(&report()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();

        assert_eq!(value["image_ref"], "app:latest");
        assert_eq!(value["history"].as_array().unwrap().len(), 2);
        assert_eq!(value["history"][0]["outcome"]["kind"], "build_failure");
    }

    #[test]
    fn test_report_yaml() {
        let formatter = OutputFormatter::new(OutputFormat::Yaml);
        let output = formatter.format_report(&report()).unwrap();
        assert!(output.contains("image_ref:"));
        assert!(output.contains("app:latest"));
    }

    #[test]
    fn test_report_human() {
        let formatter = OutputFormatter::new(OutputFormat::Human);
        let output = formatter.format_report(&report()).unwrap();

        assert!(output.contains("Image Ready"));
        assert!(output.contains("Image:     app:latest"));
        assert!(output.contains("attempt 1: build failed at '2/4 RUN go build' (exit 1)"));
        assert!(output.contains("FROM gcr.io/distroless/static"));
    }

    #[test]
    fn test_failure_human_shows_last_evidence() {
        let error = HealError::Exhausted {
            kind: FailureKind::Validation,
            history: vec![AttemptRecord::new(
                1,
                Some(definition()),
                AttemptOutcome::ValidationFailure {
                    reason: ValidationReason::NonZeroExit,
                    detail: "container exited with code 137".to_string(),
                },
            )],
        };
        let formatter = OutputFormatter::new(OutputFormat::Human);
        let output = formatter.format_failure(&error).unwrap();

        assert!(output.contains("No Working Image"));
        assert!(output.contains("container exited with code 137"));
        assert!(output.contains("Last Dockerfile:"));
    }

    #[test]
    fn test_failure_json_status() {
        let error = HealError::Cancelled { history: vec![] };
        let formatter = OutputFormatter::new(OutputFormat::Json);
        let value: serde_json::Value =
            serde_json::from_str(&formatter.format_failure(&error).unwrap()).unwrap();
        assert_eq!(value["status"], "cancelled");
        assert_eq!(value["attempts"], 0);
    }

    #[test]
    fn test_health_human() {
        let mut results = BTreeMap::new();
        results.insert("docker".to_string(), HealthStatus::available("Engine responding"));
        results.insert(
            "backend".to_string(),
            HealthStatus::unavailable("No backend").with_details("start ollama"),
        );

        let formatter = OutputFormatter::new(OutputFormat::Human);
        let output = formatter.format_health(&results).unwrap();
        assert!(output.contains("\u{2713} docker"));
        assert!(output.contains("\u{2717} backend"));
        assert!(output.contains("Details: start ollama"));
    }
}
