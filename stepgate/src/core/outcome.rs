//! Outcome of one orchestrator invocation, handed to the caller and the
//! recorder once a final state is reached.

use serde::Serialize;
use serde_json::Value;

use crate::core::plan::{RiskLevel, Step};
use crate::core::state::RunState;
use crate::error::GateError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepStatus {
    Applied,
    Previewed,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    /// An earlier failure stopped the run before this step.
    NotAttempted,
    /// The run ended at the preview; the step never executed.
    PreviewOnly,
    /// Policy denied the plan.
    Blocked,
}

/// Per-step result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepResult {
    pub index: usize,
    pub id: String,
    pub operation: String,
    pub command_line: String,
    pub risk: Option<RiskLevel>,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<SkipReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<GateError>,
}

impl StepResult {
    pub fn new(index: usize, step: &Step, status: StepStatus) -> Self {
        Self {
            index,
            id: step.id.clone(),
            operation: step.operation.name().to_string(),
            command_line: step.operation.command_line(),
            risk: step.risk,
            status,
            skip_reason: None,
            output: None,
            error: None,
        }
    }

    pub fn skipped(index: usize, step: &Step, reason: SkipReason) -> Self {
        Self {
            skip_reason: Some(reason),
            ..Self::new(index, step, StepStatus::Skipped)
        }
    }
}

/// Preview of one write step, as reported by its tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepPreview {
    pub index: usize,
    pub id: String,
    pub operation: String,
    pub command_line: String,
    pub risk: RiskLevel,
    pub effect: Value,
}

/// Assembled dry-run impact summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Preview {
    pub steps: Vec<StepPreview>,
    /// SHA-256 over the plan and the previews; binds a confirmation to
    /// exactly this preview.
    pub fingerprint: String,
}

/// One applied change, summarized from a tool's execute result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Change {
    pub step_id: String,
    pub summary: String,
    pub files: Vec<String>,
}

impl Change {
    /// Tools report `summary` and optional `files` in their results.
    pub fn from_result(step_id: &str, command_line: &str, result: &Value) -> Self {
        let summary = result
            .get("summary")
            .and_then(Value::as_str)
            .unwrap_or(command_line)
            .to_string();
        let files = result
            .get("files")
            .and_then(Value::as_array)
            .map(|files| {
                files
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Self {
            step_id: step_id.to_string(),
            summary,
            files,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum ConfirmationStatus {
    /// Low-risk plan; runs without a token.
    NotRequired,
    /// No token supplied; the run stopped after the preview.
    Missing,
    Accepted,
    Rejected { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionOutcome {
    pub trace_id: String,
    pub state: RunState,
    pub summary: String,
    pub steps: Vec<StepResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview: Option<Preview>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmation: Option<ConfirmationStatus>,
    pub changes: Vec<Change>,
    pub questions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<GateError>,
    /// Some write steps applied before a failure; nothing was rolled back.
    pub partially_applied: bool,
    /// Recorder failures observed during the run.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub audit_errors: Vec<String>,
}

impl ExecutionOutcome {
    pub fn new(trace_id: String) -> Self {
        Self {
            trace_id,
            state: RunState::Received,
            summary: String::new(),
            steps: Vec::new(),
            preview: None,
            confirmation: None,
            changes: Vec::new(),
            questions: Vec::new(),
            error: None,
            partially_applied: false,
            audit_errors: Vec::new(),
        }
    }

    pub fn applied_steps(&self) -> impl Iterator<Item = &StepResult> {
        self.steps
            .iter()
            .filter(|step| step.status == StepStatus::Applied)
    }

    pub fn failed_step(&self) -> Option<&StepResult> {
        self.steps
            .iter()
            .find(|step| step.status == StepStatus::Failed)
    }

    /// Files touched by applied changes, deduplicated in first-seen order.
    pub fn touched_files(&self) -> Vec<String> {
        let mut files: Vec<String> = Vec::new();
        for change in &self.changes {
            for file in &change.files {
                if !files.contains(file) {
                    files.push(file.clone());
                }
            }
        }
        files
    }
}
