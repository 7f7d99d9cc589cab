//! Audit trail: ordered event records plus per-run report artifacts.
//!
//! # Separation of Concerns
//!
//! - **Tracing (`logging`)**: dev diagnostics on stderr, filtered by `RUST_LOG`.
//! - **Event log (this module)**: product artifacts under `.stepgate/`.
//!   Append-only, one record per event, never edited after the fact.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::core::outcome::{ConfirmationStatus, ExecutionOutcome};
use crate::io::init::StatePaths;

const CHANGES_TEMPLATE: &str = include_str!("../templates/changes.md");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    RunStarted,
    PlanValidated,
    ClarificationRequested,
    RiskAssessed,
    PolicyDecided,
    StepPreviewed,
    Confirmation,
    StepApplied,
    StepFailed,
    RunFinished,
}

/// One append-only audit record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventRecord {
    pub trace_id: String,
    /// Position within the trace, starting at 0.
    pub seq: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_index: Option<usize>,
    pub event: EventKind,
    pub payload: Value,
    /// RFC 3339, UTC.
    pub at: String,
}

/// Append interface of the observability sink.
pub trait Recorder {
    fn append(&mut self, record: &EventRecord) -> Result<()>;

    /// Called once with the final outcome of the run.
    fn finish(&mut self, outcome: &ExecutionOutcome) -> Result<()>;
}

/// Writes `logs/<trace>.jsonl`, `runs/<trace>/outcome.json` and
/// `runs/<trace>/changes.md` under the state dir.
pub struct JsonlRecorder {
    paths: StatePaths,
    file: Option<(String, File)>,
}

impl JsonlRecorder {
    pub fn new(paths: StatePaths) -> Self {
        Self { paths, file: None }
    }

    fn file_for(&mut self, trace_id: &str) -> Result<&mut File> {
        let reopen = !matches!(&self.file, Some((open, _)) if open == trace_id);
        if reopen {
            self.paths.ensure()?;
            fs::create_dir_all(&self.paths.logs_dir).with_context(|| {
                format!("create directory {}", self.paths.logs_dir.display())
            })?;
            let path = self.paths.log_path(trace_id);
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("open event log {}", path.display()))?;
            debug!(path = %path.display(), "event log opened");
            self.file = Some((trace_id.to_string(), file));
        }
        match self.file.as_mut() {
            Some((_, file)) => Ok(file),
            None => Err(anyhow::anyhow!("event log is not open")),
        }
    }

    pub fn log_path(&self, trace_id: &str) -> PathBuf {
        self.paths.log_path(trace_id)
    }
}

impl Recorder for JsonlRecorder {
    fn append(&mut self, record: &EventRecord) -> Result<()> {
        let mut line = serde_json::to_string(record).context("serialize event record")?;
        line.push('\n');
        let file = self.file_for(&record.trace_id)?;
        file.write_all(line.as_bytes())
            .context("append event record")?;
        file.flush().context("flush event log")?;
        Ok(())
    }

    fn finish(&mut self, outcome: &ExecutionOutcome) -> Result<()> {
        let dir = self.paths.run_dir(&outcome.trace_id);
        fs::create_dir_all(&dir).with_context(|| format!("create directory {}", dir.display()))?;

        let mut buf = serde_json::to_string_pretty(outcome).context("serialize outcome")?;
        buf.push('\n');
        let outcome_path = dir.join("outcome.json");
        fs::write(&outcome_path, buf)
            .with_context(|| format!("write {}", outcome_path.display()))?;

        let changes_path = dir.join("changes.md");
        fs::write(&changes_path, render_changes(outcome)?)
            .with_context(|| format!("write {}", changes_path.display()))?;
        self.file = None;
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct StepRow {
    index: usize,
    id: String,
    command_line: String,
    risk: String,
    status: String,
}

#[derive(Debug, Serialize)]
struct PreviewRow {
    command_line: String,
    summary: String,
}

/// Human-readable change summary for one run.
pub fn render_changes(outcome: &ExecutionOutcome) -> Result<String> {
    let steps: Vec<StepRow> = outcome
        .steps
        .iter()
        .map(|step| StepRow {
            index: step.index,
            id: step.id.clone(),
            command_line: step.command_line.clone(),
            risk: step.risk.map_or("-", |r| r.as_str()).to_string(),
            status: match step.skip_reason {
                Some(reason) => format!("{} ({})", label(&step.status), label(&reason)),
                None => label(&step.status),
            },
        })
        .collect();
    let preview: Vec<PreviewRow> = outcome
        .preview
        .iter()
        .flat_map(|preview| preview.steps.iter())
        .map(|item| PreviewRow {
            command_line: item.command_line.clone(),
            summary: item
                .effect
                .get("summary")
                .and_then(Value::as_str)
                .unwrap_or("no summary")
                .to_string(),
        })
        .collect();
    let confirmation = outcome.confirmation.as_ref().map(|c| match c {
        ConfirmationStatus::NotRequired => "not required".to_string(),
        ConfirmationStatus::Missing => "missing (preview only)".to_string(),
        ConfirmationStatus::Accepted => "accepted".to_string(),
        ConfirmationStatus::Rejected { reason } => format!("rejected ({reason})"),
    });

    let mut env = Environment::new();
    env.add_template("changes", CHANGES_TEMPLATE)
        .context("load changes template")?;
    let rendered = env.get_template("changes")?.render(context! {
        trace_id => &outcome.trace_id,
        state => outcome.state.as_str(),
        summary => (!outcome.summary.is_empty()).then_some(outcome.summary.as_str()),
        confirmation => confirmation,
        partially_applied => outcome.partially_applied,
        steps => steps,
        preview => (!preview.is_empty()).then_some(preview),
        fingerprint => outcome.preview.as_ref().map(|p| p.fingerprint.as_str()),
        changes => (!outcome.changes.is_empty()).then_some(&outcome.changes),
        questions => (!outcome.questions.is_empty()).then_some(&outcome.questions),
        error => outcome.error.as_ref().map(ToString::to_string),
    })?;
    Ok(rendered)
}

/// Serialized (kebab-case) name of a unit enum value.
fn label<T: Serialize>(value: &T) -> String {
    serde_json::to_value(value)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::outcome::{Change, SkipReason, StepResult, StepStatus};
    use crate::core::plan::RiskLevel;
    use crate::core::state::RunState;
    use serde_json::json;

    fn record(trace: &str, seq: u64, event: EventKind) -> EventRecord {
        EventRecord {
            trace_id: trace.to_string(),
            seq,
            step_index: None,
            event,
            payload: json!({}),
            at: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    fn outcome() -> ExecutionOutcome {
        let mut outcome = ExecutionOutcome::new("trace-9".to_string());
        outcome.state = RunState::Failed;
        outcome.summary = "stage and commit".to_string();
        outcome.partially_applied = true;
        outcome.steps = vec![
            StepResult {
                index: 0,
                id: "s1".to_string(),
                operation: "stage-all-changes".to_string(),
                command_line: "add -A".to_string(),
                risk: Some(RiskLevel::Medium),
                status: StepStatus::Applied,
                skip_reason: None,
                output: None,
                error: None,
            },
            StepResult {
                index: 1,
                id: "s2".to_string(),
                operation: "commit".to_string(),
                command_line: "commit -m \"x\"".to_string(),
                risk: Some(RiskLevel::Medium),
                status: StepStatus::Skipped,
                skip_reason: Some(SkipReason::NotAttempted),
                output: None,
                error: None,
            },
        ];
        outcome.changes = vec![Change {
            step_id: "s1".to_string(),
            summary: "staged 1 file".to_string(),
            files: vec!["README.md".to_string()],
        }];
        outcome
    }

    #[test]
    fn appends_one_line_per_record() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = StatePaths::new(temp.path());
        let mut recorder = JsonlRecorder::new(paths.clone());
        recorder
            .append(&record("t1", 0, EventKind::RunStarted))
            .expect("append");
        recorder
            .append(&record("t1", 1, EventKind::RunFinished))
            .expect("append");

        let contents = fs::read_to_string(paths.log_path("t1")).expect("read log");
        let events: Vec<Value> = contents
            .lines()
            .map(|line| serde_json::from_str(line).expect("json line"))
            .collect();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0]["event"], "run-started");
        assert_eq!(events[1]["seq"], 1);
        assert!(paths.gitignore_path.is_file());
    }

    #[test]
    fn reopening_appends_instead_of_truncating() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = StatePaths::new(temp.path());
        JsonlRecorder::new(paths.clone())
            .append(&record("t1", 0, EventKind::RunStarted))
            .expect("append");
        JsonlRecorder::new(paths.clone())
            .append(&record("t1", 1, EventKind::RunFinished))
            .expect("append");
        let contents = fs::read_to_string(paths.log_path("t1")).expect("read log");
        assert_eq!(contents.lines().count(), 2);
    }

    #[test]
    fn finish_writes_outcome_and_change_summary() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = StatePaths::new(temp.path());
        let mut recorder = JsonlRecorder::new(paths.clone());
        let outcome = outcome();
        recorder.finish(&outcome).expect("finish");

        let dir = paths.run_dir("trace-9");
        let json: Value = serde_json::from_str(
            &fs::read_to_string(dir.join("outcome.json")).expect("outcome"),
        )
        .expect("json");
        assert_eq!(json["state"], "failed");
        assert_eq!(json["partially_applied"], true);

        let md = fs::read_to_string(dir.join("changes.md")).expect("changes");
        assert!(md.contains("# Run trace-9"));
        assert!(md.contains("Partially applied"));
        assert!(md.contains("README.md"));
        assert!(md.contains("skipped (not-attempted)"));
    }
}
