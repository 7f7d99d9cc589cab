//! Gated run of one plan: validate, assess, decide, preview, confirm, execute.
//!
//! Every invocation walks the [`RunState`] machine from `Received` to a final
//! state and returns an [`ExecutionOutcome`]. Non-success paths are typed
//! outcomes, not `Err`; `Err` is reserved for infrastructure the run cannot
//! account for (the audit sink refusing the first record, a poisoned
//! workspace lock).

use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

use crate::core::outcome::{
    Change, ConfirmationStatus, ExecutionOutcome, Preview, SkipReason, StepResult, StepStatus,
};
use crate::core::plan::{Plan, RiskLevel, Step};
use crate::core::policy::{Decision, PolicyEngine};
use crate::core::risk::RiskTable;
use crate::core::session::SessionContext;
use crate::core::state::RunState;
use crate::core::validator::{Validation, validate_plan};
use crate::error::{GateError, ValidationError};
use crate::gate::{self, ConfirmationGate, ConfirmationToken};
use crate::io::config::GateConfig;
use crate::io::event_log::{EventKind, EventRecord, Recorder};
use crate::io::workspace::{WorkspaceLocks, WorkspaceRoot};
use crate::protocol::client::ToolClient;
use crate::protocol::registry::CallMode;
use crate::protocol::transport::Transport;

/// One submission of a plan.
#[derive(Debug)]
pub struct RunRequest {
    /// Planner document, validated by the run.
    pub plan: Value,
    /// Consumed by the run; a resubmission needs a new token.
    pub confirmation: Option<ConfirmationToken>,
}

impl RunRequest {
    pub fn preview(plan: Value) -> Self {
        Self {
            plan,
            confirmation: None,
        }
    }

    pub fn confirmed(plan: Value, token: ConfirmationToken) -> Self {
        Self {
            plan,
            confirmation: Some(token),
        }
    }
}

/// Per-step view in a [`CheckReport`].
#[derive(Debug, Clone, Serialize)]
pub struct CheckedStep {
    pub index: usize,
    pub id: String,
    pub command_line: String,
    pub risk: RiskLevel,
    pub decision: Decision,
}

/// Result of validation, risk and policy without any tool call.
#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    /// `DryRunReady` when the plan would proceed to a preview.
    pub state: RunState,
    pub summary: String,
    pub steps: Vec<CheckedStep>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_risk: Option<RiskLevel>,
    pub questions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<GateError>,
}

pub struct Orchestrator {
    workspace: WorkspaceRoot,
    locks: Arc<WorkspaceLocks>,
    risk: RiskTable,
    policy: PolicyEngine,
    gate: ConfirmationGate,
}

impl Orchestrator {
    /// Orchestrator with the built-in risk table, policy and token.
    pub fn new(workspace: WorkspaceRoot, locks: Arc<WorkspaceLocks>) -> Self {
        Self {
            workspace,
            locks,
            risk: RiskTable::default(),
            policy: PolicyEngine::default(),
            gate: ConfirmationGate::default(),
        }
    }

    pub fn from_config(
        workspace: WorkspaceRoot,
        locks: Arc<WorkspaceLocks>,
        cfg: &GateConfig,
    ) -> Result<Self> {
        Ok(Self {
            workspace,
            locks,
            risk: cfg.risk_table()?,
            policy: cfg.policy_engine()?,
            gate: ConfirmationGate::new(cfg.confirm_token.clone()),
        })
    }

    pub fn with_policy(mut self, policy: PolicyEngine) -> Self {
        self.policy = policy;
        self
    }

    pub fn workspace(&self) -> &WorkspaceRoot {
        &self.workspace
    }

    /// Validate, assess and decide `doc` without contacting the tool server.
    pub fn check(&self, doc: &Value) -> CheckReport {
        let mut report = CheckReport {
            state: RunState::Received,
            summary: String::new(),
            steps: Vec::new(),
            max_risk: None,
            questions: Vec::new(),
            error: None,
        };
        let plan = match validate_plan(doc) {
            Err(err) => {
                report.state = RunState::Failed;
                report.error = Some(err.into());
                return report;
            }
            Ok(Validation::NeedsClarification(questions)) => {
                report.state = RunState::NeedsClarification;
                report.questions = questions;
                return report;
            }
            Ok(Validation::Ready(plan)) => self.risk.assess(plan),
        };
        let decision = self.policy.evaluate(&plan, &self.workspace);
        report.summary = plan.summary.clone();
        report.max_risk = Some(plan.max_risk());
        report.steps = plan
            .steps()
            .iter()
            .zip(decision.steps)
            .enumerate()
            .map(|(index, (step, decision))| CheckedStep {
                index,
                id: step.id.clone(),
                command_line: step.operation.command_line(),
                risk: step.effective_risk(),
                decision,
            })
            .collect();
        match decision.aggregate {
            Decision::Allow => report.state = RunState::DryRunReady,
            Decision::Deny(denial) => {
                report.state = RunState::Blocked;
                report.error = Some(GateError::Policy(denial.into()));
            }
            Decision::NeedsClarification { questions } => {
                report.state = RunState::NeedsClarification;
                report.questions = questions;
            }
        }
        report
    }

    /// Drive one submission to a final state.
    ///
    /// `session` is updated with the run's effects whatever the final state.
    pub fn run<T: Transport>(
        &self,
        request: RunRequest,
        client: &mut ToolClient<T>,
        recorder: &mut dyn Recorder,
        session: &mut SessionContext,
    ) -> Result<ExecutionOutcome> {
        let trace_id = Uuid::new_v4().to_string();
        let span = info_span!("run", trace = %trace_id);
        let _entered = span.enter();

        let mut run = Run::new(trace_id, recorder);
        run.start(&request.plan, self.workspace.path().display().to_string())?;
        let plan = self.drive(&mut run, request, client)?;

        session.record_run(plan.as_ref(), &run.outcome);
        let payload = json!({
            "state": run.outcome.state,
            "partially_applied": run.outcome.partially_applied,
            "applied": run.outcome.applied_steps().count(),
        });
        run.emit(EventKind::RunFinished, None, payload);
        run.finish();
        info!(
            state = run.outcome.state.as_str(),
            partially_applied = run.outcome.partially_applied,
            "run finished"
        );
        Ok(run.outcome)
    }

    fn drive<T: Transport>(
        &self,
        run: &mut Run<'_>,
        request: RunRequest,
        client: &mut ToolClient<T>,
    ) -> Result<Option<Plan>> {
        let RunRequest { plan: doc, confirmation } = request;

        let plan = match validate_plan(&doc) {
            Err(err) => {
                run.emit(
                    EventKind::PlanValidated,
                    None,
                    json!({ "valid": false, "error": &err }),
                );
                run.fail(err.into());
                return Ok(None);
            }
            Ok(Validation::NeedsClarification(questions)) => {
                run.clarify(questions);
                return Ok(None);
            }
            Ok(Validation::Ready(plan)) => plan,
        };
        run.enter(RunState::Validated);
        run.outcome.summary = plan.summary.clone();
        run.emit(
            EventKind::PlanValidated,
            None,
            json!({
                "valid": true,
                "steps": plan.len(),
                "writes": plan.write_step_count(),
            }),
        );

        let plan = self.risk.assess(plan);
        run.enter(RunState::RiskAssessed);
        let risks: Vec<RiskLevel> = plan.steps().iter().map(|s| s.effective_risk()).collect();
        run.emit(
            EventKind::RiskAssessed,
            None,
            json!({ "max_risk": plan.max_risk(), "steps": risks }),
        );

        let decision = self.policy.evaluate(&plan, &self.workspace);
        run.emit(
            EventKind::PolicyDecided,
            None,
            json!({ "aggregate": &decision.aggregate, "steps": &decision.steps }),
        );
        match decision.aggregate {
            Decision::Allow => {}
            Decision::Deny(denial) => {
                warn!(reason = %denial.reason, detail = %denial.detail, "plan blocked");
                run.skip_all(&plan, 0, SkipReason::Blocked);
                run.outcome.error = Some(GateError::Policy(denial.into()));
                run.enter(RunState::Blocked);
                return Ok(Some(plan));
            }
            Decision::NeedsClarification { questions } => {
                run.skip_all(&plan, 0, SkipReason::NotAttempted);
                run.clarify(questions);
                return Ok(Some(plan));
            }
        }

        run.enter(RunState::DryRunReady);
        let lock = self.locks.lock_for(&self.workspace)?;
        let poisoned = || anyhow!("workspace lock for {} is poisoned", self.workspace.path().display());
        if plan.has_writes() {
            let _guard = lock.write().map_err(|_| poisoned())?;
            debug!("holding workspace write lock");
            self.preview_and_execute(run, &plan, confirmation, client);
        } else {
            let _guard = lock.read().map_err(|_| poisoned())?;
            debug!("holding workspace read lock");
            self.preview_and_execute(run, &plan, confirmation, client);
        }
        Ok(Some(plan))
    }

    fn preview_and_execute<T: Transport>(
        &self,
        run: &mut Run<'_>,
        plan: &Plan,
        confirmation: Option<ConfirmationToken>,
        client: &mut ToolClient<T>,
    ) {
        let hosted = match client.list_tools() {
            Ok(tools) => tools,
            Err(err) => {
                run.skip_all(plan, 0, SkipReason::NotAttempted);
                run.fail(err.into());
                return;
            }
        };
        if let Some((index, step)) = plan
            .steps()
            .iter()
            .enumerate()
            .find(|(_, step)| !hosted.iter().any(|tool| tool.name == step.operation.name()))
        {
            let err = ValidationError::new(
                format!("steps[{index}].operation"),
                format!("tool server does not host `{}`", step.operation.name()),
            );
            run.skip_all(plan, 0, SkipReason::NotAttempted);
            run.fail(err.into());
            return;
        }

        let dry_run = gate::dry_run(client, plan, |preview| {
            run.emit(
                EventKind::StepPreviewed,
                Some(preview.index),
                json!({ "command_line": &preview.command_line, "effect": &preview.effect }),
            );
        });
        let preview = match dry_run {
            Ok(preview) => preview,
            Err(failure) => {
                let error: GateError = failure.error.into();
                run.emit(
                    EventKind::StepFailed,
                    failure.step_index,
                    json!({ "mode": CallMode::Preview, "error": &error }),
                );
                let failed_at = failure.step_index.unwrap_or(plan.len());
                for (index, step) in plan.steps().iter().enumerate() {
                    let result = if index < failed_at {
                        previewed_or_preview_only(index, step)
                    } else if index == failed_at {
                        StepResult {
                            error: Some(error.clone()),
                            ..StepResult::new(index, step, StepStatus::Failed)
                        }
                    } else {
                        StepResult::skipped(index, step, SkipReason::NotAttempted)
                    };
                    run.outcome.steps.push(result);
                }
                let fingerprint = gate::fingerprint(plan, &failure.previews).unwrap_or_else(|err| {
                    warn!(err = %err, "partial preview has no fingerprint");
                    String::new()
                });
                run.outcome.preview = Some(Preview {
                    fingerprint,
                    steps: failure.previews,
                });
                run.fail(error);
                return;
            }
        };
        run.enter(RunState::DryRunDone);

        let status = if !plan.max_risk().requires_confirmation() {
            ConfirmationStatus::NotRequired
        } else if confirmation.is_none() {
            ConfirmationStatus::Missing
        } else {
            run.enter(RunState::AwaitingConfirmation);
            self.gate.check(confirmation, &preview)
        };
        run.emit(EventKind::Confirmation, None, json!(&status));
        run.outcome.preview = Some(preview);
        let proceed = matches!(
            status,
            ConfirmationStatus::NotRequired | ConfirmationStatus::Accepted
        );
        if !proceed && run.outcome.state == RunState::AwaitingConfirmation {
            run.enter(RunState::DryRunDone);
        }
        run.outcome.confirmation = Some(status);
        if !proceed {
            info!("stopping after preview");
            run.outcome.steps = plan
                .steps()
                .iter()
                .enumerate()
                .map(|(index, step)| previewed_or_preview_only(index, step))
                .collect();
            return;
        }

        run.enter(RunState::Executing);
        self.execute(run, plan, client);
    }

    fn execute<T: Transport>(&self, run: &mut Run<'_>, plan: &Plan, client: &mut ToolClient<T>) {
        let mut applied_writes = 0usize;
        for (index, step) in plan.steps().iter().enumerate() {
            let command_line = step.operation.command_line();
            match client.call_tool(
                step.operation.name(),
                step.operation.arguments(),
                CallMode::Execute,
            ) {
                Ok(output) => {
                    if step.operation.is_write() {
                        applied_writes += 1;
                        run.outcome
                            .changes
                            .push(Change::from_result(&step.id, &command_line, &output));
                    }
                    run.emit(
                        EventKind::StepApplied,
                        Some(index),
                        json!({ "command_line": &command_line, "output": &output }),
                    );
                    run.outcome.steps.push(StepResult {
                        output: Some(output),
                        ..StepResult::new(index, step, StepStatus::Applied)
                    });
                }
                Err(err) => {
                    let error: GateError = err.into();
                    warn!(step = %step.id, err = %error, "step failed");
                    run.emit(
                        EventKind::StepFailed,
                        Some(index),
                        json!({ "mode": CallMode::Execute, "command_line": &command_line, "error": &error }),
                    );
                    run.outcome.steps.push(StepResult {
                        error: Some(error.clone()),
                        ..StepResult::new(index, step, StepStatus::Failed)
                    });
                    run.skip_all(plan, index + 1, SkipReason::NotAttempted);
                    run.outcome.partially_applied = applied_writes > 0;
                    run.fail(error);
                    return;
                }
            }
        }
        run.enter(RunState::Completed);
    }
}

fn previewed_or_preview_only(index: usize, step: &Step) -> StepResult {
    if step.operation.is_write() {
        StepResult::new(index, step, StepStatus::Previewed)
    } else {
        StepResult::skipped(index, step, SkipReason::PreviewOnly)
    }
}

/// Mutable state of one invocation plus its audit sink.
struct Run<'r> {
    outcome: ExecutionOutcome,
    recorder: &'r mut dyn Recorder,
    seq: u64,
}

impl<'r> Run<'r> {
    fn new(trace_id: String, recorder: &'r mut dyn Recorder) -> Self {
        Self {
            outcome: ExecutionOutcome::new(trace_id),
            recorder,
            seq: 0,
        }
    }

    fn record(&mut self, event: EventKind, step_index: Option<usize>, payload: Value) -> EventRecord {
        let record = EventRecord {
            trace_id: self.outcome.trace_id.clone(),
            seq: self.seq,
            step_index,
            event,
            payload,
            at: Utc::now().to_rfc3339(),
        };
        self.seq += 1;
        record
    }

    /// The first record must land; a run without an audit trail never starts.
    fn start(&mut self, doc: &Value, workspace: String) -> Result<()> {
        let record = self.record(
            EventKind::RunStarted,
            None,
            json!({ "workspace": workspace, "plan": doc }),
        );
        self.recorder
            .append(&record)
            .context("record run start")?;
        Ok(())
    }

    fn emit(&mut self, event: EventKind, step_index: Option<usize>, payload: Value) {
        let record = self.record(event, step_index, payload);
        if let Err(err) = self.recorder.append(&record) {
            warn!(seq = record.seq, err = %format!("{err:#}"), "audit append failed");
            self.outcome
                .audit_errors
                .push(format!("seq {}: {err:#}", record.seq));
        }
    }

    fn finish(&mut self) {
        if let Err(err) = self.recorder.finish(&self.outcome) {
            warn!(err = %format!("{err:#}"), "writing run report failed");
            self.outcome.audit_errors.push(format!("report: {err:#}"));
        }
    }

    fn enter(&mut self, next: RunState) {
        let current = self.outcome.state;
        debug_assert!(
            current.can_transition_to(next),
            "illegal transition {} -> {}",
            current.as_str(),
            next.as_str()
        );
        debug!(from = current.as_str(), to = next.as_str(), "state");
        self.outcome.state = next;
    }

    fn fail(&mut self, error: GateError) {
        warn!(err = %error, "run failed");
        self.outcome.error = Some(error);
        self.enter(RunState::Failed);
    }

    fn clarify(&mut self, questions: Vec<String>) {
        self.emit(
            EventKind::ClarificationRequested,
            None,
            json!({ "questions": &questions }),
        );
        self.outcome.questions = questions;
        self.enter(RunState::NeedsClarification);
    }

    fn skip_all(&mut self, plan: &Plan, from: usize, reason: SkipReason) {
        for (index, step) in plan.steps().iter().enumerate().skip(from) {
            self.outcome
                .steps
                .push(StepResult::skipped(index, step, reason));
        }
    }
}
