//! Full runs with the built-in tools against a scratch git repository.

use std::fs;
use std::sync::Arc;

use serde_json::{Value, json};
use stepgate::core::outcome::{ConfirmationStatus, ExecutionOutcome, StepStatus};
use stepgate::core::session::SessionContext;
use stepgate::core::state::RunState;
use stepgate::error::GateError;
use stepgate::gate::ConfirmationToken;
use stepgate::io::event_log::JsonlRecorder;
use stepgate::io::init::StatePaths;
use stepgate::io::workspace::{WorkspaceLocks, WorkspaceRoot};
use stepgate::orchestrator::{Orchestrator, RunRequest};
use stepgate::protocol::client::ToolClient;
use stepgate::test_support::{LoopbackTransport, TEST_TIMEOUT, TestRepo};
use stepgate::tools::{ToolContext, builtin_server};

struct Gate {
    repo: TestRepo,
    orchestrator: Orchestrator,
    client: ToolClient<LoopbackTransport>,
    paths: StatePaths,
    session: SessionContext,
}

impl Gate {
    fn new() -> Self {
        let repo = TestRepo::new();
        let root = WorkspaceRoot::open(repo.path()).expect("open workspace");
        let server = builtin_server(ToolContext::new(root.clone())).expect("server");
        let client = ToolClient::new(LoopbackTransport::new(server), TEST_TIMEOUT);
        let paths = StatePaths::new(root.path());
        let orchestrator = Orchestrator::new(root, Arc::new(WorkspaceLocks::new()));
        Self {
            repo,
            orchestrator,
            client,
            paths,
            session: SessionContext::default(),
        }
    }

    fn run(&mut self, request: RunRequest) -> ExecutionOutcome {
        let mut recorder = JsonlRecorder::new(self.paths.clone());
        self.orchestrator
            .run(request, &mut self.client, &mut recorder, &mut self.session)
            .expect("run")
    }
}

fn plan(steps: Value) -> Value {
    json!({ "summary": "tidy up", "steps": steps })
}

#[test]
fn stage_all_previews_then_applies_on_confirmation() {
    let mut gate = Gate::new();
    gate.repo.write_file("notes.txt", "todo\n");
    gate.repo.write_file("src/lib.rs", "pub fn f() {}\n");
    let doc = plan(json!([{ "id": "stage", "operation": "stage-all-changes" }]));

    let status_before = gate.repo.status();
    let preview = gate.run(RunRequest::preview(doc.clone()));
    assert_eq!(preview.state, RunState::DryRunDone);
    assert_eq!(preview.confirmation, Some(ConfirmationStatus::Missing));
    let effect = &preview.preview.as_ref().expect("preview").steps[0].effect;
    assert_eq!(effect["files"], json!(["notes.txt", "src/lib.rs"]));
    assert_eq!(gate.repo.status(), status_before, "preview must not mutate");

    let outcome = gate.run(RunRequest::confirmed(doc, ConfirmationToken::new("YES")));
    assert_eq!(outcome.state, RunState::Completed);
    assert_eq!(outcome.steps[0].status, StepStatus::Applied);
    let staged = gate.repo.git(&["diff", "--cached", "--name-only"]);
    assert_eq!(staged.lines().collect::<Vec<_>>(), vec!["notes.txt", "src/lib.rs"]);

    let report = fs::read_to_string(gate.paths.run_dir(&outcome.trace_id).join("changes.md"))
        .expect("change summary");
    assert!(report.contains("notes.txt"));
    assert!(report.contains("src/lib.rs"));

    let log = fs::read_to_string(gate.paths.log_path(&outcome.trace_id)).expect("event log");
    let applied = log
        .lines()
        .map(|line| serde_json::from_str::<Value>(line).expect("event json"))
        .filter(|event| event["event"] == "step-applied")
        .count();
    assert_eq!(applied, 1);
}

#[test]
fn dry_run_twice_is_identical_and_leaves_workspace_alone() {
    let mut gate = Gate::new();
    gate.repo.write_file("README.md", "# changed\n");
    let doc = plan(json!([
        { "id": "write", "operation": "write-file", "args": { "path": "docs/new.md", "content": "hello\n" } },
        { "id": "stage", "operation": "stage", "args": { "paths": ["README.md"] } },
        { "id": "commit", "operation": "commit", "args": { "message": "docs" } }
    ]));

    let status_before = gate.repo.status();
    let first = gate.run(RunRequest::preview(doc.clone()));
    let second = gate.run(RunRequest::preview(doc));

    assert_eq!(first.state, RunState::DryRunDone);
    assert_eq!(first.preview, second.preview);
    assert_eq!(gate.repo.status(), status_before);
    assert!(!gate.repo.join("docs/new.md").exists());
}

#[test]
fn write_stage_commit_runs_in_order() {
    let mut gate = Gate::new();
    let doc = plan(json!([
        { "id": "write", "operation": "write-file", "args": { "path": "docs/new.md", "content": "hello\n" } },
        { "id": "stage", "operation": "stage", "args": { "paths": ["docs/new.md"] } },
        { "id": "commit", "operation": "commit", "args": { "message": "add docs" } }
    ]));

    let outcome = gate.run(RunRequest::confirmed(doc, ConfirmationToken::new("YES")));

    assert_eq!(outcome.state, RunState::Completed, "{:?}", outcome.error);
    assert_eq!(gate.repo.read_file("docs/new.md"), "hello\n");
    assert_eq!(
        gate.repo.git(&["log", "-1", "--format=%s"]).trim(),
        "add docs"
    );
    assert_eq!(gate.repo.status(), "", "state dir must stay ignored");
    assert!(gate.session.recent_files.contains(&"docs/new.md".to_string()));
}

#[test]
fn failing_step_leaves_earlier_steps_applied() {
    let mut gate = Gate::new();
    gate.repo.write_file("a.txt", "a\n");
    let doc = plan(json!([
        { "id": "stage", "operation": "stage-all-changes" },
        { "id": "switch", "operation": "switch-branch", "args": { "branch": "missing" } },
        { "id": "commit", "operation": "commit", "args": { "message": "never" } }
    ]));

    let outcome = gate.run(RunRequest::confirmed(doc, ConfirmationToken::new("YES")));

    assert_eq!(outcome.state, RunState::Failed);
    assert!(outcome.partially_applied);
    assert!(matches!(outcome.error, Some(GateError::ToolExecution(_))));
    assert_eq!(
        gate.repo.git(&["diff", "--cached", "--name-only"]).trim(),
        "a.txt"
    );
    assert_eq!(gate.repo.git(&["log", "--format=%s"]).trim(), "initial");
}

#[test]
fn sensitive_file_write_is_blocked() {
    let mut gate = Gate::new();
    let doc = plan(json!([
        { "id": "leak", "operation": "write-file", "args": { "path": ".env", "content": "TOKEN=1" } }
    ]));

    let outcome = gate.run(RunRequest::confirmed(doc, ConfirmationToken::new("YES")));

    assert_eq!(outcome.state, RunState::Blocked);
    assert!(!gate.repo.join(".env").exists());
    assert!(gate.client.transport_mut().sent().is_empty());
}

#[test]
fn read_only_plan_needs_no_confirmation() {
    let mut gate = Gate::new();
    let doc = plan(json!([
        { "id": "status", "operation": "status" },
        { "id": "log", "operation": "log", "args": { "limit": 5 } }
    ]));

    let outcome = gate.run(RunRequest::preview(doc));

    assert_eq!(outcome.state, RunState::Completed);
    assert_eq!(outcome.confirmation, Some(ConfirmationStatus::NotRequired));
    let log = outcome.steps[1].output.as_ref().expect("log output");
    assert_eq!(log["commits"][0]["subject"], "initial");
}
