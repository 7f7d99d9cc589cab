//! Policy engine: the sole authority for allow / deny / needs-clarification.
//!
//! Per-step check order:
//!
//! 1. Blacklisted command line -> `Deny(blacklisted-operation)`
//! 2. Any path argument outside the workspace -> `Deny(sandbox-escape)`
//! 3. Any path argument naming a sensitive file -> `Deny(sensitive-path)`
//! 4. Ambiguous wide staging -> `NeedsClarification`
//! 5. Otherwise -> `Allow`
//!
//! The plan-level aggregate checks the write-volume cap before anything else.
//! Confirmation status is never an input here.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Serialize, Serializer};

use crate::core::plan::{Operation, Plan, Step};
use crate::error::PolicyViolation;

/// Default write-step cap per plan.
pub const DEFAULT_MAX_WRITE_STEPS: usize = 10;

/// Default command-line denylist: `(rule name, regex)`.
pub const DEFAULT_BLACKLIST: &[(&str, &str)] = &[
    ("hard-reset", r"^reset(\s.*)?\s--hard(\s|$)"),
    ("forced-clean", r"^clean(\s.*)?\s(--force|-[a-zA-Z]*f[a-zA-Z]*)(\s|$)"),
    (
        "forced-push",
        r"^push(\s.*)?\s(--force|--force-with-lease(=\S*)?|-[a-zA-Z]*f[a-zA-Z]*)(\s|$)",
    ),
    ("forced-push-refspec", r"^push(\s.*)?\s\+\S+"),
    ("discard-worktree", r"^checkout(\s.*)?\s--\s+\.(\s|$)"),
];

/// File names that are never read or written, wherever they live.
pub const DEFAULT_SENSITIVE_NAMES: &[&str] = &[
    ".env",
    ".env.local",
    "id_rsa",
    "id_ed25519",
    "secrets.json",
    "tokens.json",
];

/// Resolves raw path arguments against the workspace root.
///
/// Implementations must resolve symlinks and `..` segments before deciding
/// containment.
pub trait PathSandbox {
    /// Return the canonical in-workspace path, or a description of why not.
    fn resolve(&self, raw: &str) -> Result<PathBuf, String>;
}

/// Stable denial reason codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DenyReason {
    BlacklistedOperation,
    SandboxEscape,
    SensitivePath,
    TooManyWrites,
}

impl DenyReason {
    pub fn as_str(self) -> &'static str {
        match self {
            DenyReason::BlacklistedOperation => "blacklisted-operation",
            DenyReason::SandboxEscape => "sandbox-escape",
            DenyReason::SensitivePath => "sensitive-path",
            DenyReason::TooManyWrites => "too-many-writes",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for DenyReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Why a step or plan was denied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Denial {
    pub reason: DenyReason,
    pub detail: String,
    pub step_index: Option<usize>,
}

impl From<Denial> for PolicyViolation {
    fn from(denial: Denial) -> Self {
        PolicyViolation {
            reason: denial.reason,
            detail: denial.detail,
            step_index: denial.step_index,
        }
    }
}

/// Policy decision for one step or for a whole plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Decision {
    Allow,
    Deny(Denial),
    NeedsClarification { questions: Vec<String> },
}

impl Decision {
    pub fn is_allow(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    pub fn is_deny(&self) -> bool {
        matches!(self, Decision::Deny(_))
    }
}

/// Per-step decisions plus the aggregate that gates the plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanDecision {
    pub steps: Vec<Decision>,
    pub aggregate: Decision,
}

/// One named denylist pattern.
#[derive(Debug, Clone)]
pub struct BlacklistRule {
    pub name: String,
    pattern: Regex,
}

impl BlacklistRule {
    pub fn new(name: impl Into<String>, pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            name: name.into(),
            pattern: Regex::new(pattern)?,
        })
    }

    pub fn matches(&self, command_line: &str) -> bool {
        self.pattern.is_match(command_line)
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }
}

/// Compiled policy data.
#[derive(Debug, Clone)]
pub struct PolicyEngine {
    blacklist: Vec<BlacklistRule>,
    sensitive_names: BTreeSet<String>,
    max_write_steps: usize,
}

impl Default for PolicyEngine {
    fn default() -> Self {
        let blacklist = DEFAULT_BLACKLIST
            .iter()
            .filter_map(|(name, pattern)| BlacklistRule::new(*name, pattern).ok())
            .collect();
        Self {
            blacklist,
            sensitive_names: DEFAULT_SENSITIVE_NAMES
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            max_write_steps: DEFAULT_MAX_WRITE_STEPS,
        }
    }
}

impl PolicyEngine {
    pub fn new(
        blacklist: Vec<BlacklistRule>,
        sensitive_names: BTreeSet<String>,
        max_write_steps: usize,
    ) -> Self {
        Self {
            blacklist,
            sensitive_names,
            max_write_steps,
        }
    }

    pub fn max_write_steps(&self) -> usize {
        self.max_write_steps
    }

    /// Decide every step and the plan as a whole.
    pub fn evaluate(&self, plan: &Plan, sandbox: &dyn PathSandbox) -> PlanDecision {
        let steps: Vec<Decision> = plan
            .steps()
            .iter()
            .enumerate()
            .map(|(index, step)| self.evaluate_step(index, step, sandbox))
            .collect();
        let aggregate = match self.check_volume(plan) {
            Some(denial) => Decision::Deny(denial),
            None => aggregate(&steps),
        };
        PlanDecision { steps, aggregate }
    }

    /// Write-volume cap. Offending index is the first write beyond the cap.
    pub fn check_volume(&self, plan: &Plan) -> Option<Denial> {
        let writes = plan.write_step_count();
        if writes <= self.max_write_steps {
            return None;
        }
        let offending = plan
            .steps()
            .iter()
            .enumerate()
            .filter(|(_, step)| step.operation.is_write())
            .nth(self.max_write_steps)
            .map(|(index, _)| index);
        Some(Denial {
            reason: DenyReason::TooManyWrites,
            detail: format!(
                "plan has {writes} write steps, limit is {}",
                self.max_write_steps
            ),
            step_index: offending,
        })
    }

    pub fn evaluate_step(&self, index: usize, step: &Step, sandbox: &dyn PathSandbox) -> Decision {
        let command_line = step.operation.command_line();
        if let Some(rule) = self.blacklist.iter().find(|r| r.matches(&command_line)) {
            return Decision::Deny(Denial {
                reason: DenyReason::BlacklistedOperation,
                detail: format!("'{command_line}' matches blacklist rule '{}'", rule.name),
                step_index: Some(index),
            });
        }

        for raw in step.operation.paths() {
            let resolved = match sandbox.resolve(raw) {
                Ok(path) => path,
                Err(why) => {
                    return Decision::Deny(Denial {
                        reason: DenyReason::SandboxEscape,
                        detail: format!("path '{raw}' rejected: {why}"),
                        step_index: Some(index),
                    });
                }
            };
            if self.is_sensitive(&resolved) {
                return Decision::Deny(Denial {
                    reason: DenyReason::SensitivePath,
                    detail: format!("path '{raw}' names a sensitive file"),
                    step_index: Some(index),
                });
            }
        }

        if let Operation::Stage {
            paths,
            allow_all: false,
        } = &step.operation
            && paths.iter().any(|p| matches!(p.trim(), "." | "*" | "./" | ":/"))
        {
            return Decision::NeedsClarification {
                questions: vec![format!(
                    "Step '{}' would stage every change in the workspace. Stage everything \
                     (use stage-all-changes) or list the paths to stage?",
                    step.id
                )],
            };
        }

        Decision::Allow
    }

    pub fn is_sensitive(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| self.sensitive_names.contains(name))
    }
}

/// Any deny denies the plan; otherwise questions are unioned; otherwise allow.
fn aggregate(steps: &[Decision]) -> Decision {
    if let Some(denial) = steps.iter().find_map(|d| match d {
        Decision::Deny(denial) => Some(denial.clone()),
        _ => None,
    }) {
        return Decision::Deny(denial);
    }

    let mut questions: Vec<String> = Vec::new();
    for decision in steps {
        if let Decision::NeedsClarification { questions: qs } = decision {
            for q in qs {
                if !questions.contains(q) {
                    questions.push(q.clone());
                }
            }
        }
    }
    if !questions.is_empty() {
        return Decision::NeedsClarification { questions };
    }
    Decision::Allow
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::risk::RiskTable;
    use crate::core::validator::{Validation, validate_plan};
    use serde_json::{Value, json};

    /// Lexical sandbox rooted at `/ws`, good enough for pure policy tests.
    struct FakeSandbox;

    impl PathSandbox for FakeSandbox {
        fn resolve(&self, raw: &str) -> Result<PathBuf, String> {
            let mut resolved = PathBuf::from("/ws");
            for part in raw.split('/') {
                match part {
                    "" | "." => {}
                    ".." => {
                        if !resolved.pop() || !resolved.starts_with("/ws") {
                            return Err("escapes workspace".to_string());
                        }
                    }
                    other => resolved.push(other),
                }
            }
            if raw.starts_with('/') && !raw.starts_with("/ws") {
                return Err("absolute path outside workspace".to_string());
            }
            if !resolved.starts_with("/ws") {
                return Err("escapes workspace".to_string());
            }
            Ok(resolved)
        }
    }

    fn plan(doc: Value) -> Plan {
        match validate_plan(&doc).expect("valid") {
            Validation::Ready(plan) => RiskTable::default().assess(plan),
            Validation::NeedsClarification(q) => panic!("unexpected clarification {q:?}"),
        }
    }

    fn deny_reason(decision: &Decision) -> Option<DenyReason> {
        match decision {
            Decision::Deny(denial) => Some(denial.reason),
            _ => None,
        }
    }

    #[test]
    fn hard_reset_is_blacklisted() {
        let plan = plan(json!({"steps": [{"operation": "reset", "args": {"mode": "--hard"}}]}));
        let decision = PolicyEngine::default().evaluate(&plan, &FakeSandbox);
        assert_eq!(
            deny_reason(&decision.aggregate),
            Some(DenyReason::BlacklistedOperation)
        );
    }

    #[test]
    fn blacklist_applies_at_any_position() {
        let plan = plan(json!({"steps": [
            {"operation": "status"},
            {"operation": "stage-all-changes"},
            {"operation": "push", "args": {"remote": "origin", "branch": "main", "force": true}}
        ]}));
        let decision = PolicyEngine::default().evaluate(&plan, &FakeSandbox);
        match &decision.aggregate {
            Decision::Deny(denial) => {
                assert_eq!(denial.reason, DenyReason::BlacklistedOperation);
                assert_eq!(denial.step_index, Some(2));
            }
            other => panic!("expected deny, got {other:?}"),
        }
        assert!(decision.steps[0].is_allow());
    }

    #[test]
    fn forced_push_refspec_is_blacklisted() {
        let plan = plan(json!({"steps": [
            {"operation": "push", "args": {"remote": "origin", "branch": "+main"}}
        ]}));
        let decision = PolicyEngine::default().evaluate(&plan, &FakeSandbox);
        assert_eq!(
            deny_reason(&decision.aggregate),
            Some(DenyReason::BlacklistedOperation)
        );
    }

    #[test]
    fn soft_reset_and_plain_push_are_allowed() {
        let plan = plan(json!({"steps": [
            {"operation": "reset", "args": {"mode": "soft", "target": "HEAD~1"}},
            {"operation": "push", "args": {"remote": "origin", "branch": "feature"}}
        ]}));
        let decision = PolicyEngine::default().evaluate(&plan, &FakeSandbox);
        assert!(decision.aggregate.is_allow(), "{:?}", decision.aggregate);
    }

    #[test]
    fn parent_traversal_is_sandbox_escape() {
        let plan = plan(json!({"steps": [
            {"operation": "read-file", "args": {"path": "../../etc/passwd"}}
        ]}));
        let decision = PolicyEngine::default().evaluate(&plan, &FakeSandbox);
        assert_eq!(
            deny_reason(&decision.aggregate),
            Some(DenyReason::SandboxEscape)
        );
    }

    #[test]
    fn sensitive_file_is_denied() {
        let plan = plan(json!({"steps": [
            {"operation": "read-file", "args": {"path": "config/.env"}}
        ]}));
        let decision = PolicyEngine::default().evaluate(&plan, &FakeSandbox);
        assert_eq!(
            deny_reason(&decision.aggregate),
            Some(DenyReason::SensitivePath)
        );
    }

    #[test]
    fn too_many_writes_is_denied_with_offending_index() {
        let steps: Vec<Value> = (0..11)
            .map(|i| json!({"operation": "write-file", "args": {"path": format!("f{i}.txt"), "content": "x"}}))
            .collect();
        let plan = plan(json!({"steps": steps}));
        let decision = PolicyEngine::default().evaluate(&plan, &FakeSandbox);
        match &decision.aggregate {
            Decision::Deny(denial) => {
                assert_eq!(denial.reason, DenyReason::TooManyWrites);
                assert_eq!(denial.step_index, Some(10));
            }
            other => panic!("expected deny, got {other:?}"),
        }
    }

    #[test]
    fn reads_do_not_count_toward_write_cap() {
        let mut steps: Vec<Value> = (0..10)
            .map(|i| json!({"operation": "write-file", "args": {"path": format!("f{i}.txt"), "content": "x"}}))
            .collect();
        steps.push(json!({"operation": "status"}));
        let plan = plan(json!({"steps": steps}));
        let decision = PolicyEngine::default().evaluate(&plan, &FakeSandbox);
        assert!(decision.aggregate.is_allow());
    }

    #[test]
    fn wide_staging_needs_clarification() {
        let plan = plan(json!({"steps": [
            {"id": "s", "operation": "stage", "args": {"paths": ["."]}}
        ]}));
        let decision = PolicyEngine::default().evaluate(&plan, &FakeSandbox);
        match decision.aggregate {
            Decision::NeedsClarification { questions } => assert_eq!(questions.len(), 1),
            other => panic!("expected clarification, got {other:?}"),
        }
    }

    #[test]
    fn deny_wins_over_clarification() {
        let plan = plan(json!({"steps": [
            {"operation": "stage", "args": {"paths": ["."]}},
            {"operation": "reset", "args": {"mode": "hard"}}
        ]}));
        let decision = PolicyEngine::default().evaluate(&plan, &FakeSandbox);
        assert!(decision.aggregate.is_deny());
    }

    #[test]
    fn custom_blacklist_rule_applies() {
        let engine = PolicyEngine::new(
            vec![BlacklistRule::new("no-merge", r"^merge\b").expect("rule")],
            BTreeSet::new(),
            DEFAULT_MAX_WRITE_STEPS,
        );
        let plan = plan(json!({"steps": [{"operation": "merge", "args": {"branch": "dev"}}]}));
        let decision = engine.evaluate(&plan, &FakeSandbox);
        assert_eq!(
            deny_reason(&decision.aggregate),
            Some(DenyReason::BlacklistedOperation)
        );
    }

    #[test]
    fn default_blacklist_patterns_compile() {
        assert_eq!(
            PolicyEngine::default().blacklist.len(),
            DEFAULT_BLACKLIST.len()
        );
    }

    #[test]
    fn deny_reason_serializes_as_code() {
        let value = serde_json::to_value(DenyReason::SandboxEscape).expect("serialize");
        assert_eq!(value, json!("sandbox-escape"));
    }
}
