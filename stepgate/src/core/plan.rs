//! Typed plan model.
//!
//! A [`Plan`] is produced once by the validator from an untrusted planner
//! document and is immutable afterwards. Each [`Step`] carries a tagged
//! [`Operation`] with a fixed field set, so downstream stages never look at
//! loosely typed argument maps.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Ordered risk level. `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }

    /// Medium and high steps need an explicit confirmation token.
    pub fn requires_confirmation(self) -> bool {
        self >= RiskLevel::Medium
    }
}

/// Whether an operation observes or mutates the workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Read,
    Write,
}

/// Mode a `git reset` step asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResetMode {
    Soft,
    Mixed,
    Hard,
}

impl ResetMode {
    pub fn flag(self) -> &'static str {
        match self {
            ResetMode::Soft => "--soft",
            ResetMode::Mixed => "--mixed",
            ResetMode::Hard => "--hard",
        }
    }

    /// Accepts `hard` and `--hard` spellings.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().trim_start_matches("--") {
            "soft" => Some(ResetMode::Soft),
            "mixed" => Some(ResetMode::Mixed),
            "hard" => Some(ResetMode::Hard),
            _ => None,
        }
    }
}

/// Known operations and their statically checked arguments.
///
/// Arguments the validator may need to ask about (a commit message, a branch
/// name) are `Option` so that their absence becomes a clarification question
/// instead of a parse failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "operation", content = "args", rename_all = "kebab-case", deny_unknown_fields)]
pub enum Operation {
    Status {},
    Diff {
        #[serde(default)]
        staged: bool,
        #[serde(default)]
        paths: Vec<String>,
    },
    Log {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        limit: Option<u32>,
    },
    Show {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rev: Option<String>,
    },
    ListBranches {},
    ReadFile {
        path: String,
    },
    ListFiles {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        dir: Option<String>,
    },
    Stage {
        #[serde(default)]
        paths: Vec<String>,
        #[serde(default)]
        allow_all: bool,
    },
    StageAllChanges {},
    Commit {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(default)]
        amend: bool,
    },
    SwitchBranch {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        branch: Option<String>,
        #[serde(default)]
        create: bool,
    },
    CreateBranch {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<String>,
    },
    DeleteBranch {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default)]
        force: bool,
    },
    Merge {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        branch: Option<String>,
    },
    StashPush {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    StashPop {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        index: Option<u32>,
    },
    Reset {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mode: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<String>,
    },
    Push {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        remote: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        branch: Option<String>,
        #[serde(default)]
        force: bool,
    },
    WriteFile {
        path: String,
        content: String,
    },
    /// Operation name the plan model does not know. Never executable.
    #[serde(skip)]
    Unknown { name: String, args: Map<String, Value> },
}

/// Every operation name the model understands, in table order.
pub const KNOWN_OPERATIONS: &[&str] = &[
    "status",
    "diff",
    "log",
    "show",
    "list-branches",
    "read-file",
    "list-files",
    "stage",
    "stage-all-changes",
    "commit",
    "switch-branch",
    "create-branch",
    "delete-branch",
    "merge",
    "stash-push",
    "stash-pop",
    "reset",
    "push",
    "write-file",
];

const READ_OPERATIONS: &[&str] = &[
    "status",
    "diff",
    "log",
    "show",
    "list-branches",
    "read-file",
    "list-files",
];

pub fn is_known_operation(name: &str) -> bool {
    KNOWN_OPERATIONS.contains(&name)
}

/// Capability of a known operation by name.
pub fn capability_of(name: &str) -> Option<Capability> {
    if READ_OPERATIONS.contains(&name) {
        Some(Capability::Read)
    } else if is_known_operation(name) {
        Some(Capability::Write)
    } else {
        None
    }
}

impl Operation {
    /// Build a typed operation from a name and raw argument map.
    ///
    /// Unknown names produce [`Operation::Unknown`]; known names with
    /// malformed arguments return the deserializer's message.
    pub fn from_parts(name: &str, args: Map<String, Value>) -> Result<Self, String> {
        if !is_known_operation(name) {
            return Ok(Operation::Unknown {
                name: name.to_string(),
                args,
            });
        }
        let mut tagged = Map::new();
        tagged.insert("operation".to_string(), Value::String(name.to_string()));
        tagged.insert("args".to_string(), Value::Object(args));
        serde_json::from_value(Value::Object(tagged)).map_err(|err| err.to_string())
    }

    pub fn name(&self) -> &str {
        match self {
            Operation::Status {} => "status",
            Operation::Diff { .. } => "diff",
            Operation::Log { .. } => "log",
            Operation::Show { .. } => "show",
            Operation::ListBranches {} => "list-branches",
            Operation::ReadFile { .. } => "read-file",
            Operation::ListFiles { .. } => "list-files",
            Operation::Stage { .. } => "stage",
            Operation::StageAllChanges {} => "stage-all-changes",
            Operation::Commit { .. } => "commit",
            Operation::SwitchBranch { .. } => "switch-branch",
            Operation::CreateBranch { .. } => "create-branch",
            Operation::DeleteBranch { .. } => "delete-branch",
            Operation::Merge { .. } => "merge",
            Operation::StashPush { .. } => "stash-push",
            Operation::StashPop { .. } => "stash-pop",
            Operation::Reset { .. } => "reset",
            Operation::Push { .. } => "push",
            Operation::WriteFile { .. } => "write-file",
            Operation::Unknown { name, .. } => name,
        }
    }

    /// Unknown operations count as writes so they can never slip under the cap.
    pub fn capability(&self) -> Capability {
        capability_of(self.name()).unwrap_or(Capability::Write)
    }

    pub fn is_write(&self) -> bool {
        self.capability() == Capability::Write
    }

    /// Path-valued arguments subject to the workspace sandbox.
    pub fn paths(&self) -> Vec<&str> {
        match self {
            Operation::Diff { paths, .. } | Operation::Stage { paths, .. } => {
                paths.iter().map(String::as_str).collect()
            }
            Operation::ReadFile { path } | Operation::WriteFile { path, .. } => vec![path.as_str()],
            Operation::ListFiles { dir } => dir.as_deref().into_iter().collect(),
            Operation::Unknown { args, .. } => ["path", "dir", "file"]
                .iter()
                .filter_map(|key| args.get(*key).and_then(Value::as_str))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Canonical git-like command line, used for blacklist matching and audit.
    pub fn command_line(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        match self {
            Operation::Status {} => parts.push("status".into()),
            Operation::Diff { staged, paths } => {
                parts.push("diff".into());
                if *staged {
                    parts.push("--staged".into());
                }
                if !paths.is_empty() {
                    parts.push("--".into());
                    parts.extend(paths.iter().cloned());
                }
            }
            Operation::Log { limit } => {
                parts.push("log".into());
                if let Some(limit) = limit {
                    parts.push(format!("-{limit}"));
                }
            }
            Operation::Show { rev } => {
                parts.push("show".into());
                parts.push(rev.clone().unwrap_or_else(|| "HEAD".into()));
            }
            Operation::ListBranches {} => parts.push("branch --list".into()),
            Operation::ReadFile { path } => {
                parts.push("read-file".into());
                parts.push(path.clone());
            }
            Operation::ListFiles { dir } => {
                parts.push("list-files".into());
                parts.push(dir.clone().unwrap_or_else(|| ".".into()));
            }
            Operation::Stage { paths, .. } => {
                parts.push("add --".into());
                parts.extend(paths.iter().cloned());
            }
            Operation::StageAllChanges {} => parts.push("add -A".into()),
            Operation::Commit { message, amend } => {
                parts.push("commit".into());
                if *amend {
                    parts.push("--amend".into());
                }
                if let Some(message) = message {
                    parts.push("-m".into());
                    parts.push(quote(message));
                }
            }
            Operation::SwitchBranch { branch, create } => {
                parts.push("switch".into());
                if *create {
                    parts.push("-c".into());
                }
                parts.extend(branch.iter().cloned());
            }
            Operation::CreateBranch { name, from } => {
                parts.push("branch".into());
                parts.extend(name.iter().cloned());
                parts.extend(from.iter().cloned());
            }
            Operation::DeleteBranch { name, force } => {
                parts.push("branch".into());
                parts.push(if *force { "-D" } else { "-d" }.into());
                parts.extend(name.iter().cloned());
            }
            Operation::Merge { branch } => {
                parts.push("merge".into());
                parts.extend(branch.iter().cloned());
            }
            Operation::StashPush { message } => {
                parts.push("stash push".into());
                if let Some(message) = message {
                    parts.push("-m".into());
                    parts.push(quote(message));
                }
            }
            Operation::StashPop { index } => {
                parts.push(format!("stash pop stash@{{{}}}", index.unwrap_or(0)));
            }
            Operation::Reset { mode, target } => {
                parts.push("reset".into());
                if let Some(mode) = mode {
                    match ResetMode::parse(mode) {
                        Some(parsed) => parts.push(parsed.flag().into()),
                        None => parts.push(mode.clone()),
                    }
                }
                parts.push(target.clone().unwrap_or_else(|| "HEAD".into()));
            }
            Operation::Push {
                remote,
                branch,
                force,
            } => {
                parts.push("push".into());
                if *force {
                    parts.push("--force".into());
                }
                parts.extend(remote.iter().cloned());
                parts.extend(branch.iter().cloned());
            }
            Operation::WriteFile { path, .. } => {
                parts.push("write-file".into());
                parts.push(path.clone());
            }
            Operation::Unknown { name, args } => {
                parts.push(name.clone());
                for (key, value) in args {
                    match value {
                        Value::String(s) => parts.push(format!("{key}={s}")),
                        other => parts.push(format!("{key}={other}")),
                    }
                }
            }
        }
        parts.join(" ")
    }

    /// Arguments to send over the tool protocol.
    pub fn arguments(&self) -> Value {
        match self {
            Operation::Unknown { args, .. } => Value::Object(args.clone()),
            known => serde_json::to_value(known)
                .ok()
                .and_then(|tagged| tagged.get("args").cloned())
                .unwrap_or_else(|| Value::Object(Map::new())),
        }
    }
}

fn quote(raw: &str) -> String {
    format!("\"{}\"", raw.replace('"', "\\\""))
}

/// One validated step. Owned exclusively by its [`Plan`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Step {
    pub id: String,
    pub operation: Operation,
    pub description: String,
    /// Level the planner claimed. Kept for audit only.
    pub declared_risk: Option<RiskLevel>,
    /// Level assigned by the classifier; `None` until classification.
    pub risk: Option<RiskLevel>,
}

impl Step {
    /// Classified risk, falling back to `High` if classification never ran.
    pub fn effective_risk(&self) -> RiskLevel {
        self.risk.unwrap_or(RiskLevel::High)
    }
}

/// Validated, ordered, non-empty sequence of steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Plan {
    pub summary: String,
    steps: Vec<Step>,
}

impl Plan {
    /// Only the validator and the classifier construct plans.
    pub(crate) fn new(summary: String, steps: Vec<Step>) -> Self {
        Self { summary, steps }
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn write_step_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|step| step.operation.is_write())
            .count()
    }

    pub fn has_writes(&self) -> bool {
        self.write_step_count() > 0
    }

    /// Highest classified risk across steps.
    pub fn max_risk(&self) -> RiskLevel {
        self.steps
            .iter()
            .map(Step::effective_risk)
            .max()
            .unwrap_or(RiskLevel::Low)
    }

    pub(crate) fn steps_mut(&mut self) -> &mut [Step] {
        &mut self.steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn risk_levels_are_ordered() {
        assert!(RiskLevel::Low < RiskLevel::Medium);
        assert!(RiskLevel::Medium < RiskLevel::High);
        assert!(!RiskLevel::Low.requires_confirmation());
        assert!(RiskLevel::High.requires_confirmation());
    }

    #[test]
    fn known_operation_parses_into_variant() {
        let op = Operation::from_parts("commit", args(json!({"message": "fix"}))).expect("parse");
        assert_eq!(
            op,
            Operation::Commit {
                message: Some("fix".to_string()),
                amend: false
            }
        );
        assert!(op.is_write());
    }

    #[test]
    fn unknown_operation_becomes_unknown_variant() {
        let op = Operation::from_parts("rm-rf", args(json!({"path": "/"}))).expect("parse");
        assert!(matches!(op, Operation::Unknown { .. }));
        assert_eq!(op.name(), "rm-rf");
        assert!(op.is_write());
        assert_eq!(op.paths(), vec!["/"]);
    }

    #[test]
    fn unexpected_argument_is_rejected() {
        let err = Operation::from_parts("read-file", args(json!({"path": "a", "mode": "x"})))
            .unwrap_err();
        assert!(err.contains("mode"), "unexpected message: {err}");
    }

    #[test]
    fn missing_required_argument_is_rejected() {
        let err = Operation::from_parts("write-file", args(json!({"path": "a.txt"}))).unwrap_err();
        assert!(err.contains("content"), "unexpected message: {err}");
    }

    #[test]
    fn reset_command_line_normalizes_mode() {
        let op = Operation::from_parts("reset", args(json!({"mode": "hard"}))).expect("parse");
        assert_eq!(op.command_line(), "reset --hard HEAD");
        let op = Operation::from_parts("reset", args(json!({"mode": "--hard"}))).expect("parse");
        assert_eq!(op.command_line(), "reset --hard HEAD");
    }

    #[test]
    fn push_command_line_includes_force_flag() {
        let op = Operation::from_parts(
            "push",
            args(json!({"remote": "origin", "branch": "main", "force": true})),
        )
        .expect("parse");
        assert_eq!(op.command_line(), "push --force origin main");
    }

    #[test]
    fn arguments_round_trip_to_protocol_shape() {
        let op = Operation::from_parts("stage", args(json!({"paths": ["a.txt"]}))).expect("parse");
        assert_eq!(op.arguments(), json!({"paths": ["a.txt"], "allow_all": false}));
        let op = Operation::from_parts("status", Map::new()).expect("parse");
        assert_eq!(op.arguments(), json!({}));
    }

    #[test]
    fn absent_optional_arguments_are_omitted() {
        let op = Operation::from_parts("push", args(json!({"remote": "origin"}))).expect("parse");
        assert_eq!(op.arguments(), json!({"remote": "origin", "force": false}));
    }
}
