//! Plan document validation: schema conformance, typed argument parsing,
//! step id uniqueness, and clarification detection.
//!
//! Validation is side-effect free. A plan that is structurally sound but
//! lacks an argument only the user can supply (a commit message, a branch
//! name) is not an error: it yields [`Validation::NeedsClarification`].

use std::collections::HashSet;
use std::sync::LazyLock;

use jsonschema::{Draft, Validator};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::core::plan::{Operation, Plan, ResetMode, RiskLevel, Step};
use crate::error::ValidationError;

const PLAN_SCHEMA: &str = include_str!("../../schemas/plan.schema.json");

/// Outcome of validating a plan document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    /// Structurally valid plan, ready for risk classification.
    Ready(Plan),
    /// Plan cannot run until these questions are answered. No step executes.
    NeedsClarification(Vec<String>),
}

#[derive(Debug, Deserialize)]
struct RawPlan {
    #[serde(default)]
    summary: String,
    steps: Vec<RawStep>,
}

#[derive(Debug, Deserialize)]
struct RawStep {
    #[serde(default)]
    id: Option<String>,
    operation: String,
    #[serde(default)]
    args: Map<String, Value>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    risk: Option<RiskLevel>,
}

struct PlanSchemas {
    plan: Validator,
    step: Validator,
}

static SCHEMAS: LazyLock<Result<PlanSchemas, String>> = LazyLock::new(compile_schemas);

fn compile_schemas() -> Result<PlanSchemas, String> {
    let plan_schema: Value =
        serde_json::from_str(PLAN_SCHEMA).map_err(|err| format!("parse plan schema: {err}"))?;
    let mut step_schema = plan_schema
        .pointer("/$defs/step")
        .cloned()
        .ok_or_else(|| "plan schema is missing $defs/step".to_string())?;
    if let Some(obj) = step_schema.as_object_mut() {
        obj.insert(
            "$schema".to_string(),
            Value::String("https://json-schema.org/draft/2020-12/schema".to_string()),
        );
    }
    let build = |schema: &Value| {
        jsonschema::options()
            .with_draft(Draft::Draft202012)
            .build(schema)
            .map_err(|err| format!("compile plan schema: {err}"))
    };
    Ok(PlanSchemas {
        plan: build(&plan_schema)?,
        step: build(&step_schema)?,
    })
}

/// Parse raw JSON text and validate it.
pub fn parse_plan(raw: &str) -> Result<Validation, ValidationError> {
    let doc: Value = serde_json::from_str(raw)
        .map_err(|err| ValidationError::new("plan", format!("not valid JSON: {err}")))?;
    validate_plan(&doc)
}

/// Validate a planner document into a typed [`Plan`] or clarification request.
pub fn validate_plan(doc: &Value) -> Result<Validation, ValidationError> {
    validate_schema(doc)?;
    let raw: RawPlan = serde_json::from_value(doc.clone())
        .map_err(|err| ValidationError::new("plan", err.to_string()))?;

    if raw.steps.is_empty() {
        return Err(ValidationError::new(
            "steps",
            "plan must contain at least one step",
        ));
    }

    let mut seen = HashSet::new();
    let mut steps = Vec::with_capacity(raw.steps.len());
    let mut questions = Vec::new();

    for (index, raw_step) in raw.steps.into_iter().enumerate() {
        let id = raw_step
            .id
            .unwrap_or_else(|| format!("step-{}", index + 1));
        if !seen.insert(id.clone()) {
            return Err(ValidationError::new(
                format!("steps[{index}].id"),
                format!("duplicate step id '{id}'"),
            ));
        }

        let operation = Operation::from_parts(&raw_step.operation, raw_step.args)
            .map_err(|message| ValidationError::new(format!("steps[{index}].args"), message))?;
        if let Operation::Unknown { name, .. } = &operation {
            return Err(ValidationError::new(
                format!("steps[{index}].operation"),
                format!("unknown operation '{name}'"),
            ));
        }
        check_argument_values(index, &operation)?;
        questions.extend(clarification_questions(&id, &operation));

        steps.push(Step {
            id,
            operation,
            description: raw_step.description,
            declared_risk: raw_step.risk,
            risk: None,
        });
    }

    if !questions.is_empty() {
        return Ok(Validation::NeedsClarification(questions));
    }
    Ok(Validation::Ready(Plan::new(raw.summary, steps)))
}

/// Schema check. Step-level failures are attributed to `steps[i]`.
fn validate_schema(doc: &Value) -> Result<(), ValidationError> {
    let schemas = SCHEMAS
        .as_ref()
        .map_err(|err| ValidationError::new("$schema", err.clone()))?;
    if schemas.plan.is_valid(doc) {
        return Ok(());
    }

    if let Some(steps) = doc.get("steps").and_then(Value::as_array) {
        for (index, step) in steps.iter().enumerate() {
            let messages: Vec<String> = schemas
                .step
                .iter_errors(step)
                .map(|err| err.to_string())
                .collect();
            if !messages.is_empty() {
                return Err(ValidationError::new(
                    format!("steps[{index}]"),
                    messages.join("; "),
                ));
            }
        }
    }

    let messages: Vec<String> = schemas
        .plan
        .iter_errors(doc)
        .map(|err| err.to_string())
        .collect();
    let field = if doc.get("steps").is_some() {
        "steps"
    } else {
        "plan"
    };
    Err(ValidationError::new(field, messages.join("; ")))
}

/// Value-level checks serde cannot express.
fn check_argument_values(index: usize, operation: &Operation) -> Result<(), ValidationError> {
    match operation {
        Operation::Reset {
            mode: Some(mode), ..
        } if ResetMode::parse(mode).is_none() => Err(ValidationError::new(
            format!("steps[{index}].args.mode"),
            format!("unsupported reset mode '{mode}' (expected soft, mixed or hard)"),
        )),
        Operation::ReadFile { path } | Operation::WriteFile { path, .. }
            if path.trim().is_empty() =>
        {
            Err(ValidationError::new(
                format!("steps[{index}].args.path"),
                "path must not be empty",
            ))
        }
        _ => Ok(()),
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().is_none_or(|s| s.trim().is_empty())
}

/// Questions for arguments only the user can provide.
fn clarification_questions(id: &str, operation: &Operation) -> Vec<String> {
    let question = match operation {
        Operation::Commit { message, .. } if is_blank(message) => {
            format!("What commit message should step '{id}' use?")
        }
        Operation::SwitchBranch { branch, .. } if is_blank(branch) => {
            format!("Which branch should step '{id}' switch to?")
        }
        Operation::CreateBranch { name, .. } if is_blank(name) => {
            format!("What should the branch created by step '{id}' be called?")
        }
        Operation::DeleteBranch { name, .. } if is_blank(name) => {
            format!("Which branch should step '{id}' delete?")
        }
        Operation::Merge { branch } if is_blank(branch) => {
            format!("Which branch should step '{id}' merge into the current branch?")
        }
        Operation::Stage { paths, .. } if paths.is_empty() => format!(
            "Which paths should step '{id}' stage? (use stage-all-changes to stage everything)"
        ),
        _ => return Vec::new(),
    };
    vec![question]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn expect_ready(doc: Value) -> Plan {
        match validate_plan(&doc).expect("valid plan") {
            Validation::Ready(plan) => plan,
            Validation::NeedsClarification(q) => panic!("unexpected clarification: {q:?}"),
        }
    }

    #[test]
    fn accepts_minimal_plan_and_defaults_ids() {
        let plan = expect_ready(json!({
            "summary": "stage",
            "steps": [
                {"operation": "stage-all-changes"},
                {"operation": "status"}
            ]
        }));
        let ids: Vec<&str> = plan.steps().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["step-1", "step-2"]);
        assert!(plan.steps().iter().all(|s| s.risk.is_none()));
    }

    #[test]
    fn rejects_empty_plan() {
        let err = validate_plan(&json!({"steps": []})).unwrap_err();
        assert_eq!(err.field, "steps");
    }

    #[test]
    fn rejects_missing_steps_field() {
        let err = validate_plan(&json!({"summary": "x"})).unwrap_err();
        assert_eq!(err.field, "plan");
    }

    #[test]
    fn rejects_unknown_operation() {
        let err = validate_plan(&json!({
            "steps": [{"operation": "status"}, {"operation": "format-disk"}]
        }))
        .unwrap_err();
        assert_eq!(err.field, "steps[1].operation");
        assert!(err.message.contains("format-disk"));
    }

    #[test]
    fn rejects_duplicate_step_ids() {
        let err = validate_plan(&json!({
            "steps": [
                {"id": "a", "operation": "status"},
                {"id": "a", "operation": "log"}
            ]
        }))
        .unwrap_err();
        assert_eq!(err.field, "steps[1].id");
    }

    #[test]
    fn rejects_missing_required_argument() {
        let err = validate_plan(&json!({
            "steps": [{"operation": "read-file", "args": {}}]
        }))
        .unwrap_err();
        assert_eq!(err.field, "steps[0].args");
        assert!(err.message.contains("path"));
    }

    #[test]
    fn rejects_schema_violation_with_step_location() {
        let err = validate_plan(&json!({
            "steps": [{"operation": "status"}, {"operation": "log", "risk": "extreme"}]
        }))
        .unwrap_err();
        assert_eq!(err.field, "steps[1]");
    }

    #[test]
    fn rejects_unsupported_reset_mode() {
        let err = validate_plan(&json!({
            "steps": [{"operation": "reset", "args": {"mode": "--keep-everything"}}]
        }))
        .unwrap_err();
        assert_eq!(err.field, "steps[0].args.mode");
    }

    #[test]
    fn commit_without_message_needs_clarification() {
        let outcome = validate_plan(&json!({
            "steps": [{"id": "c1", "operation": "commit", "description": "commit the work"}]
        }))
        .expect("validation outcome");
        match outcome {
            Validation::NeedsClarification(questions) => {
                assert_eq!(questions.len(), 1);
                assert!(questions[0].contains("commit message"));
            }
            other => panic!("expected clarification, got {other:?}"),
        }
    }

    #[test]
    fn clarification_questions_are_collected_across_steps() {
        let outcome = validate_plan(&json!({
            "steps": [
                {"operation": "commit", "args": {"message": "  "}},
                {"operation": "switch-branch"}
            ]
        }))
        .expect("validation outcome");
        let Validation::NeedsClarification(questions) = outcome else {
            panic!("expected clarification");
        };
        assert_eq!(questions.len(), 2);
    }

    #[test]
    fn declared_risk_is_kept_but_not_trusted() {
        let plan = expect_ready(json!({
            "steps": [{"operation": "write-file", "args": {"path": "a", "content": "b"}, "risk": "low"}]
        }));
        let step = &plan.steps()[0];
        assert_eq!(step.declared_risk, Some(RiskLevel::Low));
        assert_eq!(step.risk, None);
    }

    #[test]
    fn parse_plan_reports_invalid_json() {
        let err = parse_plan("{not json").unwrap_err();
        assert_eq!(err.field, "plan");
    }
}
