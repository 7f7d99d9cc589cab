//! Static risk classification.
//!
//! Base levels come from a table keyed by operation name (overridable from
//! config); argument-shape rules can only raise a level. Unknown operations
//! are always `High`.

use std::collections::BTreeMap;

use tracing::warn;

use crate::core::plan::{Capability, Operation, Plan, ResetMode, RiskLevel, capability_of};

const BUILTIN: &[(&str, RiskLevel)] = &[
    ("status", RiskLevel::Low),
    ("diff", RiskLevel::Low),
    ("log", RiskLevel::Low),
    ("show", RiskLevel::Low),
    ("list-branches", RiskLevel::Low),
    ("read-file", RiskLevel::Low),
    ("list-files", RiskLevel::Low),
    ("stage", RiskLevel::Medium),
    ("stage-all-changes", RiskLevel::Medium),
    ("commit", RiskLevel::Medium),
    ("switch-branch", RiskLevel::Medium),
    ("create-branch", RiskLevel::Medium),
    ("delete-branch", RiskLevel::High),
    ("merge", RiskLevel::High),
    ("stash-push", RiskLevel::Medium),
    ("stash-pop", RiskLevel::High),
    ("reset", RiskLevel::Medium),
    ("push", RiskLevel::High),
    ("write-file", RiskLevel::High),
];

/// Operation name -> base risk level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RiskTable {
    base: BTreeMap<String, RiskLevel>,
}

impl Default for RiskTable {
    fn default() -> Self {
        Self {
            base: BUILTIN
                .iter()
                .map(|(name, level)| ((*name).to_string(), *level))
                .collect(),
        }
    }
}

impl RiskTable {
    /// Built-in table with per-operation overrides applied.
    ///
    /// Fails on any override naming an operation the plan model does not know,
    /// or lowering a write operation to `low` (which would skip confirmation).
    pub fn with_overrides(overrides: &BTreeMap<String, RiskLevel>) -> Result<Self, String> {
        let mut table = Self::default();
        for (name, level) in overrides {
            match capability_of(name) {
                None => return Err(format!("risk override for unknown operation '{name}'")),
                Some(Capability::Write) if *level == RiskLevel::Low => {
                    return Err(format!(
                        "risk override cannot lower write operation '{name}' to low"
                    ));
                }
                Some(_) => {}
            }
            table.base.insert(name.clone(), *level);
        }
        Ok(table)
    }

    /// Classify one operation. Pure and deterministic.
    pub fn classify(&self, operation: &Operation) -> RiskLevel {
        if matches!(operation, Operation::Unknown { .. }) {
            return RiskLevel::High;
        }
        let base = self
            .base
            .get(operation.name())
            .copied()
            .unwrap_or(RiskLevel::High);
        base.max(shape_floor(operation))
    }

    /// Assign a risk level to every step, consuming the validated plan.
    pub fn assess(&self, mut plan: Plan) -> Plan {
        for step in plan.steps_mut() {
            let level = self.classify(&step.operation);
            if let Some(declared) = step.declared_risk
                && declared < level
            {
                warn!(
                    step = %step.id,
                    declared = declared.as_str(),
                    classified = level.as_str(),
                    "planner under-declared step risk"
                );
            }
            step.risk = Some(level);
        }
        plan
    }
}

/// Minimum level implied by argument shape.
fn shape_floor(operation: &Operation) -> RiskLevel {
    match operation {
        Operation::Commit { amend: true, .. }
        | Operation::DeleteBranch { force: true, .. }
        | Operation::Push { force: true, .. } => RiskLevel::High,
        Operation::Reset {
            mode: Some(mode), ..
        } if ResetMode::parse(mode) == Some(ResetMode::Hard) => RiskLevel::High,
        Operation::SwitchBranch { create: true, .. } => RiskLevel::Medium,
        _ => RiskLevel::Low,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, json};

    fn op(name: &str, args: serde_json::Value) -> Operation {
        Operation::from_parts(name, args.as_object().cloned().unwrap_or_default()).expect("op")
    }

    #[test]
    fn read_operations_are_low() {
        let table = RiskTable::default();
        assert_eq!(table.classify(&op("status", json!({}))), RiskLevel::Low);
        assert_eq!(
            table.classify(&op("read-file", json!({"path": "a"}))),
            RiskLevel::Low
        );
    }

    #[test]
    fn commit_amend_is_high() {
        let table = RiskTable::default();
        assert_eq!(
            table.classify(&op("commit", json!({"message": "m"}))),
            RiskLevel::Medium
        );
        assert_eq!(
            table.classify(&op("commit", json!({"message": "m", "amend": true}))),
            RiskLevel::High
        );
    }

    #[test]
    fn hard_reset_is_high() {
        let table = RiskTable::default();
        assert_eq!(
            table.classify(&op("reset", json!({"mode": "--soft"}))),
            RiskLevel::Medium
        );
        assert_eq!(
            table.classify(&op("reset", json!({"mode": "hard"}))),
            RiskLevel::High
        );
    }

    #[test]
    fn unknown_operation_is_high_even_with_empty_args() {
        let table = RiskTable::default();
        let unknown = Operation::Unknown {
            name: "noop".to_string(),
            args: Map::new(),
        };
        assert_eq!(table.classify(&unknown), RiskLevel::High);
    }

    #[test]
    fn overrides_replace_base_level() {
        let overrides = BTreeMap::from([
            ("log".to_string(), RiskLevel::Medium),
            ("write-file".to_string(), RiskLevel::Medium),
        ]);
        let table = RiskTable::with_overrides(&overrides).expect("table");
        assert_eq!(table.classify(&op("log", json!({}))), RiskLevel::Medium);
        assert_eq!(
            table.classify(&op("write-file", json!({"path": "a", "content": ""}))),
            RiskLevel::Medium
        );
    }

    #[test]
    fn shape_rules_raise_above_override() {
        let overrides = BTreeMap::from([("push".to_string(), RiskLevel::Medium)]);
        let table = RiskTable::with_overrides(&overrides).expect("table");
        assert_eq!(
            table.classify(&op("push", json!({"remote": "origin"}))),
            RiskLevel::Medium
        );
        assert_eq!(
            table.classify(&op("push", json!({"remote": "origin", "force": true}))),
            RiskLevel::High
        );
    }

    #[test]
    fn override_cannot_lower_write_to_low() {
        let overrides = BTreeMap::from([("commit".to_string(), RiskLevel::Low)]);
        let err = RiskTable::with_overrides(&overrides).unwrap_err();
        assert!(err.contains("commit"));
    }

    #[test]
    fn override_for_unknown_operation_fails() {
        let overrides = BTreeMap::from([("comit".to_string(), RiskLevel::Low)]);
        let err = RiskTable::with_overrides(&overrides).unwrap_err();
        assert!(err.contains("comit"));
    }

    #[test]
    fn classification_is_deterministic() {
        let table = RiskTable::default();
        let step = op("push", json!({"remote": "origin", "force": true}));
        let first = table.classify(&step);
        for _ in 0..10 {
            assert_eq!(table.classify(&step), first);
        }
    }
}
