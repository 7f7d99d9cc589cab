//! Orchestrator run states and their legal transitions.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunState {
    Received,
    Validated,
    RiskAssessed,
    NeedsClarification,
    Blocked,
    DryRunReady,
    DryRunDone,
    AwaitingConfirmation,
    Executing,
    Completed,
    Failed,
}

impl RunState {
    pub fn as_str(self) -> &'static str {
        match self {
            RunState::Received => "received",
            RunState::Validated => "validated",
            RunState::RiskAssessed => "risk-assessed",
            RunState::NeedsClarification => "needs-clarification",
            RunState::Blocked => "blocked",
            RunState::DryRunReady => "dry-run-ready",
            RunState::DryRunDone => "dry-run-done",
            RunState::AwaitingConfirmation => "awaiting-confirmation",
            RunState::Executing => "executing",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
        }
    }

    /// States an invocation may end in.
    ///
    /// `DryRunDone` ends an invocation that had no (valid) confirmation;
    /// `NeedsClarification` hands questions back to the caller.
    pub fn is_final(self) -> bool {
        matches!(
            self,
            RunState::NeedsClarification
                | RunState::Blocked
                | RunState::DryRunDone
                | RunState::Completed
                | RunState::Failed
        )
    }

    pub fn can_transition_to(self, next: RunState) -> bool {
        use RunState::{
            AwaitingConfirmation, Blocked, Completed, DryRunDone, DryRunReady, Executing, Failed,
            NeedsClarification, Received, RiskAssessed, Validated,
        };
        matches!(
            (self, next),
            (Received, Validated | NeedsClarification | Failed)
                | (Validated, RiskAssessed)
                | (RiskAssessed, NeedsClarification | Blocked | DryRunReady)
                | (DryRunReady, DryRunDone | Failed)
                | (DryRunDone, AwaitingConfirmation | Executing)
                | (AwaitingConfirmation, Executing | DryRunDone)
                | (Executing, Completed | Failed)
        )
    }
}
