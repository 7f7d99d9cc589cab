//! Stable exit codes for stepgate CLI commands.

use crate::core::state::RunState;

/// Run completed, or stopped after the preview awaiting confirmation.
pub const OK: i32 = 0;
/// Run failed, the plan was invalid, or the command itself errored.
pub const INVALID: i32 = 1;
/// Policy denied the plan.
pub const BLOCKED: i32 = 2;
/// The plan needs clarification before it can proceed.
pub const NEEDS_CLARIFICATION: i32 = 3;

/// Exit code for the final state of a run or check.
pub fn for_state(state: RunState) -> i32 {
    match state {
        RunState::Completed | RunState::DryRunDone | RunState::DryRunReady => OK,
        RunState::Blocked => BLOCKED,
        RunState::NeedsClarification => NEEDS_CLARIFICATION,
        _ => INVALID,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn final_states_map_to_distinct_codes() {
        assert_eq!(for_state(RunState::Completed), OK);
        assert_eq!(for_state(RunState::DryRunDone), OK);
        assert_eq!(for_state(RunState::Failed), INVALID);
        assert_eq!(for_state(RunState::Blocked), BLOCKED);
        assert_eq!(for_state(RunState::NeedsClarification), NEEDS_CLARIFICATION);
    }
}
