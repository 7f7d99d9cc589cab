//! Explicit session context carried between runs.

use serde::{Deserialize, Serialize};

use crate::core::outcome::ExecutionOutcome;
use crate::core::plan::{Operation, Plan};
use crate::core::state::RunState;

pub const MAX_RECENT_FILES: usize = 20;
pub const MAX_HISTORY: usize = 50;

/// What the caller's previous runs touched. Passed by `&mut` into each run;
/// never stored globally.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionContext {
    /// Most recent first.
    pub recent_files: Vec<String>,
    pub recent_branch: Option<String>,
    /// One line per finished run, oldest first.
    pub history: Vec<String>,
}

impl SessionContext {
    /// Fold a finished run into the context.
    pub fn record_run(&mut self, plan: Option<&Plan>, outcome: &ExecutionOutcome) {
        if outcome.state == RunState::Completed || outcome.partially_applied {
            for file in outcome.touched_files().into_iter().rev() {
                self.recent_files.retain(|f| f != &file);
                self.recent_files.insert(0, file);
            }
            self.recent_files.truncate(MAX_RECENT_FILES);

            if let Some(plan) = plan {
                for result in outcome.applied_steps() {
                    let Some(step) = plan.steps().get(result.index) else {
                        continue;
                    };
                    match &step.operation {
                        Operation::SwitchBranch {
                            branch: Some(branch),
                            ..
                        } => self.recent_branch = Some(branch.clone()),
                        Operation::CreateBranch {
                            name: Some(name), ..
                        } => self.recent_branch = Some(name.clone()),
                        _ => {}
                    }
                }
            }
        }

        let summary = if outcome.summary.is_empty() {
            "(no summary)"
        } else {
            outcome.summary.as_str()
        };
        self.history.push(format!(
            "{} {} {}",
            outcome.trace_id,
            outcome.state.as_str(),
            summary
        ));
        if self.history.len() > MAX_HISTORY {
            let excess = self.history.len() - MAX_HISTORY;
            self.history.drain(..excess);
        }
    }
}
