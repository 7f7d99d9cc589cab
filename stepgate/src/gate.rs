//! Confirmation gate and dry-run executor.
//!
//! The dry-run calls every write step's tool in preview mode and assembles
//! the results into a [`Preview`]. Real execution needs a
//! [`ConfirmationToken`], which is consumed by the run it is passed to.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::core::outcome::{ConfirmationStatus, Preview, StepPreview};
use crate::core::plan::Plan;
use crate::error::{CallError, ProtocolError};
use crate::protocol::client::ToolClient;
use crate::protocol::registry::CallMode;
use crate::protocol::transport::Transport;

pub const DEFAULT_CONFIRM_TOKEN: &str = "YES";

/// Caller's confirmation input for one submission.
///
/// Deliberately neither `Clone` nor `Copy`: handing it to a run moves it, so
/// a second submission needs a fresh token.
#[derive(Debug, PartialEq, Eq)]
pub struct ConfirmationToken {
    input: String,
    fingerprint: Option<String>,
}

impl ConfirmationToken {
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            fingerprint: None,
        }
    }

    /// Bind the token to a specific preview.
    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.fingerprint = Some(fingerprint.into());
        self
    }

    pub fn fingerprint(&self) -> Option<&str> {
        self.fingerprint.as_deref()
    }
}

/// Decides whether a token authorizes execution of a preview.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationGate {
    affirmative: String,
}

impl Default for ConfirmationGate {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIRM_TOKEN)
    }
}

impl ConfirmationGate {
    pub fn new(affirmative: impl Into<String>) -> Self {
        Self {
            affirmative: affirmative.into(),
        }
    }

    /// Consume `token` and judge it against `preview`.
    pub fn check(&self, token: Option<ConfirmationToken>, preview: &Preview) -> ConfirmationStatus {
        let Some(token) = token else {
            debug!("no confirmation supplied");
            return ConfirmationStatus::Missing;
        };
        if token.input.trim() != self.affirmative {
            warn!("confirmation input is not the affirmative token");
            return ConfirmationStatus::Rejected {
                reason: "confirmation input is not the affirmative token".to_string(),
            };
        }
        if let Some(expected) = token.fingerprint.as_deref()
            && !expected.eq_ignore_ascii_case(&preview.fingerprint)
        {
            warn!(
                expected,
                actual = %preview.fingerprint,
                "preview changed since it was confirmed"
            );
            return ConfirmationStatus::Rejected {
                reason: format!(
                    "preview fingerprint mismatch (confirmed {expected}, current {})",
                    preview.fingerprint
                ),
            };
        }
        info!("confirmation accepted");
        ConfirmationStatus::Accepted
    }
}

#[derive(Serialize)]
struct FingerprintInput<'a> {
    plan: &'a Plan,
    previews: &'a [StepPreview],
}

/// SHA-256 hex digest of the plan and its previews.
///
/// `serde_json` maps are ordered, so equal inputs always hash equally.
pub fn fingerprint(plan: &Plan, previews: &[StepPreview]) -> Result<String, ProtocolError> {
    digest(&FingerprintInput { plan, previews })
}

fn digest<T: Serialize>(input: &T) -> Result<String, ProtocolError> {
    let canonical = serde_json::to_vec(input).map_err(|err| ProtocolError::Malformed {
        detail: format!("cannot fingerprint preview: {err}"),
    })?;
    Ok(hex::encode(Sha256::digest(&canonical)))
}

/// A preview that did not complete.
#[derive(Debug)]
pub struct DryRunFailure {
    pub previews: Vec<StepPreview>,
    /// Failing step; `None` when every preview succeeded but the result
    /// could not be fingerprinted.
    pub step_index: Option<usize>,
    pub error: CallError,
}

/// Preview every write step in plan order.
///
/// `on_preview` observes each successful preview as it arrives. Read steps
/// are not called: they have no effect to preview.
pub fn dry_run<T, F>(
    client: &mut ToolClient<T>,
    plan: &Plan,
    mut on_preview: F,
) -> Result<Preview, DryRunFailure>
where
    T: Transport,
    F: FnMut(&StepPreview),
{
    let mut previews = Vec::new();
    for (index, step) in plan.steps().iter().enumerate() {
        if !step.operation.is_write() {
            continue;
        }
        let effect: Value = match client.call_tool(
            step.operation.name(),
            step.operation.arguments(),
            CallMode::Preview,
        ) {
            Ok(effect) => effect,
            Err(error) => {
                warn!(step = %step.id, err = %error, "preview failed");
                return Err(DryRunFailure {
                    previews,
                    step_index: Some(index),
                    error,
                });
            }
        };
        let preview = StepPreview {
            index,
            id: step.id.clone(),
            operation: step.operation.name().to_string(),
            command_line: step.operation.command_line(),
            risk: step.effective_risk(),
            effect,
        };
        on_preview(&preview);
        previews.push(preview);
    }
    let fingerprint = match fingerprint(plan, &previews) {
        Ok(fingerprint) => fingerprint,
        Err(err) => {
            warn!(err = %err, "preview fingerprint failed");
            return Err(DryRunFailure {
                previews,
                step_index: None,
                error: err.into(),
            });
        }
    };
    debug!(steps = previews.len(), %fingerprint, "dry-run complete");
    Ok(Preview {
        steps: previews,
        fingerprint,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn preview(fingerprint: &str) -> Preview {
        Preview {
            steps: Vec::new(),
            fingerprint: fingerprint.to_string(),
        }
    }

    #[test]
    fn missing_token_is_preview_only() {
        let gate = ConfirmationGate::default();
        assert_eq!(gate.check(None, &preview("abc")), ConfirmationStatus::Missing);
    }

    #[test]
    fn affirmative_token_is_accepted() {
        let gate = ConfirmationGate::default();
        let status = gate.check(Some(ConfirmationToken::new("YES")), &preview("abc"));
        assert_eq!(status, ConfirmationStatus::Accepted);
    }

    #[test]
    fn other_input_is_rejected() {
        let gate = ConfirmationGate::default();
        for input in ["yes", "no", "", "Y"] {
            let status = gate.check(Some(ConfirmationToken::new(input)), &preview("abc"));
            assert!(
                matches!(status, ConfirmationStatus::Rejected { .. }),
                "{input:?}"
            );
        }
    }

    #[test]
    fn custom_affirmative_token() {
        let gate = ConfirmationGate::new("apply");
        let status = gate.check(Some(ConfirmationToken::new("apply")), &preview("abc"));
        assert_eq!(status, ConfirmationStatus::Accepted);
    }

    #[test]
    fn fingerprint_must_match_current_preview() {
        let gate = ConfirmationGate::default();
        let token = ConfirmationToken::new("YES").with_fingerprint("abc");
        assert_eq!(
            gate.check(Some(token), &preview("ABC")),
            ConfirmationStatus::Accepted
        );
        let token = ConfirmationToken::new("YES").with_fingerprint("abc");
        assert!(matches!(
            gate.check(Some(token), &preview("def")),
            ConfirmationStatus::Rejected { .. }
        ));
    }

    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: serde::Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("not representable"))
        }
    }

    #[test]
    fn digest_failure_is_an_error_not_an_empty_hash() {
        let err = digest(&Unserializable).unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed { .. }));
        assert_ne!(
            digest(&serde_json::json!({})).expect("digest"),
            hex::encode(Sha256::digest(b""))
        );
    }

    #[test]
    fn different_plans_have_different_fingerprints() {
        let plan = |message: &str| {
            let doc = serde_json::json!({
                "summary": "s",
                "steps": [{ "operation": "commit", "args": { "message": message } }]
            });
            match crate::core::validator::validate_plan(&doc).expect("valid") {
                crate::core::validator::Validation::Ready(plan) => plan,
                other => panic!("unexpected {other:?}"),
            }
        };
        let a = fingerprint(&plan("one"), &[]).expect("fingerprint");
        let b = fingerprint(&plan("two"), &[]).expect("fingerprint");
        assert_ne!(a, b);
        assert_eq!(a, fingerprint(&plan("one"), &[]).expect("fingerprint"));
    }
}
