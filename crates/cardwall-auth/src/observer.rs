//! Observability sink for authentication runs.
//!
//! The orchestrator reports what happens through an [`AuthObserver`] instead of
//! logging itself. [`TracingObserver`] forwards everything to `tracing`.

use crate::classifier::Branch;
use crate::error::AuthFault;
use crate::idp::FlowKind;
use crate::state::{AuthenticationOutcome, ProgressState};

/// Something worth reporting during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    /// A run began.
    FlowStarted(FlowKind),
    /// A progress state was emitted.
    StateEmitted(ProgressState),
    /// A pairing key was generated.
    KeyGenerated { alias: String },
    /// Pairing key generation failed; the cause carries the error.
    KeyGenerationFailed,
    /// A pairing key was deleted after a failed run.
    KeyDeleted { alias: String },
    /// Deleting a pairing key after a failed run failed too.
    KeyDeletionFailed { alias: String },
    /// One branch of the run raised a fault.
    BranchFailed(Branch),
    /// A fault was mapped to its outcome.
    Classified(AuthenticationOutcome),
    /// The run was cancelled before it finished.
    Cancelled,
}

/// Receives run events together with the fault that caused them, if any.
pub trait AuthObserver: Send + Sync {
    fn on_event(&self, event: &AuthEvent, cause: Option<&AuthFault>);
}

/// Default observer emitting `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl AuthObserver for TracingObserver {
    fn on_event(&self, event: &AuthEvent, cause: Option<&AuthFault>) {
        match (event, cause) {
            (AuthEvent::FlowStarted(flow), _) => {
                tracing::info!(flow = %flow, card = flow.uses_card(), "authentication flow started");
            }
            (AuthEvent::StateEmitted(state), _) => {
                tracing::debug!(state = %state, "progress");
            }
            (AuthEvent::KeyGenerated { alias }, _) => {
                tracing::debug!(alias = %alias, "secure element key generated");
            }
            (AuthEvent::KeyDeleted { alias }, _) => {
                tracing::debug!(alias = %alias, "secure element key deleted");
            }
            (AuthEvent::KeyDeletionFailed { alias }, cause) => {
                tracing::warn!(alias = %alias, error = ?cause, "failed to delete secure element key");
            }
            (AuthEvent::KeyGenerationFailed, cause) => {
                tracing::error!(error = ?cause, "secure element key generation failed");
            }
            (AuthEvent::BranchFailed(branch), Some(fault)) => {
                tracing::warn!(branch = %branch, error = %fault, "branch failed");
            }
            (AuthEvent::BranchFailed(branch), None) => {
                tracing::warn!(branch = %branch, "branch failed");
            }
            (AuthEvent::Classified(outcome), _) => {
                tracing::error!(
                    outcome = outcome.code(),
                    source = failure_source(outcome),
                    "authentication failed: {outcome}"
                );
            }
            (AuthEvent::Cancelled, _) => {
                tracing::debug!("authentication flow cancelled");
            }
        }
    }
}

fn failure_source(outcome: &AuthenticationOutcome) -> &'static str {
    if outcome.is_card_failure() {
        "card"
    } else if outcome.is_idp_failure() {
        "idp"
    } else if outcome.is_secure_element_failure() {
        "secure_element"
    } else {
        "profile"
    }
}
