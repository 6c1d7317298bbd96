//! Decides when a changed fingerprint is worth publishing
//!
//! A change must be seen on `CONFIRM_THRESHOLD` consecutive polls before it is
//! published. Going back to the last published fingerprint cancels a pending
//! change, so a feed flapping between two states never publishes. A forced
//! publish skips all of this.

use crate::models::PublishReason;
use crate::state::PersistedState;

/// Consecutive identical observations needed before publishing; at least 1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmThreshold(u32);

impl ConfirmThreshold {
    pub fn new(n: u32) -> Self {
        Self(n.max(1))
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl Default for ConfirmThreshold {
    fn default() -> Self {
        Self(2)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    None,
    Publish(PublishReason),
}

/// What to do this cycle and the bookkeeping to carry forward.
///
/// On `Publish` the next state only clears the pending fields; the publisher
/// records the new fingerprint and message once the send went through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub action: Action,
    pub next: PersistedState,
}

pub fn decide(
    fingerprint: &str,
    force: bool,
    state: &PersistedState,
    threshold: ConfirmThreshold,
) -> Decision {
    let stable = state.clone().cleared_pending();

    if force {
        return Decision {
            action: Action::Publish(PublishReason::Forced),
            next: stable,
        };
    }

    if fingerprint == state.last_published_fingerprint {
        return Decision {
            action: Action::None,
            next: stable,
        };
    }

    if state.pending_fingerprint.as_deref() == Some(fingerprint) {
        let count = state.pending_count.saturating_add(1);
        if count >= threshold.get() {
            return Decision {
                action: Action::Publish(PublishReason::ConfirmedChange),
                next: stable,
            };
        }
        return Decision {
            action: Action::None,
            next: PersistedState {
                pending_fingerprint: Some(fingerprint.to_string()),
                pending_count: count,
                ..state.clone()
            },
        };
    }

    if threshold.get() <= 1 {
        return Decision {
            action: Action::Publish(PublishReason::ConfirmedChange),
            next: stable,
        };
    }

    Decision {
        action: Action::None,
        next: PersistedState {
            pending_fingerprint: Some(fingerprint.to_string()),
            pending_count: 1,
            ..state.clone()
        },
    }
}
