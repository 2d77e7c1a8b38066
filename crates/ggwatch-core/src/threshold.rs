//! Threshold state machine for subscription alerts.
//!
//! Each subscription is either `Armed` (will fire on the next reading at or
//! above its threshold) or `Fired` (already notified, waiting for the value
//! to drop below the threshold). One upward crossing fires exactly once,
//! no matter how many polls the value stays elevated:
//!
//! ```text
//!            value >= threshold / fire
//!   Armed ───────────────────────────▶ Fired
//!     ▲                                  │
//!     └──────────────────────────────────┘
//!            value < threshold / re-arm
//! ```
//!
//! A reading equal to the threshold counts as a crossing.

use serde::{Deserialize, Serialize};

use crate::types::{AlertEvent, Subscription, SubscriptionKey};

/// Arming state of a single subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArmState {
    Armed,
    Fired,
}

impl ArmState {
    pub fn from_armed(armed: bool) -> Self {
        if armed { Self::Armed } else { Self::Fired }
    }

    pub fn is_armed(self) -> bool {
        self == Self::Armed
    }
}

/// What happens to a fired subscription.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlertPolicy {
    /// Disarm on fire, re-arm once the value drops below threshold.
    #[default]
    Rearm,
    /// Delete the subscription after its first alert.
    OneShot,
}

/// Output of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepOutput {
    /// State after this reading.
    pub next: ArmState,
    /// Whether this reading must produce a notification.
    pub fired: bool,
}

impl StepOutput {
    pub fn changed(&self, prev: ArmState) -> bool {
        self.next != prev
    }
}

/// Advance one subscription's state machine by one reading.
pub fn step(state: ArmState, threshold: u32, value: u64) -> StepOutput {
    let reached = value >= u64::from(threshold);
    match (state, reached) {
        (ArmState::Armed, true) => StepOutput {
            next: ArmState::Fired,
            fired: true,
        },
        (ArmState::Fired, false) => StepOutput {
            next: ArmState::Armed,
            fired: false,
        },
        (s, _) => StepOutput {
            next: s,
            fired: false,
        },
    }
}

/// State change a store must persist for one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Threshold crossed: notify, then disarm (or delete under `OneShot`).
    Fire,
    /// Value dropped below threshold: arm again, no notification.
    Rearm,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub key: SubscriptionKey,
    /// Threshold the decision was computed against. Stores use it to
    /// ignore decisions made stale by a concurrent re-subscribe.
    pub threshold: u32,
    pub transition: Transition,
}

impl Decision {
    /// Alert to send for a `Fire` decision.
    pub fn alert(&self, value: u64) -> Option<AlertEvent> {
        match self.transition {
            Transition::Fire => Some(AlertEvent {
                chat_id: self.key.chat_id,
                target: self.key.target.clone(),
                value,
                threshold: self.threshold,
            }),
            Transition::Rearm => None,
        }
    }
}

/// Evaluate every subscription of one target against a new reading.
///
/// Subscriptions are independent; only those whose state changes appear
/// in the result.
pub fn evaluate(subs: &[Subscription], value: u64) -> Vec<Decision> {
    subs.iter()
        .filter_map(|sub| {
            let prev = ArmState::from_armed(sub.armed);
            let out = step(prev, sub.threshold, value);
            if !out.changed(prev) {
                return None;
            }
            let transition = if out.fired {
                Transition::Fire
            } else {
                Transition::Rearm
            };
            Some(Decision {
                key: sub.key(),
                threshold: sub.threshold,
                transition,
            })
        })
        .collect()
}

// ─── Tests ───────────────────────────────────────────────────────
