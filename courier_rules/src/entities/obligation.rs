//! Delivery obligations and their lifecycle.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{NpcId, ObligationId};
use crate::mechanics::RelationshipCategory;

/// Minutes in one in-game day.
pub const MINUTES_PER_DAY: i32 = 24 * 60;

/// Lifecycle state of a delivery obligation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ObligationState {
    #[default]
    Offered,
    /// Holds a queue slot.
    Queued,
    /// Physically carried; still holds its slot.
    Collected,
    Delivered,
    Expired,
    /// Removed from the last slot by the player.
    Purged,
    /// Pushed past the tail by an insertion cascade.
    Evicted,
}

impl ObligationState {
    /// Whether this state frees the owning slot.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ObligationState::Delivered
                | ObligationState::Expired
                | ObligationState::Purged
                | ObligationState::Evicted
        )
    }

    /// Whether an obligation in this state occupies a queue slot.
    pub fn holds_slot(&self) -> bool {
        matches!(self, ObligationState::Queued | ObligationState::Collected)
    }

    fn can_transition_to(&self, next: ObligationState) -> bool {
        use ObligationState::*;
        match (self, next) {
            (Offered, Queued) => true,
            (Queued, Collected) => true,
            (Collected, Delivered) => true,
            (Queued | Collected, Expired | Purged | Evicted) => true,
            _ => false,
        }
    }
}

/// What the sender stands to lose if the obligation fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Stakes {
    #[default]
    Reputation,
    Wealth,
    Safety,
    Secret,
}

/// An illegal lifecycle transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("obligation {id} cannot move from {from:?} to {to:?}")]
pub struct LifecycleError {
    pub id: ObligationId,
    pub from: ObligationState,
    pub to: ObligationState,
}

/// A promise to carry an item from a sender to a recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryObligation {
    pub id: ObligationId,
    pub sender: NpcId,
    pub sender_name: String,
    pub recipient: NpcId,
    pub recipient_name: String,
    pub category: RelationshipCategory,
    /// Remaining time to deadline; decremented by the time collaborator.
    pub deadline_minutes: i32,
    pub payment: u32,
    pub stakes: Stakes,
    pub state: ObligationState,
}

impl DeliveryObligation {
    /// Create a new offered obligation with a three day deadline.
    pub fn new(sender: NpcId, recipient: NpcId, category: RelationshipCategory) -> Self {
        Self {
            id: ObligationId::new(),
            sender,
            sender_name: String::new(),
            recipient,
            recipient_name: String::new(),
            category,
            deadline_minutes: 3 * MINUTES_PER_DAY,
            payment: 0,
            stakes: Stakes::default(),
            state: ObligationState::Offered,
        }
    }

    pub fn with_sender_name(mut self, name: impl Into<String>) -> Self {
        self.sender_name = name.into();
        self
    }

    pub fn with_recipient_name(mut self, name: impl Into<String>) -> Self {
        self.recipient_name = name.into();
        self
    }

    pub fn with_deadline_minutes(mut self, minutes: i32) -> Self {
        self.deadline_minutes = minutes;
        self
    }

    pub fn with_payment(mut self, payment: u32) -> Self {
        self.payment = payment;
        self
    }

    pub fn with_stakes(mut self, stakes: Stakes) -> Self {
        self.stakes = stakes;
        self
    }

    /// Check whether the deadline has elapsed.
    pub fn is_overdue(&self) -> bool {
        self.deadline_minutes <= 0
    }

    /// Move to `next`, rejecting transitions the lifecycle does not allow.
    pub fn transition(&mut self, next: ObligationState) -> Result<(), LifecycleError> {
        if !self.state.can_transition_to(next) {
            return Err(LifecycleError {
                id: self.id,
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offered() -> DeliveryObligation {
        DeliveryObligation::new(NpcId::new(), NpcId::new(), RelationshipCategory::Trust)
    }

    #[test]
    fn test_new_obligation() {
        let obligation = offered()
            .with_sender_name("Elena")
            .with_payment(12)
            .with_stakes(Stakes::Safety);

        assert_eq!(obligation.state, ObligationState::Offered);
        assert_eq!(obligation.sender_name, "Elena");
        assert_eq!(obligation.payment, 12);
        assert_eq!(obligation.deadline_minutes, 3 * MINUTES_PER_DAY);
        assert!(!obligation.is_overdue());
    }

    #[test]
    fn test_happy_path_lifecycle() {
        let mut obligation = offered();
        obligation.transition(ObligationState::Queued).unwrap();
        obligation.transition(ObligationState::Collected).unwrap();
        obligation.transition(ObligationState::Delivered).unwrap();
        assert!(obligation.state.is_terminal());
    }

    #[test]
    fn test_cannot_deliver_uncollected() {
        let mut obligation = offered();
        obligation.transition(ObligationState::Queued).unwrap();

        let err = obligation.transition(ObligationState::Delivered).unwrap_err();
        assert_eq!(err.from, ObligationState::Queued);
        assert_eq!(err.to, ObligationState::Delivered);
        assert_eq!(obligation.state, ObligationState::Queued);
    }

    #[test]
    fn test_expiry_from_collected() {
        let mut obligation = offered();
        obligation.transition(ObligationState::Queued).unwrap();
        obligation.transition(ObligationState::Collected).unwrap();
        assert!(obligation.state.holds_slot());
        obligation.transition(ObligationState::Expired).unwrap();
        assert!(!obligation.state.holds_slot());
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut obligation = offered();
        obligation.transition(ObligationState::Queued).unwrap();
        obligation.transition(ObligationState::Purged).unwrap();
        assert!(obligation.transition(ObligationState::Queued).is_err());
    }
}
