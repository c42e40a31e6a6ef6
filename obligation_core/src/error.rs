//! Error taxonomy for planning, committing, and queue integrity.

use courier_rules::{
    LifecycleError, NpcId, ObligationId, ObligationState, RelationshipCategory,
    StandingObligationId, TokenError,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A precondition that failed while building a plan. Nothing was mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum ValidationFailure {
    #[error("insufficient {category} tokens (need {required}, have {available})")]
    InsufficientTokens {
        category: RelationshipCategory,
        required: u32,
        available: i32,
    },
    #[error("position {position} is outside the queue (1..={capacity})")]
    InvalidPosition { position: usize, capacity: usize },
    #[error("no obligation at position {position}")]
    EmptySlot { position: usize },
    #[error("position {position} is already occupied")]
    TargetOccupied { position: usize },
    #[error("queue is completely full")]
    QueueFull,
    #[error("positions {first} and {second} are not adjacent")]
    NonAdjacentSwap { first: usize, second: usize },
    #[error("positions {first} and {second} are both empty")]
    NothingToSwap { first: usize, second: usize },
    #[error("the daily swap was already used on day {day}")]
    SwapAlreadyUsed { day: u32 },
    #[error("forbidden by standing obligation: {reason}")]
    Forbidden { reason: String },
    #[error("payment must total exactly {required} tokens, offered {offered}")]
    PaymentMismatch { required: u32, offered: u32 },
    #[error("obligation {id} is already queued at position {position}")]
    AlreadyQueued { id: ObligationId, position: usize },
    #[error("obligation {id} is {state:?}; only offered obligations can enter the queue")]
    NotOffered { id: ObligationId, state: ObligationState },
}

/// A precondition that held at planning time but not at commit time.
/// Every sub-step applied before the failure has been rolled back.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommitFailure {
    #[error("plan was not executable: {0}")]
    PlanRejected(ValidationFailure),
    #[error("position {position} no longer holds obligation {expected}")]
    StaleSlot {
        position: usize,
        expected: ObligationId,
        found: Option<ObligationId>,
    },
    #[error("position {position} became occupied after planning")]
    TargetOccupied { position: usize },
    #[error("obligation {id} was queued after planning")]
    AlreadyQueued { id: ObligationId },
    #[error("{category} tokens with {npc} dropped to {available}, {required} required")]
    InsufficientTokens {
        npc: NpcId,
        category: RelationshipCategory,
        required: u32,
        available: i32,
    },
    #[error("the daily swap was used on day {day} after planning")]
    SwapAlreadyUsed { day: u32 },
    #[error("token store refused a spend mid-commit: {0}")]
    StoreRefused(#[from] TokenError),
}

/// The queue's structural invariants were broken. This is a defect, not a
/// user error: callers must propagate it, never retry past it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error("position {position} is outside the queue (1..={capacity})")]
    PositionOutOfRange { position: usize, capacity: usize },
    #[error("obligation {id} would occupy position {position} while already at {existing}")]
    DuplicateObligation {
        id: ObligationId,
        position: usize,
        existing: usize,
    },
    #[error("placing into position {position} would overwrite obligation {occupant}")]
    OccupiedSlot {
        position: usize,
        occupant: ObligationId,
    },
    #[error("obligation {id} vanished from the queue mid-commit")]
    MissingObligation { id: ObligationId },
    #[error("queued obligation in an impossible state: {0}")]
    Lifecycle(#[from] LifecycleError),
}

/// Errors collecting or delivering a queued obligation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleFailure {
    #[error(transparent)]
    Validation(#[from] ValidationFailure),
    #[error(transparent)]
    Transition(#[from] LifecycleError),
    #[error(transparent)]
    Invariant(#[from] InvariantViolation),
}

/// Errors accepting or breaking standing obligations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StandingError {
    #[error("cannot accept {name}: conflicts with {}", conflicts.join(", "))]
    Conflict {
        name: String,
        conflicts: Vec<String>,
    },
    #[error("standing obligation {0} is already active")]
    AlreadyActive(StandingObligationId),
    #[error("unknown standing obligation {0}")]
    Unknown(StandingObligationId),
    #[error("standing obligation {0} is not active")]
    Inactive(StandingObligationId),
}
