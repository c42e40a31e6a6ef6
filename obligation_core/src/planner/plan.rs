//! Displacement plans - immutable previews of one queue mutation.

use courier_rules::{
    DeliveryObligation, GameClock, NpcId, ObligationId, QueueAction, RelationshipCategory,
};
use serde::{Deserialize, Serialize};

use crate::error::ValidationFailure;

/// The requested mutation and its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlannedAction {
    /// Insert a new obligation at a target position, displacing occupants.
    Insert { target: usize },
    /// Insert a new obligation at the first empty slot.
    Append,
    Skip { from: usize },
    PriorityMove { from: usize },
    /// Remove the obligation in the last slot.
    Purge,
    Swap { first: usize, second: usize },
    ExtendDeadline { position: usize },
}

impl PlannedAction {
    /// The action without its parameters.
    pub fn kind(&self) -> QueueAction {
        match self {
            PlannedAction::Insert { .. } => QueueAction::Insert,
            PlannedAction::Append => QueueAction::Append,
            PlannedAction::Skip { .. } => QueueAction::Skip,
            PlannedAction::PriorityMove { .. } => QueueAction::PriorityMove,
            PlannedAction::Purge => QueueAction::Purge,
            PlannedAction::Swap { .. } => QueueAction::Swap,
            PlannedAction::ExtendDeadline { .. } => QueueAction::ExtendDeadline,
        }
    }
}

/// An obligation moving between slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotMovement {
    pub obligation: ObligationId,
    pub from: usize,
    pub to: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EvictionReason {
    /// Shifted past the last slot by an insertion cascade.
    PushedOut,
    /// Discarded by the player.
    Purged,
}

/// An obligation leaving the queue without being delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Eviction {
    pub obligation: ObligationId,
    pub sender: NpcId,
    pub category: RelationshipCategory,
    pub position: usize,
    pub reason: EvictionReason,
    /// Tokens lost with the sender.
    pub penalty: u32,
}

/// An obligation jumped by a skip. It keeps its slot but its sender is offended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedObligation {
    pub obligation: ObligationId,
    pub sender: NpcId,
    pub category: RelationshipCategory,
    pub position: usize,
    pub penalty: u32,
}

/// Tokens the player spends with one NPC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenCharge {
    pub npc: NpcId,
    pub category: RelationshipCategory,
    pub amount: u32,
}

impl TokenCharge {
    /// Create a charge of `amount` tokens of `category` with `npc`.
    pub fn new(npc: NpcId, category: RelationshipCategory, amount: u32) -> Self {
        Self {
            npc,
            category,
            amount,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadlineExtension {
    pub obligation: ObligationId,
    pub position: usize,
    pub minutes: i32,
}

/// A new obligation entering the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub obligation: DeliveryObligation,
    pub position: usize,
}

/// Full consequence set of one proposed mutation.
///
/// Built by the planner and never changed afterwards. A plan is either
/// executable, or carries exactly one failure and no effects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplacementPlan {
    pub(crate) action: PlannedAction,
    pub(crate) movements: Vec<SlotMovement>,
    pub(crate) evictions: Vec<Eviction>,
    pub(crate) skipped: Vec<SkippedObligation>,
    pub(crate) charges: Vec<TokenCharge>,
    pub(crate) extension: Option<DeadlineExtension>,
    pub(crate) placement: Option<Placement>,
    pub(crate) turn: u64,
    pub(crate) day: u32,
    pub(crate) failure: Option<ValidationFailure>,
}

impl DisplacementPlan {
    pub(crate) fn new(action: PlannedAction, clock: GameClock) -> Self {
        Self {
            action,
            movements: Vec::new(),
            evictions: Vec::new(),
            skipped: Vec::new(),
            charges: Vec::new(),
            extension: None,
            placement: None,
            turn: clock.turn,
            day: clock.day,
            failure: None,
        }
    }

    /// A plan that cannot execute.
    pub(crate) fn rejected(action: PlannedAction, clock: GameClock, failure: ValidationFailure) -> Self {
        let mut plan = Self::new(action, clock);
        plan.failure = Some(failure);
        plan
    }

    /// The requested mutation, with its parameters.
    pub fn action(&self) -> PlannedAction {
        self.action
    }

    /// The requested mutation, without its parameters.
    pub fn kind(&self) -> QueueAction {
        self.action.kind()
    }

    /// Whether the plan passed validation.
    pub fn can_execute(&self) -> bool {
        self.failure.is_none()
    }

    /// Why the plan cannot execute, if it cannot.
    pub fn failure_reason(&self) -> Option<&ValidationFailure> {
        self.failure.as_ref()
    }

    /// Obligations that change slots and stay queued.
    pub fn movements(&self) -> &[SlotMovement] {
        &self.movements
    }

    /// Obligations that leave the queue.
    pub fn evictions(&self) -> &[Eviction] {
        &self.evictions
    }

    /// Obligations jumped by a skip, with their relationship penalty.
    pub fn skipped(&self) -> &[SkippedObligation] {
        &self.skipped
    }

    /// Token spends, one line per (NPC, category).
    pub fn charges(&self) -> &[TokenCharge] {
        &self.charges
    }

    /// The deadline extension, for extend plans.
    pub fn extension(&self) -> Option<&DeadlineExtension> {
        self.extension.as_ref()
    }

    /// The new obligation and its slot, for inserts and appends.
    pub fn placement(&self) -> Option<&Placement> {
        self.placement.as_ref()
    }

    /// Total tokens the player would spend.
    pub fn total_cost(&self) -> u32 {
        self.charges
            .iter()
            .fold(0u32, |total, c| total.saturating_add(c.amount))
    }

    /// Turn the plan was built on.
    pub fn turn(&self) -> u64 {
        self.turn
    }

    /// Day the plan was built on.
    pub fn day(&self) -> u32 {
        self.day
    }
}
