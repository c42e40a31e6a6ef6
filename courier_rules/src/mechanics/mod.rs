//! Queue mechanics: relationship categories, standing effects, and player actions.

use serde::{Deserialize, Serialize};

/// Relationship categories. Each category has its own token currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RelationshipCategory {
    /// Personal letters.
    Trust,
    /// Business correspondence.
    Commerce,
    /// Aristocratic letters.
    Status,
    /// Clandestine letters.
    Shadow,
    Common,
}

impl RelationshipCategory {
    pub const ALL: [RelationshipCategory; 5] = [
        RelationshipCategory::Trust,
        RelationshipCategory::Commerce,
        RelationshipCategory::Status,
        RelationshipCategory::Shadow,
        RelationshipCategory::Common,
    ];
}

impl std::fmt::Display for RelationshipCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RelationshipCategory::Trust => "Trust",
            RelationshipCategory::Commerce => "Commerce",
            RelationshipCategory::Status => "Status",
            RelationshipCategory::Shadow => "Shadow",
            RelationshipCategory::Common => "Common",
        };
        f.write_str(name)
    }
}

/// Effect tags carried by standing obligations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StandingEffect {
    // Position
    /// Obligations enter no lower than the guaranteed position.
    PriorityEntry,
    /// Obligations enter at the last slot.
    TailEntry,

    // Payment and deadlines
    BonusPayment,
    FreeExtension,
    ForbidExtension,

    // Queue actions
    ForbidPurge,
    SkipCostDoubled,

    // Pressure
    ForcedInsertion,
    PatronDominance,
    DebtSpiral,
}

/// Pairs of effects that cannot both be active within one category.
const EXCLUSIVE_EFFECTS: &[(StandingEffect, StandingEffect)] = &[
    (StandingEffect::PriorityEntry, StandingEffect::TailEntry),
    (StandingEffect::FreeExtension, StandingEffect::ForbidExtension),
];

impl StandingEffect {
    /// Leverage an active obligation with this effect grants its NPC.
    pub fn leverage(&self) -> i32 {
        match self {
            StandingEffect::PriorityEntry => 2,
            StandingEffect::ForcedInsertion => 3,
            StandingEffect::PatronDominance => 5,
            StandingEffect::DebtSpiral => 1,
            _ => 0,
        }
    }

    /// Check whether two effects are mutually exclusive.
    pub fn conflicts_with(&self, other: StandingEffect) -> bool {
        EXCLUSIVE_EFFECTS
            .iter()
            .any(|&(a, b)| (a == *self && b == other) || (a == other && b == *self))
    }

    /// Whether this effect periodically forces a new obligation into the queue.
    pub fn forces_insertion(&self) -> bool {
        matches!(
            self,
            StandingEffect::ForcedInsertion | StandingEffect::PatronDominance
        )
    }
}

/// Player-facing queue actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueueAction {
    Insert,
    Append,
    Skip,
    PriorityMove,
    Purge,
    Swap,
    ExtendDeadline,
}
