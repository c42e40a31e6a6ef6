//! Standing obligations - long-lived modifiers the player has accepted.

use serde::{Deserialize, Serialize};

use super::{NpcId, StandingObligationId};
use crate::mechanics::{RelationshipCategory, StandingEffect};

/// A persistent rule that bends default queue behavior until broken.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandingObligation {
    pub id: StandingObligationId,
    pub name: String,

    /// None = applies to every NPC.
    pub related_npc: Option<NpcId>,
    /// None = applies to every category.
    pub related_category: Option<RelationshipCategory>,

    pub benefit_effects: Vec<StandingEffect>,
    pub constraint_effects: Vec<StandingEffect>,

    pub day_accepted: u32,
    pub is_active: bool,
    /// Ticks every day regardless of whether a forced obligation was generated.
    pub days_since_last_forced: u32,
}

impl StandingObligation {
    /// Create a new, not yet accepted, standing obligation.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: StandingObligationId::new(),
            name: name.into(),
            related_npc: None,
            related_category: None,
            benefit_effects: Vec::new(),
            constraint_effects: Vec::new(),
            day_accepted: 0,
            is_active: false,
            days_since_last_forced: 0,
        }
    }

    pub fn with_npc(mut self, npc: NpcId) -> Self {
        self.related_npc = Some(npc);
        self
    }

    pub fn with_category(mut self, category: RelationshipCategory) -> Self {
        self.related_category = Some(category);
        self
    }

    pub fn with_benefit(mut self, effect: StandingEffect) -> Self {
        self.benefit_effects.push(effect);
        self
    }

    pub fn with_constraint(mut self, effect: StandingEffect) -> Self {
        self.constraint_effects.push(effect);
        self
    }

    /// All effects, benefits first.
    pub fn effects(&self) -> impl Iterator<Item = StandingEffect> + '_ {
        self.benefit_effects
            .iter()
            .chain(self.constraint_effects.iter())
            .copied()
    }

    pub fn has_effect(&self, effect: StandingEffect) -> bool {
        self.effects().any(|e| e == effect)
    }

    /// Whether this obligation bears on the given NPC and category.
    pub fn applies_to(&self, npc: NpcId, category: RelationshipCategory) -> bool {
        self.is_active
            && self.related_npc.map_or(true, |related| related == npc)
            && self.applies_to_category(category)
    }

    pub fn applies_to_category(&self, category: RelationshipCategory) -> bool {
        self.related_category.map_or(true, |related| related == category)
    }

    /// One-line summary of the effects for a messaging collaborator.
    pub fn effects_summary(&self) -> String {
        let effects: Vec<_> = self.effects().map(|e| format!("{:?}", e)).collect();
        if effects.is_empty() {
            format!("{}: no effects", self.name)
        } else {
            format!("{}: {}", self.name, effects.join(", "))
        }
    }
}
