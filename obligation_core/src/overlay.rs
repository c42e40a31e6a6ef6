//! Standing Obligation Overlay - rules layered over default queue behavior.
//!
//! Active standing obligations can guarantee entry positions, forbid actions,
//! change costs and payments, and periodically demand a forced obligation.
//! The overlay answers those questions for the planner and executor; it never
//! touches the queue.

use courier_rules::{
    DeliveryObligation, NpcId, QueueAction, RelationshipCategory, RelationshipStore,
    StandingConfig, StandingEffect, StandingObligation, StandingObligationId,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::StandingError;

/// Outcome of voluntarily breaking a standing obligation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokenObligation {
    pub id: StandingObligationId,
    pub name: String,
    /// NPC that lost tokens, if the obligation had one.
    pub npc: Option<NpcId>,
    pub category: RelationshipCategory,
    pub penalty: u32,
}

/// The set of standing obligations and the rules derived from them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandingOverlay {
    obligations: Vec<StandingObligation>,
    config: StandingConfig,
}

impl StandingOverlay {
    pub fn new(config: StandingConfig) -> Self {
        Self {
            obligations: Vec::new(),
            config,
        }
    }

    /// Every standing obligation ever accepted, including broken ones.
    pub fn obligations(&self) -> &[StandingObligation] {
        &self.obligations
    }

    pub fn active(&self) -> impl Iterator<Item = &StandingObligation> {
        self.obligations.iter().filter(|o| o.is_active)
    }

    pub fn get(&self, id: StandingObligationId) -> Option<&StandingObligation> {
        self.obligations.iter().find(|o| o.id == id)
    }

    /// Active obligations that would conflict with `candidate`.
    ///
    /// A conflict is a shared related NPC, or a mutually exclusive effect pair
    /// between obligations whose categories overlap.
    pub fn conflicts_with(&self, candidate: &StandingObligation) -> Vec<&StandingObligation> {
        self.active()
            .filter(|existing| existing.id != candidate.id)
            .filter(|existing| {
                let same_npc = matches!(
                    (existing.related_npc, candidate.related_npc),
                    (Some(a), Some(b)) if a == b
                );
                let categories_overlap = match (existing.related_category, candidate.related_category) {
                    (Some(a), Some(b)) => a == b,
                    _ => true,
                };
                let exclusive = categories_overlap
                    && existing
                        .effects()
                        .any(|e| candidate.effects().any(|c| e.conflicts_with(c)));
                same_npc || exclusive
            })
            .collect()
    }

    /// Accept a standing obligation, rejecting it up front on any conflict.
    pub fn accept(
        &mut self,
        mut obligation: StandingObligation,
        day: u32,
    ) -> Result<StandingObligationId, StandingError> {
        if self.get(obligation.id).is_some_and(|o| o.is_active) {
            return Err(StandingError::AlreadyActive(obligation.id));
        }

        let conflicts: Vec<String> = self
            .conflicts_with(&obligation)
            .iter()
            .map(|o| o.name.clone())
            .collect();
        if !conflicts.is_empty() {
            debug!(name = %obligation.name, ?conflicts, "standing obligation rejected");
            return Err(StandingError::Conflict {
                name: obligation.name,
                conflicts,
            });
        }

        obligation.is_active = true;
        obligation.day_accepted = day;
        obligation.days_since_last_forced = 0;
        let id = obligation.id;

        info!(effects = %obligation.effects_summary(), day, "accepted standing obligation");
        self.obligations.retain(|o| o.id != id);
        self.obligations.push(obligation);
        Ok(id)
    }

    /// Break an active obligation, charging the relationship penalty.
    pub fn break_obligation<S: RelationshipStore + ?Sized>(
        &mut self,
        id: StandingObligationId,
        store: &mut S,
    ) -> Result<BrokenObligation, StandingError> {
        let penalty = self.config.breaking_penalty;
        let obligation = self
            .obligations
            .iter_mut()
            .find(|o| o.id == id)
            .ok_or(StandingError::Unknown(id))?;
        if !obligation.is_active {
            return Err(StandingError::Inactive(id));
        }

        obligation.is_active = false;
        let category = obligation
            .related_category
            .unwrap_or(RelationshipCategory::Common);

        let applied = match obligation.related_npc {
            Some(npc) => {
                store.adjust(npc, category, -(penalty as i32));
                info!(name = %obligation.name, %npc, penalty, "broke standing obligation");
                penalty
            }
            None => {
                warn!(name = %obligation.name, "broke standing obligation with no related NPC");
                0
            }
        };

        Ok(BrokenObligation {
            id,
            name: obligation.name.clone(),
            npc: obligation.related_npc,
            category,
            penalty: applied,
        })
    }

    fn applicable(
        &self,
        obligation: &DeliveryObligation,
    ) -> impl Iterator<Item = &StandingObligation> + '_ {
        let (sender, category) = (obligation.sender, obligation.category);
        self.active()
            .filter(move |s| s.applies_to(sender, category))
    }

    fn applies(
        &self,
        obligation: &DeliveryObligation,
        effect: StandingEffect,
    ) -> Option<&StandingObligation> {
        self.applicable(obligation).find(|s| s.has_effect(effect))
    }

    /// Why `action` may not be taken on `obligation`, if it is forbidden.
    pub fn forbidden_reason(
        &self,
        action: QueueAction,
        obligation: &DeliveryObligation,
    ) -> Option<String> {
        let effect = match action {
            QueueAction::Purge => StandingEffect::ForbidPurge,
            QueueAction::ExtendDeadline => StandingEffect::ForbidExtension,
            _ => return None,
        };

        self.applies(obligation, effect).map(|source| {
            let verb = match action {
                QueueAction::Purge => "purging",
                _ => "extending deadlines of",
            };
            format!(
                "{} forbids {} {} obligations",
                source.name, verb, obligation.category
            )
        })
    }

    /// Adjust a leverage-derived entry position.
    ///
    /// A priority entry effect caps the position at the guaranteed position and
    /// takes precedence over tail entry, which sends the obligation to the last
    /// slot.
    pub fn entry_position(
        &self,
        obligation: &DeliveryObligation,
        proposed: usize,
        capacity: usize,
    ) -> usize {
        if self.applies(obligation, StandingEffect::PriorityEntry).is_some() {
            return proposed.min(self.config.guaranteed_position).max(1);
        }
        if self.applies(obligation, StandingEffect::TailEntry).is_some() {
            return capacity;
        }
        proposed
    }

    /// Bonus paid on top of the obligation's payment when delivered.
    pub fn bonus_payment(&self, obligation: &DeliveryObligation) -> u32 {
        if self.applies(obligation, StandingEffect::BonusPayment).is_some() {
            self.config.bonus_payment
        } else {
            0
        }
    }

    pub fn free_extension(&self, obligation: &DeliveryObligation) -> bool {
        self.applies(obligation, StandingEffect::FreeExtension).is_some()
    }

    pub fn skip_cost_multiplier(&self, obligation: &DeliveryObligation) -> u32 {
        if self.applies(obligation, StandingEffect::SkipCostDoubled).is_some() {
            2
        } else {
            1
        }
    }

    /// Active obligations whose forced-insertion interval has elapsed.
    pub fn due_forced_insertions(&self) -> Vec<StandingObligationId> {
        self.active()
            .filter(|o| {
                if !o.effects().any(|e| e.forces_insertion()) {
                    return false;
                }
                let interval = if o.has_effect(StandingEffect::PatronDominance) {
                    self.config.patron_interval_days
                } else if o.has_effect(StandingEffect::ForcedInsertion) {
                    self.config.forced_insertion_interval_days
                } else {
                    return false;
                };
                o.days_since_last_forced >= interval
            })
            .map(|o| o.id)
            .collect()
    }

    /// Whether any standing obligation demands a forced obligation today.
    pub fn forced_insertion_due(&self) -> bool {
        !self.due_forced_insertions().is_empty()
    }

    /// Morning tick. The counter advances whether or not anything was forced.
    pub fn advance_day(&mut self) {
        for obligation in self.obligations.iter_mut().filter(|o| o.is_active) {
            obligation.days_since_last_forced = obligation.days_since_last_forced.saturating_add(1);
        }
    }

    /// Reset the forced-insertion counter after a forced obligation was generated.
    pub fn record_forced_insertion(&mut self, id: StandingObligationId) -> Result<(), StandingError> {
        let obligation = self
            .obligations
            .iter_mut()
            .find(|o| o.id == id)
            .ok_or(StandingError::Unknown(id))?;
        if !obligation.is_active {
            return Err(StandingError::Inactive(id));
        }
        obligation.days_since_last_forced = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_rules::RelationshipLedger;

    fn overlay() -> StandingOverlay {
        StandingOverlay::new(StandingConfig::default())
    }

    fn letter(sender: NpcId, category: RelationshipCategory) -> DeliveryObligation {
        DeliveryObligation::new(sender, NpcId::new(), category)
    }

    #[test]
    fn test_accept_marks_active() {
        let mut overlay = overlay();
        let id = overlay
            .accept(StandingObligation::new("Merchant Guild Charter"), 4)
            .unwrap();

        let accepted = overlay.get(id).unwrap();
        assert!(accepted.is_active);
        assert_eq!(accepted.day_accepted, 4);
        assert_eq!(overlay.active().count(), 1);
    }

    #[test]
    fn test_exclusive_effects_conflict_in_same_category() {
        let mut overlay = overlay();
        overlay
            .accept(
                StandingObligation::new("Noble Oath")
                    .with_category(RelationshipCategory::Status)
                    .with_benefit(StandingEffect::PriorityEntry),
                0,
            )
            .unwrap();

        let err = overlay
            .accept(
                StandingObligation::new("Servant's Vow")
                    .with_category(RelationshipCategory::Status)
                    .with_constraint(StandingEffect::TailEntry),
                0,
            )
            .unwrap_err();
        assert_eq!(
            err,
            StandingError::Conflict {
                name: "Servant's Vow".to_string(),
                conflicts: vec!["Noble Oath".to_string()],
            }
        );

        // Different category, no overlap.
        assert!(overlay
            .accept(
                StandingObligation::new("Dock Contract")
                    .with_category(RelationshipCategory::Commerce)
                    .with_constraint(StandingEffect::TailEntry),
                0,
            )
            .is_ok());
    }

    #[test]
    fn test_one_obligation_per_npc() {
        let npc = NpcId::new();
        let mut overlay = overlay();
        overlay
            .accept(StandingObligation::new("First Favor").with_npc(npc), 0)
            .unwrap();

        let err = overlay
            .accept(StandingObligation::new("Second Favor").with_npc(npc), 0)
            .unwrap_err();
        assert!(matches!(err, StandingError::Conflict { .. }));
    }

    #[test]
    fn test_break_applies_penalty() {
        let npc = NpcId::new();
        let mut store = RelationshipLedger::new().with_balance(npc, RelationshipCategory::Trust, 2);
        let mut overlay = overlay();
        let id = overlay
            .accept(
                StandingObligation::new("Childhood Promise")
                    .with_npc(npc)
                    .with_category(RelationshipCategory::Trust),
                0,
            )
            .unwrap();

        let broken = overlay.break_obligation(id, &mut store).unwrap();
        assert_eq!(broken.penalty, 5);
        assert_eq!(store.balance(npc, RelationshipCategory::Trust), -3);
        assert!(!overlay.get(id).unwrap().is_active);

        assert_eq!(
            overlay.break_obligation(id, &mut store).unwrap_err(),
            StandingError::Inactive(id)
        );
    }

    #[test]
    fn test_break_without_npc_has_no_penalty() {
        let mut store = RelationshipLedger::new();
        let mut overlay = overlay();
        let id = overlay
            .accept(StandingObligation::new("Vow of Silence"), 0)
            .unwrap();

        let broken = overlay.break_obligation(id, &mut store).unwrap();
        assert_eq!(broken.penalty, 0);
        assert!(broken.npc.is_none());
    }

    #[test]
    fn test_break_unknown() {
        let mut store = RelationshipLedger::new();
        let id = StandingObligationId::new();
        assert_eq!(
            overlay().break_obligation(id, &mut store).unwrap_err(),
            StandingError::Unknown(id)
        );
    }

    #[test]
    fn test_forbidden_purge() {
        let npc = NpcId::new();
        let mut overlay = overlay();
        overlay
            .accept(
                StandingObligation::new("Shadow Pact")
                    .with_category(RelationshipCategory::Shadow)
                    .with_constraint(StandingEffect::ForbidPurge),
                0,
            )
            .unwrap();

        let shadow = letter(npc, RelationshipCategory::Shadow);
        let reason = overlay.forbidden_reason(QueueAction::Purge, &shadow).unwrap();
        assert_eq!(reason, "Shadow Pact forbids purging Shadow obligations");
        assert!(overlay
            .forbidden_reason(QueueAction::Skip, &shadow)
            .is_none());
        assert!(overlay
            .forbidden_reason(QueueAction::Purge, &letter(npc, RelationshipCategory::Trust))
            .is_none());
    }

    #[test]
    fn test_matching_rule_outlives_the_looked_up_obligation() {
        let npc = NpcId::new();
        let mut overlay = overlay();
        overlay
            .accept(
                StandingObligation::new("Shadow Pact")
                    .with_category(RelationshipCategory::Shadow)
                    .with_constraint(StandingEffect::ForbidPurge),
                0,
            )
            .unwrap();

        let source = {
            let shadow = letter(npc, RelationshipCategory::Shadow);
            overlay.applies(&shadow, StandingEffect::ForbidPurge)
        };
        assert_eq!(source.map(|s| s.name.as_str()), Some("Shadow Pact"));
    }

    #[test]
    fn test_entry_position_rules() {
        let noble = NpcId::new();
        let mut overlay = overlay();
        overlay
            .accept(
                StandingObligation::new("Noble Oath")
                    .with_category(RelationshipCategory::Status)
                    .with_benefit(StandingEffect::PriorityEntry),
                0,
            )
            .unwrap();
        overlay
            .accept(
                StandingObligation::new("Dock Contract")
                    .with_category(RelationshipCategory::Commerce)
                    .with_constraint(StandingEffect::TailEntry),
                0,
            )
            .unwrap();

        let status = letter(noble, RelationshipCategory::Status);
        assert_eq!(overlay.entry_position(&status, 8, 8), 5);
        assert_eq!(overlay.entry_position(&status, 2, 8), 2);

        let commerce = letter(noble, RelationshipCategory::Commerce);
        assert_eq!(overlay.entry_position(&commerce, 3, 8), 8);

        let trust = letter(noble, RelationshipCategory::Trust);
        assert_eq!(overlay.entry_position(&trust, 6, 8), 6);
    }

    #[test]
    fn test_payment_and_cost_modifiers() {
        let patron = NpcId::new();
        let mut overlay = overlay();
        overlay
            .accept(
                StandingObligation::new("Patron's Favor")
                    .with_npc(patron)
                    .with_benefit(StandingEffect::BonusPayment)
                    .with_benefit(StandingEffect::FreeExtension)
                    .with_constraint(StandingEffect::SkipCostDoubled),
                0,
            )
            .unwrap();

        let theirs = letter(patron, RelationshipCategory::Status);
        assert_eq!(overlay.bonus_payment(&theirs), 10);
        assert!(overlay.free_extension(&theirs));
        assert_eq!(overlay.skip_cost_multiplier(&theirs), 2);

        let other = letter(NpcId::new(), RelationshipCategory::Status);
        assert_eq!(overlay.bonus_payment(&other), 0);
        assert!(!overlay.free_extension(&other));
        assert_eq!(overlay.skip_cost_multiplier(&other), 1);
    }

    #[test]
    fn test_forced_insertion_counter_always_ticks() {
        let mut overlay = overlay();
        let forced = overlay
            .accept(
                StandingObligation::new("Smuggler's Debt")
                    .with_constraint(StandingEffect::ForcedInsertion),
                0,
            )
            .unwrap();
        let patron = overlay
            .accept(
                StandingObligation::new("Patron's Demand")
                    .with_npc(NpcId::new())
                    .with_constraint(StandingEffect::PatronDominance),
                0,
            )
            .unwrap();

        overlay.advance_day();
        overlay.advance_day();
        assert!(!overlay.forced_insertion_due());

        overlay.advance_day();
        assert_eq!(overlay.due_forced_insertions(), vec![forced]);

        // Nothing generated yet; the counter keeps climbing.
        overlay.advance_day();
        assert_eq!(overlay.get(forced).unwrap().days_since_last_forced, 4);

        overlay.record_forced_insertion(forced).unwrap();
        assert!(!overlay.forced_insertion_due());
        assert_eq!(overlay.get(patron).unwrap().days_since_last_forced, 4);
    }

    #[test]
    fn test_only_forcing_effects_come_due() {
        let mut overlay = overlay();
        let favor = overlay
            .accept(
                StandingObligation::new("Merchant's Favor")
                    .with_category(RelationshipCategory::Commerce)
                    .with_benefit(StandingEffect::BonusPayment),
                0,
            )
            .unwrap();

        for _ in 0..40 {
            overlay.advance_day();
        }
        assert_eq!(overlay.get(favor).unwrap().days_since_last_forced, 40);
        assert!(overlay.due_forced_insertions().is_empty());
    }
}
