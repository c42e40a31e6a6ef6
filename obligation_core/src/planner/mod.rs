//! Queue Displacement Planner - previews the consequences of a queue action.
//!
//! Planning is pure. The planner reads the queue, token balances, standing
//! obligations and leverage, and returns a [`DisplacementPlan`] describing
//! exactly what an execution would do. Nothing is written, so any plan may be
//! discarded and planning the same action twice yields equal plans.

mod plan;

pub use plan::*;

use std::collections::BTreeMap;

use courier_rules::{
    DeliveryObligation, EngineConfig, GameClock, NpcId, ObligationState, QueueAction,
    RelationshipCategory, RelationshipStore,
};
use tracing::debug;

use crate::error::ValidationFailure;
use crate::leverage::LeverageCalculator;
use crate::overlay::StandingOverlay;
use crate::queue::ObligationQueue;

/// One link of an insertion cascade before classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShiftEntry<'a> {
    pub obligation: &'a DeliveryObligation,
    pub from: usize,
    pub to: usize,
}

/// Split a raw shift chain into in-bounds movements and evictions.
///
/// The decision depends only on the destination versus capacity.
pub fn classify_shift_chain(
    chain: &[ShiftEntry<'_>],
    capacity: usize,
    eviction_penalty: u32,
) -> (Vec<SlotMovement>, Vec<Eviction>) {
    let mut movements = Vec::new();
    let mut evictions = Vec::new();

    for entry in chain {
        if entry.to > capacity {
            evictions.push(Eviction {
                obligation: entry.obligation.id,
                sender: entry.obligation.sender,
                category: entry.obligation.category,
                position: entry.from,
                reason: EvictionReason::PushedOut,
                penalty: eviction_penalty,
            });
        } else {
            movements.push(SlotMovement {
                obligation: entry.obligation.id,
                from: entry.from,
                to: entry.to,
            });
        }
    }

    (movements, evictions)
}

/// Read-only view over everything a plan depends on.
pub struct QueuePlanner<'a, S: RelationshipStore + ?Sized> {
    config: &'a EngineConfig,
    queue: &'a ObligationQueue,
    store: &'a S,
    overlay: &'a StandingOverlay,
    leverage: &'a LeverageCalculator,
    clock: GameClock,
    cost_modifiers: &'a [f32],
}

impl<'a, S: RelationshipStore + ?Sized> QueuePlanner<'a, S> {
    pub fn new(
        config: &'a EngineConfig,
        queue: &'a ObligationQueue,
        store: &'a S,
        overlay: &'a StandingOverlay,
        leverage: &'a LeverageCalculator,
        clock: GameClock,
    ) -> Self {
        Self {
            config,
            queue,
            store,
            overlay,
            leverage,
            clock,
            cost_modifiers: &[],
        }
    }

    /// Multiplicative factors applied to token costs of paid actions.
    pub fn with_cost_modifiers(mut self, modifiers: &'a [f32]) -> Self {
        self.cost_modifiers = modifiers;
        self
    }

    /// Plan an insertion at the position the sender's leverage earns.
    ///
    /// The leverage-derived position is adjusted by the overlay's entry rules
    /// before planning the cascade.
    pub fn plan_insert(&self, obligation: DeliveryObligation) -> DisplacementPlan {
        let leverage = self.leverage.compute(
            obligation.sender,
            obligation.category,
            self.store,
            self.overlay.obligations(),
        );
        let target = self.overlay.entry_position(
            &obligation,
            leverage.target_position,
            self.queue.capacity(),
        );

        debug!(
            obligation = %obligation.id,
            leverage = leverage.total,
            leverage_position = leverage.target_position,
            target,
            "resolved insertion target"
        );
        self.plan_insert_at(obligation, target)
    }

    /// Plan an insertion at an explicit position.
    ///
    /// # Algorithm
    ///
    /// 1. If the target slot is empty, the obligation simply takes it
    /// 2. Otherwise build the raw shift chain: every occupant from the target
    ///    through the last slot moves one position toward the tail
    /// 3. Classify each link: in bounds it is a movement, past the last slot
    ///    it is an eviction carrying the configured penalty
    pub fn plan_insert_at(&self, obligation: DeliveryObligation, position: usize) -> DisplacementPlan {
        let action = PlannedAction::Insert { target: position };
        let result = self.build_insert(obligation, position, action);
        self.finish(action, result)
    }

    /// Plan placing an obligation in the first empty slot, displacing nothing.
    pub fn plan_append(&self, obligation: DeliveryObligation) -> DisplacementPlan {
        let action = PlannedAction::Append;
        let result = self.check_new(&obligation).and_then(|()| {
            let position = self.queue.first_empty().ok_or(ValidationFailure::QueueFull)?;
            let mut plan = DisplacementPlan::new(action, self.clock);
            plan.placement = Some(Placement {
                obligation,
                position,
            });
            Ok(plan)
        });
        self.finish(action, result)
    }

    /// Plan moving the obligation at `from` to position 1.
    ///
    /// Costs `from - 1` tokens of its category with its sender, scaled by the
    /// overlay and cost modifiers. Every obligation jumped keeps its slot but
    /// its sender takes the skip penalty.
    pub fn plan_skip(&self, from: usize) -> DisplacementPlan {
        let action = PlannedAction::Skip { from };
        let result = self.front_move_target(action, from).and_then(|obligation| {
            let base = (from as u32 - 1) * self.overlay.skip_cost_multiplier(obligation);
            let cost = self.scaled_cost(base);
            self.check_balance(obligation.sender, obligation.category, cost)?;

            let mut plan = DisplacementPlan::new(action, self.clock);
            plan.movements.push(SlotMovement {
                obligation: obligation.id,
                from,
                to: 1,
            });
            plan.skipped = self
                .queue
                .iter()
                .filter(|(position, _)| *position > 1 && *position < from)
                .map(|(position, jumped)| SkippedObligation {
                    obligation: jumped.id,
                    sender: jumped.sender,
                    category: jumped.category,
                    position,
                    penalty: self.config.costs.skip_penalty,
                })
                .collect();
            push_charge(&mut plan, obligation.sender, obligation.category, cost);
            Ok(plan)
        });
        self.finish(action, result)
    }

    /// Plan moving the obligation at `from` to position 1 for a flat fee.
    pub fn plan_priority_move(&self, from: usize) -> DisplacementPlan {
        let action = PlannedAction::PriorityMove { from };
        let result = self.front_move_target(action, from).and_then(|obligation| {
            let cost = self.scaled_cost(self.config.costs.priority_move_cost);
            self.check_balance(obligation.sender, obligation.category, cost)?;

            let mut plan = DisplacementPlan::new(action, self.clock);
            plan.movements.push(SlotMovement {
                obligation: obligation.id,
                from,
                to: 1,
            });
            push_charge(&mut plan, obligation.sender, obligation.category, cost);
            Ok(plan)
        });
        self.finish(action, result)
    }

    /// Plan discarding the obligation in the last slot.
    ///
    /// `payment` may mix NPCs and categories but must total exactly the
    /// configured purge cost, whichever obligation sits in the last slot.
    pub fn plan_purge(&self, payment: &[TokenCharge]) -> DisplacementPlan {
        let action = PlannedAction::Purge;
        let result = self.build_purge(payment, action);
        self.finish(action, result)
    }

    /// Plan the free once-per-day exchange of two adjacent slots.
    pub fn plan_swap(&self, first: usize, second: usize) -> DisplacementPlan {
        let action = PlannedAction::Swap { first, second };
        let result = self.build_swap(first, second, action);
        self.finish(action, result)
    }

    /// Plan extending the deadline of the obligation at `position`.
    pub fn plan_extend(&self, position: usize) -> DisplacementPlan {
        let action = PlannedAction::ExtendDeadline { position };
        let result = self.build_extend(position, action);
        self.finish(action, result)
    }

    fn build_insert(
        &self,
        obligation: DeliveryObligation,
        position: usize,
        action: PlannedAction,
    ) -> Result<DisplacementPlan, ValidationFailure> {
        self.check_new(&obligation)?;
        self.check_in_range(position)?;

        let mut plan = DisplacementPlan::new(action, self.clock);

        if self.queue.get(position).is_some() {
            // Phase 1: raw shift chain
            let chain: Vec<ShiftEntry<'_>> = self
                .queue
                .iter()
                .filter(|(from, _)| *from >= position)
                .map(|(from, occupant)| ShiftEntry {
                    obligation: occupant,
                    from,
                    to: from + 1,
                })
                .collect();

            // Phase 2: movement or eviction
            let (movements, evictions) = classify_shift_chain(
                &chain,
                self.queue.capacity(),
                self.config.costs.eviction_penalty,
            );
            plan.movements = movements;
            plan.evictions = evictions;
        }

        plan.placement = Some(Placement {
            obligation,
            position,
        });
        Ok(plan)
    }

    fn build_purge(
        &self,
        payment: &[TokenCharge],
        action: PlannedAction,
    ) -> Result<DisplacementPlan, ValidationFailure> {
        let last = self.queue.capacity();
        let obligation = self
            .queue
            .get(last)
            .ok_or(ValidationFailure::EmptySlot { position: last })?;
        self.check_forbidden(QueueAction::Purge, obligation)?;

        let required = self.config.costs.purge_cost;
        let overpaid = ValidationFailure::PaymentMismatch {
            required,
            offered: u32::MAX,
        };

        let mut lines: BTreeMap<(NpcId, RelationshipCategory), u32> = BTreeMap::new();
        for charge in payment.iter().filter(|c| c.amount > 0) {
            let line = lines.entry((charge.npc, charge.category)).or_insert(0);
            *line = line
                .checked_add(charge.amount)
                .ok_or_else(|| overpaid.clone())?;
        }

        let offered = lines
            .values()
            .try_fold(0u32, |total, amount| total.checked_add(*amount))
            .ok_or(overpaid)?;
        if offered != required {
            return Err(ValidationFailure::PaymentMismatch { required, offered });
        }
        for (&(npc, category), &amount) in &lines {
            self.check_balance(npc, category, amount)?;
        }

        let mut plan = DisplacementPlan::new(action, self.clock);
        plan.evictions.push(Eviction {
            obligation: obligation.id,
            sender: obligation.sender,
            category: obligation.category,
            position: last,
            reason: EvictionReason::Purged,
            penalty: 0,
        });
        plan.charges = lines
            .into_iter()
            .map(|((npc, category), amount)| TokenCharge::new(npc, category, amount))
            .collect();
        Ok(plan)
    }

    fn build_swap(
        &self,
        first: usize,
        second: usize,
        action: PlannedAction,
    ) -> Result<DisplacementPlan, ValidationFailure> {
        if first.abs_diff(second) != 1 {
            return Err(ValidationFailure::NonAdjacentSwap { first, second });
        }
        self.check_in_range(first)?;
        self.check_in_range(second)?;

        if self.queue.last_swap_day() == Some(self.clock.day) {
            return Err(ValidationFailure::SwapAlreadyUsed {
                day: self.clock.day,
            });
        }

        let a = self.queue.get(first);
        let b = self.queue.get(second);
        if a.is_none() && b.is_none() {
            return Err(ValidationFailure::NothingToSwap { first, second });
        }

        let mut plan = DisplacementPlan::new(action, self.clock);
        if let Some(a) = a {
            plan.movements.push(SlotMovement {
                obligation: a.id,
                from: first,
                to: second,
            });
        }
        if let Some(b) = b {
            plan.movements.push(SlotMovement {
                obligation: b.id,
                from: second,
                to: first,
            });
        }
        Ok(plan)
    }

    fn build_extend(
        &self,
        position: usize,
        action: PlannedAction,
    ) -> Result<DisplacementPlan, ValidationFailure> {
        self.check_in_range(position)?;
        let obligation = self
            .queue
            .get(position)
            .ok_or(ValidationFailure::EmptySlot { position })?;
        self.check_forbidden(QueueAction::ExtendDeadline, obligation)?;

        let cost = if self.overlay.free_extension(obligation) {
            0
        } else {
            self.scaled_cost(self.config.costs.extension_cost)
        };
        self.check_balance(obligation.sender, obligation.category, cost)?;

        let mut plan = DisplacementPlan::new(action, self.clock);
        plan.extension = Some(DeadlineExtension {
            obligation: obligation.id,
            position,
            minutes: self.config.costs.extension_minutes,
        });
        push_charge(&mut plan, obligation.sender, obligation.category, cost);
        Ok(plan)
    }

    /// Shared preconditions of moves to the front of the queue.
    fn front_move_target(
        &self,
        action: PlannedAction,
        from: usize,
    ) -> Result<&'a DeliveryObligation, ValidationFailure> {
        if from < 2 || from > self.queue.capacity() {
            return Err(ValidationFailure::InvalidPosition {
                position: from,
                capacity: self.queue.capacity(),
            });
        }
        let obligation = self
            .queue
            .get(from)
            .ok_or(ValidationFailure::EmptySlot { position: from })?;
        self.check_forbidden(action.kind(), obligation)?;
        if self.queue.get(1).is_some() {
            return Err(ValidationFailure::TargetOccupied { position: 1 });
        }
        Ok(obligation)
    }

    fn check_new(&self, obligation: &DeliveryObligation) -> Result<(), ValidationFailure> {
        if let Some(position) = self.queue.find_position(obligation.id) {
            return Err(ValidationFailure::AlreadyQueued {
                id: obligation.id,
                position,
            });
        }
        if obligation.state != ObligationState::Offered {
            return Err(ValidationFailure::NotOffered {
                id: obligation.id,
                state: obligation.state,
            });
        }
        Ok(())
    }

    fn check_in_range(&self, position: usize) -> Result<(), ValidationFailure> {
        if self.queue.in_range(position) {
            Ok(())
        } else {
            Err(ValidationFailure::InvalidPosition {
                position,
                capacity: self.queue.capacity(),
            })
        }
    }

    fn check_forbidden(
        &self,
        action: QueueAction,
        obligation: &DeliveryObligation,
    ) -> Result<(), ValidationFailure> {
        match self.overlay.forbidden_reason(action, obligation) {
            Some(reason) => Err(ValidationFailure::Forbidden { reason }),
            None => Ok(()),
        }
    }

    fn check_balance(
        &self,
        npc: NpcId,
        category: RelationshipCategory,
        required: u32,
    ) -> Result<(), ValidationFailure> {
        let available = self.store.balance(npc, category);
        if i64::from(available) < i64::from(required) {
            return Err(ValidationFailure::InsufficientTokens {
                category,
                required,
                available,
            });
        }
        Ok(())
    }

    /// Apply cost modifiers, rounding up. An empty modifier list is exact.
    fn scaled_cost(&self, base: u32) -> u32 {
        let factor: f32 = self.cost_modifiers.iter().product();
        if base == 0 || (factor - 1.0).abs() < f32::EPSILON {
            return base;
        }
        (base as f32 * factor).ceil().max(0.0) as u32
    }

    fn finish(
        &self,
        action: PlannedAction,
        result: Result<DisplacementPlan, ValidationFailure>,
    ) -> DisplacementPlan {
        match result {
            Ok(plan) => {
                debug!(
                    ?action,
                    movements = plan.movements.len(),
                    evictions = plan.evictions.len(),
                    cost = plan.total_cost(),
                    "planned queue action"
                );
                plan
            }
            Err(failure) => {
                debug!(?action, %failure, "queue action not executable");
                DisplacementPlan::rejected(action, self.clock, failure)
            }
        }
    }
}

fn push_charge(plan: &mut DisplacementPlan, npc: NpcId, category: RelationshipCategory, amount: u32) {
    if amount > 0 {
        plan.charges.push(TokenCharge::new(npc, category, amount));
    }
}
