//! Transactional Queue Executor - commits plans all-or-nothing.
//!
//! The executor is the only writer of the queue and of token balances. A plan
//! is re-validated against current state before anything is written, then
//! applied through a journaled [`Transaction`]. Any failing step unwinds the
//! steps already applied, so a rolled-back commit leaves no trace.
//!
//! Lifecycle changes of queued obligations (collection, delivery, expiry) go
//! through the executor for the same reason.

mod transaction;

use transaction::{StepError, Transaction};

use std::collections::{BTreeMap, HashSet};

use courier_rules::{
    DeliveryObligation, EngineConfig, GameClock, LifecycleError, NpcId, ObligationId,
    ObligationState, QueueAction, RelationshipCategory, RelationshipStore,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::error::{CommitFailure, InvariantViolation, LifecycleFailure, ValidationFailure};
use crate::overlay::StandingOverlay;
use crate::planner::{
    DeadlineExtension, DisplacementPlan, EvictionReason, PlannedAction, SkippedObligation,
    SlotMovement, TokenCharge,
};
use crate::queue::ObligationQueue;

/// An obligation removed from the queue by a committed plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvictedObligation {
    pub obligation: DeliveryObligation,
    pub position: usize,
    pub reason: EvictionReason,
    pub penalty: u32,
}

/// What a committed plan did, for a messaging collaborator to render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub action: PlannedAction,
    pub movements: Vec<SlotMovement>,
    pub evicted: Vec<EvictedObligation>,
    pub skipped: Vec<SkippedObligation>,
    pub tokens_spent: Vec<TokenCharge>,
    pub extension: Option<DeadlineExtension>,
    /// Position of the newly queued obligation, for inserts and appends.
    pub inserted_at: Option<usize>,
    pub turn: u64,
    pub day: u32,
}

impl ExecutionReport {
    /// The committed action, without its parameters.
    pub fn kind(&self) -> QueueAction {
        self.action.kind()
    }

    /// Tokens spent across every charge line.
    pub fn total_spent(&self) -> u32 {
        self.tokens_spent
            .iter()
            .fold(0u32, |total, c| total.saturating_add(c.amount))
    }
}

/// Outcome of applying a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionResult {
    Committed(ExecutionReport),
    /// Nothing was changed.
    RolledBack(CommitFailure),
}

impl ExecutionResult {
    /// Whether every effect of the plan was kept.
    pub fn is_committed(&self) -> bool {
        matches!(self, ExecutionResult::Committed(_))
    }

    /// The report of a committed plan.
    pub fn report(&self) -> Option<&ExecutionReport> {
        match self {
            ExecutionResult::Committed(report) => Some(report),
            ExecutionResult::RolledBack(_) => None,
        }
    }

    /// Consume the result, keeping the report of a committed plan.
    pub fn into_report(self) -> Option<ExecutionReport> {
        match self {
            ExecutionResult::Committed(report) => Some(report),
            ExecutionResult::RolledBack(_) => None,
        }
    }

    /// Why the commit was rolled back.
    pub fn failure(&self) -> Option<&CommitFailure> {
        match self {
            ExecutionResult::Committed(_) => None,
            ExecutionResult::RolledBack(failure) => Some(failure),
        }
    }
}

/// A completed delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    pub obligation: DeliveryObligation,
    pub payment: u32,
    /// Paid on top by standing obligations.
    pub bonus: u32,
    /// Obligations that moved up to close the gap.
    pub movements: Vec<SlotMovement>,
}

impl DeliveryReceipt {
    /// Payment plus bonus.
    pub fn total_payment(&self) -> u32 {
        self.payment.saturating_add(self.bonus)
    }
}

/// An obligation whose deadline ran out, with what its sender gained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpiredObligation {
    pub obligation: DeliveryObligation,
    pub position: usize,
    pub failure_leverage: i32,
    pub token_penalty: u32,
}

/// What passing time did to the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ElapseReport {
    pub minutes: i32,
    pub expired: Vec<ExpiredObligation>,
    pub movements: Vec<SlotMovement>,
}

/// Applies plans and lifecycle changes to the queue and the store.
pub struct QueueExecutor<'a, S: RelationshipStore + ?Sized> {
    config: &'a EngineConfig,
    queue: &'a mut ObligationQueue,
    store: &'a mut S,
    overlay: &'a StandingOverlay,
    clock: GameClock,
}

impl<'a, S: RelationshipStore + ?Sized> QueueExecutor<'a, S> {
    /// Borrow the queue and store for the duration of one operation.
    pub fn new(
        config: &'a EngineConfig,
        queue: &'a mut ObligationQueue,
        store: &'a mut S,
        overlay: &'a StandingOverlay,
        clock: GameClock,
    ) -> Self {
        Self {
            config,
            queue,
            store,
            overlay,
            clock,
        }
    }

    /// Re-validate and apply a plan as one unit.
    ///
    /// Validation and commit failures come back as [`ExecutionResult::RolledBack`].
    /// An `Err` means the queue's invariants were broken; it is never a user
    /// error and must be propagated.
    pub fn apply(&mut self, plan: DisplacementPlan) -> Result<ExecutionResult, InvariantViolation> {
        if let Some(failure) = plan.failure.clone() {
            warn!(action = ?plan.action, %failure, "refusing to apply a rejected plan");
            return Ok(ExecutionResult::RolledBack(CommitFailure::PlanRejected(failure)));
        }

        if let Err(failure) = self.revalidate(&plan) {
            warn!(action = ?plan.action, %failure, "plan went stale before commit");
            return Ok(ExecutionResult::RolledBack(failure));
        }

        let action = plan.action;
        let mut tx = Transaction::begin(&mut *self.queue, &mut *self.store);

        match write_plan(&mut tx, plan, self.clock) {
            Ok(report) => {
                tx.commit();
                info!(
                    ?action,
                    moved = report.movements.len(),
                    evicted = report.evicted.len(),
                    spent = report.total_spent(),
                    "committed queue action"
                );
                Ok(ExecutionResult::Committed(report))
            }
            Err(StepError::Commit(failure)) => {
                tx.rollback()?;
                warn!(?action, %failure, "commit failed, rolled back");
                Ok(ExecutionResult::RolledBack(failure))
            }
            Err(StepError::Invariant(violation)) => {
                error!(?action, %violation, "invariant violated during commit");
                tx.rollback()?;
                Err(violation)
            }
        }
    }

    /// Check every plan precondition against current state. Writes nothing.
    fn revalidate(&self, plan: &DisplacementPlan) -> Result<(), CommitFailure> {
        let expected = plan
            .movements
            .iter()
            .map(|m| (m.obligation, m.from))
            .chain(plan.evictions.iter().map(|e| (e.obligation, e.position)))
            .chain(plan.skipped.iter().map(|s| (s.obligation, s.position)))
            .chain(plan.extension.iter().map(|e| (e.obligation, e.position)));
        for (id, position) in expected {
            let found = self.queue.get(position).map(|o| o.id);
            if found != Some(id) {
                return Err(CommitFailure::StaleSlot {
                    position,
                    expected: id,
                    found,
                });
            }
        }

        if let Some(placement) = &plan.placement {
            if self.queue.contains(placement.obligation.id) {
                return Err(CommitFailure::AlreadyQueued {
                    id: placement.obligation.id,
                });
            }
        }

        let vacated: HashSet<usize> = plan
            .movements
            .iter()
            .map(|m| m.from)
            .chain(plan.evictions.iter().map(|e| e.position))
            .collect();
        let destinations = plan
            .movements
            .iter()
            .map(|m| m.to)
            .chain(plan.placement.iter().map(|p| p.position));
        for position in destinations {
            if !self.queue.in_range(position) {
                return Err(CommitFailure::PlanRejected(ValidationFailure::InvalidPosition {
                    position,
                    capacity: self.queue.capacity(),
                }));
            }
            if self.queue.get(position).is_some() && !vacated.contains(&position) {
                return Err(CommitFailure::TargetOccupied { position });
            }
        }

        if plan.kind() == QueueAction::Swap && self.queue.last_swap_day() == Some(self.clock.day) {
            return Err(CommitFailure::SwapAlreadyUsed {
                day: self.clock.day,
            });
        }

        let mut totals: BTreeMap<(NpcId, RelationshipCategory), u64> = BTreeMap::new();
        for charge in &plan.charges {
            *totals.entry((charge.npc, charge.category)).or_insert(0) += u64::from(charge.amount);
        }
        for ((npc, category), required) in totals {
            let available = self.store.balance(npc, category);
            if i64::from(available) < i64::try_from(required).unwrap_or(i64::MAX) {
                let required = u32::try_from(required).unwrap_or(u32::MAX);
                return Err(CommitFailure::InsufficientTokens {
                    npc,
                    category,
                    required,
                    available,
                });
            }
        }

        Ok(())
    }

    /// Take custody of the obligation at `position`. It keeps its slot.
    pub fn collect(&mut self, position: usize) -> Result<ObligationId, LifecycleFailure> {
        if !self.queue.in_range(position) {
            return Err(ValidationFailure::InvalidPosition {
                position,
                capacity: self.queue.capacity(),
            }
            .into());
        }
        let obligation = self
            .queue
            .get_mut(position)
            .ok_or(ValidationFailure::EmptySlot { position })?;
        obligation.transition(ObligationState::Collected)?;

        info!(obligation = %obligation.id, position, "collected obligation");
        Ok(obligation.id)
    }

    /// Deliver the collected obligation at position 1.
    ///
    /// The slot is freed and the remaining obligations move up to close gaps.
    pub fn deliver(&mut self) -> Result<DeliveryReceipt, LifecycleFailure> {
        let front = self
            .queue
            .get(1)
            .ok_or(ValidationFailure::EmptySlot { position: 1 })?;
        if front.state != ObligationState::Collected {
            return Err(LifecycleError {
                id: front.id,
                from: front.state,
                to: ObligationState::Delivered,
            }
            .into());
        }
        let id = front.id;
        let bonus = self.overlay.bonus_payment(front);

        let mut tx = Transaction::begin(&mut *self.queue, &mut *self.store);
        match deliver_front(&mut tx, id) {
            Ok((obligation, movements)) => {
                tx.commit();
                info!(
                    obligation = %obligation.id,
                    recipient = %obligation.recipient,
                    payment = obligation.payment,
                    bonus,
                    "delivered obligation"
                );
                Ok(DeliveryReceipt {
                    payment: obligation.payment,
                    bonus,
                    obligation,
                    movements,
                })
            }
            Err(violation) => {
                error!(%violation, "invariant violated during delivery");
                tx.rollback()?;
                Err(violation.into())
            }
        }
    }

    /// Count down every queued deadline by `minutes`.
    ///
    /// Obligations whose deadline reaches zero expire: they leave the queue,
    /// their senders gain failure leverage and lose tokens, and the queue is
    /// compacted.
    pub fn elapse(&mut self, minutes: i32) -> Result<ElapseReport, InvariantViolation> {
        if minutes <= 0 {
            return Ok(ElapseReport {
                minutes,
                ..ElapseReport::default()
            });
        }

        let expiry = self.config.expiry.clone();
        let mut tx = Transaction::begin(&mut *self.queue, &mut *self.store);
        match elapse_queue(&mut tx, minutes, expiry.failure_leverage, expiry.token_penalty) {
            Ok(report) => {
                tx.commit();
                for expired in &report.expired {
                    info!(
                        obligation = %expired.obligation.id,
                        sender = %expired.obligation.sender,
                        position = expired.position,
                        "obligation expired"
                    );
                }
                Ok(report)
            }
            Err(violation) => {
                error!(%violation, "invariant violated while expiring obligations");
                tx.rollback()?;
                Err(violation)
            }
        }
    }
}

fn write_plan<S: RelationshipStore + ?Sized>(
    tx: &mut Transaction<'_, S>,
    plan: DisplacementPlan,
    clock: GameClock,
) -> Result<ExecutionReport, StepError> {
    let DisplacementPlan {
        action,
        movements,
        evictions,
        skipped,
        charges,
        extension,
        placement,
        ..
    } = plan;

    // Step 1: evictions leave first, freeing the tail
    let mut evicted = Vec::with_capacity(evictions.len());
    for eviction in &evictions {
        let mut obligation = lift(tx, eviction.obligation, eviction.position)?;
        obligation.transition(match eviction.reason {
            EvictionReason::PushedOut => ObligationState::Evicted,
            EvictionReason::Purged => ObligationState::Purged,
        })?;
        if eviction.penalty > 0 {
            tx.adjust(
                eviction.sender,
                eviction.category,
                -(eviction.penalty as i32),
            );
        }
        evicted.push(EvictedObligation {
            obligation,
            position: eviction.position,
            reason: eviction.reason,
            penalty: eviction.penalty,
        });
    }

    // Step 2: lift every mover before placing any, so chains never collide
    let mut lifted = Vec::with_capacity(movements.len());
    for movement in &movements {
        lifted.push((lift(tx, movement.obligation, movement.from)?, movement.to));
    }
    for (obligation, to) in lifted {
        tx.place(to, obligation)?;
    }

    // Step 3: the new obligation takes its slot
    let mut inserted_at = None;
    if let Some(placement) = placement {
        let mut obligation = placement.obligation;
        obligation.transition(ObligationState::Queued)?;
        tx.place(placement.position, obligation)?;
        inserted_at = Some(placement.position);
    }

    // Step 4: relationship penalties for jumped obligations
    for skip in &skipped {
        tx.adjust(skip.sender, skip.category, -(skip.penalty as i32));
    }

    if let Some(extension) = &extension {
        let mut obligation = lift(tx, extension.obligation, extension.position)?;
        obligation.deadline_minutes += extension.minutes;
        tx.place(extension.position, obligation)?;
    }

    if action.kind() == QueueAction::Swap {
        tx.set_swap_day(Some(clock.day));
    }

    // Step 5: spends last, so a refusing store unwinds everything above
    for charge in &charges {
        tx.spend(charge.npc, charge.category, charge.amount)?;
    }

    Ok(ExecutionReport {
        action,
        movements,
        evicted,
        skipped,
        tokens_spent: charges,
        extension,
        inserted_at,
        turn: clock.turn,
        day: clock.day,
    })
}

/// Remove an obligation that must be at `position`.
fn lift<S: RelationshipStore + ?Sized>(
    tx: &mut Transaction<'_, S>,
    id: ObligationId,
    position: usize,
) -> Result<DeliveryObligation, InvariantViolation> {
    match tx.take(position)? {
        Some(obligation) if obligation.id == id => Ok(obligation),
        _ => Err(InvariantViolation::MissingObligation { id }),
    }
}

fn deliver_front<S: RelationshipStore + ?Sized>(
    tx: &mut Transaction<'_, S>,
    id: ObligationId,
) -> Result<(DeliveryObligation, Vec<SlotMovement>), InvariantViolation> {
    let mut obligation = lift(tx, id, 1)?;
    obligation.transition(ObligationState::Delivered)?;
    let movements = compact(tx)?;
    Ok((obligation, movements))
}

fn elapse_queue<S: RelationshipStore + ?Sized>(
    tx: &mut Transaction<'_, S>,
    minutes: i32,
    failure_leverage: i32,
    token_penalty: u32,
) -> Result<ElapseReport, InvariantViolation> {
    let mut report = ElapseReport {
        minutes,
        ..ElapseReport::default()
    };

    let occupied: Vec<usize> = tx.queue().iter().map(|(position, _)| position).collect();
    for position in occupied {
        let Some(mut obligation) = tx.take(position)? else {
            continue;
        };
        obligation.deadline_minutes -= minutes;

        if !obligation.is_overdue() {
            tx.place(position, obligation)?;
            continue;
        }

        obligation.transition(ObligationState::Expired)?;
        tx.add_failure_leverage(obligation.sender, failure_leverage);
        if token_penalty > 0 {
            tx.adjust(
                obligation.sender,
                obligation.category,
                -(token_penalty as i32),
            );
        }
        report.expired.push(ExpiredObligation {
            obligation,
            position,
            failure_leverage,
            token_penalty,
        });
    }

    if !report.expired.is_empty() {
        report.movements = compact(tx)?;
    }
    Ok(report)
}

/// Move every obligation forward to close empty slots, preserving order.
fn compact<S: RelationshipStore + ?Sized>(
    tx: &mut Transaction<'_, S>,
) -> Result<Vec<SlotMovement>, InvariantViolation> {
    let occupied: Vec<(usize, ObligationId)> =
        tx.queue().iter().map(|(position, o)| (position, o.id)).collect();

    let mut movements = Vec::new();
    for (index, (from, id)) in occupied.into_iter().enumerate() {
        let to = index + 1;
        if from == to {
            continue;
        }
        let obligation = lift(tx, id, from)?;
        tx.place(to, obligation)?;
        movements.push(SlotMovement {
            obligation: id,
            from,
            to,
        });
    }
    Ok(movements)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leverage::LeverageCalculator;
    use crate::planner::QueuePlanner;
    use courier_rules::{RelationshipLedger, StandingEffect, StandingObligation, TokenError};

    struct Fixture {
        config: EngineConfig,
        queue: ObligationQueue,
        store: RelationshipLedger,
        overlay: StandingOverlay,
        leverage: LeverageCalculator,
        clock: GameClock,
    }

    impl Fixture {
        fn new() -> Self {
            let config = EngineConfig::default();
            Self {
                queue: ObligationQueue::new(config.capacity()),
                store: RelationshipLedger::new(),
                overlay: StandingOverlay::new(config.standing.clone()),
                leverage: LeverageCalculator::new(&config),
                clock: GameClock::default(),
                config,
            }
        }

        fn planner(&self) -> QueuePlanner<'_, RelationshipLedger> {
            QueuePlanner::new(
                &self.config,
                &self.queue,
                &self.store,
                &self.overlay,
                &self.leverage,
                self.clock,
            )
        }

        fn executor(&mut self) -> QueueExecutor<'_, RelationshipLedger> {
            QueueExecutor::new(
                &self.config,
                &mut self.queue,
                &mut self.store,
                &self.overlay,
                self.clock,
            )
        }

        fn fill(&mut self, position: usize, category: RelationshipCategory) -> DeliveryObligation {
            let mut letter = DeliveryObligation::new(NpcId::new(), NpcId::new(), category);
            letter.transition(ObligationState::Queued).unwrap();
            self.queue.set(position, Some(letter.clone())).unwrap();
            letter
        }
    }

    fn offered() -> DeliveryObligation {
        DeliveryObligation::new(NpcId::new(), NpcId::new(), RelationshipCategory::Trust)
    }

    #[test]
    fn test_insert_cascade_commits() {
        let mut fx = Fixture::new();
        let first = fx.fill(1, RelationshipCategory::Trust);
        let second = fx.fill(2, RelationshipCategory::Trust);
        let letter = offered();

        let plan = fx.planner().plan_insert_at(letter.clone(), 1);
        let result = fx.executor().apply(plan).unwrap();
        let report = result.report().unwrap();

        assert_eq!(report.inserted_at, Some(1));
        assert_eq!(report.movements.len(), 2);
        assert_eq!(fx.queue.find_position(letter.id), Some(1));
        assert_eq!(fx.queue.find_position(first.id), Some(2));
        assert_eq!(fx.queue.find_position(second.id), Some(3));
        assert_eq!(fx.queue.get(1).unwrap().state, ObligationState::Queued);
    }

    #[test]
    fn test_eviction_penalizes_sender() {
        let mut fx = Fixture::new();
        let mut tail = None;
        for position in 1..=8 {
            tail = Some(fx.fill(position, RelationshipCategory::Status));
        }
        let tail = tail.unwrap();

        let plan = fx.planner().plan_insert_at(offered(), 8);
        let report = fx.executor().apply(plan).unwrap().into_report().unwrap();

        assert_eq!(report.evicted.len(), 1);
        assert_eq!(report.evicted[0].obligation.id, tail.id);
        assert_eq!(report.evicted[0].obligation.state, ObligationState::Evicted);
        assert_eq!(
            fx.store.balance(tail.sender, RelationshipCategory::Status),
            -2
        );
        assert!(fx.queue.is_full());
    }

    #[test]
    fn test_rejected_plan_is_not_applied() {
        let mut fx = Fixture::new();
        let plan = fx.planner().plan_skip(3);
        let before = fx.queue.clone();

        let result = fx.executor().apply(plan).unwrap();
        assert_eq!(
            result.failure(),
            Some(&CommitFailure::PlanRejected(ValidationFailure::EmptySlot {
                position: 3
            }))
        );
        assert_eq!(fx.queue, before);
    }

    #[test]
    fn test_stale_plan_is_rolled_back() {
        let mut fx = Fixture::new();
        let skipper = fx.fill(3, RelationshipCategory::Commerce);
        fx.store
            .set_balance(skipper.sender, RelationshipCategory::Commerce, 2);
        let plan = fx.planner().plan_skip(3);
        assert!(plan.can_execute());

        // Tokens spent elsewhere before the commit.
        fx.store
            .set_balance(skipper.sender, RelationshipCategory::Commerce, 1);
        let result = fx.executor().apply(plan).unwrap();
        assert!(matches!(
            result.failure(),
            Some(CommitFailure::InsufficientTokens {
                required: 2,
                available: 1,
                ..
            })
        ));
        assert_eq!(fx.queue.find_position(skipper.id), Some(3));
    }

    #[test]
    fn test_moved_obligation_is_stale() {
        let mut fx = Fixture::new();
        let letter = fx.fill(4, RelationshipCategory::Trust);
        let plan = fx.planner().plan_swap(4, 5);

        let moved = fx.queue.take(4).unwrap();
        fx.queue.set(6, moved).unwrap();

        let result = fx.executor().apply(plan).unwrap();
        assert_eq!(
            result.failure(),
            Some(&CommitFailure::StaleSlot {
                position: 4,
                expected: letter.id,
                found: None
            })
        );
    }

    #[test]
    fn test_swap_once_per_day() {
        let mut fx = Fixture::new();
        fx.fill(2, RelationshipCategory::Trust);
        fx.fill(5, RelationshipCategory::Trust);
        let first = fx.planner().plan_swap(2, 3);
        let second = fx.planner().plan_swap(5, 6);

        assert!(fx.executor().apply(first).unwrap().is_committed());
        assert_eq!(fx.queue.last_swap_day(), Some(0));

        let result = fx.executor().apply(second).unwrap();
        assert_eq!(
            result.failure(),
            Some(&CommitFailure::SwapAlreadyUsed { day: 0 })
        );

        fx.clock.advance_day();
        let plan = fx.planner().plan_swap(5, 6);
        assert!(fx.executor().apply(plan).unwrap().is_committed());
    }

    /// A store that refuses every spend, even when the balance covers it.
    struct RefusingStore(RelationshipLedger);

    impl RelationshipStore for RefusingStore {
        fn balance(&self, npc: NpcId, category: RelationshipCategory) -> i32 {
            self.0.balance(npc, category)
        }
        fn adjust(&mut self, npc: NpcId, category: RelationshipCategory, delta: i32) {
            self.0.adjust(npc, category, delta)
        }
        fn failure_leverage(&self, npc: NpcId) -> i32 {
            self.0.failure_leverage(npc)
        }
        fn add_failure_leverage(&mut self, npc: NpcId, amount: i32) {
            self.0.add_failure_leverage(npc, amount)
        }
        fn spend(&mut self, _: NpcId, _: RelationshipCategory, _: u32) -> Result<(), TokenError> {
            Err(TokenError::Rejected("ledger locked".to_string()))
        }
    }

    #[test]
    fn test_store_refusal_unwinds_slot_changes() {
        let mut fx = Fixture::new();
        let jumped = fx.fill(2, RelationshipCategory::Trust);
        let skipper = fx.fill(3, RelationshipCategory::Trust);
        fx.store.set_balance(skipper.sender, RelationshipCategory::Trust, 5);
        let plan = fx.planner().plan_skip(3);

        let mut store = RefusingStore(fx.store.clone());
        let queue_before = fx.queue.clone();
        let result = QueueExecutor::new(&fx.config, &mut fx.queue, &mut store, &fx.overlay, fx.clock)
            .apply(plan)
            .unwrap();

        assert!(matches!(
            result.failure(),
            Some(CommitFailure::StoreRefused(TokenError::Rejected(_)))
        ));
        assert_eq!(fx.queue, queue_before);
        assert_eq!(store.0, fx.store);
        assert_eq!(store.balance(jumped.sender, RelationshipCategory::Trust), 0);
    }

    #[test]
    fn test_oversized_charges_fail_revalidation() {
        let mut fx = Fixture::new();
        let npc = NpcId::new();
        fx.store.set_balance(npc, RelationshipCategory::Trust, i32::MAX);

        let mut plan = DisplacementPlan::new(PlannedAction::Purge, fx.clock);
        plan.charges
            .push(TokenCharge::new(npc, RelationshipCategory::Trust, u32::MAX));
        plan.charges
            .push(TokenCharge::new(npc, RelationshipCategory::Trust, u32::MAX));

        let result = fx.executor().apply(plan).unwrap();
        assert_eq!(
            result.failure(),
            Some(&CommitFailure::InsufficientTokens {
                npc,
                category: RelationshipCategory::Trust,
                required: u32::MAX,
                available: i32::MAX,
            })
        );
        assert_eq!(fx.store.balance(npc, RelationshipCategory::Trust), i32::MAX);
    }

    #[test]
    fn test_collect_and_deliver() {
        let mut fx = Fixture::new();
        let mut letter = offered().with_payment(12);
        letter.transition(ObligationState::Queued).unwrap();
        let sender = letter.sender;
        fx.queue.set(1, Some(letter.clone())).unwrap();
        let behind = fx.fill(3, RelationshipCategory::Trust);
        fx.overlay
            .accept(
                StandingObligation::new("Patron's Favor")
                    .with_npc(sender)
                    .with_benefit(StandingEffect::BonusPayment),
                0,
            )
            .unwrap();

        let err = fx.executor().deliver().unwrap_err();
        assert!(matches!(err, LifecycleFailure::Transition(_)));

        assert_eq!(fx.executor().collect(1).unwrap(), letter.id);
        assert!(matches!(
            fx.executor().collect(1).unwrap_err(),
            LifecycleFailure::Transition(_)
        ));

        let receipt = fx.executor().deliver().unwrap();
        assert_eq!(receipt.obligation.state, ObligationState::Delivered);
        assert_eq!(receipt.total_payment(), 22);
        assert_eq!(
            receipt.movements,
            vec![SlotMovement {
                obligation: behind.id,
                from: 3,
                to: 1
            }]
        );
        assert!(!fx.queue.contains(letter.id));
        assert_eq!(fx.queue.occupied_count(), 1);
    }

    #[test]
    fn test_collect_rejects_empty_and_out_of_range() {
        let mut fx = Fixture::new();
        assert_eq!(
            fx.executor().collect(2).unwrap_err(),
            LifecycleFailure::Validation(ValidationFailure::EmptySlot { position: 2 })
        );
        assert!(matches!(
            fx.executor().collect(0).unwrap_err(),
            LifecycleFailure::Validation(ValidationFailure::InvalidPosition { .. })
        ));
        assert_eq!(
            fx.executor().deliver().unwrap_err(),
            LifecycleFailure::Validation(ValidationFailure::EmptySlot { position: 1 })
        );
    }

    #[test]
    fn test_elapse_expires_and_compacts() {
        let mut fx = Fixture::new();
        let mut urgent = offered().with_deadline_minutes(60);
        urgent.transition(ObligationState::Queued).unwrap();
        fx.queue.set(1, Some(urgent.clone())).unwrap();
        let patient = fx.fill(2, RelationshipCategory::Shadow);

        let report = fx.executor().elapse(90).unwrap();
        assert_eq!(report.expired.len(), 1);
        assert_eq!(report.expired[0].obligation.id, urgent.id);
        assert_eq!(report.expired[0].obligation.state, ObligationState::Expired);
        assert_eq!(fx.store.failure_leverage(urgent.sender), 2);
        assert_eq!(fx.store.balance(urgent.sender, RelationshipCategory::Trust), -1);

        assert_eq!(fx.queue.find_position(patient.id), Some(1));
        assert_eq!(
            fx.queue.get(1).unwrap().deadline_minutes,
            patient.deadline_minutes - 90
        );
    }

    #[test]
    fn test_elapse_without_expiry_keeps_positions() {
        let mut fx = Fixture::new();
        let letter = fx.fill(4, RelationshipCategory::Trust);

        let report = fx.executor().elapse(30).unwrap();
        assert!(report.expired.is_empty());
        assert!(report.movements.is_empty());
        assert_eq!(fx.queue.find_position(letter.id), Some(4));

        let report = fx.executor().elapse(0).unwrap();
        assert_eq!(report, ElapseReport::default());
    }

    #[test]
    fn test_extension_commits() {
        let mut fx = Fixture::new();
        let letter = fx.fill(2, RelationshipCategory::Commerce);
        fx.store
            .set_balance(letter.sender, RelationshipCategory::Commerce, 2);

        let plan = fx.planner().plan_extend(2);
        let report = fx.executor().apply(plan).unwrap().into_report().unwrap();
        assert_eq!(report.total_spent(), 2);
        assert_eq!(
            fx.queue.get(2).unwrap().deadline_minutes,
            letter.deadline_minutes + 2880
        );
        assert_eq!(
            fx.store.balance(letter.sender, RelationshipCategory::Commerce),
            0
        );
    }
}
