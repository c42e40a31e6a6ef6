//! The obligation engine - one place that owns queue, store, overlay and clock.
//!
//! Callers plan through `&self` and commit through `&mut self`, so the
//! apply-and-rollback sequence can never interleave with another writer.

use courier_rules::{
    ConfigError, DeliveryObligation, EngineConfig, GameClock, NpcId, ObligationId,
    RelationshipCategory, RelationshipLedger, RelationshipStore, StandingObligation,
    StandingObligationId,
};
use tracing::{debug, info, warn};

use crate::error::{InvariantViolation, LifecycleFailure, StandingError};
use crate::executor::{DeliveryReceipt, ElapseReport, ExecutionResult, QueueExecutor};
use crate::leverage::{LeverageCalculator, LeverageData};
use crate::overlay::{BrokenObligation, StandingOverlay};
use crate::planner::{DisplacementPlan, QueuePlanner, TokenCharge};
use crate::queue::ObligationQueue;

/// Facade over the planner, executor, leverage calculator and overlay.
pub struct ObligationEngine<S: RelationshipStore = RelationshipLedger> {
    config: EngineConfig,
    queue: ObligationQueue,
    store: S,
    overlay: StandingOverlay,
    leverage: LeverageCalculator,
    clock: GameClock,
    cost_modifiers: Vec<f32>,
}

impl ObligationEngine<RelationshipLedger> {
    /// Default configuration and an empty in-memory ledger.
    pub fn with_defaults() -> Self {
        let config = EngineConfig::default();
        Self {
            queue: ObligationQueue::new(config.capacity()),
            store: RelationshipLedger::new(),
            overlay: StandingOverlay::new(config.standing.clone()),
            leverage: LeverageCalculator::new(&config),
            clock: GameClock::default(),
            cost_modifiers: Vec::new(),
            config,
        }
    }
}

impl<S: RelationshipStore> ObligationEngine<S> {
    /// Create an engine with an empty queue.
    pub fn new(config: EngineConfig, store: S) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            queue: ObligationQueue::new(config.capacity()),
            overlay: StandingOverlay::new(config.standing.clone()),
            leverage: LeverageCalculator::new(&config),
            clock: GameClock::default(),
            cost_modifiers: Vec::new(),
            store,
            config,
        })
    }

    /// Resume from a saved queue. Its capacity must match the configuration.
    pub fn with_queue(mut self, queue: ObligationQueue) -> Result<Self, ConfigError> {
        if queue.capacity() != self.config.capacity() {
            return Err(ConfigError::Invalid(format!(
                "queue has {} slots but queue.capacity is {}",
                queue.capacity(),
                self.config.capacity()
            )));
        }
        self.queue = queue;
        Ok(self)
    }

    /// Resume at a given point in time.
    pub fn with_clock(mut self, clock: GameClock) -> Self {
        self.clock = clock;
        self.leverage.invalidate(clock.turn);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn queue(&self) -> &ObligationQueue {
        &self.queue
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Direct access for collaborators that grant or take tokens outside the queue.
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn overlay(&self) -> &StandingOverlay {
        &self.overlay
    }

    pub fn clock(&self) -> GameClock {
        self.clock
    }

    pub fn cost_modifiers(&self) -> &[f32] {
        &self.cost_modifiers
    }

    /// Replace the multiplicative cost factors from equipment and items.
    ///
    /// Factors that are not finite and positive are dropped.
    pub fn set_cost_modifiers(&mut self, modifiers: Vec<f32>) {
        let (valid, invalid): (Vec<f32>, Vec<f32>) = modifiers
            .into_iter()
            .partition(|m| m.is_finite() && *m > 0.0);
        if !invalid.is_empty() {
            warn!(?invalid, "ignoring invalid cost modifiers");
        }
        self.cost_modifiers = valid;
    }

    fn planner(&self) -> QueuePlanner<'_, S> {
        QueuePlanner::new(
            &self.config,
            &self.queue,
            &self.store,
            &self.overlay,
            &self.leverage,
            self.clock,
        )
        .with_cost_modifiers(&self.cost_modifiers)
    }

    fn executor(&mut self) -> QueueExecutor<'_, S> {
        QueueExecutor::new(
            &self.config,
            &mut self.queue,
            &mut self.store,
            &self.overlay,
            self.clock,
        )
    }

    pub fn plan_insert(&self, obligation: DeliveryObligation) -> DisplacementPlan {
        self.planner().plan_insert(obligation)
    }

    pub fn plan_insert_at(&self, obligation: DeliveryObligation, position: usize) -> DisplacementPlan {
        self.planner().plan_insert_at(obligation, position)
    }

    pub fn plan_append(&self, obligation: DeliveryObligation) -> DisplacementPlan {
        self.planner().plan_append(obligation)
    }

    pub fn plan_skip(&self, from: usize) -> DisplacementPlan {
        self.planner().plan_skip(from)
    }

    pub fn plan_priority_move(&self, from: usize) -> DisplacementPlan {
        self.planner().plan_priority_move(from)
    }

    pub fn plan_purge(&self, payment: &[TokenCharge]) -> DisplacementPlan {
        self.planner().plan_purge(payment)
    }

    pub fn plan_swap(&self, first: usize, second: usize) -> DisplacementPlan {
        self.planner().plan_swap(first, second)
    }

    pub fn plan_extend(&self, position: usize) -> DisplacementPlan {
        self.planner().plan_extend(position)
    }

    /// Commit a plan. See [`QueueExecutor::apply`].
    pub fn execute_plan(
        &mut self,
        plan: DisplacementPlan,
    ) -> Result<ExecutionResult, InvariantViolation> {
        if plan.turn() != self.clock.turn {
            debug!(
                planned_turn = plan.turn(),
                turn = self.clock.turn,
                "executing a plan built on an earlier turn"
            );
        }
        self.executor().apply(plan)
    }

    pub fn leverage(&self, npc: NpcId, category: RelationshipCategory) -> LeverageData {
        self.leverage
            .compute(npc, category, &self.store, self.overlay.obligations())
    }

    pub fn accept_standing_obligation(
        &mut self,
        obligation: StandingObligation,
    ) -> Result<StandingObligationId, StandingError> {
        self.overlay.accept(obligation, self.clock.day)
    }

    pub fn break_standing_obligation(
        &mut self,
        id: StandingObligationId,
    ) -> Result<BrokenObligation, StandingError> {
        self.overlay.break_obligation(id, &mut self.store)
    }

    /// Reset a forced-insertion counter once the forced obligation exists.
    pub fn record_forced_insertion(&mut self, id: StandingObligationId) -> Result<(), StandingError> {
        self.overlay.record_forced_insertion(id)
    }

    pub fn collect(&mut self, position: usize) -> Result<ObligationId, LifecycleFailure> {
        self.executor().collect(position)
    }

    pub fn deliver(&mut self) -> Result<DeliveryReceipt, LifecycleFailure> {
        self.executor().deliver()
    }

    pub fn elapse(&mut self, minutes: i32) -> Result<ElapseReport, InvariantViolation> {
        self.executor().elapse(minutes)
    }

    /// Advance one time block. Cached leverage is dropped.
    pub fn advance_turn(&mut self) -> u64 {
        let turn = self.clock.advance_turn();
        self.leverage.invalidate(turn);
        turn
    }

    /// Advance to the next morning.
    ///
    /// Returns whether a standing obligation now demands a forced obligation.
    pub fn advance_day(&mut self) -> bool {
        let day = self.clock.advance_day();
        self.leverage.invalidate(self.clock.turn);
        self.overlay.advance_day();

        let due = self.overlay.forced_insertion_due();
        info!(day, forced_insertion_due = due, "new day");
        due
    }
}
