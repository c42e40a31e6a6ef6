//! Leverage Calculator - how much power a relationship holds over the queue.
//!
//! Leverage for an (NPC, category) pair is the sum of:
//! 1. **Token debt**: the magnitude of a negative token balance
//! 2. **Obligation leverage**: effect increments of relevant standing obligations
//! 3. **Failure leverage**: accumulated from past failed deliveries
//!
//! The total maps to an entry position and a displacement cost through ordered
//! tier tables, so tie-breaking is explicit in configuration.

mod cache;

pub use cache::*;

use std::cell::RefCell;
use std::collections::HashSet;

use courier_rules::{
    EngineConfig, LeverageConfig, NpcId, RelationshipCategory, RelationshipStore, StandingEffect,
    StandingObligation,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Coarse leverage bands for rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LeverageLevel {
    None,
    Low,
    Moderate,
    High,
    Extreme,
}

impl LeverageLevel {
    pub fn from_total(total: i32) -> Self {
        match total {
            t if t >= 10 => LeverageLevel::Extreme,
            t if t >= 5 => LeverageLevel::High,
            t if t >= 3 => LeverageLevel::Moderate,
            t if t >= 1 => LeverageLevel::Low,
            _ => LeverageLevel::None,
        }
    }
}

/// Computed leverage for one (NPC, category) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeverageData {
    pub npc: NpcId,
    pub category: RelationshipCategory,
    pub token_balance: i32,
    /// Absolute value of a negative balance; zero otherwise.
    pub token_debt: i32,
    pub obligation_leverage: i32,
    pub failure_leverage: i32,
    /// Never negative.
    pub total: i32,
    /// Names of the standing obligations that bear on this pair.
    pub sources: Vec<String>,
    pub target_position: usize,
    pub displacement_cost: u32,
    pub level: LeverageLevel,
}

impl LeverageData {
    pub fn has_leverage(&self) -> bool {
        self.total > 0
    }
}

/// Computes and memoizes leverage for the current turn.
#[derive(Debug)]
pub struct LeverageCalculator {
    config: LeverageConfig,
    capacity: usize,
    cache: RefCell<LeverageCache>,
}

impl LeverageCalculator {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            config: config.leverage.clone(),
            capacity: config.capacity(),
            cache: RefCell::new(LeverageCache::new()),
        }
    }

    /// Leverage for a pair, served from the turn cache when present.
    pub fn compute<S: RelationshipStore + ?Sized>(
        &self,
        npc: NpcId,
        category: RelationshipCategory,
        store: &S,
        standing: &[StandingObligation],
    ) -> LeverageData {
        if let Some(cached) = self.cache.borrow().get(npc, category) {
            return cached.clone();
        }

        let data = self.compute_uncached(npc, category, store, standing);
        self.cache.borrow_mut().insert(data.clone());
        data
    }

    /// Leverage for a pair, bypassing the cache.
    pub fn compute_uncached<S: RelationshipStore + ?Sized>(
        &self,
        npc: NpcId,
        category: RelationshipCategory,
        store: &S,
        standing: &[StandingObligation],
    ) -> LeverageData {
        let token_balance = store.balance(npc, category);
        let token_debt = if token_balance < 0 {
            token_balance.saturating_neg()
        } else {
            0
        };

        // A tag listed twice still counts once per obligation
        let mut obligation_leverage: i32 = 0;
        let mut sources = Vec::new();
        for obligation in standing.iter().filter(|o| o.applies_to(npc, category)) {
            let effects: HashSet<StandingEffect> = obligation.effects().collect();
            obligation_leverage = effects
                .iter()
                .fold(obligation_leverage, |sum, e| sum.saturating_add(e.leverage()));
            sources.push(obligation.name.clone());
        }

        let failure_leverage = store.failure_leverage(npc);
        let total = token_debt
            .saturating_add(obligation_leverage)
            .saturating_add(failure_leverage)
            .max(0);

        debug!(
            %npc,
            %category,
            token_debt,
            obligation_leverage,
            failure_leverage,
            total,
            "computed leverage"
        );

        LeverageData {
            npc,
            category,
            token_balance,
            token_debt,
            obligation_leverage,
            failure_leverage,
            total,
            sources,
            target_position: self.target_position(category, total),
            displacement_cost: self.displacement_cost(category, total),
            level: LeverageLevel::from_total(total),
        }
    }

    /// Entry position for a leverage total.
    ///
    /// Tiers are evaluated top-down; the first met threshold caps the position.
    /// Without a tier the position is `base - total / 2`. Always within the queue.
    pub fn target_position(&self, category: RelationshipCategory, total: i32) -> usize {
        let base = self.config.base_positions.get(category) as i64;
        let by_leverage = base - i64::from(total.max(0) / 2);

        let position = self
            .config
            .position_tiers
            .iter()
            .find(|tier| total >= tier.threshold)
            .map(|tier| by_leverage.min(tier.max_position as i64))
            .unwrap_or(by_leverage);

        position.clamp(1, self.capacity as i64) as usize
    }

    /// Token cost to displace an obligation with this much leverage.
    pub fn displacement_cost(&self, category: RelationshipCategory, total: i32) -> u32 {
        let multiplier = self.config.displacement_multipliers.get(category);
        let raw = self.config.displacement_base_cost.saturating_add(total.max(0)) as f32 * multiplier;
        let mut cost = raw.ceil() as i64;

        if total >= self.config.extreme_threshold {
            cost = cost.saturating_mul(2);
        }

        u32::try_from(cost.max(1)).unwrap_or(u32::MAX)
    }

    /// Clear memoized results if the turn advanced.
    pub fn invalidate(&self, turn: u64) -> bool {
        let cleared = self.cache.borrow_mut().invalidate(turn);
        if cleared {
            debug!(turn, "leverage cache invalidated");
        }
        cleared
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.borrow().len()
    }
}
