//! Relationship state and time tracking consumed by the obligation engine.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::entities::NpcId;
use crate::mechanics::RelationshipCategory;

/// Discrete game time. A turn is one time block; days contain several turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct GameClock {
    pub turn: u64,
    pub day: u32,
}

impl GameClock {
    pub fn new(turn: u64, day: u32) -> Self {
        Self { turn, day }
    }

    /// Advance one time block.
    pub fn advance_turn(&mut self) -> u64 {
        self.turn += 1;
        self.turn
    }

    /// Advance to the next morning. Crossing a day is also a turn boundary.
    pub fn advance_day(&mut self) -> u32 {
        self.day += 1;
        self.turn += 1;
        self.day
    }
}

/// A spend the store refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("insufficient {category} tokens with {npc}: required {required}, available {available}")]
    Insufficient {
        npc: NpcId,
        category: RelationshipCategory,
        required: u32,
        available: i32,
    },
    #[error("token store rejected the spend: {0}")]
    Rejected(String),
}

/// Read/write access to relationship tokens and failure history.
///
/// The engine never reaches for global state; the store is injected and
/// scoped to one simulation session.
pub trait RelationshipStore {
    /// Current token balance with an NPC. Unknown NPCs have a zero balance.
    fn balance(&self, npc: NpcId, category: RelationshipCategory) -> i32;

    /// Unconditionally shift a balance. Balances may go negative (debt).
    fn adjust(&mut self, npc: NpcId, category: RelationshipCategory, delta: i32);

    /// Accumulated leverage from failed deliveries.
    fn failure_leverage(&self, npc: NpcId) -> i32;

    fn add_failure_leverage(&mut self, npc: NpcId, amount: i32);

    /// Spend tokens the player actually holds.
    fn spend(
        &mut self,
        npc: NpcId,
        category: RelationshipCategory,
        amount: u32,
    ) -> Result<(), TokenError> {
        let available = self.balance(npc, category);
        if i64::from(available) < i64::from(amount) {
            return Err(TokenError::Insufficient {
                npc,
                category,
                required: amount,
                available,
            });
        }
        self.adjust(npc, category, -(amount as i32));
        Ok(())
    }
}

/// In-memory relationship store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RelationshipLedger {
    /// NPC -> category -> balance.
    tokens: HashMap<NpcId, HashMap<RelationshipCategory, i32>>,
    failure_leverage: HashMap<NpcId, i32>,
}

impl RelationshipLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_balance(&mut self, npc: NpcId, category: RelationshipCategory, balance: i32) {
        self.tokens.entry(npc).or_default().insert(category, balance);
        self.prune(npc);
    }

    /// Builder-style balance setup.
    pub fn with_balance(
        mut self,
        npc: NpcId,
        category: RelationshipCategory,
        balance: i32,
    ) -> Self {
        self.set_balance(npc, category, balance);
        self
    }

    /// Zero balances are not stored, so an undone adjustment leaves no trace.
    fn prune(&mut self, npc: NpcId) {
        if let Some(balances) = self.tokens.get_mut(&npc) {
            balances.retain(|_, balance| *balance != 0);
            if balances.is_empty() {
                self.tokens.remove(&npc);
            }
        }
    }
}

impl RelationshipStore for RelationshipLedger {
    fn balance(&self, npc: NpcId, category: RelationshipCategory) -> i32 {
        self.tokens
            .get(&npc)
            .and_then(|balances| balances.get(&category))
            .copied()
            .unwrap_or(0)
    }

    fn adjust(&mut self, npc: NpcId, category: RelationshipCategory, delta: i32) {
        let balance = self
            .tokens
            .entry(npc)
            .or_default()
            .entry(category)
            .or_insert(0);
        *balance = balance.saturating_add(delta);
        self.prune(npc);
    }

    fn failure_leverage(&self, npc: NpcId) -> i32 {
        self.failure_leverage.get(&npc).copied().unwrap_or(0)
    }

    fn add_failure_leverage(&mut self, npc: NpcId, amount: i32) {
        let leverage = self.failure_leverage.entry(npc).or_insert(0);
        *leverage = leverage.saturating_add(amount);
        if *leverage == 0 {
            self.failure_leverage.remove(&npc);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_npc_has_zero_balance() {
        let ledger = RelationshipLedger::new();
        assert_eq!(ledger.balance(NpcId::new(), RelationshipCategory::Trust), 0);
        assert_eq!(ledger.failure_leverage(NpcId::new()), 0);
    }

    #[test]
    fn test_spend_requires_balance() {
        let npc = NpcId::new();
        let mut ledger = RelationshipLedger::new().with_balance(npc, RelationshipCategory::Commerce, 3);

        assert!(ledger.spend(npc, RelationshipCategory::Commerce, 2).is_ok());
        assert_eq!(ledger.balance(npc, RelationshipCategory::Commerce), 1);

        let err = ledger
            .spend(npc, RelationshipCategory::Commerce, 2)
            .unwrap_err();
        assert!(matches!(err, TokenError::Insufficient { available: 1, .. }));
        assert_eq!(ledger.balance(npc, RelationshipCategory::Commerce), 1);
    }

    #[test]
    fn test_adjust_can_create_debt() {
        let npc = NpcId::new();
        let mut ledger = RelationshipLedger::new();
        ledger.adjust(npc, RelationshipCategory::Status, -4);
        assert_eq!(ledger.balance(npc, RelationshipCategory::Status), -4);
    }

    #[test]
    fn test_reverted_adjustment_leaves_ledger_unchanged() {
        let npc = NpcId::new();
        let before = RelationshipLedger::new();
        let mut ledger = before.clone();

        ledger.adjust(npc, RelationshipCategory::Shadow, -1);
        ledger.add_failure_leverage(npc, 2);
        ledger.adjust(npc, RelationshipCategory::Shadow, 1);
        ledger.add_failure_leverage(npc, -2);
        assert_eq!(ledger, before);
    }

    #[test]
    fn test_adjust_saturates() {
        let npc = NpcId::new();
        let mut ledger = RelationshipLedger::new().with_balance(npc, RelationshipCategory::Trust, i32::MIN);
        ledger.adjust(npc, RelationshipCategory::Trust, -1);
        assert_eq!(ledger.balance(npc, RelationshipCategory::Trust), i32::MIN);

        ledger.add_failure_leverage(npc, i32::MAX);
        ledger.add_failure_leverage(npc, 1);
        assert_eq!(ledger.failure_leverage(npc), i32::MAX);
    }

    #[test]
    fn test_clock_day_is_turn_boundary() {
        let mut clock = GameClock::default();
        clock.advance_turn();
        assert_eq!(clock.advance_day(), 1);
        assert_eq!(clock.turn, 2);
    }

    #[test]
    fn test_ledger_serializes() {
        let npc = NpcId::new();
        let ledger = RelationshipLedger::new().with_balance(npc, RelationshipCategory::Trust, 2);
        let json = serde_json::to_string(&ledger).unwrap();
        let restored: RelationshipLedger = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, ledger);
    }
}
