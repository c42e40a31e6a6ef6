//! Turn-scoped memo of computed leverage.

use std::collections::HashMap;

use courier_rules::{NpcId, RelationshipCategory};

use super::LeverageData;

/// Leverage results keyed by (NPC, category), valid for a single turn.
#[derive(Debug, Clone, Default)]
pub struct LeverageCache {
    entries: HashMap<(NpcId, RelationshipCategory), LeverageData>,
    turn: u64,
}

impl LeverageCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, npc: NpcId, category: RelationshipCategory) -> Option<&LeverageData> {
        self.entries.get(&(npc, category))
    }

    pub fn insert(&mut self, data: LeverageData) {
        self.entries.insert((data.npc, data.category), data);
    }

    /// Turn the cached entries were computed on.
    pub fn turn(&self) -> u64 {
        self.turn
    }

    /// Drop every entry if `turn` differs from the cached turn.
    ///
    /// Returns whether anything was invalidated.
    pub fn invalidate(&mut self, turn: u64) -> bool {
        if turn == self.turn {
            return false;
        }
        self.turn = turn;
        self.entries.clear();
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leverage::LeverageLevel;

    fn data(npc: NpcId) -> LeverageData {
        LeverageData {
            npc,
            category: RelationshipCategory::Trust,
            token_balance: 0,
            token_debt: 0,
            obligation_leverage: 0,
            failure_leverage: 0,
            total: 0,
            sources: Vec::new(),
            target_position: 6,
            displacement_cost: 2,
            level: LeverageLevel::None,
        }
    }

    #[test]
    fn test_same_turn_keeps_entries() {
        let npc = NpcId::new();
        let mut cache = LeverageCache::new();
        cache.insert(data(npc));

        assert!(!cache.invalidate(0));
        assert!(cache.get(npc, RelationshipCategory::Trust).is_some());
        assert!(cache.get(npc, RelationshipCategory::Status).is_none());
    }

    #[test]
    fn test_new_turn_clears_entries() {
        let mut cache = LeverageCache::new();
        cache.insert(data(NpcId::new()));
        cache.insert(data(NpcId::new()));
        assert_eq!(cache.len(), 2);

        assert!(cache.invalidate(1));
        assert!(cache.is_empty());
        assert_eq!(cache.turn(), 1);
    }
}
