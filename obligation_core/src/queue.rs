//! The obligation queue - a fixed number of ordered slots.
//!
//! Positions are 1-indexed. The slot count never changes after construction,
//! and an obligation id occupies at most one slot. Breaking either rule is an
//! [`InvariantViolation`], not a validation failure.

use courier_rules::{DeliveryObligation, ObligationId};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::error::InvariantViolation;

/// Fixed-capacity, strictly ordered slot array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObligationQueue {
    slots: Vec<Option<DeliveryObligation>>,

    /// Day the free adjacent swap was last used.
    last_swap_day: Option<u32>,
}

impl ObligationQueue {
    /// Create an empty queue with `capacity` slots.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
            last_swap_day: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Check whether a position lies within the queue.
    pub fn in_range(&self, position: usize) -> bool {
        (1..=self.capacity()).contains(&position)
    }

    /// Get the obligation at a position. Out-of-range positions read as empty.
    pub fn get(&self, position: usize) -> Option<&DeliveryObligation> {
        if !self.in_range(position) {
            return None;
        }
        self.slots[position - 1].as_ref()
    }

    pub(crate) fn get_mut(&mut self, position: usize) -> Option<&mut DeliveryObligation> {
        if !self.in_range(position) {
            return None;
        }
        self.slots[position - 1].as_mut()
    }

    /// Replace the contents of a slot, returning what was there.
    pub fn set(
        &mut self,
        position: usize,
        obligation: Option<DeliveryObligation>,
    ) -> Result<Option<DeliveryObligation>, InvariantViolation> {
        self.check_position(position)?;

        if let Some(incoming) = &obligation {
            if let Some(existing) = self.find_position(incoming.id) {
                if existing != position {
                    let violation = InvariantViolation::DuplicateObligation {
                        id: incoming.id,
                        position,
                        existing,
                    };
                    error!(%violation, "queue invariant violated");
                    return Err(violation);
                }
            }
        }

        Ok(std::mem::replace(&mut self.slots[position - 1], obligation))
    }

    /// Empty a slot, returning its occupant.
    pub fn take(&mut self, position: usize) -> Result<Option<DeliveryObligation>, InvariantViolation> {
        self.set(position, None)
    }

    /// Find the 1-indexed position of an obligation.
    pub fn find_position(&self, id: ObligationId) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|o| o.id == id))
            .map(|index| index + 1)
    }

    pub fn contains(&self, id: ObligationId) -> bool {
        self.find_position(id).is_some()
    }

    pub fn occupied_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn empty_count(&self) -> usize {
        self.capacity() - self.occupied_count()
    }

    pub fn is_full(&self) -> bool {
        self.slots.iter().all(|slot| slot.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(|slot| slot.is_none())
    }

    /// First empty position, if any.
    pub fn first_empty(&self) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.is_none())
            .map(|index| index + 1)
    }

    /// Iterate occupied slots as (position, obligation), front to back.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &DeliveryObligation)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|o| (index + 1, o)))
    }

    /// Ids of every queued obligation, front to back.
    pub fn ids(&self) -> Vec<ObligationId> {
        self.iter().map(|(_, o)| o.id).collect()
    }

    pub fn last_swap_day(&self) -> Option<u32> {
        self.last_swap_day
    }

    pub(crate) fn set_last_swap_day(&mut self, day: Option<u32>) {
        self.last_swap_day = day;
    }

    fn check_position(&self, position: usize) -> Result<(), InvariantViolation> {
        if self.in_range(position) {
            return Ok(());
        }
        let violation = InvariantViolation::PositionOutOfRange {
            position,
            capacity: self.capacity(),
        };
        error!(%violation, "queue invariant violated");
        Err(violation)
    }
}
