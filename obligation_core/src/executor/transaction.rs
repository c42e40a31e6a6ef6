//! Undo journal over the queue and the relationship store.

use courier_rules::{
    DeliveryObligation, LifecycleError, NpcId, RelationshipCategory, RelationshipStore, TokenError,
};
use tracing::{debug, error};

use crate::error::{CommitFailure, InvariantViolation};
use crate::queue::ObligationQueue;

/// Inverse of one applied write.
#[derive(Debug)]
enum UndoStep {
    Slot {
        position: usize,
        previous: Option<DeliveryObligation>,
    },
    Tokens {
        npc: NpcId,
        category: RelationshipCategory,
        delta: i32,
    },
    FailureLeverage {
        npc: NpcId,
        amount: i32,
    },
    SwapDay(Option<u32>),
}

/// Why a transactional step stopped.
#[derive(Debug)]
pub(crate) enum StepError {
    Commit(CommitFailure),
    Invariant(InvariantViolation),
}

impl From<CommitFailure> for StepError {
    fn from(failure: CommitFailure) -> Self {
        StepError::Commit(failure)
    }
}

impl From<TokenError> for StepError {
    fn from(err: TokenError) -> Self {
        StepError::Commit(CommitFailure::StoreRefused(err))
    }
}

impl From<InvariantViolation> for StepError {
    fn from(violation: InvariantViolation) -> Self {
        StepError::Invariant(violation)
    }
}

impl From<LifecycleError> for StepError {
    fn from(err: LifecycleError) -> Self {
        StepError::Invariant(err.into())
    }
}

/// Every write goes through here and is journaled, so a failed commit can be
/// unwound to the exact pre-call state.
pub(crate) struct Transaction<'t, S: RelationshipStore + ?Sized> {
    queue: &'t mut ObligationQueue,
    store: &'t mut S,
    journal: Vec<UndoStep>,
}

impl<'t, S: RelationshipStore + ?Sized> Transaction<'t, S> {
    pub(crate) fn begin(queue: &'t mut ObligationQueue, store: &'t mut S) -> Self {
        Self {
            queue,
            store,
            journal: Vec::new(),
        }
    }

    pub(crate) fn queue(&self) -> &ObligationQueue {
        &*self.queue
    }

    /// Empty a slot, returning its occupant.
    pub(crate) fn take(
        &mut self,
        position: usize,
    ) -> Result<Option<DeliveryObligation>, InvariantViolation> {
        let previous = self.queue.take(position)?;
        self.journal.push(UndoStep::Slot {
            position,
            previous: previous.clone(),
        });
        Ok(previous)
    }

    /// Put an obligation into an empty slot. Overwriting is a defect.
    pub(crate) fn place(
        &mut self,
        position: usize,
        obligation: DeliveryObligation,
    ) -> Result<(), InvariantViolation> {
        if let Some(occupant) = self.queue.get(position) {
            let violation = InvariantViolation::OccupiedSlot {
                position,
                occupant: occupant.id,
            };
            error!(%violation, "queue invariant violated");
            return Err(violation);
        }
        self.queue.set(position, Some(obligation))?;
        self.journal.push(UndoStep::Slot {
            position,
            previous: None,
        });
        Ok(())
    }

    pub(crate) fn spend(
        &mut self,
        npc: NpcId,
        category: RelationshipCategory,
        amount: u32,
    ) -> Result<(), TokenError> {
        self.store.spend(npc, category, amount)?;
        self.journal.push(UndoStep::Tokens {
            npc,
            category,
            delta: amount as i32,
        });
        Ok(())
    }

    pub(crate) fn adjust(&mut self, npc: NpcId, category: RelationshipCategory, delta: i32) {
        self.store.adjust(npc, category, delta);
        self.journal.push(UndoStep::Tokens {
            npc,
            category,
            delta: -delta,
        });
    }

    pub(crate) fn add_failure_leverage(&mut self, npc: NpcId, amount: i32) {
        self.store.add_failure_leverage(npc, amount);
        self.journal.push(UndoStep::FailureLeverage {
            npc,
            amount: -amount,
        });
    }

    pub(crate) fn set_swap_day(&mut self, day: Option<u32>) {
        let previous = self.queue.last_swap_day();
        self.queue.set_last_swap_day(day);
        self.journal.push(UndoStep::SwapDay(previous));
    }

    /// Keep every write.
    pub(crate) fn commit(self) -> usize {
        self.journal.len()
    }

    /// Undo every write in reverse order.
    pub(crate) fn rollback(self) -> Result<(), InvariantViolation> {
        let steps = self.journal.len();
        for step in self.journal.into_iter().rev() {
            match step {
                UndoStep::Slot { position, previous } => {
                    self.queue.set(position, previous)?;
                }
                UndoStep::Tokens {
                    npc,
                    category,
                    delta,
                } => self.store.adjust(npc, category, delta),
                UndoStep::FailureLeverage { npc, amount } => {
                    self.store.add_failure_leverage(npc, amount)
                }
                UndoStep::SwapDay(day) => self.queue.set_last_swap_day(day),
            }
        }
        debug!(steps, "rolled back transaction");
        Ok(())
    }
}
