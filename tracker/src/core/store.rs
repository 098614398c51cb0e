//! Append-only store of belief-state snapshots.
//!
//! Each store owns its own id sequence; two stores never share ids or
//! snapshots. Snapshots are immutable once registered.

use thiserror::Error;

use crate::core::operator::apply_operator;
use crate::core::types::{Operator, State, StateId, Weights};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    /// The weights cannot form a distribution.
    #[error("invalid state: {reason}")]
    InvalidState { reason: String },
    /// The id was never issued by this store.
    #[error("state {id} not found")]
    NotFound { id: StateId },
}

#[derive(Debug, Default)]
pub struct StateStore {
    states: Vec<State>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize `weights` and register them as a new snapshot.
    ///
    /// Fails when the total is not positive, when any weight is negative or
    /// non-finite, or when a name repeats.
    pub fn create_state<N: AsRef<str>>(
        &mut self,
        weights: impl IntoIterator<Item = (N, f64)>,
    ) -> Result<StateId, StoreError> {
        let mut raw = Weights::new();
        for (name, weight) in weights {
            let name = name.as_ref();
            if !weight.is_finite() || weight < 0.0 {
                return Err(StoreError::InvalidState {
                    reason: format!("weight for '{name}' must be a non-negative number, got {weight}"),
                });
            }
            if !raw.insert(name, weight) {
                return Err(StoreError::InvalidState {
                    reason: format!("duplicate item '{name}'"),
                });
            }
        }

        let total = raw.sum();
        if total <= 0.0 {
            return Err(StoreError::InvalidState {
                reason: format!("total weight must be > 0, got {total}"),
            });
        }

        let id = StateId::new(self.states.len() as u64);
        self.states.push(State {
            id,
            items: raw.map(|_, weight| weight / total),
        });
        Ok(id)
    }

    pub fn get_state(&self, id: StateId) -> Result<&State, StoreError> {
        self.states
            .get(id.seq() as usize)
            .filter(|state| state.id == id)
            .ok_or(StoreError::NotFound { id })
    }

    /// Apply an operator to a registered state and register the successor.
    ///
    /// An unknown target is a no-op that returns `id` itself; no new id is
    /// consumed in that case.
    pub fn apply(
        &mut self,
        id: StateId,
        operator: Operator,
        target: &str,
        strength: f64,
    ) -> Result<StateId, StoreError> {
        let state = self.get_state(id)?;
        if !state.items.contains(target) {
            return Ok(id);
        }
        let next = apply_operator(&state.items, operator, target, strength);
        self.create_state(next.iter())
    }

    /// Id of the most recently registered snapshot.
    pub fn latest(&self) -> Option<StateId> {
        self.states.last().map(|state| state.id)
    }

    /// Every snapshot, in id order.
    pub fn history(&self) -> &[State] {
        &self.states
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
