//! Graph phase state machine
//!
//! A graph is `Idle` between operations and `Executing` while a push, jump
//! or restore is in flight. The operation queue makes sure at most one
//! operation executes; the phase records which one that is.

use crate::error::ProvenanceError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Phase of a provenance graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum GraphPhase {
    /// No operation in flight
    #[default]
    Idle,
    /// An operation is executing
    Executing,
}

/// Validates a phase transition.
///
/// # Errors
/// Returns [`ProvenanceError::IllegalPhase`] for anything but
/// `Idle -> Executing` and `Executing -> Idle`
pub fn validate_transition(from: GraphPhase, to: GraphPhase) -> Result<(), ProvenanceError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(ProvenanceError::IllegalPhase { from, to })
    }
}

/// Phases reachable from `from`
#[must_use]
pub fn allowed_transitions(from: GraphPhase) -> Vec<GraphPhase> {
    match from {
        GraphPhase::Idle => vec![GraphPhase::Executing],
        GraphPhase::Executing => vec![GraphPhase::Idle],
    }
}

/// Current phase of one graph
#[derive(Debug, Default)]
pub(crate) struct PhaseCell {
    phase: Mutex<GraphPhase>,
}

impl PhaseCell {
    pub(crate) fn get(&self) -> GraphPhase {
        *self.phase.lock()
    }

    /// Enter `Executing` until the guard is dropped
    pub(crate) fn enter(&self) -> Result<PhaseGuard<'_>, ProvenanceError> {
        let mut phase = self.phase.lock();
        validate_transition(*phase, GraphPhase::Executing)?;
        *phase = GraphPhase::Executing;
        Ok(PhaseGuard { cell: self })
    }
}

/// Returns the graph to `Idle` on drop
#[derive(Debug)]
pub(crate) struct PhaseGuard<'a> {
    cell: &'a PhaseCell,
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        *self.cell.phase.lock() = GraphPhase::Idle;
    }
}
