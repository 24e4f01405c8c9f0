//! Graph nodes
//!
//! States are vertices, actions are the edges between a state and its
//! successor. Nodes refer to each other by id; the graph stores them in flat
//! tables.

use crate::action::{ActionDescriptor, ActionMetaData};
use crate::ids::{ActionId, StateId};
use crate::object::ObjectRef;
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Point-in-time vertex of the provenance graph
#[derive(Debug, Clone, PartialEq)]
pub struct StateNode {
    /// Graph-unique id
    pub id: StateId,
    /// Optional name, shown on story slides
    pub name: Option<String>,
    /// Free-form description
    pub description: String,
    /// Incoming edge; `None` only for the root
    pub parent: Option<ActionId>,
    /// Outgoing edges in creation order. More than one means the user went
    /// back and branched.
    pub children: Vec<ActionId>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl StateNode {
    /// Root state
    #[must_use]
    pub fn root(id: StateId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: Some(name.into()),
            description: String::new(),
            parent: None,
            children: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// State produced by `parent`
    #[must_use]
    pub fn produced_by(id: StateId, parent: ActionId, name: Option<String>) -> Self {
        Self {
            id,
            name,
            description: String::new(),
            parent: Some(parent),
            children: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// True for the root state
    #[inline]
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Most recently created outgoing edge
    #[inline]
    #[must_use]
    pub fn latest_child(&self) -> Option<ActionId> {
        self.children.last().copied()
    }
}

/// Executed action connecting two states
///
/// `f_id`, inputs and parameter are fixed at creation. Only the cached
/// inverse may change, when the action is executed again.
#[derive(Debug, Clone)]
pub struct ActionNode {
    id: ActionId,
    f_id: String,
    inputs: Vec<ObjectRef>,
    parameter: Value,
    meta: ActionMetaData,
    previous_state: StateId,
    result_state: StateId,
    creates: Vec<ObjectRef>,
    removes: Vec<ObjectRef>,
    inverse: Option<ActionDescriptor>,
}

/// Parts of an action known once its executor has finished
#[derive(Debug, Clone, Default)]
pub struct ActionEffects {
    /// Objects whose lifetime starts with this action
    pub creates: Vec<ObjectRef>,
    /// Objects whose lifetime ends with this action
    pub removes: Vec<ObjectRef>,
    /// Inverse produced by the executor
    pub inverse: Option<ActionDescriptor>,
}

impl ActionNode {
    /// Create an action node
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        id: ActionId,
        f_id: impl Into<String>,
        inputs: Vec<ObjectRef>,
        parameter: Value,
        meta: ActionMetaData,
        previous_state: StateId,
        result_state: StateId,
        effects: ActionEffects,
    ) -> Self {
        Self {
            id,
            f_id: f_id.into(),
            inputs,
            parameter,
            meta,
            previous_state,
            result_state,
            creates: effects.creates,
            removes: effects.removes,
            inverse: effects.inverse,
        }
    }

    /// Graph-unique id
    #[inline]
    #[must_use]
    pub fn id(&self) -> ActionId {
        self.id
    }

    /// Executor key
    #[inline]
    #[must_use]
    pub fn f_id(&self) -> &str {
        &self.f_id
    }

    /// Resolved inputs
    #[inline]
    #[must_use]
    pub fn inputs(&self) -> &[ObjectRef] {
        &self.inputs
    }

    /// Parameter payload
    #[inline]
    #[must_use]
    pub fn parameter(&self) -> &Value {
        &self.parameter
    }

    /// Metadata
    #[inline]
    #[must_use]
    pub fn meta(&self) -> &ActionMetaData {
        &self.meta
    }

    /// State the action was applied from
    #[inline]
    #[must_use]
    pub fn previous_state(&self) -> StateId {
        self.previous_state
    }

    /// State the action produced
    #[inline]
    #[must_use]
    pub fn result_state(&self) -> StateId {
        self.result_state
    }

    /// Objects created by this action
    #[inline]
    #[must_use]
    pub fn creates(&self) -> &[ObjectRef] {
        &self.creates
    }

    /// Objects removed by this action
    #[inline]
    #[must_use]
    pub fn removes(&self) -> &[ObjectRef] {
        &self.removes
    }

    /// Cached inverse, if the executor produced one
    #[inline]
    #[must_use]
    pub fn inverse(&self) -> Option<&ActionDescriptor> {
        self.inverse.as_ref()
    }

    /// True if the action can be reverted
    #[inline]
    #[must_use]
    pub fn is_reversible(&self) -> bool {
        self.inverse.is_some()
    }

    /// Replace the cached inverse after a re-execution
    pub fn refresh_inverse(&mut self, inverse: Option<ActionDescriptor>) {
        if inverse.is_some() {
            self.inverse = inverse;
        }
    }

    /// Drop the cached inverse
    pub fn clear_inverse(&mut self) {
        self.inverse = None;
    }

    /// Copy of this node as a descriptor over its resolved inputs
    #[must_use]
    pub fn to_descriptor(&self) -> ActionDescriptor {
        ActionDescriptor::over_refs(self.f_id.clone(), self.meta.clone(), &self.inputs, self.parameter.clone())
    }

    /// Same action reattached between two other states
    #[must_use]
    pub fn relinked(&self, id: ActionId, previous_state: StateId, result_state: StateId) -> Self {
        Self {
            id,
            previous_state,
            result_state,
            ..self.clone()
        }
    }
}

impl ActionNode {
    /// Same action over other inputs, placed between two other states.
    /// The cached inverse is kept only while the inputs are unchanged.
    #[must_use]
    pub fn copied(&self, id: ActionId, previous_state: StateId, result_state: StateId, inputs: Vec<ObjectRef>) -> Self {
        let same_inputs =
            inputs.len() == self.inputs.len() && inputs.iter().zip(&self.inputs).all(|(a, b)| a.id() == b.id());
        Self {
            inverse: if same_inputs { self.inverse.clone() } else { None },
            inputs,
            ..self.relinked(id, previous_state, result_state)
        }
    }
}

impl PartialEq for ActionNode {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
