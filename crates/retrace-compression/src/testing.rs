//! Path builders for unit tests

use retrace_model::{
    ActionCategory, ActionEffects, ActionId, ActionMetaData, ActionNode, ObjectCategory, ObjectId, ObjectProxy,
    ObjectRef, Operation, StateId,
};
use serde_json::Value;

pub(crate) fn view(id: u64) -> ObjectRef {
    ObjectRef::new(ObjectId(id), ObjectProxy::new(id, format!("view{id}"), ObjectCategory::Visual))
}

pub(crate) fn action_with(id: u64, f_id: &str, inputs: &[&ObjectRef], parameter: Value, effects: ActionEffects) -> ActionNode {
    ActionNode::new(
        ActionId(id),
        f_id,
        inputs.iter().map(|r| (*r).clone()).collect(),
        parameter,
        ActionMetaData::new(f_id, ActionCategory::Data, Operation::Update),
        StateId(id * 2),
        StateId(id * 2 + 1),
        effects,
    )
}

pub(crate) fn action(id: u64, f_id: &str, inputs: &[&ObjectRef], parameter: Value) -> ActionNode {
    action_with(id, f_id, inputs, parameter, ActionEffects::default())
}

pub(crate) fn ids(path: &[ActionNode]) -> Vec<u64> {
    path.iter().map(|a| a.id().get()).collect()
}
