//! Persistence
//!
//! A [`GraphDump`] is the plain JSON shape of a graph: states, actions,
//! the object table and the current state id. Restoring rebuilds the
//! structure only; no executor runs and object values stay detached until
//! the application touches them again.

use crate::config::GraphConfig;
use crate::dag::Dag;
use crate::error::ProvenanceError;
use crate::events::GraphEvent;
use crate::graph::ProvenanceGraph;
use crate::registry::ActionRegistry;
use crate::story::Story;
use crate::types::GraphDesc;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use retrace_compression::CompressorRegistry;
use retrace_model::{
    ActionDescriptor, ActionEffects, ActionId, ActionMetaData, ActionNode, IdAllocator, ObjectCategory, ObjectId,
    ObjectInput, ObjectProxy, ObjectRef, ObjectRegistry, StateId, StateNode,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Serialized graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphDump {
    /// States in creation order, root first
    pub states: Vec<StateDump>,
    /// Actions in creation order
    pub actions: Vec<ActionDump>,
    /// Object table
    pub objects: Vec<ObjectDump>,
    /// Current state
    pub current_state_id: StateId,
    /// Stories
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stories: Vec<Story>,
}

/// Serialized state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateDump {
    /// Id
    pub id: StateId,
    /// Name
    #[serde(default)]
    pub name: Option<String>,
    /// Incoming action, `None` for the root
    pub parent_action_id: Option<ActionId>,
    /// Description
    #[serde(default)]
    pub description: String,
    /// Creation time
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Serialized action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionDump {
    /// Id
    pub id: ActionId,
    /// Executor key
    #[serde(rename = "f_id")]
    pub f_id: String,
    /// Parameter payload
    pub parameter: Value,
    /// Inputs
    pub input_ref_ids: Vec<ObjectId>,
    /// State the action was applied from
    pub previous_state_id: StateId,
    /// State the action produced
    pub result_state_id: StateId,
    /// Objects created by the action
    #[serde(default)]
    pub creates_ref_ids: Vec<ObjectId>,
    /// Objects removed by the action
    #[serde(default)]
    pub removes_ref_ids: Vec<ObjectId>,
    /// Metadata
    pub meta: ActionMetaData,
    /// Cached inverse
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inverse: Option<DescriptorDump>,
}

/// Serialized action descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DescriptorDump {
    /// Executor key
    #[serde(rename = "f_id")]
    pub f_id: String,
    /// Inputs
    pub input_ref_ids: Vec<ObjectId>,
    /// Parameter payload
    pub parameter: Value,
    /// Metadata
    pub meta: ActionMetaData,
}

/// Serialized object reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectDump {
    /// Id
    pub id: ObjectId,
    /// Name
    pub name: String,
    /// Category
    pub category: ObjectCategory,
    /// Content hash
    pub hash: String,
    /// Description
    #[serde(default)]
    pub description: String,
}

impl From<&ObjectRef> for ObjectDump {
    fn from(r: &ObjectRef) -> Self {
        Self {
            id: r.id(),
            name: r.name().to_owned(),
            category: r.category(),
            hash: r.hash().to_owned(),
            description: r.description().to_owned(),
        }
    }
}

impl From<&StateNode> for StateDump {
    fn from(s: &StateNode) -> Self {
        Self {
            id: s.id,
            name: s.name.clone(),
            parent_action_id: s.parent,
            description: s.description.clone(),
            created_at: Some(s.created_at),
        }
    }
}

fn ref_ids(refs: &[ObjectRef]) -> Vec<ObjectId> {
    refs.iter().map(ObjectRef::id).collect()
}

impl ActionDump {
    fn from_node(node: &ActionNode, objects: &ObjectRegistry) -> Self {
        Self {
            id: node.id(),
            f_id: node.f_id().to_owned(),
            parameter: node.parameter().clone(),
            input_ref_ids: ref_ids(node.inputs()),
            previous_state_id: node.previous_state(),
            result_state_id: node.result_state(),
            creates_ref_ids: ref_ids(node.creates()),
            removes_ref_ids: ref_ids(node.removes()),
            meta: node.meta().clone(),
            inverse: node.inverse().map(|inv| DescriptorDump {
                f_id: inv.f_id.clone(),
                input_ref_ids: inv.inputs.iter().map(|i| objects.resolve_input(i).id()).collect(),
                parameter: inv.parameter.clone(),
                meta: inv.meta.clone(),
            }),
        }
    }
}

impl GraphDump {
    /// Highest id used anywhere in the dump
    #[must_use]
    pub fn max_id(&self) -> Option<u64> {
        let states = self.states.iter().map(|s| s.id.get());
        let actions = self.actions.iter().map(|a| a.id.get());
        let objects = self.objects.iter().map(|o| o.id.get());
        let stories = self.stories.iter().map(|s| s.id.get());
        states.chain(actions).chain(objects).chain(stories).max()
    }

    /// Parse from JSON
    ///
    /// # Errors
    /// Returns error if the text is not a valid dump
    pub fn from_json(s: &str) -> Result<Self, ProvenanceError> {
        Ok(serde_json::from_str(s)?)
    }

    /// Render as pretty-printed JSON
    ///
    /// # Errors
    /// Returns error if a parameter cannot be serialized
    pub fn to_json(&self) -> Result<String, ProvenanceError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Rebuild the node tables of `dump` over `objects`
fn build_dag(dump: &GraphDump, objects: &ObjectRegistry) -> Result<Dag, ProvenanceError> {
    if dump.max_id() == Some(u64::MAX) {
        return Err(ProvenanceError::InvalidDump(format!(
            "id {} leaves no room for new ids",
            u64::MAX
        )));
    }

    let refs: HashMap<ObjectId, ObjectRef> = objects
        .replace_restored(dump.objects.iter().map(|o| {
            let proxy = ObjectProxy::named(o.name.clone(), o.category)
                .with_hash(o.hash.clone())
                .with_description(o.description.clone());
            (o.id, proxy)
        }))?
        .into_iter()
        .map(|r| (r.id(), r))
        .collect();

    let lookup = |ids: &[ObjectId], action: ActionId| -> Result<Vec<ObjectRef>, ProvenanceError> {
        ids.iter()
            .map(|id| {
                refs.get(id)
                    .cloned()
                    .ok_or_else(|| ProvenanceError::InvalidDump(format!("action {action} names unknown object {id}")))
            })
            .collect()
    };

    let states = dump
        .states
        .iter()
        .map(|s| StateNode {
            id: s.id,
            name: s.name.clone(),
            description: s.description.clone(),
            parent: s.parent_action_id,
            children: Vec::new(),
            created_at: s.created_at.unwrap_or_else(Utc::now),
        })
        .collect();

    let actions = dump
        .actions
        .iter()
        .map(|a| {
            let inverse = a
                .inverse
                .as_ref()
                .map(|inv| -> Result<ActionDescriptor, ProvenanceError> {
                    Ok(ActionDescriptor {
                        f_id: inv.f_id.clone(),
                        inputs: lookup(&inv.input_ref_ids, a.id)?
                            .into_iter()
                            .map(ObjectInput::Ref)
                            .collect(),
                        parameter: inv.parameter.clone(),
                        meta: inv.meta.clone(),
                    })
                })
                .transpose()?;
            Ok(ActionNode::new(
                a.id,
                a.f_id.clone(),
                lookup(&a.input_ref_ids, a.id)?,
                a.parameter.clone(),
                a.meta.clone(),
                a.previous_state_id,
                a.result_state_id,
                ActionEffects {
                    creates: lookup(&a.creates_ref_ids, a.id)?,
                    removes: lookup(&a.removes_ref_ids, a.id)?,
                    inverse,
                },
            ))
        })
        .collect::<Result<Vec<_>, ProvenanceError>>()?;

    Dag::from_parts(states, actions, dump.current_state_id)
}

impl ProvenanceGraph {
    /// Serialize states, actions, objects, stories and the current state
    #[must_use]
    pub fn persist(&self) -> GraphDump {
        self.inner.events.publish(GraphEvent::SyncStart);
        let dump = {
            let dag = self.inner.dag.read();
            GraphDump {
                states: dag.states().map(StateDump::from).collect(),
                actions: dag
                    .actions()
                    .map(|a| ActionDump::from_node(a, &self.inner.objects))
                    .collect(),
                objects: self.inner.objects.all().iter().map(ObjectDump::from).collect(),
                current_state_id: dag.current(),
                stories: self.inner.stories.read().values().cloned().collect(),
            }
        };
        tracing::debug!(
            graph = %self.id(),
            states = dump.states.len(),
            actions = dump.actions.len(),
            "persisted graph"
        );
        self.inner.events.publish(GraphEvent::Sync);
        dump
    }

    /// Replace the whole graph with the content of `dump`
    ///
    /// Only the structure is rebuilt. The applied position stays at the
    /// root, so once the application objects are attached again,
    /// `jump_to(current())` replays the path to the restored state.
    ///
    /// # Errors
    /// Returns [`ProvenanceError::InvalidDump`] if the dump does not form a
    /// tree, or names unknown nodes or objects. The graph is unchanged then.
    pub async fn restore(&self, dump: GraphDump) -> Result<(), ProvenanceError> {
        let _queue = self.inner.queue.lock().await;
        let _phase = self.inner.phase.enter()?;

        // Validate against a scratch registry before touching anything
        build_dag(&dump, &ObjectRegistry::new(IdAllocator::new()))?;

        self.inner.ids.reset();
        let dag = build_dag(&dump, &self.inner.objects)?;
        if let Some(max) = dump.max_id() {
            self.inner.ids.observe(max)?;
        }

        let current = dag.current();
        let old = std::mem::replace(&mut *self.inner.dag.write(), dag).current();
        *self.inner.stories.write() = dump.stories.into_iter().map(|s| (s.id, s)).collect::<IndexMap<_, _>>();
        self.touch();

        tracing::info!(graph = %self.id(), current = %current, "restored graph");
        self.inner.events.publish(GraphEvent::Restored { current });
        self.inner.events.publish(GraphEvent::StateChanged { old, new: current });
        Ok(())
    }

    /// New graph rebuilt from a dump
    ///
    /// # Errors
    /// Returns error if the dump is invalid
    pub async fn from_dump(
        desc: GraphDesc,
        dump: GraphDump,
        registry: Arc<dyn ActionRegistry>,
        config: GraphConfig,
    ) -> Result<Self, ProvenanceError> {
        let graph = Self::new(desc, registry, config);
        graph.restore(dump).await?;
        Ok(graph)
    }

    /// Root-to-current path reduced by `compressors`. The graph is not
    /// modified.
    #[must_use]
    pub fn compressed_path(&self, compressors: &CompressorRegistry) -> Vec<ActionNode> {
        compressors.compress(&self.current_path())
    }

    /// Linear dump of the compressed root-to-current path
    ///
    /// States and actions get fresh ids; object ids are kept. Inverses are
    /// left out since the intermediate states they lead to are gone.
    #[must_use]
    pub fn export_compressed(&self, compressors: &CompressorRegistry) -> GraphDump {
        let original = self.current_path();
        let path = compressors.compress(&original);
        let objects: Vec<ObjectDump> = self.inner.objects.all().iter().map(ObjectDump::from).collect();
        let start = objects.iter().map(|o| o.id.get().saturating_add(1)).max().unwrap_or(0);
        let ids = IdAllocator::starting_at(start);

        let (root_name, root_created) = {
            let dag = self.inner.dag.read();
            dag.state(dag.root())
                .map(|s| (s.name.clone(), s.created_at))
                .unwrap_or_else(|| (None, Utc::now()))
        };
        let root: StateId = ids.next();
        let mut states = vec![StateDump {
            id: root,
            name: root_name,
            parent_action_id: None,
            description: String::new(),
            created_at: Some(root_created),
        }];
        let mut actions = Vec::with_capacity(path.len());
        let mut previous = root;

        for node in &path {
            let action: ActionId = ids.next();
            let state: StateId = ids.next();
            states.push(StateDump {
                id: state,
                name: Some(node.meta().name.clone()),
                parent_action_id: Some(action),
                description: String::new(),
                created_at: Some(node.meta().timestamp),
            });
            let mut dump = ActionDump::from_node(&node.relinked(action, previous, state), &self.inner.objects);
            dump.inverse = None;
            actions.push(dump);
            previous = state;
        }

        tracing::debug!(original = original.len(), compressed = path.len(), "exported compressed path");
        GraphDump {
            states,
            actions,
            objects,
            current_state_id: previous,
            stories: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> GraphDump {
        serde_json::from_value(json!({
            "states": [
                {"id": 0, "name": "Start", "parentActionId": null},
                {"id": 2, "name": "Set x", "parentActionId": 1}
            ],
            "actions": [{
                "id": 1,
                "f_id": "setParameter",
                "parameter": {"name": "x", "value": 1},
                "inputRefIds": [3],
                "previousStateId": 0,
                "resultStateId": 2,
                "meta": {
                    "name": "Set x",
                    "category": "visual",
                    "operation": "update",
                    "timestamp": "2024-01-01T00:00:00Z",
                    "user": "ada"
                }
            }],
            "objects": [{"id": 3, "name": "view", "category": "visual", "hash": "view_visual"}],
            "currentStateId": 2
        }))
        .unwrap()
    }

    #[test]
    fn dump_uses_documented_field_names() {
        let v = serde_json::to_value(sample()).unwrap();
        assert_eq!(v["actions"][0]["f_id"], "setParameter");
        assert_eq!(v["actions"][0]["inputRefIds"], json!([3]));
        assert_eq!(v["states"][0]["parentActionId"], Value::Null);
        assert_eq!(v["currentStateId"], 2);
        assert!(v.get("stories").is_none());
        assert!(v["actions"][0].get("inverse").is_none());
    }

    #[test]
    fn max_id_spans_all_tables() {
        assert_eq!(sample().max_id(), Some(3));
    }

    #[test]
    fn build_dag_rejects_unknown_objects() {
        let mut dump = sample();
        dump.actions[0].input_ref_ids = vec![ObjectId(42)];
        let err = build_dag(&dump, &ObjectRegistry::new(IdAllocator::new())).unwrap_err();
        assert!(matches!(err, ProvenanceError::InvalidDump(_)));
    }

    #[test]
    fn build_dag_rejects_exhausted_ids() {
        let mut dump = sample();
        dump.objects[0].id = ObjectId(u64::MAX);
        dump.actions[0].input_ref_ids = vec![ObjectId(u64::MAX)];
        let objects = ObjectRegistry::new(IdAllocator::new());
        let err = build_dag(&dump, &objects).unwrap_err();
        assert!(matches!(err, ProvenanceError::InvalidDump(_)));
        assert!(objects.is_empty());
    }

    #[test]
    fn build_dag_links_children() {
        let dag = build_dag(&sample(), &ObjectRegistry::new(IdAllocator::new())).unwrap();
        assert_eq!(dag.state(StateId(0)).unwrap().children, vec![ActionId(1)]);
        assert_eq!(dag.current(), StateId(2));
    }
}
