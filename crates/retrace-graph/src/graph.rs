//! Provenance graph
//!
//! Owns the state/action tree, the current-state cursor and the object
//! registry, and serializes every mutating operation through an internal
//! queue. Executors are resolved by `f_id` through the injected
//! [`ActionRegistry`].
//!
//! # Example
//!
//! ```rust,ignore
//! let graph = ProvenanceGraph::in_memory(registry);
//! let view = graph.add_object(ParameterView::default(), "view", ObjectCategory::Visual);
//! let s1 = graph.push(set_parameter(&view, "x", json!(1))).await?.state;
//! graph.push(set_parameter(&view, "x", json!(2))).await?;
//! graph.undo().await?;
//! assert_eq!(graph.current(), s1);
//! ```

use crate::config::GraphConfig;
use crate::dag::{Dag, Step};
use crate::error::ProvenanceError;
use crate::events::{EventBus, GraphEvent};
use crate::executor::{CmdResult, ExecContext};
use crate::recording::RecordingSwitch;
use crate::registry::{ActionRegistry, ExecutorCache};
use crate::state_machine::{GraphPhase, PhaseCell};
use crate::story::Story;
use crate::types::{GraphDesc, GraphDim};
use chrono::Utc;
use futures::future::join_all;
use indexmap::IndexMap;
use parking_lot::RwLock;
use retrace_model::{
    ActionDescriptor, ActionEffects, ActionId, ActionNode, IdAllocator, ObjectCategory, ObjectId, ObjectInput,
    ObjectProxy, ObjectRef, ObjectRegistry, StateId, StateNode, StoryId,
};
use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Outcome of a successful push
#[derive(Debug, Clone)]
pub struct PushOutcome {
    /// Recorded action
    pub action: ActionId,
    /// New current state
    pub state: StateId,
    /// Executor output
    pub output: Value,
    /// Objects created by the action
    pub created: Vec<ObjectRef>,
    /// Objects removed by the action
    pub removed: Vec<ObjectRef>,
}

pub(crate) struct GraphInner {
    pub(crate) desc: RwLock<GraphDesc>,
    pub(crate) config: GraphConfig,
    pub(crate) ids: IdAllocator,
    pub(crate) dag: RwLock<Dag>,
    pub(crate) objects: ObjectRegistry,
    pub(crate) executors: ExecutorCache,
    pub(crate) events: EventBus,
    /// FIFO operation queue; held for the whole of every mutating operation
    pub(crate) queue: tokio::sync::Mutex<()>,
    pub(crate) phase: PhaseCell,
    pub(crate) recording: RecordingSwitch,
    pub(crate) stories: RwLock<IndexMap<StoryId, Story>>,
}

/// Provenance graph handle
///
/// Cloning is cheap; all clones operate on the same graph. Mutating
/// operations (`push`, `push_with_result`, `jump_to`, `undo`, `redo`,
/// `fork`, `clear`, `restore`, `play_slide`) are queued and run one at a
/// time in call order.
#[derive(Clone)]
pub struct ProvenanceGraph {
    pub(crate) inner: Arc<GraphInner>,
}

impl ProvenanceGraph {
    /// Create an empty graph
    #[must_use]
    pub fn new(desc: GraphDesc, registry: Arc<dyn ActionRegistry>, config: GraphConfig) -> Self {
        let ids = IdAllocator::new();
        let root: StateId = ids.next();
        Self {
            inner: Arc::new(GraphInner {
                desc: RwLock::new(desc),
                executors: ExecutorCache::new(registry, &config),
                events: EventBus::new(config.event_capacity),
                config,
                objects: ObjectRegistry::new(ids.clone()),
                ids,
                dag: RwLock::new(Dag::new(root)),
                queue: tokio::sync::Mutex::new(()),
                phase: PhaseCell::default(),
                recording: RecordingSwitch::new(),
                stories: RwLock::new(IndexMap::new()),
            }),
        }
    }

    /// Create an empty, unmanaged graph with default configuration
    #[must_use]
    pub fn in_memory(registry: Arc<dyn ActionRegistry>) -> Self {
        Self::new(
            GraphDesc::new("memory", "In Memory Session"),
            registry,
            GraphConfig::default(),
        )
    }

    // ---------------------------------------------------------------
    // Mutating operations
    // ---------------------------------------------------------------

    /// Execute `action` and record it as a child of the current state
    ///
    /// Pending input values are awaited first. If the current state already
    /// has children, the action starts a new branch; existing branches are
    /// kept.
    ///
    /// # Errors
    /// Returns error if the executor cannot be loaded or rejects. The graph
    /// is unchanged in that case.
    pub async fn push(&self, action: ActionDescriptor) -> Result<PushOutcome, ProvenanceError> {
        let _queue = self.inner.queue.lock().await;
        let _phase = self.inner.phase.enter()?;

        let inputs = self.inner.objects.resolve_inputs(&action.inputs);
        let result = self.run(&action.f_id, &inputs, &action.parameter, false).await?;
        let outcome = self.record(action, inputs, result)?;
        self.inner.events.publish(GraphEvent::Executed {
            action: outcome.action,
            inverse: false,
        });
        tracing::info!(action = %outcome.action, state = %outcome.state, "pushed action");
        Ok(outcome)
    }

    /// Record an action whose side effect already happened
    ///
    /// Same bookkeeping as [`push`](Self::push), without running the
    /// executor. The inverse, if any, must be part of `result`.
    ///
    /// # Errors
    /// Returns error if the graph is inconsistent
    pub async fn push_with_result(
        &self,
        action: ActionDescriptor,
        result: CmdResult,
    ) -> Result<PushOutcome, ProvenanceError> {
        let _queue = self.inner.queue.lock().await;
        let _phase = self.inner.phase.enter()?;

        let inputs = self.inner.objects.resolve_inputs(&action.inputs);
        let outcome = self.record(action, inputs, result)?;
        tracing::info!(action = %outcome.action, state = %outcome.state, "recorded executed action");
        Ok(outcome)
    }

    /// Move the current state to `target`, reverting and re-applying actions
    /// along the path through the common ancestor
    ///
    /// The path starts at [`applied`](Self::applied), so after a restore
    /// `jump_to(current)` replays everything from the root. Every revert is
    /// checked for an inverse before anything runs. Steps run one after
    /// another; the current state follows each successful step.
    ///
    /// # Errors
    /// - [`ProvenanceError::StateNotFound`] for unknown targets
    /// - [`ProvenanceError::NoInverseAvailable`] if a revert is impossible
    /// - the step's error if the first step fails
    /// - [`ProvenanceError::PartialJumpFailure`] if a later step fails
    pub async fn jump_to(&self, target: StateId) -> Result<(), ProvenanceError> {
        let _queue = self.inner.queue.lock().await;
        let _phase = self.inner.phase.enter()?;
        self.jump_locked(target).await
    }

    /// Revert the action that produced the current state
    ///
    /// Returns the new current state, or `None` at the root.
    ///
    /// # Errors
    /// Returns [`ProvenanceError::NoInverseAvailable`] if that action has no
    /// inverse, or the inverse's error
    pub async fn undo(&self) -> Result<Option<StateId>, ProvenanceError> {
        let _queue = self.inner.queue.lock().await;
        let _phase = self.inner.phase.enter()?;

        // Reversibility is checked when the jump is planned
        let target = {
            let dag = self.inner.dag.read();
            let current = dag.current();
            let state = dag.state(current).ok_or(ProvenanceError::StateNotFound(current))?;
            let Some(parent) = state.parent else {
                return Ok(None);
            };
            dag.action(parent)
                .ok_or(ProvenanceError::ActionNotFound(parent))?
                .previous_state()
        };

        tracing::info!(target = %target, "undo");
        self.jump_locked(target).await?;
        Ok(Some(target))
    }

    /// Re-apply the most recently created child of the current state
    ///
    /// Returns the new current state, or `None` if there is no child.
    ///
    /// # Errors
    /// Returns the executor's error
    pub async fn redo(&self) -> Result<Option<StateId>, ProvenanceError> {
        let _queue = self.inner.queue.lock().await;
        let _phase = self.inner.phase.enter()?;

        let target = {
            let dag = self.inner.dag.read();
            let current = dag.current();
            let state = dag.state(current).ok_or(ProvenanceError::StateNotFound(current))?;
            let Some(child) = state.latest_child() else {
                return Ok(None);
            };
            dag.action(child)
                .ok_or(ProvenanceError::ActionNotFound(child))?
                .result_state()
        };

        tracing::info!(target = %target, "redo");
        self.jump_locked(target).await?;
        Ok(Some(target))
    }

    /// Discard all states, actions, objects and stories, starting over from
    /// a fresh root. No executor runs.
    ///
    /// # Errors
    /// Returns error only on illegal phase transitions
    pub async fn clear(&self) -> Result<StateId, ProvenanceError> {
        let _queue = self.inner.queue.lock().await;
        let _phase = self.inner.phase.enter()?;

        self.inner.objects.clear();
        self.inner.stories.write().clear();
        self.inner.ids.reset();
        let root: StateId = self.inner.ids.next();
        let old = {
            let mut dag = self.inner.dag.write();
            let old = dag.current();
            *dag = Dag::new(root);
            old
        };
        self.touch();

        tracing::info!(graph = %self.id(), "cleared graph");
        self.inner.events.publish(GraphEvent::Cleared { root });
        self.inner.events.publish(GraphEvent::StateChanged { old, new: root });
        Ok(root)
    }

    pub(crate) async fn jump_locked(&self, target: StateId) -> Result<(), ProvenanceError> {
        let (from, steps) = {
            let dag = self.inner.dag.read();
            let from = dag.applied();
            let steps = dag.plan(from, target)?;
            for step in &steps {
                if let Step::Backward(id) = step {
                    let action = dag.action(*id).ok_or(ProvenanceError::ActionNotFound(*id))?;
                    if !action.is_reversible() {
                        return Err(ProvenanceError::NoInverseAvailable { action: *id });
                    }
                }
            }
            (from, steps)
        };

        if steps.is_empty() {
            if self.current() != target {
                self.move_to(target)?;
            }
            return Ok(());
        }
        tracing::info!(from = %from, to = %target, steps = steps.len(), "jumping");

        for (completed, step) in steps.iter().enumerate() {
            if let Err(err) = self.apply(*step).await {
                if completed == 0 {
                    return Err(err);
                }
                let reached = self.current();
                tracing::warn!(reached = %reached, completed, error = %err, "jump stopped early");
                return Err(ProvenanceError::PartialJumpFailure {
                    reached,
                    completed,
                    source: Box::new(err),
                });
            }
        }
        Ok(())
    }

    async fn apply(&self, step: Step) -> Result<(), ProvenanceError> {
        match step {
            Step::Forward(id) => {
                let node = self.require_action(id)?;
                tracing::debug!(action = %id, f_id = node.f_id(), "re-applying");
                let result = self.run(node.f_id(), node.inputs(), node.parameter(), true).await?;

                for (object, proxy) in node.creates().iter().zip(result.created) {
                    object.set_slot(proxy.value);
                }
                for object in node.removes() {
                    object.detach();
                }
                let inverse = result.inverse.map(|inv| self.bind(inv));
                if let Some(action) = self.inner.dag.write().action_mut(id) {
                    action.refresh_inverse(inverse);
                }

                self.inner.events.publish(GraphEvent::Executed { action: id, inverse: false });
                self.move_to(node.result_state())
            }
            Step::Backward(id) => {
                let node = self.require_action(id)?;
                let inverse = node
                    .inverse()
                    .cloned()
                    .ok_or(ProvenanceError::NoInverseAvailable { action: id })?;
                tracing::debug!(action = %id, f_id = %inverse.f_id, "reverting");
                let inputs = self.inner.objects.resolve_inputs(&inverse.inputs);
                let result = self.run(&inverse.f_id, &inputs, &inverse.parameter, true).await?;

                // The inverse brings removed objects back, in order
                for (object, proxy) in node.removes().iter().zip(result.created) {
                    object.set_slot(proxy.value);
                }
                for object in node.creates() {
                    object.detach();
                }

                self.inner.events.publish(GraphEvent::Executed { action: id, inverse: true });
                self.move_to(node.previous_state())
            }
        }
    }

    async fn run(
        &self,
        f_id: &str,
        inputs: &[ObjectRef],
        parameter: &Value,
        replay: bool,
    ) -> Result<CmdResult, ProvenanceError> {
        join_all(inputs.iter().map(ObjectRef::resolve)).await;
        let executor = self.inner.executors.get(f_id).await?;
        let ctx = ExecContext::new(self.clone(), self.inner.recording.clone(), replay);

        // Replays are never recorded
        let _suspended = replay.then(|| self.inner.recording.suspend());
        executor.execute(inputs, parameter, &ctx).await.map_err(|e| {
            tracing::warn!(f_id, error = %e, "executor rejected");
            ProvenanceError::rejected(f_id, e)
        })
    }

    fn record(
        &self,
        action: ActionDescriptor,
        inputs: Vec<ObjectRef>,
        result: CmdResult,
    ) -> Result<PushOutcome, ProvenanceError> {
        let CmdResult {
            inverse,
            created,
            removed,
            output,
        } = result;

        let created: Vec<ObjectRef> = created
            .into_iter()
            .map(|proxy| self.inner.objects.find_or_add(proxy))
            .collect();
        let removed: Vec<ObjectRef> = removed
            .iter()
            .map(|r| self.inner.objects.resolve_input(&ObjectInput::from(r)))
            .collect();
        for object in &removed {
            object.detach();
        }
        let inverse = inverse.map(|inv| self.bind(inv));

        let ActionDescriptor {
            f_id,
            parameter,
            mut meta,
            ..
        } = action;
        if meta.user.is_empty() {
            meta.user.clone_from(&self.inner.config.default_user);
        }
        let state_name = Some(meta.name.clone());

        let action_id: ActionId = self.inner.ids.next();
        let state_id: StateId = self.inner.ids.next();
        let old = {
            let mut dag = self.inner.dag.write();
            let old = dag.current();
            let node = ActionNode::new(
                action_id,
                f_id,
                inputs,
                parameter,
                meta,
                old,
                state_id,
                ActionEffects {
                    creates: created.clone(),
                    removes: removed.clone(),
                    inverse,
                },
            );
            dag.append(node, state_name)?;
            dag.set_current(state_id)?;
            old
        };
        self.touch();

        for object in &created {
            self.inner.events.publish(GraphEvent::ObjectAdded { object: object.id() });
        }
        self.inner.events.publish(GraphEvent::ActionAdded {
            action: action_id,
            from: old,
            to: state_id,
        });
        self.inner.events.publish(GraphEvent::StateChanged { old, new: state_id });

        Ok(PushOutcome {
            action: action_id,
            state: state_id,
            output,
            created,
            removed,
        })
    }

    /// Bind descriptor inputs to registered references
    fn bind(&self, mut descriptor: ActionDescriptor) -> ActionDescriptor {
        descriptor.inputs = self
            .inner
            .objects
            .resolve_inputs(&descriptor.inputs)
            .into_iter()
            .map(ObjectInput::Ref)
            .collect();
        descriptor
    }

    fn require_action(&self, id: ActionId) -> Result<ActionNode, ProvenanceError> {
        self.inner
            .dag
            .read()
            .action(id)
            .cloned()
            .ok_or(ProvenanceError::ActionNotFound(id))
    }

    fn move_to(&self, state: StateId) -> Result<(), ProvenanceError> {
        let old = self.inner.dag.write().set_current(state)?;
        self.inner.events.publish(GraphEvent::StateChanged { old, new: state });
        Ok(())
    }

    pub(crate) fn touch(&self) {
        self.inner.desc.write().modified_at = Utc::now();
    }

    // ---------------------------------------------------------------
    // Objects
    // ---------------------------------------------------------------

    /// Existing reference for the proxy's identity, or a new one. A value
    /// carried by the proxy is attached to a detached reference.
    pub fn find_or_add_object(&self, proxy: ObjectProxy) -> ObjectRef {
        self.inner.objects.find_or_add(proxy)
    }

    /// Register a value under `name`
    pub fn add_object<T: Any + Send + Sync>(&self, value: T, name: &str, category: ObjectCategory) -> ObjectRef {
        self.find_or_add_object(ObjectProxy::new(value, name, category))
    }

    /// Look up an object by id
    #[must_use]
    pub fn find_object(&self, id: ObjectId) -> Option<ObjectRef> {
        self.inner.objects.get(id)
    }

    /// All registered objects in registration order
    #[must_use]
    pub fn objects(&self) -> Vec<ObjectRef> {
        self.inner.objects.all()
    }

    // ---------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------

    /// Storage id
    #[must_use]
    pub fn id(&self) -> String {
        self.inner.desc.read().id.clone()
    }

    /// Description
    #[must_use]
    pub fn desc(&self) -> GraphDesc {
        self.inner.desc.read().clone()
    }

    pub(crate) fn set_desc(&self, desc: GraphDesc) {
        *self.inner.desc.write() = desc;
    }

    /// Configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &GraphConfig {
        &self.inner.config
    }

    /// Root state
    #[must_use]
    pub fn root(&self) -> StateId {
        self.inner.dag.read().root()
    }

    /// Current state
    #[must_use]
    pub fn current(&self) -> StateId {
        self.inner.dag.read().current()
    }

    /// State whose effects the application objects reflect. This is
    /// [`current`](Self::current) except after a restore, where it stays at
    /// the root until the next jump.
    #[must_use]
    pub fn applied(&self) -> StateId {
        self.inner.dag.read().applied()
    }

    /// State by id
    #[must_use]
    pub fn state(&self, id: StateId) -> Option<StateNode> {
        self.inner.dag.read().state(id).cloned()
    }

    /// Action by id
    #[must_use]
    pub fn action(&self, id: ActionId) -> Option<ActionNode> {
        self.inner.dag.read().action(id).cloned()
    }

    /// All states in creation order
    #[must_use]
    pub fn states(&self) -> Vec<StateNode> {
        self.inner.dag.read().states().cloned().collect()
    }

    /// All actions in creation order
    #[must_use]
    pub fn actions(&self) -> Vec<ActionNode> {
        self.inner.dag.read().actions().cloned().collect()
    }

    /// Actions from the root to `state`, oldest first
    ///
    /// # Errors
    /// Returns error if the state does not exist
    pub fn path_to(&self, state: StateId) -> Result<Vec<ActionNode>, ProvenanceError> {
        let dag = self.inner.dag.read();
        dag.path_to(state)?
            .into_iter()
            .map(|id| dag.action(id).cloned().ok_or(ProvenanceError::ActionNotFound(id)))
            .collect()
    }

    /// Actions from the root to the current state
    #[must_use]
    pub fn current_path(&self) -> Vec<ActionNode> {
        let dag = self.inner.dag.read();
        dag.path_to(dag.current())
            .map(|ids| ids.into_iter().filter_map(|id| dag.action(id).cloned()).collect())
            .unwrap_or_default()
    }

    /// Rename a state
    ///
    /// # Errors
    /// Returns error if the state does not exist
    pub fn rename_state(&self, id: StateId, name: impl Into<String>) -> Result<(), ProvenanceError> {
        let mut dag = self.inner.dag.write();
        let state = dag.state_mut(id).ok_or(ProvenanceError::StateNotFound(id))?;
        state.name = Some(name.into());
        Ok(())
    }

    /// True if nothing was recorded yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.dag.read().action_count() == 0
    }

    /// Node counts
    #[must_use]
    pub fn dim(&self) -> GraphDim {
        let (states, actions) = {
            let dag = self.inner.dag.read();
            (dag.state_count(), dag.action_count())
        };
        GraphDim {
            states,
            actions,
            objects: self.inner.objects.len(),
            stories: self.inner.stories.read().len(),
        }
    }

    /// Phase
    #[must_use]
    pub fn phase(&self) -> GraphPhase {
        self.inner.phase.get()
    }

    /// Subscribe to events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<GraphEvent> {
        self.inner.events.subscribe()
    }

    /// Recording switch of this graph
    #[must_use]
    pub fn recording(&self) -> RecordingSwitch {
        self.inner.recording.clone()
    }

    /// True unless recording is suspended
    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.inner.recording.is_recording()
    }
}

impl fmt::Debug for ProvenanceGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProvenanceGraph")
            .field("id", &self.id())
            .field("current", &self.current())
            .field("dim", &self.dim())
            .finish_non_exhaustive()
    }
}
