//! Arena-backed state/action tree
//!
//! States and actions live in flat tables keyed by id; edges are ids. The
//! structure reachable from the root is a tree: every state but the root
//! has exactly one parent action.

use crate::error::ProvenanceError;
use indexmap::IndexMap;
use retrace_model::{ActionId, ActionNode, IdAllocator, ObjectId, ObjectRef, StateId, StateNode};
use std::collections::{HashSet, VecDeque};

/// Name of the root state of a fresh graph
pub const ROOT_NAME: &str = "Start";

/// One step of a jump
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    /// Revert the action with its inverse
    Backward(ActionId),
    /// Re-apply the action
    Forward(ActionId),
}

#[derive(Debug, Clone)]
pub(crate) struct Dag {
    states: IndexMap<StateId, StateNode>,
    actions: IndexMap<ActionId, ActionNode>,
    root: StateId,
    current: StateId,
    /// State the application objects reflect. Trails `current` only after
    /// a restore, until the next jump replays the path.
    applied: StateId,
}

impl Dag {
    pub(crate) fn new(root: StateId) -> Self {
        let mut states = IndexMap::new();
        states.insert(root, StateNode::root(root, ROOT_NAME));
        Self {
            states,
            actions: IndexMap::new(),
            root,
            current: root,
            applied: root,
        }
    }

    pub(crate) fn root(&self) -> StateId {
        self.root
    }

    pub(crate) fn current(&self) -> StateId {
        self.current
    }

    pub(crate) fn applied(&self) -> StateId {
        self.applied
    }

    /// Move the cursor; the objects are taken to follow
    pub(crate) fn set_current(&mut self, state: StateId) -> Result<StateId, ProvenanceError> {
        if !self.states.contains_key(&state) {
            return Err(ProvenanceError::StateNotFound(state));
        }
        self.applied = state;
        Ok(std::mem::replace(&mut self.current, state))
    }

    pub(crate) fn state(&self, id: StateId) -> Option<&StateNode> {
        self.states.get(&id)
    }

    pub(crate) fn state_mut(&mut self, id: StateId) -> Option<&mut StateNode> {
        self.states.get_mut(&id)
    }

    pub(crate) fn action(&self, id: ActionId) -> Option<&ActionNode> {
        self.actions.get(&id)
    }

    pub(crate) fn action_mut(&mut self, id: ActionId) -> Option<&mut ActionNode> {
        self.actions.get_mut(&id)
    }

    pub(crate) fn states(&self) -> impl Iterator<Item = &StateNode> {
        self.states.values()
    }

    pub(crate) fn actions(&self) -> impl Iterator<Item = &ActionNode> {
        self.actions.values()
    }

    pub(crate) fn state_count(&self) -> usize {
        self.states.len()
    }

    pub(crate) fn action_count(&self) -> usize {
        self.actions.len()
    }

    /// Append `action` below its previous state, creating its result state.
    /// Ids are assumed fresh.
    pub(crate) fn append(&mut self, action: ActionNode, state_name: Option<String>) -> Result<(), ProvenanceError> {
        let from = action.previous_state();
        let parent = self
            .states
            .get_mut(&from)
            .ok_or(ProvenanceError::StateNotFound(from))?;
        parent.children.push(action.id());

        let to = action.result_state();
        self.states
            .insert(to, StateNode::produced_by(to, action.id(), state_name));
        self.actions.insert(action.id(), action);
        Ok(())
    }

    /// Actions from the root to `state`, oldest first
    pub(crate) fn path_to(&self, state: StateId) -> Result<Vec<ActionId>, ProvenanceError> {
        let mut path = Vec::new();
        let mut node = self
            .states
            .get(&state)
            .ok_or(ProvenanceError::StateNotFound(state))?;
        while let Some(parent) = node.parent {
            let action = self
                .actions
                .get(&parent)
                .ok_or(ProvenanceError::ActionNotFound(parent))?;
            path.push(parent);
            node = self
                .states
                .get(&action.previous_state())
                .ok_or(ProvenanceError::StateNotFound(action.previous_state()))?;
        }
        path.reverse();
        Ok(path)
    }

    /// Steps leading from `from` to `to` through their lowest common
    /// ancestor: reverts first (most recent first), then re-applies (oldest
    /// first)
    pub(crate) fn plan(&self, from: StateId, to: StateId) -> Result<Vec<Step>, ProvenanceError> {
        let from_path = self.path_to(from)?;
        let to_path = self.path_to(to)?;
        let common = from_path
            .iter()
            .zip(&to_path)
            .take_while(|(a, b)| a == b)
            .count();

        let back = from_path[common..].iter().rev().map(|a| Step::Backward(*a));
        let forward = to_path[common..].iter().map(|a| Step::Forward(*a));
        Ok(back.chain(forward).collect())
    }

    /// States below `state`, itself included
    pub(crate) fn subtree(&self, state: StateId) -> HashSet<StateId> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([state]);
        while let Some(id) = queue.pop_front() {
            let Some(node) = self.states.get(&id) else {
                continue;
            };
            if seen.insert(id) {
                queue.extend(node.children.iter().filter_map(|a| self.actions.get(a)).map(ActionNode::result_state));
            }
        }
        seen
    }

    /// Objects that exist in `state`. Objects no action created exist from
    /// the root on.
    pub(crate) fn alive_at(&self, state: StateId, objects: &[ObjectRef]) -> Result<HashSet<ObjectId>, ProvenanceError> {
        let created: HashSet<ObjectId> = self
            .actions
            .values()
            .flat_map(|a| a.creates().iter().map(ObjectRef::id))
            .collect();
        let mut alive: HashSet<ObjectId> = objects
            .iter()
            .map(ObjectRef::id)
            .filter(|id| !created.contains(id))
            .collect();
        for id in self.path_to(state)? {
            let action = self.actions.get(&id).ok_or(ProvenanceError::ActionNotFound(id))?;
            alive.extend(action.creates().iter().map(ObjectRef::id));
            for removed in action.removes() {
                alive.remove(&removed.id());
            }
        }
        Ok(alive)
    }

    /// Copy the branch that starts with `action` below `target`, breadth
    /// first, with fresh ids from `ids`
    ///
    /// `inputs` gives the inputs of each copy, or `None` to leave the action
    /// out; the children of a left-out action attach to the last copied
    /// state. Returns the ids of the copies.
    pub(crate) fn copy_branch(
        &mut self,
        action: ActionId,
        target: StateId,
        ids: &IdAllocator,
        mut inputs: impl FnMut(&ActionNode) -> Option<Vec<ObjectRef>>,
    ) -> Result<Vec<ActionId>, ProvenanceError> {
        let first = self.actions.get(&action).ok_or(ProvenanceError::ActionNotFound(action))?;
        if !self.states.contains_key(&target) {
            return Err(ProvenanceError::StateNotFound(target));
        }
        // Copying into the branch itself would never end
        if self.subtree(first.result_state()).contains(&target) {
            return Err(ProvenanceError::InvalidFork { action, target });
        }

        let mut copies = Vec::new();
        let mut queue = VecDeque::from([(action, target)]);
        while let Some((id, attach)) = queue.pop_front() {
            let node = self.actions.get(&id).ok_or(ProvenanceError::ActionNotFound(id))?.clone();
            let source = self
                .states
                .get(&node.result_state())
                .ok_or(ProvenanceError::StateNotFound(node.result_state()))?;
            let children = source.children.clone();
            let (name, description) = (source.name.clone(), source.description.clone());

            let mut next = attach;
            if let Some(inputs) = inputs(&node) {
                let copy: ActionId = ids.next();
                let state: StateId = ids.next();
                self.append(node.copied(copy, attach, state, inputs), name)?;
                if let Some(s) = self.states.get_mut(&state) {
                    s.description = description;
                }
                copies.push(copy);
                next = state;
            }
            queue.extend(children.into_iter().map(|c| (c, next)));
        }
        Ok(copies)
    }

    /// Rebuild from persisted nodes, checking that they form a tree
    ///
    /// Child lists are derived from the actions, in the given order.
    pub(crate) fn from_parts(
        states: Vec<StateNode>,
        actions: Vec<ActionNode>,
        current: StateId,
    ) -> Result<Self, ProvenanceError> {
        let invalid = |msg: String| ProvenanceError::InvalidDump(msg);

        let mut state_map: IndexMap<StateId, StateNode> = IndexMap::with_capacity(states.len());
        for mut s in states {
            s.children.clear();
            if let Some(dup) = state_map.insert(s.id, s) {
                return Err(invalid(format!("duplicate state id {}", dup.id)));
            }
        }

        let mut roots = state_map.values().filter(|s| s.is_root()).map(|s| s.id);
        let root = roots.next().ok_or_else(|| invalid("no root state".into()))?;
        if let Some(other) = roots.next() {
            return Err(invalid(format!("more than one root state: {root}, {other}")));
        }

        let mut action_map: IndexMap<ActionId, ActionNode> = IndexMap::with_capacity(actions.len());
        for a in actions {
            let (id, from, to) = (a.id(), a.previous_state(), a.result_state());
            if action_map.contains_key(&id) {
                return Err(invalid(format!("duplicate action id {id}")));
            }
            let result = state_map
                .get(&to)
                .ok_or_else(|| invalid(format!("action {id} results in unknown state {to}")))?;
            if result.parent != Some(id) {
                return Err(invalid(format!("state {to} does not name {id} as its parent")));
            }
            state_map
                .get_mut(&from)
                .ok_or_else(|| invalid(format!("action {id} starts at unknown state {from}")))?
                .children
                .push(id);
            action_map.insert(id, a);
        }

        for s in state_map.values() {
            if let Some(parent) = s.parent {
                let ok = action_map.get(&parent).is_some_and(|a| a.result_state() == s.id);
                if !ok {
                    return Err(invalid(format!("state {} has dangling parent {parent}", s.id)));
                }
            }
        }

        // Everything must hang off the root; this also rules out cycles
        let mut seen = HashSet::with_capacity(state_map.len());
        let mut queue = VecDeque::from([root]);
        while let Some(id) = queue.pop_front() {
            if !seen.insert(id) {
                continue;
            }
            if let Some(s) = state_map.get(&id) {
                queue.extend(s.children.iter().filter_map(|a| action_map.get(a)).map(ActionNode::result_state));
            }
        }
        if seen.len() != state_map.len() {
            return Err(invalid(format!(
                "{} state(s) not reachable from the root",
                state_map.len() - seen.len()
            )));
        }

        if !state_map.contains_key(&current) {
            return Err(invalid(format!("current state {current} does not exist")));
        }

        // Nothing has been replayed yet
        Ok(Self {
            states: state_map,
            actions: action_map,
            root,
            current,
            applied: root,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use retrace_model::{ActionCategory, ActionEffects, ActionMetaData, Operation};
    use serde_json::json;

    fn action(id: u64, from: u64, to: u64) -> ActionNode {
        ActionNode::new(
            ActionId(id),
            "f",
            vec![],
            json!({}),
            ActionMetaData::new("f", ActionCategory::Data, Operation::Update),
            StateId(from),
            StateId(to),
            ActionEffects::default(),
        )
    }

    /// root 0 -a1-> 1 -a2-> 2, and 1 -a3-> 3
    fn branched() -> Dag {
        let mut dag = Dag::new(StateId(0));
        dag.append(action(1, 0, 1), None).unwrap();
        dag.append(action(2, 1, 2), None).unwrap();
        dag.append(action(3, 1, 3), None).unwrap();
        dag
    }

    #[test]
    fn path_walks_to_root() {
        let dag = branched();
        assert_eq!(dag.path_to(StateId(2)).unwrap(), vec![ActionId(1), ActionId(2)]);
        assert!(dag.path_to(StateId(0)).unwrap().is_empty());
    }

    #[test]
    fn plan_goes_through_common_ancestor() {
        let dag = branched();
        let steps = dag.plan(StateId(2), StateId(3)).unwrap();
        assert_eq!(steps, vec![Step::Backward(ActionId(2)), Step::Forward(ActionId(3))]);
        assert!(dag.plan(StateId(3), StateId(3)).unwrap().is_empty());
    }

    #[test]
    fn subtree_includes_the_start() {
        let dag = branched();
        let below: HashSet<_> = [1, 2, 3].into_iter().map(StateId).collect();
        assert_eq!(dag.subtree(StateId(1)), below);
        assert_eq!(dag.subtree(StateId(2)), HashSet::from([StateId(2)]));
    }

    #[test]
    fn copy_branch_keeps_shape_and_names() {
        let mut dag = branched();
        dag.state_mut(StateId(2)).unwrap().name = Some("two".into());
        let ids = IdAllocator::starting_at(10);

        // 1 -a2-> 2 copied onto 3
        let copies = dag.copy_branch(ActionId(2), StateId(3), &ids, |a| Some(a.inputs().to_vec())).unwrap();
        assert_eq!(copies, vec![ActionId(10)]);
        let copy = dag.action(ActionId(10)).unwrap();
        assert_eq!((copy.previous_state(), copy.result_state()), (StateId(3), StateId(11)));
        assert_eq!(dag.state(StateId(11)).unwrap().name.as_deref(), Some("two"));
        assert_eq!(dag.state(StateId(3)).unwrap().children, vec![ActionId(10)]);
        assert_eq!(dag.current(), StateId(0));
    }

    #[test]
    fn skipped_actions_pass_their_children_on() {
        // 0 -a1-> 1 -a2-> 2 -a4-> 4, and 0 -a5-> 5
        let mut dag = Dag::new(StateId(0));
        dag.append(action(1, 0, 1), None).unwrap();
        dag.append(action(2, 1, 2), None).unwrap();
        dag.append(action(4, 2, 4), None).unwrap();
        dag.append(action(5, 0, 5), None).unwrap();
        let ids = IdAllocator::starting_at(20);

        let copies = dag
            .copy_branch(ActionId(1), StateId(5), &ids, |a| {
                (a.id() != ActionId(2)).then(|| a.inputs().to_vec())
            })
            .unwrap();
        assert_eq!(copies, vec![ActionId(20), ActionId(22)]);
        // a4's copy hangs off a1's copy
        assert_eq!(dag.action(ActionId(22)).unwrap().previous_state(), StateId(21));
        assert_eq!(dag.path_to(StateId(23)).unwrap(), vec![ActionId(5), ActionId(20), ActionId(22)]);
    }

    #[test]
    fn copy_into_own_branch_is_refused() {
        let mut dag = branched();
        let ids = IdAllocator::starting_at(10);
        assert!(matches!(
            dag.copy_branch(ActionId(1), StateId(2), &ids, |a| Some(a.inputs().to_vec())),
            Err(ProvenanceError::InvalidFork { .. })
        ));
        assert_eq!(dag.action_count(), 3);
        assert_eq!(ids.peek(), 10);
    }

    #[test]
    fn branching_keeps_siblings() {
        let dag = branched();
        assert_eq!(dag.state(StateId(1)).unwrap().children, vec![ActionId(2), ActionId(3)]);
    }

    #[test]
    fn from_parts_rebuilds_children() {
        let dag = branched();
        let states: Vec<_> = dag.states().cloned().collect();
        let actions: Vec<_> = dag.actions().cloned().collect();
        let rebuilt = Dag::from_parts(states, actions, StateId(3)).unwrap();
        assert_eq!(rebuilt.state(StateId(1)).unwrap().children, vec![ActionId(2), ActionId(3)]);
        assert_eq!(rebuilt.root(), StateId(0));
        assert_eq!(rebuilt.current(), StateId(3));
        assert_eq!(rebuilt.applied(), StateId(0));
    }

    #[test]
    fn moving_the_cursor_catches_up_applied() {
        let dag = branched();
        let mut rebuilt = Dag::from_parts(dag.states().cloned().collect(), dag.actions().cloned().collect(), StateId(2))
            .unwrap();
        assert_eq!(
            rebuilt.plan(rebuilt.applied(), rebuilt.current()).unwrap(),
            vec![Step::Forward(ActionId(1)), Step::Forward(ActionId(2))]
        );
        rebuilt.set_current(StateId(1)).unwrap();
        assert_eq!(rebuilt.applied(), StateId(1));
    }

    #[test]
    fn from_parts_rejects_orphans() {
        let dag = branched();
        let states: Vec<_> = dag.states().cloned().collect();
        let actions: Vec<_> = dag.actions().filter(|a| a.id() != ActionId(3)).cloned().collect();
        assert!(matches!(
            Dag::from_parts(states, actions, StateId(0)),
            Err(ProvenanceError::InvalidDump(_))
        ));
    }

    #[test]
    fn from_parts_rejects_unknown_current() {
        let dag = branched();
        let states: Vec<_> = dag.states().cloned().collect();
        let actions: Vec<_> = dag.actions().cloned().collect();
        assert!(Dag::from_parts(states, actions, StateId(99)).is_err());
    }
}
