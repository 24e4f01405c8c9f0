//! Copying a branch onto another state

use crate::error::ProvenanceError;
use crate::events::GraphEvent;
use crate::graph::ProvenanceGraph;
use retrace_model::{ActionId, ObjectId, ObjectInput, ObjectRef, StateId};
use std::collections::{HashMap, HashSet};

impl ProvenanceGraph {
    /// Copy the branch that starts with `action` onto `target`
    ///
    /// Every action of the branch is copied with fresh ids, keeping the
    /// tree shape and the state names and descriptions. Nothing is executed
    /// and the current state does not move.
    ///
    /// Objects that exist before `action` but not at `target` are
    /// unavailable to the copy. `replacements` maps objects to stand-ins;
    /// copied actions use the stand-in as input. An action that needs an
    /// unavailable object without a stand-in is left out, and its children
    /// hang off the last copied state.
    ///
    /// Returns the ids of the copied actions, breadth first.
    ///
    /// # Errors
    /// - [`ProvenanceError::ActionNotFound`] or
    ///   [`ProvenanceError::StateNotFound`] for unknown ids
    /// - [`ProvenanceError::InvalidFork`] if `target` is part of the branch
    pub async fn fork(
        &self,
        action: ActionId,
        target: StateId,
        replacements: &[(ObjectRef, ObjectRef)],
    ) -> Result<Vec<ActionId>, ProvenanceError> {
        let _queue = self.inner.queue.lock().await;
        let _phase = self.inner.phase.enter()?;

        let replacements: HashMap<ObjectId, ObjectRef> = replacements
            .iter()
            .map(|(from, to)| {
                let from = self.inner.objects.resolve_input(&ObjectInput::from(from.clone()));
                let to = self.inner.objects.resolve_input(&ObjectInput::from(to.clone()));
                (from.id(), to)
            })
            .collect();
        let objects = self.inner.objects.all();

        let added = {
            let mut dag = self.inner.dag.write();
            let source = dag
                .action(action)
                .ok_or(ProvenanceError::ActionNotFound(action))?
                .previous_state();
            let at_target = dag.alive_at(target, &objects)?;
            let unavailable: HashSet<ObjectId> = dag
                .alive_at(source, &objects)?
                .into_iter()
                .filter(|id| !at_target.contains(id))
                .collect();

            let copies = dag.copy_branch(action, target, &self.inner.ids, |node| {
                let blocked = node
                    .inputs()
                    .iter()
                    .any(|r| unavailable.contains(&r.id()) && !replacements.contains_key(&r.id()));
                if blocked {
                    tracing::debug!(action = %node.id(), "left out of fork");
                    return None;
                }
                Some(
                    node.inputs()
                        .iter()
                        .map(|r| replacements.get(&r.id()).unwrap_or(r).clone())
                        .collect(),
                )
            })?;
            copies
                .iter()
                .filter_map(|id| dag.action(*id))
                .map(|a| (a.id(), a.previous_state(), a.result_state()))
                .collect::<Vec<_>>()
        };

        for (id, from, to) in &added {
            self.inner.events.publish(GraphEvent::ActionAdded {
                action: *id,
                from: *from,
                to: *to,
            });
        }
        self.touch();
        tracing::info!(action = %action, target = %target, copies = added.len(), "forked branch");
        self.inner.events.publish(GraphEvent::Forked { action, target });
        Ok(added.into_iter().map(|(id, _, _)| id).collect())
    }
}
