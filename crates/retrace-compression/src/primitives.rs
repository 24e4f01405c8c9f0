//! Canonical compressors
//!
//! - [`last_only`]: keep the last action per key
//! - [`last_consecutive`]: collapse directly adjacent repeats only
//! - [`cancel_pair`]: drop an add together with its matching remove
//! - [`create_remove`]: drop everything between an object's creation and
//!   its removal that touched the object
//!
//! Each function has a [`Compressor`] counterpart bound to its arguments.

use crate::compressor::Compressor;
use crate::keys::{self, KeyFn};
use retrace_model::{ActionNode, ObjectRef};
use std::collections::HashMap;
use std::fmt;

/// Keep, for each key, only the last action with `f_id`
///
/// Replaying the result yields the same final value per key, but the
/// intermediate values are gone.
#[must_use]
pub fn last_only(path: Vec<ActionNode>, f_id: &str, key: &dyn Fn(&ActionNode) -> String) -> Vec<ActionNode> {
    let keyed: Vec<Option<String>> = path
        .iter()
        .map(|a| (a.f_id() == f_id).then(|| key(a)))
        .collect();

    let mut last: HashMap<&str, usize> = HashMap::new();
    for (i, k) in keyed.iter().enumerate() {
        if let Some(k) = k {
            last.insert(k.as_str(), i);
        }
    }

    path.into_iter()
        .enumerate()
        .filter(|(i, _)| keyed[*i].as_deref().map_or(true, |k| last.get(k) == Some(i)))
        .map(|(_, a)| a)
        .collect()
}

/// Like [`last_only`], but only directly adjacent actions with `f_id` and
/// equal keys are collapsed. Anything in between breaks the run.
#[must_use]
pub fn last_consecutive(path: Vec<ActionNode>, f_id: &str, key: &dyn Fn(&ActionNode) -> String) -> Vec<ActionNode> {
    let keyed: Vec<Option<String>> = path
        .iter()
        .map(|a| (a.f_id() == f_id).then(|| key(a)))
        .collect();

    path.into_iter()
        .enumerate()
        .filter(|(i, _)| match (&keyed[*i], keyed.get(i + 1)) {
            (Some(k), Some(Some(next))) => k != next,
            _ => true,
        })
        .map(|(_, a)| a)
        .collect()
}

/// Delete every `add_id` action that has a later, unmatched `remove_id`
/// action with the same key, together with that removal. Unmatched adds
/// and removals survive.
#[must_use]
pub fn cancel_pair(
    path: Vec<ActionNode>,
    add_id: &str,
    remove_id: &str,
    key: &dyn Fn(&ActionNode) -> String,
) -> Vec<ActionNode> {
    let n = path.len();
    let mut dropped = vec![false; n];

    for i in 0..n {
        if dropped[i] || path[i].f_id() != add_id {
            continue;
        }
        let k = key(&path[i]);
        let partner = (i + 1..n).find(|&j| !dropped[j] && path[j].f_id() == remove_id && key(&path[j]) == k);
        if let Some(j) = partner {
            dropped[i] = true;
            dropped[j] = true;
        }
    }

    path.into_iter()
        .zip(dropped)
        .filter_map(|(a, gone)| (!gone).then_some(a))
        .collect()
}

/// Collapse object lifetimes that start and end within the path
///
/// A `remove_id` action drops every earlier surviving action that used the
/// removed object as input. If the `create_id` action that created the
/// object is found, it is dropped and the removal is dropped too.
#[must_use]
pub fn create_remove(path: Vec<ActionNode>, create_id: &str, remove_id: &str) -> Vec<ActionNode> {
    let mut kept: Vec<ActionNode> = Vec::with_capacity(path.len());

    'outer: for act in path {
        if act.f_id() == remove_id {
            let target = act.removes().first().or_else(|| act.inputs().first()).map(ObjectRef::id);
            if let Some(target) = target {
                let mut j = kept.len();
                while j > 0 {
                    j -= 1;
                    let prev = &kept[j];
                    let is_creator =
                        prev.f_id() == create_id && prev.creates().first().is_some_and(|c| c.id() == target);
                    if is_creator {
                        kept.remove(j);
                        continue 'outer;
                    }
                    if prev.inputs().iter().any(|r| r.id() == target) {
                        kept.remove(j);
                    }
                }
            }
        }
        kept.push(act);
    }
    kept
}

/// [`last_only`] bound to an action id and key
#[derive(Clone)]
pub struct LastOnly {
    f_id: String,
    key: KeyFn,
}

impl LastOnly {
    /// Create the compressor
    #[must_use]
    pub fn new(f_id: impl Into<String>, key: KeyFn) -> Self {
        Self { f_id: f_id.into(), key }
    }

    /// Same parameter on the same target: the usual set-parameter shape
    #[must_use]
    pub fn per_parameter(f_id: impl Into<String>, parameter: &str) -> Self {
        Self::new(f_id, keys::first_input_and_param(parameter))
    }
}

impl fmt::Debug for LastOnly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LastOnly").field("f_id", &self.f_id).finish_non_exhaustive()
    }
}

impl Compressor for LastOnly {
    fn compress(&self, path: Vec<ActionNode>) -> Vec<ActionNode> {
        last_only(path, &self.f_id, self.key.as_ref())
    }

    fn name(&self) -> &str {
        "last_only"
    }
}

/// [`last_consecutive`] bound to an action id and key
#[derive(Clone)]
pub struct LastConsecutive {
    f_id: String,
    key: KeyFn,
}

impl LastConsecutive {
    /// Create the compressor
    #[must_use]
    pub fn new(f_id: impl Into<String>, key: KeyFn) -> Self {
        Self { f_id: f_id.into(), key }
    }

    /// Same parameter on the same target
    #[must_use]
    pub fn per_parameter(f_id: impl Into<String>, parameter: &str) -> Self {
        Self::new(f_id, keys::first_input_and_param(parameter))
    }
}

impl fmt::Debug for LastConsecutive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LastConsecutive").field("f_id", &self.f_id).finish_non_exhaustive()
    }
}

impl Compressor for LastConsecutive {
    fn compress(&self, path: Vec<ActionNode>) -> Vec<ActionNode> {
        last_consecutive(path, &self.f_id, self.key.as_ref())
    }

    fn name(&self) -> &str {
        "last_consecutive"
    }
}

/// [`cancel_pair`] bound to a pair of complementary action ids
#[derive(Clone)]
pub struct CancelPair {
    add_id: String,
    remove_id: String,
    key: KeyFn,
}

impl CancelPair {
    /// Pair actions whose whole parameter payloads are equal
    #[must_use]
    pub fn new(add_id: impl Into<String>, remove_id: impl Into<String>) -> Self {
        Self::with_key(add_id, remove_id, keys::parameter())
    }

    /// Pair actions by a custom key
    #[must_use]
    pub fn with_key(add_id: impl Into<String>, remove_id: impl Into<String>, key: KeyFn) -> Self {
        Self {
            add_id: add_id.into(),
            remove_id: remove_id.into(),
            key,
        }
    }
}

impl fmt::Debug for CancelPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelPair")
            .field("add_id", &self.add_id)
            .field("remove_id", &self.remove_id)
            .finish_non_exhaustive()
    }
}

impl Compressor for CancelPair {
    fn compress(&self, path: Vec<ActionNode>) -> Vec<ActionNode> {
        cancel_pair(path, &self.add_id, &self.remove_id, self.key.as_ref())
    }

    fn name(&self) -> &str {
        "cancel_pair"
    }
}

/// [`create_remove`] bound to a pair of action ids
#[derive(Debug, Clone)]
pub struct CreateRemove {
    create_id: String,
    remove_id: String,
}

impl CreateRemove {
    /// Create the compressor
    #[must_use]
    pub fn new(create_id: impl Into<String>, remove_id: impl Into<String>) -> Self {
        Self {
            create_id: create_id.into(),
            remove_id: remove_id.into(),
        }
    }
}

impl Compressor for CreateRemove {
    fn compress(&self, path: Vec<ActionNode>) -> Vec<ActionNode> {
        create_remove(path, &self.create_id, &self.remove_id)
    }

    fn name(&self) -> &str {
        "create_remove"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{action, ids, view};
    use pretty_assertions::assert_eq;
    use retrace_model::{ActionEffects, ObjectCategory};
    use serde_json::json;

    #[test]
    fn last_only_keeps_last_per_key() {
        let v = view(1);
        let path = vec![
            action(1, "setParameter", &[&v], json!({"name": "x", "value": 1})),
            action(2, "setParameter", &[&v], json!({"name": "y", "value": 1})),
            action(3, "setParameter", &[&v], json!({"name": "x", "value": 2})),
            action(4, "other", &[], json!({})),
        ];
        let out = LastOnly::per_parameter("setParameter", "name").compress(path);
        assert_eq!(ids(&out), vec![2, 3, 4]);
    }

    #[test]
    fn last_only_separates_targets() {
        let (a, b) = (view(1), view(2));
        let path = vec![
            action(1, "setParameter", &[&a], json!({"name": "x", "value": 1})),
            action(2, "setParameter", &[&b], json!({"name": "x", "value": 1})),
        ];
        let out = LastOnly::per_parameter("setParameter", "name").compress(path);
        assert_eq!(ids(&out), vec![1, 2]);
    }

    #[test]
    fn last_consecutive_needs_adjacency() {
        let v = view(1);
        let sel = |id, value| action(id, "select", &[&v], json!({"idtype": "gene", "range": value}));
        let path = vec![
            sel(1, 1),
            sel(2, 2),
            action(3, "other", &[], json!({})),
            sel(4, 3),
            sel(5, 4),
        ];
        let out = LastConsecutive::new("select", keys::param("idtype")).compress(path);
        assert_eq!(ids(&out), vec![2, 3, 5]);
    }

    #[test]
    fn cancel_pair_deletes_both() {
        let p = json!({"id": "s", "params": {"col": 3}});
        let path = vec![
            action(1, "addScore", &[], p.clone()),
            action(2, "other", &[], json!({})),
            action(3, "removeScore", &[], p),
        ];
        let out = CancelPair::new("addScore", "removeScore").compress(path);
        assert_eq!(ids(&out), vec![2]);
    }

    #[test]
    fn cancel_pair_keeps_unmatched_add() {
        let path = vec![
            action(1, "addScore", &[], json!({"id": "a"})),
            action(2, "removeScore", &[], json!({"id": "b"})),
        ];
        let out = CancelPair::new("addScore", "removeScore").compress(path);
        assert_eq!(ids(&out), vec![1, 2]);
    }

    #[test]
    fn cancel_pair_consumes_each_removal_once() {
        let p = json!({"id": "s"});
        let path = vec![
            action(1, "addScore", &[], p.clone()),
            action(2, "addScore", &[], p.clone()),
            action(3, "removeScore", &[], p),
        ];
        let out = CancelPair::new("addScore", "removeScore").compress(path);
        assert_eq!(ids(&out), vec![2]);
    }

    #[test]
    fn create_remove_collapses_lifetime() {
        let created = retrace_model::ObjectRef::new(
            retrace_model::ObjectId(50),
            retrace_model::ObjectProxy::named("score", ObjectCategory::Data),
        );
        let create = crate::testing::action_with(
            1,
            "addScore",
            &[],
            json!({}),
            ActionEffects {
                creates: vec![created.clone()],
                ..ActionEffects::default()
            },
        );
        let touch = action(2, "sortBy", &[&created], json!({}));
        let unrelated = action(3, "other", &[], json!({}));
        let remove = crate::testing::action_with(
            4,
            "removeScore",
            &[&created],
            json!({}),
            ActionEffects {
                removes: vec![created.clone()],
                ..ActionEffects::default()
            },
        );
        let out = CreateRemove::new("addScore", "removeScore").compress(vec![create, touch, unrelated, remove]);
        assert_eq!(ids(&out), vec![3]);
    }

    #[test]
    fn create_remove_keeps_removal_of_foreign_object() {
        let v = view(7);
        let touch = action(1, "sortBy", &[&v], json!({}));
        let remove = crate::testing::action_with(
            2,
            "removeScore",
            &[&v],
            json!({}),
            ActionEffects {
                removes: vec![v.clone()],
                ..ActionEffects::default()
            },
        );
        let out = create_remove(vec![touch, remove], "addScore", "removeScore");
        assert_eq!(ids(&out), vec![2]);
    }
}
