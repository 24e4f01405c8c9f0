//! Testing utilities for the retrace workspace
//!
//! Shared application objects, executors and graph fixtures.

#![allow(missing_docs)]

use anyhow::Context;
use async_trait::async_trait;
use parking_lot::Mutex;
use retrace_graph::{CmdResult, ExecContext, Executor, ProvenanceGraph, StaticActionRegistry};
use retrace_model::{
    ActionCategory, ActionDescriptor, ActionMetaData, ObjectCategory, ObjectProxy, ObjectRef, Operation,
};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const SET_PARAMETER: &str = "setParameter";
pub const GUARDED_SET_PARAMETER: &str = "guardedSetParameter";
pub const IRREVERSIBLE_SET_PARAMETER: &str = "irreversibleSetParameter";
pub const ADD_SCORE: &str = "addScore";
pub const REMOVE_SCORE: &str = "removeScore";
pub const CREATE_VIEW: &str = "createView";
pub const REMOVE_VIEW: &str = "removeView";
pub const FAILING: &str = "failing";

// ---------------------------------------------------------------
// Application objects
// ---------------------------------------------------------------

/// Named parameters of a view
#[derive(Debug, Default)]
pub struct ParameterView {
    values: Mutex<BTreeMap<String, Value>>,
}

impl ParameterView {
    pub fn with_values(values: BTreeMap<String, Value>) -> Self {
        Self {
            values: Mutex::new(values),
        }
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.values.lock().get(name).cloned()
    }

    /// Set a value, returning the previous one. `null` removes the entry.
    pub fn set(&self, name: &str, value: Value) -> Option<Value> {
        let mut values = self.values.lock();
        if value.is_null() {
            values.remove(name)
        } else {
            values.insert(name.to_owned(), value)
        }
    }

    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.values.lock().clone()
    }
}

/// Scores by id
#[derive(Debug, Default)]
pub struct ScoreBoard {
    scores: Mutex<BTreeMap<String, Value>>,
}

impl ScoreBoard {
    pub fn ids(&self) -> Vec<String> {
        self.scores.lock().keys().cloned().collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.scores.lock().contains_key(id)
    }
}

/// Current value of a view parameter, `None` if unset or the view is gone
pub async fn view_value(view: &ObjectRef, name: &str) -> Option<Value> {
    view.downcast::<ParameterView>().await?.get(name)
}

async fn input<T: std::any::Any + Send + Sync>(inputs: &[ObjectRef], index: usize) -> anyhow::Result<Arc<T>> {
    let r = inputs.get(index).with_context(|| format!("missing input {index}"))?;
    r.downcast::<T>()
        .await
        .with_context(|| format!("input {} ({}) is not available", r.id(), r.name()))
}

fn str_param<'a>(parameter: &'a Value, key: &str) -> anyhow::Result<&'a str> {
    parameter
        .get(key)
        .and_then(Value::as_str)
        .with_context(|| format!("parameter '{key}' missing"))
}

// ---------------------------------------------------------------
// Executors
// ---------------------------------------------------------------

fn set_meta(name: &str) -> ActionMetaData {
    ActionMetaData::new(format!("Set {name}"), ActionCategory::Visual, Operation::Update)
}

async fn apply_set(inputs: &[ObjectRef], parameter: &Value) -> anyhow::Result<(String, Value, Value)> {
    let view = input::<ParameterView>(inputs, 0).await?;
    let name = str_param(parameter, "name")?.to_owned();
    let value = parameter.get("value").cloned().unwrap_or(Value::Null);
    let previous = view.set(&name, value.clone()).unwrap_or(Value::Null);
    Ok((name, value, previous))
}

fn inverse_set(f_id: &str, inputs: &[ObjectRef], name: &str, value: Value, previous: Value) -> ActionDescriptor {
    ActionDescriptor::over_refs(
        f_id,
        set_meta(name),
        &inputs[..1],
        json!({"name": name, "value": previous, "previousValue": value}),
    )
}

/// Sets `parameter.name` to `parameter.value` on the view in input 0
#[derive(Debug, Default)]
pub struct SetParameter;

#[async_trait]
impl Executor for SetParameter {
    async fn execute(&self, inputs: &[ObjectRef], parameter: &Value, _ctx: &ExecContext) -> anyhow::Result<CmdResult> {
        let (name, value, previous) = apply_set(inputs, parameter).await?;
        Ok(CmdResult::reversible(inverse_set(SET_PARAMETER, inputs, &name, value, previous.clone()))
            .with_output(previous))
    }
}

/// [`SetParameter`] that fails while its tripwire is set
#[derive(Debug, Default)]
pub struct GuardedSetParameter {
    pub tripwire: Arc<AtomicBool>,
}

#[async_trait]
impl Executor for GuardedSetParameter {
    async fn execute(&self, inputs: &[ObjectRef], parameter: &Value, _ctx: &ExecContext) -> anyhow::Result<CmdResult> {
        if self.tripwire.load(Ordering::SeqCst) {
            anyhow::bail!("tripwire set");
        }
        let (name, value, previous) = apply_set(inputs, parameter).await?;
        Ok(CmdResult::reversible(inverse_set(
            GUARDED_SET_PARAMETER,
            inputs,
            &name,
            value,
            previous,
        )))
    }
}

/// [`SetParameter`] without an inverse
#[derive(Debug, Default)]
pub struct IrreversibleSetParameter;

#[async_trait]
impl Executor for IrreversibleSetParameter {
    async fn execute(&self, inputs: &[ObjectRef], parameter: &Value, _ctx: &ExecContext) -> anyhow::Result<CmdResult> {
        apply_set(inputs, parameter).await?;
        Ok(CmdResult::new())
    }
}

/// Adds `parameter.id` to the score board in input 0
#[derive(Debug, Default)]
pub struct AddScore;

#[async_trait]
impl Executor for AddScore {
    async fn execute(&self, inputs: &[ObjectRef], parameter: &Value, _ctx: &ExecContext) -> anyhow::Result<CmdResult> {
        let board = input::<ScoreBoard>(inputs, 0).await?;
        let id = str_param(parameter, "id")?;
        board.scores.lock().insert(id.to_owned(), parameter.clone());
        Ok(CmdResult::reversible(ActionDescriptor::over_refs(
            REMOVE_SCORE,
            score_meta(id, Operation::Remove),
            &inputs[..1],
            parameter.clone(),
        )))
    }
}

/// Removes `parameter.id` from the score board in input 0
#[derive(Debug, Default)]
pub struct RemoveScore;

#[async_trait]
impl Executor for RemoveScore {
    async fn execute(&self, inputs: &[ObjectRef], parameter: &Value, _ctx: &ExecContext) -> anyhow::Result<CmdResult> {
        let board = input::<ScoreBoard>(inputs, 0).await?;
        let id = str_param(parameter, "id")?;
        board
            .scores
            .lock()
            .remove(id)
            .with_context(|| format!("no score '{id}'"))?;
        Ok(CmdResult::reversible(ActionDescriptor::over_refs(
            ADD_SCORE,
            score_meta(id, Operation::Create),
            &inputs[..1],
            parameter.clone(),
        )))
    }
}

fn score_meta(id: &str, operation: Operation) -> ActionMetaData {
    let verb = if operation == Operation::Remove { "Remove" } else { "Add" };
    ActionMetaData::new(format!("{verb} score {id}"), ActionCategory::Data, operation)
}

/// Creates a view named `parameter.name` holding `parameter.values`
#[derive(Debug, Default)]
pub struct CreateView;

#[async_trait]
impl Executor for CreateView {
    async fn execute(&self, _inputs: &[ObjectRef], parameter: &Value, _ctx: &ExecContext) -> anyhow::Result<CmdResult> {
        let name = str_param(parameter, "name")?;
        let values: BTreeMap<String, Value> = parameter
            .get("values")
            .and_then(Value::as_object)
            .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();
        let view = ParameterView::with_values(values);

        Ok(CmdResult::new()
            .with_created(ObjectProxy::new(view, name, ObjectCategory::Visual))
            .with_inverse(
                ActionDescriptor::new(
                    REMOVE_VIEW,
                    ActionMetaData::new(format!("Remove {name}"), ActionCategory::Layout, Operation::Remove),
                )
                .with_input(ObjectProxy::named(name, ObjectCategory::Visual)),
            ))
    }
}

/// Removes the view in input 0, remembering its values
#[derive(Debug, Default)]
pub struct RemoveView;

#[async_trait]
impl Executor for RemoveView {
    async fn execute(&self, inputs: &[ObjectRef], _parameter: &Value, _ctx: &ExecContext) -> anyhow::Result<CmdResult> {
        let view = input::<ParameterView>(inputs, 0).await?;
        let r = &inputs[0];
        let values: Map<String, Value> = view.snapshot().into_iter().collect();
        Ok(CmdResult::new().with_removed(r.clone()).with_inverse(create_view(r.name(), values)))
    }
}

/// Always rejects
#[derive(Debug, Default)]
pub struct Failing;

#[async_trait]
impl Executor for Failing {
    async fn execute(&self, _: &[ObjectRef], _: &Value, _: &ExecContext) -> anyhow::Result<CmdResult> {
        anyhow::bail!("failing executor")
    }
}

// ---------------------------------------------------------------
// Descriptors
// ---------------------------------------------------------------

fn set_descriptor(f_id: &str, view: &ObjectRef, name: &str, value: Value) -> ActionDescriptor {
    let previous = view
        .value()
        .and_then(|v| v.downcast::<ParameterView>().ok())
        .and_then(|v| v.get(name))
        .unwrap_or(Value::Null);
    ActionDescriptor::new(f_id, set_meta(name))
        .with_input(view)
        .with_parameter(json!({"name": name, "value": value, "previousValue": previous}))
}

pub fn set_parameter(view: &ObjectRef, name: &str, value: Value) -> ActionDescriptor {
    set_descriptor(SET_PARAMETER, view, name, value)
}

pub fn guarded_set_parameter(view: &ObjectRef, name: &str, value: Value) -> ActionDescriptor {
    set_descriptor(GUARDED_SET_PARAMETER, view, name, value)
}

pub fn irreversible_set_parameter(view: &ObjectRef, name: &str, value: Value) -> ActionDescriptor {
    set_descriptor(IRREVERSIBLE_SET_PARAMETER, view, name, value)
}

pub fn add_score(board: &ObjectRef, id: &str) -> ActionDescriptor {
    ActionDescriptor::new(ADD_SCORE, score_meta(id, Operation::Create))
        .with_input(board)
        .with_parameter(json!({"id": id}))
}

pub fn remove_score(board: &ObjectRef, id: &str) -> ActionDescriptor {
    ActionDescriptor::new(REMOVE_SCORE, score_meta(id, Operation::Remove))
        .with_input(board)
        .with_parameter(json!({"id": id}))
}

pub fn create_view(name: &str, values: Map<String, Value>) -> ActionDescriptor {
    ActionDescriptor::new(
        CREATE_VIEW,
        ActionMetaData::new(format!("Create {name}"), ActionCategory::Layout, Operation::Create),
    )
    .with_parameter(json!({"name": name, "values": values}))
}

pub fn remove_view(view: &ObjectRef) -> ActionDescriptor {
    ActionDescriptor::new(
        REMOVE_VIEW,
        ActionMetaData::new(format!("Remove {}", view.name()), ActionCategory::Layout, Operation::Remove),
    )
    .with_input(view)
}

pub fn failing() -> ActionDescriptor {
    ActionDescriptor::new(FAILING, ActionMetaData::new("Fail", ActionCategory::Custom, Operation::Update))
}

// ---------------------------------------------------------------
// Registries and fixtures
// ---------------------------------------------------------------

/// Registry with every executor of this crate
pub fn standard_registry(tripwire: Arc<AtomicBool>) -> StaticActionRegistry {
    let registry = StaticActionRegistry::new();
    registry.register(SET_PARAMETER, SetParameter);
    registry.register(GUARDED_SET_PARAMETER, GuardedSetParameter { tripwire });
    registry.register(IRREVERSIBLE_SET_PARAMETER, IrreversibleSetParameter);
    registry.register(ADD_SCORE, AddScore);
    registry.register(REMOVE_SCORE, RemoveScore);
    registry.register(CREATE_VIEW, CreateView);
    registry.register(REMOVE_VIEW, RemoveView);
    registry.register(FAILING, Failing);
    registry
}

/// Register `executor` behind a slow loader; the counter tracks loader calls
pub fn register_counting<E>(
    registry: &StaticActionRegistry,
    f_id: &str,
    executor: E,
    delay: Duration,
) -> Arc<AtomicUsize>
where
    E: Executor + 'static,
{
    let calls = Arc::new(AtomicUsize::new(0));
    let executor: Arc<dyn Executor> = Arc::new(executor);
    let counter = Arc::clone(&calls);
    registry.register_loader(f_id, move || {
        counter.fetch_add(1, Ordering::SeqCst);
        let executor = Arc::clone(&executor);
        async move {
            tokio::time::sleep(delay).await;
            Ok(executor)
        }
    });
    calls
}

/// Graph over the standard registry with one view and one score board
pub struct Fixture {
    pub graph: ProvenanceGraph,
    pub registry: Arc<StaticActionRegistry>,
    pub view: ObjectRef,
    pub board: ObjectRef,
    pub tripwire: Arc<AtomicBool>,
}

impl Fixture {
    pub async fn value(&self, name: &str) -> Option<Value> {
        view_value(&self.view, name).await
    }

    pub async fn scores(&self) -> Vec<String> {
        self.board
            .downcast::<ScoreBoard>()
            .await
            .map(|b| b.ids())
            .unwrap_or_default()
    }

    pub fn trip(&self, on: bool) {
        self.tripwire.store(on, Ordering::SeqCst);
    }
}

pub fn setup_graph() -> Fixture {
    let tripwire = Arc::new(AtomicBool::new(false));
    let registry = Arc::new(standard_registry(Arc::clone(&tripwire)));
    let graph = ProvenanceGraph::in_memory(registry.clone());
    let view = graph.add_object(ParameterView::default(), "view", ObjectCategory::Visual);
    let board = graph.add_object(ScoreBoard::default(), "scores", ObjectCategory::Data);
    Fixture {
        graph,
        registry,
        view,
        board,
        tripwire,
    }
}

pub fn setup_graph_with_values(values: &[(&str, Value)]) -> Fixture {
    let fixture = setup_graph();
    if let Some(view) = fixture.view.value().and_then(|v| v.downcast::<ParameterView>().ok()) {
        for (name, value) in values {
            view.set(name, value.clone());
        }
    }
    fixture
}
