//! Executors
//!
//! An [`Executor`] performs the side effect behind an action id. It receives
//! the resolved inputs, the parameter payload and an [`ExecContext`], and
//! returns a [`CmdResult`] carrying the inverse and any object lifetime
//! changes.

use crate::graph::ProvenanceGraph;
use crate::recording::{RecordingGuard, RecordingSwitch};
use async_trait::async_trait;
use futures::future::BoxFuture;
use retrace_model::{ActionDescriptor, ObjectProxy, ObjectRef};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Outcome of one executor run
#[derive(Debug, Clone, Default)]
pub struct CmdResult {
    /// Action that undoes this run; `None` for irreversible actions
    pub inverse: Option<ActionDescriptor>,
    /// Objects created by this run. On the first run they are registered
    /// and bound to the action; on replays their values refresh the bound
    /// references in order.
    pub created: Vec<ObjectProxy>,
    /// Objects removed by this run. They should be among the inputs.
    pub removed: Vec<ObjectRef>,
    /// Free-form result handed back to the caller of `push`
    pub output: Value,
}

impl CmdResult {
    /// Irreversible result without effects
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Result with an inverse
    #[inline]
    #[must_use]
    pub fn reversible(inverse: ActionDescriptor) -> Self {
        Self::new().with_inverse(inverse)
    }

    /// Set the inverse
    #[inline]
    #[must_use]
    pub fn with_inverse(mut self, inverse: ActionDescriptor) -> Self {
        self.inverse = Some(inverse);
        self
    }

    /// Add a created object
    #[inline]
    #[must_use]
    pub fn with_created(mut self, proxy: ObjectProxy) -> Self {
        self.created.push(proxy);
        self
    }

    /// Add a removed object
    #[inline]
    #[must_use]
    pub fn with_removed(mut self, object: ObjectRef) -> Self {
        self.removed.push(object);
        self
    }

    /// Set the output
    #[inline]
    #[must_use]
    pub fn with_output(mut self, output: Value) -> Self {
        self.output = output;
        self
    }
}

/// Context handed to every executor run
///
/// Executors may read the graph, look up or register objects, and suspend
/// recording. They must not call `push`, `jump_to` or any other queued
/// operation on the same graph: the run already holds the operation queue,
/// so such a call never completes.
#[derive(Clone)]
pub struct ExecContext {
    graph: ProvenanceGraph,
    recording: RecordingSwitch,
    replay: bool,
}

impl ExecContext {
    pub(crate) fn new(graph: ProvenanceGraph, recording: RecordingSwitch, replay: bool) -> Self {
        Self {
            graph,
            recording,
            replay,
        }
    }

    /// Graph the action runs in
    #[inline]
    #[must_use]
    pub fn graph(&self) -> &ProvenanceGraph {
        &self.graph
    }

    /// True when the run re-applies or reverts history during a jump
    #[inline]
    #[must_use]
    pub fn is_replay(&self) -> bool {
        self.replay
    }

    /// Stop recording until the guard is dropped. Use this while applying
    /// a side effect that would otherwise be recorded as a new action.
    pub fn suspend_recording(&self) -> RecordingGuard {
        self.recording.suspend()
    }
}

impl fmt::Debug for ExecContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecContext")
            .field("graph", &self.graph.id())
            .field("replay", &self.replay)
            .finish_non_exhaustive()
    }
}

/// Side effect behind an action id
#[async_trait]
pub trait Executor: Send + Sync {
    /// Run the action
    ///
    /// # Errors
    /// Any error rejects the action; the engine records nothing
    async fn execute(&self, inputs: &[ObjectRef], parameter: &Value, ctx: &ExecContext) -> anyhow::Result<CmdResult>;
}

/// Future returned by closure executors
pub type ExecFuture = BoxFuture<'static, anyhow::Result<CmdResult>>;

type ExecFn = dyn Fn(Vec<ObjectRef>, Value, ExecContext) -> ExecFuture + Send + Sync;

/// Executor backed by a closure over owned arguments
#[derive(Clone)]
pub struct FnExecutor {
    f: Arc<ExecFn>,
}

impl FnExecutor {
    /// Wrap a closure
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Vec<ObjectRef>, Value, ExecContext) -> ExecFuture + Send + Sync + 'static,
    {
        Self { f: Arc::new(f) }
    }
}

impl fmt::Debug for FnExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnExecutor").finish_non_exhaustive()
    }
}

#[async_trait]
impl Executor for FnExecutor {
    async fn execute(&self, inputs: &[ObjectRef], parameter: &Value, ctx: &ExecContext) -> anyhow::Result<CmdResult> {
        (self.f)(inputs.to_vec(), parameter.clone(), ctx.clone()).await
    }
}
