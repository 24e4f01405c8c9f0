//! Recording suspension
//!
//! Applications usually record actions from change listeners. When an
//! executor applies such a change itself, the listener would record it
//! again. A [`RecordingSwitch`] lets the executor turn recording off for
//! the duration of the side effect; [`Recorder`] honours it.

use crate::error::ProvenanceError;
use crate::executor::CmdResult;
use crate::graph::{ProvenanceGraph, PushOutcome};
use retrace_model::ActionDescriptor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Per-graph recording switch. Suspensions nest.
#[derive(Debug, Clone, Default)]
pub struct RecordingSwitch {
    depth: Arc<AtomicUsize>,
}

impl RecordingSwitch {
    /// Create an enabled switch
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Suspend until the returned guard is dropped
    pub fn suspend(&self) -> RecordingGuard {
        self.depth.fetch_add(1, Ordering::SeqCst);
        RecordingGuard {
            depth: Arc::clone(&self.depth),
        }
    }

    /// True unless some guard is alive
    #[inline]
    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.depth.load(Ordering::SeqCst) == 0
    }
}

/// Keeps recording suspended while alive
#[derive(Debug)]
#[must_use = "recording resumes as soon as the guard is dropped"]
pub struct RecordingGuard {
    depth: Arc<AtomicUsize>,
}

impl Drop for RecordingGuard {
    fn drop(&mut self) {
        self.depth.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Pushes actions into a graph unless recording is suspended
#[derive(Debug, Clone)]
pub struct Recorder {
    graph: ProvenanceGraph,
}

impl Recorder {
    /// Recorder for `graph`
    #[inline]
    #[must_use]
    pub fn new(graph: ProvenanceGraph) -> Self {
        Self { graph }
    }

    /// Graph being recorded into
    #[inline]
    #[must_use]
    pub fn graph(&self) -> &ProvenanceGraph {
        &self.graph
    }

    /// Push `action`, or do nothing while recording is suspended
    ///
    /// # Errors
    /// Returns error if the push fails
    pub async fn record(&self, action: ActionDescriptor) -> Result<Option<PushOutcome>, ProvenanceError> {
        if !self.graph.is_recording() {
            tracing::debug!(f_id = %action.f_id, "recording suspended, action dropped");
            return Ok(None);
        }
        self.graph.push(action).await.map(Some)
    }

    /// Record an action whose side effect already happened
    ///
    /// # Errors
    /// Returns error if the bookkeeping fails
    pub async fn record_with_result(
        &self,
        action: ActionDescriptor,
        result: CmdResult,
    ) -> Result<Option<PushOutcome>, ProvenanceError> {
        if !self.graph.is_recording() {
            tracing::debug!(f_id = %action.f_id, "recording suspended, action dropped");
            return Ok(None);
        }
        self.graph.push_with_result(action, result).await.map(Some)
    }
}
