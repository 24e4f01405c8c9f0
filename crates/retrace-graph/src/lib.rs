//! Retrace Graph - provenance engine
//!
//! Records every mutating operation as a reversible action and chains the
//! actions into a tree of states. On top of that tree it provides:
//! - push of new actions, branching when the user went back first
//! - jumps to any state, reverting and re-applying actions on the way
//! - undo and redo
//! - forks that copy a branch onto another state
//! - persistence into a JSON-compatible dump and structural restore
//! - stories (editable slide sequences over states)
//! - a graph manager backed by pluggable stores
//!
//! Executors are plugins. They are looked up by action id through an
//! [`ActionRegistry`] and cached per graph.
//!
//! # Example
//!
//! ```rust,ignore
//! use retrace_graph::prelude::*;
//!
//! # async fn example(registry: Arc<dyn ActionRegistry>) -> Result<(), ProvenanceError> {
//! let graph = ProvenanceGraph::in_memory(registry);
//! let view = graph.add_object(ParameterView::default(), "view", ObjectCategory::Visual);
//!
//! let first = graph.push(set_parameter(&view, "x", json!(1))).await?;
//! graph.push(set_parameter(&view, "x", json!(2))).await?;
//! graph.undo().await?;
//! assert_eq!(graph.current(), first.state);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

// Core modules
pub mod config;
mod dag;
pub mod error;
pub mod events;
pub mod executor;
mod fork;
pub mod graph;
pub mod manager;
pub mod persist;
pub mod recording;
pub mod registry;
pub mod state_machine;
pub mod store;
pub mod story;
pub mod types;

// Re-exports for convenience
pub use config::{GraphConfig, ManagerConfig, RetraceConfig};
pub use dag::ROOT_NAME;
pub use error::{BoxError, ConfigError, ProvenanceError, RegistryError, StoreError};
pub use events::{EventBus, GraphEvent};
pub use executor::{CmdResult, ExecContext, ExecFuture, Executor, FnExecutor};
pub use graph::{ProvenanceGraph, PushOutcome};
pub use manager::GraphManager;
pub use persist::{ActionDump, DescriptorDump, GraphDump, ObjectDump, StateDump};
pub use recording::{Recorder, RecordingGuard, RecordingSwitch};
pub use registry::{ActionRegistry, ExecutorCache, LoadFuture, StaticActionRegistry};
pub use state_machine::{allowed_transitions, validate_transition, GraphPhase};
pub use store::{GraphStore, JsonFileStore, MemoryStore, StoredGraph};
pub use story::{Slide, Story};
pub use types::{DescPatch, GraphDesc, GraphDim};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with provenance graphs
    pub use crate::{
        ActionRegistry, CmdResult, ExecContext, Executor, GraphDump, GraphEvent, GraphManager, ProvenanceError,
        ProvenanceGraph, PushOutcome, StaticActionRegistry,
    };
    pub use retrace_model::prelude::*;
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
