//! Error types for the provenance engine
//!
//! Provides error handling for:
//! - Executor rejections and unresolvable action ids
//! - Navigation without an inverse
//! - Jumps that stop halfway
//! - Malformed dumps and storage failures

use crate::state_machine::GraphPhase;
use retrace_model::{ActionId, ModelError, StateId, StoryId};
use std::path::PathBuf;
use std::sync::Arc;

/// Boxed error produced outside the engine, kept verbatim
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Main engine error type
#[derive(Debug, thiserror::Error)]
pub enum ProvenanceError {
    /// The executor of an action failed. Nothing was recorded.
    #[error("executor for '{f_id}' rejected: {source}")]
    ExecutorRejected {
        /// Action id
        f_id: String,
        /// Error returned by the executor
        #[source]
        source: BoxError,
    },

    /// Navigation needs an inverse that was never produced
    #[error("no inverse available for action {action}")]
    NoInverseAvailable {
        /// Action that cannot be reverted
        action: ActionId,
    },

    /// The action registry does not know the id
    #[error("unknown action id: {0}")]
    UnknownActionId(String),

    /// A jump step failed after earlier steps succeeded
    #[error("jump stopped at {reached} after {completed} step(s): {source}")]
    PartialJumpFailure {
        /// Last state reached; the graph's current state
        reached: StateId,
        /// Number of steps that succeeded
        completed: usize,
        /// Failure of the next step
        #[source]
        source: Box<ProvenanceError>,
    },

    /// State id not in this graph
    #[error("state not found: {0}")]
    StateNotFound(StateId),

    /// Action id not in this graph
    #[error("action not found: {0}")]
    ActionNotFound(ActionId),

    /// Story id not in this graph
    #[error("story not found: {0}")]
    StoryNotFound(StoryId),

    /// Slide index past the end of a story
    #[error("story {story} has no slide {index}")]
    SlideOutOfRange {
        /// Story
        story: StoryId,
        /// Requested index
        index: usize,
    },

    /// Fork target lies inside the branch being copied
    #[error("cannot fork action {action} onto {target}: the target is part of the branch")]
    InvalidFork {
        /// First action of the branch
        action: ActionId,
        /// Requested target
        target: StateId,
    },

    /// Dump does not describe a valid graph
    #[error("invalid dump: {0}")]
    InvalidDump(String),

    /// Phase transition not allowed
    #[error("illegal phase transition: {from:?} -> {to:?}")]
    IllegalPhase {
        /// Current phase
        from: GraphPhase,
        /// Requested phase
        to: GraphPhase,
    },

    /// The action registry failed while loading an executor
    #[error("loading executor for '{f_id}' failed: {source}")]
    ExecutorLoadFailed {
        /// Action id
        f_id: String,
        /// Registry failure, shared by all callers that waited for the load
        #[source]
        source: Arc<RegistryError>,
    },

    /// Model inconsistency
    #[error("model error: {0}")]
    Model(#[from] ModelError),

    /// JSON (de)serialization failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Storage backend failed
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl ProvenanceError {
    /// Wrap an executor failure
    #[inline]
    pub fn rejected(f_id: impl Into<String>, source: anyhow::Error) -> Self {
        Self::ExecutorRejected {
            f_id: f_id.into(),
            source: source.into(),
        }
    }

    /// Map a shared registry failure
    #[must_use]
    pub fn from_registry(f_id: &str, err: Arc<RegistryError>) -> Self {
        match &*err {
            RegistryError::UnknownActionId(id) => Self::UnknownActionId(id.clone()),
            RegistryError::LoadFailed { .. } => Self::ExecutorLoadFailed {
                f_id: f_id.to_owned(),
                source: err,
            },
        }
    }

    /// True if the action itself could not be executed. Unknown ids count
    /// as rejections.
    #[inline]
    #[must_use]
    pub fn is_executor_rejection(&self) -> bool {
        matches!(
            self,
            Self::ExecutorRejected { .. } | Self::UnknownActionId(_) | Self::ExecutorLoadFailed { .. }
        )
    }

    /// State the graph stopped at, for partial jumps
    #[inline]
    #[must_use]
    pub fn reached_state(&self) -> Option<StateId> {
        match self {
            Self::PartialJumpFailure { reached, .. } => Some(*reached),
            _ => None,
        }
    }

    /// True if the graph is still consistent and usable after the error
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::IllegalPhase { .. } | Self::InvalidDump(_))
    }
}

/// Errors of an action registry
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// No executor registered under this id
    #[error("unknown action id: {0}")]
    UnknownActionId(String),

    /// The loader failed
    #[error("loader for '{f_id}' failed: {source}")]
    LoadFailed {
        /// Action id
        f_id: String,
        /// Loader failure
        #[source]
        source: BoxError,
    },
}

impl RegistryError {
    /// Wrap a loader failure
    #[inline]
    pub fn load_failed(f_id: impl Into<String>, source: anyhow::Error) -> Self {
        Self::LoadFailed {
            f_id: f_id.into(),
            source: source.into(),
        }
    }
}

/// Errors of a graph store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No graph stored under this id
    #[error("graph not found: {0}")]
    NotFound(String),

    /// Id cannot be used as a storage key
    #[error("invalid graph id: {0}")]
    InvalidId(String),

    /// File system failure
    #[error("io error at {path}: {source}")]
    Io {
        /// Affected path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Stored record is not valid JSON
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Every numbered id under the prefix is taken
    #[error("no graph ids left under prefix '{0}'")]
    IdsExhausted(String),
}

impl StoreError {
    /// Wrap an I/O error
    #[inline]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML could not be parsed
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
}
