//! Retrace Model
//!
//! Building blocks of the provenance graph.
//!
//! # Overview
//!
//! - **ObjectRef**: stable handle to an application object, deduplicated by
//!   `(category, name, hash)`
//! - **ObjectRegistry**: owner of all object references of one graph
//! - **ActionDescriptor**: named, parameterized command bound to inputs
//! - **StateNode / ActionNode**: vertices and edges of the graph
//!
//! # Example
//!
//! ```rust
//! use retrace_model::{IdAllocator, ObjectCategory, ObjectProxy, ObjectRegistry};
//!
//! let registry = ObjectRegistry::new(IdAllocator::new());
//! let view = registry.find_or_add(ObjectProxy::new(42u32, "view", ObjectCategory::Visual));
//! let again = registry.find_or_add(ObjectProxy::named("view", ObjectCategory::Visual));
//! assert_eq!(view.id(), again.id());
//! ```

#![warn(missing_docs)]

pub mod action;
pub mod error;
pub mod ids;
pub mod node;
pub mod object;
pub mod registry;

// Re-exports
pub use action::{ActionCategory, ActionDescriptor, ActionMetaData, Operation};
pub use error::ModelError;
pub use ids::{ActionId, IdAllocator, ObjectId, StateId, StoryId};
pub use node::{ActionEffects, ActionNode, StateNode};
pub use object::{
    default_hash, AnyValue, ObjectCategory, ObjectInput, ObjectKey, ObjectProxy, ObjectRef, PendingValue,
    ValueSlot,
};
pub use registry::ObjectRegistry;

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for model types
    pub use crate::{
        ActionCategory, ActionDescriptor, ActionId, ActionMetaData, ActionNode, ObjectCategory, ObjectInput,
        ObjectProxy, ObjectRef, Operation, StateId, StateNode,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
