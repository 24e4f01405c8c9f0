//! Error types for the provenance model

use crate::ids::ObjectId;
use crate::object::ObjectCategory;

/// Errors raised while building model structures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    /// Object id already registered
    #[error("duplicate object id: {0}")]
    DuplicateObjectId(ObjectId),

    /// Another object already has this identity key
    #[error("duplicate object key: {category}/{name}")]
    DuplicateObjectKey {
        /// Object name
        name: String,
        /// Object category
        category: ObjectCategory,
    },

    /// An id referenced by a node does not exist
    #[error("unknown object id: {0}")]
    UnknownObject(ObjectId),

    /// Id is so large that no fresh id can follow it
    #[error("id {0} leaves no room for new ids")]
    IdOutOfRange(u64),
}
