//! Action metadata and descriptors
//!
//! An [`ActionDescriptor`] names an executor by `f_id`, binds its inputs and
//! a JSON parameter payload, and carries descriptive [`ActionMetaData`].
//! Because the parameter is a [`serde_json::Value`], every descriptor is
//! serializable by construction.

use crate::object::{ObjectInput, ObjectRef};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Category of an action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ActionCategory {
    /// Changes data
    #[default]
    Data,
    /// Changes visual state
    Visual,
    /// Changes a selection
    Selection,
    /// Changes layout
    Layout,
    /// Anything else
    Custom,
}

/// Kind of operation an action performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Creates something
    Create,
    /// Updates something
    #[default]
    Update,
    /// Removes something
    Remove,
}

/// Descriptive metadata. Never affects execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionMetaData {
    /// Display name
    pub name: String,
    /// Category
    pub category: ActionCategory,
    /// Operation
    pub operation: Operation,
    /// Creation time
    pub timestamp: DateTime<Utc>,
    /// User who performed the action; empty until recorded
    pub user: String,
}

impl ActionMetaData {
    /// Metadata stamped with the current time. The user is left empty and
    /// filled in by the graph when the action is recorded.
    #[must_use]
    pub fn new(name: impl Into<String>, category: ActionCategory, operation: Operation) -> Self {
        Self {
            name: name.into(),
            category,
            operation,
            timestamp: Utc::now(),
            user: String::new(),
        }
    }

    /// Set the user
    #[inline]
    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    /// Set the timestamp
    #[inline]
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

impl fmt::Display for ActionMetaData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?}/{:?})", self.name, self.category, self.operation)
    }
}

/// A bound, not yet executed action
#[derive(Debug, Clone)]
pub struct ActionDescriptor {
    /// Executor key resolved through the action registry
    pub f_id: String,
    /// Bound inputs
    pub inputs: Vec<ObjectInput>,
    /// Plain key/value payload
    pub parameter: Value,
    /// Descriptive metadata
    pub meta: ActionMetaData,
}

impl ActionDescriptor {
    /// Descriptor without inputs and with an empty parameter object
    #[must_use]
    pub fn new(f_id: impl Into<String>, meta: ActionMetaData) -> Self {
        Self {
            f_id: f_id.into(),
            inputs: Vec::new(),
            parameter: Value::Object(serde_json::Map::new()),
            meta,
        }
    }

    /// Bind inputs
    #[must_use]
    pub fn with_inputs<I>(mut self, inputs: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<ObjectInput>,
    {
        self.inputs = inputs.into_iter().map(Into::into).collect();
        self
    }

    /// Bind one more input
    #[must_use]
    pub fn with_input(mut self, input: impl Into<ObjectInput>) -> Self {
        self.inputs.push(input.into());
        self
    }

    /// Set the parameter payload
    #[inline]
    #[must_use]
    pub fn with_parameter(mut self, parameter: Value) -> Self {
        self.parameter = parameter;
        self
    }

    /// Descriptor over already registered references
    #[must_use]
    pub fn over_refs(f_id: impl Into<String>, meta: ActionMetaData, inputs: &[ObjectRef], parameter: Value) -> Self {
        Self {
            f_id: f_id.into(),
            inputs: inputs.iter().map(ObjectInput::from).collect(),
            parameter,
            meta,
        }
    }
}
