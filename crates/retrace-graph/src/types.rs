//! Graph description types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity and metadata of a provenance graph. Never affects execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphDesc {
    /// Storage id
    pub id: String,
    /// Display name
    pub name: String,
    /// Free-form description
    #[serde(default)]
    pub description: String,
    /// User who created the graph
    pub creator: String,
    /// Permission bitmask
    pub permissions: u32,
    /// True for graphs that only live on this machine
    pub local: bool,
    /// Application the graph belongs to
    pub application: String,
    /// Node counts at the last save
    #[serde(default)]
    pub size: GraphDim,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification
    pub modified_at: DateTime<Utc>,
}

impl GraphDesc {
    /// Local graph description stamped with the current time
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            creator: String::from("anonymous"),
            permissions: 0x1C0,
            local: true,
            application: String::from("retrace"),
            size: GraphDim::default(),
            created_at: now,
            modified_at: now,
        }
    }

    /// With description
    #[inline]
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// With creator
    #[inline]
    #[must_use]
    pub fn with_creator(mut self, creator: impl Into<String>) -> Self {
        self.creator = creator.into();
        self
    }

    /// With application
    #[inline]
    #[must_use]
    pub fn with_application(mut self, application: impl Into<String>) -> Self {
        self.application = application.into();
        self
    }

    /// With permissions
    #[inline]
    #[must_use]
    pub fn with_permissions(mut self, permissions: u32) -> Self {
        self.permissions = permissions;
        self
    }

    /// With locality flag
    #[inline]
    #[must_use]
    pub fn with_local(mut self, local: bool) -> Self {
        self.local = local;
        self
    }

    /// Apply a patch, touching `modified_at`
    pub fn apply(&mut self, patch: &DescPatch) {
        if let Some(name) = &patch.name {
            self.name.clone_from(name);
        }
        if let Some(description) = &patch.description {
            self.description.clone_from(description);
        }
        if let Some(permissions) = patch.permissions {
            self.permissions = permissions;
        }
        if let Some(creator) = &patch.creator {
            self.creator.clone_from(creator);
        }
        self.modified_at = Utc::now();
    }
}

/// Partial update of a [`GraphDesc`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescPatch {
    /// New name
    pub name: Option<String>,
    /// New description
    pub description: Option<String>,
    /// New permissions
    pub permissions: Option<u32>,
    /// New creator
    pub creator: Option<String>,
}

impl DescPatch {
    /// Empty patch
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the name
    #[inline]
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the description
    #[inline]
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the permissions
    #[inline]
    #[must_use]
    pub fn permissions(mut self, permissions: u32) -> Self {
        self.permissions = Some(permissions);
        self
    }
}

/// Size of a graph
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphDim {
    /// State count, root included
    pub states: usize,
    /// Action count
    pub actions: usize,
    /// Registered object count
    pub objects: usize,
    /// Story count
    pub stories: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_only_touches_given_fields() {
        let mut desc = GraphDesc::new("retrace0", "Session").with_description("first");
        desc.apply(&DescPatch::new().name("Renamed"));
        assert_eq!(desc.name, "Renamed");
        assert_eq!(desc.description, "first");
        assert!(desc.modified_at >= desc.created_at);
    }

    #[test]
    fn desc_serializes_camel_case() {
        let v = serde_json::to_value(GraphDesc::new("g", "n")).unwrap();
        assert!(v.get("createdAt").is_some());
        assert!(v.get("modifiedAt").is_some());
        assert_eq!(v["local"], true);
    }
}
