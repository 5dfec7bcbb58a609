//! Automation identity and claims.
//!
//! The indexer never acts as an end user. Every operation runs as a
//! configured service account whose permissions become the claims checked
//! at the store boundary.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Permissions relevant to indexing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    /// Read tag records
    ViewTags,
    /// Read facet records
    ViewFacets,
    /// Write tag documents to the index and stamp them
    IndexTags,
    /// Write facet documents to the index and stamp them
    IndexFacets,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::ViewTags => "view_tags",
            Permission::ViewFacets => "view_facets",
            Permission::IndexTags => "index_tags",
            Permission::IndexFacets => "index_facets",
        }
    }

    /// Everything an indexing account needs.
    pub fn indexing_set() -> Vec<Permission> {
        vec![
            Permission::ViewTags,
            Permission::ViewFacets,
            Permission::IndexTags,
            Permission::IndexFacets,
        ]
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A service account stored in the entity store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationUser {
    pub user_id: Uuid,
    pub username: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub permissions: Vec<Permission>,
}

fn default_enabled() -> bool {
    true
}

impl AutomationUser {
    /// Create an enabled account holding the full indexing permission set.
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            user_id: Uuid::new_v4(),
            username: username.into(),
            display_name: None,
            enabled: true,
            permissions: Permission::indexing_set(),
        }
    }

    pub fn with_permissions(mut self, permissions: Vec<Permission>) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// Resolved claims of the identity an operation runs as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claims {
    pub user_id: Uuid,
    pub username: String,
    permissions: HashSet<Permission>,
}

impl Claims {
    pub fn for_user(user: &AutomationUser) -> Self {
        Self {
            user_id: user.user_id,
            username: user.username.clone(),
            permissions: user.permissions.iter().copied().collect(),
        }
    }

    pub fn has(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }

    pub fn permissions(&self) -> impl Iterator<Item = &Permission> {
        self.permissions.iter()
    }
}
