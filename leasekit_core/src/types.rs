//! Core value types for LeaseKit storage access.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque identifier scoping a client to one shared workspace.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NamespaceId(pub String);

impl NamespaceId {
    /// Creates a new NamespaceId.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the underlying identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NamespaceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One entry of a directory listing.
///
/// Produced per listing call and never persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    /// Final path component
    pub name: String,
    /// Display path as reported by the client that produced it
    pub path: String,
    /// Whether the entry is a folder
    pub is_directory: bool,
    /// Size in bytes (files only)
    pub size: Option<u64>,
    /// Last modification time (files only)
    pub modified_at: Option<DateTime<Utc>>,
}

impl DirectoryEntry {
    /// Creates a folder entry.
    pub fn folder(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            is_directory: true,
            size: None,
            modified_at: None,
        }
    }

    /// Creates a file entry.
    pub fn file(name: impl Into<String>, path: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            is_directory: false,
            size: Some(size),
            modified_at: None,
        }
    }

    /// Sets the modification time.
    pub fn modified_at(mut self, at: DateTime<Utc>) -> Self {
        self.modified_at = Some(at);
        self
    }
}

/// A shareable link to a path.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareLink {
    /// Link URL
    pub url: String,
    /// Whether anyone with the link can open it
    pub is_public: bool,
}

impl ShareLink {
    /// Creates a new ShareLink.
    pub fn new(url: impl Into<String>, is_public: bool) -> Self {
        Self {
            url: url.into(),
            is_public,
        }
    }
}

/// A shared folder visible to the session, as reported by the provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedFolder {
    /// Folder display name (case-sensitive)
    pub name: String,
    /// Namespace identifier used for scoped access
    pub namespace_id: NamespaceId,
}

impl SharedFolder {
    /// Creates a new SharedFolder.
    pub fn new(name: impl Into<String>, namespace_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace_id: NamespaceId::new(namespace_id),
        }
    }
}

/// One page of a folder listing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListPage {
    /// Entries in provider order
    pub entries: Vec<DirectoryEntry>,
    /// Cursor for the next page
    pub cursor: Option<String>,
    /// Whether more pages remain
    pub has_more: bool,
}

/// A directory found by the combined metadata and link lookup.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryMatch {
    /// Logical path that was searched
    pub path: String,
    /// Metadata of the directory
    pub entry: DirectoryEntry,
    /// Shareable link, if one could be obtained
    pub link: Option<ShareLink>,
}

/// Outcome of a directory creation request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CreateOutcome {
    /// Directory was created
    Created,
    /// Directory already existed
    AlreadyExists,
    /// Nothing was done (e.g., the parent directory is missing)
    Skipped(String),
}
