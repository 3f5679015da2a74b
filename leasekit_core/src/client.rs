//! Storage client abstraction.
//!
//! [`StorageClient`] is the authenticated session handle supplied by the
//! authentication layer. Exactly one implementation talks to the real
//! provider ([`DropboxClient`](crate::dropbox::DropboxClient)); the other is
//! the in-memory double in [`memory`](crate::memory).
//!
//! Paths passed to a client are already resolved: full logical paths for
//! the default client, workspace-relative paths for a namespace-scoped one.

use crate::error::ClientError;
use crate::types::{DirectoryEntry, ListPage, NamespaceId, ShareLink, SharedFolder};
use async_trait::async_trait;
use std::sync::Arc;

/// Result type for a single provider call.
pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Authenticated handle to the storage provider.
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Whether the session currently holds usable credentials.
    fn is_authenticated(&self) -> bool;

    /// Lists the first page of a folder.
    async fn list_folder(&self, path: &str) -> ClientResult<ListPage>;

    /// Continues a listing from a pagination cursor.
    async fn list_folder_continue(&self, cursor: &str) -> ClientResult<ListPage>;

    /// Fetches metadata for a single path.
    async fn get_metadata(&self, path: &str) -> ClientResult<DirectoryEntry>;

    /// Lists all shared folders visible to the session, fully drained.
    async fn list_shared_folders(&self) -> ClientResult<Vec<SharedFolder>>;

    /// Lists shared links for a path.
    ///
    /// With `direct_only`, links to ancestor folders are excluded.
    async fn list_shared_links(
        &self,
        path: &str,
        direct_only: bool,
    ) -> ClientResult<Vec<ShareLink>>;

    /// Creates a shared link with the requested visibility.
    async fn create_shared_link(&self, path: &str, is_public: bool) -> ClientResult<ShareLink>;

    /// Creates a single folder. The parent must already exist.
    async fn create_folder(&self, path: &str) -> ClientResult<DirectoryEntry>;

    /// Returns a client scoped to the given namespace.
    fn with_namespace(&self, namespace_id: &NamespaceId) -> Arc<dyn StorageClient>;
}
