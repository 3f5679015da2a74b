//! Workspace name to namespace id cache.
//!
//! The map is built lazily from one shared-folder listing per authenticated
//! session. A failed listing caches an empty map so that the expensive call
//! happens at most once per session; every path is then treated as a
//! non-workspace path until [`WorkspaceNamespaceCache::reset`] is called.

use crate::client::StorageClient;
use crate::types::NamespaceId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Lazily-populated mapping from workspace display name to namespace id.
///
/// Population happens under the write lock with a second check, so
/// concurrent first lookups issue a single listing. Reads afterwards only
/// take the read lock.
#[derive(Clone, Default)]
pub struct WorkspaceNamespaceCache {
    inner: Arc<RwLock<Option<Arc<HashMap<String, NamespaceId>>>>>,
}

impl WorkspaceNamespaceCache {
    /// Creates an empty, unpopulated cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up the namespace id for a workspace name.
    ///
    /// Names match case-sensitively. An unknown name is `None`, never an error.
    pub async fn namespace_id_for(
        &self,
        client: &dyn StorageClient,
        workspace_name: &str,
    ) -> Option<NamespaceId> {
        if workspace_name.is_empty() {
            return None;
        }
        let map = self.load(client).await;
        map.get(workspace_name).cloned()
    }

    /// Clears the cache. Must follow every successful (re-)authentication.
    pub async fn reset(&self) {
        let mut guard = self.inner.write().await;
        if guard.take().is_some() {
            tracing::debug!("workspace namespace cache cleared");
        }
    }

    /// Whether the cache has been populated in this session.
    pub async fn is_populated(&self) -> bool {
        self.inner.read().await.is_some()
    }

    /// Number of cached workspaces (zero when unpopulated).
    pub async fn len(&self) -> usize {
        self.inner
            .read()
            .await
            .as_ref()
            .map(|map| map.len())
            .unwrap_or(0)
    }

    async fn load(&self, client: &dyn StorageClient) -> Arc<HashMap<String, NamespaceId>> {
        if let Some(map) = self.inner.read().await.as_ref() {
            return Arc::clone(map);
        }

        let mut guard = self.inner.write().await;
        if let Some(map) = guard.as_ref() {
            return Arc::clone(map);
        }

        let map = match client.list_shared_folders().await {
            Ok(folders) => {
                let map: HashMap<String, NamespaceId> = folders
                    .into_iter()
                    .map(|folder| (folder.name, folder.namespace_id))
                    .collect();
                tracing::info!(workspaces = map.len(), "workspace namespace cache populated");
                map
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "shared folder listing failed; treating all paths as non-workspace"
                );
                HashMap::new()
            }
        };

        let map = Arc::new(map);
        *guard = Some(Arc::clone(&map));
        map
    }
}
