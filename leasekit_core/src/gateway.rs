//! Cloud directory gateway.
//!
//! Every storage call goes through [`CloudDirectoryGateway`]. For each
//! logical path it decides whether the first component names a shared
//! workspace; if so, the call is made through a client scoped to that
//! workspace's namespace using the workspace-relative path, otherwise
//! through the session's default client with the full path.
//!
//! Expected negative outcomes are absorbed here: a missing path yields an
//! empty listing or `None`, never an error. Inside a namespace a malformed
//! lookup counts as missing too. Everything else surfaces as a
//! [`GatewayError`]; the gateway never retries.

use crate::client::{ClientResult, StorageClient};
use crate::error::{ClientError, GatewayError, Result};
use crate::namespace::WorkspaceNamespaceCache;
use crate::path::PathResolver;
use crate::types::{CreateOutcome, DirectoryEntry, DirectoryMatch, NamespaceId, ShareLink};
use std::sync::{Arc, RwLock};

/// A logical path bound to the client that can address it.
struct Resolved {
    client: Arc<dyn StorageClient>,
    /// Path as the client expects it
    path: String,
    /// Workspace name and namespace, when scoped
    workspace: Option<(String, NamespaceId)>,
}

impl Resolved {
    fn is_scoped(&self) -> bool {
        self.workspace.is_some()
    }

    /// Maps a path reported by the client back to a logical path.
    fn to_logical(&self, client_path: &str) -> String {
        match &self.workspace {
            Some((name, _)) => PathResolver::join(&format!("/{}", name), client_path),
            None => PathResolver::normalize(client_path),
        }
    }

    /// Converts a client result, absorbing expected negative outcomes.
    fn absorb<T>(&self, result: ClientResult<T>) -> Result<Option<T>> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(e) if self.is_scoped() && e.is_absent_in_namespace() => Ok(None),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Workspace-aware front for all storage provider calls.
///
/// Owns the session client and the namespace cache; both are replaced
/// together by [`reauthenticate`](Self::reauthenticate).
pub struct CloudDirectoryGateway {
    client: RwLock<Arc<dyn StorageClient>>,
    namespaces: WorkspaceNamespaceCache,
}

impl CloudDirectoryGateway {
    /// Creates a gateway over an authenticated session client.
    pub fn new(client: Arc<dyn StorageClient>) -> Self {
        Self {
            client: RwLock::new(client),
            namespaces: WorkspaceNamespaceCache::new(),
        }
    }

    /// The current session client.
    pub fn client(&self) -> Arc<dyn StorageClient> {
        let guard = self.client.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&guard)
    }

    /// Whether the session client holds usable credentials.
    pub fn is_authenticated(&self) -> bool {
        self.client().is_authenticated()
    }

    /// The namespace cache of the current session.
    pub fn namespaces(&self) -> &WorkspaceNamespaceCache {
        &self.namespaces
    }

    /// Installs a freshly authenticated client and clears the namespace cache.
    pub async fn reauthenticate(&self, client: Arc<dyn StorageClient>) {
        {
            let mut guard = self.client.write().unwrap_or_else(|poisoned| poisoned.into_inner());
            *guard = client;
        }
        self.namespaces.reset().await;
        tracing::info!("storage session replaced; namespace cache reset");
    }

    async fn resolve(&self, path: &str) -> Resolved {
        let normalized = PathResolver::normalize(path);
        let client = self.client();
        let segment = PathResolver::first_segment(&normalized);

        if !segment.is_empty() {
            let namespace = self
                .namespaces
                .namespace_id_for(client.as_ref(), &segment)
                .await;
            if let Some(namespace_id) = namespace {
                let relative = PathResolver::workspace_relative(&normalized);
                tracing::debug!(
                    path = %normalized,
                    workspace = %segment,
                    namespace_id = %namespace_id,
                    relative = %relative,
                    "resolved workspace path"
                );
                return Resolved {
                    client: client.with_namespace(&namespace_id),
                    path: relative,
                    workspace: Some((segment, namespace_id)),
                };
            }
        }

        Resolved {
            client,
            path: normalized,
            workspace: None,
        }
    }

    /// Lists a directory, draining every page.
    ///
    /// Entries keep the provider's page order and carry logical paths.
    /// A missing directory yields an empty list.
    pub async fn list_entries(&self, path: &str) -> Result<Vec<DirectoryEntry>> {
        let resolved = self.resolve(path).await;
        let first = match resolved.absorb(resolved.client.list_folder(&resolved.path).await)? {
            Some(page) => page,
            None => {
                tracing::debug!(path = %path, "directory not found; empty listing");
                return Ok(Vec::new());
            }
        };

        let mut entries = first.entries;
        let mut cursor = first.cursor.filter(|_| first.has_more);
        let mut pages = 1usize;
        while let Some(current) = cursor {
            let page = resolved
                .client
                .list_folder_continue(&current)
                .await
                .map_err(GatewayError::from)?;
            entries.extend(page.entries);
            cursor = page.cursor.filter(|_| page.has_more);
            pages += 1;
        }

        for entry in &mut entries {
            entry.path = resolved.to_logical(&entry.path);
        }
        tracing::debug!(path = %path, entries = entries.len(), pages, "directory listed");
        Ok(entries)
    }

    /// Fetches metadata for a path; `None` if it does not exist.
    ///
    /// The provider keeps no metadata for a workspace root, so one is
    /// reported as a plain folder named after the workspace.
    pub async fn metadata_of(&self, path: &str) -> Result<Option<DirectoryEntry>> {
        let resolved = self.resolve(path).await;
        if let Some((name, _)) = &resolved.workspace {
            if PathResolver::is_root(&resolved.path) {
                return Ok(Some(DirectoryEntry::folder(name.clone(), format!("/{}", name))));
            }
        }
        let entry = resolved.absorb(resolved.client.get_metadata(&resolved.path).await)?;
        Ok(entry.map(|mut entry| {
            entry.path = resolved.to_logical(&entry.path);
            entry
        }))
    }

    /// Returns the shareable link for a path, creating one only if none exists.
    ///
    /// An existing direct link is returned unchanged whatever its visibility.
    /// If creation loses a race with another creator, the lookup is retried
    /// once. `None` means the path does not exist.
    pub async fn share_link(&self, path: &str, is_public: bool) -> Result<Option<ShareLink>> {
        let resolved = self.resolve(path).await;

        let existing = match Self::direct_link(&resolved).await? {
            Some(existing) => existing,
            None => return Ok(None),
        };
        if let Some(link) = existing {
            tracing::debug!(path = %path, "reusing existing shared link");
            return Ok(Some(link));
        }

        match resolved.client.create_shared_link(&resolved.path, is_public).await {
            Ok(link) => {
                tracing::info!(path = %path, public = is_public, "shared link created");
                Ok(Some(link))
            }
            Err(ClientError::SharedLinkAlreadyExists(_)) => {
                tracing::debug!(
                    path = %path,
                    "shared link created concurrently; looking it up again"
                );
                match Self::direct_link(&resolved).await? {
                    Some(Some(link)) => Ok(Some(link)),
                    Some(None) => Err(GatewayError::Unknown(format!(
                        "shared link for {} reported as existing but could not be retrieved",
                        path
                    ))),
                    None => Ok(None),
                }
            }
            Err(e) => resolved.absorb(Err(e)),
        }
    }

    /// Outer `None`: path missing. Inner `None`: path exists without a link.
    async fn direct_link(resolved: &Resolved) -> Result<Option<Option<ShareLink>>> {
        let links = resolved.absorb(resolved.client.list_shared_links(&resolved.path, true).await)?;
        Ok(links.map(|links| links.into_iter().next()))
    }

    /// Looks up a directory and its shareable link in one step.
    ///
    /// `None` if nothing exists at the path or it is not a directory.
    pub async fn search_with_metadata(
        &self,
        path: &str,
        is_public: bool,
    ) -> Result<Option<DirectoryMatch>> {
        let normalized = PathResolver::normalize(path);
        let entry = match self.metadata_of(&normalized).await? {
            Some(entry) if entry.is_directory => entry,
            Some(_) => {
                tracing::debug!(path = %normalized, "path exists but is not a directory");
                return Ok(None);
            }
            None => return Ok(None),
        };

        let link = self.share_link(&normalized, is_public).await?;
        Ok(Some(DirectoryMatch {
            path: normalized,
            entry,
            link,
        }))
    }

    /// Whether a directory exists. Workspace roots always exist.
    pub async fn directory_exists(&self, path: &str) -> Result<bool> {
        if PathResolver::is_root(path) {
            return Ok(true);
        }
        let resolved = self.resolve(path).await;
        if resolved.is_scoped() && PathResolver::is_root(&resolved.path) {
            return Ok(true);
        }
        let entry = resolved.absorb(resolved.client.get_metadata(&resolved.path).await)?;
        Ok(entry.is_some_and(|e| e.is_directory))
    }

    /// Creates one directory whose parent already exists.
    ///
    /// A missing parent is never created implicitly; the request is
    /// reported as skipped instead.
    pub async fn create_directory(&self, path: &str) -> Result<CreateOutcome> {
        let normalized = PathResolver::normalize(path);
        if PathResolver::is_root(&normalized) {
            return Ok(CreateOutcome::Skipped("cannot create the root directory".to_string()));
        }

        let parent = PathResolver::parent_of(&normalized);
        if !self.directory_exists(&parent).await? {
            tracing::warn!(
                path = %normalized,
                parent = %parent,
                "parent directory missing; skipping creation"
            );
            return Ok(CreateOutcome::Skipped(format!(
                "parent directory {} does not exist",
                parent
            )));
        }

        let resolved = self.resolve(&normalized).await;
        if resolved.is_scoped() && PathResolver::is_root(&resolved.path) {
            return Ok(CreateOutcome::AlreadyExists);
        }
        match resolved.client.create_folder(&resolved.path).await {
            Ok(_) => {
                tracing::info!(path = %normalized, "directory created");
                Ok(CreateOutcome::Created)
            }
            Err(ClientError::Conflict(_)) => Ok(CreateOutcome::AlreadyExists),
            Err(e) => {
                resolved.absorb::<DirectoryEntry>(Err(e))?;
                Ok(CreateOutcome::Skipped(format!("parent directory {} disappeared", parent)))
            }
        }
    }

    /// Creates a base directory and then each child beneath it, in order.
    ///
    /// Nested children (`"a/b"`) need their parent earlier in the list. If the
    /// base cannot be created, every child is reported as skipped.
    pub async fn create_directory_tree(
        &self,
        base: &str,
        children: &[&str],
    ) -> Result<Vec<(String, CreateOutcome)>> {
        let base = PathResolver::normalize(base);
        let mut outcomes = Vec::with_capacity(children.len() + 1);

        let base_outcome = self.create_directory(&base).await?;
        let base_available = !matches!(base_outcome, CreateOutcome::Skipped(_));
        outcomes.push((base.clone(), base_outcome));

        for child in children {
            let path = PathResolver::join(&base, child);
            let outcome = if base_available {
                self.create_directory(&path).await?
            } else {
                CreateOutcome::Skipped(format!("base directory {} unavailable", base))
            };
            outcomes.push((path, outcome));
        }
        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::memory::{InMemoryStorageClient, Operation};

    fn federal_client() -> InMemoryStorageClient {
        let client = InMemoryStorageClient::new();
        client.add_workspace("FederalWorkspace", "ns:fed");
        client.add_folder("/FederalWorkspace/NMNM0501759");
        client.add_file("/FederalWorkspace/NMNM0501759/lease.pdf", 10);
        client
    }

    fn gateway(client: &InMemoryStorageClient) -> CloudDirectoryGateway {
        CloudDirectoryGateway::new(Arc::new(client.clone()))
    }

    #[tokio::test]
    async fn test_workspace_path_uses_namespace() {
        let client = federal_client();
        let gateway = gateway(&client);

        let entry = gateway
            .metadata_of("/FederalWorkspace/NMNM0501759")
            .await
            .unwrap()
            .unwrap();
        assert!(entry.is_directory);
        assert_eq!(entry.path, "/FederalWorkspace/NMNM0501759");

        let entries = gateway.list_entries("FederalWorkspace\\NMNM0501759\\").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, "/FederalWorkspace/NMNM0501759/lease.pdf");
    }

    #[tokio::test]
    async fn test_default_namespace_path() {
        let client = InMemoryStorageClient::new();
        client.add_folder("/Personal/NMNM1");
        let gateway = gateway(&client);

        assert!(gateway.metadata_of("/Personal/NMNM1").await.unwrap().is_some());
        assert!(gateway.metadata_of("/Personal/NMNM2").await.unwrap().is_none());
        assert_eq!(client.call_count(Operation::ListSharedFolders), 1);
    }

    #[tokio::test]
    async fn test_not_found_is_absent_not_error() {
        let client = federal_client();
        let gateway = gateway(&client);

        assert!(gateway.metadata_of("/FederalWorkspace/NOTFOUND").await.unwrap().is_none());
        assert!(gateway.list_entries("/FederalWorkspace/NOTFOUND").await.unwrap().is_empty());
        assert!(gateway.share_link("/FederalWorkspace/NOTFOUND", true).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_bad_request_absorbed_only_in_namespace() {
        let client = federal_client();
        client.add_folder("/Personal");
        client.fail_on(Operation::GetMetadata, None, ClientError::BadRequest("malformed".into()));
        let gateway = gateway(&client);

        assert!(gateway.metadata_of("/FederalWorkspace/NMNM0501759").await.unwrap().is_none());
        let err = gateway.metadata_of("/Personal").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownError);
    }

    #[tokio::test]
    async fn test_error_classes_propagate() {
        let client = federal_client();
        let gateway = gateway(&client);

        client.fail_on(Operation::ListFolder, None, ClientError::Unauthorized("expired".into()));
        let err = gateway.list_entries("/FederalWorkspace/NMNM0501759").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthError);

        client.clear_failures();
        client.fail_on(Operation::ListFolder, None, ClientError::RateLimited { retry_after: None });
        let err = gateway.list_entries("/FederalWorkspace/NMNM0501759").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransientError);
    }

    #[tokio::test]
    async fn test_pagination_drained_in_order() {
        let client = federal_client();
        client.set_page_size(2);
        for i in 0..5 {
            client.add_file(&format!("/FederalWorkspace/NMNM0501759/doc{}.pdf", i), 1);
        }
        let gateway = gateway(&client);

        let names: Vec<String> = gateway
            .list_entries("/FederalWorkspace/NMNM0501759")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(
            names,
            vec!["lease.pdf", "doc0.pdf", "doc1.pdf", "doc2.pdf", "doc3.pdf", "doc4.pdf"]
        );
        assert_eq!(client.call_count(Operation::ListFolderContinue), 2);
    }

    #[tokio::test]
    async fn test_share_link_idempotent() {
        let client = federal_client();
        let gateway = gateway(&client);

        let path = "/FederalWorkspace/NMNM0501759";
        let first = gateway.share_link(path, true).await.unwrap().unwrap();
        let second = gateway.share_link(path, true).await.unwrap().unwrap();
        assert_eq!(first.url, second.url);
        assert_eq!(client.call_count(Operation::CreateSharedLink), 1);
        assert_eq!(client.link_count("/FederalWorkspace/NMNM0501759"), 1);
    }

    #[tokio::test]
    async fn test_share_link_prefers_existing() {
        let client = federal_client();
        client.add_link("/FederalWorkspace/NMNM0501759", "https://existing/link", false);
        let gateway = gateway(&client);

        let link = gateway
            .share_link("/FederalWorkspace/NMNM0501759", true)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(link.url, "https://existing/link");
        assert!(!link.is_public);
        assert_eq!(client.call_count(Operation::CreateSharedLink), 0);
    }

    #[tokio::test]
    async fn test_share_link_race_retries_lookup_once() {
        let client = federal_client();
        client.race_link_creation("/FederalWorkspace/NMNM0501759");
        let gateway = gateway(&client);

        let link = gateway.share_link("/FederalWorkspace/NMNM0501759", true).await.unwrap();
        assert!(link.is_some());
        assert_eq!(client.call_count(Operation::CreateSharedLink), 1);
        assert_eq!(client.call_count(Operation::ListSharedLinks), 2);
    }

    #[tokio::test]
    async fn test_search_with_metadata() {
        let client = federal_client();
        let gateway = gateway(&client);

        let found = gateway
            .search_with_metadata("/FederalWorkspace/NMNM0501759", true)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.path, "/FederalWorkspace/NMNM0501759");
        assert!(found.link.is_some());

        assert!(gateway
            .search_with_metadata("/FederalWorkspace/NMNM0501759/lease.pdf", true)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_workspace_root_has_folder_metadata() {
        let client = federal_client();
        let gateway = gateway(&client);

        let entry = gateway.metadata_of("/FederalWorkspace/").await.unwrap().unwrap();
        assert!(entry.is_directory);
        assert_eq!(entry.name, "FederalWorkspace");
        assert_eq!(entry.path, "/FederalWorkspace");
        assert_eq!(client.call_count(Operation::GetMetadata), 0);

        let found = gateway.search_with_metadata("FederalWorkspace", true).await.unwrap().unwrap();
        assert_eq!(found.path, "/FederalWorkspace");
        assert!(found.entry.is_directory);
    }

    #[tokio::test]
    async fn test_create_directory_never_creates_parent() {
        let client = federal_client();
        let gateway = gateway(&client);

        let outcome = gateway.create_directory("/FederalWorkspace/MISSING/child").await.unwrap();
        assert!(matches!(outcome, CreateOutcome::Skipped(_)));
        assert!(!client.exists("/FederalWorkspace/MISSING"));

        let outcome = gateway.create_directory("/FederalWorkspace/NMNM9").await.unwrap();
        assert_eq!(outcome, CreateOutcome::Created);
        let outcome = gateway.create_directory("/FederalWorkspace/NMNM9").await.unwrap();
        assert_eq!(outcome, CreateOutcome::AlreadyExists);
    }

    #[tokio::test]
    async fn test_create_directory_tree() {
        let client = federal_client();
        let gateway = gateway(&client);

        let outcomes = gateway
            .create_directory_tree("/FederalWorkspace/NMNM7", &["Runsheets", "Runsheets/Drafts"])
            .await
            .unwrap();
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes.iter().all(|(_, o)| *o == CreateOutcome::Created));
        assert!(client.exists("/FederalWorkspace/NMNM7/Runsheets/Drafts"));

        let outcomes = gateway
            .create_directory_tree("/Nowhere/NMNM8", &["Runsheets"])
            .await
            .unwrap();
        assert!(outcomes.iter().all(|(_, o)| matches!(o, CreateOutcome::Skipped(_))));
    }

    #[tokio::test]
    async fn test_reauthenticate_resets_cache() {
        let client = federal_client();
        let gateway = gateway(&client);

        gateway.metadata_of("/FederalWorkspace/NMNM0501759").await.unwrap();
        assert!(gateway.namespaces().is_populated().await);

        gateway.reauthenticate(Arc::new(client.clone())).await;
        assert!(!gateway.namespaces().is_populated().await);

        gateway.metadata_of("/FederalWorkspace/NMNM0501759").await.unwrap();
        assert_eq!(client.call_count(Operation::ListSharedFolders), 2);
    }
}
