//! In-memory storage client.
//!
//! A deterministic stand-in for the real provider, used by the test suites
//! of both crates. It models the namespace split of team workspaces: a
//! folder registered with [`InMemoryStorageClient::add_workspace`] is only
//! reachable through a client scoped to its namespace, using paths relative
//! to the workspace root. Paths under any other first component live in the
//! default namespace.
//!
//! Failures can be injected per operation and path, listings can be split
//! into small pages, and every call is counted.

use crate::client::{ClientResult, StorageClient};
use crate::error::ClientError;
use crate::path::PathResolver;
use crate::types::{DirectoryEntry, ListPage, NamespaceId, ShareLink, SharedFolder};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

/// Client operations, for call counting and failure injection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    ListFolder,
    ListFolderContinue,
    GetMetadata,
    ListSharedFolders,
    ListSharedLinks,
    CreateSharedLink,
    CreateFolder,
}

/// Key of the default (non-workspace) namespace.
const DEFAULT_NAMESPACE: &str = "";

#[derive(Default)]
struct NamespaceTree {
    /// Every node, in insertion order (listing order).
    entries: Vec<DirectoryEntry>,
    links: HashMap<String, ShareLink>,
}

impl NamespaceTree {
    fn find(&self, path: &str) -> Option<&DirectoryEntry> {
        self.entries.iter().find(|e| e.path == path)
    }

    fn is_folder(&self, path: &str) -> bool {
        PathResolver::is_root(path) || self.find(path).is_some_and(|e| e.is_directory)
    }

    fn children(&self, path: &str) -> Vec<DirectoryEntry> {
        self.entries
            .iter()
            .filter(|e| PathResolver::parent_of(&e.path) == path)
            .cloned()
            .collect()
    }

    fn ensure_folder(&mut self, path: &str) {
        if PathResolver::is_root(path) || self.find(path).is_some() {
            return;
        }
        self.ensure_folder(&PathResolver::parent_of(path));
        self.entries
            .push(DirectoryEntry::folder(PathResolver::file_name(path), path));
    }
}

struct Failure {
    operation: Operation,
    namespace: Option<String>,
    path: Option<String>,
    error: ClientError,
}

struct Cursor {
    namespace: String,
    path: String,
    offset: usize,
}

struct State {
    authenticated: bool,
    page_size: usize,
    shared_folders: Vec<SharedFolder>,
    trees: HashMap<String, NamespaceTree>,
    failures: Vec<Failure>,
    racing_links: HashSet<(String, String)>,
    cursors: HashMap<String, Cursor>,
    calls: HashMap<Operation, usize>,
    next_id: u64,
}

impl State {
    fn tree(&mut self, namespace: &str) -> &mut NamespaceTree {
        self.trees.entry(namespace.to_string()).or_default()
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Maps a logical path to (namespace, path within namespace).
    fn locate(&self, logical: &str) -> (String, String) {
        let segment = PathResolver::first_segment(logical);
        match self.shared_folders.iter().find(|f| f.name == segment) {
            Some(folder) => (
                folder.namespace_id.as_str().to_string(),
                PathResolver::workspace_relative(logical),
            ),
            None => (DEFAULT_NAMESPACE.to_string(), PathResolver::normalize(logical)),
        }
    }

    fn injected(
        &self,
        operation: Operation,
        namespace: &str,
        path: Option<&str>,
    ) -> Option<ClientError> {
        self.failures
            .iter()
            .find(|f| {
                f.operation == operation
                    && f.namespace.as_deref().map_or(true, |ns| ns == namespace)
                    && match (&f.path, path) {
                        (None, _) => true,
                        (Some(expected), Some(actual)) => expected == actual,
                        (Some(_), None) => false,
                    }
            })
            .map(|f| replay(&f.error))
    }
}

/// Recreates an error value so a single injected failure can fire repeatedly.
fn replay(err: &ClientError) -> ClientError {
    match err {
        ClientError::NotFound(m) => ClientError::NotFound(m.clone()),
        ClientError::BadRequest(m) => ClientError::BadRequest(m.clone()),
        ClientError::Conflict(m) => ClientError::Conflict(m.clone()),
        ClientError::SharedLinkAlreadyExists(m) => ClientError::SharedLinkAlreadyExists(m.clone()),
        ClientError::Unauthorized(m) => ClientError::Unauthorized(m.clone()),
        ClientError::RateLimited { retry_after } => ClientError::RateLimited {
            retry_after: *retry_after,
        },
        ClientError::Network(m) => ClientError::Network(m.clone()),
        ClientError::Server { status, message } => ClientError::Server {
            status: *status,
            message: message.clone(),
        },
        ClientError::Decode(m) => ClientError::Decode(m.clone()),
        ClientError::Other(e) => ClientError::Other(anyhow::anyhow!(e.to_string())),
    }
}

/// In-memory [`StorageClient`] with workspace namespaces.
///
/// Cloning, or scoping with [`StorageClient::with_namespace`], shares the
/// underlying state.
#[derive(Clone)]
pub struct InMemoryStorageClient {
    state: Arc<Mutex<State>>,
    namespace: String,
}

impl Default for InMemoryStorageClient {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStorageClient {
    /// Creates an authenticated, empty client.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                authenticated: true,
                page_size: 100,
                shared_folders: Vec::new(),
                trees: HashMap::new(),
                failures: Vec::new(),
                racing_links: HashSet::new(),
                cursors: HashMap::new(),
                calls: HashMap::new(),
                next_id: 0,
            })),
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Registers a shared workspace and its namespace.
    pub fn add_workspace(&self, name: &str, namespace_id: &str) {
        let mut state = self.lock();
        state.shared_folders.push(SharedFolder::new(name, namespace_id));
        state.tree(namespace_id);
    }

    /// Adds a folder (and any missing ancestors) at a logical path.
    pub fn add_folder(&self, logical_path: &str) {
        let mut state = self.lock();
        let (namespace, path) = state.locate(logical_path);
        state.tree(&namespace).ensure_folder(&path);
    }

    /// Adds a file (and any missing ancestor folders) at a logical path.
    pub fn add_file(&self, logical_path: &str, size: u64) {
        let mut state = self.lock();
        let (namespace, path) = state.locate(logical_path);
        let tree = state.tree(&namespace);
        tree.ensure_folder(&PathResolver::parent_of(&path));
        if tree.find(&path).is_none() {
            tree.entries
                .push(DirectoryEntry::file(PathResolver::file_name(&path), path, size));
        }
    }

    /// Attaches an existing shared link to a logical path.
    pub fn add_link(&self, logical_path: &str, url: &str, is_public: bool) {
        let mut state = self.lock();
        let (namespace, path) = state.locate(logical_path);
        state
            .tree(&namespace)
            .links
            .insert(path, ShareLink::new(url, is_public));
    }

    /// Marks the session as (un)authenticated.
    pub fn set_authenticated(&self, authenticated: bool) {
        self.lock().authenticated = authenticated;
    }

    /// Sets the number of entries returned per listing page.
    pub fn set_page_size(&self, page_size: usize) {
        self.lock().page_size = page_size.max(1);
    }

    /// Makes every shared-folder listing fail with the given error.
    pub fn fail_shared_folders(&self, error: ClientError) {
        self.fail_on(Operation::ListSharedFolders, None, error);
    }

    /// Makes an operation fail with the given error.
    ///
    /// `path` is matched against the path the client receives (relative
    /// for scoped clients); `None` matches every call.
    pub fn fail_on(&self, operation: Operation, path: Option<&str>, error: ClientError) {
        self.lock().failures.push(Failure {
            operation,
            namespace: None,
            path: path.map(PathResolver::normalize),
            error,
        });
    }

    /// Like [`fail_on`](Self::fail_on) but only for calls at a logical path.
    pub fn fail_at(&self, operation: Operation, logical_path: &str, error: ClientError) {
        let mut state = self.lock();
        let (namespace, path) = state.locate(logical_path);
        state.failures.push(Failure {
            operation,
            namespace: Some(namespace),
            path: Some(path),
            error,
        });
    }

    /// Removes all injected failures.
    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    /// Simulates a concurrent creator: the next link creation at the logical
    /// path loses the race and reports that a link already exists.
    pub fn race_link_creation(&self, logical_path: &str) {
        let mut state = self.lock();
        let key = state.locate(logical_path);
        state.racing_links.insert(key);
    }

    /// Number of calls made for an operation, across all scopes.
    pub fn call_count(&self, operation: Operation) -> usize {
        self.lock().calls.get(&operation).copied().unwrap_or(0)
    }

    /// Number of shared links held for a logical path.
    pub fn link_count(&self, logical_path: &str) -> usize {
        let mut state = self.lock();
        let (namespace, path) = state.locate(logical_path);
        usize::from(state.tree(&namespace).links.contains_key(&path))
    }

    /// Whether a node exists at a logical path.
    pub fn exists(&self, logical_path: &str) -> bool {
        let mut state = self.lock();
        let (namespace, path) = state.locate(logical_path);
        PathResolver::is_root(&path) || state.tree(&namespace).find(&path).is_some()
    }

    fn begin(
        &self,
        operation: Operation,
        path: Option<&str>,
    ) -> ClientResult<MutexGuard<'_, State>> {
        let mut state = self.lock();
        *state.calls.entry(operation).or_insert(0) += 1;
        if !state.authenticated {
            return Err(ClientError::Unauthorized("session is not authenticated".to_string()));
        }
        if let Some(err) = state.injected(operation, &self.namespace, path) {
            return Err(err);
        }
        Ok(state)
    }

    fn page(&self, state: &mut State, path: &str, offset: usize) -> ListPage {
        let page_size = state.page_size;
        let children = state.tree(&self.namespace).children(path);
        let end = (offset + page_size).min(children.len());
        let entries = children[offset.min(end)..end].to_vec();
        let has_more = end < children.len();
        let cursor = if has_more {
            let id = format!("cursor-{}", state.next_id());
            state.cursors.insert(
                id.clone(),
                Cursor {
                    namespace: self.namespace.clone(),
                    path: path.to_string(),
                    offset: end,
                },
            );
            Some(id)
        } else {
            None
        };
        ListPage {
            entries,
            cursor,
            has_more,
        }
    }
}

#[async_trait]
impl StorageClient for InMemoryStorageClient {
    fn is_authenticated(&self) -> bool {
        self.lock().authenticated
    }

    async fn list_folder(&self, path: &str) -> ClientResult<ListPage> {
        let path = PathResolver::normalize(path);
        let mut state = self.begin(Operation::ListFolder, Some(&path))?;
        let tree = state.tree(&self.namespace);
        if !tree.is_folder(&path) {
            return match tree.find(&path) {
                Some(_) => Err(ClientError::BadRequest(format!("not a folder: {}", path))),
                None => Err(ClientError::NotFound(path)),
            };
        }
        Ok(self.page(&mut state, &path, 0))
    }

    async fn list_folder_continue(&self, cursor: &str) -> ClientResult<ListPage> {
        let state = self.lock();
        let (namespace, path, offset) = match state.cursors.get(cursor) {
            Some(c) => (c.namespace.clone(), c.path.clone(), c.offset),
            None => return Err(ClientError::BadRequest(format!("unknown cursor: {}", cursor))),
        };
        drop(state);
        if namespace != self.namespace {
            return Err(ClientError::BadRequest("cursor belongs to another namespace".to_string()));
        }
        let mut state = self.begin(Operation::ListFolderContinue, Some(&path))?;
        state.cursors.remove(cursor);
        Ok(self.page(&mut state, &path, offset))
    }

    async fn get_metadata(&self, path: &str) -> ClientResult<DirectoryEntry> {
        let path = PathResolver::normalize(path);
        let mut state = self.begin(Operation::GetMetadata, Some(&path))?;
        if PathResolver::is_root(&path) {
            return Err(ClientError::BadRequest("the root folder has no metadata".to_string()));
        }
        state
            .tree(&self.namespace)
            .find(&path)
            .cloned()
            .ok_or(ClientError::NotFound(path))
    }

    async fn list_shared_folders(&self) -> ClientResult<Vec<SharedFolder>> {
        let state = self.begin(Operation::ListSharedFolders, None)?;
        Ok(state.shared_folders.clone())
    }

    async fn list_shared_links(
        &self,
        path: &str,
        direct_only: bool,
    ) -> ClientResult<Vec<ShareLink>> {
        let path = PathResolver::normalize(path);
        let mut state = self.begin(Operation::ListSharedLinks, Some(&path))?;
        let tree = state.tree(&self.namespace);
        if !PathResolver::is_root(&path) && tree.find(&path).is_none() {
            return Err(ClientError::NotFound(path));
        }
        let mut links: Vec<ShareLink> = tree.links.get(&path).cloned().into_iter().collect();
        if !direct_only {
            let mut ancestor = PathResolver::parent_of(&path);
            while !PathResolver::is_root(&ancestor) {
                if let Some(link) = tree.links.get(&ancestor) {
                    links.push(link.clone());
                }
                ancestor = PathResolver::parent_of(&ancestor);
            }
        }
        Ok(links)
    }

    async fn create_shared_link(&self, path: &str, is_public: bool) -> ClientResult<ShareLink> {
        let path = PathResolver::normalize(path);
        let mut state = self.begin(Operation::CreateSharedLink, Some(&path))?;
        let id = state.next_id();
        let race_key = (self.namespace.clone(), path.clone());
        let raced = state.racing_links.remove(&race_key);
        let tree = state.tree(&self.namespace);
        if tree.find(&path).is_none() {
            return Err(ClientError::NotFound(path));
        }
        let url = format!(
            "https://storage.test/s/{}/{}",
            id,
            PathResolver::file_name(&path).replace(' ', "%20")
        );
        if raced {
            tree.links.insert(path.clone(), ShareLink::new(url, is_public));
            return Err(ClientError::SharedLinkAlreadyExists(path));
        }
        if tree.links.contains_key(&path) {
            return Err(ClientError::SharedLinkAlreadyExists(path));
        }
        let link = ShareLink::new(url, is_public);
        tree.links.insert(path, link.clone());
        Ok(link)
    }

    async fn create_folder(&self, path: &str) -> ClientResult<DirectoryEntry> {
        let path = PathResolver::normalize(path);
        let mut state = self.begin(Operation::CreateFolder, Some(&path))?;
        let tree = state.tree(&self.namespace);
        if tree.find(&path).is_some() || PathResolver::is_root(&path) {
            return Err(ClientError::Conflict(path));
        }
        if !tree.is_folder(&PathResolver::parent_of(&path)) {
            return Err(ClientError::NotFound(PathResolver::parent_of(&path)));
        }
        let entry = DirectoryEntry::folder(PathResolver::file_name(&path), path);
        tree.entries.push(entry.clone());
        Ok(entry)
    }

    fn with_namespace(&self, namespace_id: &NamespaceId) -> Arc<dyn StorageClient> {
        Arc::new(Self {
            state: Arc::clone(&self.state),
            namespace: namespace_id.as_str().to_string(),
        })
    }
}
