//! Dropbox HTTP client.
//!
//! Implements [`StorageClient`] over the Dropbox RPC endpoints. A client
//! scoped with [`StorageClient::with_namespace`] sends the
//! `Dropbox-API-Path-Root` header so that paths are resolved relative to
//! the team folder's namespace.

use crate::client::{ClientResult, StorageClient};
use crate::config::StorageSettings;
use crate::error::ClientError;
use crate::types::{DirectoryEntry, ListPage, NamespaceId, ShareLink, SharedFolder};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{AUTHORIZATION, RETRY_AFTER};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const PATH_ROOT_HEADER: &str = "Dropbox-API-Path-Root";

/// Converts a logical path to the provider's form (root is the empty string).
fn wire_path(path: &str) -> String {
    if path == "/" {
        String::new()
    } else {
        path.to_string()
    }
}

/// Maps an HTTP failure to a [`ClientError`].
///
/// Endpoint-specific failures arrive as 409 with an `error_summary` such as
/// `path/not_found/...`.
pub fn classify_failure(status: u16, body: &str, retry_after: Option<Duration>) -> ClientError {
    let summary = serde_json::from_str::<WireError>(body)
        .map(|e| e.error_summary)
        .unwrap_or_else(|_| body.trim().to_string());

    match status {
        401 => ClientError::Unauthorized(summary),
        429 => ClientError::RateLimited { retry_after },
        400 => ClientError::BadRequest(summary),
        409 => {
            if summary.starts_with("path/not_found")
                || summary.starts_with("path_lookup/not_found")
            {
                ClientError::NotFound(summary)
            } else if summary.starts_with("shared_link_already_exists") {
                ClientError::SharedLinkAlreadyExists(summary)
            } else if summary.starts_with("path/conflict") {
                ClientError::Conflict(summary)
            } else if summary.starts_with("path/malformed_path")
                || summary.starts_with("path/not_folder")
            {
                ClientError::BadRequest(summary)
            } else {
                ClientError::Other(anyhow::anyhow!("endpoint error: {}", summary))
            }
        }
        500..=599 => ClientError::Server {
            status,
            message: summary,
        },
        _ => ClientError::Other(anyhow::anyhow!("unexpected status {}: {}", status, summary)),
    }
}

#[derive(Deserialize)]
struct WireError {
    error_summary: String,
}

#[derive(Deserialize)]
#[serde(tag = ".tag", rename_all = "snake_case")]
enum WireMetadata {
    File {
        name: String,
        path_display: Option<String>,
        size: u64,
        server_modified: Option<DateTime<Utc>>,
    },
    Folder {
        name: String,
        path_display: Option<String>,
    },
    Deleted {
        name: String,
        path_display: Option<String>,
    },
}

impl WireMetadata {
    fn into_entry(self) -> Option<DirectoryEntry> {
        match self {
            WireMetadata::File {
                name,
                path_display,
                size,
                server_modified,
            } => {
                let path = path_display.unwrap_or_else(|| format!("/{}", name));
                let mut entry = DirectoryEntry::file(name, path, size);
                entry.modified_at = server_modified;
                Some(entry)
            }
            WireMetadata::Folder { name, path_display } => {
                let path = path_display.unwrap_or_else(|| format!("/{}", name));
                Some(DirectoryEntry::folder(name, path))
            }
            WireMetadata::Deleted { .. } => None,
        }
    }
}

#[derive(Deserialize)]
struct WireListFolder {
    entries: Vec<WireMetadata>,
    cursor: Option<String>,
    #[serde(default)]
    has_more: bool,
}

impl From<WireListFolder> for ListPage {
    fn from(wire: WireListFolder) -> Self {
        ListPage {
            entries: wire.entries.into_iter().filter_map(WireMetadata::into_entry).collect(),
            cursor: wire.cursor,
            has_more: wire.has_more,
        }
    }
}

#[derive(Deserialize)]
struct WireSharedFolder {
    name: String,
    shared_folder_id: String,
}

#[derive(Deserialize)]
struct WireSharedFolders {
    entries: Vec<WireSharedFolder>,
    cursor: Option<String>,
}

#[derive(Deserialize)]
struct WireTag {
    #[serde(rename = ".tag")]
    tag: String,
}

#[derive(Deserialize)]
struct WireLinkPermissions {
    resolved_visibility: Option<WireTag>,
}

#[derive(Deserialize)]
struct WireLink {
    url: String,
    link_permissions: Option<WireLinkPermissions>,
}

impl From<WireLink> for ShareLink {
    fn from(wire: WireLink) -> Self {
        let is_public = wire
            .link_permissions
            .and_then(|p| p.resolved_visibility)
            .map(|v| v.tag == "public")
            .unwrap_or(false);
        ShareLink::new(wire.url, is_public)
    }
}

#[derive(Deserialize)]
struct WireLinks {
    links: Vec<WireLink>,
}

#[derive(Deserialize)]
struct WireCreateFolder {
    metadata: WireMetadata,
}

#[derive(Serialize)]
struct PathArg<'a> {
    path: &'a str,
}

/// Dropbox implementation of [`StorageClient`].
#[derive(Clone)]
pub struct DropboxClient {
    http: reqwest::Client,
    base_url: String,
    access_token: Arc<str>,
    path_root: Option<NamespaceId>,
}

impl DropboxClient {
    /// Creates a client for an already-acquired access token.
    pub fn new(settings: &StorageSettings, access_token: impl Into<String>) -> ClientResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .user_agent(settings.user_agent.clone())
            .build()
            .map_err(|e| ClientError::Network(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            base_url: settings.api_base_url.trim_end_matches('/').to_string(),
            access_token: Arc::from(access_token.into()),
            path_root: None,
        })
    }

    /// Namespace this client is scoped to, if any.
    pub fn path_root(&self) -> Option<&NamespaceId> {
        self.path_root.as_ref()
    }

    async fn rpc<B, R>(&self, endpoint: &str, body: &B) -> ClientResult<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}/{}", self.base_url, endpoint);
        let mut request = self
            .http
            .post(&url)
            .header(AUTHORIZATION, format!("Bearer {}", self.access_token))
            .json(body);
        if let Some(namespace_id) = &self.path_root {
            let root = json!({ ".tag": "namespace_id", "namespace_id": namespace_id.as_str() });
            request = request.header(PATH_ROOT_HEADER, root.to_string());
        }

        tracing::debug!(endpoint, scoped = self.path_root.is_some(), "storage request");
        let response = request
            .send()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<R>()
                .await
                .map_err(|e| ClientError::Decode(format!("{}: {}", endpoint, e)));
        }

        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = response.text().await.unwrap_or_default();
        let err = classify_failure(status.as_u16(), &body, retry_after);
        tracing::debug!(endpoint, status = status.as_u16(), error = %err, "storage request failed");
        Err(err)
    }
}

#[async_trait]
impl StorageClient for DropboxClient {
    fn is_authenticated(&self) -> bool {
        !self.access_token.trim().is_empty()
    }

    async fn list_folder(&self, path: &str) -> ClientResult<ListPage> {
        let body = json!({
            "path": wire_path(path),
            "recursive": false,
            "include_deleted": false,
        });
        let wire: WireListFolder = self.rpc("files/list_folder", &body).await?;
        Ok(wire.into())
    }

    async fn list_folder_continue(&self, cursor: &str) -> ClientResult<ListPage> {
        let wire: WireListFolder = self
            .rpc("files/list_folder/continue", &json!({ "cursor": cursor }))
            .await?;
        Ok(wire.into())
    }

    async fn get_metadata(&self, path: &str) -> ClientResult<DirectoryEntry> {
        let path = wire_path(path);
        let wire: WireMetadata = self.rpc("files/get_metadata", &PathArg { path: &path }).await?;
        wire.into_entry()
            .ok_or_else(|| ClientError::NotFound(format!("{} is deleted", path)))
    }

    async fn list_shared_folders(&self) -> ClientResult<Vec<SharedFolder>> {
        let mut page: WireSharedFolders = self
            .rpc("sharing/list_folders", &json!({ "limit": 1000 }))
            .await?;
        let mut folders = Vec::new();
        loop {
            folders.extend(
                page.entries
                    .into_iter()
                    .map(|f| SharedFolder::new(f.name, f.shared_folder_id)),
            );
            match page.cursor {
                Some(cursor) if !cursor.is_empty() => {
                    page = self
                        .rpc("sharing/list_folders/continue", &json!({ "cursor": cursor }))
                        .await?;
                }
                _ => break,
            }
        }
        Ok(folders)
    }

    async fn list_shared_links(
        &self,
        path: &str,
        direct_only: bool,
    ) -> ClientResult<Vec<ShareLink>> {
        let body = json!({ "path": wire_path(path), "direct_only": direct_only });
        let wire: WireLinks = self.rpc("sharing/list_shared_links", &body).await?;
        Ok(wire.links.into_iter().map(ShareLink::from).collect())
    }

    async fn create_shared_link(&self, path: &str, is_public: bool) -> ClientResult<ShareLink> {
        let visibility = if is_public { "public" } else { "team_only" };
        let body = json!({
            "path": wire_path(path),
            "settings": { "requested_visibility": visibility },
        });
        let wire: WireLink = self
            .rpc("sharing/create_shared_link_with_settings", &body)
            .await?;
        Ok(wire.into())
    }

    async fn create_folder(&self, path: &str) -> ClientResult<DirectoryEntry> {
        let body = json!({ "path": wire_path(path), "autorename": false });
        let wire: WireCreateFolder = self.rpc("files/create_folder_v2", &body).await?;
        wire.metadata
            .into_entry()
            .ok_or_else(|| {
                ClientError::Decode("create_folder_v2 returned deleted metadata".to_string())
            })
    }

    fn with_namespace(&self, namespace_id: &NamespaceId) -> Arc<dyn StorageClient> {
        Arc::new(Self {
            http: self.http.clone(),
            base_url: self.base_url.clone(),
            access_token: Arc::clone(&self.access_token),
            path_root: Some(namespace_id.clone()),
        })
    }
}
