//! LeaseKit - Lease directory resolution over shared cloud workspaces.
//!
//! This crate is the storage side of LeaseKit. It turns logical paths such
//! as `/Federal Workspace/NMNM0501759` into the right provider call: team
//! workspaces need a namespace-scoped client and a workspace-relative path,
//! everything else goes through the session's default client.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use leasekit_core::{CloudDirectoryGateway, DropboxClient, LeaseKitConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = LeaseKitConfig::default();
//!     let client = DropboxClient::new(&config.storage, "access-token")?;
//!     let gateway = CloudDirectoryGateway::new(Arc::new(client));
//!
//!     let entries = gateway.list_entries("/Federal Workspace/NMNM0501759").await?;
//!     println!("{} entries", entries.len());
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! - [`path`]: Logical path normalization and splitting
//! - [`namespace`]: Workspace name to namespace id cache
//! - [`client`]: Storage client abstraction
//! - [`dropbox`]: HTTP implementation of the client
//! - [`memory`]: In-memory implementation of the client
//! - [`gateway`]: Workspace-aware directory operations
//! - [`lease`]: Lease records enriched by the workflows
//! - [`config`]: YAML configuration
//! - [`logging`]: Tracing subscriber setup

pub mod error;
pub mod types;

pub mod client;
pub mod config;
pub mod dropbox;
pub mod gateway;
pub mod lease;
pub mod logging;
pub mod memory;
pub mod namespace;
pub mod path;

// Re-export commonly used types
pub use client::StorageClient;
pub use config::{AgencyPaths, LeaseKitConfig};
pub use dropbox::DropboxClient;
pub use error::{ClientError, ErrorKind, GatewayError, Result};
pub use gateway::CloudDirectoryGateway;
pub use lease::{Agency, LeaseRecord, ReportStatus};
pub use memory::InMemoryStorageClient;
pub use namespace::WorkspaceNamespaceCache;
pub use path::PathResolver;
pub use types::{
    CreateOutcome, DirectoryEntry, DirectoryMatch, NamespaceId, ShareLink, SharedFolder,
};
