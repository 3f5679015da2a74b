//! Lease directory search.
//!
//! Locates `<agency base path>/<lease number>` in storage and, if it is a
//! directory, records its path and a shareable link on the lease record.

use crate::workflow::task::{
    WorkflowBase, WorkflowConfig, WorkflowError, WorkflowIdentity, WorkflowInput,
};
use async_trait::async_trait;
use leasekit_core::{Agency, AgencyPaths, LeaseRecord, PathResolver};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Registration type of [`LeaseDirectorySearchWorkflow`].
pub const DIRECTORY_SEARCH_WORKFLOW: &str = "lease_directory_search";

/// Config key controlling whether new links are public.
pub const PUBLIC_LINKS_KEY: &str = "public_links";

/// Output payload of a directory search.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectorySearchOutput {
    pub lease_number: String,
    pub agency: Agency,
    /// Path that was looked up
    pub searched_path: String,
    pub found: bool,
    pub directory_path: Option<String>,
    pub shareable_link: Option<String>,
    pub message: String,
}

/// Finds a lease's directory and issues a shareable link for it.
pub struct LeaseDirectorySearchWorkflow {
    identity: WorkflowIdentity,
    config: WorkflowConfig,
    agencies: AgencyPaths,
    public_links: bool,
}

impl LeaseDirectorySearchWorkflow {
    /// Creates the workflow.
    ///
    /// Fails if any agency lacks a base path.
    pub fn new(agencies: AgencyPaths, config: WorkflowConfig) -> Result<Self, WorkflowError> {
        agencies
            .ensure_complete()
            .map_err(|e| WorkflowError::Configuration(e.to_string()))?;
        let public_links = config.get_bool(PUBLIC_LINKS_KEY, true);
        Ok(Self {
            identity: WorkflowIdentity::new(DIRECTORY_SEARCH_WORKFLOW, "Lease Directory Search"),
            config,
            agencies,
            public_links,
        })
    }

    /// Expected directory of a lease: agency base path joined with the
    /// trimmed lease number.
    pub fn expected_path(&self, lease: &LeaseRecord) -> Result<String, WorkflowError> {
        let base = self.agencies.base_path(lease.agency).ok_or_else(|| {
            WorkflowError::Configuration(format!(
                "No base path configured for agency {}",
                lease.agency
            ))
        })?;
        Ok(PathResolver::join(&base, lease.trimmed_lease_number()))
    }
}

#[async_trait]
impl WorkflowBase for LeaseDirectorySearchWorkflow {
    fn identity(&self) -> &WorkflowIdentity {
        &self.identity
    }

    fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    fn validate_inputs(&self, input: &WorkflowInput<'_>) -> Result<(), String> {
        let lease = input.lease().ok_or("Lease record is required")?;
        if lease.trimmed_lease_number().is_empty() {
            return Err("Lease number is required".to_string());
        }
        if self.agencies.base_path(lease.agency).is_none() {
            return Err(format!("No base path configured for agency {}", lease.agency));
        }
        let gateway = input.gateway().ok_or("Storage gateway is required")?;
        if !gateway.is_authenticated() {
            return Err("Storage session is not authenticated".to_string());
        }
        Ok(())
    }

    async fn execute(&self, input: &mut WorkflowInput<'_>) -> Result<Value, WorkflowError> {
        let (lease, gateway) = input.parts()?;
        let searched_path = self.expected_path(lease)?;
        let lease_number = lease.trimmed_lease_number().to_string();

        tracing::info!(
            lease = %lease_number,
            agency = %lease.agency,
            path = %searched_path,
            "Searching for lease directory"
        );

        let output = match gateway.search_with_metadata(&searched_path, self.public_links).await? {
            Some(found) => {
                let link = found.link.map(|link| link.url);
                lease.directory_path = Some(found.path.clone());
                if link.is_some() {
                    lease.shareable_link = link.clone();
                }
                tracing::info!(lease = %lease_number, path = %found.path, "Lease directory found");
                DirectorySearchOutput {
                    lease_number: lease_number.clone(),
                    agency: lease.agency,
                    searched_path,
                    found: true,
                    directory_path: Some(found.path),
                    shareable_link: link,
                    message: format!("Directory found for lease {}", lease_number),
                }
            }
            None => {
                tracing::info!(
                    lease = %lease_number,
                    path = %searched_path,
                    "Lease directory not found"
                );
                DirectorySearchOutput {
                    lease_number: lease_number.clone(),
                    agency: lease.agency,
                    message: format!(
                        "Directory not found for lease {} at {}",
                        lease_number, searched_path
                    ),
                    searched_path,
                    found: false,
                    directory_path: None,
                    shareable_link: None,
                }
            }
        };

        Ok(serde_json::to_value(output)?)
    }
}
