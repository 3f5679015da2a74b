//! Workflow abstraction for lease processing.
//!
//! Defines the contract every lease workflow implements, along with the
//! identity, configuration and input types the executor passes around.
//! A workflow reports failure by returning a [`WorkflowError`]; the
//! executor turns that into an [`ExecutionResult`] envelope.

use crate::workflow::executor::ExecutionResult;
use async_trait::async_trait;
use chrono::Utc;
use leasekit_core::{CloudDirectoryGateway, ErrorKind, GatewayError, LeaseRecord};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Identity of one workflow instance.
///
/// `workflow_id` is generated at construction and is unique per instance,
/// so every execution that uses a freshly created workflow gets its own id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowIdentity {
    workflow_type: String,
    workflow_name: String,
    workflow_id: String,
}

impl WorkflowIdentity {
    /// Creates an identity with a generated id.
    pub fn new(workflow_type: impl Into<String>, workflow_name: impl Into<String>) -> Self {
        let workflow_type = workflow_type.into();
        let workflow_id = Self::generate_id(&workflow_type);
        Self {
            workflow_type,
            workflow_name: workflow_name.into(),
            workflow_id,
        }
    }

    /// Creates an identity with a caller-supplied id. A blank id falls back
    /// to a generated one.
    pub fn with_id(
        workflow_type: impl Into<String>,
        workflow_name: impl Into<String>,
        workflow_id: impl Into<String>,
    ) -> Self {
        let workflow_type = workflow_type.into();
        let workflow_id = workflow_id.into();
        let workflow_id = if workflow_id.trim().is_empty() {
            Self::generate_id(&workflow_type)
        } else {
            workflow_id
        };
        Self {
            workflow_type,
            workflow_name: workflow_name.into(),
            workflow_id,
        }
    }

    /// Generates `<type>_<unix millis>_<8 hex chars>`.
    pub fn generate_id(workflow_type: &str) -> String {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        format!(
            "{}_{}_{}",
            workflow_type,
            Utc::now().timestamp_millis(),
            &suffix[..8]
        )
    }

    /// Stable type tag used for registration.
    pub fn workflow_type(&self) -> &str {
        &self.workflow_type
    }

    /// Human-readable name.
    pub fn workflow_name(&self) -> &str {
        &self.workflow_name
    }

    /// Per-instance identifier.
    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }
}

impl fmt::Display for WorkflowIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.workflow_name, self.workflow_id)
    }
}

/// Free-form key/value settings passed to a workflow constructor.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowConfig(BTreeMap<String, Value>);

impl WorkflowConfig {
    /// Creates an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a setting.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Raw value for a key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Boolean setting, or `default` if absent or not a boolean.
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.get(key).and_then(Value::as_bool).unwrap_or(default)
    }

    /// String setting, if present and a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Inputs for one workflow execution.
///
/// The lease record is borrowed mutably: workflows enrich it in place and
/// the caller sees the changes once execution returns.
#[derive(Default)]
pub struct WorkflowInput<'a> {
    lease: Option<&'a mut LeaseRecord>,
    gateway: Option<Arc<CloudDirectoryGateway>>,
}

impl<'a> WorkflowInput<'a> {
    /// Creates an empty input.
    pub fn new() -> Self {
        Self {
            lease: None,
            gateway: None,
        }
    }

    /// Attaches the lease record to enrich.
    pub fn with_lease(mut self, lease: &'a mut LeaseRecord) -> Self {
        self.lease = Some(lease);
        self
    }

    /// Attaches the storage gateway.
    pub fn with_gateway(mut self, gateway: Arc<CloudDirectoryGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn lease(&self) -> Option<&LeaseRecord> {
        self.lease.as_deref()
    }

    pub fn lease_mut(&mut self) -> Option<&mut LeaseRecord> {
        self.lease.as_deref_mut()
    }

    pub fn gateway(&self) -> Option<&Arc<CloudDirectoryGateway>> {
        self.gateway.as_ref()
    }

    /// Lease record and gateway together, for use inside `execute`.
    ///
    /// Validation normally guarantees both; a missing one is still
    /// reported as a validation error rather than a panic.
    pub fn parts(
        &mut self,
    ) -> Result<(&mut LeaseRecord, Arc<CloudDirectoryGateway>), WorkflowError> {
        let gateway = self
            .gateway
            .clone()
            .ok_or_else(|| WorkflowError::Validation("Storage gateway is required".to_string()))?;
        let lease = self
            .lease
            .as_deref_mut()
            .ok_or_else(|| WorkflowError::Validation("Lease record is required".to_string()))?;
        Ok((lease, gateway))
    }
}

/// Errors a workflow can raise during execution.
#[derive(thiserror::Error, Debug)]
pub enum WorkflowError {
    /// Inputs did not satisfy the workflow's preconditions
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Storage call failed
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// Listing a lease directory failed
    #[error("Failed to access directory {path}: {source}")]
    DirectoryAccess {
        path: String,
        #[source]
        source: GatewayError,
    },

    /// Workflow settings are missing or inconsistent
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Output could not be serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error wrapper
    #[error("Workflow error: {0}")]
    Other(#[from] anyhow::Error),
}

impl WorkflowError {
    /// Envelope classification of this error.
    pub fn error_type(&self) -> ErrorKind {
        match self {
            WorkflowError::Validation(_) => ErrorKind::ValidationError,
            WorkflowError::Gateway(e) => e.kind(),
            WorkflowError::DirectoryAccess { .. } => ErrorKind::DirectoryAccessError,
            WorkflowError::Configuration(_) => ErrorKind::ConfigurationError,
            WorkflowError::Serialization(_) | WorkflowError::Other(_) => ErrorKind::UnknownError,
        }
    }
}

/// Contract for lease workflows.
///
/// Workflows are executed by [`WorkflowExecutor`](crate::workflow::WorkflowExecutor),
/// which calls [`validate_inputs`](Self::validate_inputs) first and only
/// calls [`execute`](Self::execute) if it passes.
#[async_trait]
pub trait WorkflowBase: Send + Sync {
    /// Identity of this instance.
    fn identity(&self) -> &WorkflowIdentity;

    /// Settings the workflow was constructed with.
    fn config(&self) -> &WorkflowConfig;

    /// Checks preconditions without side effects.
    ///
    /// Returns a human-readable reason on failure.
    fn validate_inputs(&self, input: &WorkflowInput<'_>) -> Result<(), String>;

    /// Runs the workflow, mutating the lease record in place.
    async fn execute(&self, input: &mut WorkflowInput<'_>) -> Result<Value, WorkflowError>;

    /// Builds the failure envelope for an execution error.
    ///
    /// Timing is filled in by the executor.
    fn handle_errors(&self, error: &WorkflowError, context: &str) -> ExecutionResult {
        let identity = self.identity();
        tracing::error!(
            workflow_id = %identity.workflow_id(),
            workflow_type = %identity.workflow_type(),
            error_type = %error.error_type(),
            context,
            "Workflow failed: {}",
            error
        );
        ExecutionResult::failure(identity, error.to_string(), error.error_type(), Some(context))
    }
}
