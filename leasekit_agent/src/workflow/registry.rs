//! Registry of workflow constructors keyed by workflow type.
//!
//! Each execution creates a fresh workflow instance through the registry,
//! so every run carries its own workflow id.
//!
//! # Example
//!
//! ```ignore
//! use leasekit_agent::workflow::{WorkflowConfig, WorkflowRegistry};
//!
//! let mut registry = WorkflowRegistry::new();
//! registry.register("previous_report_detection", |config| {
//!     Ok(Box::new(PreviousReportDetectionWorkflow::new(config)?))
//! })?;
//!
//! let workflow = registry.create("previous_report_detection", WorkflowConfig::new())?;
//! ```

use crate::workflow::task::{WorkflowBase, WorkflowConfig, WorkflowError};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Builds a workflow instance from its config.
pub type WorkflowConstructor =
    Arc<dyn Fn(WorkflowConfig) -> Result<Box<dyn WorkflowBase>, WorkflowError> + Send + Sync>;

/// Errors that can occur during registry operations.
#[derive(thiserror::Error, Debug)]
pub enum RegistryError {
    /// Type already has a constructor
    #[error("Workflow type already registered: {0}")]
    AlreadyRegistered(String),

    /// Type tag is unusable
    #[error("Invalid workflow type: {0:?}")]
    InvalidType(String),

    /// No constructor for the type
    #[error("Workflow type not registered: {0}")]
    UnknownType(String),

    /// Constructor produced a workflow of a different type
    #[error("Constructor for {registered} produced workflow of type {produced}")]
    ContractMismatch { registered: String, produced: String },

    /// Constructor rejected the config
    #[error("Failed to construct workflow {workflow_type}: {source}")]
    Construction {
        workflow_type: String,
        #[source]
        source: WorkflowError,
    },
}

/// Maps workflow type tags to constructors.
#[derive(Clone, Default)]
pub struct WorkflowRegistry {
    constructors: HashMap<String, WorkflowConstructor>,
}

impl WorkflowRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a constructor for a workflow type.
    ///
    /// # Returns
    ///
    /// - `Ok(())` if registered
    /// - `Err(RegistryError::AlreadyRegistered)` if the type is taken
    /// - `Err(RegistryError::InvalidType)` if the type is blank
    pub fn register<F>(
        &mut self,
        workflow_type: impl Into<String>,
        constructor: F,
    ) -> Result<(), RegistryError>
    where
        F: Fn(WorkflowConfig) -> Result<Box<dyn WorkflowBase>, WorkflowError>
            + Send
            + Sync
            + 'static,
    {
        let workflow_type = workflow_type.into();
        if workflow_type.trim().is_empty() {
            return Err(RegistryError::InvalidType(workflow_type));
        }
        if self.constructors.contains_key(&workflow_type) {
            return Err(RegistryError::AlreadyRegistered(workflow_type));
        }
        tracing::debug!(workflow_type = %workflow_type, "Registered workflow");
        self.constructors.insert(workflow_type, Arc::new(constructor));
        Ok(())
    }

    /// Creates a new instance of a registered workflow type.
    pub fn create(
        &self,
        workflow_type: &str,
        config: WorkflowConfig,
    ) -> Result<Box<dyn WorkflowBase>, RegistryError> {
        let constructor = self
            .constructors
            .get(workflow_type)
            .ok_or_else(|| RegistryError::UnknownType(workflow_type.to_string()))?;

        let workflow = constructor(config).map_err(|source| RegistryError::Construction {
            workflow_type: workflow_type.to_string(),
            source,
        })?;

        let produced = workflow.identity().workflow_type();
        if produced != workflow_type {
            return Err(RegistryError::ContractMismatch {
                registered: workflow_type.to_string(),
                produced: produced.to_string(),
            });
        }
        Ok(workflow)
    }

    /// Whether a type is registered.
    pub fn contains(&self, workflow_type: &str) -> bool {
        self.constructors.contains_key(workflow_type)
    }

    /// Registered types in sorted order.
    pub fn types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    pub fn len(&self) -> usize {
        self.constructors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }
}

impl fmt::Debug for WorkflowRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowRegistry")
            .field("types", &self.types())
            .finish()
    }
}
