//! Lease workflows and the machinery that runs them.
//!
//! Two workflows enrich a [`LeaseRecord`](leasekit_core::LeaseRecord):
//!
//! - [`LeaseDirectorySearchWorkflow`] finds the lease directory and a
//!   shareable link for it.
//! - [`PreviousReportDetectionWorkflow`] checks that directory for a
//!   completed report.
//!
//! Both implement [`WorkflowBase`] and are run by [`WorkflowExecutor`],
//! which wraps every outcome in an [`ExecutionResult`].

pub mod cancellation;
pub mod directory_search;
pub mod executor;
pub mod registry;
pub mod report_detection;
pub mod task;

pub use cancellation::{CancellationToken, CancellationTokenSource};
pub use directory_search::{
    DirectorySearchOutput, LeaseDirectorySearchWorkflow, DIRECTORY_SEARCH_WORKFLOW,
};
pub use executor::{ExecutionResult, ProgressObserver, ProgressStatus, WorkflowExecutor};
pub use registry::{RegistryError, WorkflowConstructor, WorkflowRegistry};
pub use report_detection::{
    PreviousReportDetectionWorkflow, ReportDetectionOutput, ReportPattern,
    REPORT_DETECTION_WORKFLOW,
};
pub use task::{WorkflowBase, WorkflowConfig, WorkflowError, WorkflowIdentity, WorkflowInput};

use leasekit_core::AgencyPaths;
use std::any::Any;

/// Registers both lease workflows.
///
/// The directory search constructor captures `agencies`; the report
/// detection constructor reads its phrase from the per-instance config.
pub fn register_lease_workflows(
    registry: &mut WorkflowRegistry,
    agencies: AgencyPaths,
) -> Result<(), RegistryError> {
    registry.register(DIRECTORY_SEARCH_WORKFLOW, move |config| {
        let workflow = LeaseDirectorySearchWorkflow::new(agencies.clone(), config)?;
        Ok(Box::new(workflow) as Box<dyn WorkflowBase>)
    })?;
    registry.register(REPORT_DETECTION_WORKFLOW, |config| {
        let workflow = PreviousReportDetectionWorkflow::new(config)?;
        Ok(Box::new(workflow) as Box<dyn WorkflowBase>)
    })?;
    Ok(())
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
