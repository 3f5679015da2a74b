//! LeaseKit agent layer - lease workflow orchestration.
//!
//! This crate runs the lease workflows on top of
//! [`leasekit_core`]'s directory gateway:
//!
//! - Directory search: locate the lease directory and issue a link
//! - Report detection: check the directory for a completed report
//! - Orchestration: sequence both per lease, over single records or batches
//!
//! # Example
//!
//! ```rust,no_run
//! use leasekit_agent::{ReportCategory, WorkflowOrchestrator};
//! use leasekit_core::{Agency, CloudDirectoryGateway, DropboxClient, LeaseKitConfig, LeaseRecord};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = LeaseKitConfig::from_path("leasekit.yaml")?;
//!     leasekit_core::logging::init_logging(&config.logging);
//!
//!     let client = DropboxClient::new(&config.storage, "access-token")?;
//!     let gateway = Arc::new(CloudDirectoryGateway::new(Arc::new(client)));
//!     let orchestrator = WorkflowOrchestrator::new(gateway, &config)?;
//!
//!     let leases = vec![LeaseRecord::new(Agency::Federal, "NMNM0501759")];
//!     let batch = orchestrator.run_batch(leases, ReportCategory::BaseAbstract).await;
//!     for lease in &batch.records {
//!         println!("{} -> {:?}", lease.lease_number, lease.directory_path);
//!     }
//!     Ok(())
//! }
//! ```

pub mod orchestrator;
pub mod workflow;

pub use orchestrator::{
    BatchRun, OrchestrationError, RecordOutcome, ReportCategory, RunOutcome, WorkflowOrchestrator,
};
pub use workflow::{
    CancellationToken, CancellationTokenSource, ExecutionResult, LeaseDirectorySearchWorkflow,
    PreviousReportDetectionWorkflow, ProgressStatus, WorkflowBase, WorkflowConfig, WorkflowError,
    WorkflowExecutor, WorkflowInput, WorkflowRegistry,
};
