//! Per-lease orchestration of the lease workflows.
//!
//! For each lease the orchestrator runs the directory search and, only if
//! that located a directory, the previous report detection. Batches are
//! processed record by record; one record failing never stops the rest.

use crate::workflow::{
    panic_message, register_lease_workflows, DirectorySearchOutput, ExecutionResult,
    ProgressStatus, RegistryError, WorkflowConfig, WorkflowExecutor, WorkflowInput,
    DIRECTORY_SEARCH_WORKFLOW, REPORT_DETECTION_WORKFLOW,
};
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use leasekit_core::config::ConfigError;
use leasekit_core::{CloudDirectoryGateway, LeaseKitConfig, LeaseRecord};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Kind of report being prepared for a lease.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportCategory {
    /// Runs directory search and previous report detection
    BaseAbstract,
    /// Accepted but not implemented
    FullAbstract,
}

impl ReportCategory {
    pub fn is_supported(&self) -> bool {
        matches!(self, ReportCategory::BaseAbstract)
    }
}

impl fmt::Display for ReportCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportCategory::BaseAbstract => write!(f, "base_abstract"),
            ReportCategory::FullAbstract => write!(f, "full_abstract"),
        }
    }
}

/// Outcome of processing one lease.
#[derive(Clone, Debug)]
pub enum RunOutcome {
    /// Workflows ran; `detection` is `None` when no directory was found
    /// or the search failed.
    Completed {
        search: ExecutionResult,
        detection: Option<ExecutionResult>,
    },
    /// The category has no processing yet; the record was left untouched.
    NotImplemented(ReportCategory),
}

impl RunOutcome {
    /// Whether every workflow that ran succeeded. Vacuously true when
    /// nothing ran.
    pub fn succeeded(&self) -> bool {
        match self {
            RunOutcome::Completed { search, detection } => {
                search.success && detection.as_ref().map_or(true, |d| d.success)
            }
            RunOutcome::NotImplemented(_) => true,
        }
    }
}

/// Errors that stop processing of a single lease.
#[derive(thiserror::Error, Debug)]
pub enum OrchestrationError {
    #[error("Workflow registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// Processing panicked outside the executor
    #[error("Lease processing panicked: {0}")]
    Panicked(String),
}

/// Per-record result of a batch.
#[derive(Debug)]
pub struct RecordOutcome {
    pub lease_number: String,
    pub outcome: Result<RunOutcome, OrchestrationError>,
}

/// Result of a batch: every input record, in input order, plus what
/// happened to each.
#[derive(Debug)]
pub struct BatchRun {
    pub records: Vec<LeaseRecord>,
    pub outcomes: Vec<RecordOutcome>,
}

impl BatchRun {
    /// Number of records that errored or had a failed workflow.
    pub fn failure_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| !matches!(&o.outcome, Ok(outcome) if outcome.succeeded()))
            .count()
    }
}

/// Runs the lease workflows against a shared gateway.
pub struct WorkflowOrchestrator {
    executor: WorkflowExecutor,
    gateway: Arc<CloudDirectoryGateway>,
    search_config: WorkflowConfig,
    detection_config: WorkflowConfig,
}

impl WorkflowOrchestrator {
    /// Creates an orchestrator from validated configuration.
    pub fn new(
        gateway: Arc<CloudDirectoryGateway>,
        config: &LeaseKitConfig,
    ) -> Result<Self, OrchestrationError> {
        config.validate()?;
        let mut executor = WorkflowExecutor::new();
        register_lease_workflows(executor.registry_mut(), config.agencies.clone())?;

        Ok(Self {
            executor,
            gateway,
            search_config: WorkflowConfig::new().with("public_links", config.report.public_links),
            detection_config: WorkflowConfig::new()
                .with("report_pattern", config.report.pattern.clone()),
        })
    }

    /// Adds a progress observer to the underlying executor.
    pub fn with_observer<F>(mut self, observer: F) -> Self
    where
        F: Fn(&str, ProgressStatus) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.executor.add_observer(observer);
        self
    }

    pub fn executor(&self) -> &WorkflowExecutor {
        &self.executor
    }

    pub fn gateway(&self) -> &Arc<CloudDirectoryGateway> {
        &self.gateway
    }

    /// Processes one lease in place.
    pub async fn run(
        &self,
        lease: &mut LeaseRecord,
        category: ReportCategory,
    ) -> Result<RunOutcome, OrchestrationError> {
        if !category.is_supported() {
            tracing::info!(
                lease = %lease.trimmed_lease_number(),
                %category,
                "Report category not implemented"
            );
            return Ok(RunOutcome::NotImplemented(category));
        }

        let search_workflow = self
            .executor
            .create(DIRECTORY_SEARCH_WORKFLOW, self.search_config.clone())?;
        let detection_workflow = self
            .executor
            .create(REPORT_DETECTION_WORKFLOW, self.detection_config.clone())?;

        let mut input = WorkflowInput::new()
            .with_lease(lease)
            .with_gateway(Arc::clone(&self.gateway));

        let search = self.executor.execute(search_workflow.as_ref(), &mut input).await;
        if !directory_found(&search) {
            return Ok(RunOutcome::Completed {
                search,
                detection: None,
            });
        }

        let detection = self.executor.execute(detection_workflow.as_ref(), &mut input).await;
        Ok(RunOutcome::Completed {
            search,
            detection: Some(detection),
        })
    }

    /// Processes leases one after another.
    ///
    /// Every record comes back, in input order, whatever happened to it.
    pub async fn run_batch(
        &self,
        mut leases: Vec<LeaseRecord>,
        category: ReportCategory,
    ) -> BatchRun {
        let mut outcomes = Vec::with_capacity(leases.len());
        for lease in leases.iter_mut() {
            outcomes.push(self.run_guarded(lease, category).await);
        }
        log_batch(&outcomes);
        BatchRun {
            records: leases,
            outcomes,
        }
    }

    /// Processes up to `limit` leases at a time.
    ///
    /// Output order matches input order.
    pub async fn run_batch_concurrent(
        &self,
        leases: Vec<LeaseRecord>,
        category: ReportCategory,
        limit: usize,
    ) -> BatchRun {
        let processed: Vec<(LeaseRecord, RecordOutcome)> = stream::iter(leases)
            .map(|mut lease| async move {
                let outcome = self.run_guarded(&mut lease, category).await;
                (lease, outcome)
            })
            .buffered(limit.max(1))
            .collect()
            .await;

        let (records, outcomes): (Vec<_>, Vec<_>) = processed.into_iter().unzip();
        log_batch(&outcomes);
        BatchRun { records, outcomes }
    }

    async fn run_guarded(
        &self,
        lease: &mut LeaseRecord,
        category: ReportCategory,
    ) -> RecordOutcome {
        let lease_number = lease.lease_number.clone();
        let outcome = AssertUnwindSafe(self.run(lease, category))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| {
                Err(OrchestrationError::Panicked(panic_message(payload.as_ref())))
            });

        if let Err(e) = &outcome {
            tracing::error!(
                lease = %lease_number,
                "Lease processing failed, continuing with batch: {}",
                e
            );
        }
        RecordOutcome { lease_number, outcome }
    }
}

fn directory_found(search: &ExecutionResult) -> bool {
    search.success
        && search
            .data
            .clone()
            .and_then(|data| serde_json::from_value::<DirectorySearchOutput>(data).ok())
            .is_some_and(|output| output.found)
}

fn log_batch(outcomes: &[RecordOutcome]) {
    let failed = outcomes.iter().filter(|o| o.outcome.is_err()).count();
    tracing::info!(total = outcomes.len(), failed, "Batch processed");
}
