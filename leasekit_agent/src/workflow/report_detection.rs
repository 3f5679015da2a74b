//! Previous report detection.
//!
//! Lists a lease directory and checks whether any entry name contains the
//! report phrase (case-insensitive). The first matching entry is enough to
//! mark the lease as already reported.

use crate::workflow::task::{
    WorkflowBase, WorkflowConfig, WorkflowError, WorkflowIdentity, WorkflowInput,
};
use async_trait::async_trait;
use leasekit_core::ReportStatus;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Registration type of [`PreviousReportDetectionWorkflow`].
pub const REPORT_DETECTION_WORKFLOW: &str = "previous_report_detection";

/// Config key holding the report phrase.
pub const REPORT_PATTERN_KEY: &str = "report_pattern";

/// Phrase used when the config has none.
pub const DEFAULT_REPORT_PATTERN: &str = "master documents";

/// Case-insensitive "contains phrase" matcher for entry names.
#[derive(Clone, Debug)]
pub struct ReportPattern {
    phrase: String,
    regex: Regex,
}

impl ReportPattern {
    /// Compiles a matcher for the phrase. Regex metacharacters in the
    /// phrase are matched literally.
    pub fn new(phrase: &str) -> Result<Self, WorkflowError> {
        let phrase = phrase.trim();
        if phrase.is_empty() {
            return Err(WorkflowError::Configuration(
                "Report pattern must not be blank".to_string(),
            ));
        }
        let regex = Regex::new(&format!("(?is)^.*{}", regex::escape(phrase)))
            .map_err(|e| WorkflowError::Configuration(format!("Invalid report pattern: {}", e)))?;
        Ok(Self {
            phrase: phrase.to_string(),
            regex,
        })
    }

    pub fn phrase(&self) -> &str {
        &self.phrase
    }

    pub fn is_match(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }
}

/// Output payload of a report detection run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportDetectionOutput {
    pub directory_path: String,
    pub report_found: bool,
    /// Names of matching entries, in listing order
    pub matching_files: Vec<String>,
    pub total_entries_scanned: usize,
}

/// Decides whether a lease directory already holds a completed report.
pub struct PreviousReportDetectionWorkflow {
    identity: WorkflowIdentity,
    config: WorkflowConfig,
    pattern: ReportPattern,
}

impl PreviousReportDetectionWorkflow {
    /// Creates the workflow, reading the phrase from `report_pattern`.
    pub fn new(config: WorkflowConfig) -> Result<Self, WorkflowError> {
        let phrase = config
            .get_str(REPORT_PATTERN_KEY)
            .unwrap_or(DEFAULT_REPORT_PATTERN);
        let pattern = ReportPattern::new(phrase)?;
        Ok(Self {
            identity: WorkflowIdentity::new(REPORT_DETECTION_WORKFLOW, "Previous Report Detection"),
            config,
            pattern,
        })
    }

    pub fn pattern(&self) -> &ReportPattern {
        &self.pattern
    }
}

#[async_trait]
impl WorkflowBase for PreviousReportDetectionWorkflow {
    fn identity(&self) -> &WorkflowIdentity {
        &self.identity
    }

    fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    fn validate_inputs(&self, input: &WorkflowInput<'_>) -> Result<(), String> {
        let lease = input.lease().ok_or("Lease record is required")?;
        if lease.known_directory().is_none() {
            return Err(format!(
                "Lease {} has no directory path; run the directory search first",
                lease.trimmed_lease_number()
            ));
        }
        let gateway = input.gateway().ok_or("Storage gateway is required")?;
        if !gateway.is_authenticated() {
            return Err("Storage session is not authenticated".to_string());
        }
        Ok(())
    }

    async fn execute(&self, input: &mut WorkflowInput<'_>) -> Result<Value, WorkflowError> {
        let (lease, gateway) = input.parts()?;
        let directory = lease
            .known_directory()
            .ok_or_else(|| {
                WorkflowError::Validation("Lease record has no directory path".to_string())
            })?
            .to_string();

        let entries = match gateway.list_entries(&directory).await {
            Ok(entries) => entries,
            Err(source) => {
                lease.previous_report_found = ReportStatus::Unknown;
                return Err(WorkflowError::DirectoryAccess {
                    path: directory,
                    source,
                });
            }
        };

        let matching_files: Vec<String> = entries
            .iter()
            .filter(|entry| self.pattern.is_match(&entry.name))
            .map(|entry| entry.name.clone())
            .collect();
        let report_found = !matching_files.is_empty();
        lease.previous_report_found = ReportStatus::from(report_found);

        tracing::info!(
            lease = %lease.trimmed_lease_number(),
            path = %directory,
            scanned = entries.len(),
            report_found,
            "Checked lease directory for previous report"
        );

        let output = ReportDetectionOutput {
            directory_path: directory,
            report_found,
            matching_files,
            total_entries_scanned: entries.len(),
        };
        Ok(serde_json::to_value(output)?)
    }
}
