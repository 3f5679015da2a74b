//! Workflow executor with progress observers.
//!
//! Runs one workflow at a time through a fixed sequence: notify started,
//! validate, execute, build the envelope, notify completed or failed.
//! Whatever happens inside the workflow, the caller gets an
//! [`ExecutionResult`]; errors and panics never escape.

use crate::workflow::cancellation::CancellationToken;
use crate::workflow::registry::{RegistryError, WorkflowRegistry};
use crate::workflow::panic_message;
use crate::workflow::task::{
    WorkflowBase, WorkflowConfig, WorkflowError, WorkflowIdentity, WorkflowInput,
};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use leasekit_core::ErrorKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Uniform envelope for one workflow execution.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    /// Whether the workflow completed without error
    pub success: bool,
    pub workflow_id: String,
    pub workflow_type: String,
    /// Workflow output (success only)
    pub data: Option<Value>,
    /// Error message (failure only)
    pub error: Option<String>,
    /// Error classification (failure only)
    pub error_type: Option<ErrorKind>,
    /// Stage that failed
    pub context: Option<String>,
    /// Wall-clock duration of the whole execution
    pub execution_time_seconds: f64,
    /// When the envelope was finalized
    pub timestamp: DateTime<Utc>,
}

impl ExecutionResult {
    /// Creates a successful envelope.
    pub fn success(identity: &WorkflowIdentity, data: Value) -> Self {
        Self {
            success: true,
            workflow_id: identity.workflow_id().to_string(),
            workflow_type: identity.workflow_type().to_string(),
            data: Some(data),
            error: None,
            error_type: None,
            context: None,
            execution_time_seconds: 0.0,
            timestamp: Utc::now(),
        }
    }

    /// Creates a failed envelope.
    pub fn failure(
        identity: &WorkflowIdentity,
        error: impl Into<String>,
        error_type: ErrorKind,
        context: Option<&str>,
    ) -> Self {
        Self {
            success: false,
            workflow_id: identity.workflow_id().to_string(),
            workflow_type: identity.workflow_type().to_string(),
            data: None,
            error: Some(error.into()),
            error_type: Some(error_type),
            context: context.map(str::to_string),
            execution_time_seconds: 0.0,
            timestamp: Utc::now(),
        }
    }

    /// Stamps elapsed time and finalization time.
    pub fn with_timing(mut self, elapsed: Duration) -> Self {
        self.execution_time_seconds = elapsed.as_secs_f64();
        self.timestamp = Utc::now();
        self
    }

    /// Field of the data payload, if any.
    pub fn data_field(&self, key: &str) -> Option<&Value> {
        self.data.as_ref().and_then(|data| data.get(key))
    }
}

/// Lifecycle event reported to observers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    Started,
    Completed,
    Failed,
}

impl fmt::Display for ProgressStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgressStatus::Started => write!(f, "started"),
            ProgressStatus::Completed => write!(f, "completed"),
            ProgressStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Callback invoked with `(workflow_id, status)`.
///
/// Observers are called synchronously in registration order. A returned
/// error or a panic is logged and ignored.
pub type ProgressObserver = Arc<dyn Fn(&str, ProgressStatus) -> anyhow::Result<()> + Send + Sync>;

/// Runs workflows and reports their lifecycle to observers.
#[derive(Clone, Default)]
pub struct WorkflowExecutor {
    observers: Vec<ProgressObserver>,
    registry: WorkflowRegistry,
}

impl WorkflowExecutor {
    /// Creates an executor with no observers and an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an executor around an existing registry.
    pub fn with_registry(registry: WorkflowRegistry) -> Self {
        Self {
            observers: Vec::new(),
            registry,
        }
    }

    /// Adds a progress observer.
    pub fn add_observer<F>(&mut self, observer: F)
    where
        F: Fn(&str, ProgressStatus) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.observers.push(Arc::new(observer));
    }

    /// Builder form of [`add_observer`](Self::add_observer).
    pub fn with_observer<F>(mut self, observer: F) -> Self
    where
        F: Fn(&str, ProgressStatus) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.add_observer(observer);
        self
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    pub fn registry(&self) -> &WorkflowRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut WorkflowRegistry {
        &mut self.registry
    }

    /// Registers a workflow constructor. See [`WorkflowRegistry::register`].
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
        self.registry.register(workflow_type, constructor)
    }

    /// Creates a registered workflow. See [`WorkflowRegistry::create`].
    pub fn create(
        &self,
        workflow_type: &str,
        config: WorkflowConfig,
    ) -> Result<Box<dyn WorkflowBase>, RegistryError> {
        self.registry.create(workflow_type, config)
    }

    /// Executes a workflow and returns its envelope.
    pub async fn execute(
        &self,
        workflow: &dyn WorkflowBase,
        input: &mut WorkflowInput<'_>,
    ) -> ExecutionResult {
        self.run(workflow, input, None).await
    }

    /// Executes a workflow, abandoning it if `token` is cancelled first.
    ///
    /// A cancelled execution yields a failed envelope with
    /// [`ErrorKind::CancelledError`]. Any lease mutation the workflow made
    /// before the cancellation point is kept.
    pub async fn execute_cancellable(
        &self,
        workflow: &dyn WorkflowBase,
        input: &mut WorkflowInput<'_>,
        token: &CancellationToken,
    ) -> ExecutionResult {
        self.run(workflow, input, Some(token)).await
    }

    async fn run(
        &self,
        workflow: &dyn WorkflowBase,
        input: &mut WorkflowInput<'_>,
        token: Option<&CancellationToken>,
    ) -> ExecutionResult {
        let started = Instant::now();
        let identity = workflow.identity();
        let workflow_id = identity.workflow_id();

        tracing::info!(
            workflow_id = %workflow_id,
            workflow_type = %identity.workflow_type(),
            "Starting workflow {}",
            identity.workflow_name()
        );
        self.notify(workflow_id, ProgressStatus::Started);

        let validation =
            panic::catch_unwind(AssertUnwindSafe(|| workflow.validate_inputs(input)));
        let rejected = match validation {
            Ok(Ok(())) => None,
            Ok(Err(reason)) => {
                tracing::warn!(
                    workflow_id = %workflow_id,
                    reason = %reason,
                    "Workflow input validation failed"
                );
                Some(ExecutionResult::failure(
                    identity,
                    reason,
                    ErrorKind::ValidationError,
                    Some("validation"),
                ))
            }
            Err(payload) => {
                let message = format!(
                    "input validation panicked: {}",
                    panic_message(payload.as_ref())
                );
                tracing::error!(workflow_id = %workflow_id, "{}", message);
                Some(ExecutionResult::failure(
                    identity,
                    message,
                    ErrorKind::UnknownError,
                    Some("validation"),
                ))
            }
        };
        if let Some(result) = rejected {
            let result = result.with_timing(started.elapsed());
            self.notify(workflow_id, ProgressStatus::Failed);
            return result;
        }

        let execution = AssertUnwindSafe(workflow.execute(input)).catch_unwind();
        let outcome = match token {
            Some(token) => tokio::select! {
                biased;
                _ = token.wait_cancelled() => None,
                outcome = execution => Some(outcome),
            },
            None => Some(execution.await),
        };

        let (result, status) = match outcome {
            None => {
                tracing::warn!(workflow_id = %workflow_id, "Workflow cancelled");
                let result = ExecutionResult::failure(
                    identity,
                    "Workflow execution was cancelled",
                    ErrorKind::CancelledError,
                    Some("execute"),
                );
                (result, ProgressStatus::Failed)
            }
            Some(Ok(Ok(data))) => (
                ExecutionResult::success(identity, data),
                ProgressStatus::Completed,
            ),
            Some(Ok(Err(error))) => {
                (guarded_handle_errors(workflow, &error), ProgressStatus::Failed)
            }
            Some(Err(payload)) => {
                let error = WorkflowError::Other(anyhow::anyhow!(
                    "workflow panicked: {}",
                    panic_message(payload.as_ref())
                ));
                (guarded_handle_errors(workflow, &error), ProgressStatus::Failed)
            }
        };

        let result = result.with_timing(started.elapsed());
        tracing::info!(
            workflow_id = %workflow_id,
            success = result.success,
            elapsed_secs = result.execution_time_seconds,
            "Workflow {}",
            status
        );
        self.notify(workflow_id, status);
        result
    }

    fn notify(&self, workflow_id: &str, status: ProgressStatus) {
        for (index, observer) in self.observers.iter().enumerate() {
            match panic::catch_unwind(AssertUnwindSafe(|| observer(workflow_id, status))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(
                        observer = index,
                        workflow_id,
                        %status,
                        "Progress observer failed: {}",
                        e
                    );
                }
                Err(payload) => {
                    tracing::warn!(
                        observer = index,
                        workflow_id,
                        %status,
                        "Progress observer panicked: {}",
                        panic_message(payload.as_ref())
                    );
                }
            }
        }
    }
}

/// Runs the workflow's `handle_errors`, falling back to a plain failure
/// envelope if it panics.
fn guarded_handle_errors(workflow: &dyn WorkflowBase, error: &WorkflowError) -> ExecutionResult {
    let handled =
        panic::catch_unwind(AssertUnwindSafe(|| workflow.handle_errors(error, "execute")));
    handled.unwrap_or_else(|payload| {
        let identity = workflow.identity();
        tracing::error!(
            workflow_id = %identity.workflow_id(),
            "Error handler panicked: {}",
            panic_message(payload.as_ref())
        );
        ExecutionResult::failure(identity, error.to_string(), error.error_type(), Some("execute"))
    })
}

impl fmt::Debug for WorkflowExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowExecutor")
            .field("observers", &self.observers.len())
            .field("registry", &self.registry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::cancellation::CancellationTokenSource;
    use async_trait::async_trait;
    use leasekit_core::{Agency, LeaseRecord};
    use std::sync::Mutex;

    enum Behavior {
        Succeed,
        Fail,
        Panic,
        Hang,
        RejectInputs,
        PanicInValidate,
        PanicInHandler,
    }

    struct ScriptedWorkflow {
        identity: WorkflowIdentity,
        config: WorkflowConfig,
        behavior: Behavior,
    }

    impl ScriptedWorkflow {
        fn new(behavior: Behavior) -> Self {
            Self {
                identity: WorkflowIdentity::new("scripted", "Scripted"),
                config: WorkflowConfig::new(),
                behavior,
            }
        }
    }

    #[async_trait]
    impl WorkflowBase for ScriptedWorkflow {
        fn identity(&self) -> &WorkflowIdentity {
            &self.identity
        }

        fn config(&self) -> &WorkflowConfig {
            &self.config
        }

        fn validate_inputs(&self, _input: &WorkflowInput<'_>) -> Result<(), String> {
            match self.behavior {
                Behavior::RejectInputs => Err("Lease record is required".to_string()),
                Behavior::PanicInValidate => panic!("validator exploded"),
                _ => Ok(()),
            }
        }

        async fn execute(&self, input: &mut WorkflowInput<'_>) -> Result<Value, WorkflowError> {
            if let Some(lease) = input.lease_mut() {
                lease.shareable_link = Some("https://storage.test/s/touched".to_string());
            }
            match self.behavior {
                Behavior::Succeed => Ok(serde_json::json!({ "ok": true })),
                Behavior::Fail | Behavior::PanicInHandler => {
                    Err(WorkflowError::Configuration("no base path".into()))
                }
                Behavior::Panic => panic!("scripted panic"),
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(Value::Null)
                }
                Behavior::RejectInputs | Behavior::PanicInValidate => {
                    unreachable!("validation rejects first")
                }
            }
        }

        fn handle_errors(&self, error: &WorkflowError, context: &str) -> ExecutionResult {
            if let Behavior::PanicInHandler = self.behavior {
                panic!("handler exploded");
            }
            let message = error.to_string();
            ExecutionResult::failure(&self.identity, message, error.error_type(), Some(context))
        }
    }

    fn recording_executor() -> (WorkflowExecutor, Arc<Mutex<Vec<ProgressStatus>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let executor = WorkflowExecutor::new().with_observer(move |_, status| {
            sink.lock().unwrap().push(status);
            Ok(())
        });
        (executor, events)
    }

    #[tokio::test]
    async fn test_success_envelope() {
        let (executor, events) = recording_executor();
        let workflow = ScriptedWorkflow::new(Behavior::Succeed);
        let mut input = WorkflowInput::new();

        let result = executor.execute(&workflow, &mut input).await;

        assert!(result.success);
        assert_eq!(result.workflow_id, workflow.identity().workflow_id());
        assert_eq!(result.data_field("ok"), Some(&Value::Bool(true)));
        assert!(result.error.is_none());
        assert!(result.execution_time_seconds >= 0.0);
        assert_eq!(
            *events.lock().unwrap(),
            vec![ProgressStatus::Started, ProgressStatus::Completed]
        );
    }

    #[tokio::test]
    async fn test_validation_failure_skips_execute() {
        let (executor, events) = recording_executor();
        let workflow = ScriptedWorkflow::new(Behavior::RejectInputs);
        let mut lease = LeaseRecord::new(Agency::Federal, "NMNM0501759");
        let mut input = WorkflowInput::new().with_lease(&mut lease);

        let result = executor.execute(&workflow, &mut input).await;
        drop(input);

        assert!(!result.success);
        assert_eq!(result.error_type, Some(ErrorKind::ValidationError));
        assert_eq!(result.error.as_deref(), Some("Lease record is required"));
        assert!(lease.shareable_link.is_none());
        assert_eq!(
            *events.lock().unwrap(),
            vec![ProgressStatus::Started, ProgressStatus::Failed]
        );
    }

    #[tokio::test]
    async fn test_error_becomes_envelope() {
        let executor = WorkflowExecutor::new();
        let workflow = ScriptedWorkflow::new(Behavior::Fail);
        let result = executor.execute(&workflow, &mut WorkflowInput::new()).await;

        assert!(!result.success);
        assert_eq!(result.error_type, Some(ErrorKind::ConfigurationError));
        assert_eq!(result.context.as_deref(), Some("execute"));
    }

    #[tokio::test]
    async fn test_panic_becomes_envelope() {
        let executor = WorkflowExecutor::new();
        let workflow = ScriptedWorkflow::new(Behavior::Panic);
        let result = executor.execute(&workflow, &mut WorkflowInput::new()).await;

        assert!(!result.success);
        assert_eq!(result.error_type, Some(ErrorKind::UnknownError));
        assert!(result.error.unwrap().contains("scripted panic"));
    }

    #[tokio::test]
    async fn test_validation_panic_becomes_envelope() {
        let (executor, events) = recording_executor();
        let workflow = ScriptedWorkflow::new(Behavior::PanicInValidate);
        let mut lease = LeaseRecord::new(Agency::Federal, "NMNM0501759");
        let mut input = WorkflowInput::new().with_lease(&mut lease);

        let result = executor.execute(&workflow, &mut input).await;
        drop(input);

        assert!(!result.success);
        assert_eq!(result.error_type, Some(ErrorKind::UnknownError));
        assert_eq!(result.context.as_deref(), Some("validation"));
        assert!(result.error.unwrap().contains("validator exploded"));
        assert!(lease.shareable_link.is_none());
        assert_eq!(
            *events.lock().unwrap(),
            vec![ProgressStatus::Started, ProgressStatus::Failed]
        );
    }

    #[tokio::test]
    async fn test_error_handler_panic_falls_back_to_plain_failure() {
        let (executor, events) = recording_executor();
        let workflow = ScriptedWorkflow::new(Behavior::PanicInHandler);
        let result = executor.execute(&workflow, &mut WorkflowInput::new()).await;

        assert!(!result.success);
        assert_eq!(result.error_type, Some(ErrorKind::ConfigurationError));
        assert_eq!(result.context.as_deref(), Some("execute"));
        assert!(result.error.unwrap().contains("no base path"));
        assert_eq!(
            *events.lock().unwrap(),
            vec![ProgressStatus::Started, ProgressStatus::Failed]
        );
    }

    #[tokio::test]
    async fn test_misbehaving_observers_are_isolated() {
        let calls = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&calls);
        let executor = WorkflowExecutor::new()
            .with_observer(|_, _| panic!("observer panic"))
            .with_observer(|_, _| Err(anyhow::anyhow!("observer error")))
            .with_observer(move |_, _| {
                *counter.lock().unwrap() += 1;
                Ok(())
            });

        let workflow = ScriptedWorkflow::new(Behavior::Succeed);
        let result = executor.execute(&workflow, &mut WorkflowInput::new()).await;

        assert!(result.success);
        assert_eq!(*calls.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_cancellation() {
        let (executor, events) = recording_executor();
        let workflow = ScriptedWorkflow::new(Behavior::Hang);
        let source = CancellationTokenSource::new();
        let token = source.token();
        let mut lease = LeaseRecord::new(Agency::State, "VB-1234");
        let mut input = WorkflowInput::new().with_lease(&mut lease);

        let canceller = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            source.cancel();
        };
        let (result, _) = tokio::join!(
            executor.execute_cancellable(&workflow, &mut input, &token),
            canceller
        );
        drop(input);

        assert!(!result.success);
        assert_eq!(result.error_type, Some(ErrorKind::CancelledError));
        assert!(lease.shareable_link.is_some());
        assert_eq!(events.lock().unwrap().last(), Some(&ProgressStatus::Failed));
    }

    #[test]
    fn test_envelope_serializes_camel_case() {
        let identity = WorkflowIdentity::new("scripted", "Scripted");
        let result =
            ExecutionResult::failure(&identity, "boom", ErrorKind::AuthError, Some("execute"))
                .with_timing(Duration::from_millis(5));
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["success"], Value::Bool(false));
        assert_eq!(json["errorType"], "AuthError");
        assert_eq!(json["workflowType"], "scripted");
        assert!(json["executionTimeSeconds"].as_f64().unwrap() >= 0.005);
        assert!(json.get("timestamp").is_some());
    }
}
