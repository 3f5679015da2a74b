//! End-to-end tests for lease processing against the in-memory client.

use async_trait::async_trait;
use leasekit_agent::{
    PreviousReportDetectionWorkflow, ProgressStatus, ReportCategory, RunOutcome, WorkflowConfig,
    WorkflowInput, WorkflowOrchestrator,
};
use leasekit_core::client::ClientResult;
use leasekit_core::memory::Operation;
use leasekit_core::types::ListPage;
use leasekit_core::{
    Agency, AgencyPaths, CloudDirectoryGateway, DirectoryEntry, ErrorKind, InMemoryStorageClient,
    LeaseKitConfig, LeaseRecord, NamespaceId, ReportStatus, ShareLink, SharedFolder, StorageClient,
};
use std::sync::{Arc, Mutex};

/// Delegates to another client but panics on metadata lookups whose path
/// ends with `poison`.
struct PanickingClient {
    inner: Arc<dyn StorageClient>,
    poison: String,
}

#[async_trait]
impl StorageClient for PanickingClient {
    fn is_authenticated(&self) -> bool {
        self.inner.is_authenticated()
    }

    async fn list_folder(&self, path: &str) -> ClientResult<ListPage> {
        self.inner.list_folder(path).await
    }

    async fn list_folder_continue(&self, cursor: &str) -> ClientResult<ListPage> {
        self.inner.list_folder_continue(cursor).await
    }

    async fn get_metadata(&self, path: &str) -> ClientResult<DirectoryEntry> {
        if path.ends_with(&self.poison) {
            panic!("metadata lookup exploded for {}", path);
        }
        self.inner.get_metadata(path).await
    }

    async fn list_shared_folders(&self) -> ClientResult<Vec<SharedFolder>> {
        self.inner.list_shared_folders().await
    }

    async fn list_shared_links(
        &self,
        path: &str,
        direct_only: bool,
    ) -> ClientResult<Vec<ShareLink>> {
        self.inner.list_shared_links(path, direct_only).await
    }

    async fn create_shared_link(&self, path: &str, is_public: bool) -> ClientResult<ShareLink> {
        self.inner.create_shared_link(path, is_public).await
    }

    async fn create_folder(&self, path: &str) -> ClientResult<DirectoryEntry> {
        self.inner.create_folder(path).await
    }

    fn with_namespace(&self, namespace_id: &NamespaceId) -> Arc<dyn StorageClient> {
        Arc::new(PanickingClient {
            inner: self.inner.with_namespace(namespace_id),
            poison: self.poison.clone(),
        })
    }
}

fn populated_client() -> InMemoryStorageClient {
    let client = InMemoryStorageClient::new();
    client.add_workspace("Federal Workspace", "ns:fed");
    client.add_workspace("State Workspace", "ns:state");

    client.add_folder("/Federal Workspace/NMNM0501759");
    client.add_file("/Federal Workspace/NMNM0501759/NMNM0501759 Master Documents.pdf", 4096);
    client.add_file("/Federal Workspace/NMNM0501759/lease.pdf", 2048);

    client.add_folder("/Federal Workspace/NMNM0000002");
    client.add_file("/Federal Workspace/NMNM0000002/master-documents.pdf", 10);

    client.add_folder("/State Workspace/VB-1234");
    client.add_file("/State Workspace/VB-1234/2019 MASTER DOCUMENTS v2.docx", 10);
    client
}

fn orchestrator_for(client: Arc<dyn StorageClient>) -> WorkflowOrchestrator {
    let gateway = Arc::new(CloudDirectoryGateway::new(client));
    WorkflowOrchestrator::new(gateway, &LeaseKitConfig::default()).unwrap()
}

#[tokio::test]
async fn test_missing_directory_leaves_record_unpopulated() {
    let client = populated_client();
    let orchestrator = orchestrator_for(Arc::new(client.clone()));
    let mut lease = LeaseRecord::new(Agency::Federal, "NOTFOUND");

    let outcome = orchestrator.run(&mut lease, ReportCategory::BaseAbstract).await.unwrap();

    let RunOutcome::Completed { search, detection } = outcome else {
        panic!("expected completed outcome");
    };
    assert!(search.success);
    assert!(search.data_field("shareableLink").unwrap().is_null());
    assert!(search.data_field("directoryPath").unwrap().is_null());
    assert!(detection.is_none());
    assert!(lease.directory_path.is_none());
    assert!(lease.shareable_link.is_none());
    assert_eq!(lease.previous_report_found, ReportStatus::Unknown);
    assert_eq!(client.call_count(Operation::CreateSharedLink), 0);

    let detection = PreviousReportDetectionWorkflow::new(WorkflowConfig::new()).unwrap();
    let mut input = WorkflowInput::new()
        .with_lease(&mut lease)
        .with_gateway(Arc::clone(orchestrator.gateway()));
    let result = orchestrator.executor().execute(&detection, &mut input).await;
    drop(input);

    assert!(!result.success);
    assert_eq!(result.error_type, Some(ErrorKind::ValidationError));
    assert!(result.error.unwrap().contains("no directory path"));
    assert_eq!(lease.previous_report_found, ReportStatus::Unknown);
    assert_eq!(client.call_count(Operation::ListFolder), 0);
}

#[tokio::test]
async fn test_report_phrase_matching_end_to_end() {
    let orchestrator = orchestrator_for(Arc::new(populated_client()));
    let leases = vec![
        LeaseRecord::new(Agency::Federal, "NMNM0501759"),
        LeaseRecord::new(Agency::Federal, "NMNM0000002"),
        LeaseRecord::new(Agency::State, " VB-1234 "),
    ];

    let batch = orchestrator.run_batch(leases, ReportCategory::BaseAbstract).await;

    assert_eq!(batch.failure_count(), 0);
    assert_eq!(batch.records[0].previous_report_found, ReportStatus::Found);
    assert_eq!(batch.records[1].previous_report_found, ReportStatus::NotFound);
    assert_eq!(batch.records[2].previous_report_found, ReportStatus::Found);
    assert_eq!(batch.records[2].directory_path.as_deref(), Some("/State Workspace/VB-1234"));
}

#[tokio::test]
async fn test_batch_survives_a_panicking_record() {
    let inner: Arc<dyn StorageClient> = Arc::new(populated_client());
    let client = PanickingClient {
        inner,
        poison: "NMNM0000002".to_string(),
    };
    let orchestrator = orchestrator_for(Arc::new(client));
    let leases = vec![
        LeaseRecord::new(Agency::Federal, "NMNM0501759"),
        LeaseRecord::new(Agency::Federal, "NMNM0000002"),
        LeaseRecord::new(Agency::State, "VB-1234"),
    ];

    let batch = orchestrator.run_batch(leases, ReportCategory::BaseAbstract).await;

    assert_eq!(batch.records.len(), 3);
    assert_eq!(batch.outcomes.len(), 3);
    assert_eq!(batch.failure_count(), 1);

    match &batch.outcomes[1].outcome {
        Ok(RunOutcome::Completed { search, detection }) => {
            assert!(!search.success);
            assert_eq!(search.error_type, Some(ErrorKind::UnknownError));
            assert!(detection.is_none());
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert!(batch.records[1].directory_path.is_none());
    assert_eq!(batch.records[0].previous_report_found, ReportStatus::Found);
    assert_eq!(batch.records[2].previous_report_found, ReportStatus::Found);
}

#[tokio::test]
async fn test_each_execution_gets_its_own_envelope() {
    let orchestrator = orchestrator_for(Arc::new(populated_client()));
    let mut first = LeaseRecord::new(Agency::Federal, "NMNM0501759");
    let mut second = LeaseRecord::new(Agency::Federal, "NMNM0501759");

    let a = orchestrator.run(&mut first, ReportCategory::BaseAbstract).await.unwrap();
    let b = orchestrator.run(&mut second, ReportCategory::BaseAbstract).await.unwrap();

    let (RunOutcome::Completed { search: a, .. }, RunOutcome::Completed { search: b, .. }) = (a, b)
    else {
        panic!("expected completed outcomes");
    };
    assert!(a.execution_time_seconds >= 0.0);
    assert!(b.execution_time_seconds >= 0.0);
    assert_ne!(a.workflow_id, b.workflow_id);
    assert_eq!(a.workflow_type, b.workflow_type);
}

#[tokio::test]
async fn test_existing_link_is_reused() {
    let client = populated_client();
    client.add_link(
        "/Federal Workspace/NMNM0501759",
        "https://storage.test/s/existing/NMNM0501759",
        true,
    );
    let orchestrator = orchestrator_for(Arc::new(client.clone()));

    for _ in 0..2 {
        let mut lease = LeaseRecord::new(Agency::Federal, "NMNM0501759");
        orchestrator.run(&mut lease, ReportCategory::BaseAbstract).await.unwrap();
        assert_eq!(
            lease.shareable_link.as_deref(),
            Some("https://storage.test/s/existing/NMNM0501759")
        );
    }
    assert_eq!(client.call_count(Operation::CreateSharedLink), 0);
    assert_eq!(client.link_count("/Federal Workspace/NMNM0501759"), 1);
}

#[tokio::test]
async fn test_non_workspace_base_path_uses_default_client() {
    let client = InMemoryStorageClient::new();
    client.add_workspace("Federal Workspace", "ns:fed");
    client.add_folder("/Archive/State/VB-0042");
    client.add_file("/Archive/State/VB-0042/Master Documents.pdf", 1);

    let mut config = LeaseKitConfig::default();
    config.agencies = AgencyPaths::default().with(Agency::State, "/Archive/State");
    let gateway = Arc::new(CloudDirectoryGateway::new(Arc::new(client)));
    let orchestrator = WorkflowOrchestrator::new(gateway, &config).unwrap();

    let mut lease = LeaseRecord::new(Agency::State, "VB-0042");
    let outcome = orchestrator.run(&mut lease, ReportCategory::BaseAbstract).await.unwrap();

    assert!(outcome.succeeded());
    assert_eq!(lease.directory_path.as_deref(), Some("/Archive/State/VB-0042"));
    assert_eq!(lease.previous_report_found, ReportStatus::Found);
}

#[tokio::test]
async fn test_observer_failures_do_not_affect_processing() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let orchestrator = orchestrator_for(Arc::new(populated_client()))
        .with_observer(|_, status| {
            if status == ProgressStatus::Completed {
                panic!("observer blew up");
            }
            Ok(())
        })
        .with_observer(move |workflow_id, status| {
            sink.lock().unwrap().push((workflow_id.to_string(), status));
            Ok(())
        });

    let mut lease = LeaseRecord::new(Agency::Federal, "NMNM0501759");
    let outcome = orchestrator.run(&mut lease, ReportCategory::BaseAbstract).await.unwrap();

    assert!(outcome.succeeded());
    assert_eq!(lease.previous_report_found, ReportStatus::Found);

    let seen = seen.lock().unwrap();
    let statuses: Vec<ProgressStatus> = seen.iter().map(|(_, status)| *status).collect();
    assert_eq!(
        statuses,
        vec![
            ProgressStatus::Started,
            ProgressStatus::Completed,
            ProgressStatus::Started,
            ProgressStatus::Completed,
        ]
    );
    assert_eq!(seen[0].0, seen[1].0);
    assert_ne!(seen[0].0, seen[2].0);
}

#[tokio::test]
async fn test_unauthenticated_session_fails_validation() {
    let client = populated_client();
    client.set_authenticated(false);
    let orchestrator = orchestrator_for(Arc::new(client.clone()));
    let mut lease = LeaseRecord::new(Agency::Federal, "NMNM0501759");

    let outcome = orchestrator.run(&mut lease, ReportCategory::BaseAbstract).await.unwrap();

    let RunOutcome::Completed { search, detection } = outcome else {
        panic!("expected completed outcome");
    };
    assert_eq!(search.error_type, Some(ErrorKind::ValidationError));
    assert!(detection.is_none());
    assert_eq!(client.call_count(Operation::GetMetadata), 0);
}
