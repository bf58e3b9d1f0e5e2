// ABOUTME: Test support utilities.
// ABOUTME: In-memory fakes for every pipeline collaborator, recording the calls they receive.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Once};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use sagedeploy::config::Config;
use sagedeploy::engine::{
    ApplyError, ApplySummary, ChangeAction, DeploymentOutputs, DeploymentSettings, OutputsError,
    PlanApplyEngine, PlanDiff, PlanError, ResourceChange, ResourceGraph,
};
use sagedeploy::orchestrator::{Collaborators, PipelineOptions};
use sagedeploy::poll::{PollSettings, ProbeError, ResourceStatus, StatusProbe, StatusReport};
use sagedeploy::preflight::{CallerIdentity, CredentialProbe, PreconditionError, ToolResolver};
use sagedeploy::request::DeploymentRequest;
use sagedeploy::stage::{ObjectStore, StoreError};
use sagedeploy::types::{BucketName, RemoteUri, ResourceName};
use sagedeploy::verify::{EndpointInvoker, InvocationPayload, VerifyError};

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::from_default_env()
            .add_directive("sagedeploy=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Shared, ordered record of collaborator calls.
#[derive(Debug, Clone, Default)]
pub struct Calls(Arc<Mutex<Vec<String>>>);

impl Calls {
    pub fn record(&self, call: impl Into<String>) {
        self.0.lock().push(call.into());
    }

    pub fn all(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.0.lock().iter().filter(|c| c.starts_with(prefix)).count()
    }
}

pub struct FakeTools {
    pub missing: Vec<String>,
}

impl ToolResolver for FakeTools {
    fn resolve(&self, tool: &str) -> Option<PathBuf> {
        (!self.missing.iter().any(|m| m == tool)).then(|| PathBuf::from("/usr/bin").join(tool))
    }
}

pub struct FakeCredentials {
    pub calls: Calls,
    pub result: Result<CallerIdentity, PreconditionError>,
}

#[async_trait]
impl CredentialProbe for FakeCredentials {
    async fn caller_identity(&self) -> Result<CallerIdentity, PreconditionError> {
        self.calls.record("credentials");
        self.result.clone()
    }
}

pub fn identity() -> CallerIdentity {
    CallerIdentity {
        account: "123456789012".to_string(),
        arn: "arn:aws:iam::123456789012:user/deployer".to_string(),
        user_id: "AIDAEXAMPLE".to_string(),
    }
}

pub struct FakeStore {
    pub calls: Calls,
    pub existing: bool,
    /// Results handed out per upload attempt; success once exhausted.
    pub uploads: Mutex<VecDeque<Result<(), StoreError>>>,
}

impl FakeStore {
    pub fn new(calls: Calls) -> Self {
        Self {
            calls,
            existing: false,
            uploads: Mutex::new(VecDeque::new()),
        }
    }
}

#[async_trait]
impl ObjectStore for FakeStore {
    async fn exists(&self, uri: &RemoteUri) -> Result<bool, StoreError> {
        self.calls.record(format!("store.exists {uri}"));
        Ok(self.existing)
    }

    async fn upload(&self, path: &Path, uri: &RemoteUri, sha256: &str) -> Result<(), StoreError> {
        assert!(path.exists(), "archive should exist before upload");
        assert_eq!(sha256.len(), 64);
        self.calls.record(format!("store.upload {uri}"));
        self.uploads.lock().pop_front().unwrap_or(Ok(()))
    }
}

pub struct FakeEngine {
    pub calls: Calls,
    pub diff: PlanDiff,
    pub plan_error: Mutex<Option<PlanError>>,
    pub apply_result: Mutex<Option<Result<ApplySummary, ApplyError>>>,
    pub outputs: Option<DeploymentOutputs>,
    pub last_settings: Arc<Mutex<Option<DeploymentSettings>>>,
}

impl FakeEngine {
    pub fn new(calls: Calls) -> Self {
        Self {
            calls,
            diff: creates_endpoint(),
            plan_error: Mutex::new(None),
            apply_result: Mutex::new(None),
            outputs: Some(DeploymentOutputs::new(
                [
                    ("endpoint_name".to_string(), "n1-endpoint".to_string()),
                    ("model_name".to_string(), "n1".to_string()),
                ]
                .into(),
            )),
            last_settings: Arc::new(Mutex::new(None)),
        }
    }
}

#[async_trait]
impl PlanApplyEngine for FakeEngine {
    async fn plan(&self, graph: &ResourceGraph) -> Result<PlanDiff, PlanError> {
        self.calls.record("engine.plan");
        *self.last_settings.lock() = Some(graph.settings.clone());
        match self.plan_error.lock().take() {
            Some(err) => Err(err),
            None => Ok(self.diff.clone()),
        }
    }

    async fn apply(&self, diff: &PlanDiff) -> Result<ApplySummary, ApplyError> {
        self.calls.record("engine.apply");
        self.apply_result.lock().take().unwrap_or_else(|| {
            let summary = diff.summary();
            Ok(ApplySummary {
                resources_created: summary.to_create,
                resources_updated: summary.to_update,
                resources_destroyed: summary.to_destroy,
            })
        })
    }

    async fn outputs(&self) -> Result<DeploymentOutputs, OutputsError> {
        self.calls.record("engine.outputs");
        self.outputs
            .clone()
            .ok_or_else(|| OutputsError::Engine("no state".to_string()))
    }
}

/// Model, endpoint config and endpoint all created.
pub fn creates_endpoint() -> PlanDiff {
    PlanDiff {
        changes: [
            "aws_sagemaker_model.this",
            "aws_sagemaker_endpoint_configuration.this",
            "aws_sagemaker_endpoint.this",
        ]
        .into_iter()
        .map(|address| ResourceChange {
            address: address.to_string(),
            action: ChangeAction::Create,
        })
        .collect(),
        plan_file: None,
    }
}

pub struct FakeProbe {
    pub calls: Calls,
    /// Reported in order; the last one repeats.
    pub statuses: Mutex<VecDeque<Result<StatusReport, ProbeError>>>,
}

impl FakeProbe {
    pub fn reporting(calls: Calls, statuses: &[ResourceStatus]) -> Self {
        Self {
            calls,
            statuses: Mutex::new(statuses.iter().map(|s| Ok((*s).into())).collect()),
        }
    }
}

#[async_trait]
impl StatusProbe for FakeProbe {
    async fn describe_status(&self, resource_id: &str) -> Result<StatusReport, ProbeError> {
        self.calls.record(format!("probe {resource_id}"));
        let mut statuses = self.statuses.lock();
        if statuses.len() > 1 {
            statuses.pop_front().unwrap_or_else(|| Ok(ResourceStatus::Pending.into()))
        } else {
            statuses
                .front()
                .map(|s| match s {
                    Ok(report) => Ok(report.clone()),
                    Err(e) => Err(ProbeError(e.0.clone())),
                })
                .unwrap_or_else(|| Ok(ResourceStatus::Pending.into()))
        }
    }
}

/// Reports one status and cancels the run while answering, as a Ctrl-C
/// arriving mid-poll would.
pub struct CancellingProbe {
    pub calls: Calls,
    pub status: ResourceStatus,
    pub cancel: CancellationToken,
}

#[async_trait]
impl StatusProbe for CancellingProbe {
    async fn describe_status(&self, resource_id: &str) -> Result<StatusReport, ProbeError> {
        self.calls.record(format!("probe {resource_id}"));
        self.cancel.cancel();
        Ok(self.status.into())
    }
}

pub struct FakeInvoker {
    pub calls: Calls,
    pub result: Result<Vec<u8>, VerifyError>,
}

#[async_trait]
impl EndpointInvoker for FakeInvoker {
    async fn invoke(
        &self,
        endpoint: &str,
        _payload: &InvocationPayload,
    ) -> Result<Vec<u8>, VerifyError> {
        self.calls.record(format!("invoke {endpoint}"));
        self.result.clone()
    }
}

/// A full set of fakes that succeed, sharing one call record.
pub struct Fakes {
    pub calls: Calls,
    pub tools: FakeTools,
    pub credentials: FakeCredentials,
    pub store: FakeStore,
    pub engine: FakeEngine,
    pub probe: FakeProbe,
    pub invoker: FakeInvoker,
}

impl Default for Fakes {
    fn default() -> Self {
        let calls = Calls::default();
        Self {
            tools: FakeTools {
                missing: Vec::new(),
            },
            credentials: FakeCredentials {
                calls: calls.clone(),
                result: Ok(identity()),
            },
            store: FakeStore::new(calls.clone()),
            engine: FakeEngine::new(calls.clone()),
            probe: FakeProbe::reporting(
                calls.clone(),
                &[ResourceStatus::Creating, ResourceStatus::InService],
            ),
            invoker: FakeInvoker {
                calls: calls.clone(),
                result: Ok(b"{\"predictions\": [0]}".to_vec()),
            },
            calls,
        }
    }
}

impl Fakes {
    pub fn into_collaborators(self) -> Collaborators {
        Collaborators {
            tools: Box::new(self.tools),
            credentials: Box::new(self.credentials),
            store: Box::new(self.store),
            engine: Box::new(self.engine),
            probe: Box::new(self.probe),
            invoker: Box::new(self.invoker),
        }
    }
}

/// A model directory with a single weights file.
pub fn model_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("model.pkl"), b"weights").unwrap();
    dir
}

pub fn request(source: &Path) -> DeploymentRequest {
    DeploymentRequest::new(
        source,
        BucketName::new("b1-models").unwrap(),
        ResourceName::new("n1").unwrap(),
    )
}

/// Options with short poll timings, writing archives to `output_dir`.
pub fn options(output_dir: &Path) -> PipelineOptions {
    let mut options = PipelineOptions::from_config(&Config::default()).unwrap();
    options.output_dir = output_dir.to_path_buf();
    options.terraform_dir = output_dir.join("terraform");
    options.poll = PollSettings {
        interval: Duration::from_secs(5),
        timeout: Duration::from_secs(60),
        jitter: Duration::ZERO,
        max_probe_errors: 3,
    };
    options
}
