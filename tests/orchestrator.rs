// ABOUTME: End-to-end pipeline tests against in-memory collaborators.
// ABOUTME: Covers step ordering, early termination, confirmation, and status policy.

mod support;

use sagedeploy::diagnostics::WarningKind;
use sagedeploy::engine::{ApplyError, ApplySummary, PlanDiff, PlanError, ResourceFailure};
use sagedeploy::orchestrator::{ConfirmationPolicy, FailureKind, Orchestrator};
use sagedeploy::outcome::{OverallStatus, StepDetail, StepName, StepStatus};
use sagedeploy::poll::{ProbeError, ResourceStatus};
use sagedeploy::preflight::PreconditionError;
use sagedeploy::stage::StoreError;
use sagedeploy::verify::VerifyError;
use support::{CancellingProbe, Fakes, FakeProbe, init_tracing, model_dir, options, request};
use tokio_util::sync::CancellationToken;

use StepName::*;

#[tokio::test(start_paused = true)]
async fn successful_run_records_six_ordered_steps() {
    init_tracing();
    let model = model_dir();
    let out = tempfile::tempdir().unwrap();
    let fakes = Fakes::default();
    let calls = fakes.calls.clone();

    let report = Orchestrator::new(
        fakes.into_collaborators(),
        options(out.path()),
        ConfirmationPolicy::AutoApprove,
    )
    .run(&request(model.path()), &CancellationToken::new())
    .await;

    assert_eq!(report.status, OverallStatus::Success);
    assert_eq!(
        report.log.steps(),
        vec![Precondition, Stage, Plan, Apply, Poll, Done]
    );
    assert!(
        report
            .log
            .entries()
            .iter()
            .all(|e| e.status == StepStatus::Success)
    );
    assert!(report.failure.is_none());
    assert_eq!(
        report.outputs.as_ref().and_then(|o| o.endpoint_name()),
        Some("n1-endpoint")
    );
    assert_eq!(calls.count("store.upload"), 1);
    assert_eq!(calls.count("engine.apply"), 1);
    assert!(out.path().join("n1.tar.gz").exists());
}

#[tokio::test(start_paused = true)]
async fn credential_failure_stops_before_anything_else() {
    let model = model_dir();
    let out = tempfile::tempdir().unwrap();
    let mut fakes = Fakes::default();
    fakes.credentials.result = Err(PreconditionError::InvalidCredentials(
        "Unable to locate credentials".to_string(),
    ));
    let calls = fakes.calls.clone();

    let report = Orchestrator::new(
        fakes.into_collaborators(),
        options(out.path()),
        ConfirmationPolicy::AutoApprove,
    )
    .run(&request(model.path()), &CancellationToken::new())
    .await;

    assert_eq!(report.status, OverallStatus::Failed);
    assert_eq!(report.log.len(), 1);
    assert_eq!(report.log.entries()[0].step, Precondition);
    assert_eq!(report.log.entries()[0].status, StepStatus::Failed);
    assert_eq!(calls.all(), vec!["credentials".to_string()]);

    let failure = report.failure.unwrap();
    assert_eq!(failure.kind, FailureKind::InvalidCredentials);
    assert!(failure.remedy.contains("aws configure"));
}

#[tokio::test(start_paused = true)]
async fn missing_tools_skip_the_credential_probe() {
    let model = model_dir();
    let out = tempfile::tempdir().unwrap();
    let mut fakes = Fakes::default();
    fakes.tools.missing = vec!["terraform".to_string()];
    let calls = fakes.calls.clone();

    let report = Orchestrator::new(
        fakes.into_collaborators(),
        options(out.path()),
        ConfirmationPolicy::AutoApprove,
    )
    .run(&request(model.path()), &CancellationToken::new())
    .await;

    assert_eq!(report.log.len(), 1);
    assert_eq!(
        report.failure.map(|f| f.kind),
        Some(FailureKind::MissingDependency)
    );
    assert!(calls.all().is_empty());
}

#[tokio::test(start_paused = true)]
async fn poll_timeout_after_apply_is_partial_success() {
    let model = model_dir();
    let out = tempfile::tempdir().unwrap();
    let mut fakes = Fakes::default();
    fakes.probe = FakeProbe::reporting(fakes.calls.clone(), &[ResourceStatus::Creating]);

    let report = Orchestrator::new(
        fakes.into_collaborators(),
        options(out.path()),
        ConfirmationPolicy::AutoApprove,
    )
    .run(&request(model.path()), &CancellationToken::new())
    .await;

    assert_eq!(report.status, OverallStatus::PartialSuccess);
    assert_eq!(report.status.exit_code(), 0);
    assert_eq!(report.log.steps(), vec![Precondition, Stage, Plan, Apply, Poll]);

    let apply = report.log.get(Apply).unwrap();
    assert_eq!(
        apply.detail,
        Some(StepDetail::Apply(ApplySummary {
            resources_created: 3,
            resources_updated: 0,
            resources_destroyed: 0,
        }))
    );

    let poll = report.log.get(Poll).unwrap();
    assert_eq!(poll.status, StepStatus::Failed);
    assert!(matches!(
        poll.detail,
        Some(StepDetail::PollTimeout {
            last_status: ResourceStatus::Creating,
            ..
        })
    ));
    assert_eq!(report.failure.map(|f| f.kind), Some(FailureKind::PollTimeout));
}

#[tokio::test(start_paused = true)]
async fn declined_plan_changes_nothing() {
    let model = model_dir();
    let out = tempfile::tempdir().unwrap();
    let fakes = Fakes::default();
    let calls = fakes.calls.clone();

    let report = Orchestrator::new(
        fakes.into_collaborators(),
        options(out.path()),
        ConfirmationPolicy::Deny,
    )
    .run(&request(model.path()), &CancellationToken::new())
    .await;

    assert_eq!(report.status, OverallStatus::Failed);
    assert_eq!(report.log.steps(), vec![Precondition, Stage, Plan, Apply]);
    assert_eq!(report.log.get(Apply).unwrap().status, StepStatus::Skipped);
    assert_eq!(
        report.failure.map(|f| f.kind),
        Some(FailureKind::ConfirmationDeclined)
    );
    assert_eq!(calls.count("engine.apply"), 0);
    assert_eq!(calls.count("probe"), 0);
}

#[tokio::test(start_paused = true)]
async fn interactive_callback_decides() {
    let model = model_dir();
    let out = tempfile::tempdir().unwrap();

    let report = Orchestrator::new(
        Fakes::default().into_collaborators(),
        options(out.path()),
        ConfirmationPolicy::interactive(|diff| diff.summary().to_create == 3),
    )
    .run(&request(model.path()), &CancellationToken::new())
    .await;

    assert_eq!(report.status, OverallStatus::Success);
}

#[tokio::test(start_paused = true)]
async fn no_changes_skips_confirmation_and_apply() {
    let model = model_dir();
    let out = tempfile::tempdir().unwrap();
    let mut fakes = Fakes::default();
    fakes.engine.diff = PlanDiff::default();
    let calls = fakes.calls.clone();

    // Deny would fail the run if it were consulted.
    let report = Orchestrator::new(
        fakes.into_collaborators(),
        options(out.path()),
        ConfirmationPolicy::Deny,
    )
    .run(&request(model.path()), &CancellationToken::new())
    .await;

    assert_eq!(report.status, OverallStatus::Success);
    assert_eq!(
        report.log.steps(),
        vec![Precondition, Stage, Plan, Apply, Poll, Done]
    );
    assert_eq!(report.log.get(Apply).unwrap().status, StepStatus::Skipped);
    assert_eq!(calls.count("engine.apply"), 0);
}

#[tokio::test(start_paused = true)]
async fn existing_artifact_is_not_uploaded_again() {
    let model = model_dir();
    let out = tempfile::tempdir().unwrap();
    let mut fakes = Fakes::default();
    fakes.store.existing = true;
    let calls = fakes.calls.clone();

    let report = Orchestrator::new(
        fakes.into_collaborators(),
        options(out.path()),
        ConfirmationPolicy::AutoApprove,
    )
    .run(&request(model.path()), &CancellationToken::new())
    .await;

    assert_eq!(report.status, OverallStatus::Success);
    let stage = report.log.get(Stage).unwrap();
    assert_eq!(stage.status, StepStatus::Skipped);
    assert!(matches!(
        &stage.detail,
        Some(StepDetail::Artifact { uri, sha256: None, .. })
            if uri.to_string() == "s3://b1-models/models/n1.tar.gz"
    ));
    assert_eq!(calls.count("store.upload"), 0);
}

#[tokio::test(start_paused = true)]
async fn skip_model_prep_uses_conventional_location() {
    let out = tempfile::tempdir().unwrap();
    let fakes = Fakes::default();
    let calls = fakes.calls.clone();
    let settings = fakes.engine.last_settings.clone();
    let mut options = options(out.path());
    options.skip_model_prep = true;

    // The model directory does not need to exist.
    let report = Orchestrator::new(
        fakes.into_collaborators(),
        options,
        ConfirmationPolicy::AutoApprove,
    )
    .run(
        &request(&out.path().join("absent")),
        &CancellationToken::new(),
    )
    .await;

    assert_eq!(report.status, OverallStatus::Success);
    assert_eq!(report.log.get(Stage).unwrap().status, StepStatus::Skipped);
    assert_eq!(calls.count("store."), 0);
    let settings = settings.lock().clone().unwrap();
    assert_eq!(
        settings.model_data_url.to_string(),
        "s3://b1-models/models/n1.tar.gz"
    );
}

#[tokio::test(start_paused = true)]
async fn extra_config_reaches_the_settings() {
    let model = model_dir();
    let out = tempfile::tempdir().unwrap();
    let fakes = Fakes::default();
    let settings = fakes.engine.last_settings.clone();

    Orchestrator::new(
        fakes.into_collaborators(),
        options(out.path()),
        ConfirmationPolicy::AutoApprove,
    )
    .run(
        &request(model.path()).with_extra_config("LOG_LEVEL", "debug"),
        &CancellationToken::new(),
    )
    .await;

    let settings = settings.lock().clone().unwrap();
    assert_eq!(
        settings.environment_variables.get("LOG_LEVEL").map(String::as_str),
        Some("debug")
    );
    assert_eq!(settings.endpoint_name, "n1-endpoint");
}

#[tokio::test(start_paused = true)]
async fn upload_permission_error_is_fatal() {
    let model = model_dir();
    let out = tempfile::tempdir().unwrap();
    let fakes = Fakes::default();
    fakes
        .store
        .uploads
        .lock()
        .push_back(Err(StoreError::PermissionDenied("AccessDenied".to_string())));
    let calls = fakes.calls.clone();

    let report = Orchestrator::new(
        fakes.into_collaborators(),
        options(out.path()),
        ConfirmationPolicy::AutoApprove,
    )
    .run(&request(model.path()), &CancellationToken::new())
    .await;

    assert_eq!(report.status, OverallStatus::Failed);
    assert_eq!(report.log.steps(), vec![Precondition, Stage]);
    assert_eq!(
        report.failure.map(|f| f.kind),
        Some(FailureKind::PermissionDenied)
    );
    assert_eq!(calls.count("store.upload"), 1);
    assert_eq!(calls.count("engine."), 0);
}

#[tokio::test(start_paused = true)]
async fn state_lock_during_plan_is_drift() {
    let model = model_dir();
    let out = tempfile::tempdir().unwrap();
    let fakes = Fakes::default();
    *fakes.engine.plan_error.lock() = Some(PlanError::DriftDetected {
        lock_id: Some("c0ffee".to_string()),
    });

    let report = Orchestrator::new(
        fakes.into_collaborators(),
        options(out.path()),
        ConfirmationPolicy::AutoApprove,
    )
    .run(&request(model.path()), &CancellationToken::new())
    .await;

    assert_eq!(report.status, OverallStatus::Failed);
    assert_eq!(report.log.steps(), vec![Precondition, Stage, Plan]);
    let failure = report.failure.unwrap();
    assert_eq!(failure.kind, FailureKind::DriftDetected);
    assert!(failure.message.contains("c0ffee"));
}

#[tokio::test(start_paused = true)]
async fn partial_apply_lists_what_changed() {
    let model = model_dir();
    let out = tempfile::tempdir().unwrap();
    let fakes = Fakes::default();
    *fakes.engine.apply_result.lock() = Some(Err(ApplyError::Partial {
        succeeded: vec!["aws_sagemaker_model.this".to_string()],
        failed: vec![ResourceFailure {
            address: "aws_sagemaker_endpoint.this".to_string(),
            message: "ResourceLimitExceeded".to_string(),
        }],
    }));
    let calls = fakes.calls.clone();

    let report = Orchestrator::new(
        fakes.into_collaborators(),
        options(out.path()),
        ConfirmationPolicy::AutoApprove,
    )
    .run(&request(model.path()), &CancellationToken::new())
    .await;

    assert_eq!(report.status, OverallStatus::Failed);
    assert_eq!(report.log.steps(), vec![Precondition, Stage, Plan, Apply]);
    match &report.log.get(Apply).unwrap().detail {
        Some(StepDetail::PartialApply { succeeded, failed }) => {
            assert_eq!(succeeded, &vec!["aws_sagemaker_model.this".to_string()]);
            assert_eq!(failed[0].address, "aws_sagemaker_endpoint.this");
        }
        other => panic!("expected partial apply detail, got {other:?}"),
    }
    let failure = report.failure.unwrap();
    assert_eq!(failure.kind, FailureKind::PartialApply);
    assert!(failure.message.contains("aws_sagemaker_endpoint.this"));
    assert_eq!(calls.count("probe"), 0);
}

#[tokio::test(start_paused = true)]
async fn endpoint_failure_fails_the_run() {
    let model = model_dir();
    let out = tempfile::tempdir().unwrap();
    let mut fakes = Fakes::default();
    fakes.probe = FakeProbe::reporting(
        fakes.calls.clone(),
        &[ResourceStatus::Creating, ResourceStatus::Failed],
    );

    let report = Orchestrator::new(
        fakes.into_collaborators(),
        options(out.path()),
        ConfirmationPolicy::AutoApprove,
    )
    .run(&request(model.path()), &CancellationToken::new())
    .await;

    assert_eq!(report.status, OverallStatus::Failed);
    assert_eq!(
        report.failure.map(|f| f.kind),
        Some(FailureKind::ResourceFailed)
    );
}

#[tokio::test(start_paused = true)]
async fn verification_success_adds_a_step() {
    let model = model_dir();
    let out = tempfile::tempdir().unwrap();
    let fakes = Fakes::default();
    let calls = fakes.calls.clone();
    let mut options = options(out.path());
    options.test_endpoint = true;

    let report = Orchestrator::new(
        fakes.into_collaborators(),
        options,
        ConfirmationPolicy::AutoApprove,
    )
    .run(&request(model.path()), &CancellationToken::new())
    .await;

    assert_eq!(report.status, OverallStatus::Success);
    assert_eq!(
        report.log.steps(),
        vec![Precondition, Stage, Plan, Apply, Poll, Verify, Done]
    );
    assert_eq!(calls.count("invoke n1-endpoint"), 1);
}

#[tokio::test(start_paused = true)]
async fn verification_failure_downgrades_to_partial() {
    let model = model_dir();
    let out = tempfile::tempdir().unwrap();
    let mut fakes = Fakes::default();
    fakes.invoker.result = Err(VerifyError::Invocation {
        endpoint: "n1-endpoint".to_string(),
        message: "ModelError".to_string(),
    });
    let mut options = options(out.path());
    options.test_endpoint = true;

    let report = Orchestrator::new(
        fakes.into_collaborators(),
        options,
        ConfirmationPolicy::AutoApprove,
    )
    .run(&request(model.path()), &CancellationToken::new())
    .await;

    assert_eq!(report.status, OverallStatus::PartialSuccess);
    assert_eq!(
        report.log.steps(),
        vec![Precondition, Stage, Plan, Apply, Poll, Verify, Done]
    );
    assert_eq!(report.log.get(Verify).unwrap().status, StepStatus::Failed);
    assert_eq!(report.log.get(Done).unwrap().status, StepStatus::Success);
    assert!(report.failure.is_none());
    assert_eq!(report.warnings[0].kind, WarningKind::VerificationFailed);
}

#[tokio::test(start_paused = true)]
async fn missing_outputs_fall_back_to_derived_endpoint_name() {
    let model = model_dir();
    let out = tempfile::tempdir().unwrap();
    let mut fakes = Fakes::default();
    fakes.engine.outputs = None;
    let calls = fakes.calls.clone();

    let report = Orchestrator::new(
        fakes.into_collaborators(),
        options(out.path()),
        ConfirmationPolicy::AutoApprove,
    )
    .run(&request(model.path()), &CancellationToken::new())
    .await;

    assert_eq!(report.status, OverallStatus::Success);
    assert!(report.outputs.is_none());
    assert_eq!(report.warnings[0].kind, WarningKind::OutputsUnavailable);
    assert!(calls.count("probe n1-endpoint") > 0);
}

#[tokio::test(start_paused = true)]
async fn cancelled_before_start_records_one_step() {
    let model = model_dir();
    let out = tempfile::tempdir().unwrap();
    let fakes = Fakes::default();
    let calls = fakes.calls.clone();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = Orchestrator::new(
        fakes.into_collaborators(),
        options(out.path()),
        ConfirmationPolicy::AutoApprove,
    )
    .run(&request(model.path()), &cancel)
    .await;

    assert_eq!(report.status, OverallStatus::Failed);
    assert_eq!(report.log.len(), 1);
    assert_eq!(report.failure.map(|f| f.kind), Some(FailureKind::Cancelled));
    assert!(calls.all().is_empty());
}

#[tokio::test(start_paused = true)]
async fn unreadable_status_after_apply_is_partial_success() {
    let model = model_dir();
    let out = tempfile::tempdir().unwrap();
    let mut fakes = Fakes::default();
    fakes.probe = FakeProbe {
        calls: fakes.calls.clone(),
        statuses: parking_lot::Mutex::new([Err(ProbeError("throttled".to_string()))].into()),
    };
    let calls = fakes.calls.clone();

    let report = Orchestrator::new(
        fakes.into_collaborators(),
        options(out.path()),
        ConfirmationPolicy::AutoApprove,
    )
    .run(&request(model.path()), &CancellationToken::new())
    .await;

    assert_eq!(report.status, OverallStatus::PartialSuccess);
    assert_eq!(report.status.exit_code(), 0);
    assert_eq!(report.log.steps(), vec![Precondition, Stage, Plan, Apply, Poll]);
    assert_eq!(report.log.get(Poll).unwrap().status, StepStatus::Failed);
    assert_eq!(calls.count("engine.apply"), 1);
    assert_eq!(
        report.failure.map(|f| f.kind),
        Some(FailureKind::ProbeFailed)
    );
}

#[tokio::test(start_paused = true)]
async fn cancelled_while_polling_after_apply_is_partial_success() {
    let model = model_dir();
    let out = tempfile::tempdir().unwrap();
    let cancel = CancellationToken::new();
    let fakes = Fakes::default();
    let calls = fakes.calls.clone();
    let mut collaborators = fakes.into_collaborators();
    collaborators.probe = Box::new(CancellingProbe {
        calls: calls.clone(),
        status: ResourceStatus::Creating,
        cancel: cancel.clone(),
    });

    let report = Orchestrator::new(collaborators, options(out.path()), ConfirmationPolicy::AutoApprove)
        .run(&request(model.path()), &cancel)
        .await;

    assert_eq!(report.status, OverallStatus::PartialSuccess);
    assert_eq!(report.log.steps(), vec![Precondition, Stage, Plan, Apply, Poll]);
    assert_eq!(calls.count("probe n1-endpoint"), 1);
    assert_eq!(report.failure.map(|f| f.kind), Some(FailureKind::Cancelled));
}

#[tokio::test(start_paused = true)]
async fn cancelled_once_in_service_skips_verification() {
    let model = model_dir();
    let out = tempfile::tempdir().unwrap();
    let cancel = CancellationToken::new();
    let fakes = Fakes::default();
    let calls = fakes.calls.clone();
    let mut collaborators = fakes.into_collaborators();
    collaborators.probe = Box::new(CancellingProbe {
        calls: calls.clone(),
        status: ResourceStatus::InService,
        cancel: cancel.clone(),
    });
    let mut options = options(out.path());
    options.test_endpoint = true;

    let report = Orchestrator::new(collaborators, options, ConfirmationPolicy::AutoApprove)
        .run(&request(model.path()), &cancel)
        .await;

    assert_eq!(report.status, OverallStatus::PartialSuccess);
    assert_eq!(
        report.log.steps(),
        vec![Precondition, Stage, Plan, Apply, Poll, Verify, Done]
    );
    let verify = report.log.get(Verify).unwrap();
    assert_eq!(verify.status, StepStatus::Skipped);
    assert!(matches!(
        verify.detail,
        Some(StepDetail::Failure {
            kind: FailureKind::Cancelled,
            ..
        })
    ));
    assert_eq!(calls.count("invoke"), 0);
    assert_eq!(report.warnings[0].kind, WarningKind::VerificationFailed);
}

#[tokio::test(start_paused = true)]
async fn report_serializes_for_json_output() {
    let model = model_dir();
    let out = tempfile::tempdir().unwrap();

    let report = Orchestrator::new(
        Fakes::default().into_collaborators(),
        options(out.path()),
        ConfirmationPolicy::AutoApprove,
    )
    .run(&request(model.path()), &CancellationToken::new())
    .await;

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["status"], "success");
    assert_eq!(json["log"][0]["step"], "precondition");
    assert_eq!(json["log"][2]["detail"]["type"], "plan");
    assert_eq!(json["log"][2]["detail"]["to_create"], 3);
}
