// ABOUTME: The deployment pipeline: preconditions, stage, plan, apply, poll, verify.
// ABOUTME: Produces an ordered step log and an overall status; never cleans up after a failure.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::PathBuf;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::{ConfirmationPolicy, FailureKind, PipelineFailure, PipelineState};
use crate::config::Config;
use crate::diagnostics::{Diagnostics, Warning};
use crate::engine::{
    ApplyError, DeploymentOutputs, PlanApplyAdapter, PlanApplyEngine, ResourceGraph,
    SettingsTemplate,
};
use crate::outcome::{DeploymentLog, OverallStatus, StepDetail, StepName, StepOutcome};
use crate::poll::{PollError, PollSettings, StatusProbe, wait_until_ready};
use crate::preflight::{self, CredentialProbe, ToolResolver};
use crate::request::DeploymentRequest;
use crate::stage::{ArtifactStager, ObjectStore, RetryPolicy};
use crate::types::RunId;
use crate::verify::{EndpointInvoker, InvocationPayload, verify_endpoint};

/// External systems the pipeline talks to.
pub struct Collaborators {
    pub tools: Box<dyn ToolResolver>,
    pub credentials: Box<dyn CredentialProbe>,
    pub store: Box<dyn ObjectStore>,
    pub engine: Box<dyn PlanApplyEngine>,
    pub probe: Box<dyn StatusProbe>,
    pub invoker: Box<dyn EndpointInvoker>,
}

/// Per-run knobs, mostly from configuration.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub required_tools: BTreeSet<String>,
    pub template: SettingsTemplate,
    pub terraform_dir: PathBuf,
    /// Where the packaged archive is written.
    pub output_dir: PathBuf,
    pub upload_retry: RetryPolicy,
    pub poll: PollSettings,
    /// Reuse the conventional artifact location without packaging.
    pub skip_model_prep: bool,
    pub test_endpoint: bool,
    pub verify_payload: InvocationPayload,
}

impl PipelineOptions {
    pub fn from_config(config: &Config) -> crate::error::Result<Self> {
        Ok(Self {
            required_tools: config.required_tools.clone(),
            template: config.settings_template()?,
            terraform_dir: config.terraform_dir.clone(),
            output_dir: PathBuf::from("."),
            upload_retry: (&config.upload).into(),
            poll: (&config.poll).into(),
            skip_model_prep: false,
            test_endpoint: false,
            verify_payload: (&config.verify).into(),
        })
    }
}

/// Everything a run produced.
#[derive(Debug, Clone, Serialize)]
pub struct DeploymentReport {
    pub run_id: RunId,
    pub status: OverallStatus,
    pub log: DeploymentLog,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outputs: Option<DeploymentOutputs>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<PipelineFailure>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<Warning>,
}

/// Why the pipeline stopped early, and what that means for the overall status.
struct Halt {
    status: OverallStatus,
    failure: PipelineFailure,
}

impl Halt {
    fn with_status(self, status: OverallStatus) -> Self {
        Self { status, ..self }
    }
}

struct RunContext {
    run_id: RunId,
    state: PipelineState,
    log: DeploymentLog,
    diagnostics: Diagnostics,
    outputs: Option<DeploymentOutputs>,
}

impl RunContext {
    fn new(run_id: RunId) -> Self {
        Self {
            run_id,
            state: PipelineState::Idle,
            log: DeploymentLog::new(),
            diagnostics: Diagnostics::default(),
            outputs: None,
        }
    }

    fn enter(&mut self, next: PipelineState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid transition {} -> {}",
            self.state,
            next
        );
        tracing::debug!("Pipeline {} -> {}", self.state, next);
        self.state = next;
    }

    /// Record the failing step and move to `Failed`.
    fn halt(
        &mut self,
        failure: PipelineFailure,
        started: DateTime<Utc>,
        detail: Option<StepDetail>,
    ) -> Halt {
        let detail = detail.unwrap_or_else(|| StepDetail::Failure {
            kind: failure.kind,
            remedy: failure.remedy.clone(),
        });
        self.log
            .push(StepOutcome::failed(failure.step, &failure.message, started).with_detail(detail));
        self.enter(PipelineState::Failed);
        Halt {
            status: OverallStatus::Failed,
            failure,
        }
    }

    fn check_cancelled(&mut self, cancel: &CancellationToken, step: StepName) -> Result<(), Halt> {
        if cancel.is_cancelled() {
            let failure =
                PipelineFailure::new(step, FailureKind::Cancelled, "deployment was cancelled");
            return Err(self.halt(failure, Utc::now(), None));
        }
        Ok(())
    }
}

/// Sequences one deployment run.
pub struct Orchestrator {
    collaborators: Collaborators,
    options: PipelineOptions,
    confirmation: ConfirmationPolicy,
}

impl Orchestrator {
    pub fn new(
        collaborators: Collaborators,
        options: PipelineOptions,
        confirmation: ConfirmationPolicy,
    ) -> Self {
        Self {
            collaborators,
            options,
            confirmation,
        }
    }

    /// Run the pipeline to completion or to its first fatal failure.
    ///
    /// Failures are reported in the returned report, never as an `Err`, so
    /// the caller always gets the log of what was done.
    pub async fn run(
        self,
        request: &DeploymentRequest,
        cancel: &CancellationToken,
    ) -> DeploymentReport {
        let mut ctx = RunContext::new(RunId::generate());
        tracing::info!(
            run = %ctx.run_id.short(),
            "Deploying {} to {}",
            request.resource_name,
            request.remote_bucket
        );

        let result = execute(
            self.collaborators,
            &self.options,
            &self.confirmation,
            request,
            cancel,
            &mut ctx,
        )
        .await;

        let (status, failure) = match result {
            Ok(status) => (status, None),
            Err(halt) => (halt.status, Some(halt.failure)),
        };

        DeploymentReport {
            run_id: ctx.run_id,
            status,
            log: ctx.log,
            outputs: ctx.outputs,
            failure,
            warnings: ctx.diagnostics.into_warnings(),
        }
    }
}

async fn execute(
    collaborators: Collaborators,
    options: &PipelineOptions,
    confirmation: &ConfirmationPolicy,
    request: &DeploymentRequest,
    cancel: &CancellationToken,
    ctx: &mut RunContext,
) -> Result<OverallStatus, Halt> {
    let Collaborators {
        tools,
        credentials,
        store,
        engine,
        probe,
        invoker,
    } = collaborators;

    // Precondition
    ctx.enter(PipelineState::CheckingPreconditions);
    ctx.check_cancelled(cancel, StepName::Precondition)?;
    let started = Utc::now();
    match preflight::check(tools.as_ref(), &options.required_tools, credentials.as_ref()).await {
        Ok(identity) => {
            let message = format!("authenticated as {}", identity.arn);
            ctx.log.push(
                StepOutcome::success(StepName::Precondition, message, started).with_detail(
                    StepDetail::Identity {
                        account: identity.account,
                        arn: identity.arn,
                    },
                ),
            );
        }
        Err(e) => {
            let failure = PipelineFailure::new(StepName::Precondition, (&e).into(), e.to_string());
            return Err(ctx.halt(failure, started, None));
        }
    }

    // Stage
    ctx.enter(PipelineState::Staging);
    ctx.check_cancelled(cancel, StepName::Stage)?;
    let started = Utc::now();
    let destination = request.artifact_destination();
    let model_data_url = if options.skip_model_prep {
        ctx.log.push(
            StepOutcome::skipped(
                StepName::Stage,
                format!("model preparation skipped, using {destination}"),
                started,
            )
            .with_detail(StepDetail::Artifact {
                uri: destination.clone(),
                sha256: None,
                attempts: 0,
            }),
        );
        destination
    } else {
        let stager = ArtifactStager::new(store, options.output_dir.clone())
            .with_retry(options.upload_retry);
        match stager
            .stage(
                request.artifact_source(),
                &request.requirements,
                &destination,
                request.overwrite,
                cancel,
            )
            .await
        {
            Ok(artifact) => {
                let detail = StepDetail::Artifact {
                    uri: artifact.uri.clone(),
                    sha256: artifact.sha256.clone(),
                    attempts: artifact.attempts,
                };
                let outcome = if artifact.skipped {
                    StepOutcome::skipped(
                        StepName::Stage,
                        format!("{} already exists", artifact.uri),
                        started,
                    )
                } else {
                    StepOutcome::success(
                        StepName::Stage,
                        format!(
                            "uploaded {} in {} attempt(s)",
                            artifact.uri, artifact.attempts
                        ),
                        started,
                    )
                };
                ctx.log.push(outcome.with_detail(detail));
                artifact.uri
            }
            Err(e) => {
                let failure = PipelineFailure::new(StepName::Stage, (&e).into(), e.to_string());
                return Err(ctx.halt(failure, started, None));
            }
        }
    };

    // Plan
    ctx.enter(PipelineState::Planning);
    ctx.check_cancelled(cancel, StepName::Plan)?;
    let started = Utc::now();
    let graph = ResourceGraph::new(
        options.terraform_dir.clone(),
        options.template.render(request, &model_data_url),
    );
    let adapter = PlanApplyAdapter::new(engine, ctx.run_id);
    let handle = match adapter.plan(&graph).await {
        Ok(handle) => handle,
        Err(e) => {
            let failure = PipelineFailure::new(StepName::Plan, (&e).into(), e.to_string());
            return Err(ctx.halt(failure, started, None));
        }
    };
    let summary = handle.summary();
    ctx.log.push(
        StepOutcome::success(StepName::Plan, format!("Plan: {summary}"), started)
            .with_detail(StepDetail::Plan(summary)),
    );

    // Apply, behind the confirmation gate
    ctx.check_cancelled(cancel, StepName::Apply)?;
    let started = Utc::now();
    if !handle.diff().has_changes() {
        ctx.log.push(StepOutcome::skipped(
            StepName::Apply,
            "no changes, infrastructure is up to date",
            started,
        ));
    } else {
        ctx.enter(PipelineState::AwaitingConfirmation);
        if !confirmation.confirm(handle.diff()) {
            let failure = PipelineFailure::new(
                StepName::Apply,
                FailureKind::ConfirmationDeclined,
                "plan was not approved",
            );
            ctx.log.push(
                StepOutcome::skipped(StepName::Apply, &failure.message, started).with_detail(
                    StepDetail::Failure {
                        kind: failure.kind,
                        remedy: failure.remedy.clone(),
                    },
                ),
            );
            ctx.enter(PipelineState::Failed);
            return Err(Halt {
                status: OverallStatus::Failed,
                failure,
            });
        }

        ctx.enter(PipelineState::Applying);
        match adapter.apply(handle).await {
            Ok(summary) => ctx.log.push(
                StepOutcome::success(StepName::Apply, format!("Apply complete: {summary}"), started)
                    .with_detail(StepDetail::Apply(summary)),
            ),
            Err(e) => {
                let (message, detail) = match &e {
                    ApplyError::Partial { succeeded, failed } => {
                        let addresses: Vec<&str> =
                            failed.iter().map(|f| f.address.as_str()).collect();
                        (
                            format!("{e}: {}", addresses.join(", ")),
                            Some(StepDetail::PartialApply {
                                succeeded: succeeded.clone(),
                                failed: failed.clone(),
                            }),
                        )
                    }
                    _ => (e.to_string(), None),
                };
                let failure = PipelineFailure::new(StepName::Apply, (&e).into(), message);
                return Err(ctx.halt(failure, started, detail));
            }
        }
    }

    match adapter.outputs().await {
        Ok(outputs) => ctx.outputs = Some(outputs),
        Err(e) => ctx.diagnostics.warn(Warning::outputs_unavailable(format!(
            "could not read deployment outputs: {e}"
        ))),
    }
    let endpoint = ctx
        .outputs
        .as_ref()
        .and_then(|o| o.endpoint_name())
        .map(str::to_string)
        .unwrap_or_else(|| request.resource_name.endpoint_name());

    // Poll. The infrastructure is live from here on, so stopping short of a
    // confirmed endpoint is partial, not failed.
    ctx.enter(PipelineState::Polling);
    ctx.check_cancelled(cancel, StepName::Poll)
        .map_err(|halt| halt.with_status(OverallStatus::PartialSuccess))?;
    let started = Utc::now();
    let clock = Instant::now();
    match wait_until_ready(&endpoint, probe.as_ref(), &options.poll, cancel).await {
        Ok(status) => ctx.log.push(
            StepOutcome::success(StepName::Poll, format!("{endpoint} is {status}"), started)
                .with_detail(StepDetail::Poll {
                    status,
                    elapsed_secs: clock.elapsed().as_secs(),
                }),
        ),
        Err(e) => {
            let failure = PipelineFailure::new(StepName::Poll, (&e).into(), e.to_string());
            let detail = match &e {
                PollError::PollTimeout {
                    elapsed,
                    last_status,
                    ..
                } => Some(StepDetail::PollTimeout {
                    elapsed_secs: elapsed.as_secs(),
                    last_status: *last_status,
                }),
                _ => None,
            };
            let halt = ctx.halt(failure, started, detail);
            return Err(match e {
                PollError::ResourceFailed { .. } => halt,
                PollError::PollTimeout { .. }
                | PollError::ProbeFailed { .. }
                | PollError::Cancelled { .. } => halt.with_status(OverallStatus::PartialSuccess),
            });
        }
    }

    // Verify (best-effort)
    let mut status = OverallStatus::Success;
    if options.test_endpoint {
        ctx.enter(PipelineState::Verifying);
        let started = Utc::now();
        if cancel.is_cancelled() {
            let kind = FailureKind::Cancelled;
            ctx.log.push(
                StepOutcome::skipped(StepName::Verify, "cancelled before verification", started)
                    .with_detail(StepDetail::Failure {
                        kind,
                        remedy: kind.remedy().to_string(),
                    }),
            );
            ctx.diagnostics.warn(Warning::verification_failed(format!(
                "{endpoint} was not verified: deployment was cancelled"
            )));
            status = status.downgrade();
        } else {
            match verify_endpoint(invoker.as_ref(), &endpoint, &options.verify_payload).await {
                Ok(response) => ctx.log.push(
                    StepOutcome::success(StepName::Verify, format!("{endpoint} responded"), started)
                        .with_detail(StepDetail::Verify { response }),
                ),
                Err(e) => {
                    let kind = FailureKind::VerificationFailed;
                    ctx.log.push(
                        StepOutcome::failed(StepName::Verify, e.to_string(), started).with_detail(
                            StepDetail::Failure {
                                kind,
                                remedy: kind.remedy().to_string(),
                            },
                        ),
                    );
                    ctx.diagnostics
                        .warn(Warning::verification_failed(e.to_string()));
                    status = status.downgrade();
                }
            }
        }
    }

    ctx.enter(PipelineState::Done);
    let message = match status {
        OverallStatus::Success => format!("{} deployed to {endpoint}", request.resource_name),
        _ => format!(
            "{} deployed to {endpoint}, with warnings",
            request.resource_name
        ),
    };
    ctx.log
        .push(StepOutcome::success(StepName::Done, message, Utc::now()));
    Ok(status)
}
