// ABOUTME: Deploy command implementation.
// ABOUTME: Builds the request and real collaborators from CLI flags and config, then runs the pipeline.

use crate::cli::Cli;
use dialoguer::{Confirm, console::Term};
use sagedeploy::aws::{AwsCli, S3ObjectStore, SageMakerEndpoints, StsCredentialProbe};
use sagedeploy::config::Config;
use sagedeploy::engine::TerraformEngine;
use sagedeploy::error::Result;
use sagedeploy::orchestrator::{
    Collaborators, ConfirmationPolicy, Orchestrator, PipelineOptions,
};
use sagedeploy::outcome::OverallStatus;
use sagedeploy::output::{Output, OutputMode};
use sagedeploy::preflight::PathResolver;
use sagedeploy::request::DeploymentRequest;
use std::env;
use std::io::{self, IsTerminal};
use tokio_util::sync::CancellationToken;

/// Run one deployment and report it.
pub async fn deploy(
    cli: Cli,
    output: &mut Output,
    cancel: &CancellationToken,
) -> Result<OverallStatus> {
    let cwd = env::current_dir()?;
    let config = Config::resolve(cli.config.as_deref(), &cwd)?;

    let mut options = PipelineOptions::from_config(&config)?;
    options.output_dir = cli.output_dir;
    options.skip_model_prep = cli.skip_model_prep;
    options.test_endpoint = cli.test_endpoint;

    let mut request = DeploymentRequest::new(cli.model_dir, cli.bucket_name, cli.model_name)
        .with_requirements(cli.requirements)
        .with_overwrite(cli.overwrite);
    for (key, value) in cli.env {
        request = request.with_extra_config(key, value);
    }

    let aws = AwsCli::new(&config.region).with_profile(config.profile.clone());
    let endpoints = SageMakerEndpoints::new(aws.clone());
    let collaborators = Collaborators {
        tools: Box::new(PathResolver),
        credentials: Box::new(StsCredentialProbe::new(aws.clone())),
        store: Box::new(S3ObjectStore::new(aws)),
        engine: Box::new(TerraformEngine::new(config.terraform_dir.clone())),
        probe: Box::new(endpoints.clone()),
        invoker: Box::new(endpoints),
    };

    let confirmation = if cli.auto_approve {
        ConfirmationPolicy::AutoApprove
    } else {
        prompt_for_approval(output.mode())
    };

    output.start_timer();
    output.progress(&format!(
        "Deploying {} from {} to {}",
        request.resource_name,
        request.artifact_source().display(),
        request.artifact_destination()
    ));

    let report = Orchestrator::new(collaborators, options, confirmation)
        .run(&request, cancel)
        .await;
    output.report(&report);

    Ok(report.status)
}

/// Ask on the terminal. No terminal or the default answer declines.
fn prompt_for_approval(mode: OutputMode) -> ConfirmationPolicy {
    ConfirmationPolicy::interactive(move |diff| {
        if !io::stdin().is_terminal() {
            tracing::warn!("stdin is not a terminal, declining the plan (use --auto-approve)");
            return false;
        }

        Output::new(mode).plan(diff);
        approval(
            Confirm::new()
                .with_prompt(format!("Apply {}?", diff.summary()))
                .default(false)
                .interact_on(&Term::stderr()),
        )
    })
}

/// A prompt that could not be answered counts as declined.
fn approval(answer: dialoguer::Result<bool>) -> bool {
    answer.unwrap_or_else(|e| {
        tracing::warn!("confirmation prompt failed, declining the plan: {e}");
        false
    })
}
