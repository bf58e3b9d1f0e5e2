// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Flags mirror the deployment script: model dir, bucket, name, and step toggles.

use clap::Parser;
use sagedeploy::types::{BucketName, ResourceName};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "sagedeploy")]
#[command(about = "Deploy a model to a SageMaker endpoint through Terraform")]
#[command(version)]
pub struct Cli {
    /// Directory containing the model files
    #[arg(long, default_value = "./model")]
    pub model_dir: PathBuf,

    /// S3 bucket for the model artifact
    #[arg(long)]
    pub bucket_name: BucketName,

    /// Model name; endpoint names are derived from it
    #[arg(long)]
    pub model_name: ResourceName,

    /// Python packages to write into requirements.txt
    #[arg(long, num_args = 1..)]
    pub requirements: Vec<String>,

    /// Use the already uploaded artifact instead of packaging
    #[arg(long)]
    pub skip_model_prep: bool,

    /// Invoke the endpoint once after it is in service
    #[arg(long)]
    pub test_endpoint: bool,

    /// Configuration file (default: discover sagedeploy.yml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Where the packaged archive is written
    #[arg(long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Upload even if the artifact already exists
    #[arg(long)]
    pub overwrite: bool,

    /// Apply without asking for confirmation
    #[arg(long)]
    pub auto_approve: bool,

    /// Extra container environment variable (repeatable)
    #[arg(long = "env", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub env: Vec<(String, String)>,

    /// Output JSON for scripting
    #[arg(long, conflicts_with = "quiet")]
    pub json: bool,

    /// Only print the final result
    #[arg(long)]
    pub quiet: bool,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{s}'")),
    }
}
