// ABOUTME: Library root for sagedeploy - exposes pipeline components for testing.
// ABOUTME: The main binary is in main.rs.

pub mod aws;
pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod orchestrator;
pub mod outcome;
pub mod output;
pub mod poll;
pub mod preflight;
pub mod process;
pub mod request;
pub mod stage;
pub mod types;
pub mod verify;
