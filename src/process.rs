// ABOUTME: Runs external CLI tools with argument vectors, never through a shell.
// ABOUTME: Errors follow the SNAFU pattern with a kind() for programmatic handling.

use serde::de::DeserializeOwned;
use snafu::{ResultExt, Snafu};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// Failure to run an external tool or to make sense of what it printed.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ToolError {
    #[snafu(display("failed to start {program}: {source}"))]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[snafu(display("{program} exited with {status}: {}", stderr.trim()))]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },

    #[snafu(display("could not decode {program} output: {source}"))]
    Decode {
        program: String,
        source: serde_json::Error,
    },
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolErrorKind {
    /// The executable could not be started at all.
    NotStarted,
    /// The tool ran and reported failure.
    NonZeroExit,
    /// The tool succeeded but its output was not what we expected.
    BadOutput,
}

impl ToolError {
    pub fn kind(&self) -> ToolErrorKind {
        match self {
            ToolError::Spawn { .. } => ToolErrorKind::NotStarted,
            ToolError::Failed { .. } => ToolErrorKind::NonZeroExit,
            ToolError::Decode { .. } => ToolErrorKind::BadOutput,
        }
    }

    /// Standard error of a failed run, if that is what happened.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            ToolError::Failed { stderr, .. } => Some(stderr),
            _ => None,
        }
    }
}

/// Captured result of a finished tool run.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    fn status_label(&self) -> String {
        match self.code {
            Some(code) => format!("exit code {code}"),
            None => "signal".to_string(),
        }
    }
}

/// An invocation of an external tool, built up argument by argument.
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: String,
    args: Vec<OsString>,
    cwd: Option<PathBuf>,
    env: Vec<(String, String)>,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: &Path) -> Self {
        self.cwd = Some(dir.to_path_buf());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Rendered command line, for logs only.
    pub fn display(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(&arg.to_string_lossy());
        }
        line
    }

    /// Run to completion and capture output, whatever the exit status.
    pub async fn output(&self) -> Result<ToolOutput, ToolError> {
        tracing::debug!("Running {}", self.display());

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.cwd {
            command.current_dir(dir);
        }

        let output = command.output().await.context(SpawnSnafu {
            program: &self.program,
        })?;

        Ok(ToolOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    /// Run and require a zero exit status.
    pub async fn run(&self) -> Result<ToolOutput, ToolError> {
        let output = self.output().await?;
        if output.success() {
            Ok(output)
        } else {
            FailedSnafu {
                program: &self.program,
                status: output.status_label(),
                stderr: output.stderr,
            }
            .fail()
        }
    }

    /// Run, require success, and decode standard output as JSON.
    pub async fn run_json<T: DeserializeOwned>(&self) -> Result<T, ToolError> {
        let output = self.run().await?;
        serde_json::from_str(&output.stdout).context(DecodeSnafu {
            program: &self.program,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_joins_arguments() {
        let cmd = ToolCommand::new("terraform").args(["plan", "-input=false"]);
        assert_eq!(cmd.display(), "terraform plan -input=false");
    }

    #[tokio::test]
    async fn missing_program_is_not_started() {
        let err = ToolCommand::new("sagedeploy-definitely-not-installed")
            .output()
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ToolErrorKind::NotStarted);
    }

    #[test]
    fn failed_error_exposes_stderr() {
        let err = ToolError::Failed {
            program: "aws".to_string(),
            status: "exit code 254".to_string(),
            stderr: "An error occurred (403)\n".to_string(),
        };
        assert_eq!(err.kind(), ToolErrorKind::NonZeroExit);
        assert_eq!(err.stderr(), Some("An error occurred (403)\n"));
        assert!(err.to_string().contains("exit code 254"));
    }
}
