//! Command execution.
//!
//! Every OS mutation goes through [`CommandRunner`] so stages can be driven
//! by a recording double in tests instead of touching the machine.

use async_trait::async_trait;
use macdeploy_common::{Error, Result};
use macdeploy_redaction::Redactor;
use std::fmt;
use std::io::Write;
use std::process::{Command, Stdio};
use tracing::debug;

/// A bash script and its positional arguments. Scripts run through
/// `bash -c`, so the first argument is `$0`, not `$1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellCommand {
    /// Short description that is safe to log (never contains secrets).
    pub label: String,
    pub script: String,
    pub args: Vec<String>,
    pub stdin: Option<String>,
    /// Run through `sudo`; relies on a live sudo session.
    pub elevated: bool,
}

impl ShellCommand {
    pub fn new(label: impl Into<String>, script: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            script: script.into(),
            args: Vec::new(),
            stdin: None,
            elevated: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn elevated(mut self) -> Self {
        self.elevated = true;
        self
    }

    /// Shell-like rendering for logs. Not meant to be executed.
    pub fn render(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 4);
        if self.elevated {
            parts.push("sudo".to_string());
        }
        parts.push("bash".to_string());
        parts.push("-c".to_string());
        parts.push(quote(&self.script));
        parts.extend(self.args.iter().map(|a| quote(a)));
        parts.join(" ")
    }

    /// True when the label, the script or any argument contains `needle`.
    pub fn mentions(&self, needle: &str) -> bool {
        self.label.contains(needle)
            || self.script.contains(needle)
            || self.args.iter().any(|a| a.contains(needle))
    }
}

impl fmt::Display for ShellCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Successful run with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed run with the given exit code and combined output.
    pub fn failed(code: i32, output: impl Into<String>) -> Self {
        Self {
            exit_code: Some(code),
            stdout: String::new(),
            stderr: output.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// stdout followed by stderr, trimmed.
    pub fn combined(&self) -> String {
        let mut out = self.stdout.trim().to_string();
        let err = self.stderr.trim();
        if !err.is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(err);
        }
        out
    }

    fn failure_reason(&self) -> String {
        match self.exit_code {
            Some(code) => format!("exit status {}", code),
            None => "terminated by signal".to_string(),
        }
    }
}

/// Runs one command to completion. Implementations never retry.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run a command. `Err` means it could not be started at all; a
    /// non-zero exit is reported through [`CommandOutput::success`].
    async fn run(&self, command: &ShellCommand) -> Result<CommandOutput>;
}

/// Run a command and turn a non-zero exit into [`Error::CommandExecution`].
pub async fn run_checked(
    runner: &dyn CommandRunner,
    command: &ShellCommand,
) -> Result<CommandOutput> {
    let output = runner.run(command).await?;
    if output.success() {
        Ok(output)
    } else {
        Err(Error::command(
            command.label.clone(),
            output.failure_reason(),
            output.combined(),
        ))
    }
}

/// Runs commands on this machine through `bash -c`.
pub struct LocalRunner {
    redactor: Redactor,
}

impl LocalRunner {
    pub fn new(redactor: Redactor) -> Self {
        Self { redactor }
    }
}

impl Default for LocalRunner {
    fn default() -> Self {
        Self::new(Redactor::new())
    }
}

#[async_trait]
impl CommandRunner for LocalRunner {
    async fn run(&self, command: &ShellCommand) -> Result<CommandOutput> {
        debug!("Local exec: {}", self.redactor.redact_str(&command.render()));

        let mut cmd = if command.elevated {
            let mut c = Command::new("sudo");
            c.arg("bash");
            c
        } else {
            Command::new("bash")
        };
        cmd.arg("-c").arg(&command.script).args(&command.args);
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        cmd.stdin(if command.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::command(command.label.clone(), e.to_string(), ""))?;

        if let (Some(input), Some(mut stdin)) = (command.stdin.as_ref(), child.stdin.take()) {
            stdin
                .write_all(input.as_bytes())
                .map_err(|e| Error::command(command.label.clone(), e.to_string(), ""))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|e| Error::command(command.label.clone(), e.to_string(), ""))?;

        let result = CommandOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };

        debug!(
            "{} exited with {:?}: {}",
            command.label,
            result.exit_code,
            self.redactor.redact_str(&result.combined())
        );

        Ok(result)
    }
}
