//! Subprocess execution with mandatory timeouts
//!
//! Host tools (xdotool, scrot, xset, Xvfb, powershell.exe, ...) are the only
//! truly blocking calls in the crate. They all go through [`CommandRunner`]
//! so every invocation carries a deadline and so tests can substitute
//! [`MockCommandRunner`](super::mock_runner::MockCommandRunner).
//!
//! - [`CommandRunner::run`] executes a command to completion and captures its
//!   output. The child is killed if the deadline passes.
//! - [`CommandRunner::spawn`] starts a long-lived child (a virtual display)
//!   and returns an owned [`ManagedProcess`] handle.

use std::{future::Future, process::Stdio, time::Duration};

use async_trait::async_trait;
use tokio::process::{Child, Command};

use crate::error::{DesktopError, DesktopResult};

/// A command to execute on the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Extra environment variables layered over the inherited environment
    pub env: Vec<(String, String)>,
    pub timeout: Duration,
}

impl CommandSpec {
    /// Creates a spec with the default command timeout
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            timeout: crate::constants::command_timeout(),
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

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Value of an environment override, if set on this spec
    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Program and arguments joined for log output
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured result of a completed command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when terminated by a signal
    pub status: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    /// Successful output with the given stdout
    pub fn ok(stdout: impl Into<Vec<u8>>) -> Self {
        Self {
            status: Some(0),
            stdout: stdout.into(),
            stderr: Vec::new(),
        }
    }

    /// Failed output with the given exit code and stderr
    pub fn failed(code: i32, stderr: impl Into<Vec<u8>>) -> Self {
        Self {
            status: Some(code),
            stdout: Vec::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_string()
    }

    /// Converts a non-zero exit into [`DesktopError::CommandFailed`]
    pub fn into_result(self, program: &str) -> DesktopResult<Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(DesktopError::CommandFailed {
                program: program.to_string(),
                status: self.status,
                stderr: self.stderr_str(),
            })
        }
    }
}

/// Owned handle to a long-lived child process
#[async_trait]
pub trait ManagedProcess: Send + Sync {
    /// OS process id, `None` once reaped
    fn pid(&self) -> Option<u32>;

    /// Returns false once the process has exited
    fn is_running(&mut self) -> bool;

    /// Asks the process to exit, force-killing it after `grace`
    async fn terminate(&mut self, grace: Duration) -> DesktopResult<()>;
}

/// Executes host commands
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs a command to completion within `spec.timeout`
    async fn run(&self, spec: &CommandSpec) -> DesktopResult<CommandOutput>;

    /// Starts a long-lived child process
    async fn spawn(&self, spec: &CommandSpec) -> DesktopResult<Box<dyn ManagedProcess>>;
}

/// Wraps a future with a timeout, mapping expiry to [`DesktopError::Timeout`]
///
/// # Examples
///
/// ```rust,ignore
/// let output = with_timeout("xset", Duration::from_secs(2), async {
///     runner.run(&spec).await
/// })
/// .await?;
/// ```
pub async fn with_timeout<F, T>(operation: &str, timeout: Duration, future: F) -> DesktopResult<T>
where
    F: Future<Output = DesktopResult<T>>,
{
    tokio::time::timeout(timeout, future).await.map_err(|_| {
        let duration_ms = timeout.as_millis() as u64;
        tracing::warn!("{} timed out after {}ms", operation, duration_ms);
        DesktopError::Timeout {
            operation: operation.to_string(),
            duration_ms,
        }
    })?
}

fn spawn_error(program: &str, err: std::io::Error) -> DesktopError {
    DesktopError::ProcessSpawnFailure {
        program: program.to_string(),
        reason: err.to_string(),
    }
}

fn build_command(spec: &CommandSpec) -> Command {
    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .kill_on_drop(true);
    cmd
}

/// [`CommandRunner`] backed by `tokio::process`
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioCommandRunner;

impl TokioCommandRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    async fn run(&self, spec: &CommandSpec) -> DesktopResult<CommandOutput> {
        tracing::debug!("Running: {}", spec.command_line());

        let child = build_command(spec)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| spawn_error(&spec.program, e))?;

        // Dropping `child` on timeout kills it (kill_on_drop).
        let output = with_timeout(&spec.program, spec.timeout, async move {
            child
                .wait_with_output()
                .await
                .map_err(|e| DesktopError::io(format!("waiting for {}", spec.program), e))
        })
        .await?;

        tracing::debug!("{} exited with {:?}", spec.program, output.status.code());

        Ok(CommandOutput {
            status: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }

    async fn spawn(&self, spec: &CommandSpec) -> DesktopResult<Box<dyn ManagedProcess>> {
        let child = build_command(spec)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| spawn_error(&spec.program, e))?;

        tracing::info!("Spawned {} (pid {:?})", spec.command_line(), child.id());

        Ok(Box::new(TokioProcess {
            program: spec.program.clone(),
            child,
        }))
    }
}

/// Child process started by [`TokioCommandRunner::spawn`]
#[derive(Debug)]
pub struct TokioProcess {
    program: String,
    child: Child,
}

impl TokioProcess {
    #[cfg(unix)]
    fn send_sigterm(&self) {
        use nix::{
            sys::signal::{self, Signal},
            unistd::Pid,
        };

        if let Some(pid) = self.child.id() {
            if let Err(e) = signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                tracing::warn!("SIGTERM to {} (pid {}) failed: {}", self.program, pid, e);
            }
        }
    }

    #[cfg(not(unix))]
    fn send_sigterm(&self) {}
}

#[async_trait]
impl ManagedProcess for TokioProcess {
    fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    async fn terminate(&mut self, grace: Duration) -> DesktopResult<()> {
        if !self.is_running() {
            return Ok(());
        }

        self.send_sigterm();

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!("{} exited with {}", self.program, status);
                Ok(())
            }
            Ok(Err(e)) => Err(DesktopError::io(format!("waiting for {}", self.program), e)),
            Err(_) => {
                tracing::warn!(
                    "{} did not exit within {}ms, killing",
                    self.program,
                    grace.as_millis()
                );
                self.child
                    .kill()
                    .await
                    .map_err(|e| DesktopError::io(format!("killing {}", self.program), e))
            }
        }
    }
}
