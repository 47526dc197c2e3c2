//! Application workloads run against a flakey filesystem.
//!
//! A crash-consistency test typically starts the application under test on
//! the mounted device, lets it run for a while, kills it and then cuts power.
//! [`Workload`] does the process half of that with tokio.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use crate::error::{Result, TestError};

/// Command line of a workload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workload {
    program: String,
    args: Vec<String>,
    current_dir: Option<PathBuf>,
}

impl Workload {
    /// Workload running `program` with no arguments.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
        }
    }

    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Working directory of the process.
    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Program and arguments joined for logs.
    #[must_use]
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Starts the process with stdout and stderr captured.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(&self) -> Result<RunningWorkload> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.current_dir {
            command.current_dir(dir);
        }

        let mut child = command
            .spawn()
            .map_err(|e| TestError::workload(format!("failed to start {}: {e}", self.program)))?;
        let stdout = capture(child.stdout.take());
        let stderr = capture(child.stderr.take());

        tracing::info!("started {} (pid {:?})", self.command_line(), child.id());
        Ok(RunningWorkload {
            program: self.program.clone(),
            child,
            stdout,
            stderr,
            started: Instant::now(),
        })
    }

    /// Runs the workload for at most `duration`, killing it if it is still
    /// running by then.
    pub async fn run_for(&self, duration: Duration) -> Result<WorkloadOutput> {
        let mut running = self.spawn()?;

        let exited = tokio::select! {
            status = running.child.wait() => Some(status),
            () = tokio::time::sleep(duration) => None,
        };

        match exited {
            Some(status) => running.finish(status?, false).await,
            None => running.kill().await,
        }
    }

    /// Runs the workload to completion, failing with
    /// [`TestError::Timeout`] if it takes longer than `timeout`.
    pub async fn run_to_completion(&self, timeout: Duration) -> Result<WorkloadOutput> {
        let running = self.spawn()?;
        match tokio::time::timeout(timeout, running.wait()).await {
            Ok(output) => output,
            // kill_on_drop reaps the child.
            Err(_) => Err(TestError::Timeout(timeout)),
        }
    }
}

/// A started workload.
#[derive(Debug)]
pub struct RunningWorkload {
    program: String,
    child: Child,
    stdout: JoinHandle<std::io::Result<Vec<u8>>>,
    stderr: JoinHandle<std::io::Result<Vec<u8>>>,
    started: Instant,
}

impl RunningWorkload {
    /// OS process id, while the process has not been reaped.
    #[must_use]
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Time since the process was started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Sends `SIGKILL` and collects the output.
    ///
    /// Only the direct child is killed. Descendants that inherited its
    /// stdout or stderr hold the capture open until they exit.
    pub async fn kill(mut self) -> Result<WorkloadOutput> {
        tracing::info!("killing {} after {:?}", self.program, self.elapsed());
        self.child.kill().await?;
        let status = self.child.wait().await?;
        self.finish(status, true).await
    }

    /// Waits for the process to exit and collects the output.
    pub async fn wait(mut self) -> Result<WorkloadOutput> {
        let status = self.child.wait().await?;
        self.finish(status, false).await
    }

    async fn finish(self, status: ExitStatus, killed: bool) -> Result<WorkloadOutput> {
        let stdout = collect(self.stdout).await?;
        let stderr = collect(self.stderr).await?;
        let elapsed = self.started.elapsed();
        tracing::debug!("{} exited with {status} after {elapsed:?}", self.program);
        Ok(WorkloadOutput {
            status,
            stdout,
            stderr,
            elapsed,
            killed,
        })
    }
}

/// What a finished workload left behind.
#[derive(Debug, Clone)]
pub struct WorkloadOutput {
    /// Exit status.
    pub status: ExitStatus,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Wall time from spawn to exit.
    pub elapsed: Duration,
    /// True if the runner killed the process.
    pub killed: bool,
}

impl WorkloadOutput {
    /// Stdout followed by stderr, for dumping on failure.
    #[must_use]
    pub fn logs(&self) -> String {
        let mut logs = self.stdout.clone();
        if !self.stderr.is_empty() {
            if !logs.is_empty() && !logs.ends_with('\n') {
                logs.push('\n');
            }
            logs.push_str(&self.stderr);
        }
        logs
    }
}

fn capture<R>(pipe: Option<R>) -> JoinHandle<std::io::Result<Vec<u8>>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            pipe.read_to_end(&mut buf).await?;
        }
        Ok(buf)
    })
}

async fn collect(handle: JoinHandle<std::io::Result<Vec<u8>>>) -> Result<String> {
    let bytes = handle
        .await
        .map_err(|e| TestError::workload(format!("output reader failed: {e}")))??;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
