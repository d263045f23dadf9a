//! Handle to a running agent: its decoded event stream plus process control.
//!
//! The handle owns the process for its whole life. It moves from the
//! orchestrator into the approval gate when a run is suspended and back out
//! when the run is resumed or discarded; whoever holds it last must
//! terminate it (or let `kill_on_drop` do so).

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, ChildStderr};
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tracing::{debug, warn};

use super::codec::EventCodec;
use super::event::Event;
use crate::{AppError, Result};

/// Bytes of stderr retained for failure diagnostics.
const STDERR_TAIL_BYTES: usize = 4096;

/// Boxed future returned by [`ProcessControl`] methods.
pub type ControlFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Exit information of a finished agent process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitReport {
    /// Exit code, `None` when terminated by a signal.
    pub code: Option<i32>,
    /// Tail of the process's stderr output.
    pub stderr: String,
}

impl ExitReport {
    /// Whether the process exited with status zero.
    #[must_use]
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Lifecycle operations on the process behind an [`AgentHandle`].
pub trait ProcessControl: Send {
    /// Forcibly stop the process and reap it.
    fn kill(&mut self) -> ControlFuture<'_, ()>;

    /// Wait for the process to exit on its own.
    fn wait(&mut self) -> ControlFuture<'_, ExitReport>;
}

/// [`ProcessControl`] for a real child process.
pub struct ChildControl {
    child: Child,
    stderr: Option<JoinHandle<String>>,
}

impl ChildControl {
    /// Take ownership of `child`, draining its stderr in the background.
    #[must_use]
    pub fn new(mut child: Child) -> Self {
        let stderr = child.stderr.take().map(|pipe| tokio::spawn(drain_tail(pipe)));
        Self { child, stderr }
    }
}

impl ProcessControl for ChildControl {
    fn kill(&mut self) -> ControlFuture<'_, ()> {
        Box::pin(async move {
            self.child
                .kill()
                .await
                .map_err(|err| AppError::Process(format!("failed to kill agent: {err}")))
        })
    }

    fn wait(&mut self) -> ControlFuture<'_, ExitReport> {
        Box::pin(async move {
            let status = self
                .child
                .wait()
                .await
                .map_err(|err| AppError::Process(format!("failed to wait for agent: {err}")))?;
            let stderr = match self.stderr.take() {
                Some(task) => task.await.unwrap_or_default(),
                None => String::new(),
            };
            Ok(ExitReport {
                code: status.code(),
                stderr,
            })
        })
    }
}

/// Read stderr to completion, keeping only the last [`STDERR_TAIL_BYTES`].
async fn drain_tail(mut pipe: ChildStderr) -> String {
    let mut tail: Vec<u8> = Vec::with_capacity(STDERR_TAIL_BYTES);
    let mut chunk = [0_u8; 1024];
    loop {
        match pipe.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                tail.extend_from_slice(&chunk[..n]);
                if tail.len() > STDERR_TAIL_BYTES {
                    let excess = tail.len() - STDERR_TAIL_BYTES;
                    tail.drain(..excess);
                }
            }
            Err(err) => {
                debug!(%err, "agent stderr read failed");
                break;
            }
        }
    }
    String::from_utf8_lossy(&tail).into_owned()
}

/// Exclusive handle to one running agent.
pub struct AgentHandle {
    events: FramedRead<Box<dyn AsyncRead + Send + Unpin>, EventCodec>,
    control: Box<dyn ProcessControl>,
}

impl fmt::Debug for AgentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentHandle").finish_non_exhaustive()
    }
}

impl AgentHandle {
    /// Pair an output stream with the control for its process.
    pub fn new<R, C>(stdout: R, control: C) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        C: ProcessControl + 'static,
    {
        let reader: Box<dyn AsyncRead + Send + Unpin> = Box::new(stdout);
        Self {
            events: FramedRead::new(reader, EventCodec::new()),
            control: Box::new(control),
        }
    }

    /// Next decoded event; `Ok(None)` once the stream has ended.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Timeout` when nothing arrives within `limit`, or
    /// `AppError::Io` if reading the stream fails.
    pub async fn next_event(&mut self, limit: Duration) -> Result<Option<Event>> {
        match tokio::time::timeout(limit, self.events.next()).await {
            Ok(Some(Ok(event))) => Ok(Some(event)),
            Ok(Some(Err(err))) => Err(err),
            Ok(None) => Ok(None),
            Err(_elapsed) => Err(AppError::Timeout(format!(
                "no agent output for {}s",
                limit.as_secs()
            ))),
        }
    }

    /// Forcibly stop the agent.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Process` if the signal could not be delivered.
    pub async fn terminate(&mut self) -> Result<()> {
        self.control.kill().await
    }

    /// Stop the agent, logging instead of returning a failure.
    pub async fn terminate_quietly(&mut self) {
        if let Err(err) = self.terminate().await {
            warn!(%err, "failed to terminate agent process");
        }
    }

    /// Wait for the agent to exit on its own, killing it after `grace`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Timeout` when the grace period elapsed (the process
    /// has been killed), or `AppError::Process` if waiting failed.
    pub async fn wait_exit(&mut self, grace: Duration) -> Result<ExitReport> {
        match tokio::time::timeout(grace, self.control.wait()).await {
            Ok(report) => report,
            Err(_elapsed) => {
                self.terminate_quietly().await;
                Err(AppError::Timeout(format!(
                    "agent did not exit within {}s",
                    grace.as_secs()
                )))
            }
        }
    }

    /// Release the handle after a completed run.
    pub async fn finish(mut self, grace: Duration) {
        match self.wait_exit(grace).await {
            Ok(report) => debug!(code = ?report.code, "agent process exited"),
            Err(err) => debug!(%err, "agent process stopped"),
        }
    }
}
