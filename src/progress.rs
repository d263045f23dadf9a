//! Progress sinks: where one-line activity summaries go during a run.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use crate::models::thread::MessageRef;
use crate::redact::redact;
use crate::surface::{ChatSurface, Outbound};

/// Minimum spacing between two edits of a status message.
pub const STATUS_THROTTLE: Duration = Duration::from_millis(800);

/// Number of recent lines kept on a status message.
pub const STATUS_LINES: usize = 5;

const CHANNEL_CAPACITY: usize = 64;

/// Receives progress lines from a running agent.
///
/// Implementations must not block; the event pump calls this inline.
pub trait ProgressSink: Send + Sync {
    /// Record one progress line.
    fn progress(&self, line: &str);
}

/// Discards progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn progress(&self, _line: &str) {}
}

/// Live status message showing the most recent progress lines.
///
/// Lines are forwarded to a background task that edits the message at most
/// once per [`STATUS_THROTTLE`]. Lines arriving faster are coalesced; when
/// the channel is full a line is dropped. Dropping the board flushes any
/// coalesced lines and stops the task.
#[derive(Debug)]
pub struct StatusBoard {
    tx: mpsc::Sender<String>,
}

impl StatusBoard {
    /// Start a board that edits `message` below `header`.
    #[must_use]
    pub fn spawn(
        surface: Arc<dyn ChatSurface>,
        message: MessageRef,
        header: String,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let task = tokio::spawn(run_board(surface, message, header, rx));
        (Self { tx }, task)
    }
}

impl ProgressSink for StatusBoard {
    fn progress(&self, line: &str) {
        if self.tx.try_send(line.to_owned()).is_err() {
            debug!("status board busy; dropping progress line");
        }
    }
}

/// Render the status text for `header` and `lines`, redacting each line.
#[must_use]
pub fn render_status(header: &str, lines: &VecDeque<String>) -> String {
    if lines.is_empty() {
        return header.to_owned();
    }
    let body = lines
        .iter()
        .map(|line| format!("\u{2192} {}", redact(line)))
        .collect::<Vec<_>>()
        .join("\n");
    format!("{header}\n\n{body}")
}

async fn run_board(
    surface: Arc<dyn ChatSurface>,
    message: MessageRef,
    header: String,
    mut rx: mpsc::Receiver<String>,
) {
    let mut lines: VecDeque<String> = VecDeque::with_capacity(STATUS_LINES);
    let mut last_edit: Option<Instant> = None;
    let mut dirty = false;

    loop {
        let wait = match (dirty, last_edit) {
            (true, Some(at)) => STATUS_THROTTLE.saturating_sub(at.elapsed()),
            _ => Duration::MAX,
        };

        tokio::select! {
            line = rx.recv() => {
                let Some(line) = line else { break };
                if lines.len() == STATUS_LINES {
                    lines.pop_front();
                }
                lines.push_back(line);
                dirty = true;
            }
            () = tokio::time::sleep(wait), if dirty => {}
        }

        let due = last_edit.is_none_or(|at| at.elapsed() >= STATUS_THROTTLE);
        if dirty && due {
            publish(surface.as_ref(), &message, &header, &lines).await;
            last_edit = Some(Instant::now());
            dirty = false;
        }
    }

    // Flush lines coalesced after the last edit.
    if dirty {
        publish(surface.as_ref(), &message, &header, &lines).await;
    }
}

async fn publish(
    surface: &dyn ChatSurface,
    message: &MessageRef,
    header: &str,
    lines: &VecDeque<String>,
) {
    let text = render_status(header, lines);
    if let Err(err) = surface.edit(message, Outbound::Text(text)).await {
        debug!(%err, "failed to update status message");
    }
}
