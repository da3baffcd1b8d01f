// ABOUTME: Background task relaying an engine's stdout to the broadcaster.
// ABOUTME: Drops protocol noise; only lines with a known UCI prefix are forwarded.

use crate::broadcast::Broadcaster;
use crate::process::OutputLines;
use std::sync::Arc;
use tokio::io::AsyncBufRead;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Engine output prefixes that are relayed to clients.
pub const QUALIFYING_PREFIXES: [&str; 6] = [
    "bestmove", "info", "readyok", "uciok", "option", "id",
];

pub fn is_qualifying(line: &str) -> bool {
    QUALIFYING_PREFIXES.iter().any(|prefix| line.starts_with(prefix))
}

/// A running reader bound to one engine generation.
pub struct ReaderTask {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

impl ReaderTask {
    /// Start relaying `output` into `broadcaster`.
    pub fn spawn<R>(engine: String, output: OutputLines<R>, broadcaster: Arc<Broadcaster>) -> Self
    where
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(relay(engine, output, broadcaster, cancel.clone()));
        Self { handle, cancel }
    }

    /// True once the task has returned (end-of-stream, read error, or stop).
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Cancel the task and wait until it has fully exited.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Err(e) = (&mut self.handle).await {
            if !e.is_cancelled() {
                warn!(error = %e, "Engine reader task panicked");
            }
        }
    }
}

impl Drop for ReaderTask {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn relay<R>(
    engine: String,
    mut output: OutputLines<R>,
    broadcaster: Arc<Broadcaster>,
    cancel: CancellationToken,
) where
    R: AsyncBufRead + Unpin,
{
    loop {
        let line = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(engine = %engine, "Engine reader cancelled");
                return;
            }
            line = output.read_line() => line,
        };

        match line {
            Ok(Some(raw)) => {
                let line = raw.trim();
                if !is_qualifying(line) {
                    continue;
                }
                // A stop may have been requested while the read was completing.
                if cancel.is_cancelled() {
                    return;
                }
                broadcaster.broadcast(line);
            }
            Ok(None) => {
                info!(engine = %engine, "Engine output closed");
                return;
            }
            Err(e) => {
                warn!(engine = %engine, error = %e, "Failed reading engine output");
                return;
            }
        }
    }
}
