// ABOUTME: Owns one spawned engine process and its stdin/stdout/stderr pipes.
// ABOUTME: Spawn, line writes, stdout hand-off to the reader, and best-effort termination.

use crate::error::{SpawnError, WriteError};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Line stream over an engine's stdout (or any buffered reader in tests).
pub struct OutputLines<R = BufReader<ChildStdout>> {
    lines: Lines<R>,
}

impl<R: AsyncBufRead + Unpin> OutputLines<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
        }
    }

    /// Next line without its terminator. `None` means end-of-stream.
    pub async fn read_line(&mut self) -> std::io::Result<Option<String>> {
        self.lines.next_line().await
    }
}

/// Cloneable line writer for one engine's stdin.
///
/// Clones share the pipe and write one line at a time. `close` aborts any
/// write stuck on a full pipe, then drops the pipe.
#[derive(Clone)]
pub struct EngineInput {
    stdin: Arc<Mutex<Option<ChildStdin>>>,
    closed: CancellationToken,
}

impl EngineInput {
    fn new(stdin: Option<ChildStdin>) -> Self {
        Self {
            stdin: Arc::new(Mutex::new(stdin)),
            closed: CancellationToken::new(),
        }
    }

    /// Write `text` plus a newline and flush. Fails with `Closed` once the
    /// input has been closed, including while the write is pending.
    pub async fn write_line(&self, text: &str) -> Result<(), WriteError> {
        tokio::select! {
            biased;
            _ = self.closed.cancelled() => Err(WriteError::Closed),
            result = self.write_to_pipe(text) => result,
        }
    }

    async fn write_to_pipe(&self, text: &str) -> Result<(), WriteError> {
        let mut pipe = self.stdin.lock().await;
        let stdin = pipe.as_mut().ok_or(WriteError::Closed)?;
        let mut line = String::with_capacity(text.len() + 1);
        line.push_str(text);
        line.push('\n');
        stdin.write_all(line.as_bytes()).await?;
        stdin.flush().await?;
        Ok(())
    }

    /// Cancel pending writes and close the pipe. Idempotent.
    pub async fn close(&self) {
        self.closed.cancel();
        self.stdin.lock().await.take();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

/// A running engine process.
pub struct EngineProcess {
    path: PathBuf,
    child: Child,
    input: EngineInput,
    stdout: Option<ChildStdout>,
    stderr_task: Option<JoinHandle<()>>,
    terminated: bool,
}

impl EngineProcess {
    /// Launch `path` with all three standard streams piped.
    pub fn spawn(path: &Path) -> Result<Self, SpawnError> {
        let mut child = Command::new(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| classify_spawn_error(path, e))?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        // Drain stderr so a chatty engine never blocks on a full pipe.
        let stderr_task = stderr.map(|stderr| {
            let engine = path.display().to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if !line.is_empty() {
                        debug!(engine = %engine, stderr = %line, "Engine stderr");
                    }
                }
            })
        });

        info!(path = %path.display(), pid = ?child.id(), "Spawned engine process");

        Ok(Self {
            path: path.to_path_buf(),
            child,
            input: EngineInput::new(stdin),
            stdout,
            stderr_task,
            terminated: false,
        })
    }

    /// OS process id, or `None` once the process has been reaped.
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Shared handle for writing to the engine's stdin.
    pub fn input(&self) -> EngineInput {
        self.input.clone()
    }

    /// Hand the stdout line stream to a reader. Only the first call returns it.
    pub fn take_output(&mut self) -> Option<OutputLines> {
        self.stdout
            .take()
            .map(|stdout| OutputLines::new(BufReader::new(stdout)))
    }

    /// Write `text` plus a newline to the engine's stdin and flush.
    pub async fn write_line(&self, text: &str) -> Result<(), WriteError> {
        self.input.write_line(text).await
    }

    /// Ask the engine to exit, wait up to `grace`, then kill it.
    ///
    /// Idempotent and infallible: every failure here is logged and swallowed.
    pub async fn terminate(&mut self, grace: Duration) {
        if self.terminated {
            return;
        }
        self.terminated = true;

        // Closing stdin is already an exit request for most UCI engines.
        self.input.close().await;

        #[cfg(unix)]
        if let Some(pid) = self.child.id() {
            // SAFETY: plain signal delivery to a pid we spawned and have not reaped.
            let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
            if rc != 0 {
                debug!(pid, error = %std::io::Error::last_os_error(), "SIGTERM failed");
            }
        }

        #[cfg(not(unix))]
        if let Err(e) = self.child.start_kill() {
            debug!(error = %e, "Kill request failed");
        }

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => {
                info!(path = %self.path.display(), ?status, "Engine process exited");
            }
            Ok(Err(e)) => {
                warn!(path = %self.path.display(), error = %e, "Failed waiting for engine exit");
            }
            Err(_) => {
                warn!(
                    path = %self.path.display(),
                    grace_ms = grace.as_millis() as u64,
                    "Engine ignored termination request, killing"
                );
                if let Err(e) = self.child.kill().await {
                    warn!(path = %self.path.display(), error = %e, "Failed to kill engine process");
                }
            }
        }

        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
    }
}

impl Drop for EngineProcess {
    fn drop(&mut self) {
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
    }
}

/// Split launch failures into "wrong binary format" and everything else.
fn classify_spawn_error(path: &Path, err: std::io::Error) -> SpawnError {
    if is_exec_format_error(&err) {
        SpawnError::NotExecutable {
            path: path.to_path_buf(),
        }
    } else {
        SpawnError::OsFailure {
            path: path.to_path_buf(),
            source: err,
        }
    }
}

#[cfg(unix)]
fn is_exec_format_error(err: &std::io::Error) -> bool {
    err.raw_os_error() == Some(libc::ENOEXEC)
}

#[cfg(windows)]
fn is_exec_format_error(err: &std::io::Error) -> bool {
    // ERROR_BAD_EXE_FORMAT
    err.raw_os_error() == Some(193)
}

#[cfg(all(not(unix), not(windows)))]
fn is_exec_format_error(_err: &std::io::Error) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_output_lines_reads_until_eof() {
        let mut lines = OutputLines::new(&b"uciok\r\nreadyok\n"[..]);
        assert_eq!(lines.read_line().await.unwrap().as_deref(), Some("uciok"));
        assert_eq!(lines.read_line().await.unwrap().as_deref(), Some("readyok"));
        assert_eq!(lines.read_line().await.unwrap(), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_classify_exec_format_error() {
        let err = classify_spawn_error(
            Path::new("/engines/x/x"),
            std::io::Error::from_raw_os_error(libc::ENOEXEC),
        );
        assert!(matches!(err, SpawnError::NotExecutable { .. }));
    }

    #[test]
    fn test_classify_other_error() {
        let err = classify_spawn_error(
            Path::new("/engines/x/x"),
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(matches!(err, SpawnError::OsFailure { .. }));
    }

    #[tokio::test]
    async fn test_spawn_missing_binary_is_os_failure() {
        let tmp = tempfile::TempDir::new().unwrap();
        let result = EngineProcess::spawn(&tmp.path().join("nope"));
        assert!(matches!(result, Err(SpawnError::OsFailure { .. })));
    }

    #[cfg(unix)]
    mod unix {
        use super::*;
        use std::os::unix::fs::PermissionsExt;
        use tempfile::TempDir;

        fn script(dir: &TempDir, name: &str, body: &str) -> PathBuf {
            let path = dir.path().join(name);
            std::fs::write(&path, format!("#!/bin/sh\n{body}")).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        fn alive(pid: u32) -> bool {
            unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
        }

        #[tokio::test]
        async fn test_write_then_read_echo() {
            let tmp = TempDir::new().unwrap();
            let path = script(&tmp, "echo", "while read line; do echo \"got $line\"; done\n");
            let mut process = EngineProcess::spawn(&path).unwrap();
            let mut output = process.take_output().unwrap();
            assert!(process.take_output().is_none());

            process.write_line("uci").await.unwrap();
            assert_eq!(output.read_line().await.unwrap().as_deref(), Some("got uci"));

            process.terminate(Duration::from_secs(2)).await;
            assert_eq!(output.read_line().await.unwrap(), None);
        }

        #[tokio::test]
        async fn test_terminate_escalates_and_is_idempotent() {
            let tmp = TempDir::new().unwrap();
            let path = script(&tmp, "stubborn", "trap '' TERM\nwhile true; do sleep 1; done\n");
            let mut process = EngineProcess::spawn(&path).unwrap();
            let pid = process.id().unwrap();

            process.terminate(Duration::from_millis(200)).await;
            assert!(!alive(pid));
            assert!(process.id().is_none());

            process.terminate(Duration::from_millis(200)).await;
        }

        #[tokio::test]
        async fn test_write_after_terminate_reports_error() {
            let tmp = TempDir::new().unwrap();
            let path = script(&tmp, "cat", "exec cat\n");
            let mut process = EngineProcess::spawn(&path).unwrap();
            process.terminate(Duration::from_secs(2)).await;

            let result = process.write_line("isready").await;
            assert!(matches!(result, Err(WriteError::Closed)));
        }

        #[tokio::test]
        async fn test_terminate_aborts_a_write_stuck_on_a_full_pipe() {
            let tmp = TempDir::new().unwrap();
            // Never reads stdin, so a large write fills the pipe and parks.
            let path = script(&tmp, "deaf", "exec sleep 1000\n");
            let mut process = EngineProcess::spawn(&path).unwrap();
            let input = process.input();
            let pending =
                tokio::spawn(async move { input.write_line(&"x".repeat(256 * 1024)).await });

            tokio::time::sleep(Duration::from_millis(100)).await;
            assert!(!pending.is_finished());

            let grace = Duration::from_millis(200);
            tokio::time::timeout(Duration::from_secs(5), process.terminate(grace))
                .await
                .unwrap();
            let result = tokio::time::timeout(Duration::from_secs(5), pending)
                .await
                .unwrap()
                .unwrap();
            assert!(matches!(result, Err(WriteError::Closed)));
            assert!(process.input().is_closed());
        }

        #[tokio::test]
        async fn test_spawn_garbage_binary_is_not_executable() {
            let tmp = TempDir::new().unwrap();
            let path = tmp.path().join("garbage");
            std::fs::write(&path, b"\x00\x01not an engine").unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();

            let result = EngineProcess::spawn(&path);
            assert!(matches!(result, Err(SpawnError::NotExecutable { .. })));
        }
    }
}
