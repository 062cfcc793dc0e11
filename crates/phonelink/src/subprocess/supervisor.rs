//! Supervised process lifecycle.
//!
//! Spawns the process with all three standard streams piped, reports its
//! output as raw chunks and its exit as events, and forwards operator lines
//! to its stdin.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::event::{Event, EventSender};

/// Read size for stdout/stderr chunks.
const CHUNK_SIZE: usize = 4096;

/// How long to wait for the output readers to drain after the process has
/// exited. A grandchild holding the pipes open must not stall shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Events produced by the supervised process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    /// A chunk of stdout. No line alignment is implied.
    Stdout(Vec<u8>),
    /// A chunk of stderr.
    Stderr(Vec<u8>),
    /// The process exited. `None` when it was terminated by a signal.
    /// Always delivered after the last output chunk.
    Exited(Option<i32>),
}

/// Lifecycle of the supervised process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Running,
    Exited(Option<i32>),
}

/// Owner of the supervised process's input side and lifecycle state.
#[derive(Debug)]
pub struct ProcessSupervisor {
    name: String,
    pid: Option<u32>,
    /// Sender for stdin lines; `None` once input has been closed.
    stdin_tx: Option<mpsc::Sender<String>>,
    state: ProcessState,
}

impl ProcessSupervisor {
    /// Spawn `binary` with no arguments.
    ///
    /// Output and exit are reported on `events`.
    pub fn spawn(
        binary: &Path,
        name: impl Into<String>,
        events: EventSender,
    ) -> Result<Self, SubprocessError> {
        let name = name.into();
        info!(binary = %binary.display(), "Spawning supervised process");

        let mut child = Command::new(binary)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SubprocessError::SpawnFailed {
                binary: binary.display().to_string(),
                reason: e.to_string(),
            })?;

        let pid = child.id();
        let stdin = child
            .stdin
            .take()
            .ok_or(SubprocessError::StdioUnavailable { stream: "stdin" })?;
        let stdout = child
            .stdout
            .take()
            .ok_or(SubprocessError::StdioUnavailable { stream: "stdout" })?;
        let stderr = child
            .stderr
            .take()
            .ok_or(SubprocessError::StdioUnavailable { stream: "stderr" })?;

        let (stdin_tx, mut stdin_rx) = mpsc::channel::<String>(32);

        // Spawn stdin writer task
        tokio::spawn(async move {
            let mut stdin = stdin;
            while let Some(line) = stdin_rx.recv().await {
                if let Err(e) = stdin.write_all(line.as_bytes()).await {
                    warn!("Failed to write to process stdin: {}", e);
                    break;
                }
                if let Err(e) = stdin.write_all(b"\n").await {
                    warn!("Failed to write newline: {}", e);
                    break;
                }
                if let Err(e) = stdin.flush().await {
                    warn!("Failed to flush process stdin: {}", e);
                    break;
                }
            }
            debug!("stdin writer finished");
        });

        let stdout_task = spawn_reader(stdout, events.clone(), ProcessEvent::Stdout, "stdout");
        let stderr_task = spawn_reader(stderr, events.clone(), ProcessEvent::Stderr, "stderr");

        // Exit monitor: owns the child so it is reaped exactly once.
        tokio::spawn(async move {
            let code = match child.wait().await {
                Ok(status) => {
                    info!(?status, "Supervised process exited");
                    status.code()
                }
                Err(e) => {
                    error!(error = %e, "Error waiting for supervised process");
                    None
                }
            };
            for (stream, task) in [("stdout", stdout_task), ("stderr", stderr_task)] {
                if tokio::time::timeout(DRAIN_TIMEOUT, task).await.is_err() {
                    warn!(stream, "Output reader still open after exit, not waiting");
                }
            }
            let _ = events.send(Event::Process(ProcessEvent::Exited(code))).await;
        });

        Ok(Self {
            name,
            pid,
            stdin_tx: Some(stdin_tx),
            state: ProcessState::Running,
        })
    }

    /// Wrap an existing stdin channel without spawning anything.
    ///
    /// Lines written end up on `stdin_tx`, and exit must be reported
    /// through [`mark_exited`](Self::mark_exited).
    pub fn from_channel(name: impl Into<String>, stdin_tx: mpsc::Sender<String>) -> Self {
        Self {
            name: name.into(),
            pid: None,
            stdin_tx: Some(stdin_tx),
            state: ProcessState::Running,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub const fn state(&self) -> ProcessState {
        self.state
    }

    pub const fn has_exited(&self) -> bool {
        matches!(self.state, ProcessState::Exited(_))
    }

    /// Queue one line (a terminator is appended) for the process's stdin.
    ///
    /// Never waits: a process that stops reading fills the queue and further
    /// lines are rejected with [`SubprocessError::InputFull`].
    pub fn write(&self, line: &str) -> Result<(), SubprocessError> {
        if let ProcessState::Exited(code) = self.state {
            return Err(SubprocessError::ProcessExited { code });
        }
        let tx = self.stdin_tx.as_ref().ok_or(SubprocessError::InputClosed)?;
        tx.try_send(line.to_string()).map_err(|e| match e {
            TrySendError::Full(_) => SubprocessError::InputFull,
            TrySendError::Closed(_) => SubprocessError::InputClosed,
        })
    }

    /// Close the process's stdin. The process sees end-of-input once queued
    /// lines have been written.
    pub fn close_input(&mut self) {
        if self.stdin_tx.take().is_some() {
            debug!(name = %self.name, "Closing process stdin");
        }
    }

    /// Record the exit. Only the first call has any effect.
    pub fn mark_exited(&mut self, code: Option<i32>) {
        if self.state == ProcessState::Running {
            self.state = ProcessState::Exited(code);
            self.stdin_tx = None;
        }
    }
}

fn spawn_reader<R>(
    mut reader: R,
    events: EventSender,
    wrap: fn(Vec<u8>) -> ProcessEvent,
    stream: &'static str,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    if events
                        .send(Event::Process(wrap(buf[..n].to_vec())))
                        .await
                        .is_err()
                    {
                        debug!(stream, "event queue closed");
                        break;
                    }
                }
                Err(e) => {
                    warn!(stream, error = %e, "Failed to read process output");
                    break;
                }
            }
        }
        debug!(stream, "reader finished");
    })
}

/// Errors from subprocess operations.
#[derive(Debug, thiserror::Error)]
pub enum SubprocessError {
    #[error("Failed to spawn {binary}: {reason}")]
    SpawnFailed { binary: String, reason: String },

    #[error("Failed to capture process {stream}")]
    StdioUnavailable { stream: &'static str },

    #[error("Process already exited{}", .code.map(|c| format!(" with code {c}")).unwrap_or_default())]
    ProcessExited { code: Option<i32> },

    #[error("Process input is closed")]
    InputClosed,

    #[error("Process is not reading its input, line dropped")]
    InputFull,
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::event;

    async fn next_process_event(rx: &mut event::EventReceiver) -> ProcessEvent {
        match rx.recv().await.unwrap() {
            Event::Process(e) => e,
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn spawn_missing_binary_fails() {
        let (tx, _rx) = event::channel();
        let err = ProcessSupervisor::spawn(Path::new("/nonexistent/bitlite"), "bitlite", tx)
            .unwrap_err();
        assert!(matches!(err, SubprocessError::SpawnFailed { .. }));
    }

    #[tokio::test]
    async fn write_after_exit_is_reported_not_fatal() {
        let (stdin_tx, _stdin_rx) = mpsc::channel(4);
        let mut supervisor = ProcessSupervisor::from_channel("bitlite", stdin_tx);
        supervisor.mark_exited(Some(3));
        let err = supervisor.write("hello").unwrap_err();
        assert!(matches!(err, SubprocessError::ProcessExited { code: Some(3) }));
        assert_eq!(err.to_string(), "Process already exited with code 3");
    }

    #[tokio::test]
    async fn exit_transition_happens_once() {
        let (stdin_tx, _stdin_rx) = mpsc::channel(4);
        let mut supervisor = ProcessSupervisor::from_channel("bitlite", stdin_tx);
        supervisor.mark_exited(Some(0));
        supervisor.mark_exited(Some(9));
        assert_eq!(supervisor.state(), ProcessState::Exited(Some(0)));
    }

    #[tokio::test]
    async fn write_after_close_input_fails() {
        let (stdin_tx, _stdin_rx) = mpsc::channel(4);
        let mut supervisor = ProcessSupervisor::from_channel("bitlite", stdin_tx);
        supervisor.close_input();
        assert!(matches!(
            supervisor.write("x"),
            Err(SubprocessError::InputClosed)
        ));
    }

    #[tokio::test]
    async fn write_to_stalled_process_does_not_wait() {
        let (stdin_tx, mut stdin_rx) = mpsc::channel(2);
        let supervisor = ProcessSupervisor::from_channel("bitlite", stdin_tx);
        supervisor.write("one").unwrap();
        supervisor.write("two").unwrap();
        assert!(matches!(
            supervisor.write("three"),
            Err(SubprocessError::InputFull)
        ));
        // Room again once the writer catches up.
        assert_eq!(stdin_rx.recv().await.as_deref(), Some("one"));
        supervisor.write("four").unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn echoes_lines_and_reports_exit_after_output() {
        let (tx, mut rx) = event::channel();
        let mut supervisor = ProcessSupervisor::spawn(Path::new("cat"), "cat", tx).unwrap();
        assert!(supervisor.pid().is_some());

        supervisor.write("ping").unwrap();
        let mut seen = Vec::new();
        while !seen.ends_with(b"ping\n") {
            match next_process_event(&mut rx).await {
                ProcessEvent::Stdout(chunk) => seen.extend(chunk),
                other => panic!("unexpected {other:?}"),
            }
        }

        supervisor.close_input();
        loop {
            match next_process_event(&mut rx).await {
                ProcessEvent::Exited(code) => {
                    assert_eq!(code, Some(0));
                    break;
                }
                ProcessEvent::Stdout(_) | ProcessEvent::Stderr(_) => {}
            }
        }
    }
}
