//! Subprocess execution with incremental output capture.
//!
//! One invocation spawns exactly one child process. Output lines are
//! forwarded to the caller as they arrive; only a bounded tail of
//! stderr is retained for diagnostics.

use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{MediaError, MediaResult};

/// Maximum number of bytes of stderr retained for diagnostics.
pub const STDERR_TAIL_BYTES: usize = 512;

/// One line of raw subprocess output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Captured result of a finished subprocess.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    /// Bounded tail of stderr
    pub stderr_tail: String,
}

/// Run `program` with `args`, forwarding each output line to `sink` as
/// it arrives.
///
/// Resolves when the process exits. A non-zero exit becomes
/// [`MediaError::ToolFailed`] carrying the stderr tail; a spawn failure
/// (binary missing, permissions) is the distinct
/// [`MediaError::SpawnFailed`].
pub async fn run_streaming<F>(program: &str, args: &[String], mut sink: F) -> MediaResult<ProcessOutput>
where
    F: FnMut(OutputLine) + Send,
{
    debug!(program, "spawning external tool");

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| MediaError::SpawnFailed {
            program: program.to_string(),
            source,
        })?;

    let stdout = child.stdout.take().expect("stdout not captured");
    let stderr = child.stderr.take().expect("stderr not captured");

    let (tx, mut rx) = mpsc::channel::<OutputLine>(64);
    let stdout_task = tokio::spawn(forward_lines(stdout, tx.clone(), false));
    let stderr_task = tokio::spawn(forward_lines(stderr, tx, true));

    let mut tail = TailBuffer::new(STDERR_TAIL_BYTES);
    while let Some(line) = rx.recv().await {
        if let OutputLine::Stderr(text) = &line {
            tail.push(text);
        }
        sink(line);
    }

    let _ = stdout_task.await;
    let _ = stderr_task.await;

    let status = child.wait().await?;
    let stderr_tail = tail.into_string();

    if status.success() {
        Ok(ProcessOutput { stderr_tail })
    } else {
        Err(MediaError::ToolFailed {
            program: program.to_string(),
            exit_code: status.code(),
            stderr_tail,
        })
    }
}

async fn forward_lines<R>(reader: R, tx: mpsc::Sender<OutputLine>, is_stderr: bool)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let item = if is_stderr {
            OutputLine::Stderr(line)
        } else {
            OutputLine::Stdout(line)
        };
        if tx.send(item).await.is_err() {
            break;
        }
    }
}

/// Keeps the last `limit` bytes of pushed lines.
#[derive(Debug)]
struct TailBuffer {
    limit: usize,
    buf: String,
}

impl TailBuffer {
    fn new(limit: usize) -> Self {
        Self {
            limit,
            buf: String::new(),
        }
    }

    fn push(&mut self, line: &str) {
        if !self.buf.is_empty() {
            self.buf.push('\n');
        }
        self.buf.push_str(line);

        if self.buf.len() > self.limit {
            let mut cut = self.buf.len() - self.limit;
            while !self.buf.is_char_boundary(cut) {
                cut += 1;
            }
            self.buf.drain(..cut);
        }
    }

    fn into_string(self) -> String {
        self.buf
    }
}
