//! One-shot interpreter processes.
//!
//! Every turn spawns a fresh interpreter, writes one input document to its
//! stdin, closes stdin, and reads stdout and stderr to completion. Processes
//! are never reused.

use async_trait::async_trait;
use ifturn_core::interpreter::Invocation;
use ifturn_core::{Result, TurnError};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Default bound on one turn's subprocess exchange.
pub const DEFAULT_TURN_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest stderr excerpt carried in a crash error.
const STDERR_EXCERPT: usize = 2000;

/// What a finished interpreter wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

/// Runs one interpreter invocation to completion.
///
/// Implementations must terminate the process on timeout or cancellation
/// and must treat a non-zero exit as `InterpreterCrash`.
#[async_trait]
pub trait InterpreterRunner: Send + Sync {
    async fn run(
        &self,
        invocation: &Invocation,
        input: &[u8],
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<ProcessOutput>;
}

/// `InterpreterRunner` backed by real child processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }

    fn command(invocation: &Invocation) -> Command {
        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .envs(invocation.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &invocation.cwd {
            cmd.current_dir(cwd);
        }
        cmd
    }
}

enum Outcome {
    Finished(std::io::Result<(ExitStatus, ProcessOutput)>),
    TimedOut,
    Cancelled,
}

#[async_trait]
impl InterpreterRunner for ProcessRunner {
    async fn run(
        &self,
        invocation: &Invocation,
        input: &[u8],
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<ProcessOutput> {
        let program = invocation.program.display().to_string();
        let mut child = Self::command(invocation).spawn().map_err(|e| {
            warn!(binary = %program, error = %e, "Failed to spawn interpreter");
            TurnError::launch(&program, e.to_string())
        })?;
        debug!(binary = %program, pid = ?child.id(), "Spawned interpreter");

        let outcome = {
            let exchange = exchange(&mut child, input);
            tokio::select! {
                result = exchange => Outcome::Finished(result),
                _ = tokio::time::sleep(timeout) => Outcome::TimedOut,
                _ = cancel.cancelled() => Outcome::Cancelled,
            }
        };

        match outcome {
            Outcome::Finished(Ok((status, output))) => {
                if status.success() {
                    debug!(
                        stdout_bytes = output.stdout.len(),
                        stderr_bytes = output.stderr.len(),
                        "Interpreter exited cleanly"
                    );
                    Ok(output)
                } else {
                    Err(TurnError::InterpreterCrash {
                        code: status.code(),
                        stderr: stderr_excerpt(&output.stderr),
                    })
                }
            }
            Outcome::Finished(Err(e)) => {
                terminate(&mut child).await;
                Err(TurnError::io(format!("interpreter I/O failed: {}", e)))
            }
            Outcome::TimedOut => {
                terminate(&mut child).await;
                warn!(timeout_secs = timeout.as_secs_f64(), "Interpreter timed out; killed");
                Err(TurnError::InterpreterTimeout { timeout })
            }
            Outcome::Cancelled => {
                terminate(&mut child).await;
                debug!("Turn cancelled; interpreter killed");
                Err(TurnError::Cancelled)
            }
        }
    }
}

/// Feeds stdin and drains both output pipes concurrently, then reaps the child.
async fn exchange(child: &mut Child, input: &[u8]) -> std::io::Result<(ExitStatus, ProcessOutput)> {
    let stdin = child.stdin.take();
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let (written, stdout, stderr) = tokio::join!(
        write_input(stdin, input),
        read_all(stdout),
        read_all(stderr)
    );
    written?;
    let output = ProcessOutput {
        stdout: stdout?,
        stderr: stderr?,
    };
    let status = child.wait().await?;
    Ok((status, output))
}

async fn write_input(stdin: Option<ChildStdin>, input: &[u8]) -> std::io::Result<()> {
    let Some(mut stdin) = stdin else {
        return Ok(());
    };
    match stdin.write_all(input).await {
        // The interpreter may exit without reading everything; its exit status tells the rest.
        Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => Ok(()),
        other => other,
    }
    // Dropping stdin closes the pipe, which is the interpreter's end-of-input.
}

async fn read_all<R: AsyncRead + Unpin>(pipe: Option<R>) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

async fn terminate(child: &mut Child) {
    if let Err(e) = child.kill().await {
        debug!(error = %e, "Interpreter already gone");
    }
}

fn stderr_excerpt(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    if text.len() <= STDERR_EXCERPT {
        return text.to_string();
    }
    let mut end = STDERR_EXCERPT;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stderr_excerpt() {
        assert_eq!(stderr_excerpt(b"  boom\n"), "boom");
        let long = "é".repeat(STDERR_EXCERPT);
        let excerpt = stderr_excerpt(long.as_bytes());
        assert!(excerpt.ends_with("..."));
        assert!(excerpt.len() <= STDERR_EXCERPT + 3);
    }

    #[tokio::test]
    async fn test_missing_binary_is_launch_error() {
        let invocation = Invocation {
            program: "/nonexistent/glulxe".into(),
            args: vec![],
            env: vec![],
            cwd: None,
        };
        let err = ProcessRunner::new()
            .run(&invocation, b"{}", DEFAULT_TURN_TIMEOUT, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TurnError::InterpreterLaunch { .. }));
    }
}
