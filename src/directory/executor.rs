//! The process-execution half of §4.E: run the directory tool under a
//! timeout and an output buffer cap, independent of how the invocation's
//! arguments were built (see [`super::command`]).
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::time::timeout;

/// Per spec §4.E: 10 MiB per stream.
pub const MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

/// The result of one directory-tool invocation, success or failure alike.
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: i64,
}

/// Abstracts "run the directory tool" so tests can supply a fake instead of
/// shelling out — grounded on the `ExecCommand` trait/test-double split used
/// for the analogous container-runtime wrapper in the corpus.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn run(&self, args: &[String]) -> CommandOutcome;
}

/// Executes the directory tool directly (never through a shell) with a
/// wall-clock timeout and a 10 MiB cap per output stream.
pub struct ProcessExecutor {
    tool_path: String,
    timeout: Duration,
}

impl ProcessExecutor {
    pub fn new(tool_path: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            tool_path: tool_path.into(),
            timeout: Duration::from_secs(timeout_secs),
        }
    }
}

/// Read up to `cap` bytes; returns `(bytes, overflowed)`. A `true` overflow
/// flag means the stream kept producing data past the cap and the caller
/// should treat the run as failed rather than trust a truncated result.
async fn read_capped<R: tokio::io::AsyncRead + Unpin>(mut reader: R, cap: usize) -> (Vec<u8>, bool) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => return (buf, false),
            Ok(n) => {
                buf.extend_from_slice(&chunk[..n]);
                if buf.len() > cap {
                    return (buf, true);
                }
            }
            Err(_) => return (buf, false),
        }
    }
}

async fn kill_and_reap(child: &mut Child) {
    let _ = child.start_kill();
    let _ = child.wait().await;
}

#[async_trait]
impl CommandExecutor for ProcessExecutor {
    async fn run(&self, args: &[String]) -> CommandOutcome {
        let start = Instant::now();

        let mut child = match Command::new(&self.tool_path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                return CommandOutcome {
                    success: false,
                    exit_code: None,
                    stdout: String::new(),
                    stderr: format!("failed to launch directory tool: {}", e),
                    duration_ms: start.elapsed().as_millis() as i64,
                };
            }
        };

        let stdout_pipe = child.stdout.take().expect("stdout is piped");
        let stderr_pipe = child.stderr.take().expect("stderr is piped");

        let run = async {
            let ((stdout_buf, stdout_overflow), (stderr_buf, stderr_overflow)) = tokio::join!(
                read_capped(stdout_pipe, MAX_OUTPUT_BYTES),
                read_capped(stderr_pipe, MAX_OUTPUT_BYTES),
            );
            (stdout_buf, stdout_overflow, stderr_buf, stderr_overflow)
        };

        let (stdout_buf, stdout_overflow, stderr_buf, stderr_overflow) =
            match timeout(self.timeout, run).await {
                Ok(result) => result,
                Err(_) => {
                    kill_and_reap(&mut child).await;
                    return CommandOutcome {
                        success: false,
                        exit_code: None,
                        stdout: String::new(),
                        stderr: "directory tool execution timed out".to_string(),
                        duration_ms: start.elapsed().as_millis() as i64,
                    };
                }
            };

        if stdout_overflow || stderr_overflow {
            kill_and_reap(&mut child).await;
            return CommandOutcome {
                success: false,
                exit_code: None,
                stdout: String::new(),
                stderr: "directory tool output exceeded the 10 MiB buffer cap".to_string(),
                duration_ms: start.elapsed().as_millis() as i64,
            };
        }

        let status = match timeout(self.timeout, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                return CommandOutcome {
                    success: false,
                    exit_code: None,
                    stdout: String::new(),
                    stderr: format!("failed to wait on directory tool: {}", e),
                    duration_ms: start.elapsed().as_millis() as i64,
                };
            }
            Err(_) => {
                kill_and_reap(&mut child).await;
                return CommandOutcome {
                    success: false,
                    exit_code: None,
                    stdout: String::new(),
                    stderr: "directory tool execution timed out".to_string(),
                    duration_ms: start.elapsed().as_millis() as i64,
                };
            }
        };

        CommandOutcome {
            success: status.success(),
            exit_code: status.code(),
            stdout: String::from_utf8_lossy(&stdout_buf).trim().to_string(),
            stderr: String::from_utf8_lossy(&stderr_buf).to_string(),
            duration_ms: start.elapsed().as_millis() as i64,
        }
    }
}
