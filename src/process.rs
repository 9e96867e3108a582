use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::Semaphore;

use crate::api::{ExecutionOutcome, RunStatus};
use crate::config::{GatewayConfig, OutputCapture};

/// Runs finished command strings through the configured shell.
#[derive(Debug, Clone)]
pub struct Executor {
    shell: PathBuf,
    output: OutputCapture,
    timeout: Option<Duration>,
    gate: Option<Arc<Semaphore>>,
}

impl Executor {
    pub fn new(config: &GatewayConfig) -> Self {
        Self {
            shell: config.shell.clone(),
            output: config.output,
            timeout: config.timeout,
            gate: config
                .max_concurrent
                .map(|max| Arc::new(Semaphore::new(max.get()))),
        }
    }

    /// Runs `script` as `<shell> -c <script>`, feeding `stdin` to it if given.
    ///
    /// The child is killed when the returned future is dropped (the client
    /// went away) or when the timeout elapses.
    pub async fn run(&self, id: u64, script: &str, stdin: Option<Bytes>) -> ExecutionOutcome {
        let _permit = match &self.gate {
            Some(gate) => match gate.acquire().await {
                Ok(permit) => Some(permit),
                Err(e) => return failure(id, e.to_string(), Duration::ZERO),
            },
            None => None,
        };

        let mut command = Command::new(&self.shell);
        command
            .arg("-c")
            .arg(script)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let start = Instant::now();
        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => return failure(id, e.to_string(), start.elapsed()),
        };

        let pipe = child.stdin.take();
        let feed = async move {
            if let (Some(mut pipe), Some(body)) = (pipe, stdin) {
                // The command may exit without reading its input.
                if let Err(e) = pipe.write_all(&body).await {
                    log::debug!(id; "stdin not fully consumed: {e}");
                }
            }
        };
        let wait = async move { tokio::join!(feed, child.wait_with_output()).1 };

        let result = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, wait).await.map_err(|_| limit),
            None => Ok(wait.await),
        };
        let time_taken = start.elapsed();

        match result {
            Ok(Ok(out)) => {
                let mut stdout = String::from_utf8_lossy(&out.stdout).into_owned();
                let mut stderr = String::from_utf8_lossy(&out.stderr).into_owned();
                log::debug!(id; "Status: {}", out.status);
                log::debug!(id; "Stdout: {}", stdout.trim());
                log::debug!(id; "Stderr: {}", stderr.trim());
                if self.output == OutputCapture::Combined {
                    stdout.push_str(&stderr);
                    stderr.clear();
                }
                ExecutionOutcome {
                    status: RunStatus::Completed {
                        exit_code: out.status.code().unwrap_or(-1001),
                    },
                    stdout,
                    stderr,
                    time_taken,
                }
            }
            Ok(Err(e)) => failure(id, e.to_string(), time_taken),
            // The child went down with the dropped future.
            Err(limit) => failure(id, format!("command timed out after {limit:?}"), time_taken),
        }
    }
}

fn failure(id: u64, reason: String, time_taken: Duration) -> ExecutionOutcome {
    log::info!(id; "Failed: {reason}");
    ExecutionOutcome {
        status: RunStatus::Failure { reason },
        stdout: String::new(),
        stderr: String::new(),
        time_taken,
    }
}
